//! Logging initialization and configuration checking
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Startup diagnostics for the external tools (yt-dlp, ffmpeg)

use anyhow::Result;
use simplelog::*;
use std::fs::File;
use std::process::{Command, Stdio};

use crate::core::config;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to create the file or a logger is already installed
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Runs `<bin> <flag>` and returns the first line of its output, if the binary starts.
///
/// `bin` may carry leading arguments (`python3 -m yt_dlp`).
fn tool_version(bin: &str, flag: &str) -> Option<String> {
    let mut parts = bin.split_whitespace();
    let output = Command::new(parts.next()?)
        .args(parts)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}

/// Logs availability of the external tools at application startup
///
/// Checks:
/// - YTDL_BIN (`--version`)
/// - FFMPEG_PATH or ffmpeg on PATH (`-version`)
///
/// Never fails: a missing tool only turns into a loud warning, the actual
/// request will then fail with a spawn error.
pub fn log_tools_configuration() {
    log::info!("External tools check");

    let ytdl_bin = config::YTDL_BIN.as_str();
    match tool_version(ytdl_bin, "--version") {
        Some(version) => log::info!("YTDL_BIN: {} (version {})", ytdl_bin, version),
        None => {
            log::error!("YTDL_BIN: {} (NOT FOUND or not executable)", ytdl_bin);
            log::error!("   Info and download requests will fail until it is installed");
        }
    }

    // FFMPEG_PATH may point at the binary or at its directory
    let ffmpeg = match config::FFMPEG_PATH.as_deref() {
        Some(path) if std::path::Path::new(path).is_dir() => std::path::Path::new(path).join("ffmpeg").display().to_string(),
        Some(path) => path.to_string(),
        None => "ffmpeg".to_string(),
    };
    match tool_version(&ffmpeg, "-version") {
        Some(version) => log::info!("ffmpeg: {}", version),
        None => log::warn!("ffmpeg: {} not found, mp4 merging and mp3 extraction will fail", ffmpeg),
    }

    log::info!("TEMP_FILES_DIR: {}", config::TEMP_FILES_DIR.display());
}
