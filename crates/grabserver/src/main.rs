use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use dotenvy::dotenv;

use grabcore::config::{self, DownloaderSettings};
use grabcore::core::validation::validate_media_url;
use grabcore::core::{init_logger, log_tools_configuration};
use grabcore::download::{ytdlp, MediaFormat};
use grabcore::ProgressEvent;
use grabserver::cli::{Cli, Commands};
use grabserver::web::{self, AppState};

/// Main entry point
///
/// Parses CLI arguments and dispatches to the matching subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, binding the port) or the
/// CLI command fails.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present, before any config is read
    let _ = dotenv();

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Some(Commands::Serve { port }) => run_server(port).await,
        Some(Commands::Info { url, json }) => run_cli_info(url, json).await,
        Some(Commands::Download {
            url,
            format,
            quality,
            output,
        }) => run_cli_download(url, format, quality, output).await,
        None => {
            log::info!("No command specified, running server");
            run_server(None).await
        }
    }
}

async fn run_server(port: Option<u16>) -> Result<()> {
    log_tools_configuration();

    let temp_root = config::TEMP_FILES_DIR.clone();
    let removed = tokio::task::spawn_blocking(move || {
        ytdlp::cleanup_stale_workdirs(&temp_root, config::download::stale_workdir_age())
    })
    .await?;
    if removed > 0 {
        log::info!("Startup sweep removed {} stale work directories", removed);
    }

    let state = AppState::from_env()?;

    // Periodically drop expired rate-limit windows
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config::rate_limit::window());
        loop {
            interval.tick().await;
            limiter.cleanup_expired().await;
        }
    });

    web::serve(state, port.unwrap_or(*config::PORT)).await
}

async fn run_cli_info(url: String, json: bool) -> Result<()> {
    let url = validate_media_url(&url)?;
    let info = ytdlp::fetch_info(&DownloaderSettings::from_env(), &url).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Title:    {}", info.title.as_deref().unwrap_or("-"));
    println!("Uploader: {}", info.uploader.as_deref().unwrap_or("-"));
    if let Some(duration) = info.duration {
        let secs = duration as u64;
        println!("Duration: {}:{:02}", secs / 60, secs % 60);
    }
    let heights: Vec<String> = info.available_heights().iter().map(|h| format!("{}p", h)).collect();
    println!("Heights:  {}", if heights.is_empty() { "-".to_string() } else { heights.join(", ") });
    println!("Formats:  {}", info.formats.len());

    Ok(())
}

async fn run_cli_download(url: String, format: String, quality: Option<u32>, output: Option<String>) -> Result<()> {
    let url = validate_media_url(&url)?;
    let format: MediaFormat = format.parse()?;
    let output_dir = PathBuf::from(output.unwrap_or_else(|| ".".to_string()));

    println!("URL:    {}", url);
    println!("Format: {}", format.extension());

    let print_progress = |event: &ProgressEvent| {
        let mut line = format!("\r{:>5.1}%", event.percent);
        if let Some(size) = &event.size {
            line.push_str(&format!(" of {}", size));
        }
        if let Some(speed) = &event.speed {
            line.push_str(&format!(" at {}", speed));
        }
        if let Some(eta) = &event.eta {
            line.push_str(&format!(" ETA {}", eta));
        }
        print!("{:<60}", line);
        let _ = std::io::stdout().flush();
    };

    let file = ytdlp::download(&DownloaderSettings::from_env(), &url, format, quality, Some(&print_progress)).await?;
    println!();

    let target = output_dir.join(file.file_name());
    let size = file.size();
    let copied = match tokio::fs::create_dir_all(&output_dir).await {
        Ok(()) => tokio::fs::copy(file.path(), &target).await,
        Err(e) => Err(e),
    };
    file.discard().await;
    copied?;
    println!("Saved {} ({} bytes)", target.display(), size);

    Ok(())
}
