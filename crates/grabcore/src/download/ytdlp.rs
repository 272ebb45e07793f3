//! yt-dlp front-end: argument building, info queries and monitored downloads
//!
//! Transcoding is never spawned directly; yt-dlp drives ffmpeg itself through
//! `--merge-output-format` / `--extract-audio`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tempfile::TempDir;
use url::Url;

use crate::core::config::{self, DownloaderSettings};
use crate::core::error::{AppError, AppResult};
use crate::core::process::{self, ProcessInvocation, RunMode};
use crate::core::validation::ValidationError;
use crate::download::info::MediaInfo;
use crate::download::progress::ProgressSink;

/// Output template inside the work directory; title is cut to 100 bytes
const OUTPUT_TEMPLATE: &str = "%(title).100B.%(ext)s";

/// Leftovers yt-dlp may leave next to the final file
const INTERMEDIATE_EXTENSIONS: &[&str] = &["part", "ytdl", "temp", "tmp"];

/// Container the client asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// Video + audio merged into mp4
    Mp4,
    /// Audio only, transcoded to mp3
    Mp3,
}

impl MediaFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mp3 => "mp3",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "video/mp4",
            MediaFormat::Mp3 => "audio/mpeg",
        }
    }
}

impl FromStr for MediaFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" | "video" => Ok(MediaFormat::Mp4),
            "mp3" | "audio" => Ok(MediaFormat::Mp3),
            other => Err(ValidationError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// yt-dlp `-f` selector for the requested format and optional max height
pub fn format_selector(format: MediaFormat, max_height: Option<u32>) -> String {
    match format {
        MediaFormat::Mp4 => {
            let height = max_height.map(|h| format!("[height<={}]", h)).unwrap_or_default();
            format!(
                "bestvideo[ext=mp4]{h}+bestaudio[ext=m4a]/best[ext=mp4]{h}/best",
                h = height
            )
        }
        MediaFormat::Mp3 => "bestaudio/best".to_string(),
    }
}

/// Arguments for a metadata query
pub fn info_args(url: &Url) -> Vec<String> {
    vec!["-j".to_string(), "--no-playlist".to_string(), url.to_string()]
}

/// Arguments for a download into `workdir`
pub fn download_args(
    settings: &DownloaderSettings,
    url: &Url,
    format: MediaFormat,
    max_height: Option<u32>,
    workdir: &Path,
) -> Vec<String> {
    let template = workdir.join(OUTPUT_TEMPLATE);
    let mut args = vec![
        "-o".to_string(),
        template.to_string_lossy().into_owned(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
        url.to_string(),
        "-f".to_string(),
        format_selector(format, max_height),
    ];

    match format {
        MediaFormat::Mp4 => {
            args.extend(["--merge-output-format", "mp4"].map(String::from));
        }
        MediaFormat::Mp3 => {
            args.extend(["-x", "--audio-format", "mp3", "--audio-quality", "0"].map(String::from));
        }
    }

    if let Some(ffmpeg) = &settings.ffmpeg_location {
        args.push("--ffmpeg-location".to_string());
        args.push(ffmpeg.clone());
    }

    args
}

/// Splits `YTDL_BIN` into program and leading arguments (`python3 -m yt_dlp`)
fn invocation(settings: &DownloaderSettings, args: Vec<String>) -> AppResult<ProcessInvocation> {
    let mut parts = settings.ytdl_bin.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| AppError::Anyhow(anyhow::anyhow!("YTDL_BIN is empty")))?;
    let full_args: Vec<String> = parts.map(String::from).chain(args).collect();

    Ok(ProcessInvocation::new(program, full_args)
        .timeout(settings.timeout)
        .max_output_bytes(settings.max_output_bytes))
}

/// Runs an info query and parses the result.
pub async fn fetch_info(settings: &DownloaderSettings, url: &Url) -> AppResult<MediaInfo> {
    log::info!("Fetching media info for {}", url);
    let inv = invocation(settings, info_args(url))?.mode(RunMode::InfoQuery);
    let stdout = process::run(&inv, None).await?;
    MediaInfo::from_ytdlp_json(&stdout)
}

/// A finished download and the scoped directory holding it.
///
/// Dropping the value deletes the directory together with the file. Inside the
/// runtime prefer [`DownloadedFile::discard`] or [`DownloadedFile::release`], which
/// keep the recursive removal off the async worker threads.
#[derive(Debug)]
pub struct DownloadedFile {
    path: PathBuf,
    size: u64,
    format: MediaFormat,
    workdir: TempDir,
}

impl DownloadedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// File name as produced by yt-dlp
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("download.{}", self.format.extension()))
    }

    /// Removes the work directory on the blocking pool and waits for it.
    pub async fn discard(self) {
        remove_workdir(self.workdir).await;
    }

    /// Hands the work directory to the blocking pool without waiting.
    ///
    /// For `Drop` impls, which cannot await. Outside a runtime the directory is
    /// removed inline.
    pub fn release(self) {
        let workdir = self.workdir;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || close_workdir(workdir));
            }
            Err(_) => close_workdir(workdir),
        }
    }
}

fn close_workdir(workdir: TempDir) {
    let path = workdir.path().to_path_buf();
    if let Err(e) = workdir.close() {
        log::warn!("Failed to remove work dir {}: {}", path.display(), e);
    }
}

async fn remove_workdir(workdir: TempDir) {
    if let Err(e) = tokio::task::spawn_blocking(move || close_workdir(workdir)).await {
        log::warn!("Work dir removal task failed: {}", e);
    }
}

/// Runs filesystem work on the blocking pool
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Anyhow(e.into()))?
}

/// Creates the unique work directory for one download.
pub fn create_workdir(root: &Path) -> AppResult<TempDir> {
    fs::create_dir_all(root)?;
    let dir = tempfile::Builder::new()
        .prefix(config::download::WORKDIR_PREFIX)
        .tempdir_in(root)?;
    Ok(dir)
}

/// Downloads `url` as `format` into a fresh work directory.
///
/// Progress goes to `sink`. On any failure the work directory is removed before
/// the error is returned; on success its ownership moves into [`DownloadedFile`].
pub async fn download(
    settings: &DownloaderSettings,
    url: &Url,
    format: MediaFormat,
    max_height: Option<u32>,
    sink: Option<&dyn ProgressSink>,
) -> AppResult<DownloadedFile> {
    let root = settings.temp_dir.clone();
    let workdir = blocking(move || create_workdir(&root)).await?;
    log::info!(
        "Downloading {} as {} into {}",
        url,
        format.extension(),
        workdir.path().display()
    );

    match run_download(settings, url, format, max_height, workdir.path(), sink).await {
        Ok((path, size)) => {
            log::info!("Download finished: {} ({} bytes)", path.display(), size);
            Ok(DownloadedFile {
                path,
                size,
                format,
                workdir,
            })
        }
        Err(e) => {
            remove_workdir(workdir).await;
            Err(e)
        }
    }
}

async fn run_download(
    settings: &DownloaderSettings,
    url: &Url,
    format: MediaFormat,
    max_height: Option<u32>,
    workdir: &Path,
    sink: Option<&dyn ProgressSink>,
) -> AppResult<(PathBuf, u64)> {
    let args = download_args(settings, url, format, max_height, workdir);
    let inv = invocation(settings, args)?
        .working_dir(workdir)
        .mode(RunMode::MonitoredDownload);

    process::run(&inv, sink).await?;

    let dir = workdir.to_path_buf();
    blocking(move || {
        let path = find_output_file(&dir, format)?;
        let size = fs::metadata(&path)?.len();
        Ok((path, size))
    })
    .await
}

fn is_intermediate(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if INTERMEDIATE_EXTENSIONS.contains(&ext) {
        return true;
    }
    // "title.f137.mp4" style per-stream files left before merging
    path.file_stem()
        .and_then(|s| Path::new(s).extension())
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.len() > 1 && e.starts_with('f') && e[1..].chars().all(|c| c.is_ascii_digit()))
}

/// Picks the single result file from a work directory.
///
/// Prefers a file with the requested extension, then the largest remaining file.
pub fn find_output_file(dir: &Path, format: MediaFormat) -> AppResult<PathBuf> {
    let mut candidates: Vec<(PathBuf, u64)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_file() && !is_intermediate(&path) {
            candidates.push((path, meta.len()));
        }
    }

    if candidates.is_empty() {
        log::error!("No output file found in {}", dir.display());
        return Err(AppError::EmptyResult(format!(
            "no file produced in {}",
            dir.display()
        )));
    }

    let wanted = format.extension();
    candidates.sort_by(|(a_path, a_size), (b_path, b_size)| {
        let a_match = a_path.extension().and_then(|e| e.to_str()) == Some(wanted);
        let b_match = b_path.extension().and_then(|e| e.to_str()) == Some(wanted);
        b_match.cmp(&a_match).then(b_size.cmp(a_size))
    });

    if candidates.len() > 1 {
        log::warn!(
            "{} files in {}, using {}",
            candidates.len(),
            dir.display(),
            candidates[0].0.display()
        );
    }

    Ok(candidates.swap_remove(0).0)
}

/// Removes work directories older than `max_age` left behind by a crash.
///
/// Returns the number of directories removed.
pub fn cleanup_stale_workdirs(root: &Path, max_age: Duration) -> usize {
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(config::download::WORKDIR_PREFIX) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let age = meta.modified().ok().and_then(|m| m.elapsed().ok());
        if meta.is_dir() && age.is_some_and(|age| age > max_age) {
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to remove stale work dir {}: {}", entry.path().display(), e),
            }
        }
    }

    if removed > 0 {
        log::info!("Removed {} stale work directories from {}", removed, root.display());
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::ProcessError;
    use crate::download::progress::ProgressEvent;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn settings(ytdl_bin: &str, temp_dir: &Path) -> DownloaderSettings {
        DownloaderSettings {
            ytdl_bin: ytdl_bin.to_string(),
            ffmpeg_location: None,
            temp_dir: temp_dir.to_path_buf(),
            timeout: Duration::from_secs(20),
            max_output_bytes: 64 * 1024,
        }
    }

    /// Writes a fake downloader script, run through `sh <script>`
    fn fake_ytdlp(dir: &Path, body: &str) -> String {
        let script = dir.join("fake-ytdlp.sh");
        fs::write(&script, body).unwrap();
        format!("sh {}", script.display())
    }

    fn url() -> Url {
        Url::parse("https://example.com/watch?v=abc").unwrap()
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("mp4".parse::<MediaFormat>().unwrap(), MediaFormat::Mp4);
        assert_eq!("Audio".parse::<MediaFormat>().unwrap(), MediaFormat::Mp3);
        assert!("webm".parse::<MediaFormat>().is_err());
        assert_eq!(MediaFormat::Mp3.mime(), "audio/mpeg");
    }

    #[test]
    fn test_format_selector() {
        assert_eq!(
            format_selector(MediaFormat::Mp4, Some(1080)),
            "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4][height<=1080]/best"
        );
        assert_eq!(
            format_selector(MediaFormat::Mp4, None),
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"
        );
        assert_eq!(format_selector(MediaFormat::Mp3, Some(720)), "bestaudio/best");
    }

    #[test]
    fn test_info_args() {
        assert_eq!(info_args(&url()), vec!["-j", "--no-playlist", "https://example.com/watch?v=abc"]);
    }

    #[test]
    fn test_download_args_audio() {
        let mut s = settings("yt-dlp", Path::new("/tmp"));
        s.ffmpeg_location = Some("/opt/ffmpeg/bin".into());
        let args = download_args(&s, &url(), MediaFormat::Mp3, None, Path::new("/work"));

        assert_eq!(args[0], "-o");
        assert_eq!(args[1], "/work/%(title).100B.%(ext)s");
        assert_eq!(&args[2..5], ["--no-playlist", "--newline", "https://example.com/watch?v=abc"]);
        assert_eq!(&args[5..7], ["-f", "bestaudio/best"]);
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["--ffmpeg-location", "/opt/ffmpeg/bin"]));
    }

    #[test]
    fn test_download_args_video_merges_mp4() {
        let s = settings("yt-dlp", Path::new("/tmp"));
        let args = download_args(&s, &url(), MediaFormat::Mp4, Some(720), Path::new("/work"));
        assert!(args.windows(2).any(|w| w == ["--merge-output-format", "mp4"]));
        assert!(!args.iter().any(|a| a == "--ffmpeg-location"));
    }

    #[test]
    fn test_find_output_file_skips_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.f137.mp4"), vec![0u8; 50]).unwrap();
        fs::write(dir.path().join("clip.mp4.part"), vec![0u8; 500]).unwrap();
        fs::write(dir.path().join("clip.mp4"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("clip.webm"), vec![0u8; 100]).unwrap();

        let found = find_output_file(dir.path(), MediaFormat::Mp4).unwrap();
        assert_eq!(found.file_name().unwrap(), "clip.mp4");
    }

    #[test]
    fn test_find_output_file_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_output_file(dir.path(), MediaFormat::Mp3).unwrap_err();
        assert!(matches!(err, AppError::EmptyResult(_)));
    }

    #[test]
    fn test_cleanup_stale_workdirs() {
        let root = tempfile::tempdir().unwrap();
        let stale = root.path().join("grab-left-over");
        fs::create_dir(&stale).unwrap();
        fs::create_dir(root.path().join("unrelated")).unwrap();

        // Nothing is older than an hour yet
        assert_eq!(cleanup_stale_workdirs(root.path(), Duration::from_secs(3600)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cleanup_stale_workdirs(root.path(), Duration::from_millis(1)), 1);
        assert!(!stale.exists());
        assert!(root.path().join("unrelated").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_info_parses_json() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(
            dir.path(),
            r#"echo '{"id":"abc","title":"Clip","formats":[{"format_id":"18","ext":"mp4","height":360,"vcodec":"avc1","acodec":"mp4a"}]}'"#,
        );
        let info = fetch_info(&settings(&bin, dir.path()), &url()).await.unwrap();
        assert_eq!(info.title.as_deref(), Some("Clip"));
        assert_eq!(info.formats.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_info_garbage_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(dir.path(), "echo 'definitely not json'");
        let err = fetch_info(&settings(&bin, dir.path()), &url()).await.unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_reports_progress_and_returns_file() {
        let root = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(
            root.path(),
            r#"out="$2"
printf '[download]  50.0%% of 1.00KiB at 1.00KiB/s ETA 00:01\n'
printf 'hello' > "$(dirname "$out")/My Clip.mp3"
printf '[download] 100%% of 1.00KiB in 00:01\n'
"#,
        );
        let workroot = root.path().join("work");
        let seen = Mutex::new(Vec::new());
        let sink = |e: &ProgressEvent| seen.lock().unwrap().push(e.percent);

        let file = download(&settings(&bin, &workroot), &url(), MediaFormat::Mp3, None, Some(&sink))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![50.0, 100.0]);
        assert_eq!(file.file_name(), "My Clip.mp3");
        assert_eq!(file.size(), 5);

        let workdir = file.workdir().to_path_buf();
        assert!(workdir.starts_with(&workroot));
        file.discard().await;
        assert!(!workdir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_released_file_is_removed_in_background() {
        let root = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(root.path(), r#"out="$2"; printf 'x' > "$(dirname "$out")/a.mp4""#);
        let file = download(&settings(&bin, &root.path().join("work")), &url(), MediaFormat::Mp4, None, None)
            .await
            .unwrap();

        let workdir = file.workdir().to_path_buf();
        file.release();
        for _ in 0..200 {
            if !workdir.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} still exists", workdir.display());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_info_keeps_marker_in_title() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(
            dir.path(),
            r#"echo '{"id":"abc","title":"[download] 100% free tutorial","formats":[]}'"#,
        );
        let info = fetch_info(&settings(&bin, dir.path()), &url()).await.unwrap();
        assert_eq!(info.title.as_deref(), Some("[download] 100% free tutorial"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_failure_removes_workdir() {
        let root = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(
            root.path(),
            "out=\"$2\"; printf 'partial' > \"$(dirname \"$out\")/x.mp4.part\"; echo 'ERROR: 403' >&2; exit 1",
        );
        let workroot = root.path().join("work");

        let err = download(&settings(&bin, &workroot), &url(), MediaFormat::Mp4, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Process(ProcessError::Failed { .. })));
        assert_eq!(fs::read_dir(&workroot).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_without_output_is_empty_result() {
        let root = tempfile::tempdir().unwrap();
        let bin = fake_ytdlp(root.path(), "exit 0");
        let workroot = root.path().join("work");

        let err = download(&settings(&bin, &workroot), &url(), MediaFormat::Mp4, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyResult(_)));
        assert_eq!(fs::read_dir(&workroot).unwrap().count(), 0);
    }
}
