//! yt-dlp progress parsing
//!
//! yt-dlp reports download progress on stdout as lines like
//! `[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10`, terminated by `\r`
//! (terminal redraw) or `\n` (`--newline`). Pipe reads hand us arbitrary chunks of
//! that stream, so [`ProgressParser`] buffers until a terminator arrives and only
//! ever parses complete lines.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marker yt-dlp puts in front of every download status line
pub const DOWNLOAD_MARKER: &str = "[download]";

/// Full status line: percent, total size, speed and ETA
static RICH_PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[download\]\s+(\d+(?:\.\d+)?)%\s+of\s+~?\s*(\d+(?:\.\d+)?)\s*([KMGTPE]?i?B)\s+at\s+(\d+(?:\.\d+)?)\s*([KMGTPE]?i?B/s)\s+ETA\s+(\d{1,2}:\d{2}(?::\d{2})?)",
    )
    .expect("rich progress regex")
});

/// Anything with a percentage after the marker ("Unknown speed", "in 00:03", ...)
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").expect("percent regex"));

/// One progress update for a job.
///
/// Serialized as `{"percent":23.5,"size":"10.00MiB","speed":"2.50MiB/s","eta":"00:03"}`,
/// absent fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion in percent (0-100)
    pub percent: f64,
    /// Total size as printed by yt-dlp, e.g. "10.00MiB"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Current speed, e.g. "2.50MiB/s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    /// Remaining time, `MM:SS` or `HH:MM:SS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

impl ProgressEvent {
    /// Event carrying only a percentage
    pub fn percent_only(percent: f64) -> Self {
        Self {
            percent: percent.clamp(0.0, 100.0),
            size: None,
            speed: None,
            eta: None,
        }
    }

    /// Final event published once the file is ready
    pub fn complete() -> Self {
        Self::percent_only(100.0)
    }
}

/// Receiver of progress events.
///
/// Called synchronously, in the order lines were parsed. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Outcome of parsing one complete line
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// A download status line
    Progress(ProgressEvent),
    /// Any other output (metadata JSON, destination notices, warnings)
    Other(String),
}

/// Parses a single complete line of yt-dlp output.
///
/// Returns `None` for lines without the `[download]` marker and for marker lines
/// that carry no percentage (e.g. `[download] Destination: ...`).
///
/// # Examples
///
/// ```
/// use grabcore::download::progress::parse_progress_line;
///
/// let event = parse_progress_line("[download]  23.5% of 10.00MiB at 2.50MiB/s ETA 00:03").unwrap();
/// assert_eq!(event.percent, 23.5);
/// assert_eq!(event.size.as_deref(), Some("10.00MiB"));
///
/// assert!(parse_progress_line("[info] Downloading webpage").is_none());
/// ```
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    if !line.contains(DOWNLOAD_MARKER) {
        return None;
    }

    if let Some(caps) = RICH_PROGRESS_RE.captures(line) {
        let percent = caps[1].parse::<f64>().ok()?;
        return Some(ProgressEvent {
            percent: percent.clamp(0.0, 100.0),
            size: Some(format!("{}{}", &caps[2], &caps[3])),
            speed: Some(format!("{}{}", &caps[4], &caps[5])),
            eta: Some(caps[6].to_string()),
        });
    }

    if let Some(caps) = PERCENT_RE.captures(line) {
        let percent = caps[1].parse::<f64>().ok()?;
        return Some(ProgressEvent::percent_only(percent));
    }

    log::trace!("Download line without progress: {}", line);
    None
}

/// Incremental line splitter + parser for a subprocess output stream.
///
/// Feed it raw chunks in arrival order; it returns one [`ParsedLine`] per complete
/// line. `\r`, `\n` and `\r\n` all terminate a line. The trailing fragment of a
/// chunk stays buffered until its terminator shows up. Splitting happens on bytes,
/// so multi-byte UTF-8 characters cut by a chunk boundary are reassembled intact.
///
/// Each byte is scanned once, however long a line grows before its terminator.
#[derive(Debug)]
pub struct ProgressParser {
    buffer: Vec<u8>,
    detect_progress: bool,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            detect_progress: true,
        }
    }

    /// Splitter that never recognises progress: every line comes back as
    /// [`ParsedLine::Other`], marker or not.
    pub fn lines_only() -> Self {
        Self {
            buffer: Vec::new(),
            detect_progress: false,
        }
    }

    /// Appends a chunk and returns the lines it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ParsedLine> {
        let mut parsed = Vec::new();
        let mut start = 0;

        for (idx, byte) in chunk.iter().enumerate() {
            if *byte != b'\n' && *byte != b'\r' {
                continue;
            }
            let line = if self.buffer.is_empty() {
                self.classify(&chunk[start..idx])
            } else {
                self.buffer.extend_from_slice(&chunk[start..idx]);
                let line = self.classify(&self.buffer);
                self.buffer.clear();
                line
            };
            parsed.extend(line);
            start = idx + 1;
        }

        self.buffer.extend_from_slice(&chunk[start..]);
        parsed
    }

    /// Flushes the unterminated tail once the stream has ended.
    ///
    /// At end of stream the tail is a complete line (yt-dlp may omit the final newline).
    pub fn finish(&mut self) -> Option<ParsedLine> {
        let tail = std::mem::take(&mut self.buffer);
        self.classify(&tail)
    }

    /// Bytes currently held back waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn classify(&self, raw: &[u8]) -> Option<ParsedLine> {
        if raw.is_empty() {
            return None;
        }

        let line = String::from_utf8_lossy(raw);
        if self.detect_progress {
            if let Some(event) = parse_progress_line(&line) {
                return Some(ParsedLine::Progress(event));
            }
        }
        Some(ParsedLine::Other(line.into_owned()))
    }
}
