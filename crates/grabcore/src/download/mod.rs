//! Download management: progress parsing, progress fan-out and the yt-dlp front-end

pub mod info;
pub mod progress;
pub mod registry;
pub mod ytdlp;

// Re-exports for convenience
pub use info::{FormatInfo, MediaInfo};
pub use progress::{ProgressEvent, ProgressParser, ProgressSink};
pub use registry::{JobRegistry, JobSink, PushMessage, Subscription};
pub use ytdlp::{DownloadedFile, MediaFormat};
