//! grabcore - download engine behind the grab web service
//!
//! This library wraps an external media downloader (yt-dlp) and turns its
//! output into structured data for the HTTP layer.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, process runner, rate limiting, validation
//! - `download`: progress parsing, job progress registry, downloader front-end

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod core;
pub mod download;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult};
pub use download::{JobRegistry, ProgressEvent, ProgressParser, ProgressSink};
