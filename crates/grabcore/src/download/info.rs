//! Media metadata returned by `yt-dlp -j`
//!
//! yt-dlp dumps a large JSON document per video. Only the part the web client
//! needs to pick a format is kept.

use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;

/// Summary of a media page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub formats: Vec<FormatInfo>,
}

/// One downloadable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format_id: String,
    pub ext: Option<String>,
    pub resolution: Option<String>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    /// Exact size when known, otherwise yt-dlp's estimate
    pub filesize: Option<u64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub note: Option<String>,
}

impl FormatInfo {
    pub fn has_video(&self) -> bool {
        codec_present(self.vcodec.as_deref())
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if c != "none")
}

#[derive(Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    resolution: Option<String>,
    height: Option<u32>,
    fps: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    vcodec: Option<String>,
    acodec: Option<String>,
    format_note: Option<String>,
}

impl MediaInfo {
    /// Parses the complete stdout of an info query as one JSON document.
    ///
    /// # Errors
    ///
    /// [`crate::AppError::Parse`] when the output is not a JSON object of the expected shape.
    pub fn from_ytdlp_json(raw: &str) -> AppResult<Self> {
        let info: RawInfo = serde_json::from_str(raw.trim())?;

        let formats = info
            .formats
            .into_iter()
            .filter_map(|f| {
                // Storyboards and manifests without an id are useless to the client
                let format_id = f.format_id?;
                Some(FormatInfo {
                    format_id,
                    ext: f.ext,
                    resolution: f.resolution,
                    height: f.height,
                    fps: f.fps,
                    filesize: f.filesize.or(f.filesize_approx).map(|s| s as u64),
                    vcodec: f.vcodec,
                    acodec: f.acodec,
                    note: f.format_note,
                })
            })
            .filter(|f| f.ext.as_deref() != Some("mhtml"))
            .collect();

        Ok(Self {
            id: info.id,
            title: info.title,
            uploader: info.uploader,
            duration: info.duration,
            thumbnail: info.thumbnail,
            webpage_url: info.webpage_url,
            formats,
        })
    }

    /// Distinct video heights, highest first
    pub fn available_heights(&self) -> Vec<u32> {
        let mut heights: Vec<u32> = self
            .formats
            .iter()
            .filter(|f| f.has_video())
            .filter_map(|f| f.height)
            .collect();
        heights.sort_unstable_by(|a, b| b.cmp(a));
        heights.dedup();
        heights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppError;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "uploader": "Rick Astley",
        "duration": 212.0,
        "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
        "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "filesize": 3433244, "format_note": "medium"},
            {"format_id": "137", "ext": "mp4", "height": 1080, "fps": 25, "vcodec": "avc1.640028", "acodec": "none", "filesize_approx": 80000000.0, "resolution": "1920x1080"},
            {"format_id": "22", "ext": "mp4", "height": 720, "vcodec": "avc1.64001F", "acodec": "mp4a.40.2"},
            {"format_id": "136", "ext": "mp4", "height": 720, "vcodec": "avc1.4d401f", "acodec": "none"},
            {"ext": "mp4"}
        ],
        "extra_field_we_ignore": {"nested": true}
    }"#;

    #[test]
    fn test_parse_sample() {
        let info = MediaInfo::from_ytdlp_json(SAMPLE).unwrap();
        assert_eq!(info.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(info.duration, Some(212.0));

        let ids: Vec<&str> = info.formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, vec!["140", "137", "22", "136"]);

        let hd = &info.formats[1];
        assert_eq!(hd.filesize, Some(80_000_000));
        assert!(hd.has_video());
        assert_eq!(hd.acodec.as_deref(), Some("none"));
        assert_eq!(info.formats[0].note.as_deref(), Some("medium"));
    }

    #[test]
    fn test_available_heights() {
        let info = MediaInfo::from_ytdlp_json(SAMPLE).unwrap();
        assert_eq!(info.available_heights(), vec![1080, 720]);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = MediaInfo::from_ytdlp_json("WARNING: something\n").unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_missing_formats_is_ok() {
        let info = MediaInfo::from_ytdlp_json(r#"{"id": "x", "title": "Direct file"}"#).unwrap();
        assert!(info.formats.is_empty());
    }
}
