use serde::{Deserialize, Serialize};

use crate::naming::{IMAGE_NAME_PATTERN, VIDEO_NAME_PATTERN};

pub const IMAGE_EXTENSIONS: [&str; 5] = [".png", ".jpg", ".jpeg", ".heic", ".heif"];
pub const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".avi", ".mkv"];

/// A media attachment as reported by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl Attachment {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
            size: None,
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::classify(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a URL by the first known extension it contains.
    ///
    /// Matching is a substring test on the lower-cased URL, so query strings
    /// after the extension do not prevent a match. Images win over videos.
    pub fn classify(url: &str) -> Option<Self> {
        let lowered = url.to_lowercase();
        if IMAGE_EXTENSIONS.iter().any(|ext| lowered.contains(ext)) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.iter().any(|ext| lowered.contains(ext)) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// MIME top-level type used when uploading.
    pub fn as_mime_prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn name_pattern(&self) -> &'static regex::Regex {
        match self {
            MediaKind::Image => &IMAGE_NAME_PATTERN,
            MediaKind::Video => &VIDEO_NAME_PATTERN,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_mime_prefix())
    }
}
