//! Coarse content categories derived from a resource URL.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Audio,
    Video,
    Pdf,
    Image,
    Other,
}

impl FileKind {
    /// Classify a URL by the text after its final `.`, ignoring case.
    pub fn from_url(url: &str) -> Self {
        let Some((_, ext)) = url.rsplit_once('.') else {
            return Self::Other;
        };

        match ext.to_ascii_lowercase().as_str() {
            "mp3" | "wav" | "ogg" => Self::Audio,
            "mp4" | "mov" | "avi" => Self::Video,
            "pdf" => Self::Pdf,
            "jpg" | "jpeg" | "png" | "gif" | "webp" => Self::Image,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Other => "other",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Audio => "🎵",
            Self::Video => "🎬",
            Self::Pdf => "📕",
            Self::Image => "🖼",
            Self::Other => "📄",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(FileKind::from_url("https://a.b/song.mp3"), FileKind::Audio);
        assert_eq!(FileKind::from_url("https://a.b/clip.MOV"), FileKind::Video);
        assert_eq!(FileKind::from_url("https://a.b/paper.Pdf"), FileKind::Pdf);
        assert_eq!(FileKind::from_url("https://a.b/cat.webp"), FileKind::Image);
        assert_eq!(FileKind::from_url("https://a.b/cat.jpeg"), FileKind::Image);
    }

    #[test]
    fn test_unknown_or_missing_extension() {
        assert_eq!(FileKind::from_url("https://a.b/archive.zip"), FileKind::Other);
        assert_eq!(FileKind::from_url("https://example.com/file"), FileKind::Other);
        assert_eq!(FileKind::from_url("no-dot-at-all"), FileKind::Other);
        assert_eq!(FileKind::from_url(""), FileKind::Other);
        // query strings are part of the extension
        assert_eq!(FileKind::from_url("https://a.b/x.mp3?dl=1"), FileKind::Other);
    }

    #[test]
    fn test_category_names_sort_alphabetically() {
        let mut kinds = vec![FileKind::Video, FileKind::Audio, FileKind::Pdf];
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![FileKind::Audio, FileKind::Pdf, FileKind::Video]);
    }
}
