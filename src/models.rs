//! Records shared by the download engine, the storage tiers and the catalog.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kind::FileKind;

/// Content type used when the proxy does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Which backend a record lives in.
///
/// The serialized names are part of the persisted record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageTier {
    /// Inline, base64 encoded, capacity-limited key/value store
    #[serde(rename = "localStorage")]
    Small,
    /// Raw binary payloads in the structured database
    #[serde(rename = "indexedDB")]
    Large,
}

impl StorageTier {
    pub fn badge(&self) -> &'static str {
        match self {
            Self::Small => "LS",
            Self::Large => "IDB",
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// A fully received payload, not yet persisted
#[derive(Debug, Clone)]
pub struct Download {
    pub url: String,
    pub file_name: String,
    pub content_type: String,
    /// Completion time of the transfer
    pub completed_at: DateTime<Utc>,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Metadata for this payload once it lands in `tier`
    pub fn record(&self, tier: StorageTier) -> FileRecord {
        FileRecord {
            url: self.url.clone(),
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size: self.size(),
            last_modified: self.completed_at,
            storage: tier,
        }
    }
}

/// Metadata of a persisted file, as it appears in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub url: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub storage: StorageTier,
}

impl FileRecord {
    pub fn kind(&self) -> FileKind {
        FileKind::from_url(&self.url)
    }
}

/// The last path segment of `url`, percent-decoded when that yields valid UTF-8.
///
/// A decoded name that is empty, contains a path separator or `..` is not a
/// plain file name; the raw segment is kept instead.
pub fn file_name_from_url(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or(url);
    match urlencoding::decode(segment) {
        Ok(decoded)
            if !decoded.is_empty()
                && !decoded.contains(['/', '\\'])
                && !decoded.contains("..") =>
        {
            decoded.into_owned()
        }
        _ => segment.to_string(),
    }
}

/// Human readable size in binary units with one decimal place.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}
