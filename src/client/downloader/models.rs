//! Data structures for the download engine
//!
//! Progress snapshots, status values and the transfer error type.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::models::{StorageTier, format_size};

/// Assumed payload size used to estimate progress when the total is unknown
pub const UNKNOWN_TOTAL_ESTIMATE: u64 = 5_000_000;

/// Estimated progress never climbs past this until the transfer completes
pub const UNKNOWN_TOTAL_CAP: f64 = 95.0;

/// Status of a download
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    /// Request sent, no bytes received yet
    #[default]
    Preparing,
    /// Body is streaming in
    Downloading,
    /// Payload fully received, not yet saved
    Downloaded,
    /// Payload saved to the given tier
    Saved(StorageTier),
    /// The transfer itself failed
    TransferFailed(String),
    /// The payload arrived but could not be saved
    SaveFailed(String),
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preparing => write!(f, "Preparing..."),
            Self::Downloading => write!(f, "Downloading..."),
            Self::Downloaded => write!(f, "Downloaded"),
            Self::Saved(tier) => write!(f, "Saved! [{}]", tier.badge()),
            Self::TransferFailed(err) => write!(f, "Error: {}", err),
            Self::SaveFailed(err) => write!(f, "Not saved: {}", err),
        }
    }
}

/// Represents the progress of a download
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Progress {
    /// Total size of the download in bytes (if declared)
    pub total_size: Option<u64>,
    /// Number of bytes received so far
    pub downloaded: u64,
    /// Status of the download
    pub status: DownloadStatus,
}

impl Progress {
    /// Calculate the download progress as a whole percentage
    ///
    /// Returns None if the total size is unknown
    pub fn percentage(&self) -> Option<u8> {
        match self.total_size {
            Some(0) => Some(100),
            Some(total) => {
                let pct = (self.downloaded as f64 / total as f64 * 100.0).round();
                Some(pct.min(100.0) as u8)
            }
            None => None,
        }
    }

    /// Fill of a progress bar in percent.
    ///
    /// Without a declared total this is an estimate against
    /// [`UNKNOWN_TOTAL_ESTIMATE`], held below [`UNKNOWN_TOTAL_CAP`] until the
    /// payload has been received.
    pub fn bar_percent(&self) -> f64 {
        if self.is_received() {
            return 100.0;
        }
        match self.percentage() {
            Some(pct) => pct as f64,
            None => (self.downloaded as f64 / UNKNOWN_TOTAL_ESTIMATE as f64 * 100.0)
                .min(UNKNOWN_TOTAL_CAP),
        }
    }

    pub fn downloaded_display(&self) -> String {
        format_size(self.downloaded)
    }

    pub fn total_display(&self) -> Option<String> {
        self.total_size.map(format_size)
    }

    /// Whether the whole payload has arrived
    pub fn is_received(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::Downloaded | DownloadStatus::Saved(_) | DownloadStatus::SaveFailed(_)
        )
    }

    /// Check if the download is over (either successfully or with failure)
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::Saved(_)
                | DownloadStatus::TransferFailed(_)
                | DownloadStatus::SaveFailed(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Server: {}: {message}", .status.as_u16())]
    Status { status: StatusCode, message: String },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Invalid server URL: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Download failed after {received} bytes: {source}")]
    Stream {
        received: u64,
        #[source]
        source: reqwest::Error,
    },
}
