//! Streaming downloads with per-transfer progress reporting.

mod http;
mod models;

pub use http::Downloader;
pub use models::{DownloadStatus, Progress, TransferError};
