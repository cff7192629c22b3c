//! Streaming download through the server's proxy endpoint
//!
//! Every call is a single attempt: failures are reported once and never retried.

use chrono::Utc;
use futures_util::StreamExt;
use http::StatusCode;
use reqwest::header;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, trace};

use super::models::{DownloadStatus, Progress, TransferError};
use crate::{
    client::api::{ApiClient, error_message},
    models::{DEFAULT_CONTENT_TYPE, Download, file_name_from_url},
};

pub struct Downloader {
    api: ApiClient,
}

impl Downloader {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// The proxy URL that serves `url`
    pub fn proxy_url(&self, url: &str) -> Result<reqwest::Url, TransferError> {
        let mut endpoint = self.api.endpoint("/api/download")?;
        endpoint.query_pairs_mut().append_pair("url", url);
        Ok(endpoint)
    }

    /// Download `url` through the proxy, reporting each step on `progress_tx`.
    ///
    /// The received byte count reported is non-decreasing and ends at the
    /// payload length. A failure is reported as a final `TransferFailed`
    /// snapshot before it is returned.
    #[instrument(name = "download", level = "debug", skip(self, progress_tx), fields(url = %url))]
    pub async fn download(
        &self,
        url: &str,
        progress_tx: &mpsc::UnboundedSender<Progress>,
    ) -> Result<Download, TransferError> {
        let mut progress = Progress::default();
        let _ = progress_tx.send(progress.clone());

        match self.transfer(url, &mut progress, progress_tx).await {
            Ok(download) => {
                info!(size = download.size(), "Download completed");
                Ok(download)
            }
            Err(e) => {
                error!(error = %e, "Download failed");
                let _ = progress_tx.send(Progress {
                    status: DownloadStatus::TransferFailed(e.to_string()),
                    ..progress
                });
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        url: &str,
        progress: &mut Progress,
        progress_tx: &mpsc::UnboundedSender<Progress>,
    ) -> Result<Download, TransferError> {
        let response = self
            .api
            .client()
            .get(self.proxy_url(url)?)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::GATEWAY_TIMEOUT {
            return Err(TransferError::Timeout);
        }
        if !status.is_success() {
            return Err(TransferError::Status {
                status,
                message: error_message(response).await,
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        // Get content length if declared
        progress.total_size = response.content_length();
        progress.status = DownloadStatus::Downloading;
        debug!(total_size = ?progress.total_size, %content_type, "Receiving body");

        let mut stream = response.bytes_stream();
        let mut chunks = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| TransferError::Stream {
                received: progress.downloaded,
                source,
            })?;
            progress.downloaded += chunk.len() as u64;
            trace!(downloaded = progress.downloaded, "Chunk received");
            chunks.push(chunk);

            let _ = progress_tx.send(progress.clone());
        }

        // the declared length may be missing or wrong, the received bytes are authoritative
        let bytes = chunks.concat();
        progress.status = DownloadStatus::Downloaded;
        let _ = progress_tx.send(progress.clone());

        Ok(Download {
            url: url.to_string(),
            file_name: file_name_from_url(url),
            content_type,
            completed_at: Utc::now(),
            bytes,
        })
    }
}
