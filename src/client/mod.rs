//! Client side: keyword search, downloads and the terminal progress board.

pub mod api;
pub mod downloader;
pub mod ui;

pub use api::{ApiClient, SearchSort};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use ulid::Ulid;

use crate::{
    models::FileRecord,
    storage::{PersistError, RecordStore, Vault},
};
use downloader::{DownloadStatus, Downloader, Progress, TransferError};

/// Why a fetch produced no saved file
#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Download `url` and save it in the tier its size selects.
///
/// The final snapshot sent on `progress_tx` is either `Saved`, `SaveFailed`
/// or `TransferFailed`.
#[instrument(name = "fetch", skip_all, fields(id = %Ulid::new(), url = %url))]
pub async fn fetch_and_store<S: RecordStore, L: RecordStore>(
    downloader: &Downloader,
    vault: &Vault<S, L>,
    url: &str,
    progress_tx: mpsc::UnboundedSender<Progress>,
) -> Result<FileRecord, FetchError> {
    let download = downloader.download(url, &progress_tx).await?;
    let size = download.size();

    let (status, result): (_, Result<FileRecord, FetchError>) = match vault.persist(&download).await {
        Ok(record) => {
            info!(tier = %record.storage, "Saved");
            (DownloadStatus::Saved(record.storage), Ok(record))
        }
        Err(e) => {
            warn!(error = %e, "Payload received but not saved");
            (DownloadStatus::SaveFailed(e.source.to_string()), Err(e.into()))
        }
    };

    let _ = progress_tx.send(Progress {
        total_size: Some(size),
        downloaded: size,
        status,
    });
    result
}

/// Run every job concurrently; each reports on its own channel.
pub async fn fetch_all<S: RecordStore, L: RecordStore>(
    downloader: &Downloader,
    vault: &Vault<S, L>,
    jobs: Vec<(String, mpsc::UnboundedSender<Progress>)>,
) -> Vec<(String, Result<FileRecord, FetchError>)> {
    let tasks = jobs.into_iter().map(|(url, tx)| async move {
        let result = fetch_and_store(downloader, vault, &url, tx).await;
        (url, result)
    });
    futures::future::join_all(tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::SortKey,
        models::StorageTier,
        server::test_support::{Upstream, spawn_server, spawn_upstream},
        storage::{BlobStore, InlineStore, tests::vault},
    };
    use std::time::Duration;

    async fn setup() -> (Upstream, Downloader) {
        let upstream = spawn_upstream().await;
        let base = spawn_server(upstream.keyword_table(), Duration::from_secs(5)).await;
        (upstream, Downloader::new(ApiClient::new(base).unwrap()))
    }

    async fn last(mut rx: mpsc::UnboundedReceiver<Progress>) -> Progress {
        let mut last = None;
        while let Some(p) = rx.recv().await {
            last = Some(p);
        }
        last.unwrap()
    }

    #[tokio::test]
    async fn test_fetch_saves_and_lists() {
        let (upstream, downloader) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        let (tx, rx) = mpsc::unbounded_channel();

        let url = upstream.url("/media/cover.png");
        let record = fetch_and_store(&downloader, &vault, &url, tx).await.unwrap();
        assert_eq!(record.storage, StorageTier::Small);
        assert_eq!(record.size, upstream.cover().len() as u64);

        let progress = last(rx).await;
        assert_eq!(progress.status, DownloadStatus::Saved(StorageTier::Small));
        assert_eq!(progress.percentage(), Some(100));

        let listed = vault.catalog().list(SortKey::NameAsc).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].url, url);
        assert_eq!(listed[0].file_name, "cover.png");
    }

    #[tokio::test]
    async fn test_transfer_failure_saves_nothing() {
        let (upstream, downloader) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);
        let (tx, rx) = mpsc::unbounded_channel();

        let err = fetch_and_store(&downloader, &vault, &upstream.url("/media/missing.pdf"), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transfer(_)));
        assert!(matches!(
            last(rx).await.status,
            DownloadStatus::TransferFailed(_)
        ));
        assert!(vault.catalog().list(SortKey::NameAsc).await.is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_is_reported_separately() {
        let (upstream, downloader) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(
            InlineStore::open(dir.path().join("small.json"), 64),
            BlobStore::new("mem://", "test", "test"),
        );
        let (tx, rx) = mpsc::unbounded_channel();

        let err = fetch_and_store(&downloader, &vault, &upstream.url("/media/cover.png"), tx)
            .await
            .unwrap_err();
        match err {
            FetchError::Persist(e) => assert_eq!(e.tier, StorageTier::Small),
            other => panic!("unexpected error: {other:?}"),
        }

        let progress = last(rx).await;
        assert!(matches!(progress.status, DownloadStatus::SaveFailed(_)));
        assert!(progress.is_received());
        assert_eq!(progress.downloaded, upstream.cover().len() as u64);
    }

    #[tokio::test]
    async fn test_fetch_all_is_independent_per_url() {
        let (upstream, downloader) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(&dir);

        let urls = [
            upstream.url("/media/cover.png"),
            upstream.url("/media/missing.pdf"),
            upstream.url("/media/stream.bin"),
        ];
        let mut receivers = Vec::new();
        let jobs = urls
            .iter()
            .map(|url| {
                let (tx, rx) = mpsc::unbounded_channel();
                receivers.push(rx);
                (url.clone(), tx)
            })
            .collect();

        let results = fetch_all(&downloader, &vault, jobs).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());

        let listed = vault.catalog().list(SortKey::NameAsc).await;
        assert_eq!(listed.len(), 2);
        for rx in receivers {
            assert!(last(rx).await.is_complete());
        }
    }
}
