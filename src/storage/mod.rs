//! Tiered persistence for downloaded files.
//!
//! Two incompatible backends sit behind the [`RecordStore`] capability:
//!
//! - [`InlineStore`]: a small, synchronous key/value store holding the payload
//!   inline as a base64 data URL next to its metadata
//! - [`BlobStore`]: a SurrealDB table holding the raw bytes, keyed by URL
//!
//! [`Vault`] picks the tier for each payload by size, once, at write time.

mod blob;
mod inline;

pub use blob::BlobStore;
pub use inline::InlineStore;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::models::{Download, FileRecord, StorageTier};

/// Payloads up to and including this many bytes are stored inline
pub const SMALL_TIER_LIMIT: u64 = 1024 * 1024;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),

    #[error("Failed to replace store file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Corrupt entry for {0}")]
    Corrupt(String),

    #[error("Store quota exceeded: {needed} characters needed, capacity is {capacity}")]
    QuotaExceeded { needed: usize, capacity: usize },

    // Mutex errors
    #[error("Mutex lock error: {0}")]
    MutexError(String),
}

impl<T> From<std::sync::PoisonError<std::sync::MutexGuard<'_, T>>> for StoreError {
    fn from(err: std::sync::PoisonError<std::sync::MutexGuard<'_, T>>) -> Self {
        StoreError::MutexError(err.to_string())
    }
}

/// A completed transfer that could not be written to its tier
#[derive(Error, Debug)]
#[error("Downloaded but not saved ({tier} tier): {source}")]
pub struct PersistError {
    pub tier: StorageTier,
    #[source]
    pub source: StoreError,
}

/// A backend able to hold file records of one tier.
pub trait RecordStore {
    /// The tier every record of this store belongs to
    const TIER: StorageTier;

    /// Write `download`, replacing any record with the same URL.
    async fn put(&self, download: &Download) -> Result<(), StoreError>;

    /// Metadata of every record in the store, without payloads.
    async fn records(&self) -> Result<Vec<FileRecord>, StoreError>;

    /// The payload stored for `url`, if any.
    async fn payload(&self, url: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete the record for `url`, returning whether one existed.
    async fn remove(&self, url: &str) -> Result<bool, StoreError>;
}

/// Size based tier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    threshold: u64,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            threshold: SMALL_TIER_LIMIT,
        }
    }
}

impl TierPolicy {
    #[cfg(test)]
    pub(crate) fn with_threshold(threshold: u64) -> Self {
        Self { threshold }
    }

    pub fn tier_for(&self, size: u64) -> StorageTier {
        if size <= self.threshold {
            StorageTier::Small
        } else {
            StorageTier::Large
        }
    }
}

/// Both storage tiers plus the policy routing between them.
pub struct Vault<S = InlineStore, L = BlobStore> {
    pub(crate) small: S,
    pub(crate) large: L,
    policy: TierPolicy,
}

impl<S: RecordStore, L: RecordStore> Vault<S, L> {
    pub fn new(small: S, large: L) -> Self {
        Self {
            small,
            large,
            policy: TierPolicy::default(),
        }
    }

    #[cfg(test)]
    pub fn with_policy(mut self, policy: TierPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Persist a completed download into the tier its size selects.
    ///
    /// A copy of the same URL left in the other tier by an earlier download
    /// is removed afterwards.
    #[instrument(level = "debug", skip(self, download), fields(url = %download.url, size = download.size()))]
    pub async fn persist(&self, download: &Download) -> Result<FileRecord, PersistError> {
        let tier = self.policy.tier_for(download.size());
        debug!(%tier, "Selected storage tier");

        let written = match tier {
            StorageTier::Small => self.small.put(download).await,
            StorageTier::Large => self.large.put(download).await,
        };
        written.map_err(|source| PersistError { tier, source })?;

        let stale = match tier {
            StorageTier::Small => self.large.remove(&download.url).await,
            StorageTier::Large => self.small.remove(&download.url).await,
        };
        match stale {
            Ok(true) => info!("Removed stale copy from the other tier"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to remove stale copy from the other tier"),
        }

        Ok(download.record(tier))
    }
}
