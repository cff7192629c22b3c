//! Unified, sortable view over both storage tiers.

use std::{
    cmp::Ordering,
    collections::HashMap,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    models::{FileRecord, StorageTier},
    storage::{RecordStore, StoreError, Vault},
};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No saved file for {0}")]
    NotFound(String),

    #[error("Failed to read the {tier} tier: {source}")]
    Store {
        tier: StorageTier,
        #[source]
        source: StoreError,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[clap(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    NameAsc,
    NameDesc,
    DateAsc,
    DateDesc,
}

/// Case-insensitive ordering first, raw code points as tie-break.
pub fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub fn sort_records(records: &mut [FileRecord], key: SortKey) {
    match key {
        SortKey::NameAsc => records.sort_by(|a, b| collate(&a.file_name, &b.file_name)),
        SortKey::NameDesc => records.sort_by(|a, b| collate(&b.file_name, &a.file_name)),
        SortKey::DateAsc => records.sort_by_key(|r| r.last_modified),
        SortKey::DateDesc => records.sort_by(|a, b| b.last_modified.cmp(&a.last_modified)),
    }
}

/// How a payload should be presented, chosen by content type prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Image,
    Audio,
    Video,
    /// Hand the raw bytes over as they are
    Raw,
}

impl Presentation {
    pub fn for_content_type(content_type: &str) -> Self {
        if content_type.starts_with("image/") {
            Self::Image
        } else if content_type.starts_with("audio/") {
            Self::Audio
        } else if content_type.starts_with("video/") {
            Self::Video
        } else {
            Self::Raw
        }
    }
}

/// A saved file materialized for display
#[derive(Debug, Clone)]
pub struct Rendered {
    pub record: FileRecord,
    pub bytes: Vec<u8>,
    pub presentation: Presentation,
}

impl Rendered {
    /// Where the payload lands inside `dir`. Only the final component of the
    /// file name is used, so the path never leaves `dir`.
    pub fn output_path(&self, dir: &Path) -> PathBuf {
        let name = Path::new(&self.record.file_name)
            .file_name()
            .unwrap_or_else(|| "download".as_ref());
        dir.join(name)
    }
}

pub struct Catalog<'a, S, L> {
    vault: &'a Vault<S, L>,
}

impl<S: RecordStore, L: RecordStore> Vault<S, L> {
    pub fn catalog(&self) -> Catalog<'_, S, L> {
        Catalog { vault: self }
    }
}

impl<S: RecordStore, L: RecordStore> Catalog<'_, S, L> {
    /// Every saved file across both tiers, sorted by `key`.
    ///
    /// A tier that cannot be read contributes nothing instead of failing the listing.
    #[instrument(level = "debug", skip(self))]
    pub async fn list(&self, key: SortKey) -> Vec<FileRecord> {
        let small = self.vault.small.records().await.unwrap_or_else(|e| {
            warn!(error = %e, "Small tier unreadable, listing without it");
            Vec::new()
        });
        let large = self.vault.large.records().await.unwrap_or_else(|e| {
            warn!(error = %e, "Large tier unreadable, listing without it");
            Vec::new()
        });
        debug!(small = small.len(), large = large.len(), "Read both tiers");

        // a URL lives in one tier only; should a stale copy remain, the newest wins
        let mut by_url: HashMap<String, FileRecord> = HashMap::new();
        for record in small.into_iter().chain(large) {
            match by_url.get(&record.url) {
                Some(existing) if existing.last_modified >= record.last_modified => {}
                _ => {
                    by_url.insert(record.url.clone(), record);
                }
            }
        }

        let mut records: Vec<FileRecord> = by_url.into_values().collect();
        // stable base order before the requested sort
        records.sort_by(|a, b| a.url.cmp(&b.url));
        sort_records(&mut records, key);
        records
    }

    /// The newest record saved for `url`.
    ///
    /// When no tier holds it and a tier could not be read, that read failure
    /// is returned instead of `NotFound`.
    #[instrument(level = "debug", skip(self))]
    pub async fn find(&self, url: &str) -> Result<FileRecord, CatalogError> {
        let tiers = [
            (StorageTier::Small, self.vault.small.records().await),
            (StorageTier::Large, self.vault.large.records().await),
        ];

        let mut found: Option<FileRecord> = None;
        let mut failure = None;
        for (tier, result) in tiers {
            match result {
                Ok(records) => {
                    for record in records.into_iter().filter(|r| r.url == url) {
                        if found
                            .as_ref()
                            .is_none_or(|f| f.last_modified < record.last_modified)
                        {
                            found = Some(record);
                        }
                    }
                }
                Err(source) => {
                    warn!(%tier, error = %source, "Tier unreadable while looking up record");
                    failure.get_or_insert(CatalogError::Store { tier, source });
                }
            }
        }

        match (found, failure) {
            (Some(record), _) => Ok(record),
            (None, Some(err)) => Err(err),
            (None, None) => Err(CatalogError::NotFound(url.to_string())),
        }
    }

    /// Fetch the payload of `record` back from the tier it was saved in.
    #[instrument(level = "debug", skip(self, record), fields(url = %record.url, tier = %record.storage))]
    pub async fn view(&self, record: &FileRecord) -> Result<Rendered, CatalogError> {
        let payload = match record.storage {
            StorageTier::Small => self.vault.small.payload(&record.url).await,
            StorageTier::Large => self.vault.large.payload(&record.url).await,
        }
        .map_err(|source| CatalogError::Store {
            tier: record.storage,
            source,
        })?;

        let bytes = payload.ok_or_else(|| CatalogError::NotFound(record.url.clone()))?;
        Ok(Rendered {
            record: record.clone(),
            presentation: Presentation::for_content_type(&record.content_type),
            bytes,
        })
    }

    /// Delete `record` from its tier once `confirm` agrees.
    ///
    /// Returns `false` when confirmation was refused and nothing was touched.
    #[instrument(level = "debug", skip(self, record, confirm), fields(url = %record.url, tier = %record.storage))]
    pub async fn delete(
        &self,
        record: &FileRecord,
        confirm: impl FnOnce(&FileRecord) -> bool,
    ) -> Result<bool, CatalogError> {
        if !confirm(record) {
            debug!("Deletion not confirmed");
            return Ok(false);
        }

        let removed = match record.storage {
            StorageTier::Small => self.vault.small.remove(&record.url).await,
            StorageTier::Large => self.vault.large.remove(&record.url).await,
        }
        .map_err(|source| CatalogError::Store {
            tier: record.storage,
            source,
        })?;

        if !removed {
            return Err(CatalogError::NotFound(record.url.clone()));
        }
        info!("Deleted saved file");
        Ok(true)
    }
}
