//! Large tier: raw payloads in a SurrealDB table keyed by URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{Surreal, engine::any::Any};
use tokio::sync::OnceCell;
use tracing::{info, instrument, trace};

use super::{RecordStore, StoreError};
use crate::models::{Download, FileRecord, StorageTier};

const TABLE_NAME: &str = "files";

/// Persisted shape of one large-tier record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobEntry {
    url: String,
    file_name: String,
    content_type: String,
    size: u64,
    last_modified: DateTime<Utc>,
    #[serde(with = "serde_bytes")]
    blob: Vec<u8>,
    storage: StorageTier,
}

/// Handle on the large tier.
///
/// The database connection is opened once, on first access, and shared by
/// every operation afterwards.
#[derive(Debug)]
pub struct BlobStore {
    database_url: String,
    namespace: String,
    database: String,
    db: OnceCell<Surreal<Any>>,
}

impl BlobStore {
    pub fn new(
        database_url: impl Into<String>,
        namespace: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            namespace: namespace.into(),
            database: database.into(),
            db: OnceCell::new(),
        }
    }

    #[instrument(level = "debug", skip(self), fields(database_url = %self.database_url))]
    async fn connection(&self) -> Result<&Surreal<Any>, StoreError> {
        self.db
            .get_or_try_init(|| async {
                info!("Connecting to database at {}", self.database_url);
                let db = surrealdb::engine::any::connect(self.database_url.as_str()).await?;

                info!(
                    "Using namespace '{}' and database '{}'",
                    self.namespace, self.database
                );
                db.use_ns(self.namespace.as_str())
                    .use_db(self.database.as_str())
                    .await?;
                Ok::<_, StoreError>(db)
            })
            .await
    }
}

impl RecordStore for BlobStore {
    const TIER: StorageTier = StorageTier::Large;

    #[instrument(level = "debug", skip(self, download), fields(url = %download.url))]
    async fn put(&self, download: &Download) -> Result<(), StoreError> {
        let db = self.connection().await?;
        let entry = BlobEntry {
            url: download.url.clone(),
            file_name: download.file_name.clone(),
            content_type: download.content_type.clone(),
            size: download.size(),
            last_modified: download.completed_at,
            blob: download.bytes.clone(),
            storage: Self::TIER,
        };
        // Resolves once the write transaction has committed.
        let _: Option<FileRecord> = db
            .upsert((TABLE_NAME, download.url.as_str()))
            .content(entry)
            .await?;
        trace!("Stored blob record");
        Ok(())
    }

    async fn records(&self) -> Result<Vec<FileRecord>, StoreError> {
        let db = self.connection().await?;
        let mut response = db
            .query(
                "SELECT url, fileName, contentType, size, lastModified, storage FROM type::table($table)",
            )
            .bind(("table", TABLE_NAME))
            .await?;
        let records: Vec<FileRecord> = response.take(0)?;
        Ok(records
            .into_iter()
            .map(|record| FileRecord {
                storage: Self::TIER,
                ..record
            })
            .collect())
    }

    async fn payload(&self, url: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.connection().await?;
        let entry: Option<BlobEntry> = db.select((TABLE_NAME, url)).await?;
        Ok(entry.map(|e| e.blob))
    }

    async fn remove(&self, url: &str) -> Result<bool, StoreError> {
        let db = self.connection().await?;
        let removed: Option<FileRecord> = db.delete((TABLE_NAME, url)).await?;
        Ok(removed.is_some())
    }
}
