//! Small tier: a capacity-limited key/value store of JSON strings.
//!
//! Every entry is keyed `file_<base64(url)>` and holds the record metadata plus
//! the payload as a base64 data URL. The whole map lives in one JSON file that
//! is read on first access and atomically replaced on every write.
//!
//! The tier is synchronous: every operation touches the file directly and
//! returns before its `async fn` wrapper first yields. Its capacity keeps each
//! read and write small, so the blocking time stays bounded.

use std::{
    collections::BTreeMap,
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
    sync::Mutex,
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{RecordStore, StoreError};
use crate::models::{Download, FileRecord, StorageTier};

pub const KEY_PREFIX: &str = "file_";

/// Persisted shape of one small-tier entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineEntry {
    url: String,
    file_name: String,
    content_type: String,
    size: u64,
    last_modified: DateTime<Utc>,
    data: String,
    storage: StorageTier,
}

impl InlineEntry {
    fn into_record(self) -> FileRecord {
        FileRecord {
            url: self.url,
            file_name: self.file_name,
            content_type: self.content_type,
            size: self.size,
            last_modified: self.last_modified,
            storage: StorageTier::Small,
        }
    }
}

pub fn entry_key(url: &str) -> String {
    format!("{KEY_PREFIX}{}", BASE64.encode(url))
}

pub fn to_data_url(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{content_type};base64,{}", BASE64.encode(bytes))
}

/// Decode the payload of a base64 data URL.
pub fn from_data_url(data_url: &str) -> Option<Vec<u8>> {
    let (_, encoded) = data_url.split_once(',')?;
    BASE64.decode(encoded).ok()
}

#[derive(Debug)]
pub struct InlineStore {
    path: PathBuf,
    capacity: usize,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl InlineStore {
    /// Open the store backed by the file at `path`. Nothing is read until first access.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
            entries: Mutex::new(None),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Small store file does not exist yet");
            return Ok(BTreeMap::new());
        }
        let file = std::fs::File::open(&self.path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, entries)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }

    /// Run `f` against the in-memory map, loading it on first use.
    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.entries.lock()?;
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        let entries = guard.get_or_insert_with(BTreeMap::new);
        f(entries)
    }

    fn used(entries: &BTreeMap<String, String>) -> usize {
        entries
            .iter()
            .map(|(k, v)| k.chars().count() + v.chars().count())
            .sum()
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entries(|entries| Ok(entries.get(key).cloned()))
    }

    /// Store `value` under `key`, failing without side effects when the capacity would be exceeded.
    pub fn set_item(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            let previous = entries
                .get(key)
                .map(|v| key.chars().count() + v.chars().count())
                .unwrap_or(0);
            let needed = Self::used(entries) - previous + key.chars().count() + value.chars().count();
            if needed > self.capacity {
                return Err(StoreError::QuotaExceeded {
                    needed,
                    capacity: self.capacity,
                });
            }

            let old = entries.insert(key.to_string(), value);
            if let Err(e) = self.flush(entries) {
                // keep memory in line with what is on disk
                match old {
                    Some(old) => entries.insert(key.to_string(), old),
                    None => entries.remove(key),
                };
                return Err(e);
            }
            Ok(())
        })
    }

    pub fn remove_item(&self, key: &str) -> Result<bool, StoreError> {
        self.with_entries(|entries| match entries.remove(key) {
            Some(old) => {
                if let Err(e) = self.flush(entries) {
                    entries.insert(key.to_string(), old);
                    return Err(e);
                }
                Ok(true)
            }
            None => Ok(false),
        })
    }

    #[cfg(test)]
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.with_entries(|entries| Ok(entries.keys().cloned().collect()))
    }

    fn entry(&self, url: &str) -> Result<Option<InlineEntry>, StoreError> {
        match self.get_item(&entry_key(url))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

impl RecordStore for InlineStore {
    const TIER: StorageTier = StorageTier::Small;

    async fn put(&self, download: &Download) -> Result<(), StoreError> {
        let entry = InlineEntry {
            url: download.url.clone(),
            file_name: download.file_name.clone(),
            content_type: download.content_type.clone(),
            size: download.size(),
            last_modified: download.completed_at,
            data: to_data_url(&download.content_type, &download.bytes),
            storage: Self::TIER,
        };
        let value = serde_json::to_string(&entry)?;
        self.set_item(&entry_key(&download.url), value)?;
        trace!(url = %download.url, "Stored inline entry");
        Ok(())
    }

    async fn records(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.with_entries(|entries| {
            let records = entries
                .iter()
                .filter(|(key, _)| key.starts_with(KEY_PREFIX))
                .filter_map(|(key, raw)| match serde_json::from_str::<InlineEntry>(raw) {
                    Ok(entry) => Some(entry.into_record()),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Skipping corrupt small-tier entry");
                        None
                    }
                })
                .collect();
            Ok(records)
        })
    }

    async fn payload(&self, url: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(entry) = self.entry(url)? else {
            return Ok(None);
        };
        match from_data_url(&entry.data) {
            Some(bytes) => Ok(Some(bytes)),
            None => Err(StoreError::Corrupt(url.to_string())),
        }
    }

    async fn remove(&self, url: &str) -> Result<bool, StoreError> {
        self.remove_item(&entry_key(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::download;

    fn store(dir: &tempfile::TempDir, capacity: usize) -> InlineStore {
        InlineStore::open(dir.path().join("nested").join("small.json"), capacity)
    }

    #[test]
    fn test_entry_key_is_reversible() {
        let url = "https://host/a b/c?d=e&f=g";
        let key = entry_key(url);
        assert!(key.starts_with("file_"));
        let decoded = BASE64.decode(&key[KEY_PREFIX.len()..]).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), url);
    }

    #[test]
    fn test_data_url_round_trip() {
        let bytes = vec![0u8, 1, 2, 254, 255];
        let data_url = to_data_url("image/png", &bytes);
        assert!(data_url.starts_with("data:image/png;base64,"));
        assert_eq!(from_data_url(&data_url).unwrap(), bytes);
        assert!(from_data_url("not a data url").is_none());
    }

    #[tokio::test]
    async fn test_put_payload_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1024 * 1024);
        let dl = download("https://host/pic.png", b"\x89PNG\r\n".to_vec());

        store.put(&dl).await.unwrap();
        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_name, "pic.png");
        assert_eq!(records[0].size, 6);
        assert_eq!(records[0].storage, StorageTier::Small);

        assert_eq!(store.payload(&dl.url).await.unwrap().unwrap(), dl.bytes);
        assert!(store.remove(&dl.url).await.unwrap());
        assert!(!store.remove(&dl.url).await.unwrap());
        assert!(store.payload(&dl.url).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let dl = download("https://host/doc.pdf", b"%PDF-1.7".to_vec());
        store(&dir, 4096).put(&dl).await.unwrap();

        let reopened = store(&dir, 4096);
        let records = reopened.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, dl.url);
        assert_eq!(records[0].last_modified, dl.completed_at);
    }

    #[tokio::test]
    async fn test_quota_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let small = store(&dir, 300);
        small
            .put(&download("https://host/a.txt", b"a".to_vec()))
            .await
            .unwrap();

        let err = small
            .put(&download("https://host/b.txt", vec![b'b'; 400]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { capacity: 300, .. }));
        assert_eq!(small.records().await.unwrap().len(), 1);
        assert_eq!(store(&dir, 300).keys().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_and_foreign_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 4096);
        store
            .put(&download("https://host/ok.mp3", b"ID3".to_vec()))
            .await
            .unwrap();
        store
            .set_item(&entry_key("https://host/bad"), "{not json".to_string())
            .unwrap();
        store
            .set_item("theme", "\"dark\"".to_string())
            .unwrap();

        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://host/ok.mp3");
        assert_eq!(store.keys().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 4096);
        let url = "https://host/notes.txt";
        store.put(&download(url, b"first".to_vec())).await.unwrap();
        store
            .put(&download(url, b"second version".to_vec()))
            .await
            .unwrap();

        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size, 14);
        assert_eq!(
            store.payload(url).await.unwrap().unwrap(),
            b"second version".to_vec()
        );
    }
}
