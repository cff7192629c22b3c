//! Keyword to URL table and its lookup endpoints.

use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    sync::Arc,
};

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use color_eyre::{Result, eyre::WrapErr};

use super::AppState;
use crate::protocol::{ErrorBody, KeywordList, KeywordQuery, UrlList};

/// Known keywords and the union of every URL they resolve to
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    keywords: BTreeMap<String, Vec<String>>,
    all_urls: HashSet<String>,
}

impl KeywordTable {
    pub fn new(keywords: BTreeMap<String, Vec<String>>) -> Self {
        let all_urls = keywords.values().flatten().cloned().collect();
        Self { keywords, all_urls }
    }

    /// Read a JSON object of `keyword -> [url]` from disk
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("Failed to open keywords file {}", path.display()))?;
        let keywords: BTreeMap<String, Vec<String>> =
            serde_json::from_reader(std::io::BufReader::new(file))
                .wrap_err_with(|| format!("Failed to parse keywords file {}", path.display()))?;
        Ok(Self::new(keywords))
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords.keys().cloned().collect()
    }

    pub fn urls_for(&self, keyword: &str) -> Option<&[String]> {
        self.keywords.get(keyword).map(Vec::as_slice)
    }

    pub fn is_known_url(&self, url: &str) -> bool {
        self.all_urls.contains(url)
    }

    pub fn url_count(&self) -> usize {
        self.all_urls.len()
    }
}

pub async fn all_keywords(State(state): State<Arc<AppState>>) -> Json<KeywordList> {
    Json(KeywordList {
        keywords: state.keywords.keywords(),
    })
}

#[tracing::instrument(skip(state, body))]
pub async fn lookup(
    State(state): State<Arc<AppState>>,
    body: Result<Json<KeywordQuery>, JsonRejection>,
) -> Response {
    let keyword = match body {
        Ok(Json(KeywordQuery {
            keyword: Some(keyword),
        })) if !keyword.is_empty() => keyword,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new("Keyword not specified")),
            )
                .into_response();
        }
        Err(rejection) => {
            tracing::debug!("Rejected keyword body: {}", rejection);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new("Keyword not specified")),
            )
                .into_response();
        }
    };

    tracing::debug!("Looking up keyword '{}'", keyword);
    match state.keywords.urls_for(&keyword) {
        Some(urls) => Json(UrlList {
            urls: urls.to_vec(),
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody::new("No URLs found for this keyword")),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_table_collects_all_urls() {
        let table = KeywordTable::new(BTreeMap::from([
            ("a".to_string(), vec!["u1".to_string(), "u2".to_string()]),
            ("b".to_string(), vec!["u2".to_string(), "u3".to_string()]),
        ]));
        assert_eq!(table.url_count(), 3);
        assert!(table.is_known_url("u3"));
        assert!(!table.is_known_url("u4"));
        assert_eq!(table.urls_for("a").unwrap(), ["u1", "u2"]);
        assert!(table.urls_for("c").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"music": ["https://h/a.mp3"], "docs": ["https://h/b.pdf"]}}"#
        )
        .unwrap();

        let table = KeywordTable::load(file.path()).unwrap();
        assert_eq!(table.keywords(), vec!["docs", "music"]);
        assert!(table.is_known_url("https://h/a.mp3"));
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["not", "an", "object"]"#).unwrap();
        assert!(KeywordTable::load(file.path()).is_err());
    }
}
