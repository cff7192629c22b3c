//! Keyword lookup against the server.

use clap::ValueEnum;
use http::StatusCode;
use reqwest::{
    Client, Url,
    header::{self, HeaderMap, HeaderValue},
};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    catalog::collate,
    kind::FileKind,
    protocol::{ErrorBody, KeywordList, KeywordQuery, UrlList},
};

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Enter a keyword")]
    EmptyKeyword,

    #[error("No URLs found for keyword '{0}'")]
    UnknownKeyword(String),

    #[error("Lookup rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Invalid server URL: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[clap(rename_all = "kebab-case")]
pub enum SearchSort {
    #[default]
    NameAsc,
    NameDesc,
    TypeAsc,
    TypeDesc,
}

/// Order search results by URL or by file category name. Ties keep their server order.
pub fn sort_urls(urls: &mut [String], sort: SearchSort) {
    let kind = |url: &String| FileKind::from_url(url).as_str();
    match sort {
        SearchSort::NameAsc => urls.sort_by(|a, b| collate(a, b)),
        SearchSort::NameDesc => urls.sort_by(|a, b| collate(b, a)),
        SearchSort::TypeAsc => urls.sort_by(|a, b| kind(a).cmp(kind(b))),
        SearchSort::TypeDesc => urls.sort_by(|a, b| kind(b).cmp(kind(a))),
    }
}

/// HTTP client bound to one keyfetch server
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: Url) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self { client, base })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    pub async fn all_keywords(&self) -> Result<Vec<String>, LookupError> {
        let response = self
            .client
            .get(self.endpoint("/api/all-keywords")?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Rejected {
                status,
                message: error_message(response).await,
            });
        }
        Ok(response.json::<KeywordList>().await?.keywords)
    }

    /// Resolve `keyword` into its URLs. Blank keywords never reach the network.
    #[instrument(level = "debug", skip(self))]
    pub async fn search(&self, keyword: &str) -> Result<Vec<String>, LookupError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(LookupError::EmptyKeyword);
        }

        let response = self
            .client
            .post(self.endpoint("/api/keywords")?)
            .json(&KeywordQuery {
                keyword: Some(keyword.to_string()),
            })
            .send()
            .await?;

        let status = response.status();
        debug!(%status, "Keyword lookup answered");
        match status {
            s if s.is_success() => Ok(response.json::<UrlList>().await?.urls),
            StatusCode::NOT_FOUND => Err(LookupError::UnknownKeyword(keyword.to_string())),
            status => Err(LookupError::Rejected {
                status,
                message: error_message(response).await,
            }),
        }
    }
}

/// The `error` field of a server error body, or the canonical reason.
pub async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let fallback = status.canonical_reason().unwrap_or("Unknown error").to_string();
    match response.json::<ErrorBody>().await {
        Ok(ErrorBody {
            error,
            details: Some(details),
        }) => format!("{error} ({details})"),
        Ok(ErrorBody { error, .. }) => error,
        Err(_) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{KeywordTable, test_support::spawn_server};
    use std::collections::BTreeMap;

    fn table() -> KeywordTable {
        KeywordTable::new(BTreeMap::from([
            (
                "cats".to_string(),
                vec![
                    "https://h/b.png".to_string(),
                    "https://h/a.mp3".to_string(),
                ],
            ),
            ("dogs".to_string(), vec!["https://h/d.pdf".to_string()]),
        ]))
    }

    #[test]
    fn test_sort_urls() {
        let mut urls = vec![
            "https://h/c.mp4".to_string(),
            "https://h/a.pdf".to_string(),
            "https://h/B.mp3".to_string(),
        ];
        sort_urls(&mut urls, SearchSort::NameAsc);
        assert_eq!(urls[0], "https://h/a.pdf");
        assert_eq!(urls[1], "https://h/B.mp3");

        sort_urls(&mut urls, SearchSort::TypeAsc);
        assert_eq!(urls[0], "https://h/B.mp3"); // audio
        assert_eq!(urls[2], "https://h/c.mp4"); // video

        sort_urls(&mut urls, SearchSort::TypeDesc);
        assert_eq!(urls[0], "https://h/c.mp4");
    }

    #[tokio::test]
    async fn test_empty_keyword_rejected_before_network() {
        // nothing listens on the discard port
        let api = ApiClient::new("http://127.0.0.1:9".parse().unwrap()).unwrap();
        assert!(matches!(api.search("").await, Err(LookupError::EmptyKeyword)));
        assert!(matches!(
            api.search("   ").await,
            Err(LookupError::EmptyKeyword)
        ));
    }

    #[tokio::test]
    async fn test_search_and_keywords() {
        let base = spawn_server(table(), std::time::Duration::from_secs(5)).await;
        let api = ApiClient::new(base).unwrap();

        assert_eq!(api.all_keywords().await.unwrap(), vec!["cats", "dogs"]);
        assert_eq!(
            api.search(" cats ").await.unwrap(),
            vec!["https://h/b.png", "https://h/a.mp3"]
        );
        match api.search("birds").await {
            Err(LookupError::UnknownKeyword(keyword)) => assert_eq!(keyword, "birds"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
