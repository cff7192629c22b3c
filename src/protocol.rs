//! JSON bodies exchanged between the keyfetch server and its clients.

use serde::{Deserialize, Serialize};

/// Error body returned by every `/api` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeywordList {
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeywordQuery {
    #[serde(default)]
    pub keyword: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UrlList {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
}
