//! Search endpoint wire types and transports.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Default search endpoint, relative to the tracker base URL
pub const DEFAULT_SEARCH_PATH: &str = "/rest/api/3/search/jql";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One page request sent to the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub jql: String,
    pub fields: Vec<String>,
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    /// Offset fallback, only sent when continuing without a cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<usize>,
}

/// One page of search results. Every signal is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub issues: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_last: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Issues one search page request.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage>;
}

/// How requests authenticate against the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    /// Account email plus API token
    Basic { email: String, token: String },
    Bearer(String),
    None,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub search_path: String,
    pub auth: Auth,
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            auth: Auth::None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read `JIRA_BASE_URL`, `JIRA_EMAIL`, `JIRA_API_TOKEN`,
    /// `JIRA_SEARCH_PATH` and `JIRA_TIMEOUT_SECS`.
    ///
    /// A token without an email is sent as a bearer token.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("JIRA_BASE_URL")
            .map_err(|_| Error::Config("JIRA_BASE_URL is not set".to_string()))?;

        let mut config = ClientConfig::new(base_url);
        config.auth = match (std::env::var("JIRA_EMAIL").ok(), std::env::var("JIRA_API_TOKEN").ok()) {
            (Some(email), Some(token)) => Auth::Basic { email, token },
            (None, Some(token)) => Auth::Bearer(token),
            _ => Auth::None,
        };
        if let Ok(path) = std::env::var("JIRA_SEARCH_PATH") {
            config.search_path = path;
        }
        if let Ok(secs) = std::env::var("JIRA_TIMEOUT_SECS") {
            config.timeout_secs = secs
                .parse()
                .map_err(|_| Error::Config(format!("JIRA_TIMEOUT_SECS is not a number: {secs}")))?;
        }
        Ok(config)
    }

    pub fn search_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.search_path.trim_start_matches('/')
        )
    }
}

/// Search transport over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    client: reqwest::Client,
    url: String,
    auth: Auth,
}

impl HttpSearchClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpSearchClient {
            client,
            url: config.search_url(),
            auth: config.auth,
        })
    }
}

#[async_trait]
impl SearchTransport for HttpSearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        debug!(url = %self.url, cursor = ?request.next_page_token, "POST search");

        let builder = self.client.post(&self.url).json(request);
        let builder = match &self.auth {
            Auth::Basic { email, token } => builder.basic_auth(email, Some(token)),
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::None => builder,
        };

        let transport_error = |source| Error::Transport {
            query: request.jql.clone(),
            source,
        };

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RequestFailed {
                query: request.jql.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(transport_error)?;
        Ok(serde_json::from_str(&body)?)
    }
}

enum Reply {
    Page(SearchPage),
    Status(u16, String),
}

/// Serves pre-captured pages in order and records every request.
///
/// Used to replay saved search responses offline.
#[derive(Default)]
pub struct StaticPages {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticPages {
    pub fn new(pages: Vec<SearchPage>) -> Self {
        StaticPages {
            replies: Mutex::new(pages.into_iter().map(Reply::Page).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a non-success response after the pages already queued
    pub fn then_fail(self, status: u16, body: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Reply::Status(status, body.into()));
        self
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl SearchTransport for StaticPages {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match reply {
            Some(Reply::Page(page)) => Ok(page),
            Some(Reply::Status(status, body)) => Err(Error::RequestFailed {
                query: request.jql.clone(),
                status,
                body,
            }),
            None => Err(Error::RequestFailed {
                query: request.jql.clone(),
                status: 404,
                body: "no captured page left to replay".to_string(),
            }),
        }
    }
}
