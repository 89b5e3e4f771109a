//! Base URL, credentials and shared HTTP helpers for the REST adapters.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};

const DEFAULT_USER_AGENT: &str = "column-settings/0.1";

/// Location and credentials of the hosted database.
#[derive(Clone)]
pub struct RestEndpoint {
    base_url: Url,
    api_key: String,
    access_token: Option<String>,
}

impl std::fmt::Debug for RestEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestEndpoint")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RestEndpoint {
    /// Describe an endpoint reachable at `base_url` using the public `api_key`.
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            access_token: None,
        }
    }

    /// Attach the signed-in user's access token.
    pub fn with_access_token(mut self, access_token: Option<String>) -> Self {
        self.access_token = access_token.filter(|token| !token.trim().is_empty());
        self
    }

    /// Whether a user access token is configured.
    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Resolve `path` (relative, no leading slash) against the base URL.
    ///
    /// A missing trailing slash on the base URL is tolerated so that
    /// `https://host/project` and `https://host/project/` behave the same.
    pub(super) fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
    }

    /// Add the `apikey` and bearer headers. The bearer is the access token
    /// when present, otherwise the API key.
    pub(super) fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request
            .header("apikey", self.api_key.as_str())
            .bearer_auth(bearer)
    }

    pub(super) fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

/// Build a reqwest client with an explicit request timeout.
pub(super) fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(DEFAULT_USER_AGENT)
        .build()
}

/// Single-line, length-capped rendering of a response body for error text.
pub(super) fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

/// `status N` or `status N: <preview>`.
pub(super) fn status_message(status: u16, body: &[u8]) -> String {
    let preview = body_preview(body);
    if preview.is_empty() {
        format!("status {status}")
    } else {
        format!("status {status}: {preview}")
    }
}
