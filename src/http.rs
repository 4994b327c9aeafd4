//! Cached JSON reads against a tracker's REST API.
//!
//! [`HttpSource`] is the one place adapters touch the network. It owns the
//! base URL, the platform's auth header, and an optional shared
//! [`ResponseCache`]. Status handling follows one rule set for every
//! platform:
//!
//! - 2xx → parsed JSON body (cached on success)
//! - 404 → `Ok(None)`; "not found" is not an error
//! - anything else, or a transport failure → [`PlatformError::SourceUnavailable`]
//! - a 2xx body that is not JSON → [`PlatformError::MalformedResponse`]
//!
//! Timeouts come from the `reqwest::Client` handed in by the registry, which
//! builds one per platform from `[platforms.<name>].timeout_secs`.
//!
//! Cache keys carry a fingerprint of the credential, never the token itself,
//! so a response fetched with one token is not served to another. Store
//! reads and writes run on the blocking pool since [`FileStore`] does plain
//! file I/O.
//!
//! [`FileStore`]: crate::cache::FileStore

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cache::{CacheKey, ResponseCache};
use crate::error::PlatformError;

/// How a platform expects its credential to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `<header>: <token>`, e.g. `PRIVATE-TOKEN` or `X-BUGZILLA-API-KEY`.
    Header(&'static str),
}

/// Build the HTTP client shared by every adapter of one platform.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("bugnosis/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// An authenticated, optionally cached, JSON endpoint.
#[derive(Clone)]
pub struct HttpSource {
    /// Adapter name, used in errors and cache keys.
    name: String,
    base_url: String,
    client: reqwest::Client,
    auth: Option<(AuthScheme, String)>,
    headers: Vec<(&'static str, &'static str)>,
    cache: Option<Arc<ResponseCache>>,
}

impl HttpSource {
    pub fn new(name: impl Into<String>, base_url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            auth: None,
            headers: Vec::new(),
            cache: None,
        }
    }

    /// Attach a credential. A `None` or empty token sends no auth header.
    pub fn with_auth(mut self, scheme: AuthScheme, token: Option<String>) -> Self {
        self.auth = token
            .filter(|t| !t.trim().is_empty())
            .map(|t| (scheme, t));
        self
    }

    /// Add a fixed header sent with every request (e.g. `Accept`).
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResponseCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `{base_url}{path}` with `query` and return the JSON body.
    ///
    /// Returns `Ok(None)` on 404.
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, PlatformError> {
        let url = format!("{}{}", self.base_url, path);
        let key = self.cache_key(&url, query);

        if let Some(cache) = &self.cache {
            let cache = Arc::clone(cache);
            let lookup = key.clone();
            match tokio::task::spawn_blocking(move || cache.get::<Value>(&lookup)).await {
                Ok(Some(value)) => {
                    debug!(platform = %self.name, url = %url, "cache hit");
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(platform = %self.name, error = %e, "cache read task failed");
                }
            }
        }

        debug!(platform = %self.name, url = %url, "GET");
        let mut request = self.client.get(&url).query(query);
        for (name, value) in &self.headers {
            request = request.header(*name, *value);
        }
        if let Some((scheme, token)) = &self.auth {
            request = match scheme {
                AuthScheme::Bearer => request.bearer_auth(token),
                AuthScheme::Header(header) => request.header(*header, token),
            };
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::unavailable(&self.name, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(platform = %self.name, url = %url, "not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::unavailable(
                &self.name,
                format!("HTTP {} from {}: {}", status, url, truncate(&body, 200)),
            ));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::malformed(&self.name, e))?;

        if let Some(cache) = &self.cache {
            let cache = Arc::clone(cache);
            let entry = value.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || cache.set(&key, &entry)).await {
                debug!(platform = %self.name, error = %e, "cache write task failed");
            }
        }
        Ok(Some(value))
    }

    fn cache_key(&self, url: &str, query: &[(&str, String)]) -> CacheKey {
        let mut parts = Vec::with_capacity(query.len() + 3);
        parts.push(self.name.clone());
        parts.push(self.credential_id());
        parts.push(url.to_string());
        for (k, v) in query {
            parts.push(format!("{k}={v}"));
        }
        CacheKey::new(&parts)
    }

    /// `anon`, or a short SHA-256 fingerprint of the auth scheme and token.
    fn credential_id(&self) -> String {
        let Some((scheme, token)) = &self.auth else {
            return "anon".to_string();
        };
        let scheme = match scheme {
            AuthScheme::Bearer => "bearer",
            AuthScheme::Header(header) => *header,
        };
        let mut hasher = Sha256::new();
        hasher.update(scheme.as_bytes());
        hasher.update([0u8]);
        hasher.update(token.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("cred:{}", &digest[..16])
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
