//! Platform registry: the immutable table adapters are built from.
//!
//! [`PlatformRegistry::from_config`] reads `[platforms.*]` and `[cache]`
//! once, builds one HTTP client per platform and opens the shared response
//! cache. After that the registry is read-only and is shared across
//! federated-search tasks behind an `Arc`.
//!
//! [`PlatformRegistry::build`] turns a [`Target`] into a
//! [`PlatformAdapter`], the closed set of adapters:
//!
//! ```text
//! github              → GitHubAdapter    (api_url or instance URL)
//! gitlab              → GitLabAdapter    (instance_url or instance URL)
//! bugzilla[instance]  → BugzillaAdapter  (instance table or URL)
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{FileStore, MemoryStore, ResponseCache};
use crate::config::{is_url, token_from_env, CacheConfig, Config};
use crate::error::PlatformError;
use crate::http::{build_client, AuthScheme, HttpSource};
use crate::models::{Bug, BugQuery, Platform, Target};
use crate::platform_bugzilla::{BugzillaAdapter, CUSTOM_INSTANCE};
use crate::platform_github::GitHubAdapter;
use crate::platform_gitlab::GitLabAdapter;
use crate::traits::BugPlatform;

// ═══════════════════════════════════════════════════════════════════════
// Adapter Union
// ═══════════════════════════════════════════════════════════════════════

/// A constructed adapter for one target.
pub enum PlatformAdapter {
    GitHub(GitHubAdapter),
    GitLab(GitLabAdapter),
    Bugzilla(BugzillaAdapter),
}

impl PlatformAdapter {
    pub fn platform(&self) -> Platform {
        match self {
            Self::GitHub(a) => a.platform(),
            Self::GitLab(a) => a.platform(),
            Self::Bugzilla(a) => a.platform(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::GitHub(a) => a.name(),
            Self::GitLab(a) => a.name(),
            Self::Bugzilla(a) => a.name(),
        }
    }

    pub async fn search_bugs(
        &self,
        project: &str,
        query: &BugQuery,
    ) -> Result<Vec<Bug>, PlatformError> {
        match self {
            Self::GitHub(a) => a.search_bugs(project, query).await,
            Self::GitLab(a) => a.search_bugs(project, query).await,
            Self::Bugzilla(a) => a.search_bugs(project, query).await,
        }
    }

    pub async fn get_bug(&self, project: &str, issue_id: u64) -> Result<Option<Bug>, PlatformError> {
        match self {
            Self::GitHub(a) => a.get_bug(project, issue_id).await,
            Self::GitLab(a) => a.get_bug(project, issue_id).await,
            Self::Bugzilla(a) => a.get_bug(project, issue_id).await,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Credential and client shared by every adapter of one platform.
struct Endpoint {
    token: Option<String>,
    client: reqwest::Client,
}

impl Endpoint {
    fn new(token_env: &str, timeout_secs: u64) -> Result<Self> {
        let client = build_client(Duration::from_secs(timeout_secs))
            .context("Failed to build HTTP client")?;
        Ok(Self {
            token: token_from_env(token_env),
            client,
        })
    }
}

/// Immutable configuration table for every supported platform.
pub struct PlatformRegistry {
    github: Endpoint,
    github_url: String,
    gitlab: Endpoint,
    gitlab_url: String,
    bugzilla: Endpoint,
    bugzilla_default: String,
    bugzilla_instances: BTreeMap<String, String>,
    cache: Option<Arc<ResponseCache>>,
}

impl PlatformRegistry {
    pub fn from_config(config: &Config) -> Result<Self> {
        let p = &config.platforms;
        let registry = Self {
            github: Endpoint::new(&p.github.token_env, p.github.timeout_secs)?,
            github_url: p.github.api_url.trim_end_matches('/').to_string(),
            gitlab: Endpoint::new(&p.gitlab.token_env, p.gitlab.timeout_secs)?,
            gitlab_url: p.gitlab.instance_url.trim_end_matches('/').to_string(),
            bugzilla: Endpoint::new(&p.bugzilla.token_env, p.bugzilla.timeout_secs)?,
            bugzilla_default: p.bugzilla.default_instance.clone(),
            bugzilla_instances: p.bugzilla.all_instances(),
            cache: None,
        };

        let cache = if config.cache.enabled {
            match open_cache(&config.cache) {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "on-disk cache unavailable, caching in memory");
                    Some(Arc::new(ResponseCache::new(
                        Box::new(MemoryStore::new()),
                        config.cache.ttl(),
                    )))
                }
            }
        } else {
            None
        };

        Ok(registry.with_cache(cache))
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResponseCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    /// API base URL of GitHub or GitLab; the default instance URL for Bugzilla.
    pub fn base_url(&self, platform: Platform) -> String {
        match platform {
            Platform::GitHub => self.github_url.clone(),
            Platform::GitLab => self.gitlab_url.clone(),
            Platform::Bugzilla => self
                .resolve_bugzilla(None)
                .map(|(_, url)| url)
                .unwrap_or_default(),
        }
    }

    pub fn has_token(&self, platform: Platform) -> bool {
        match platform {
            Platform::GitHub => self.github.token.is_some(),
            Platform::GitLab => self.gitlab.token.is_some(),
            Platform::Bugzilla => self.bugzilla.token.is_some(),
        }
    }

    pub fn bugzilla_instances(&self) -> &BTreeMap<String, String> {
        &self.bugzilla_instances
    }

    pub fn default_bugzilla_instance(&self) -> &str {
        &self.bugzilla_default
    }

    /// Map a Bugzilla instance (name, URL, or `None` for the default) to
    /// `(instance name, instance URL)`.
    pub fn resolve_bugzilla(&self, instance: Option<&str>) -> Result<(String, String), PlatformError> {
        let wanted = instance.unwrap_or(self.bugzilla_default.as_str());
        if let Some(url) = self.bugzilla_instances.get(wanted) {
            return Ok((wanted.to_string(), url.clone()));
        }
        if is_url(wanted) {
            return Ok((
                CUSTOM_INSTANCE.to_string(),
                wanted.trim_end_matches('/').to_string(),
            ));
        }
        Err(PlatformError::UnknownInstance {
            name: wanted.to_string(),
            known: self.bugzilla_instances.keys().cloned().collect(),
        })
    }

    /// Construct the adapter for `target`.
    ///
    /// Only instance lookup can fail here; no network I/O happens.
    pub fn build(&self, target: &Target) -> Result<PlatformAdapter, PlatformError> {
        let instance = target.instance.as_deref();
        let adapter = match target.platform {
            Platform::GitHub => {
                let base = url_override(instance)?.unwrap_or(self.github_url.as_str());
                let http = self
                    .source("github", base, &self.github)
                    .with_auth(AuthScheme::Bearer, self.github.token.clone())
                    .with_header("Accept", "application/vnd.github+json");
                PlatformAdapter::GitHub(GitHubAdapter::new(http))
            }
            Platform::GitLab => {
                let custom = url_override(instance)?;
                let root = custom.unwrap_or(self.gitlab_url.as_str());
                let http = self
                    .source(
                        "gitlab",
                        &format!("{}/api/v4", root.trim_end_matches('/')),
                        &self.gitlab,
                    )
                    .with_auth(
                        AuthScheme::Header("PRIVATE-TOKEN"),
                        self.gitlab.token.clone(),
                    );
                PlatformAdapter::GitLab(
                    GitLabAdapter::new(http).with_instance(custom.map(str::to_string)),
                )
            }
            Platform::Bugzilla => {
                let (name, url) = self.resolve_bugzilla(instance)?;
                let http = self
                    .source(&format!("bugzilla-{name}"), &format!("{url}/rest"), &self.bugzilla)
                    .with_auth(
                        AuthScheme::Header("X-BUGZILLA-API-KEY"),
                        self.bugzilla.token.clone(),
                    );
                PlatformAdapter::Bugzilla(BugzillaAdapter::new(http, &name, &url))
            }
        };
        debug!(spec = %target, adapter = adapter.name(), "built adapter");
        Ok(adapter)
    }

    fn source(&self, name: &str, base_url: &str, endpoint: &Endpoint) -> HttpSource {
        HttpSource::new(name, base_url, endpoint.client.clone()).with_cache(self.cache.clone())
    }
}

/// GitHub and GitLab accept only URL instances (self-hosted deployments).
fn url_override(instance: Option<&str>) -> Result<Option<&str>, PlatformError> {
    match instance {
        None => Ok(None),
        Some(url) if is_url(url) => Ok(Some(url)),
        Some(other) => Err(PlatformError::UnknownInstance {
            name: other.to_string(),
            known: Vec::new(),
        }),
    }
}

/// Open the on-disk response cache described by `[cache]`.
pub fn open_cache(config: &CacheConfig) -> Result<ResponseCache> {
    let dir = config.resolved_dir();
    let store = FileStore::open(&dir)
        .with_context(|| format!("Failed to open cache directory: {}", dir.display()))?;
    Ok(ResponseCache::new(Box::new(store), config.ttl()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    fn registry(extra: &str) -> PlatformRegistry {
        let config = parse_config(&format!(
            "[cache]\nenabled = false\n\n[platforms.bugzilla]\ntoken_env = \"BUGNOSIS_TEST_UNSET_TOKEN\"\n{extra}"
        ))
        .unwrap();
        PlatformRegistry::from_config(&config).unwrap()
    }

    #[test]
    fn test_builds_each_platform() {
        let reg = registry("");
        let gh = reg.build(&Target::new(Platform::GitHub, "o/r")).unwrap();
        assert_eq!(gh.platform(), Platform::GitHub);
        assert_eq!(gh.name(), "github");

        let gl = reg.build(&Target::new(Platform::GitLab, "g/p")).unwrap();
        assert_eq!(gl.name(), "gitlab");

        let bz = reg.build(&Target::new(Platform::Bugzilla, "Firefox")).unwrap();
        assert_eq!(bz.name(), "bugzilla-mozilla");
    }

    #[test]
    fn test_bugzilla_instance_resolution() {
        let reg = registry("");
        let mut target = Target::new(Platform::Bugzilla, "plasmashell");
        target.instance = Some("kde".into());
        assert_eq!(reg.build(&target).unwrap().name(), "bugzilla-kde");

        target.instance = Some("https://bugs.example.org/".into());
        assert_eq!(reg.build(&target).unwrap().name(), "bugzilla-custom");
        assert_eq!(
            reg.resolve_bugzilla(Some("https://bugs.example.org/")).unwrap().1,
            "https://bugs.example.org"
        );

        target.instance = Some("nowhere".into());
        match reg.build(&target) {
            Err(PlatformError::UnknownInstance { name, known }) => {
                assert_eq!(name, "nowhere");
                assert!(known.contains(&"mozilla".to_string()));
            }
            _ => panic!("expected UnknownInstance"),
        }
    }

    #[test]
    fn test_configured_default_instance() {
        let reg = registry("default_instance = \"gnome\"\n");
        assert_eq!(reg.default_bugzilla_instance(), "gnome");
        assert_eq!(reg.base_url(Platform::Bugzilla), "https://bugzilla.gnome.org");
        let bz = reg.build(&Target::new(Platform::Bugzilla, "gtk")).unwrap();
        assert_eq!(bz.name(), "bugzilla-gnome");
    }

    #[test]
    fn test_github_rejects_named_instance() {
        let reg = registry("");
        let mut target = Target::new(Platform::GitHub, "o/r");
        target.instance = Some("enterprise".into());
        assert!(matches!(
            reg.build(&target),
            Err(PlatformError::UnknownInstance { .. })
        ));
        target.instance = Some("https://ghe.example.com/api/v3".into());
        assert!(reg.build(&target).is_ok());
    }

    #[test]
    fn test_missing_token_env_means_no_token() {
        let reg = registry("");
        assert!(!reg.has_token(Platform::Bugzilla));
        assert!(reg.cache().is_none());
    }

    #[test]
    fn test_cache_opened_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let config = parse_config(&format!(
            "[cache]\ndir = \"{}\"\nttl_secs = 60\n",
            tmp.path().join("cache").display()
        ))
        .unwrap();
        let reg = PlatformRegistry::from_config(&config).unwrap();
        let cache = reg.cache().unwrap();
        assert_eq!(cache.ttl(), Duration::from_secs(60));
        assert!(tmp.path().join("cache").is_dir());
    }
}
