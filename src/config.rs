use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{Platform, DEFAULT_MIN_IMPACT};
use crate::platform_bugzilla::BUILTIN_INSTANCES;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_min_impact")]
    pub min_impact: u8,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_platform")]
    pub default_platform: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_impact: default_min_impact(),
            max_workers: default_max_workers(),
            default_platform: default_platform(),
        }
    }
}

fn default_min_impact() -> u8 {
    DEFAULT_MIN_IMPACT
}
fn default_max_workers() -> usize {
    5
}
fn default_platform() -> String {
    "github".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    3600
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Cache directory: the configured one (with `~/` expanded), else
    /// `$XDG_CACHE_HOME/bugnosis`, else `$HOME/.cache/bugnosis`.
    pub fn resolved_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return expand_home(dir);
        }
        if let Some(xdg) = std::env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(xdg).join("bugnosis");
        }
        home_dir().join(".cache").join("bugnosis")
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub gitlab: GitLabConfig,
    #[serde(default)]
    pub bugzilla: BugzillaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_github_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitLabConfig {
    #[serde(default = "default_gitlab_instance_url")]
    pub instance_url: String,
    #[serde(default = "default_gitlab_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            instance_url: default_gitlab_instance_url(),
            token_env: default_gitlab_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gitlab_instance_url() -> String {
    "https://gitlab.com".to_string()
}
fn default_gitlab_token_env() -> String {
    "GITLAB_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BugzillaConfig {
    #[serde(default = "default_bugzilla_instance")]
    pub default_instance: String,
    #[serde(default = "default_bugzilla_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra or overriding deployments, merged over the built-in table.
    #[serde(default)]
    pub instances: BTreeMap<String, String>,
}

impl Default for BugzillaConfig {
    fn default() -> Self {
        Self {
            default_instance: default_bugzilla_instance(),
            token_env: default_bugzilla_token_env(),
            timeout_secs: default_timeout_secs(),
            instances: BTreeMap::new(),
        }
    }
}

fn default_bugzilla_instance() -> String {
    "mozilla".to_string()
}
fn default_bugzilla_token_env() -> String {
    "BUGZILLA_TOKEN".to_string()
}

impl BugzillaConfig {
    /// Built-in deployments overlaid with the configured ones.
    pub fn all_instances(&self) -> BTreeMap<String, String> {
        let mut all: BTreeMap<String, String> = BUILTIN_INSTANCES
            .iter()
            .map(|(name, url)| (name.to_string(), url.to_string()))
            .collect();
        for (name, url) in &self.instances {
            all.insert(name.clone(), url.trim_end_matches('/').to_string());
        }
        all
    }
}

/// `http://` or `https://` prefixed.
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Read a token from the environment variable `name`, ignoring blanks.
pub fn token_from_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|t| !t.trim().is_empty())
}

/// Load the config at `path`, falling back to defaults when it does not exist.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config(path)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate search
    if config.search.min_impact > 100 {
        anyhow::bail!("search.min_impact must be in [0, 100]");
    }
    if config.search.max_workers == 0 {
        anyhow::bail!("search.max_workers must be >= 1");
    }
    if config.search.default_platform.parse::<Platform>().is_err() {
        anyhow::bail!(
            "Unknown search.default_platform: '{}'. Must be one of: {}.",
            config.search.default_platform,
            Platform::known_names().join(", ")
        );
    }

    // Validate cache
    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be >= 1");
    }

    // Validate platforms
    let p = &config.platforms;
    for (name, timeout) in [
        ("github", p.github.timeout_secs),
        ("gitlab", p.gitlab.timeout_secs),
        ("bugzilla", p.bugzilla.timeout_secs),
    ] {
        if timeout == 0 {
            anyhow::bail!("platforms.{}.timeout_secs must be >= 1", name);
        }
    }
    if !is_url(&p.github.api_url) {
        anyhow::bail!("platforms.github.api_url must be an http(s) URL");
    }
    if !is_url(&p.gitlab.instance_url) {
        anyhow::bail!("platforms.gitlab.instance_url must be an http(s) URL");
    }
    for (name, url) in &p.bugzilla.instances {
        if !is_url(url) {
            anyhow::bail!("platforms.bugzilla.instances.{} must be an http(s) URL", name);
        }
    }
    let default_instance = &p.bugzilla.default_instance;
    if !is_url(default_instance) && !p.bugzilla.all_instances().contains_key(default_instance) {
        anyhow::bail!(
            "Unknown platforms.bugzilla.default_instance: '{}'",
            default_instance
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.search.min_impact, 70);
        assert_eq!(config.search.max_workers, 5);
        assert_eq!(config.search.default_platform, "github");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 3600);
        assert_eq!(config.platforms.github.api_url, "https://api.github.com");
        assert_eq!(config.platforms.gitlab.token_env, "GITLAB_TOKEN");
        assert_eq!(config.platforms.bugzilla.default_instance, "mozilla");
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
[search]
min_impact = 50

[platforms.gitlab]
instance_url = "https://gitlab.gnome.org"
"#,
        )
        .unwrap();
        assert_eq!(config.search.min_impact, 50);
        assert_eq!(config.search.max_workers, 5);
        assert_eq!(config.platforms.gitlab.instance_url, "https://gitlab.gnome.org");
        assert_eq!(config.platforms.gitlab.timeout_secs, 30);
    }

    #[test]
    fn test_bugzilla_instances_merge_over_builtins() {
        let config = parse_config(
            r#"
[platforms.bugzilla.instances]
mozilla = "https://bugzilla-dev.allizom.org/"
libreoffice = "https://bugs.documentfoundation.org"
"#,
        )
        .unwrap();
        let all = config.platforms.bugzilla.all_instances();
        assert_eq!(all["mozilla"], "https://bugzilla-dev.allizom.org");
        assert_eq!(all["libreoffice"], "https://bugs.documentfoundation.org");
        assert_eq!(all["kde"], "https://bugs.kde.org");
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn test_validation_errors() {
        let bad = [
            "[search]\nmin_impact = 101",
            "[search]\nmax_workers = 0",
            "[search]\ndefault_platform = \"jira\"",
            "[cache]\nttl_secs = 0",
            "[platforms.github]\ntimeout_secs = 0",
            "[platforms.bugzilla]\ndefault_instance = \"nowhere\"",
            "[platforms.bugzilla.instances]\nlocal = \"ftp://bugs\"",
        ];
        for content in bad {
            assert!(parse_config(content).is_err(), "accepted: {content}");
        }
    }

    #[test]
    fn test_default_instance_may_be_url() {
        let config =
            parse_config("[platforms.bugzilla]\ndefault_instance = \"https://bugs.example.org\"")
                .unwrap();
        assert_eq!(config.platforms.bugzilla.default_instance, "https://bugs.example.org");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_or_default(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(config.search.min_impact, 70);
    }

    #[test]
    fn test_load_config_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bugnosis.toml");
        std::fs::write(&path, "[search]\nmax_workers = 0\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bugnosis.toml"));
    }

    #[test]
    fn test_cache_dir_expands_home() {
        let cache = CacheConfig {
            dir: Some(PathBuf::from("/var/cache/bugnosis")),
            ..CacheConfig::default()
        };
        assert_eq!(cache.resolved_dir(), PathBuf::from("/var/cache/bugnosis"));
        assert_eq!(
            expand_home(Path::new("~/x")),
            home_dir().join("x")
        );
    }
}
