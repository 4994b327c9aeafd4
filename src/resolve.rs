//! Deterministic target resolution.
//!
//! [`HeuristicResolver`] is the built-in [`TargetResolver`]. It understands
//! explicit targets and falls back to the default platform for anything
//! else:
//!
//! ```text
//! github:rust-lang/rust                 → github, rust-lang/rust
//! gitlab:gnome/gtk                      → gitlab, gnome/gtk
//! bugzilla:Firefox                      → bugzilla (default instance), Firefox
//! bugzilla:kde/plasmashell              → bugzilla[kde], plasmashell
//! https://github.com/tokio-rs/tokio     → github, tokio-rs/tokio
//! https://gitlab.com/inkscape/inkscape  → gitlab, inkscape/inkscape
//! github:a/b, bugzilla:Core             → both
//! firefox crashes                       → <default platform>, firefox crashes
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Platform, TargetSpec};
use crate::traits::TargetResolver;

pub struct HeuristicResolver {
    default_platform: Platform,
    bugzilla_instances: Vec<String>,
}

impl HeuristicResolver {
    pub fn new(default_platform: Platform) -> Self {
        Self {
            default_platform,
            bugzilla_instances: Vec::new(),
        }
    }

    /// Instance names recognized in `bugzilla:<instance>/<product>`.
    pub fn with_bugzilla_instances<I, S>(mut self, instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bugzilla_instances = instances.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve without going through the async trait.
    pub fn resolve_now(&self, query: &str) -> Vec<TargetSpec> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let parts: Vec<&str> = query
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let explicit: Vec<TargetSpec> = parts.iter().filter_map(|p| self.parse_explicit(p)).collect();
        if parts.len() > 1 && explicit.len() == parts.len() {
            return explicit;
        }

        match self.parse_explicit(query) {
            Some(spec) => vec![spec],
            None => vec![TargetSpec::new(self.default_platform.as_str(), query)],
        }
    }

    fn parse_explicit(&self, part: &str) -> Option<TargetSpec> {
        if let Some(spec) = parse_forge_url(part) {
            return Some(spec);
        }

        let (prefix, rest) = part.split_once(':')?;
        let platform: Platform = prefix.parse().ok()?;
        let rest = rest.trim().trim_matches('/');
        if rest.is_empty() {
            return None;
        }

        if platform == Platform::Bugzilla {
            if let Some((instance, product)) = rest.split_once('/') {
                if self.bugzilla_instances.iter().any(|i| i == instance) && !product.is_empty() {
                    return Some(TargetSpec::new(platform.as_str(), product).with_instance(instance));
                }
            }
        }
        Some(TargetSpec::new(platform.as_str(), rest))
    }
}

/// `https://github.com/owner/repo/...` and `https://gitlab.com/group/project/-/...`.
fn parse_forge_url(s: &str) -> Option<TargetSpec> {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"))?;
    let (host, path) = rest.split_once('/')?;
    let path = path.trim_end_matches('/');

    match host {
        "github.com" | "www.github.com" => {
            let mut segments = path.split('/');
            let owner = segments.next().filter(|s| !s.is_empty())?;
            let repo = segments.next().filter(|s| !s.is_empty())?;
            let repo = repo.trim_end_matches(".git");
            Some(TargetSpec::new("github", format!("{owner}/{repo}")))
        }
        "gitlab.com" => {
            let project = path.split("/-/").next()?.trim_end_matches(".git");
            if project.contains('/') {
                Some(TargetSpec::new("gitlab", project))
            } else {
                None
            }
        }
        _ => None,
    }
}

#[async_trait]
impl TargetResolver for HeuristicResolver {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn resolve(&self, query: &str) -> Result<Vec<TargetSpec>> {
        Ok(self.resolve_now(query))
    }
}
