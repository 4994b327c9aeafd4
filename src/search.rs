//! Federated search: one query, many trackers, one ranked list.
//!
//! A search runs in three phases:
//!
//! 1. **Resolve.** The [`TargetResolver`] maps the query to targets. An
//!    error or an empty answer falls back to `{default platform, query}`.
//!    Every target must name a known platform, otherwise the search fails
//!    before anything is dispatched.
//! 2. **Fan out.** Each target becomes one task in a `JoinSet`; a semaphore
//!    caps how many run at once (`search.max_workers`). A task builds its
//!    own adapter, so a bad Bugzilla instance only fails that target.
//! 3. **Merge.** After every task has finished, successful results are
//!    concatenated in target order and stably sorted by impact. Failed
//!    targets contribute nothing and are reported in
//!    [`FederatedResults::failures`].
//!
//! Each call is independent; no state survives between searches.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::PlatformError;
use crate::models::{sort_by_impact, Bug, BugQuery, Platform, ScoringMode, Severity, Target, TargetSpec};
use crate::registry::PlatformRegistry;
use crate::resolve::HeuristicResolver;
use crate::stats::BugStats;
use crate::traits::TargetResolver;

pub const DEFAULT_MAX_WORKERS: usize = 5;

/// A target whose search failed, with the cause.
#[derive(Debug, Clone, Serialize)]
pub struct TargetFailure {
    pub target: Target,
    pub error: String,
}

/// Merged outcome of one federated search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FederatedResults {
    /// All surviving bugs, impact descending.
    pub results: Vec<Bug>,
    /// Bugs per platform, counting successful targets only.
    pub per_platform_counts: BTreeMap<Platform, usize>,
    pub targets_scanned: Vec<Target>,
    pub failures: Vec<TargetFailure>,
}

impl FederatedResults {
    pub fn total(&self) -> usize {
        self.results.len()
    }
}

/// Concurrent search across every target a query resolves to.
pub struct FederatedSearch {
    registry: Arc<PlatformRegistry>,
    resolver: Arc<dyn TargetResolver>,
    query: BugQuery,
    max_workers: usize,
    default_platform: Platform,
}

impl FederatedSearch {
    pub fn new(registry: Arc<PlatformRegistry>, resolver: Arc<dyn TargetResolver>) -> Self {
        Self {
            registry,
            resolver,
            query: BugQuery::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            default_platform: Platform::GitHub,
        }
    }

    /// Search settings from `[search]`, with the heuristic resolver.
    pub fn from_config(config: &Config, registry: Arc<PlatformRegistry>) -> Result<Self> {
        let default_platform: Platform = config
            .search
            .default_platform
            .parse()
            .context("Invalid search.default_platform")?;
        let resolver = HeuristicResolver::new(default_platform)
            .with_bugzilla_instances(registry.bugzilla_instances().keys().cloned());
        Ok(Self::new(registry, Arc::new(resolver))
            .with_min_impact(config.search.min_impact)
            .with_max_workers(config.search.max_workers)
            .with_default_platform(default_platform))
    }

    pub fn with_min_impact(mut self, min_impact: u8) -> Self {
        self.query.min_impact = min_impact;
        self
    }

    pub fn with_mode(mut self, mode: ScoringMode) -> Self {
        self.query.mode = mode;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_default_platform(mut self, platform: Platform) -> Self {
        self.default_platform = platform;
        self
    }

    /// Resolve `query` into validated targets.
    ///
    /// Fails with [`PlatformError::UnknownPlatform`] if any target names an
    /// unsupported platform.
    pub async fn resolve_targets(&self, query: &str) -> Result<Vec<Target>, PlatformError> {
        let query = query.trim();
        let fallback = || vec![TargetSpec::new(self.default_platform.as_str(), query)];

        let specs = match self.resolver.resolve(query).await {
            Ok(specs) if !specs.is_empty() => specs,
            Ok(_) => {
                debug!(resolver = self.resolver.name(), "no targets resolved, using default platform");
                fallback()
            }
            Err(e) => {
                warn!(
                    resolver = self.resolver.name(),
                    error = %format!("{e:#}"),
                    "target resolution failed, using default platform"
                );
                fallback()
            }
        };

        specs.into_iter().map(Target::try_from).collect()
    }

    pub async fn search(&self, query: &str) -> Result<FederatedResults, PlatformError> {
        if query.trim().is_empty() {
            return Ok(FederatedResults::default());
        }
        let targets = self.resolve_targets(query).await?;
        Ok(self.search_targets(targets).await)
    }

    /// Fan out over already-resolved targets.
    pub async fn search_targets(&self, targets: Vec<Target>) -> FederatedResults {
        let registry = Arc::clone(&self.registry);
        let query = self.query.clone();
        self.fan_out(targets, move |target| {
            let registry = Arc::clone(&registry);
            let query = query.clone();
            async move { search_target(&registry, &target, &query).await }
        })
        .await
    }

    /// Run `unit` once per target, at most `max_workers` at a time, and merge.
    ///
    /// A unit that errors or panics becomes a [`TargetFailure`]; its siblings
    /// still merge.
    async fn fan_out<F, Fut>(&self, targets: Vec<Target>, unit: F) -> FederatedResults
    where
        F: Fn(Target) -> Fut,
        Fut: Future<Output = Result<Vec<Bug>, PlatformError>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut units = JoinSet::new();
        let mut unit_index = HashMap::new();

        for (idx, target) in targets.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let work = unit(target.clone());
            let handle = units.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                work.await
            });
            unit_index.insert(handle.id(), idx);
        }

        let mut outcomes: Vec<Option<Result<Vec<Bug>, String>>> =
            (0..targets.len()).map(|_| None).collect();
        while let Some(joined) = units.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome.map_err(|e| e.to_string())),
                Err(e) => (e.id(), Err(format!("search task failed: {e}"))),
            };
            if let Some(&idx) = unit_index.get(&id) {
                outcomes[idx] = Some(outcome);
            }
        }

        let mut merged = FederatedResults {
            targets_scanned: targets.clone(),
            ..FederatedResults::default()
        };
        for (target, outcome) in targets.into_iter().zip(outcomes) {
            match outcome.unwrap_or_else(|| Err("search task did not report".to_string())) {
                Ok(bugs) => {
                    *merged.per_platform_counts.entry(target.platform).or_insert(0) += bugs.len();
                    merged.results.extend(bugs);
                }
                Err(error) => {
                    warn!(
                        platform = %target.platform,
                        project = %target.project,
                        instance = ?target.instance,
                        error = %error,
                        "target search failed"
                    );
                    merged.failures.push(TargetFailure { target, error });
                }
            }
        }
        sort_by_impact(&mut merged.results);

        info!(
            targets = merged.targets_scanned.len(),
            results = merged.total(),
            failures = merged.failures.len(),
            "federated search complete"
        );
        merged
    }
}

async fn search_target(
    registry: &PlatformRegistry,
    target: &Target,
    query: &BugQuery,
) -> Result<Vec<Bug>, PlatformError> {
    let adapter = registry.build(target)?;
    debug!(adapter = adapter.name(), project = %target.project, "searching");
    adapter.search_bugs(&target.project, query).await
}

// ═══════════════════════════════════════════════════════════════════════
// CLI Commands
// ═══════════════════════════════════════════════════════════════════════

/// Flags shared by `search` and `scan`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub min_impact: Option<u8>,
    pub novice: bool,
    pub json: bool,
    pub limit: Option<usize>,
    pub stats: bool,
}

impl SearchOptions {
    /// Reject flag values no command can honor.
    pub fn validate(&self) -> Result<()> {
        if let Some(min) = self.min_impact {
            if min > 100 {
                anyhow::bail!("--min-impact must be in [0, 100], got {min}");
            }
        }
        Ok(())
    }

    fn mode(&self) -> ScoringMode {
        if self.novice {
            ScoringMode::Novice
        } else {
            ScoringMode::Normal
        }
    }
}

/// `bugnosis search <query>`: federated search across resolved targets.
pub async fn run_search(config: &Config, query: &str, opts: &SearchOptions) -> Result<()> {
    opts.validate()?;
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let registry = Arc::new(PlatformRegistry::from_config(config)?);
    let mut search = FederatedSearch::from_config(config, registry)?.with_mode(opts.mode());
    if let Some(min) = opts.min_impact {
        search = search.with_min_impact(min);
    }

    let mut outcome = search.search(query).await?;
    if let Some(limit) = opts.limit {
        outcome.results.truncate(limit);
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    for failure in &outcome.failures {
        eprintln!("warning: {} failed: {}", failure.target, failure.error);
    }
    print_bugs(&outcome.results);
    if !outcome.results.is_empty() {
        let counts: Vec<String> = outcome
            .per_platform_counts
            .iter()
            .map(|(platform, n)| format!("{platform}: {n}"))
            .collect();
        println!(
            "{} bugs from {} targets ({})",
            outcome.total(),
            outcome.targets_scanned.len(),
            counts.join(", ")
        );
    }
    if opts.stats {
        BugStats::from_bugs(&outcome.results).print_summary();
    }
    Ok(())
}

/// `bugnosis scan <platform> <project>`: search a single target.
pub async fn run_scan(
    config: &Config,
    platform: &str,
    project: &str,
    instance: Option<String>,
    labels: Vec<String>,
    severity: Option<Severity>,
    opts: &SearchOptions,
) -> Result<()> {
    opts.validate()?;
    let registry = PlatformRegistry::from_config(config)?;
    let target = Target::try_from(TargetSpec {
        platform: platform.to_string(),
        target: project.to_string(),
        instance,
    })?;
    let adapter = registry.build(&target)?;

    let query = BugQuery {
        min_impact: opts.min_impact.unwrap_or(config.search.min_impact),
        labels,
        severity,
        mode: opts.mode(),
    };
    let mut bugs = adapter.search_bugs(&target.project, &query).await?;
    if let Some(limit) = opts.limit {
        bugs.truncate(limit);
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&bugs)?);
        return Ok(());
    }
    print_bugs(&bugs);
    if opts.stats {
        BugStats::from_bugs(&bugs).print_summary();
    }
    Ok(())
}

/// Print a ranked list in the numbered-block format used by every command.
pub fn print_bugs(bugs: &[Bug]) {
    if bugs.is_empty() {
        println!("No results.");
        return;
    }

    for (i, bug) in bugs.iter().enumerate() {
        let source = match &bug.instance {
            Some(instance) => format!("{}[{}]", bug.platform, instance),
            None => bug.platform.to_string(),
        };
        println!(
            "{}. [{}] {} {}#{}  {}",
            i + 1,
            bug.impact_score,
            source,
            bug.project,
            bug.issue_id,
            bug.title
        );
        println!(
            "    severity: {}  affected: ~{}  comments: {}",
            bug.severity, bug.affected_users, bug.comment_count
        );
        if !bug.labels.is_empty() {
            println!("    labels: {}", bug.labels.join(", "));
        }
        if let Some(created) = bug.created_at {
            println!("    opened: {}", created.format("%Y-%m-%d"));
        }
        println!("    url: {}", bug.url);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    struct FixedResolver(anyhow::Result<Vec<TargetSpec>>);

    #[async_trait::async_trait]
    impl TargetResolver for FixedResolver {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn resolve(&self, _query: &str) -> anyhow::Result<Vec<TargetSpec>> {
            match &self.0 {
                Ok(specs) => Ok(specs.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    fn search_with(resolver: FixedResolver) -> FederatedSearch {
        let config = parse_config("[cache]\nenabled = false\n").unwrap();
        let registry = Arc::new(PlatformRegistry::from_config(&config).unwrap());
        FederatedSearch::new(registry, Arc::new(resolver)).with_default_platform(Platform::GitLab)
    }

    #[tokio::test]
    async fn test_resolver_error_falls_back_to_default_platform() {
        let search = search_with(FixedResolver(Err(anyhow::anyhow!("model offline"))));
        let targets = search.resolve_targets(" inkscape/inkscape ").await.unwrap();
        assert_eq!(targets, vec![Target::new(Platform::GitLab, "inkscape/inkscape")]);
    }

    #[tokio::test]
    async fn test_empty_resolution_falls_back_to_default_platform() {
        let search = search_with(FixedResolver(Ok(vec![])));
        let targets = search.resolve_targets("gtk").await.unwrap();
        assert_eq!(targets, vec![Target::new(Platform::GitLab, "gtk")]);
    }

    #[tokio::test]
    async fn test_unknown_platform_aborts_before_dispatch() {
        let search = search_with(FixedResolver(Ok(vec![
            TargetSpec::new("bugzilla", "Firefox"),
            TargetSpec::new("jira", "FF"),
        ])));
        let err = search.search("firefox").await.unwrap_err();
        assert!(matches!(err, PlatformError::UnknownPlatform { ref name, .. } if name == "jira"));
    }

    #[tokio::test]
    async fn test_blank_query_is_empty_result() {
        let search = search_with(FixedResolver(Ok(vec![TargetSpec::new("github", "o/r")])));
        let outcome = search.search("   ").await.unwrap();
        assert_eq!(outcome.total(), 0);
        assert!(outcome.targets_scanned.is_empty());
    }

    fn ranked(target: &Target, score: u8) -> Bug {
        Bug {
            platform: target.platform,
            instance: target.instance.clone(),
            project: target.project.clone(),
            issue_id: score as u64,
            title: format!("bug in {}", target.project),
            description: String::new(),
            url: String::new(),
            impact_score: score,
            affected_users: 0,
            severity: Severity::Medium,
            status: "open".to_string(),
            labels: vec![],
            created_at: None,
            updated_at: None,
            comment_count: 0,
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_panicking_unit_is_isolated_failure() {
        let search = search_with(FixedResolver(Ok(vec![])));
        let targets = vec![
            Target::new(Platform::GitHub, "ok/first"),
            Target::new(Platform::GitLab, "crash/here"),
            Target::new(Platform::Bugzilla, "Firefox"),
        ];

        let outcome = search
            .fan_out(targets, |target| async move {
                if target.project == "crash/here" {
                    panic!("adapter blew up");
                }
                let score = if target.platform == Platform::GitHub { 80 } else { 95 };
                Ok::<_, PlatformError>(vec![ranked(&target, score)])
            })
            .await;

        let scores: Vec<u8> = outcome.results.iter().map(|b| b.impact_score).collect();
        assert_eq!(scores, vec![95, 80]);
        assert_eq!(outcome.per_platform_counts.get(&Platform::GitHub), Some(&1));
        assert_eq!(outcome.per_platform_counts.get(&Platform::Bugzilla), Some(&1));
        assert!(!outcome.per_platform_counts.contains_key(&Platform::GitLab));

        assert_eq!(outcome.targets_scanned.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].target, Target::new(Platform::GitLab, "crash/here"));
        assert!(outcome.failures[0].error.contains("panicked"));
    }

    #[tokio::test]
    async fn test_failure_reported_against_its_own_target() {
        let search = search_with(FixedResolver(Ok(vec![]))).with_max_workers(3);
        let targets: Vec<Target> = (0..6)
            .map(|i| Target::new(Platform::GitHub, format!("org/repo{i}")))
            .collect();

        let outcome = search
            .fan_out(targets, |target| async move {
                if target.project.ends_with('3') {
                    return Err(PlatformError::unavailable("github", "rate limited"));
                }
                Ok(vec![ranked(&target, 50)])
            })
            .await;

        assert_eq!(outcome.total(), 5);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].target.project, "org/repo3");
        let projects: Vec<&str> = outcome.results.iter().map(|b| b.project.as_str()).collect();
        assert_eq!(projects, vec!["org/repo0", "org/repo1", "org/repo2", "org/repo4", "org/repo5"]);
    }

    #[tokio::test]
    async fn test_concurrent_units_bounded_by_max_workers() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let search = search_with(FixedResolver(Ok(vec![]))).with_max_workers(2);
        let targets: Vec<Target> = (0..6)
            .map(|i| Target::new(Platform::GitHub, format!("org/repo{i}")))
            .collect();

        let outcome = search
            .fan_out(targets, |target| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, PlatformError>(vec![ranked(&target, 70)])
                }
            })
            .await;

        assert_eq!(outcome.total(), 6);
        assert!(outcome.failures.is_empty());
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_min_impact_rejected_by_both_commands() {
        let opts = SearchOptions {
            min_impact: Some(150),
            ..SearchOptions::default()
        };
        assert!(opts.validate().is_err());
        assert!(SearchOptions { min_impact: Some(100), ..opts.clone() }.validate().is_ok());

        let config = parse_config("[cache]\nenabled = false\n").unwrap();
        let err = run_scan(&config, "github", "o/r", None, vec![], None, &opts)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--min-impact"));
        let err = run_search(&config, "github:o/r", &opts).await.unwrap_err();
        assert!(err.to_string().contains("--min-impact"));
    }

    #[tokio::test]
    async fn test_unknown_instance_is_isolated_failure() {
        let search = search_with(FixedResolver(Ok(vec![])));
        let mut target = Target::new(Platform::Bugzilla, "Core");
        target.instance = Some("nowhere".into());
        let outcome = search.search_targets(vec![target.clone()]).await;
        assert!(outcome.results.is_empty());
        assert!(outcome.per_platform_counts.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].target, target);
        assert!(outcome.failures[0].error.contains("nowhere"));
    }
}
