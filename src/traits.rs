//! The two seams of Bugnosis: platform adapters and target resolvers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            PlatformRegistry              │
//! │  ┌─────────┐ ┌─────────┐ ┌────────────┐ │
//! │  │ GitHub  │ │ GitLab  │ │ Bugzilla   │ │
//! │  │ adapter │ │ adapter │ │ (per inst.)│ │
//! │  └─────────┘ └─────────┘ └────────────┘ │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     FederatedSearch::search() → ranked bugs
//! ```
//!
//! A [`TargetResolver`] turns free text ("firefox crashes") into the
//! `(platform, project, instance)` triples the registry can dispatch.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::error::PlatformError;
use crate::models::{Bug, BugQuery, Platform, ScoringMode, TargetSpec};

// ═══════════════════════════════════════════════════════════════════════
// BugPlatform Trait
// ═══════════════════════════════════════════════════════════════════════

/// Inputs to impact scoring that are not part of the issue record itself.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    /// Reference time for age-based components.
    pub now: DateTime<Utc>,
    pub mode: ScoringMode,
    /// Project popularity (GitHub stars). Fetched once per search call, not
    /// per issue; zero on platforms that do not expose it.
    pub project_stars: u64,
}

impl ScoringContext {
    pub fn new(mode: ScoringMode) -> Self {
        Self {
            now: Utc::now(),
            mode,
            project_stars: 0,
        }
    }

    pub fn with_stars(mut self, stars: u64) -> Self {
        self.project_stars = stars;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Whole days between `created` and `now`; zero when unknown.
    pub fn days_open(&self, created: Option<DateTime<Utc>>) -> i64 {
        created
            .map(|c| self.now.signed_duration_since(c).num_days())
            .unwrap_or(0)
    }
}

/// A bug tracker that can be searched and scored.
///
/// Implementations translate the tracker's native schema
/// ([`Issue`](BugPlatform::Issue)) into normalized [`Bug`]s and compute a
/// platform-specific impact score.
///
/// # Contract
///
/// - [`search_bugs`](BugPlatform::search_bugs) returns bugs sorted by
///   `impact_score` descending, all with `impact_score >= query.min_impact`.
///   A project with no matching issues, or no such project, yields an empty
///   list.
/// - [`get_bug`](BugPlatform::get_bug) yields `None` for a missing issue.
/// - Network and parse failures are [`PlatformError::SourceUnavailable`] /
///   [`PlatformError::MalformedResponse`]; "not found" never is.
/// - [`calculate_impact`](BugPlatform::calculate_impact) is pure and
///   always in `[0, 100]`.
#[async_trait]
pub trait BugPlatform: Send + Sync {
    /// The tracker's native issue record.
    type Issue: DeserializeOwned + Send + Sync;

    fn platform(&self) -> Platform;

    /// Adapter name used as the source label (e.g. `"bugzilla-mozilla"`).
    fn name(&self) -> &str;

    async fn search_bugs(&self, project: &str, query: &BugQuery)
        -> Result<Vec<Bug>, PlatformError>;

    async fn get_bug(&self, project: &str, issue_id: u64) -> Result<Option<Bug>, PlatformError>;

    fn calculate_impact(&self, issue: &Self::Issue, ctx: &ScoringContext) -> u8;

    fn estimate_affected_users(&self, issue: &Self::Issue, ctx: &ScoringContext) -> u64;
}

/// Clamp an additive score into `[0, 100]`.
pub fn clamp_score(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

// ═══════════════════════════════════════════════════════════════════════
// TargetResolver Trait
// ═══════════════════════════════════════════════════════════════════════

/// Turns a free-form query into the targets a federated search should hit.
///
/// Typically backed by a language model. Implementations may return any
/// number of targets (usually a handful); an empty list or an error makes
/// the caller fall back to `{default platform, query}`.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn resolve(&self, query: &str) -> Result<Vec<TargetSpec>>;
}
