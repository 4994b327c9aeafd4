//! GitHub platform adapter.
//!
//! Reads open issues from the GitHub REST API and scores them with a
//! popularity-weighted heuristic. GitHub has no severity or priority field,
//! so severity is inferred from label names and the repository's star count
//! stands in for the size of the install base.
//!
//! # Configuration
//!
//! ```toml
//! [platforms.github]
//! api_url = "https://api.github.com"
//! token_env = "GITHUB_TOKEN"
//! timeout_secs = 30
//! ```
//!
//! # Impact Score
//!
//! | Component | Points |
//! |-----------|--------|
//! | User base (stars >10k / >5k / >1k / >500 / else) | 40 / 35 / 30 / 20 / 10 |
//! | Engagement, `comments + 2 × reactions` (>50 / >20 / >10 / >5 / else) | 30 / 25 / 20 / 15 / 10 |
//! | Urgency label (critical, blocker, urgent) | +5 |
//! | Ease (newcomer label / help wanted / else) | 20 / 15 / 10 |
//! | Recency | fixed 7 |
//!
//! In [`ScoringMode::Novice`] newcomer-labeled issues gain 50 and everything
//! else loses 30, then the total is clamped to `[0, 100]`.
//!
//! Recency is a constant rather than a real date computation; changing it
//! would reorder existing rankings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::PlatformError;
use crate::http::HttpSource;
use crate::models::{sort_by_impact, Bug, BugQuery, Platform, ScoringMode, Severity};
use crate::traits::{clamp_score, BugPlatform, ScoringContext};

/// Labels that mark an issue as approachable for newcomers.
const EASY_LABELS: &[&str] = &[
    "good first issue",
    "good-first-issue",
    "documentation",
    "easy",
    "beginner",
];
const HELP_WANTED: &str = "help wanted";
/// Substrings of any label that earn the urgency bonus.
const URGENT_WORDS: &[&str] = &["critical", "blocker", "urgent"];
/// Constant recency component.
pub const RECENCY_POINTS: i64 = 7;
const PER_PAGE: &str = "30";

/// Native issue record from `GET /repos/{owner}/{repo}/issues`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubIssue {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub labels: Vec<GitHubLabel>,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub reactions: Option<GitHubReactions>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pub pull_request: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubLabel {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubReactions {
    #[serde(default)]
    pub total_count: u64,
}

/// The subset of `GET /repos/{owner}/{repo}` used for scoring.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubRepo {
    #[serde(default)]
    pub stargazers_count: u64,
}

impl GitHubIssue {
    fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    fn lowercase_labels(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.to_lowercase()).collect()
    }

    fn reaction_count(&self) -> u64 {
        self.reactions.as_ref().map(|r| r.total_count).unwrap_or(0)
    }
}

/// Impact score for one issue given the repository's star count.
pub fn impact_score(issue: &GitHubIssue, stars: u64, mode: ScoringMode) -> u8 {
    let labels = issue.lowercase_labels();
    let mut score: i64 = 0;

    score += match stars {
        s if s > 10_000 => 40,
        s if s > 5_000 => 35,
        s if s > 1_000 => 30,
        s if s > 500 => 20,
        _ => 10,
    };

    let engagement = issue
        .comments
        .saturating_add(issue.reaction_count().saturating_mul(2));
    score += match engagement {
        e if e > 50 => 30,
        e if e > 20 => 25,
        e if e > 10 => 20,
        e if e > 5 => 15,
        _ => 10,
    };
    if labels
        .iter()
        .any(|l| URGENT_WORDS.iter().any(|w| l.contains(w)))
    {
        score += 5;
    }

    let is_easy = labels.iter().any(|l| EASY_LABELS.contains(&l.as_str()));
    score += if is_easy {
        20
    } else if labels.iter().any(|l| l == HELP_WANTED) {
        15
    } else {
        10
    };

    score += RECENCY_POINTS;

    if mode == ScoringMode::Novice {
        score += if is_easy { 50 } else { -30 };
    }

    clamp_score(score)
}

/// Affected users: 15% of stars, scaled down as the impact score drops.
pub fn affected_users(stars: u64, impact: u8) -> u64 {
    let base = stars.saturating_mul(15) / 100;
    match impact {
        i if i >= 90 => base.saturating_mul(8) / 10,
        i if i >= 80 => base / 2,
        i if i >= 70 => base.saturating_mul(3) / 10,
        _ => base / 10,
    }
}

/// Severity inferred from label names.
pub fn severity_from_labels(labels: &[String]) -> Severity {
    let has = |names: &[&str]| {
        labels
            .iter()
            .any(|l| names.contains(&l.to_lowercase().as_str()))
    };
    if has(&["critical", "blocker", "p0"]) {
        Severity::Critical
    } else if has(&["high", "important", "p1"]) {
        Severity::High
    } else if has(&["medium", "normal", "p2"]) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// GitHub adapter instance.
pub struct GitHubAdapter {
    http: HttpSource,
}

impl GitHubAdapter {
    pub fn new(http: HttpSource) -> Self {
        Self { http }
    }

    async fn fetch_repo(&self, project: &str) -> Result<Option<GitHubRepo>, PlatformError> {
        let Some(raw) = self.http.get_json(&format!("/repos/{project}"), &[]).await? else {
            return Ok(None);
        };
        GitHubRepo::deserialize(&raw)
            .map(Some)
            .map_err(|e| PlatformError::malformed(self.name(), e))
    }

    fn to_bug(&self, project: &str, issue: &GitHubIssue, raw: Value, ctx: &ScoringContext) -> Bug {
        let impact = self.calculate_impact(issue, ctx);
        let labels = issue.label_names();
        Bug {
            platform: Platform::GitHub,
            instance: None,
            project: project.to_string(),
            issue_id: issue.number,
            title: issue.title.clone(),
            description: issue.body.clone().unwrap_or_default(),
            url: issue.html_url.clone(),
            impact_score: impact,
            affected_users: affected_users(ctx.project_stars, impact),
            severity: severity_from_labels(&labels),
            status: issue.state.clone(),
            labels,
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            comment_count: issue.comments,
            raw,
        }
    }

    fn issue_params(query: &BugQuery) -> Vec<(&'static str, String)> {
        let mut labels = query.labels.clone();
        let sort = match query.mode {
            ScoringMode::Novice => {
                if !labels.iter().any(|l| l.eq_ignore_ascii_case("good first issue")) {
                    labels.insert(0, "good first issue".to_string());
                }
                "updated"
            }
            ScoringMode::Normal => "comments",
        };

        let mut params = vec![
            ("state", "open".to_string()),
            ("sort", sort.to_string()),
            ("direction", "desc".to_string()),
            ("per_page", PER_PAGE.to_string()),
        ];
        if !labels.is_empty() {
            params.push(("labels", labels.join(",")));
        }
        params
    }
}

#[async_trait]
impl BugPlatform for GitHubAdapter {
    type Issue = GitHubIssue;

    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn name(&self) -> &str {
        self.http.name()
    }

    async fn search_bugs(
        &self,
        project: &str,
        query: &BugQuery,
    ) -> Result<Vec<Bug>, PlatformError> {
        let Some(repo) = self.fetch_repo(project).await? else {
            return Ok(Vec::new());
        };

        let params = Self::issue_params(query);
        let Some(raw) = self
            .http
            .get_json(&format!("/repos/{project}/issues"), &params)
            .await?
        else {
            return Ok(Vec::new());
        };
        let Value::Array(items) = raw else {
            return Err(PlatformError::malformed(
                self.name(),
                "expected an array of issues",
            ));
        };

        let ctx = ScoringContext::new(query.mode).with_stars(repo.stargazers_count);
        let mut bugs = Vec::new();
        for item in items {
            let issue = match GitHubIssue::deserialize(&item) {
                Ok(issue) => issue,
                Err(e) => {
                    warn!(platform = self.name(), project, error = %e, "skipping unparseable issue");
                    continue;
                }
            };
            if issue.pull_request.is_some() {
                continue;
            }
            let bug = self.to_bug(project, &issue, item, &ctx);
            if query.accepts(bug.impact_score, bug.severity) {
                bugs.push(bug);
            }
        }

        sort_by_impact(&mut bugs);
        Ok(bugs)
    }

    async fn get_bug(&self, project: &str, issue_id: u64) -> Result<Option<Bug>, PlatformError> {
        let Some(raw) = self
            .http
            .get_json(&format!("/repos/{project}/issues/{issue_id}"), &[])
            .await?
        else {
            return Ok(None);
        };
        let issue =
            GitHubIssue::deserialize(&raw).map_err(|e| PlatformError::malformed(self.name(), e))?;

        let stars = self
            .fetch_repo(project)
            .await?
            .map(|r| r.stargazers_count)
            .unwrap_or(0);
        let ctx = ScoringContext::new(ScoringMode::Normal).with_stars(stars);
        Ok(Some(self.to_bug(project, &issue, raw, &ctx)))
    }

    fn calculate_impact(&self, issue: &GitHubIssue, ctx: &ScoringContext) -> u8 {
        impact_score(issue, ctx.project_stars, ctx.mode)
    }

    fn estimate_affected_users(&self, issue: &GitHubIssue, ctx: &ScoringContext) -> u64 {
        affected_users(ctx.project_stars, self.calculate_impact(issue, ctx))
    }
}
