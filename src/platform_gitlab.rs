//! GitLab platform adapter.
//!
//! Talks to the GitLab v4 REST API of gitlab.com or a self-hosted instance.
//! Project paths (`group/subgroup/project`) are sent URL-encoded.
//!
//! # Configuration
//!
//! ```toml
//! [platforms.gitlab]
//! instance_url = "https://gitlab.com"
//! token_env = "GITLAB_TOKEN"
//! ```
//!
//! # Impact Score
//!
//! `min(upvotes × 3, 30) + min(comments × 2, 20) + label tier + age`, where
//! the label tier is 30 for critical/blocker, 20 for bug/high/important,
//! 10 for medium, and age is 20 past 90 days open, 10 past 30.
//!
//! A `security` label does not raise the score; it triples the
//! affected-user estimate and maps to critical severity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::PlatformError;
use crate::http::HttpSource;
use crate::models::{sort_by_impact, Bug, BugQuery, Platform, ScoringMode, Severity};
use crate::traits::{clamp_score, BugPlatform, ScoringContext};

const PER_PAGE: &str = "100";

/// Native issue record from `GET /projects/:id/issues`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabIssue {
    /// Project-scoped issue number.
    pub iid: u64,
    pub title: String,
    pub web_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub upvotes: u64,
    #[serde(default)]
    pub user_notes_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl GitLabIssue {
    fn has_label(&self, names: &[&str]) -> bool {
        self.labels
            .iter()
            .any(|l| names.contains(&l.to_lowercase().as_str()))
    }
}

pub fn impact_score(issue: &GitLabIssue, ctx: &ScoringContext) -> u8 {
    let mut score: i64 = 0;

    score += issue.upvotes.saturating_mul(3).min(30) as i64;
    score += issue.user_notes_count.saturating_mul(2).min(20) as i64;

    score += if issue.has_label(&["critical", "blocker"]) {
        30
    } else if issue.has_label(&["bug", "high", "important"]) {
        20
    } else if issue.has_label(&["medium"]) {
        10
    } else {
        0
    };

    score += match ctx.days_open(issue.created_at) {
        d if d > 90 => 20,
        d if d > 30 => 10,
        _ => 0,
    };

    clamp_score(score)
}

pub fn affected_users(issue: &GitLabIssue) -> u64 {
    let base = issue
        .upvotes
        .saturating_mul(100)
        .saturating_add(issue.user_notes_count.saturating_mul(50));
    let scaled = if issue.has_label(&["critical", "blocker"]) {
        base.saturating_mul(5)
    } else if issue.has_label(&["security"]) {
        base.saturating_mul(3)
    } else {
        base
    };
    scaled.max(10)
}

pub fn severity_of(issue: &GitLabIssue) -> Severity {
    if issue.has_label(&["critical", "blocker", "security"]) {
        Severity::Critical
    } else if issue.has_label(&["high", "important"]) {
        Severity::High
    } else if issue.has_label(&["medium"]) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// `group/project` → `group%2Fproject`.
fn encode_project(project: &str) -> String {
    project.replace('/', "%2F")
}

pub struct GitLabAdapter {
    http: HttpSource,
    /// Set when the adapter points at a self-hosted instance.
    instance: Option<String>,
}

impl GitLabAdapter {
    pub fn new(http: HttpSource) -> Self {
        Self {
            http,
            instance: None,
        }
    }

    pub fn with_instance(mut self, instance: Option<String>) -> Self {
        self.instance = instance;
        self
    }

    fn to_bug(&self, project: &str, issue: &GitLabIssue, raw: Value, ctx: &ScoringContext) -> Bug {
        Bug {
            platform: Platform::GitLab,
            instance: self.instance.clone(),
            project: project.to_string(),
            issue_id: issue.iid,
            title: issue.title.clone(),
            description: issue.description.clone().unwrap_or_default(),
            url: issue.web_url.clone(),
            impact_score: self.calculate_impact(issue, ctx),
            affected_users: self.estimate_affected_users(issue, ctx),
            severity: severity_of(issue),
            status: issue.state.clone(),
            labels: issue.labels.clone(),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            comment_count: issue.user_notes_count,
            raw,
        }
    }
}

#[async_trait]
impl BugPlatform for GitLabAdapter {
    type Issue = GitLabIssue;

    fn platform(&self) -> Platform {
        Platform::GitLab
    }

    fn name(&self) -> &str {
        self.http.name()
    }

    async fn search_bugs(
        &self,
        project: &str,
        query: &BugQuery,
    ) -> Result<Vec<Bug>, PlatformError> {
        let mut params = vec![
            ("state", "opened".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("order_by", "updated_at".to_string()),
            ("sort", "desc".to_string()),
        ];
        if !query.labels.is_empty() {
            params.push(("labels", query.labels.join(",")));
        }

        let path = format!("/projects/{}/issues", encode_project(project));
        let Some(raw) = self.http.get_json(&path, &params).await? else {
            return Ok(Vec::new());
        };
        let Value::Array(items) = raw else {
            return Err(PlatformError::malformed(
                self.name(),
                "expected an array of issues",
            ));
        };

        let ctx = ScoringContext::new(query.mode);
        let mut bugs = Vec::new();
        for item in items {
            let issue = match GitLabIssue::deserialize(&item) {
                Ok(issue) => issue,
                Err(e) => {
                    warn!(platform = self.name(), project, error = %e, "skipping unparseable issue");
                    continue;
                }
            };
            let bug = self.to_bug(project, &issue, item, &ctx);
            if query.accepts(bug.impact_score, bug.severity) {
                bugs.push(bug);
            }
        }

        sort_by_impact(&mut bugs);
        Ok(bugs)
    }

    async fn get_bug(&self, project: &str, issue_id: u64) -> Result<Option<Bug>, PlatformError> {
        let path = format!("/projects/{}/issues/{}", encode_project(project), issue_id);
        let Some(raw) = self.http.get_json(&path, &[]).await? else {
            return Ok(None);
        };
        let issue =
            GitLabIssue::deserialize(&raw).map_err(|e| PlatformError::malformed(self.name(), e))?;
        let ctx = ScoringContext::new(ScoringMode::Normal);
        Ok(Some(self.to_bug(project, &issue, raw, &ctx)))
    }

    fn calculate_impact(&self, issue: &GitLabIssue, ctx: &ScoringContext) -> u8 {
        impact_score(issue, ctx)
    }

    fn estimate_affected_users(&self, issue: &GitLabIssue, _ctx: &ScoringContext) -> u64 {
        affected_users(issue)
    }
}
