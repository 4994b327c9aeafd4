//! Bugzilla platform adapter.
//!
//! One adapter per Bugzilla deployment. The deployment is either a name from
//! the configured instance table (`mozilla`, `redhat`, `kde`, `gnome`,
//! `kernel`, plus anything under `[platforms.bugzilla.instances]`) or a raw
//! `http(s)://` URL, which is reported as the `custom` instance.
//!
//! Bugzilla is the only tracker with explicit severity and priority fields,
//! so scoring leans on them:
//!
//! | Component | Points |
//! |-----------|--------|
//! | Severity (blocker/S1, critical, major/S2, normal/S3, minor/S4, trivial, other) | 40, 35, 25, 15, 5, 0, 15 |
//! | Priority, substring of the field (P1/high, P2/medium, P3/low) | 30 / 15 / 5 |
//! | Comments, `min(count × 2, 20)` | 0–20 |
//! | Age (>90 / >30 days) | 10 / 5 |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::PlatformError;
use crate::http::HttpSource;
use crate::models::{sort_by_impact, Bug, BugQuery, Platform, ScoringMode, Severity};
use crate::traits::{clamp_score, BugPlatform, ScoringContext};

/// Deployments known without any configuration.
pub const BUILTIN_INSTANCES: &[(&str, &str)] = &[
    ("mozilla", "https://bugzilla.mozilla.org"),
    ("redhat", "https://bugzilla.redhat.com"),
    ("kde", "https://bugs.kde.org"),
    ("gnome", "https://bugzilla.gnome.org"),
    ("kernel", "https://bugzilla.kernel.org"),
];

/// Instance name reported for URL-addressed deployments.
pub const CUSTOM_INSTANCE: &str = "custom";

const OPEN_STATUSES: &[&str] = &["NEW", "ASSIGNED", "REOPENED"];
const LIMIT: &str = "100";

/// Native bug record from `GET /rest/bug`.
#[derive(Debug, Clone, Deserialize)]
pub struct BugzillaBug {
    pub id: u64,
    pub summary: String,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub votes: u64,
    /// CC list; entries are e-mail strings or objects depending on the
    /// deployment, only the count matters.
    #[serde(default)]
    pub cc: Vec<Value>,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_change_time: Option<DateTime<Utc>>,
}

fn default_severity() -> String {
    "normal".to_string()
}

#[derive(Debug, Deserialize)]
struct BugList {
    bugs: Vec<Value>,
}

pub fn severity_points(severity: &str) -> i64 {
    match severity.to_lowercase().as_str() {
        "blocker" | "s1" => 40,
        "critical" => 35,
        "major" | "s2" => 25,
        "normal" | "s3" => 15,
        "minor" | "s4" => 5,
        "trivial" => 0,
        _ => 15,
    }
}

pub fn priority_points(priority: &str) -> i64 {
    let p = priority.to_lowercase();
    if p.contains("p1") || p.contains("high") {
        30
    } else if p.contains("p2") || p.contains("medium") {
        15
    } else if p.contains("p3") || p.contains("low") {
        5
    } else {
        0
    }
}

pub fn impact_score(bug: &BugzillaBug, ctx: &ScoringContext) -> u8 {
    let mut score = severity_points(&bug.severity) + priority_points(&bug.priority);
    score += bug.comment_count.saturating_mul(2).min(20) as i64;
    score += match ctx.days_open(bug.creation_time) {
        d if d > 90 => 10,
        d if d > 30 => 5,
        _ => 0,
    };
    clamp_score(score)
}

pub fn affected_users(bug: &BugzillaBug) -> u64 {
    let base = bug
        .votes
        .saturating_mul(500)
        .saturating_add((bug.cc.len() as u64).saturating_mul(100))
        .saturating_add(bug.comment_count.saturating_mul(50));
    let scaled = match bug.severity.to_lowercase().as_str() {
        "blocker" | "critical" => base.saturating_mul(10),
        "major" => base.saturating_mul(3),
        _ => base,
    };
    scaled.max(10)
}

pub fn severity_of(native: &str) -> Severity {
    match native.to_lowercase().as_str() {
        "blocker" | "critical" | "s1" => Severity::Critical,
        "major" | "s2" => Severity::High,
        "minor" | "trivial" | "s4" => Severity::Low,
        _ => Severity::Medium,
    }
}

/// Adapter for a single Bugzilla deployment.
pub struct BugzillaAdapter {
    http: HttpSource,
    instance_name: String,
    instance_url: String,
}

impl BugzillaAdapter {
    /// `http` must point at the deployment's REST root (`{instance_url}/rest`).
    pub fn new(http: HttpSource, instance_name: &str, instance_url: &str) -> Self {
        Self {
            http,
            instance_name: instance_name.to_string(),
            instance_url: instance_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    fn to_bug(&self, project: &str, bug: &BugzillaBug, raw: Value, ctx: &ScoringContext) -> Bug {
        Bug {
            platform: Platform::Bugzilla,
            instance: Some(self.instance_name.clone()),
            project: bug.product.clone().unwrap_or_else(|| project.to_string()),
            issue_id: bug.id,
            title: bug.summary.clone(),
            description: bug.description.clone().unwrap_or_default(),
            url: format!("{}/show_bug.cgi?id={}", self.instance_url, bug.id),
            impact_score: self.calculate_impact(bug, ctx),
            affected_users: self.estimate_affected_users(bug, ctx),
            severity: severity_of(&bug.severity),
            status: bug.status.clone(),
            labels: bug.keywords.clone(),
            created_at: bug.creation_time,
            updated_at: bug.last_change_time,
            comment_count: bug.comment_count,
            raw,
        }
    }

    fn bug_list(&self, raw: Value) -> Result<Vec<Value>, PlatformError> {
        BugList::deserialize(&raw)
            .map(|list| list.bugs)
            .map_err(|e| PlatformError::malformed(self.name(), e))
    }
}

#[async_trait]
impl BugPlatform for BugzillaAdapter {
    type Issue = BugzillaBug;

    fn platform(&self) -> Platform {
        Platform::Bugzilla
    }

    fn name(&self) -> &str {
        self.http.name()
    }

    async fn search_bugs(
        &self,
        project: &str,
        query: &BugQuery,
    ) -> Result<Vec<Bug>, PlatformError> {
        let mut params = vec![("product", project.to_string())];
        for status in OPEN_STATUSES {
            params.push(("status", status.to_string()));
        }
        params.push(("limit", LIMIT.to_string()));
        if !query.labels.is_empty() {
            params.push(("keywords", query.labels.join(",")));
            params.push(("keywords_type", "allwords".to_string()));
        }

        let Some(raw) = self.http.get_json("/bug", &params).await? else {
            return Ok(Vec::new());
        };
        let items = self.bug_list(raw)?;

        let ctx = ScoringContext::new(query.mode);
        let mut bugs = Vec::new();
        for item in items {
            let native = match BugzillaBug::deserialize(&item) {
                Ok(native) => native,
                Err(e) => {
                    warn!(platform = self.name(), project, error = %e, "skipping unparseable bug");
                    continue;
                }
            };
            let bug = self.to_bug(project, &native, item, &ctx);
            if query.accepts(bug.impact_score, bug.severity) {
                bugs.push(bug);
            }
        }

        sort_by_impact(&mut bugs);
        Ok(bugs)
    }

    async fn get_bug(&self, project: &str, issue_id: u64) -> Result<Option<Bug>, PlatformError> {
        let Some(raw) = self.http.get_json(&format!("/bug/{issue_id}"), &[]).await? else {
            return Ok(None);
        };
        let Some(item) = self.bug_list(raw)?.into_iter().next() else {
            return Ok(None);
        };
        let native =
            BugzillaBug::deserialize(&item).map_err(|e| PlatformError::malformed(self.name(), e))?;
        let ctx = ScoringContext::new(ScoringMode::Normal);
        Ok(Some(self.to_bug(project, &native, item, &ctx)))
    }

    fn calculate_impact(&self, bug: &BugzillaBug, ctx: &ScoringContext) -> u8 {
        impact_score(bug, ctx)
    }

    fn estimate_affected_users(&self, bug: &BugzillaBug, _ctx: &ScoringContext) -> u64 {
        affected_users(bug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use chrono::Duration as ChronoDuration;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn native(severity: &str, priority: &str, comments: u64, days_old: i64) -> BugzillaBug {
        let created = Utc::now() - ChronoDuration::days(days_old);
        BugzillaBug::deserialize(&json!({
            "id": 1,
            "summary": "s",
            "severity": severity,
            "priority": priority,
            "status": "NEW",
            "comment_count": comments,
            "creation_time": created.to_rfc3339(),
        }))
        .unwrap()
    }

    fn ctx() -> ScoringContext {
        ScoringContext::new(ScoringMode::Normal)
    }

    fn adapter(server: &mockito::Server) -> BugzillaAdapter {
        let client = build_client(Duration::from_secs(5)).unwrap();
        let http = HttpSource::new("bugzilla-mozilla", &format!("{}/rest", server.url()), client);
        BugzillaAdapter::new(http, "mozilla", &server.url())
    }

    #[test]
    fn test_critical_p1_bug_scores_90() {
        let bug = native("critical", "P1", 10, 40);
        assert_eq!(impact_score(&bug, &ctx()), 90);
    }

    #[test]
    fn test_severity_table() {
        assert_eq!(severity_points("S1"), 40);
        assert_eq!(severity_points("blocker"), 40);
        assert_eq!(severity_points("major"), 25);
        assert_eq!(severity_points("s3"), 15);
        assert_eq!(severity_points("trivial"), 0);
        assert_eq!(severity_points("enhancement"), 15);
    }

    #[test]
    fn test_priority_substring_match() {
        assert_eq!(priority_points("P1"), 30);
        assert_eq!(priority_points("Highest"), 30);
        assert_eq!(priority_points("P2"), 15);
        assert_eq!(priority_points("Low"), 5);
        assert_eq!(priority_points("--"), 0);
    }

    #[test]
    fn test_missing_severity_defaults_to_normal() {
        let bug = BugzillaBug::deserialize(&json!({ "id": 3, "summary": "x" })).unwrap();
        assert_eq!(bug.severity, "normal");
        assert_eq!(impact_score(&bug, &ctx()), 15);
        assert_eq!(severity_of(&bug.severity), Severity::Medium);
    }

    #[test]
    fn test_affected_users() {
        let bug = BugzillaBug::deserialize(&json!({
            "id": 1, "summary": "s", "severity": "blocker",
            "votes": 2, "cc": ["a@x", "b@x", "c@x"], "comment_count": 4
        }))
        .unwrap();
        assert_eq!(affected_users(&bug), (1_000 + 300 + 200) * 10);

        let major = BugzillaBug::deserialize(&json!({
            "id": 2, "summary": "s", "severity": "major", "comment_count": 1
        }))
        .unwrap();
        assert_eq!(affected_users(&major), 150);

        let quiet = native("minor", "", 0, 0);
        assert_eq!(affected_users(&quiet), 10);
    }

    #[test]
    fn test_huge_counts_saturate() {
        assert_eq!(impact_score(&native("blocker", "P1", u64::MAX, 0), &ctx()), 90);
        let bug = BugzillaBug::deserialize(&json!({
            "id": 1, "summary": "s", "severity": "critical",
            "votes": u64::MAX, "comment_count": u64::MAX
        }))
        .unwrap();
        assert_eq!(affected_users(&bug), u64::MAX);
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(severity_of("S1"), Severity::Critical);
        assert_eq!(severity_of("major"), Severity::High);
        assert_eq!(severity_of("normal"), Severity::Medium);
        assert_eq!(severity_of("trivial"), Severity::Low);
        assert_eq!(severity_of("--"), Severity::Medium);
    }

    #[tokio::test]
    async fn test_search_sends_product_and_statuses() {
        let mut server = mockito::Server::new_async().await;
        let recent = (Utc::now() - ChronoDuration::days(40)).to_rfc3339();
        let body = json!({ "bugs": [
            { "id": 100, "summary": "Crash in compositor", "product": "Firefox",
              "severity": "critical", "priority": "P1", "status": "NEW",
              "comment_count": 10, "creation_time": recent, "keywords": ["crash"] },
            { "id": 101, "summary": "Typo", "product": "Firefox",
              "severity": "trivial", "priority": "P5", "status": "NEW",
              "comment_count": 0, "creation_time": recent }
        ]});
        let _m = server
            .mock("GET", "/rest/bug")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("product".into(), "Firefox".into()),
                Matcher::UrlEncoded("status".into(), "NEW".into()),
                Matcher::UrlEncoded("limit".into(), "100".into()),
            ]))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let bz = adapter(&server);
        assert_eq!(bz.name(), "bugzilla-mozilla");
        let bugs = bz
            .search_bugs("Firefox", &BugQuery::with_min_impact(70))
            .await
            .unwrap();

        assert_eq!(bugs.len(), 1);
        let bug = &bugs[0];
        assert_eq!(bug.issue_id, 100);
        assert_eq!(bug.impact_score, 90);
        assert_eq!(bug.severity, Severity::Critical);
        assert_eq!(bug.instance.as_deref(), Some("mozilla"));
        assert_eq!(bug.labels, vec!["crash"]);
        assert_eq!(bug.url, format!("{}/show_bug.cgi?id=100", server.url()));
    }

    #[tokio::test]
    async fn test_keywords_filter_is_passed_natively() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/rest/bug")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("keywords".into(), "crash,regression".into()),
                Matcher::UrlEncoded("keywords_type".into(), "allwords".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"bugs": []}"#)
            .create_async()
            .await;

        let query = BugQuery {
            labels: vec!["crash".into(), "regression".into()],
            ..BugQuery::default()
        };
        let bugs = adapter(&server).search_bugs("Core", &query).await.unwrap();
        assert!(bugs.is_empty());
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_bugs_field_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/bug")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"faults": []}"#)
            .create_async()
            .await;

        let err = adapter(&server)
            .search_bugs("Core", &BugQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_get_bug_found_and_missing() {
        let mut server = mockito::Server::new_async().await;
        let _found = server
            .mock("GET", "/rest/bug/42")
            .with_status(200)
            .with_body(
                json!({ "bugs": [{ "id": 42, "summary": "Hang", "severity": "major",
                                   "priority": "P2", "comment_count": 3 }] })
                .to_string(),
            )
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/rest/bug/43")
            .with_status(404)
            .with_body(r#"{"error": true, "code": 101}"#)
            .create_async()
            .await;

        let bz = adapter(&server);
        let bug = bz.get_bug("Core", 42).await.unwrap().unwrap();
        assert_eq!(bug.project, "Core");
        assert_eq!(bug.impact_score, 25 + 15 + 6);
        assert_eq!(bug.severity, Severity::High);

        assert!(bz.get_bug("Core", 43).await.unwrap().is_none());
    }
}
