//! Core data models used throughout Bugnosis.
//!
//! These types represent the normalized bug records, the query parameters
//! that select them, and the targets a federated search fans out to.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Default minimum impact score for a bug to be surfaced.
pub const DEFAULT_MIN_IMPACT: u8 = 70;

/// The closed set of supported issue trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    GitHub,
    GitLab,
    Bugzilla,
}

impl Platform {
    /// Every supported platform, in registry order.
    pub const ALL: [Platform; 3] = [Platform::GitHub, Platform::GitLab, Platform::Bugzilla];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::GitHub => "github",
            Platform::GitLab => "gitlab",
            Platform::Bugzilla => "bugzilla",
        }
    }

    /// Names of every supported platform, for error messages and listings.
    pub fn known_names() -> Vec<String> {
        Self::ALL.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| PlatformError::UnknownPlatform {
                name: s.to_string(),
                known: Self::known_names(),
            })
    }
}

/// Normalized severity. Each adapter maps its native signal onto this scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str() == wanted)
            .ok_or_else(|| format!("unknown severity '{s}': use critical, high, medium, or low"))
    }
}

/// Ranking bias requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    #[default]
    Normal,
    /// Favor issues explicitly labeled as approachable for newcomers.
    Novice,
}

/// A bug report normalized across platforms.
#[derive(Debug, Clone, Serialize)]
pub struct Bug {
    pub platform: Platform,
    /// Tracker deployment, for multi-tenant platforms (Bugzilla).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Repository path or product name, as the platform names it.
    pub project: String,
    pub issue_id: u64,
    pub title: String,
    pub description: String,
    pub url: String,
    /// Always in `[0, 100]`.
    pub impact_score: u8,
    pub affected_users: u64,
    pub severity: Severity,
    /// Source-native open/closed state.
    pub status: String,
    pub labels: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub comment_count: u64,
    /// The adapter's native record, passed through untouched.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

/// Stable sort by impact score, highest first. Ties keep their input order.
pub fn sort_by_impact(bugs: &mut [Bug]) {
    bugs.sort_by(|a, b| b.impact_score.cmp(&a.impact_score));
}

/// Parameters for a single `search_bugs` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugQuery {
    /// Bugs scoring below this are dropped.
    pub min_impact: u8,
    /// Only issues carrying all of these labels (keywords on Bugzilla).
    pub labels: Vec<String>,
    /// Only issues whose normalized severity matches.
    pub severity: Option<Severity>,
    pub mode: ScoringMode,
}

impl Default for BugQuery {
    fn default() -> Self {
        Self {
            min_impact: DEFAULT_MIN_IMPACT,
            labels: Vec::new(),
            severity: None,
            mode: ScoringMode::Normal,
        }
    }
}

impl BugQuery {
    pub fn with_min_impact(min_impact: u8) -> Self {
        Self {
            min_impact,
            ..Self::default()
        }
    }

    /// Whether a scored bug passes the impact threshold and severity filter.
    pub fn accepts(&self, impact_score: u8, severity: Severity) -> bool {
        impact_score >= self.min_impact && self.severity.map_or(true, |s| s == severity)
    }
}

/// Unvalidated target as produced by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub platform: String,
    pub target: String,
    #[serde(default)]
    pub instance: Option<String>,
}

impl TargetSpec {
    pub fn new(platform: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            target: target.into(),
            instance: None,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

/// One (platform, project, instance) triple to query during a federated search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub platform: Platform,
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Target {
    pub fn new(platform: Platform, project: impl Into<String>) -> Self {
        Self {
            platform,
            project: project.into(),
            instance: None,
        }
    }
}

impl TryFrom<TargetSpec> for Target {
    type Error = PlatformError;

    fn try_from(spec: TargetSpec) -> Result<Self, Self::Error> {
        Ok(Self {
            platform: spec.platform.parse()?,
            project: spec.target,
            instance: spec.instance.filter(|i| !i.trim().is_empty()),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}[{}]:{}", self.platform, instance, self.project),
            None => write!(f, "{}:{}", self.platform, self.project),
        }
    }
}
