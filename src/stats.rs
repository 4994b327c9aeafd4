//! Analytics over a ranked result set.
//!
//! Gives a quick read of what a search turned up: how the impact scores
//! are distributed, which severities and platforms dominate, and which
//! projects account for the most affected users. Used by `--stats` on
//! `bugnosis search` and `bugnosis scan`.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::{Bug, Platform, Severity};

/// Impact-score bands, highest first: (label, inclusive lower bound).
pub const IMPACT_BANDS: [(&str, u8); 5] = [
    ("critical", 90),
    ("high", 80),
    ("significant", 70),
    ("moderate", 60),
    ("low", 0),
];

/// Per-project rollup of affected users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectImpact {
    pub platform: Platform,
    pub project: String,
    pub bug_count: usize,
    pub affected_users: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BugStats {
    pub total: usize,
    /// Count per entry of [`IMPACT_BANDS`], same order.
    pub impact_distribution: Vec<(&'static str, usize)>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_platform: BTreeMap<Platform, usize>,
    /// Every project, most affected users first.
    pub projects: Vec<ProjectImpact>,
}

impl BugStats {
    pub fn from_bugs(bugs: &[Bug]) -> Self {
        let mut impact_distribution: Vec<(&'static str, usize)> =
            IMPACT_BANDS.iter().map(|(label, _)| (*label, 0)).collect();
        let mut by_severity = BTreeMap::new();
        let mut by_platform = BTreeMap::new();
        let mut projects: HashMap<(Platform, &str), ProjectImpact> = HashMap::new();

        for bug in bugs {
            if let Some(band) = IMPACT_BANDS
                .iter()
                .position(|(_, floor)| bug.impact_score >= *floor)
            {
                impact_distribution[band].1 += 1;
            }
            *by_severity.entry(bug.severity).or_insert(0) += 1;
            *by_platform.entry(bug.platform).or_insert(0) += 1;

            let entry = projects
                .entry((bug.platform, bug.project.as_str()))
                .or_insert_with(|| ProjectImpact {
                    platform: bug.platform,
                    project: bug.project.clone(),
                    bug_count: 0,
                    affected_users: 0,
                });
            entry.bug_count += 1;
            entry.affected_users = entry.affected_users.saturating_add(bug.affected_users);
        }

        let mut projects: Vec<ProjectImpact> = projects.into_values().collect();
        projects.sort_by(|a, b| {
            b.affected_users
                .cmp(&a.affected_users)
                .then_with(|| a.platform.cmp(&b.platform))
                .then_with(|| a.project.cmp(&b.project))
        });

        Self {
            total: bugs.len(),
            impact_distribution,
            by_severity,
            by_platform,
            projects,
        }
    }

    /// The `n` projects with the most affected users.
    pub fn top_projects(&self, n: usize) -> &[ProjectImpact] {
        &self.projects[..n.min(self.projects.len())]
    }

    pub fn print_summary(&self) {
        println!("Bugnosis: Result Stats");
        println!("=======================");
        println!();
        println!("  Bugs:        {}", self.total);
        if self.total == 0 {
            println!();
            return;
        }

        println!();
        println!("  Impact:");
        for ((label, count), (_, floor)) in self.impact_distribution.iter().zip(IMPACT_BANDS) {
            println!("  {:<12} {:>4}   (>= {})", label, count, floor);
        }

        println!();
        println!("  By severity:");
        for (severity, count) in &self.by_severity {
            println!("  {:<12} {:>4}", severity, count);
        }

        println!();
        println!("  By platform:");
        for (platform, count) in &self.by_platform {
            println!("  {:<12} {:>4}", platform, count);
        }

        println!();
        println!("  Top projects:");
        println!("  {:<10} {:<32} {:>5} {:>12}", "PLATFORM", "PROJECT", "BUGS", "AFFECTED");
        println!("  {}", "-".repeat(62));
        for p in self.top_projects(5) {
            println!(
                "  {:<10} {:<32} {:>5} {:>12}",
                p.platform, p.project, p.bug_count, p.affected_users
            );
        }
        println!();
    }
}
