//! Single-issue lookup.
//!
//! Fetches one issue from one platform and prints it with its impact score.
//! Used by the `bugnosis get` CLI command.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::{Bug, Target, TargetSpec};
use crate::registry::PlatformRegistry;

/// Core get function returning the scored bug.
pub async fn get_bug(
    config: &Config,
    platform: &str,
    project: &str,
    issue_id: u64,
    instance: Option<String>,
) -> Result<Bug> {
    let registry = PlatformRegistry::from_config(config)?;
    let target = Target::try_from(TargetSpec {
        platform: platform.to_string(),
        target: project.to_string(),
        instance,
    })?;
    let adapter = registry.build(&target)?;

    match adapter.get_bug(&target.project, issue_id).await? {
        Some(bug) => Ok(bug),
        None => bail!("Issue not found: {} #{}", target, issue_id),
    }
}

pub async fn run_get(
    config: &Config,
    platform: &str,
    project: &str,
    issue_id: u64,
    instance: Option<String>,
    json: bool,
) -> Result<()> {
    let bug = get_bug(config, platform, project, issue_id, instance).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bug)?);
        return Ok(());
    }

    println!("--- {} #{} ---", bug.project, bug.issue_id);
    println!("title:     {}", bug.title);
    println!("platform:  {}", bug.platform);
    if let Some(ref instance) = bug.instance {
        println!("instance:  {}", instance);
    }
    println!("status:    {}", bug.status);
    println!("impact:    {}/100", bug.impact_score);
    println!("affected:  ~{} users", bug.affected_users);
    println!("severity:  {}", bug.severity);
    println!("comments:  {}", bug.comment_count);
    if !bug.labels.is_empty() {
        println!("labels:    {}", bug.labels.join(", "));
    }
    if let Some(created) = bug.created_at {
        println!("opened:    {}", created.to_rfc3339());
    }
    if let Some(updated) = bug.updated_at {
        println!("updated:   {}", updated.to_rfc3339());
    }
    println!("url:       {}", bug.url);
    if !bug.description.trim().is_empty() {
        println!();
        println!("{}", bug.description.trim());
    }
    Ok(())
}
