use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::models::Platform;
use crate::registry::PlatformRegistry;

/// One row of `bugnosis platforms`.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStatus {
    pub name: String,
    pub base_url: String,
    pub authenticated: bool,
}

/// Every platform, then every Bugzilla instance as `bugzilla-<name>`.
pub fn get_platforms(registry: &PlatformRegistry) -> Vec<PlatformStatus> {
    let mut rows: Vec<PlatformStatus> = Platform::ALL
        .iter()
        .map(|p| PlatformStatus {
            name: p.to_string(),
            base_url: registry.base_url(*p),
            authenticated: registry.has_token(*p),
        })
        .collect();

    let authenticated = registry.has_token(Platform::Bugzilla);
    rows.extend(
        registry
            .bugzilla_instances()
            .iter()
            .map(|(name, url)| PlatformStatus {
                name: format!("bugzilla-{name}"),
                base_url: url.clone(),
                authenticated,
            }),
    );
    rows
}

pub fn list_platforms(config: &Config) -> Result<()> {
    let registry = PlatformRegistry::from_config(config)?;

    println!("{:<20} {:<6} URL", "PLATFORM", "AUTH");
    for row in get_platforms(&registry) {
        println!(
            "{:<20} {:<6} {}",
            row.name,
            if row.authenticated { "yes" } else { "no" },
            row.base_url
        );
    }
    println!();
    println!(
        "Default Bugzilla instance: {}",
        registry.default_bugzilla_instance()
    );

    Ok(())
}
