//! # Bugnosis CLI (`bugnosis`)
//!
//! Finds high-impact bugs across GitHub, GitLab and Bugzilla, ranked by an
//! estimate of how many people they hurt.
//!
//! ## Usage
//!
//! ```bash
//! bugnosis --config ./bugnosis.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bugnosis search "<query>"` | Federated search across every resolved target |
//! | `bugnosis scan <platform> <project>` | Search one project on one platform |
//! | `bugnosis get <platform> <project> <id>` | Score a single issue |
//! | `bugnosis platforms` | List platforms and Bugzilla instances |
//! | `bugnosis cache clear` | Drop every cached API response |
//!
//! ## Examples
//!
//! ```bash
//! bugnosis search "github:tokio-rs/tokio, bugzilla:mozilla/Firefox" --min-impact 80
//! bugnosis scan github rust-lang/rust --label "E-easy" --novice
//! bugnosis scan bugzilla plasmashell --instance kde --severity critical
//! bugnosis get gitlab gnome/gtk 4021
//! ```
//!
//! Logging goes to stderr. `BUGNOSIS_LOG` (then `RUST_LOG`) takes an
//! `EnvFilter` directive; otherwise `-v` enables debug and `-q` limits
//! output to errors.

use bugnosis::models::Severity;
use bugnosis::search::SearchOptions;
use bugnosis::{config, get, registry, search, sources};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Bugnosis command-line interface.
#[derive(Parser)]
#[command(
    name = "bugnosis",
    about = "Bugnosis: find high-impact bugs across GitHub, GitLab and Bugzilla",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./bugnosis.toml")]
    config: PathBuf,

    /// Debug logging on stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by `search` and `scan`.
#[derive(clap::Args)]
struct RankArgs {
    /// Drop bugs scoring below this (0-100). Defaults to `search.min_impact`.
    #[arg(long)]
    min_impact: Option<u8>,

    /// Favor issues labeled for newcomers.
    #[arg(long)]
    novice: bool,

    /// Maximum number of bugs to print.
    #[arg(long)]
    limit: Option<usize>,

    /// Emit JSON instead of the text listing.
    #[arg(long)]
    json: bool,

    /// Print impact, severity and project statistics after the listing.
    #[arg(long)]
    stats: bool,
}

impl RankArgs {
    fn options(&self) -> SearchOptions {
        SearchOptions {
            min_impact: self.min_impact,
            novice: self.novice,
            json: self.json,
            limit: self.limit,
            stats: self.stats,
        }
    }
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Federated search across every target the query resolves to.
    ///
    /// Accepts `platform:project` targets (comma-separated), GitHub/GitLab
    /// URLs, or free text searched on the default platform.
    Search {
        query: String,

        #[command(flatten)]
        rank: RankArgs,
    },

    /// Search a single project on a single platform.
    Scan {
        /// `github`, `gitlab`, or `bugzilla`.
        platform: String,

        /// Repository path (`owner/repo`, `group/project`) or Bugzilla product.
        project: String,

        /// Bugzilla instance name or URL; self-hosted URL for GitHub/GitLab.
        #[arg(long)]
        instance: Option<String>,

        /// Only issues carrying this label (repeatable; keywords on Bugzilla).
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Only issues of this severity: critical, high, medium, low.
        #[arg(long)]
        severity: Option<Severity>,

        #[command(flatten)]
        rank: RankArgs,
    },

    /// Fetch and score one issue.
    Get {
        platform: String,
        project: String,
        id: u64,

        #[arg(long)]
        instance: Option<String>,

        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },

    /// List supported platforms and Bugzilla instances.
    Platforms,

    /// Manage the API response cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached response.
    Clear,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let fallback = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("BUGNOSIS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Search { query, rank } => {
            search::run_search(&cfg, &query, &rank.options()).await?;
        }
        Commands::Scan {
            platform,
            project,
            instance,
            labels,
            severity,
            rank,
        } => {
            search::run_scan(
                &cfg,
                &platform,
                &project,
                instance,
                labels,
                severity,
                &rank.options(),
            )
            .await?;
        }
        Commands::Get {
            platform,
            project,
            id,
            instance,
            json,
        } => {
            get::run_get(&cfg, &platform, &project, id, instance, json).await?;
        }
        Commands::Platforms => {
            sources::list_platforms(&cfg)?;
        }
        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            let cache = registry::open_cache(&cfg.cache)?;
            let removed = cache.len()?;
            cache.clear()?;
            println!(
                "Cleared {} cached responses from {}",
                removed,
                cfg.cache.resolved_dir().display()
            );
        }
    }

    Ok(())
}
