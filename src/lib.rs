//! # Bugnosis
//!
//! Find the bugs that matter most across GitHub, GitLab and Bugzilla.
//!
//! Bugnosis queries several issue trackers at once, normalizes their issues
//! into one [`Bug`](models::Bug) shape, scores each with a
//! platform-specific impact heuristic, and returns a single list ranked by
//! impact.
//!
//! ## Architecture
//!
//! ```text
//!   query ──▶ TargetResolver ──▶ [(platform, project, instance), ...]
//!                                         │
//!                     ┌───────────────────┼────────────────────┐
//!                     ▼                   ▼                    ▼
//!               ┌──────────┐        ┌──────────┐         ┌──────────┐
//!               │  GitHub  │        │  GitLab  │         │ Bugzilla │
//!               └────┬─────┘        └────┬─────┘         └────┬─────┘
//!                    └──── HttpSource + ResponseCache (TTL) ──┘
//!                                         │
//!                                         ▼
//!                            merged, sorted by impact
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Adapter error taxonomy |
//! | [`models`] | Core data types |
//! | [`cache`] | TTL response cache and its backends |
//! | [`http`] | Cached, authenticated JSON GET |
//! | [`traits`] | `BugPlatform` and `TargetResolver` |
//! | [`platform_github`] | GitHub adapter |
//! | [`platform_gitlab`] | GitLab adapter |
//! | [`platform_bugzilla`] | Bugzilla adapter |
//! | [`registry`] | Builds adapters from configuration |
//! | [`resolve`] | Heuristic target resolution |
//! | [`search`] | Federated search |
//! | [`stats`] | Result-set analytics |
//! | [`sources`] | Platform listing |
//! | [`get`] | Single-issue lookup |

pub mod cache;
pub mod config;
pub mod error;
pub mod get;
pub mod http;
pub mod models;
pub mod platform_bugzilla;
pub mod platform_github;
pub mod platform_gitlab;
pub mod registry;
pub mod resolve;
pub mod search;
pub mod sources;
pub mod stats;
pub mod traits;
