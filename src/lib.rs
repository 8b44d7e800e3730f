//! # nft-blackhole - country and blacklist blocking for nftables
//!
//! Keeps one nftables table, `inet blackhole`, in step with a YAML policy:
//! a whitelist, remote blacklists and per-country address lists, each
//! loaded into named interval sets that the table's chains match against.
//!
//! ## Features
//!
//! - **Self-contained** - Everything lives in its own table; other rules are never touched
//! - **Fault Tolerant** - An unreachable list source is logged and skipped
//! - **Country Blocking** - Block listed countries, or allow only listed countries
//! - **Port Exceptions** - Keep selected ports open regardless of country
//! - **Dual Stack** - IPv4 and IPv6 sets and rules, each enabled separately
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       nft-blackhole                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Actions: start, stop, restart, reload                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml) -> PolicyConfig                        │
//! │    └── Toggles, decision table, validated whitelist         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls, futures)                        │
//! │    ├── Blacklist sources                                    │
//! │    └── Country lists (herrbischoff, ipdeny)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Lists (ipnet)                                              │
//! │    └── Normalization and validated address sets             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RuleCompiler -> RuleDocument (or Template)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (FirewallBackend trait)                           │
//! │    ├── NftablesBackend (nft -f -)                           │
//! │    └── DryRunBackend                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use nft_blackhole::enforcer::create_backend;
//! use nft_blackhole::fetcher::Fetcher;
//! use nft_blackhole::lifecycle::Lifecycle;
//! use nft_blackhole::policy::PolicyConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let policy = PolicyConfig::load("/etc/nft-blackhole.conf")?;
//!     let fetcher = Fetcher::new()?;
//!     let backend = create_backend(false, true)?;
//!
//!     Lifecycle::new(&policy, &fetcher, backend.as_ref())
//!         .start()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Configuration file parsing
//! - [`enforcer`] - Firewall backend abstraction (nftables, dry run)
//! - [`error`] - Error taxonomy
//! - [`fetcher`] - HTTP client for blacklists and country lists
//! - [`lifecycle`] - start / stop / restart / reload
//! - [`lists`] - Address list normalization and sets
//! - [`policy`] - Resolved policy and verdict decision table
//! - [`ruleset`] - nftables rule document model and compiler
//! - [`template`] - External base-document templates
//! - [`validation`] - Input validation for addresses, countries, URLs

pub mod cli;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod fetcher;
pub mod lifecycle;
pub mod lists;
pub mod policy;
pub mod ruleset;
pub mod template;
pub mod validation;

pub use cli::{Cli, Commands};
pub use error::BlackholeError;
pub use lifecycle::{Action, Lifecycle};
pub use policy::PolicyConfig;
