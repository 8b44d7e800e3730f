//! start / stop / restart / reload against the nftables engine.
//!
//! Nothing is tracked in-process: the engine's table is the state, and each
//! action is written to be safe to repeat against it. Engine calls are issued
//! one at a time, sets in whitelist, blacklist, country order, v4 before v6.

use std::fmt;
use tracing::{info, warn};

use crate::enforcer::FirewallBackend;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::lists::{AddressBook, AddressSet, Category, NamedSet};
use crate::policy::{IpVersion, PolicyConfig};
use crate::ruleset::{RuleCompiler, RuleDocument};
use crate::template::Template;

/// Label of the base document in logs and errors
pub const BASE_DOCUMENT: &str = "base table";

/// Lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Restart,
    Reload,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
            Action::Reload => "reload",
        })
    }
}

/// Drives the engine for one policy
pub struct Lifecycle<'a> {
    policy: &'a PolicyConfig,
    compiler: RuleCompiler<'a>,
    fetcher: &'a Fetcher,
    backend: &'a dyn FirewallBackend,
    template: Option<&'a Template>,
}

impl<'a> Lifecycle<'a> {
    pub fn new(policy: &'a PolicyConfig, fetcher: &'a Fetcher, backend: &'a dyn FirewallBackend) -> Self {
        Self {
            policy,
            compiler: RuleCompiler::new(policy),
            fetcher,
            backend,
            template: None,
        }
    }

    /// Render the base document from a template instead of the built-in layout
    pub fn with_template(mut self, template: &'a Template) -> Self {
        self.template = Some(template);
        self
    }

    pub async fn run(&self, action: Action) -> Result<()> {
        info!("nft-blackhole {}", action);
        match action {
            Action::Start => self.start().await,
            Action::Stop => {
                self.stop();
                Ok(())
            }
            Action::Restart => self.restart().await,
            Action::Reload => self.reload().await,
        }
    }

    /// Create the table and chains, then fill the sets
    pub async fn start(&self) -> Result<()> {
        let base = self.base_document()?;
        self.backend.apply(BASE_DOCUMENT, &base)?;
        self.populate(false).await
    }

    /// Delete the table. Failures are logged only.
    pub fn stop(&self) {
        if let Err(e) = self.backend.delete_table() {
            warn!("{}", e);
        }
    }

    pub async fn restart(&self) -> Result<()> {
        self.stop();
        self.start().await
    }

    /// Refresh set contents without touching the table or chains
    pub async fn reload(&self) -> Result<()> {
        self.populate(true).await
    }

    /// Text of the base document: table, empty sets and chains
    pub fn base_document(&self) -> Result<String> {
        match self.template {
            Some(template) => template.render(&self.compiler),
            None => Ok(self.compiler.base_document().to_string()),
        }
    }

    /// Current contents of one set
    pub async fn build_set(&self, category: Category, version: IpVersion) -> AddressSet {
        match category {
            Category::Whitelist => self.policy.whitelist.get(version).clone(),
            Category::Blacklist => {
                self.fetcher
                    .fetch_blacklist(self.policy.blacklist_sources.get(version), version)
                    .await
            }
            Category::Country => {
                self.fetcher
                    .fetch_countries(self.policy.country_source, &self.policy.country_codes, version)
                    .await
            }
        }
    }

    /// Build every set of every enabled version
    pub async fn collect(&self) -> AddressBook {
        let mut book = AddressBook::new();
        for category in Category::ALL {
            for version in self.policy.enabled_versions() {
                book.insert(category, self.build_set(category, version).await);
            }
        }
        book
    }

    /// The complete document with current set contents
    pub async fn compile(&self) -> RuleDocument {
        self.compiler.compile(&self.collect().await)
    }

    /// Fill each set. An empty set is never applied; on reload the set is
    /// flushed first. The first failed apply aborts the remaining sets and
    /// earlier ones stay applied.
    async fn populate(&self, reload: bool) -> Result<()> {
        for category in Category::ALL {
            for version in self.policy.enabled_versions() {
                let set = NamedSet::new(category, self.build_set(category, version).await);
                let name = set.name();

                if reload {
                    if let Err(e) = self.backend.flush_set(&name) {
                        warn!("{}", e);
                    }
                }

                if set.entries.is_empty() {
                    info!("Set {} is empty, nothing to apply", name);
                    continue;
                }

                let count = set.entries.len();
                let document = RuleDocument::set_population(set);
                self.backend
                    .apply(&format!("set {}", name), &document.to_string())?;
                info!("Loaded {} entries into {}", count, name);
            }
        }
        Ok(())
    }
}
