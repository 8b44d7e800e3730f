//! Resolved, immutable filtering policy.
//!
//! [`PolicyConfig`] is built once per run from a [`RawConfig`] and passed by
//! reference to every stage. [`ResolvedDecision`] turns the block/country
//! toggles into the three verbs the rule document needs.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::config::{CountrySource, RawConfig};
use crate::error::Result;
use crate::lists::AddressSet;
use crate::validation::{validate_country_code, validate_port, validate_source_url};

/// IP protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Both versions, in rule order
    pub const ALL: [IpVersion; 2] = [IpVersion::V4, IpVersion::V6];

    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "v4",
            IpVersion::V6 => "v6",
        }
    }

    /// nftables payload protocol used in matches (`ip saddr`, `ip6 saddr`)
    pub fn nft_family(&self) -> &'static str {
        match self {
            IpVersion::V4 => "ip",
            IpVersion::V6 => "ip6",
        }
    }

    /// nftables set element type
    pub fn nft_addr_type(&self) -> &'static str {
        match self {
            IpVersion::V4 => "ipv4_addr",
            IpVersion::V6 => "ipv6_addr",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value kept separately for IPv4 and IPv6
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerVersion<T> {
    pub v4: T,
    pub v6: T,
}

impl<T> PerVersion<T> {
    pub fn new(v4: T, v6: T) -> Self {
        Self { v4, v6 }
    }

    pub fn get(&self, version: IpVersion) -> &T {
        match version {
            IpVersion::V4 => &self.v4,
            IpVersion::V6 => &self.v6,
        }
    }
}

/// nftables verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
    Reject,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Accept => "accept",
            Verdict::Drop => "drop",
            Verdict::Reject => "reject",
        })
    }
}

/// How blacklisted traffic is refused
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockPolicy {
    #[default]
    Drop,
    Reject,
}

impl BlockPolicy {
    /// Parse `BLOCK_POLICY`. Anything but `reject` means `drop`.
    pub fn from_literal(literal: &str) -> Self {
        match literal.trim().to_ascii_lowercase().as_str() {
            "reject" => BlockPolicy::Reject,
            "drop" => BlockPolicy::Drop,
            other => {
                warn!("Unknown BLOCK_POLICY '{}', using drop", other);
                BlockPolicy::Drop
            }
        }
    }
}

impl From<BlockPolicy> for Verdict {
    fn from(policy: BlockPolicy) -> Self {
        match policy {
            BlockPolicy::Drop => Verdict::Drop,
            BlockPolicy::Reject => Verdict::Reject,
        }
    }
}

/// What listed countries get
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountryPolicy {
    /// Only listed countries are let in
    Accept,
    /// Listed countries are kept out
    #[default]
    Block,
}

impl CountryPolicy {
    /// Parse `COUNTRY_POLICY`. Anything but `accept` means `block`.
    pub fn from_literal(literal: &str) -> Self {
        match literal.trim().to_ascii_lowercase().as_str() {
            "accept" => CountryPolicy::Accept,
            "block" => CountryPolicy::Block,
            other => {
                warn!("Unknown COUNTRY_POLICY '{}', using block", other);
                CountryPolicy::Block
            }
        }
    }
}

/// Verbs derived from the block and country policies.
///
/// Blocking countries keeps the chains open by default and sends listed
/// countries to the block verb. Accepting countries closes the chains by
/// default and lets listed countries through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDecision {
    pub default_policy: Verdict,
    pub block_policy: Verdict,
    pub country_policy: Verdict,
}

impl ResolvedDecision {
    pub fn resolve(block: BlockPolicy, country: CountryPolicy) -> Self {
        let block_policy = Verdict::from(block);
        match country {
            CountryPolicy::Block => Self {
                default_policy: Verdict::Accept,
                block_policy,
                country_policy: block_policy,
            },
            CountryPolicy::Accept => Self {
                default_policy: block_policy,
                block_policy,
                country_policy: Verdict::Accept,
            },
        }
    }
}

/// Immutable filtering policy for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub ip_versions: PerVersion<bool>,
    pub whitelist: PerVersion<AddressSet>,
    pub blacklist_sources: PerVersion<Vec<String>>,
    pub country_codes: BTreeSet<String>,
    pub block_policy: BlockPolicy,
    pub country_policy: CountryPolicy,
    pub block_output_chain: bool,
    pub block_forward_chain: bool,
    pub country_excluded_ports: Vec<u16>,
    pub country_source: CountrySource,
}

impl PolicyConfig {
    /// Load and resolve the policy from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_raw(RawConfig::load(path)?)
    }

    /// Resolve the policy from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        Self::from_raw(RawConfig::from_yaml(content)?)
    }

    /// Validate raw configuration and build the policy
    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        let ip_versions = PerVersion::new(raw.ip_version.v4, raw.ip_version.v6);
        if !ip_versions.v4 && !ip_versions.v6 {
            warn!("Both IPv4 and IPv6 are disabled in IP_VERSION, nothing will be filtered");
        }

        let whitelist = PerVersion::new(
            AddressSet::from_config(IpVersion::V4, &raw.whitelist.v4)?,
            AddressSet::from_config(IpVersion::V6, &raw.whitelist.v6)?,
        );

        for url in raw.blacklist.v4.iter().chain(raw.blacklist.v6.iter()) {
            validate_source_url(url)?;
        }
        let blacklist_sources = PerVersion::new(raw.blacklist.v4, raw.blacklist.v6);

        let country_codes = raw
            .country_list
            .iter()
            .map(|code| validate_country_code(code).map(str::to_string))
            .collect::<Result<BTreeSet<_>>>()?;

        for port in &raw.country_exclude_ports {
            validate_port(*port)?;
        }

        Ok(Self {
            ip_versions,
            whitelist,
            blacklist_sources,
            country_codes,
            block_policy: BlockPolicy::from_literal(&raw.block_policy),
            country_policy: CountryPolicy::from_literal(&raw.country_policy),
            block_output_chain: raw.block_output,
            block_forward_chain: raw.block_forward,
            country_excluded_ports: raw.country_exclude_ports,
            country_source: raw.country_source,
        })
    }

    /// Enabled IP versions, v4 first
    pub fn enabled_versions(&self) -> Vec<IpVersion> {
        IpVersion::ALL
            .into_iter()
            .filter(|v| *self.ip_versions.get(*v))
            .collect()
    }

    pub fn decision(&self) -> ResolvedDecision {
        ResolvedDecision::resolve(self.block_policy, self.country_policy)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            ip_versions: PerVersion::new(true, false),
            whitelist: PerVersion::new(
                AddressSet::new(IpVersion::V4),
                AddressSet::new(IpVersion::V6),
            ),
            blacklist_sources: PerVersion::default(),
            country_codes: BTreeSet::new(),
            block_policy: BlockPolicy::Drop,
            country_policy: CountryPolicy::Block,
            block_output_chain: false,
            block_forward_chain: false,
            country_excluded_ports: Vec::new(),
            country_source: CountrySource::Herrbischoff,
        }
    }
}
