//! Address lists: normalization of fetched text and the named sets built
//! from it.

use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::policy::IpVersion;
use crate::validation::validate_address;

/// How raw source text is cleaned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Threat feeds: blank lines and `#` comment lines are dropped, and a
    /// trailing `# ...` or `; ...` annotation is cut off
    Filtered,
    /// Pure CIDR lists: every non-empty line is kept
    Raw,
}

/// Split raw source text into address literals.
///
/// No address validation happens here; see [`AddressEntry::parse`].
pub fn normalize(raw: &str, mode: ListMode) -> Vec<&str> {
    match mode {
        ListMode::Filtered => raw
            .lines()
            .filter_map(|line| {
                let entry = line
                    .split(|c: char| c == '#' || c == ';')
                    .next()
                    .unwrap_or("")
                    .trim();
                (!entry.is_empty()).then_some(entry)
            })
            .collect(),
        ListMode::Raw => raw.lines().filter(|line| !line.is_empty()).collect(),
    }
}

/// A validated network destined for a named set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressEntry(IpNet);

impl AddressEntry {
    /// Validate a literal for a set of the given version
    pub fn parse(literal: &str, version: IpVersion) -> Result<Self> {
        validate_address(literal, version).map(Self)
    }

    pub fn version(&self) -> IpVersion {
        match self.0 {
            IpNet::V4(_) => IpVersion::V4,
            IpNet::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for AddressEntry {
    /// Host routes are written as bare addresses
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.prefix_len() == self.0.max_prefix_len() {
            write!(f, "{}", self.0.addr())
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Deduplicated entries of one IP version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSet {
    version: IpVersion,
    entries: BTreeSet<AddressEntry>,
}

impl AddressSet {
    pub fn new(version: IpVersion) -> Self {
        Self {
            version,
            entries: BTreeSet::new(),
        }
    }

    /// Build a set from configured literals; any invalid literal is an error
    pub fn from_config(version: IpVersion, literals: &[String]) -> Result<Self> {
        let mut set = Self::new(version);
        for literal in literals {
            set.entries.insert(AddressEntry::parse(literal, version)?);
        }
        Ok(set)
    }

    /// Add fetched literals, skipping the ones that fail validation.
    /// Returns the number of rejected lines.
    pub fn extend_lenient<'a, I>(&mut self, literals: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut rejected = 0;
        for literal in literals {
            match AddressEntry::parse(literal, self.version) {
                Ok(entry) => {
                    self.entries.insert(entry);
                }
                Err(e) => {
                    debug!("Skipping line: {}", e);
                    rejected += 1;
                }
            }
        }
        if rejected > 0 {
            warn!(
                "Skipped {} invalid {} entries from fetched lists",
                rejected, self.version
            );
        }
        rejected
    }

    pub fn version(&self) -> IpVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &AddressEntry) -> bool {
        self.entries.contains(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressEntry> {
        self.entries.iter()
    }
}

/// Kind of named set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Whitelist,
    Blacklist,
    Country,
}

impl Category {
    /// Population order used by the lifecycle actions
    pub const ALL: [Category; 3] = [Category::Whitelist, Category::Blacklist, Category::Country];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Whitelist => "whitelist",
            Category::Blacklist => "blacklist",
            Category::Country => "country",
        }
    }

    /// Name of the nftables set for this category and version
    pub fn set_name(&self, version: IpVersion) -> String {
        format!("{}-{}", self.as_str(), version)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set as it will be declared in the nftables table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSet {
    pub category: Category,
    pub entries: AddressSet,
}

impl NamedSet {
    pub fn new(category: Category, entries: AddressSet) -> Self {
        Self { category, entries }
    }

    pub fn empty(category: Category, version: IpVersion) -> Self {
        Self::new(category, AddressSet::new(version))
    }

    pub fn name(&self) -> String {
        self.category.set_name(self.entries.version())
    }

    pub fn version(&self) -> IpVersion {
        self.entries.version()
    }
}

/// All address sets of one run, keyed by category and version
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    sets: BTreeMap<(Category, IpVersion), AddressSet>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: Category, set: AddressSet) {
        self.sets.insert((category, set.version()), set);
    }

    pub fn get(&self, category: Category, version: IpVersion) -> Option<&AddressSet> {
        self.sets.get(&(category, version))
    }

    /// The named set for a category and version, empty when nothing was stored
    pub fn named_set(&self, category: Category, version: IpVersion) -> NamedSet {
        match self.get(category, version) {
            Some(set) => NamedSet::new(category, set.clone()),
            None => NamedSet::empty(category, version),
        }
    }
}
