//! nftables rule document model and compiler.
//!
//! The compiler builds a [`RuleDocument`] (sets plus ordered chain rules)
//! from the policy and address sets, then serializes it. Address literals
//! enter the document only as validated [`AddressEntry`] values.
//!
//! Chain rule order is fixed:
//!
//! ```text
//! ct state established,related accept      (forward only)
//! whitelist   -> accept                    (v4, v6)
//! blacklist   -> block policy              (v4, v6)
//! excluded ports -> accept                 (if any; not in output)
//! country     -> country policy            (v4, v6; not in output)
//! counter                                  (falls through to chain policy)
//! ```

use std::fmt::{self, Write as _};

use crate::lists::{AddressBook, Category, NamedSet};
use crate::policy::{IpVersion, PolicyConfig, ResolvedDecision, Verdict};

/// Address family of the owned table
pub const TABLE_FAMILY: &str = "inet";

/// Name of the owned table
pub const TABLE_NAME: &str = "blackhole";

/// Priority of every chain (just before the default filter chains)
pub const CHAIN_PRIORITY: i32 = -1;

/// Netfilter hook a chain is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Input,
    Output,
    Forward,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Input => "input",
            Hook::Output => "output",
            Hook::Forward => "forward",
        }
    }
}

/// Which address of the packet is matched against a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Source,
    Destination,
}

impl Direction {
    fn keyword(&self) -> &'static str {
        match self {
            Direction::Source => "saddr",
            Direction::Destination => "daddr",
        }
    }
}

/// One chain statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// `ct state established,related accept`
    Established,
    /// `ip saddr @set counter <verdict>`
    SetMatch {
        version: IpVersion,
        direction: Direction,
        set: String,
        verdict: Verdict,
    },
    /// `meta l4proto { tcp, udp } th dport { ... } counter accept`
    PortException { ports: Vec<u16> },
    /// Bare counter for traffic falling through to the chain policy
    Counter,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Established => f.write_str("ct state established,related accept"),
            Rule::SetMatch {
                version,
                direction,
                set,
                verdict,
            } => write!(
                f,
                "{} {} @{} counter {}",
                version.nft_family(),
                direction.keyword(),
                set,
                verdict
            ),
            Rule::PortException { ports } => {
                let ports: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                write!(
                    f,
                    "meta l4proto {{ tcp, udp }} th dport {{ {} }} counter accept",
                    ports.join(", ")
                )
            }
            Rule::Counter => f.write_str("counter"),
        }
    }
}

/// A base chain of the owned table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub hook: Hook,
    pub policy: Verdict,
    pub rules: Vec<Rule>,
}

impl Chain {
    /// Render the chain at one level of indentation
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\tchain {} {{", self.hook.as_str());
        let _ = writeln!(
            out,
            "\t\ttype filter hook {} priority {}; policy {};",
            self.hook.as_str(),
            CHAIN_PRIORITY,
            self.policy
        );
        for rule in &self.rules {
            let _ = writeln!(out, "\t\t{}", rule);
        }
        out.push_str("\t}\n");
        out
    }

    /// Index of the first rule matching a predicate
    pub fn position(&self, predicate: impl Fn(&Rule) -> bool) -> Option<usize> {
        self.rules.iter().position(predicate)
    }
}

/// Render a set declaration at one level of indentation
fn render_set(set: &NamedSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\tset {} {{", set.name());
    let _ = writeln!(out, "\t\ttype {}", set.version().nft_addr_type());
    out.push_str("\t\tflags interval\n");
    out.push_str("\t\tauto-merge\n");
    if !set.entries.is_empty() {
        let elements: Vec<String> = set.entries.iter().map(|e| e.to_string()).collect();
        let _ = writeln!(out, "\t\telements = {{ {} }}", elements.join(", "));
    }
    out.push_str("\t}\n");
    out
}

/// A complete `table inet blackhole { ... }` document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDocument {
    pub sets: Vec<NamedSet>,
    pub chains: Vec<Chain>,
}

impl RuleDocument {
    /// Document that only (re)declares one set with its elements
    pub fn set_population(set: NamedSet) -> Self {
        Self {
            sets: vec![set],
            chains: Vec::new(),
        }
    }

    pub fn chain(&self, hook: Hook) -> Option<&Chain> {
        self.chains.iter().find(|c| c.hook == hook)
    }

    /// Total number of set elements in the document
    pub fn element_count(&self) -> usize {
        self.sets.iter().map(|s| s.entries.len()).sum()
    }
}

impl fmt::Display for RuleDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "table {} {} {{", TABLE_FAMILY, TABLE_NAME)?;
        let blocks: Vec<String> = self
            .sets
            .iter()
            .map(render_set)
            .chain(self.chains.iter().map(Chain::render))
            .collect();
        f.write_str(&blocks.join("\n"))?;
        writeln!(f, "}}")
    }
}

/// Builds rule documents for one policy
pub struct RuleCompiler<'a> {
    policy: &'a PolicyConfig,
    decision: ResolvedDecision,
}

impl<'a> RuleCompiler<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self {
            policy,
            decision: policy.decision(),
        }
    }

    pub fn decision(&self) -> ResolvedDecision {
        self.decision
    }

    /// Compile the full document: every set of every enabled version plus
    /// the configured chains.
    pub fn compile(&self, book: &AddressBook) -> RuleDocument {
        let versions = self.policy.enabled_versions();

        let sets = Category::ALL
            .iter()
            .flat_map(|category| versions.iter().map(move |v| book.named_set(*category, *v)))
            .collect();

        let mut chains = vec![self.input_chain()];
        if let Some(chain) = self.output_chain() {
            chains.push(chain);
        }
        if let Some(chain) = self.forward_chain() {
            chains.push(chain);
        }

        RuleDocument { sets, chains }
    }

    /// The base document applied by `start`: all sets declared empty
    pub fn base_document(&self) -> RuleDocument {
        self.compile(&AddressBook::new())
    }

    pub fn input_chain(&self) -> Chain {
        Chain {
            hook: Hook::Input,
            policy: self.decision.default_policy,
            rules: self.filter_rules(Direction::Source, true),
        }
    }

    /// Output chain, when enabled. Only whitelist and blacklist apply.
    pub fn output_chain(&self) -> Option<Chain> {
        self.policy.block_output_chain.then(|| Chain {
            hook: Hook::Output,
            policy: Verdict::Accept,
            rules: self.filter_rules(Direction::Destination, false),
        })
    }

    /// Forward chain, when enabled
    pub fn forward_chain(&self) -> Option<Chain> {
        self.policy.block_forward_chain.then(|| {
            let mut rules = vec![Rule::Established];
            rules.extend(self.filter_rules(Direction::Source, true));
            Chain {
                hook: Hook::Forward,
                policy: self.decision.default_policy,
                rules,
            }
        })
    }

    /// Rule for the excluded ports, if any are configured
    pub fn port_exception(&self) -> Option<Rule> {
        (!self.policy.country_excluded_ports.is_empty()).then(|| Rule::PortException {
            ports: self.policy.country_excluded_ports.clone(),
        })
    }

    fn set_rules(&self, category: Category, direction: Direction, verdict: Verdict) -> Vec<Rule> {
        self.policy
            .enabled_versions()
            .into_iter()
            .map(|version| Rule::SetMatch {
                version,
                direction,
                set: category.set_name(version),
                verdict,
            })
            .collect()
    }

    fn filter_rules(&self, direction: Direction, with_country: bool) -> Vec<Rule> {
        let mut rules = self.set_rules(Category::Whitelist, direction, Verdict::Accept);
        rules.extend(self.set_rules(Category::Blacklist, direction, self.decision.block_policy));

        if with_country {
            rules.extend(self.port_exception());
            rules.extend(self.set_rules(Category::Country, direction, self.decision.country_policy));
            rules.push(Rule::Counter);
        }
        rules
    }
}
