//! External rule-document templates.
//!
//! A template is nftables text with `${name}` (or `$name`) placeholders and
//! `$$` for a literal dollar sign. The recognized placeholders are:
//!
//! | placeholder             | value                                        |
//! |-------------------------|----------------------------------------------|
//! | `default_policy`        | chain policy verb                            |
//! | `block_policy`          | verb for blacklisted addresses               |
//! | `country_policy`        | verb for listed countries                    |
//! | `country_ex_ports_rule` | excluded-ports accept rule, or empty         |
//! | `chain_output`          | rendered output chain, or empty              |
//! | `chain_forward`         | rendered forward chain, or empty             |
//!
//! Every value is produced by [`RuleCompiler`]; fetched addresses never pass
//! through a template.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{BlackholeError, Result};
use crate::ruleset::RuleCompiler;

/// A rule-document template
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Load a template file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::read_to_string(path)
            .map(Self::new)
            .map_err(|e| BlackholeError::config(format!("Failed to read template {:?}: {}", path, e)))
    }

    /// Substitute every placeholder. Unknown names are an error.
    pub fn substitute(&self, values: &BTreeMap<&str, String>) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(stripped) = after.strip_prefix('$') {
                out.push('$');
                rest = stripped;
                continue;
            }

            let (name, consumed) = match after.strip_prefix('{') {
                Some(braced) => {
                    let end = braced.find('}').ok_or_else(|| {
                        BlackholeError::config("Template has an unterminated ${ placeholder")
                    })?;
                    (&braced[..end], end + 2)
                }
                None => {
                    let len = identifier_len(after);
                    (&after[..len], len)
                }
            };

            if name.is_empty() || identifier_len(name) != name.len() {
                return Err(BlackholeError::config(format!(
                    "Template has an invalid placeholder near: ${}",
                    after.chars().take(16).collect::<String>()
                )));
            }

            let value = values.get(name).ok_or_else(|| {
                BlackholeError::config(format!("Template uses unknown placeholder '{}'", name))
            })?;
            out.push_str(value);
            rest = &after[consumed..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Render the base document for a policy
    pub fn render(&self, compiler: &RuleCompiler<'_>) -> Result<String> {
        self.substitute(&placeholder_values(compiler))
    }
}

/// Length of the identifier at the start of `s` (`[A-Za-z_][A-Za-z0-9_]*`)
fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Values for the template placeholders
pub fn placeholder_values(compiler: &RuleCompiler<'_>) -> BTreeMap<&'static str, String> {
    let decision = compiler.decision();
    let chain_block = |chain: Option<crate::ruleset::Chain>| {
        chain
            .map(|c| format!("\n{}", c.render()))
            .unwrap_or_default()
    };

    BTreeMap::from([
        ("default_policy", decision.default_policy.to_string()),
        ("block_policy", decision.block_policy.to_string()),
        ("country_policy", decision.country_policy.to_string()),
        (
            "country_ex_ports_rule",
            compiler
                .port_exception()
                .map(|r| r.to_string())
                .unwrap_or_default(),
        ),
        ("chain_output", chain_block(compiler.output_chain())),
        ("chain_forward", chain_block(compiler.forward_chain())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CountryPolicy, PerVersion, PolicyConfig};

    const REFERENCE: &str = include_str!("../templates/nft-blackhole.template");

    fn values(pairs: &[(&'static str, &str)]) -> BTreeMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_substitute_forms() {
        let t = Template::new("policy ${default_policy}; $block_policy costs $$5");
        let out = t
            .substitute(&values(&[("default_policy", "drop"), ("block_policy", "reject")]))
            .unwrap();
        assert_eq!(out, "policy drop; reject costs $5");
    }

    #[test]
    fn test_unknown_placeholder_is_error() {
        let t = Template::new("${nope}");
        let err = t.substitute(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BlackholeError::Config(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_malformed_placeholders() {
        assert!(Template::new("a $ b").substitute(&BTreeMap::new()).is_err());
        assert!(Template::new("${open").substitute(&BTreeMap::new()).is_err());
        assert!(Template::new("${}").substitute(&BTreeMap::new()).is_err());
        assert!(Template::new("${a b}").substitute(&values(&[("a", "x")])).is_err());
    }

    #[test]
    fn test_no_placeholders_is_verbatim() {
        let t = Template::new("table inet blackhole {\n}\n");
        assert_eq!(t.substitute(&BTreeMap::new()).unwrap(), "table inet blackhole {\n}\n");
    }

    #[test]
    fn test_identifier_len() {
        assert_eq!(identifier_len("block_policy;"), 12);
        assert_eq!(identifier_len("x"), 1);
        assert_eq!(identifier_len("1abc"), 0);
        assert_eq!(identifier_len(""), 0);
    }

    #[test]
    fn test_reference_template_minimal_policy() {
        let policy = PolicyConfig::default();
        let out = Template::new(REFERENCE)
            .render(&RuleCompiler::new(&policy))
            .unwrap();
        assert!(out.contains("policy accept;"));
        assert!(out.contains("ip saddr @blacklist-v4 counter drop"));
        assert!(out.contains("ip saddr @country-v4 counter drop"));
        assert!(!out.contains("chain output"));
        assert!(!out.contains("chain forward"));
        assert!(!out.contains('$'));
    }

    #[test]
    fn test_reference_template_all_chains() {
        let policy = PolicyConfig {
            ip_versions: PerVersion::new(true, true),
            country_policy: CountryPolicy::Accept,
            block_output_chain: true,
            block_forward_chain: true,
            country_excluded_ports: vec![80, 443],
            ..Default::default()
        };
        let out = Template::new(REFERENCE)
            .render(&RuleCompiler::new(&policy))
            .unwrap();

        assert!(out.contains("type filter hook input priority -1; policy drop;"));
        assert!(out.contains("\tchain output {"));
        assert!(out.contains("\tchain forward {"));
        assert!(out.contains("ct state established,related accept"));
        assert!(out.contains("ip daddr @blacklist-v4 counter drop"));

        let ports = out
            .find("meta l4proto { tcp, udp } th dport { 80, 443 } counter accept")
            .unwrap();
        let country = out.find("ip saddr @country-v4 counter accept").unwrap();
        let blacklist = out.find("ip saddr @blacklist-v4").unwrap();
        assert!(blacklist < ports && ports < country);
        assert!(out.trim_end().ends_with('}'));
    }

    #[test]
    fn test_placeholder_values_cover_wire_names() {
        let policy = PolicyConfig::default();
        let values = placeholder_values(&RuleCompiler::new(&policy));
        for name in [
            "default_policy",
            "block_policy",
            "country_policy",
            "country_ex_ports_rule",
            "chain_output",
            "chain_forward",
        ] {
            assert!(values.contains_key(name), "missing {}", name);
        }
        assert_eq!(values["country_ex_ports_rule"], "");
        assert_eq!(values["chain_output"], "");
    }

    #[test]
    fn test_load_missing_template() {
        assert!(Template::load("/nonexistent/nft-blackhole.template").is_err());
    }
}
