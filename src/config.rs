//! Configuration file parsing for nft-blackhole.
//!
//! The file keeps the historical upper-case layout of `/etc/nft-blackhole.conf`.
//! Values are decoded leniently where YAML 1.1 habits leak in (`on`/`off`
//! toggles, Norway's `no` read as boolean false) and strictly everywhere else.
//! Turning a [`RawConfig`] into a usable policy is done by
//! [`crate::policy::PolicyConfig::from_raw`].

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::path::Path;

use crate::error::{BlackholeError, Result};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nft-blackhole.conf";

/// Configuration exactly as written in the YAML file
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(rename = "IP_VERSION")]
    pub ip_version: IpVersionToggles,

    #[serde(rename = "WHITELIST")]
    pub whitelist: VersionLists,

    #[serde(rename = "BLACKLIST")]
    pub blacklist: VersionLists,

    /// Two-letter country codes. Boolean `false` is read back as `no`.
    #[serde(rename = "COUNTRY_LIST", deserialize_with = "deserialize_country_codes")]
    pub country_list: Vec<String>,

    #[serde(rename = "BLOCK_POLICY", default = "default_block_policy")]
    pub block_policy: String,

    #[serde(rename = "COUNTRY_POLICY", default = "default_country_policy")]
    pub country_policy: String,

    #[serde(rename = "BLOCK_OUTPUT", default, deserialize_with = "deserialize_toggle")]
    pub block_output: bool,

    #[serde(rename = "BLOCK_FORWARD", default, deserialize_with = "deserialize_toggle")]
    pub block_forward: bool,

    #[serde(
        rename = "COUNTRY_EXCLUDE_PORTS",
        default,
        deserialize_with = "deserialize_nullable_list"
    )]
    pub country_exclude_ports: Vec<u16>,

    #[serde(rename = "COUNTRY_SOURCE", default)]
    pub country_source: CountrySource,
}

impl RawConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BlackholeError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_yaml(&content)
            .map_err(|e| BlackholeError::config(format!("{:?}: {}", path, e)))
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| BlackholeError::config(format!("Failed to parse config: {}", e)))
    }

    /// Commented sample configuration
    pub fn sample_yaml() -> &'static str {
        include_str!("../templates/nft-blackhole.conf")
    }
}

/// `IP_VERSION` section
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct IpVersionToggles {
    #[serde(default, deserialize_with = "deserialize_toggle")]
    pub v4: bool,
    #[serde(default, deserialize_with = "deserialize_toggle")]
    pub v6: bool,
}

/// A `v4`/`v6` pair of lists, as used by `WHITELIST` and `BLACKLIST`.
/// An empty YAML key (`v6:`) reads as an empty list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionLists {
    #[serde(default, deserialize_with = "deserialize_nullable_list")]
    pub v4: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_nullable_list")]
    pub v6: Vec<String>,
}

/// Provider of per-country CIDR lists
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CountrySource {
    /// github.com/herrbischoff/country-ip-blocks
    #[default]
    Herrbischoff,
    /// ipdeny.com aggregated zones
    Ipdeny,
}

fn default_block_policy() -> String {
    "drop".to_string()
}

fn default_country_policy() -> String {
    "block".to_string()
}

/// Parse a YAML 1.1 style boolean word
pub fn parse_toggle(word: &str) -> Option<bool> {
    match word.trim().to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "y" => Some(true),
        "off" | "no" | "false" | "n" => Some(false),
        _ => None,
    }
}

/// Deserialize a toggle written as a YAML boolean or as on/off, yes/no
fn deserialize_toggle<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::String(s) => parse_toggle(&s).ok_or_else(|| {
            D::Error::custom(format!(
                "Invalid toggle '{}': use on/off, yes/no or true/false",
                s
            ))
        }),
        other => Err(D::Error::custom(format!("Invalid toggle: {:?}", other))),
    }
}

/// Deserialize a list that may be written as an empty key
fn deserialize_nullable_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize country codes, restoring Norway.
///
/// A YAML 1.1 parser reads a bare `no` as boolean false, so a false entry
/// always stands for the code `no`. Codes are lower-cased; their shape is
/// checked later, when the policy is resolved.
fn deserialize_country_codes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;

    values
        .unwrap_or_default()
        .into_iter()
        .map(|value| match value {
            Value::Bool(false) => Ok("no".to_string()),
            Value::String(s) => Ok(s.trim().to_ascii_lowercase()),
            other => Err(D::Error::custom(format!(
                "Invalid country code in COUNTRY_LIST: {:?}",
                other
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
IP_VERSION:
  v4: on
  v6: off
WHITELIST:
  v4:
    - 127.0.0.1
  v6:
BLACKLIST:
  v4:
    - https://iplists.firehol.org/files/firehol_level1.netset
  v6:
COUNTRY_LIST:
  - cn
"#;

    #[test]
    fn test_parse_minimal() {
        let config = RawConfig::from_yaml(MINIMAL).unwrap();
        assert!(config.ip_version.v4);
        assert!(!config.ip_version.v6);
        assert_eq!(config.whitelist.v4, vec!["127.0.0.1"]);
        assert!(config.whitelist.v6.is_empty());
        assert_eq!(config.blacklist.v4.len(), 1);
        assert_eq!(config.country_list, vec!["cn"]);
    }

    #[test]
    fn test_optional_fields_default() {
        let config = RawConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.block_policy, "drop");
        assert_eq!(config.country_policy, "block");
        assert!(!config.block_output);
        assert!(!config.block_forward);
        assert!(config.country_exclude_ports.is_empty());
        assert_eq!(config.country_source, CountrySource::Herrbischoff);
    }

    #[test]
    fn test_boolean_false_country_is_norway() {
        let yaml = MINIMAL.replace("  - cn\n", "  - cn\n  - false\n  - DE\n");
        let config = RawConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.country_list, vec!["cn", "no", "de"]);
        assert!(!config.country_list.iter().any(|c| c == "false"));
    }

    #[test]
    fn test_literal_no_country_is_kept() {
        let yaml = MINIMAL.replace("  - cn\n", "  - \"no\"\n");
        let config = RawConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.country_list, vec!["no"]);
    }

    #[test]
    fn test_boolean_true_country_rejected() {
        let yaml = MINIMAL.replace("  - cn\n", "  - true\n");
        assert!(RawConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_empty_country_list() {
        let yaml = MINIMAL.replace("COUNTRY_LIST:\n  - cn\n", "COUNTRY_LIST:\n");
        let config = RawConfig::from_yaml(&yaml).unwrap();
        assert!(config.country_list.is_empty());
    }

    #[test]
    fn test_missing_required_section() {
        let yaml = MINIMAL.replace("WHITELIST:", "WHITELISTED:");
        let err = RawConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, BlackholeError::Config(_)));
        assert!(err.to_string().contains("WHITELIST"));
    }

    #[test]
    fn test_toggle_words() {
        assert_eq!(parse_toggle("on"), Some(true));
        assert_eq!(parse_toggle("Off"), Some(false));
        assert_eq!(parse_toggle("YES"), Some(true));
        assert_eq!(parse_toggle("no"), Some(false));
        assert_eq!(parse_toggle("true"), Some(true));
        assert_eq!(parse_toggle("maybe"), None);
    }

    #[test]
    fn test_invalid_toggle_rejected() {
        let yaml = MINIMAL.replace("v4: on", "v4: sometimes");
        assert!(RawConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_bool_toggles() {
        let yaml = format!("{}BLOCK_OUTPUT: true\nBLOCK_FORWARD: yes\n", MINIMAL);
        let config = RawConfig::from_yaml(&yaml).unwrap();
        assert!(config.block_output);
        assert!(config.block_forward);
    }

    #[test]
    fn test_ports_and_country_source() {
        let yaml = format!(
            "{}COUNTRY_EXCLUDE_PORTS:\n  - 80\n  - 443\nCOUNTRY_SOURCE: ipdeny\n",
            MINIMAL
        );
        let config = RawConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.country_exclude_ports, vec![80, 443]);
        assert_eq!(config.country_source, CountrySource::Ipdeny);
    }

    #[test]
    fn test_out_of_range_port_rejected() {
        let yaml = format!("{}COUNTRY_EXCLUDE_PORTS:\n  - 70000\n", MINIMAL);
        assert!(RawConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_unknown_country_source_rejected() {
        let yaml = format!("{}COUNTRY_SOURCE: maxmind\n", MINIMAL);
        assert!(RawConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_sample_config_parses() {
        let config = RawConfig::from_yaml(RawConfig::sample_yaml()).unwrap();
        assert!(config.ip_version.v4);
        assert!(config.country_list.contains(&"no".to_string()));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = RawConfig::load(file.path()).unwrap();
        assert_eq!(config.country_list, vec!["cn"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RawConfig::load("/nonexistent/nft-blackhole.conf").unwrap_err();
        assert!(matches!(err, BlackholeError::Config(_)));
        assert!(err.to_string().contains("Failed to read"));
    }
}
