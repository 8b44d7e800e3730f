//! Centralized validation functions for nft-blackhole.
//!
//! This module provides unified validation for:
//! - IP addresses and CIDR ranges destined for nftables sets
//! - Country codes (interpolated into source URLs)
//! - Source URLs and excluded ports

use ipnet::IpNet;
use reqwest::Url;
use std::net::IpAddr;

use crate::error::{BlackholeError, Result};
use crate::policy::IpVersion;

/// Validate that an IP/CIDR string is safe for nftables script inclusion.
///
/// Only digits, dots, colons, slashes and lowercase hex letters are allowed,
/// so a literal can never close a block or start a new statement.
pub fn is_safe_nft_element(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == ':' || c == '/' || ('a'..='f').contains(&c))
}

/// Validate an address or CIDR literal for a set of the given IP version.
///
/// A plain address becomes a /32 (IPv4) or /128 (IPv6) network. Host bits
/// below the prefix are cleared, since interval sets only hold networks.
///
/// # Examples
/// ```
/// use nft_blackhole::policy::IpVersion;
/// use nft_blackhole::validation::validate_address;
/// assert!(validate_address("192.168.0.0/24", IpVersion::V4).is_ok());
/// assert!(validate_address("2001:db8::1", IpVersion::V6).is_ok());
/// assert!(validate_address("2001:db8::1", IpVersion::V4).is_err());
/// assert!(validate_address("1.2.3.4 }", IpVersion::V4).is_err());
/// ```
pub fn validate_address(literal: &str, version: IpVersion) -> Result<IpNet> {
    let literal = literal.trim();
    let lowered = literal.to_ascii_lowercase();

    if lowered.is_empty() || !is_safe_nft_element(&lowered) {
        return Err(BlackholeError::config(format!(
            "Invalid address: {:?}",
            literal
        )));
    }

    let net = if lowered.contains('/') {
        lowered
            .parse::<IpNet>()
            .map_err(|_| BlackholeError::config(format!("Invalid CIDR: {}", literal)))?
    } else {
        let ip: IpAddr = lowered
            .parse()
            .map_err(|_| BlackholeError::config(format!("Invalid IP address: {}", literal)))?;
        IpNet::from(ip)
    };

    let actual = match net {
        IpNet::V4(_) => IpVersion::V4,
        IpNet::V6(_) => IpVersion::V6,
    };
    if actual != version {
        return Err(BlackholeError::config(format!(
            "Address {} is IP{} but is listed under {}",
            literal, actual, version
        )));
    }

    Ok(net.trunc())
}

/// Validate a two-letter country code.
///
/// # Examples
/// ```
/// use nft_blackhole::validation::validate_country_code;
/// assert!(validate_country_code("no").is_ok());
/// assert!(validate_country_code("nor").is_err());
/// ```
pub fn validate_country_code(code: &str) -> Result<&str> {
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()) {
        Ok(code)
    } else {
        Err(BlackholeError::config(format!(
            "Invalid country code '{}': expected two lowercase letters",
            code
        )))
    }
}

/// Validate a blacklist source location (http or https URL with a host)
pub fn validate_source_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| BlackholeError::config(format!("Invalid source URL '{}': {}", url, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(BlackholeError::config(format!(
            "Source URL must use http or https: {}",
            url
        )));
    }
    if parsed.host_str().is_none() {
        return Err(BlackholeError::config(format!(
            "Source URL has no host: {}",
            url
        )));
    }
    Ok(())
}

/// Validate an excluded port number
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(BlackholeError::config(
            "COUNTRY_EXCLUDE_PORTS cannot contain port 0",
        ));
    }
    Ok(())
}
