//! Firewall enforcement: the channel to the nftables engine.

mod command;
mod nftables;

use std::path::Path;

pub use command::{to_args, CommandOutput, CommandRunner, SystemRunner};
pub use nftables::NftablesBackend;

use crate::error::Result;
use crate::ruleset::{TABLE_FAMILY, TABLE_NAME};

/// Operations the lifecycle needs from the engine
pub trait FirewallBackend: Send + Sync {
    /// Apply a rule document (create or extend the owned table).
    /// `what` names the document in logs and errors.
    fn apply(&self, what: &str, document: &str) -> Result<()>;

    /// Delete the owned table. A missing table is not an error.
    fn delete_table(&self) -> Result<()>;

    /// Remove all elements of a set in the owned table
    fn flush_set(&self, set: &str) -> Result<()>;
}

/// Prints every engine call to stdout instead of running nft
#[derive(Debug, Default)]
pub struct DryRunBackend;

impl FirewallBackend for DryRunBackend {
    fn apply(&self, what: &str, document: &str) -> Result<()> {
        println!("# apply {}", what);
        print!("{}", document);
        Ok(())
    }

    fn delete_table(&self) -> Result<()> {
        println!("# nft delete table {} {}", TABLE_FAMILY, TABLE_NAME);
        Ok(())
    }

    fn flush_set(&self, set: &str) -> Result<()> {
        println!("# nft flush set {} {} {}", TABLE_FAMILY, TABLE_NAME, set);
        Ok(())
    }
}

/// Create the backend for this run.
///
/// With `require_root` unset the privilege check is skipped and a missing
/// privilege surfaces as an nft failure instead (`stop` only logs those).
pub fn create_backend(dry_run: bool, require_root: bool) -> anyhow::Result<Box<dyn FirewallBackend>> {
    if dry_run {
        return Ok(Box::new(DryRunBackend));
    }
    if require_root {
        check_root()?;
    }
    Ok(Box::new(NftablesBackend::new()))
}

/// Locate the nft binary, falling back to a PATH lookup
pub fn nft_path() -> &'static str {
    ["/usr/sbin/nft", "/sbin/nft", "/usr/bin/nft"]
        .into_iter()
        .find(|p| Path::new(p).exists())
        .unwrap_or("nft")
}

/// Check if running as root (effective UID == 0)
///
/// Loading rules needs CAP_NET_ADMIN; the UID check covers the usual case of
/// running from systemd or sudo.
pub fn check_root() -> anyhow::Result<()> {
    // SAFETY: geteuid() has no preconditions, never fails and only reads
    // the effective user ID.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "nft-blackhole must run as root to manage the {} {} table.\n\
             Run it with sudo or give the process CAP_NET_ADMIN.",
            TABLE_FAMILY,
            TABLE_NAME
        )
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_backend_never_fails() {
        let backend = DryRunBackend;
        assert!(backend.apply("base table", "table inet blackhole {\n}\n").is_ok());
        assert!(backend.delete_table().is_ok());
        assert!(backend.flush_set("country-v4").is_ok());
    }

    #[test]
    fn test_create_dry_run_backend_without_root() {
        assert!(create_backend(true, true).is_ok());
    }

    #[test]
    fn test_create_backend_without_root_check() {
        assert!(create_backend(false, false).is_ok());
    }

    #[test]
    fn test_create_backend_root_check() {
        let is_root = unsafe { libc::geteuid() } == 0;
        assert_eq!(create_backend(false, true).is_ok(), is_root);
    }

    #[test]
    fn test_nft_path_not_empty() {
        assert!(nft_path().ends_with("nft"));
    }
}
