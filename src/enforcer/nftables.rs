//! nftables backend implementation.

use tracing::{debug, info};

use super::command::{to_args, CommandOutput, CommandRunner, SystemRunner};
use super::{nft_path, FirewallBackend};
use crate::error::{BlackholeError, Result};
use crate::ruleset::{TABLE_FAMILY, TABLE_NAME};

/// nft's message when the table or set does not exist
const NOT_FOUND: &str = "No such file or directory";

/// nftables backend driving the `nft` binary
pub struct NftablesBackend<R: CommandRunner = SystemRunner> {
    runner: R,
    nft: String,
}

impl NftablesBackend<SystemRunner> {
    pub fn new() -> Self {
        Self::with_runner(SystemRunner)
    }
}

impl Default for NftablesBackend<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> NftablesBackend<R> {
    /// Use a custom runner (tests inject a mock here)
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            nft: nft_path().to_string(),
        }
    }

    /// Run nft; `Err` carries the reason for failure
    fn nft(&self, args: &[&str], input: Option<&str>) -> std::result::Result<CommandOutput, String> {
        let output = self
            .runner
            .run(&self.nft, &to_args(args), input.map(str::to_string))
            .map_err(|e| format!("failed to execute {}: {}", self.nft, e))?;

        if output.success {
            Ok(output)
        } else {
            Err(output.stderr.trim().to_string())
        }
    }
}

impl<R: CommandRunner> FirewallBackend for NftablesBackend<R> {
    fn apply(&self, what: &str, document: &str) -> Result<()> {
        debug!("Applying {}:\n{}", what, document);
        self.nft(&["-f", "-"], Some(document))
            .map_err(|reason| BlackholeError::Apply {
                what: what.to_string(),
                reason,
            })?;
        info!("Applied {}", what);
        Ok(())
    }

    fn delete_table(&self) -> Result<()> {
        match self.nft(&["delete", "table", TABLE_FAMILY, TABLE_NAME], None) {
            Ok(_) => {
                info!("Deleted table {} {}", TABLE_FAMILY, TABLE_NAME);
                Ok(())
            }
            Err(reason) if reason.contains(NOT_FOUND) => {
                debug!("Table {} {} does not exist", TABLE_FAMILY, TABLE_NAME);
                Ok(())
            }
            Err(reason) => Err(BlackholeError::DeleteOrFlush {
                what: format!("delete table {} {}", TABLE_FAMILY, TABLE_NAME),
                reason,
            }),
        }
    }

    fn flush_set(&self, set: &str) -> Result<()> {
        self.nft(&["flush", "set", TABLE_FAMILY, TABLE_NAME, set], None)
            .map_err(|reason| BlackholeError::DeleteOrFlush {
                what: format!("flush set {}", set),
                reason,
            })?;
        debug!("Flushed set {}", set);
        Ok(())
    }
}
