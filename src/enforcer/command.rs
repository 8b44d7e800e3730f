//! Process execution seam for the nft binary.
//!
//! [`NftablesBackend`](super::NftablesBackend) never spawns processes itself;
//! it goes through a [`CommandRunner`], which tests replace with a mock.

use std::io::{self, Write};
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code 0
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    /// Failed output with the given stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            success: false,
            code: Some(code),
            ..Default::default()
        }
    }
}

/// Runs a program to completion, optionally feeding it stdin.
///
/// An `Err` means the program could not be started at all; a program that
/// ran and failed is an `Ok` with `success == false`.
#[cfg_attr(test, automock)]
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], input: Option<String>) -> io::Result<CommandOutput>;
}

/// Runs real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], input: Option<String>) -> io::Result<CommandOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let (Some(data), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(data.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Convert borrowed arguments for [`CommandRunner::run`]
pub fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}
