//! nft-blackhole - country and blacklist blocking for nftables

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use nft_blackhole::cli::Cli;
use nft_blackhole::enforcer::create_backend;
use nft_blackhole::fetcher::Fetcher;
use nft_blackhole::lifecycle::{Action, Lifecycle};
use nft_blackhole::policy::PolicyConfig;
use nft_blackhole::template::Template;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let policy = PolicyConfig::load(&cli.config)
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;
    let template = cli
        .template
        .as_ref()
        .map(Template::load)
        .transpose()
        .context("Cannot use base template")?;

    let action = Action::from(cli.command);
    let fetcher = Fetcher::new()?;
    // stop never fails the process, not even without privileges
    let backend = create_backend(cli.dry_run, action != Action::Stop)?;

    let mut lifecycle = Lifecycle::new(&policy, &fetcher, backend.as_ref());
    if let Some(ref template) = template {
        lifecycle = lifecycle.with_template(template);
    }

    lifecycle
        .run(action)
        .await
        .with_context(|| format!("nft-blackhole {} failed", action))
}
