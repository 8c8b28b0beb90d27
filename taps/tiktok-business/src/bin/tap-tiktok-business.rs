use clap::Parser;
use eyre::Context;
use std::io::{BufWriter, IsTerminal};
use std::path::PathBuf;
use tap_tiktok_business::{Config, JsonLinesSink, Sink, Tap};
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Extract TikTok Business accounts, videos and comments as Singer RECORD messages on stdout.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the JSON config file.
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // stdout carries the record stream, so all diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let args = Args::parse();
    let config = Config::from_file(&args.config).await?;
    tracing::debug!(?config, "loaded config");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping before the next page request");
            let _ = cancel_tx.send(true);
        }
    });

    let tap = Tap::from_config(&config)?.with_cancellation(cancel_rx);
    let mut sink = JsonLinesSink::new(BufWriter::new(std::io::stdout()));

    let outcome = tap.run(&mut sink).await;
    sink.flush().context("flush record output")?;

    let summary = outcome.context("sync aborted")?;
    for failure in &summary.failures {
        tracing::error!(%failure, "context failed");
    }
    if !summary.is_success() {
        eyre::bail!(
            "{} context sequence(s) failed; first: {}",
            summary.failures.len(),
            summary.failures[0]
        );
    }
    Ok(())
}
