use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docaudit::replay::{self, ReplayScript};
use docaudit::{AuditConfig, AuditRecord};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docaudit-tool")]
#[command(about = "Developer tooling for docaudit audit trails")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replays a script of document changes and prints the resulting audit records
    Replay {
        #[arg(long)]
        script: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Print only a one-line summary per document
        #[arg(long, default_value_t = false)]
        summary: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            script,
            batch_size,
            summary,
        } => replay_script(script, batch_size, summary).await,
    }
}

async fn replay_script(path: PathBuf, batch_size: Option<usize>, summary: bool) -> Result<()> {
    let mut config = AuditConfig::from_env().context("Invalid environment configuration")?;
    if let Some(batch_size) = batch_size {
        config = config.batch_size(batch_size);
    }

    let script = ReplayScript::from_path(&path).await?;
    let report = replay::run(&script, config)
        .await
        .with_context(|| format!("Replay of '{}' failed", path.display()))?;

    if summary {
        for record in &report.records {
            println!("{}", summarize(record));
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&report.records)?);
    }
    Ok(())
}

fn summarize(record: &AuditRecord) -> String {
    let steps = record
        .history
        .iter()
        .map(|entry| {
            format!(
                "{}({})",
                entry.action,
                entry.actor.as_deref().unwrap_or("unknown")
            )
        })
        .collect::<Vec<_>>()
        .join(" -> ");
    format!("{}: {}", record.primary_id(), steps)
}
