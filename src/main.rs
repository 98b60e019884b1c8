use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use maillens::api::{HttpIngestClient, IngestService};
use maillens::config::Config;
use maillens::env_vars;
use maillens::logging;
use maillens::wizard::{
    CancelOutcome, CompletionLoad, FinishOutcome, StartOutcome, StepView, Wizard, WizardError,
    WizardMode, WizardStep,
};
use maillens::workspace::WorkspaceStore;

#[derive(Parser)]
#[command(name = "maillens")]
#[command(about = "Ingest local mail sources into a MailLens workspace")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingest wizard against a local mail folder
    Run {
        /// Wizard mode (onboarding, reingest, addsource)
        #[arg(short, long, default_value = "onboarding")]
        mode: String,
        /// Source kind (default from wizard.default_source)
        #[arg(short, long)]
        source: Option<String>,
        /// Folder to ingest (reingest defaults to the active source)
        path: Option<String>,
    },
    /// List connected sources
    Sources,
    /// Make a connected source the active one
    Activate {
        /// Source id as shown by `maillens sources`
        id: String,
    },
    /// Show the worker's current ingest progress
    Progress,
    /// List supported environment variables
    Env,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;
    let logging_handle = logging::init_logging(&config, cli.debug)?;

    let result = match cli.command {
        Commands::Run { mode, source, path } => {
            cmd_run(&config, WizardMode::parse(&mode), source, path).await
        }
        Commands::Sources => cmd_sources(&config),
        Commands::Activate { id } => cmd_activate(&config, &id),
        Commands::Progress => cmd_progress(&config).await,
        Commands::Env => {
            cmd_env();
            Ok(())
        }
    };

    print_log_location(logging_handle.log_file_path);
    result
}

/// Point at the session log if anything was written to it
fn print_log_location(log_file_path: Option<PathBuf>) {
    if let Some(log_path) = log_file_path {
        if let Ok(metadata) = log_path.metadata() {
            if metadata.len() > 0 {
                eprintln!("Session log: {}", log_path.display());
            }
        }
    }
}

fn worker_client(config: &Config) -> Result<HttpIngestClient> {
    HttpIngestClient::from_config(&config.worker).context("Failed to build ingest worker client")
}

async fn cmd_run(
    config: &Config,
    mode: WizardMode,
    source: Option<String>,
    path: Option<String>,
) -> Result<()> {
    let store = WorkspaceStore::open(config);
    let client: Arc<dyn IngestService> = Arc::new(worker_client(config)?);
    let wizard = Wizard::new(mode, client, store, config.wizard.clone());

    if let Some(source) = source {
        wizard.select_source(&source)?;
    }
    if let Some(path) = path {
        wizard.select_path(&path)?;
    }
    walk_to_confirm(&wizard)?;

    let state = wizard.state();
    println!("Ingest {}", state.path.as_deref().unwrap_or_default());
    println!(
        "  Source: {}",
        state.source_id.as_deref().unwrap_or_default()
    );

    // The confirm step ignores clicks until its lock runs out
    tokio::time::sleep(config.wizard.nav_lock()).await;

    match wizard.request_start().await {
        StartOutcome::Started => {}
        StartOutcome::MissingPath => bail!("No folder selected. Pass a path to ingest."),
        StartOutcome::Failed(message) => bail!(message),
        StartOutcome::Suppressed(reason) => bail!("Start suppressed: {reason:?}"),
    }

    if !follow_progress(&wizard).await? {
        return Ok(());
    }

    show_completion(&wizard).await;

    match wizard.finish().await? {
        FinishOutcome::Committed { source, .. } => {
            println!();
            println!(
                "Connected {} ({} emails) as {}",
                source.label(),
                source.total_emails,
                source.id
            );
        }
        FinishOutcome::Skipped(_) => println!("Nothing to record"),
        FinishOutcome::Suppressed => {}
    }
    Ok(())
}

/// Advance from select through configure, naming whichever choice is missing
fn walk_to_confirm(wizard: &Wizard) -> Result<()> {
    for _ in 0..2 {
        match wizard.advance() {
            Ok(_) => {}
            Err(WizardError::Incomplete(WizardStep::Select)) => {
                bail!("No source selected. Pass --source.")
            }
            Err(WizardError::Incomplete(WizardStep::Configure)) => {
                bail!("No folder selected. Pass a path to ingest.")
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Print progress until the run completes.
///
/// Returns false when the run was cancelled from the keyboard.
async fn follow_progress(wizard: &Wizard) -> Result<bool> {
    let mut revisions = wizard.watch_revision();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut last_line = String::new();

    loop {
        match wizard.view() {
            StepView::Progress {
                status,
                percent,
                note,
                done,
                total,
            } => {
                let counts = match total {
                    Some(total) => format!("{done}/{total}"),
                    None => done.to_string(),
                };
                let line = format!("[{status}] {percent:>5.1}% {counts} {note}");
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
            StepView::Complete { .. } => return Ok(true),
            StepView::Confirm { error, .. } => {
                bail!(error.unwrap_or_else(|| "Ingestion stopped".to_string()))
            }
            StepView::Select { .. } | StepView::Configure { .. } => {
                bail!("Wizard left the progress step unexpectedly")
            }
        }

        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    bail!("Wizard closed");
                }
            }
            signal = &mut ctrl_c, if !interrupted => {
                signal.context("Failed to listen for Ctrl-C")?;
                interrupted = true;
                eprintln!("Cancelling…");
                match wizard.cancel_ingest().await {
                    CancelOutcome::Cancelled => {
                        println!("Ingestion cancelled");
                        return Ok(false);
                    }
                    CancelOutcome::Failed(message) => {
                        eprintln!("{message}");
                        ctrl_c.set(tokio::signal::ctrl_c());
                        interrupted = false;
                    }
                    CancelOutcome::Suppressed => {}
                }
            }
        }
    }
}

/// Load and print the completion summary; failures are shown, not fatal
async fn show_completion(wizard: &Wizard) {
    let mut revisions = wizard.watch_revision();
    if wizard.load_completion().await == CompletionLoad::InFlight {
        while matches!(wizard.view(), StepView::Complete { loading: true, .. }) {
            if revisions.changed().await.is_err() {
                break;
            }
        }
    }

    let StepView::Complete {
        error,
        stats,
        emails,
        ..
    } = wizard.view()
    else {
        return;
    };

    println!();
    if let Some(error) = error {
        eprintln!("{error}");
    }
    if let Some(stats) = stats {
        println!("Ingested {} emails", stats.total);
        println!("  Unread:         {}", stats.unread);
        println!("  Flagged:        {}", stats.flagged);
        println!("  Junk:           {}", stats.junk);
        println!("  Unique senders: {}", stats.unique_senders);
    }
    if !emails.is_empty() {
        println!();
        println!("Latest emails");
        println!("{}", "─".repeat(60));
        for email in &emails {
            let date = email
                .date_ts
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            println!(
                "{date:>10}  {}  {}",
                email.sender_or_placeholder(),
                email.subject_or_placeholder()
            );
        }
    }
}

fn cmd_sources(config: &Config) -> Result<()> {
    let store = WorkspaceStore::open(config);
    let meta = store.load();

    if meta.sources.is_empty() {
        println!("No sources connected");
        if !meta.first_run_complete {
            println!("Use 'maillens run <path>' to ingest a mail folder");
        }
        return Ok(());
    }

    println!("Sources ({})", meta.sources.len());
    println!("{}", "─".repeat(60));
    for source in &meta.sources {
        let marker = if meta.active_source.as_deref() == Some(source.id.as_str()) {
            "*"
        } else {
            " "
        };
        let last = chrono::DateTime::from_timestamp_millis(source.last_ingest_ts)
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} [{}] {} emails, last ingest {}",
            marker,
            source.label(),
            source.kind,
            source.total_emails,
            last
        );
        println!("    {}  {}", source.id, source.path);
    }
    Ok(())
}

fn cmd_activate(config: &Config, id: &str) -> Result<()> {
    let store = WorkspaceStore::open(config);
    store
        .set_active_source(id)
        .with_context(|| format!("Could not activate {id}"))?;
    println!("Active source: {id}");
    Ok(())
}

async fn cmd_progress(config: &Config) -> Result<()> {
    let client = worker_client(config)?;
    let snapshot = client
        .get_progress()
        .await
        .with_context(|| format!("Worker at {} did not answer", client.base_url()))?;

    println!("Status:  {}", snapshot.status);
    if let Some(kind) = snapshot.kind.as_deref() {
        println!("Source:  {kind}");
    }
    println!(
        "Done:    {}/{} ({:.1}%)",
        snapshot.done,
        snapshot.total,
        snapshot.percent()
    );
    println!("Note:    {}", snapshot.display_note());
    if let Some(error) = snapshot.error.as_deref() {
        println!("Error:   {error}");
    }
    Ok(())
}

fn cmd_env() {
    for (category, vars) in env_vars::env_vars_by_category() {
        println!("{}", category.display_name());
        println!("{}", "─".repeat(60));
        for var in vars {
            let current = var
                .current_value()
                .map(|value| format!(" = {value}"))
                .unwrap_or_default();
            println!("{}{}", var.name, current);
            println!("    {}", var.description);
            if let Some(default) = var.default {
                println!("    default: {default}");
            }
            if let Some(example) = var.example {
                println!("    example: {example}");
            }
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maillens::config::WizardConfig;
    use std::time::Duration;

    fn offline_wizard() -> Wizard {
        let client = HttpIngestClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let client: Arc<dyn IngestService> = Arc::new(client);
        Wizard::new(
            WizardMode::Onboarding,
            client,
            WorkspaceStore::in_memory(),
            WizardConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_missing_folder_is_reported() {
        let wizard = offline_wizard();
        wizard.select_source("emlx").unwrap();

        let err = walk_to_confirm(&wizard).unwrap_err();
        assert_eq!(err.to_string(), "No folder selected. Pass a path to ingest.");
        assert_eq!(wizard.step(), WizardStep::Configure);
    }

    #[tokio::test]
    async fn test_walk_reaches_confirm() {
        let wizard = offline_wizard();
        wizard.select_source("emlx").unwrap();
        wizard.select_path("/mail").unwrap();

        walk_to_confirm(&wizard).unwrap();
        assert_eq!(wizard.step(), WizardStep::Confirm);
    }
}
