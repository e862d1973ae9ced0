mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use probate_core::config::AppConfig;
use probate_core::event::EventBus;
use probate_core::types::{FileSearchRow, Metadata, RunOutcome};

use probate_agent::{Coordinator, CoordinatorService, Poller, StepGraph, StepRunner};
use probate_portal::search::{FILED_FROM_KEY, FILED_TO_KEY};
use probate_portal::{courts, PortalBrowser, PortalExecutor};

#[derive(Parser)]
#[command(
    name = "probate",
    version,
    about = "Collect probate filings from the NY Surrogate's Court file search"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "probate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once against the portal tab
    Run {
        /// Court selector id or county name (default from config)
        #[arg(long)]
        county: Option<String>,
        /// Filing date from, MM/DD/YYYY
        #[arg(long)]
        from: Option<String>,
        /// Filing date to, MM/DD/YYYY
        #[arg(long)]
        to: Option<String>,
        /// DevTools endpoint of a running Chrome
        #[arg(long, env = "PROBATE_CDP_URL")]
        cdp_url: Option<String>,
        /// Write collected rows here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List selectable courts
    Courts,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("probate=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "probate", &mut std::io::stdout());
        }
        Commands::Courts => {
            for court in courts::COURTS {
                println!("{:>3}  {}", court.id, court.name());
            }
        }
        Commands::Config => {
            let config = AppConfig::load_or_default(&cli.config)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Run {
            county,
            from,
            to,
            cdp_url,
            output,
        } => {
            let mut config = AppConfig::load_or_default(&cli.config)?;
            if cdp_url.is_some() {
                config.browser.cdp_url = cdp_url;
            }
            let metadata = run_metadata(&config, county, from, to)?;
            run(config, metadata, output.as_deref()).await?;
        }
    }

    Ok(())
}

/// Start metadata from CLI overrides. Search fields left unset fall back
/// to `[portal]` config when the form is filled.
fn run_metadata(
    config: &AppConfig,
    county: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> anyhow::Result<Metadata> {
    let county_id = match county {
        Some(input) => courts::resolve(&input)
            .with_context(|| format!("unknown court: {input} (see `probate courts`)"))?
            .id
            .to_string(),
        None => config.portal.county_id.clone(),
    };
    let mut metadata = Metadata::with_county(county_id);
    if let Some(from) = from {
        metadata = metadata.set(FILED_FROM_KEY, from);
    }
    if let Some(to) = to {
        metadata = metadata.set(FILED_TO_KEY, to);
    }
    Ok(metadata)
}

async fn run(config: AppConfig, metadata: Metadata, output: Option<&Path>) -> anyhow::Result<()> {
    let browser = PortalBrowser::open(&config.browser).await?;
    let page = Arc::new(browser.portal_page(&config.portal).await?);
    let executor = Arc::new(PortalExecutor::new(page, config.portal.clone()));

    let event_bus = Arc::new(EventBus::default());
    let observer = tokio::spawn(status::observe(event_bus.subscribe()));

    let coordinator = Coordinator::new(config.workflow.clone(), StepGraph::probate(), event_bus);
    let (signal_tx, signal_rx) = mpsc::channel(1);
    let (service, handle) = CoordinatorService::new(coordinator, signal_tx);
    tokio::spawn(service.run());

    let cancel = CancellationToken::new();
    let runner = StepRunner::new(executor, config.executor.step_timeout());
    let poller = Poller::new(handle.clone(), runner, config.executor.clone(), cancel.clone());
    let poller_task = tokio::spawn(async move { poller.run(signal_rx).await });

    // Ctrl-C stops the run; the observer then sees it finish
    let stop_handle = handle.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Stopping workflow...");
        if let Err(e) = stop_handle.stop().await {
            warn!(error = %e, "Stop request failed");
        }
    });

    eprintln!("Clear the CAPTCHA and open File Search in the portal tab if prompted.");
    handle.start(metadata).await?;
    let report = observer.await?;

    cancel.cancel();
    poller_task.await.ok();
    browser.shutdown().await;

    let Some(report) = report else {
        anyhow::bail!("event bus closed before the run finished");
    };
    write_rows(&report.rows, output)?;

    if report.outcome == RunOutcome::Failed {
        anyhow::bail!(
            "workflow failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn write_rows(rows: &[FileSearchRow], output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(rows)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), rows = rows.len(), "Rows written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
