//! # RelayPost: broadcast post dispatch scheduler
//!
//! Usage:
//!   relaypost init-config                      # Write default config
//!   relaypost serve                            # HTTP API + periodic scheduler
//!   relaypost submit "3BHK in Wakad" --target grp-a
//!   relaypost list --status failed
//!   relaypost requeue <id> --at 2026-06-01T09:00:00Z
//!   relaypost dispatch --dry-run               # One manual cycle
//!   relaypost status

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use relaypost_channels::{SimulatedSender, sender_from_config};
use relaypost_core::RelayConfig;
use relaypost_core::traits::{Classifier, Sender};
use relaypost_gateway::AppState;
use relaypost_scheduler::{
    DispatchPath, DispatchSettings, Dispatcher, Intake, ItemFilter, ItemStatus, KeywordClassifier,
    QueueStore, RunOptions, Submission, open_store, spawn_scheduler,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "relaypost",
    version,
    about = "📣 RelayPost: durable dispatch scheduler for broadcast posts"
)]
struct Cli {
    /// Config file (default: ~/.relaypost/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the periodic scheduler
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Queue a post
    Submit {
        content: String,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Destination (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<String>,
        /// once | daily | weekly
        #[arg(long)]
        schedule: Option<String>,
        /// Occurrences for daily/weekly posts
        #[arg(long)]
        repeat: Option<f64>,
        /// First due time (RFC 3339)
        #[arg(long)]
        start_at: Option<DateTime<Utc>>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        source_ref: Option<String>,
        #[arg(long)]
        idempotency_key: Option<String>,
        #[arg(long)]
        posted_by: Option<String>,
        #[arg(long)]
        contact: Option<String>,
        /// Extra tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List queue items, newest first
    List {
        #[arg(long)]
        status: Option<ItemStatus>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Put an item back in the queue
    Requeue {
        id: String,
        /// Due time (RFC 3339); now when omitted
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Run one dispatch cycle now
    Dispatch {
        #[arg(long)]
        dry_run: bool,
        /// Evaluation instant override (RFC 3339)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
    /// Show scheduler settings and queue counts
    Status,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn config_path(cli: &Cli) -> PathBuf {
    match &cli.config {
        Some(path) => expand_path(path),
        None => RelayConfig::default_path(),
    }
}

fn load_config(path: &Path) -> Result<RelayConfig> {
    let mut config = if path.exists() {
        RelayConfig::load_from(path)?
    } else {
        tracing::debug!("No config at {}, using defaults", path.display());
        RelayConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

fn open_queue(config: &RelayConfig) -> Result<Arc<dyn QueueStore>> {
    let path = expand_path(&config.store.path);
    open_store(&config.store, &path)
        .with_context(|| format!("opening queue store at {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "relaypost=debug,relaypost_scheduler=debug,relaypost_channels=debug,relaypost_gateway=debug,tower_http=debug"
    } else {
        "relaypost=info,relaypost_scheduler=info,relaypost_channels=info,relaypost_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let path = config_path(&cli);
    if let Command::InitConfig { force } = cli.command {
        if path.exists() && !force {
            anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
        }
        RelayConfig::default().save_to(&path)?;
        println!("✅ Wrote {}", path.display());
        return Ok(());
    }

    let config = load_config(&path)?;
    let settings = DispatchSettings::from_config(&config.scheduler);
    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new());

    match cli.command {
        Command::Serve { host, port } => {
            let store = open_queue(&config)?;
            let sender = sender_from_config(&config.sender)?;
            let dispatcher = Arc::new(Dispatcher::new(
                store.clone(),
                sender,
                classifier.clone(),
                settings.clone(),
            ));
            let path = Arc::new(DispatchPath::start(dispatcher, settings.queued_dispatch));
            let scheduler = if settings.enabled {
                Some(spawn_scheduler(path.clone()))
            } else {
                tracing::info!("Scheduler disabled; dispatch only on request");
                None
            };

            let mut gateway = config.gateway.clone();
            if let Some(host) = host {
                gateway.host = host;
            }
            if let Some(port) = port {
                gateway.port = port;
            }
            let state = AppState {
                intake: Arc::new(Intake::new(store, classifier)),
                dispatch: path,
                pairing_code: gateway.pairing_code.clone(),
                start_time: std::time::Instant::now(),
            };
            relaypost_gateway::start(&gateway, state, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("⚠️ Could not listen for Ctrl-C: {e}");
                    std::future::pending::<()>().await;
                }
            })
            .await?;

            if let Some(handle) = scheduler {
                handle.stop();
                handle.join().await;
            }
        }
        Command::Submit {
            content,
            kind,
            priority,
            targets,
            schedule,
            repeat,
            start_at,
            source,
            source_ref,
            idempotency_key,
            posted_by,
            contact,
            tags,
        } => {
            let intake = Intake::new(open_queue(&config)?, classifier);
            let submission = Submission {
                content,
                kind,
                priority,
                targets,
                schedule_mode: schedule,
                repeat_count: repeat,
                start_at,
                source,
                source_ref,
                idempotency_key,
                posted_by,
                contact,
                tags,
            };
            let enqueued = intake.submit(submission, Utc::now()).await?;
            if enqueued.duplicate {
                eprintln!("ℹ️  Duplicate submission; returning the existing item");
            }
            print_json(&enqueued.item)?;
        }
        Command::List { status, limit } => {
            let items = open_queue(&config)?
                .list(ItemFilter { status, limit })
                .await?;
            print_json(&items)?;
        }
        Command::Requeue { id, at } => {
            let item = open_queue(&config)?.requeue(&id, at).await?;
            print_json(&item)?;
        }
        Command::Dispatch { dry_run, now } => {
            let store = open_queue(&config)?;
            let sender: Arc<dyn Sender> = match sender_from_config(&config.sender) {
                Ok(sender) => sender,
                Err(e) if dry_run => {
                    tracing::debug!("Sender not configured ({e}); dry run does not need it");
                    Arc::new(SimulatedSender::new())
                }
                Err(e) => return Err(e.into()),
            };
            let dispatcher = Dispatcher::new(store, sender, classifier, settings);
            let mut options = RunOptions::manual().dry_run(dry_run);
            if let Some(now) = now {
                options = options.at(now);
            }
            print_json(&dispatcher.run_due(options).await)?;
        }
        Command::Status => {
            let store = open_queue(&config)?;
            print_json(&serde_json::json!({
                "settings": settings,
                "store": store.backend(),
                "queue": store.summary().await?,
            }))?;
        }
        Command::InitConfig { .. } => unreachable!("handled above"),
    }

    Ok(())
}
