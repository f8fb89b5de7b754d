//! # WorkClaw — background job dispatch
//!
//! Usage:
//!   workclaw detect "please optimize this and run a security audit"
//!   workclaw catalog
//!   workclaw run --trigger audit --trigger map --context src/ --session s1
//!   workclaw auto "map the codebase and find test gaps"

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use workclaw_core::WorkClawConfig;
use workclaw_dispatch::{DispatchOptions, Dispatcher, JobPriority, TriggerSymbol};

#[derive(Parser)]
#[command(
    name = "workclaw",
    version,
    about = "🧵 WorkClaw — background job dispatch for agent sessions"
)]
struct Cli {
    /// Config file (default: ~/.workclaw/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override dispatch.max_concurrent
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify text into triggers
    Detect {
        /// Text to classify
        text: Vec<String>,
    },
    /// Print the trigger catalog
    Catalog,
    /// Dispatch jobs and wait for them to finish
    Run {
        /// Trigger to dispatch (repeatable)
        #[arg(short, long = "trigger", required = true)]
        triggers: Vec<TriggerSymbol>,
        /// What the jobs operate on
        #[arg(long, default_value = "")]
        context: String,
        /// Session ID (default: random)
        #[arg(short, long)]
        session: Option<String>,
        /// Override the catalog priority
        #[arg(short, long)]
        priority: Option<JobPriority>,
        /// Per-job timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Detect triggers in text, dispatch them, and wait
    Auto {
        /// Text to classify
        text: Vec<String>,
        /// Session ID (default: random)
        #[arg(short, long)]
        session: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<WorkClawConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(path).to_string());
            WorkClawConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => WorkClawConfig::load()?,
    };
    if let Some(max) = cli.max_concurrent {
        config.dispatch.max_concurrent = max;
    }
    Ok(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn wait_and_report(dispatcher: &Dispatcher, ids: &[String], session: &str) -> Result<()> {
    let jobs: Vec<_> = futures::future::join_all(ids.iter().map(|id| dispatcher.wait_for_terminal(id)))
        .await
        .into_iter()
        .flatten()
        .collect();
    print_json(&serde_json::json!({
        "session": session,
        "jobs": jobs,
        "stats": dispatcher.stats(),
    }))?;
    let context = dispatcher.context_for_injection(session);
    if !context.is_empty() {
        println!("{context}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "workclaw=debug,workclaw_dispatch=debug"
    } else {
        "workclaw=info,workclaw_dispatch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Command::Detect { text } => {
            print_json(&workclaw_dispatch::detect(&text.join(" ")))?;
        }
        Command::Catalog => {
            print_json(&workclaw_dispatch::trigger::catalog())?;
        }
        Command::Run {
            triggers,
            context,
            session,
            priority,
            timeout,
        } => {
            let dispatcher = Dispatcher::simulated(config.dispatch)?;
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let options = DispatchOptions {
                priority,
                timeout: timeout.map(std::time::Duration::from_secs),
                ..Default::default()
            };

            let mut ids = Vec::with_capacity(triggers.len());
            for trigger in triggers {
                ids.push(
                    dispatcher
                        .dispatch(trigger, &context, &session, options.clone())
                        .await?,
                );
            }
            wait_and_report(&dispatcher, &ids, &session).await?;
        }
        Command::Auto { text, session } => {
            let dispatcher = Dispatcher::simulated(config.dispatch)?;
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let text = text.join(" ");
            let ids = dispatcher.auto_dispatch(&text, &session).await?;
            if ids.is_empty() {
                tracing::info!("No triggers dispatched for: {}", workclaw_dispatch::detect(&text).snippet);
            }
            wait_and_report(&dispatcher, &ids, &session).await?;
        }
    }

    Ok(())
}
