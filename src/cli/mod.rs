//! CLI module for PMP Flow
//!
//! Provides subcommands for working with stored flows:
//! - `list`: enumerate stored flows, optionally with details
//! - `show`: print a flow document
//! - `validate`: check stored flows
//! - `import`: validate and store a flow document
//! - `run`: execute a flow against the configured provider

pub mod import;
pub mod list;
pub mod run;
pub mod show;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::{resolve_root, AppConfig};
use crate::infrastructure::flow::FileFlowRepository;
use crate::infrastructure::logging;
use crate::infrastructure::services::FlowService;

/// PMP Flow - Declarative multi-step LLM workflows
#[derive(Parser)]
#[command(name = "pmp-flow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration root (defaults to the nearest `.pmp-flow` directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List stored flows
    List(list::ListArgs),

    /// Print a stored flow document
    Show(show::ShowArgs),

    /// Validate stored flows
    Validate(validate::ValidateArgs),

    /// Validate a flow document and store it
    Import(import::ImportArgs),

    /// Execute a stored flow
    Run(run::RunArgs),
}

/// Resolved root, configuration and flow service shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub root: PathBuf,
    pub config: AppConfig,
    pub service: FlowService,
}

impl CliContext {
    pub fn new(root: PathBuf, config: AppConfig) -> Self {
        let repository = FileFlowRepository::for_root(&root);
        let service = FlowService::new(Arc::new(repository));

        Self {
            root,
            config,
            service,
        }
    }

    pub fn flows_dir(&self) -> PathBuf {
        self.root.join("flows")
    }
}

/// Load environment and configuration, install logging, and dispatch
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let root = resolve_root(cli.root.as_deref())
        .context("Failed to determine the configuration root")?;
    let config = AppConfig::load(&root)
        .with_context(|| format!("Failed to load configuration from {}", root.display()))?;

    logging::init_logging(&config.logging).context("Failed to install the log subscriber")?;
    debug!(root = %root.display(), "Using configuration root");

    let ctx = CliContext::new(root, config);

    match cli.command {
        Command::List(args) => list::run(&ctx, args).await,
        Command::Show(args) => show::run(&ctx, args).await,
        Command::Validate(args) => validate::run(&ctx, args).await,
        Command::Import(args) => import::run(&ctx, args).await,
        Command::Run(args) => run::run(&ctx, args).await,
    }
}
