//! Import command - validates a flow document and stores it under the root

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use super::CliContext;

/// Arguments for the import command
#[derive(Args, Clone, Debug)]
pub struct ImportArgs {
    /// Path of the flow document
    pub file: PathBuf,

    /// Replace a stored flow with the same ID
    #[arg(long)]
    pub force: bool,
}

pub async fn run(ctx: &CliContext, args: ImportArgs) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let flow = ctx
        .service
        .import(&bytes, args.force)
        .await
        .with_context(|| format!("Failed to import {}", args.file.display()))?;

    for warning in flow.warnings() {
        eprintln!("warning: {}", warning);
    }
    println!("Imported flow '{}' ({} steps)", flow.id(), flow.step_count());

    Ok(())
}
