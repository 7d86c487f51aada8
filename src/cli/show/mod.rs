//! Show command - prints a stored flow document

use std::io::{self, Write};

use clap::Args;

use super::CliContext;
use crate::domain::flow::to_json;

/// Arguments for the show command
#[derive(Args, Clone, Debug)]
pub struct ShowArgs {
    /// Flow ID
    pub id: String,
}

/// Print the validated document, with load warnings on stderr
pub async fn run(ctx: &CliContext, args: ShowArgs) -> anyhow::Result<()> {
    let flow = ctx.service.get(&args.id).await?;

    for warning in flow.warnings() {
        eprintln!("warning: {}", warning);
    }

    let mut out = io::stdout();
    writeln!(out, "{}", to_json(&flow)?)?;

    Ok(())
}
