//! Validate command - checks stored flows without running them

use std::io::{self, Write};
use std::path::Path;

use anyhow::bail;
use clap::Args;

use super::CliContext;
use crate::infrastructure::services::ValidationReport;

/// Arguments for the validate command
#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Flow IDs to validate (all stored flows when omitted)
    pub ids: Vec<String>,
}

/// Validate flows; fails when any flow is invalid
pub async fn run(ctx: &CliContext, args: ValidateArgs) -> anyhow::Result<()> {
    let reports = ctx.service.validate(&args.ids).await?;
    render(&reports, &ctx.flows_dir(), &mut io::stdout())?;

    let failed = reports.iter().filter(|r| !r.is_valid()).count();
    if failed > 0 {
        bail!("{} of {} flow(s) failed validation", failed, reports.len());
    }

    Ok(())
}

pub fn render(reports: &[ValidationReport], dir: &Path, out: &mut dyn Write) -> io::Result<()> {
    if reports.is_empty() {
        return writeln!(out, "No flows found in {}", dir.display());
    }

    for report in reports {
        match &report.result {
            Ok(flow) => {
                writeln!(out, "ok      {}", report.id)?;
                for warning in flow.warnings() {
                    writeln!(out, "        warning: {}", warning)?;
                }
            }
            Err(error) => writeln!(out, "FAILED  {}: {}", report.id, error)?,
        }
    }
    Ok(())
}
