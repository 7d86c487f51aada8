//! List command - enumerates stored flows

use std::io::{self, Write};
use std::path::Path;

use clap::Args;

use super::CliContext;
use crate::domain::FlowId;
use crate::infrastructure::services::{FlowListing, FlowSummary};

/// Arguments for the list command
#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    /// Also print name, description, step count and variables
    #[arg(long, short)]
    pub detail: bool,
}

/// List stored flows on stdout
pub async fn run(ctx: &CliContext, args: ListArgs) -> anyhow::Result<()> {
    let mut out = io::stdout();

    if args.detail {
        let listings = ctx.service.list_detailed().await?;
        render_detailed(&listings, &ctx.flows_dir(), &mut out)?;
    } else {
        let ids = ctx.service.list().await?;
        render_ids(&ids, &ctx.flows_dir(), &mut out)?;
    }

    Ok(())
}

fn render_empty(dir: &Path, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "No flows found in {}", dir.display())
}

pub fn render_ids(ids: &[FlowId], dir: &Path, out: &mut dyn Write) -> io::Result<()> {
    if ids.is_empty() {
        return render_empty(dir, out);
    }

    for id in ids {
        writeln!(out, "{}", id)?;
    }
    Ok(())
}

pub fn render_detailed(
    listings: &[FlowListing],
    dir: &Path,
    out: &mut dyn Write,
) -> io::Result<()> {
    if listings.is_empty() {
        return render_empty(dir, out);
    }

    for (index, listing) in listings.iter().enumerate() {
        if index > 0 {
            writeln!(out)?;
        }

        writeln!(out, "{}", listing.id())?;
        match listing {
            FlowListing::Loaded(summary) => render_summary(summary, out)?,
            FlowListing::Failed { error, .. } => writeln!(out, "  Failed to load: {}", error)?,
        }
    }
    Ok(())
}

fn render_summary(summary: &FlowSummary, out: &mut dyn Write) -> io::Result<()> {
    let variables = if summary.variables.is_empty() {
        "(none)".to_string()
    } else {
        summary.variables.join(", ")
    };

    writeln!(out, "  Name:        {}", summary.name)?;
    if !summary.description.is_empty() {
        writeln!(out, "  Description: {}", summary.description)?;
    }
    writeln!(out, "  Steps:       {}", summary.step_count)?;
    writeln!(out, "  Variables:   {}", variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tempfile::TempDir;

    const TRIAGE: &str = r#"{
        "schema": "pmp-flow/v1",
        "id": "triage",
        "name": "Triage",
        "description": "Classify and answer",
        "variables": { "question": "", "tone": "neutral" },
        "initialStep": "classify",
        "steps": {
            "classify": { "type": "prompt", "prompt": "Classify: ${question}", "next": "done" },
            "done": { "type": "end" }
        }
    }"#;

    fn context(dir: &TempDir) -> CliContext {
        CliContext::new(dir.path().to_path_buf(), AppConfig::default())
    }

    fn output(render: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buffer = Vec::new();
        render(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[tokio::test]
    async fn test_empty_root_prints_no_flows_found() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let ids = ctx.service.list().await.unwrap();
        let text = output(|out| render_ids(&ids, &ctx.flows_dir(), out));
        assert!(text.starts_with("No flows found"));

        let listings = ctx.service.list_detailed().await.unwrap();
        let text = output(|out| render_detailed(&listings, &ctx.flows_dir(), out));
        assert!(text.starts_with("No flows found"));

        run(&ctx, ListArgs { detail: false }).await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_listing() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        ctx.service.import(TRIAGE.as_bytes(), false).await.unwrap();

        let ids = ctx.service.list().await.unwrap();
        let text = output(|out| render_ids(&ids, &ctx.flows_dir(), out));
        assert_eq!(text, "triage\n");
    }

    #[tokio::test]
    async fn test_detailed_listing_reports_corrupt_flow_and_continues() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        ctx.service.import(TRIAGE.as_bytes(), false).await.unwrap();
        std::fs::write(ctx.flows_dir().join("broken.json"), "{ not json").unwrap();

        let listings = ctx.service.list_detailed().await.unwrap();
        let text = output(|out| render_detailed(&listings, &ctx.flows_dir(), out));

        let expected_triage = concat!(
            "triage\n",
            "  Name:        Triage\n",
            "  Description: Classify and answer\n",
            "  Steps:       2\n",
            "  Variables:   question, tone\n",
        );
        assert!(
            text.starts_with("broken\n  Failed to load: Validation error: Malformed flow document")
        );
        assert!(text.ends_with(expected_triage));
    }

    #[test]
    fn test_summary_without_variables_or_description() {
        let summary = FlowSummary {
            id: FlowId::new("bare").unwrap(),
            name: "Bare".to_string(),
            description: String::new(),
            step_count: 1,
            variables: vec![],
        };

        let text = output(|out| render_summary(&summary, out));
        assert_eq!(text, "  Name:        Bare\n  Steps:       1\n  Variables:   (none)\n");
    }
}
