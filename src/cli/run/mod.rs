//! Run command - executes a stored flow

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::CliContext;
use crate::domain::FlowRun;
use crate::infrastructure::flow::{FlowEngine, FlowEngineConfig};
use crate::infrastructure::llm::LlmProviderFactory;
use crate::infrastructure::tool::StaticToolResolver;

/// Arguments for the run command
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Flow ID
    pub id: String,

    /// Input variable as NAME=VALUE (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Print the full run record as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run a flow; Ctrl-C cancels the in-flight step
pub async fn run(ctx: &CliContext, args: RunArgs) -> anyhow::Result<()> {
    let engine = build_engine(ctx)?;
    let inputs: BTreeMap<String, String> = args.vars.into_iter().collect();

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    let result = ctx.service.run(&engine, &args.id, inputs, cancel).await;
    interrupt.abort();

    let run = result.with_context(|| format!("Flow '{}' failed", args.id))?;

    let mut out = io::stdout();
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&run)?)?;
    } else {
        render(&run, &mut out)?;
    }

    Ok(())
}

fn build_engine(ctx: &CliContext) -> anyhow::Result<FlowEngine> {
    let provider = LlmProviderFactory::create(&ctx.config.provider)?;
    let engine = FlowEngine::with_config(provider, FlowEngineConfig::from(&ctx.config.engine));

    if ctx.config.mcp_servers.is_empty() {
        return Ok(engine);
    }

    let resolver = StaticToolResolver::from_config(&ctx.config.mcp_servers);
    Ok(engine.with_tool_resolver(Arc::new(resolver)))
}

/// Parse a `NAME=VALUE` pair; the value may itself contain `=`
pub fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid variable '{}': expected NAME=VALUE", raw))?;

    if name.trim().is_empty() {
        return Err(format!("invalid variable '{}': name is empty", raw));
    }

    Ok((name.trim().to_string(), value.to_string()))
}

/// Human-readable run summary followed by the last prompt answer
pub fn render(run: &FlowRun, out: &mut dyn Write) -> io::Result<()> {
    writeln!(
        out,
        "Flow '{}' completed in {} ms (run {})",
        run.flow_id(),
        run.elapsed_ms(),
        run.run_id()
    )?;

    let width = run.steps().iter().map(|s| s.step_id.len()).max().unwrap_or(0);
    for record in run.steps() {
        write!(
            out,
            "  {:<width$}  {:<9}  attempts={}",
            record.step_id,
            record.kind,
            record.attempts,
            width = width
        )?;
        match &record.next {
            Some(next) => writeln!(out, "  -> {}", next)?,
            None => writeln!(out)?,
        }
    }

    let answer = run
        .steps()
        .iter()
        .rev()
        .filter_map(|record| record.output.as_ref())
        .find_map(|output| output.get("content").and_then(|c| c.as_str()));

    if let Some(answer) = answer {
        writeln!(out)?;
        writeln!(out, "{}", answer)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ProviderConfig};
    use crate::domain::flow::{validate, ConditionEntry, ConditionStep, PromptStep, Step};
    use crate::domain::llm::MockLlmProvider;
    use crate::domain::{FlowDefinition, FlowId};
    use tempfile::TempDir;

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("a=b"), Ok(("a".to_string(), "b".to_string())));
        assert_eq!(parse_var("q=x=y"), Ok(("q".to_string(), "x=y".to_string())));
        assert_eq!(parse_var("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=value").is_err());
    }

    #[tokio::test]
    async fn test_render_summary() {
        let flow = validate(
            FlowDefinition::new(FlowId::new("triage").unwrap(), "Triage", "classify")
                .with_step("classify", Step::Prompt(PromptStep::new("Classify", "route")))
                .with_step(
                    "route",
                    Step::Condition(ConditionStep::new(vec![ConditionEntry::new("true", "done")])),
                )
                .with_step("done", Step::End),
        )
        .unwrap();

        let provider = Arc::new(MockLlmProvider::new().with_text("bug"));
        let engine = FlowEngine::with_config(
            provider,
            FlowEngineConfig {
                default_model: Some("test-model".to_string()),
                ..FlowEngineConfig::default()
            },
        );
        let run = engine
            .run(&flow, BTreeMap::new(), CancellationToken::new())
            .await
            .unwrap();

        let mut buffer = Vec::new();
        render(&run, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("Flow 'triage' completed in "));
        assert_eq!(lines[1], "  classify  prompt     attempts=1  -> route");
        assert_eq!(lines[2], "  route     condition  attempts=1  -> done");
        assert_eq!(lines[3], "  done      end        attempts=1");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "bug");
    }

    #[test]
    fn test_build_engine_requires_api_key() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            provider: ProviderConfig {
                api_key_env: "PMP_FLOW_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
                ..ProviderConfig::default()
            },
            ..AppConfig::default()
        };
        let ctx = CliContext::new(dir.path().to_path_buf(), config);

        let err = build_engine(&ctx).unwrap_err();
        assert!(err.to_string().contains("PMP_FLOW_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
