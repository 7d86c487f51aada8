//! Flow execution engine

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

use crate::domain::flow::{
    ConditionStep, FlowDefinition, FlowError, FlowId, FlowRun, FlowState, PromptStep, RunState,
    Scope, Step, StepRecord, SubstitutionPolicy, Substitutor, Transition, ValidatedFlow,
};
use crate::domain::{
    DomainError, LlmProvider, LlmRequest, LlmResponse, Message, ToolDefinition, ToolResolver,
};
use crate::infrastructure::observability::{
    attempt_outcome, record_flow_run, record_step_attempt, run_outcome, StepAttemptMetricParams,
};

/// Configuration for the flow engine
#[derive(Debug, Clone)]
pub struct FlowEngineConfig {
    /// Per-attempt timeout for steps that do not declare one, in milliseconds
    pub default_timeout_ms: u64,

    /// Model for prompt steps that do not name one
    pub default_model: Option<String>,

    /// How unresolved placeholders are handled
    pub substitution: SubstitutionPolicy,
}

impl Default for FlowEngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 60000, // 60 seconds
            default_model: None,
            substitution: SubstitutionPolicy::Strict,
        }
    }
}

/// Walks a validated flow from its initial step to an End step
///
/// The engine holds no per-run state; concurrent runs on one engine are
/// independent.
pub struct FlowEngine {
    llm_provider: Arc<dyn LlmProvider>,
    tool_resolver: Option<Arc<dyn ToolResolver>>,
    config: FlowEngineConfig,
}

impl fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowEngine")
            .field("llm_provider", &self.llm_provider.provider_name())
            .field("tool_resolver", &self.tool_resolver.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Result of one bounded provider attempt
enum AttemptOutcome {
    Success(LlmResponse),
    Retryable(FlowError),
    Fatal(FlowError),
}

/// What a step produced
struct StepOutcome {
    output: Option<Value>,
    attempts: u32,
    transition: Transition,
}

/// Mutable state of a single run
struct RunContext {
    state: FlowState,
    history: Vec<Message>,
    records: Vec<StepRecord>,
    transitions: Vec<RunState>,
    visited: HashSet<String>,
}

impl RunContext {
    fn new(variables: BTreeMap<String, String>) -> Self {
        Self {
            state: FlowState::new(variables),
            history: Vec::new(),
            records: Vec::new(),
            transitions: vec![RunState::Idle],
            visited: HashSet::new(),
        }
    }

    /// Enter a step; re-entering a visited step is a cycle
    fn enter(&mut self, step_id: &str) -> Result<(), FlowError> {
        if !self.visited.insert(step_id.to_string()) {
            let from = self
                .records
                .last()
                .map(|r| r.step_id.clone())
                .unwrap_or_else(|| step_id.to_string());
            return Err(FlowError::cycle_detected(from, step_id));
        }

        self.transitions.push(RunState::Running {
            step: step_id.to_string(),
        });
        Ok(())
    }

    /// Close the trail with `Failed` and hand it back with the error
    fn fail(&mut self, step_id: &str, error: FlowError) -> Aborted {
        self.transitions.push(RunState::Failed {
            step: step_id.to_string(),
            cause: error.to_string(),
        });
        Aborted {
            error,
            transitions: std::mem::take(&mut self.transitions),
        }
    }
}

/// A run that stopped before reaching an End step
struct Aborted {
    error: FlowError,
    transitions: Vec<RunState>,
}

impl FlowEngine {
    /// Create a new engine
    pub fn new(llm_provider: Arc<dyn LlmProvider>) -> Self {
        Self::with_config(llm_provider, FlowEngineConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(llm_provider: Arc<dyn LlmProvider>, config: FlowEngineConfig) -> Self {
        Self {
            llm_provider,
            tool_resolver: None,
            config,
        }
    }

    pub fn with_tool_resolver(mut self, tool_resolver: Arc<dyn ToolResolver>) -> Self {
        self.tool_resolver = Some(tool_resolver);
        self
    }

    pub fn config(&self) -> &FlowEngineConfig {
        &self.config
    }

    /// Execute a flow to completion
    ///
    /// `inputs` override declared variable defaults. Cancelling `cancel`
    /// aborts the in-flight call or backoff and fails the run with
    /// `FlowError::Cancelled`.
    #[instrument(
        name = "flow_run",
        skip_all,
        fields(flow_id = %flow.id(), run_id = tracing::field::Empty)
    )]
    pub async fn run(
        &self,
        flow: &ValidatedFlow,
        inputs: BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<FlowRun, FlowError> {
        let run_id = Uuid::new_v4();
        Span::current().record("run_id", tracing::field::display(run_id));

        let started_at = Utc::now();
        let start = Instant::now();

        info!("flow_started");

        let result = self.run_steps(flow, inputs, &cancel).await;
        let elapsed = start.elapsed();

        let run = match result {
            Ok(run) => run,
            Err(Aborted { error, transitions }) => {
                record_flow_run(flow.id().as_str(), run_outcome(&Err(&error)), elapsed);
                error!(error = %error, states = ?transitions, "flow_failed");
                return Err(error);
            }
        };
        record_flow_run(flow.id().as_str(), run_outcome(&Ok(())), elapsed);

        let elapsed_ms = elapsed.as_millis() as u64;
        info!(steps = run.records.len(), elapsed_ms, "flow_completed");

        Ok(FlowRun::new(
            run_id,
            flow.id().clone(),
            started_at,
            elapsed_ms,
            run.state,
            run.records,
            run.transitions,
        ))
    }

    async fn run_steps(
        &self,
        flow: &ValidatedFlow,
        inputs: BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<RunContext, Aborted> {
        let variables = resolve_inputs(flow, inputs).map_err(|error| Aborted {
            error,
            transitions: vec![RunState::Idle],
        })?;
        let mut run = RunContext::new(variables);
        let mut current = flow.initial_step().to_string();

        loop {
            if cancel.is_cancelled() {
                return Err(run.fail(&current, FlowError::cancelled(&current)));
            }

            if let Err(e) = run.enter(&current) {
                return Err(run.fail(&current, e));
            }

            let Some(step) = flow.step(&current) else {
                let e = FlowError::validation(format!("Step '{}' is not defined", current));
                return Err(run.fail(&current, e));
            };

            debug!(step = %current, kind = step.type_name(), "Executing step");
            let step_start = Instant::now();

            let outcome = match step {
                Step::Prompt(prompt) => {
                    self.execute_prompt(flow.id(), &current, prompt, &mut run, cancel)
                        .await
                }
                Step::Condition(condition) => execute_condition(&current, condition, &run.state),
                Step::End => Ok(StepOutcome {
                    output: None,
                    attempts: 1,
                    transition: Transition::Terminal,
                }),
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => return Err(run.fail(&current, e)),
            };

            if let Some(output) = &outcome.output {
                run.state.record_output(current.as_str(), output.clone());
            }

            let next = match &outcome.transition {
                Transition::Next(next) => Some(next.clone()),
                Transition::Terminal => None,
            };

            run.records.push(StepRecord {
                step_id: current.clone(),
                kind: step.type_name(),
                attempts: outcome.attempts,
                output: outcome.output,
                next,
                elapsed_ms: step_start.elapsed().as_millis() as u64,
            });

            match outcome.transition {
                Transition::Next(next) => current = next,
                Transition::Terminal => {
                    run.transitions.push(RunState::Completed);
                    return Ok(run);
                }
            }
        }
    }

    async fn execute_prompt(
        &self,
        flow_id: &FlowId,
        step_id: &str,
        step: &PromptStep,
        run: &mut RunContext,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, FlowError> {
        let model = step
            .model
            .as_deref()
            .or(self.config.default_model.as_deref())
            .ok_or_else(|| {
                FlowError::validation(format!(
                    "Step '{}' names no model and no default model is configured",
                    step_id
                ))
            })?
            .to_string();

        let substitutor = Substitutor::new(self.config.substitution);

        // Context bindings resolve against the run state only, not each other
        let mut bindings = BTreeMap::new();
        for (name, template) in &step.context {
            bindings.insert(name.clone(), substitutor.substitute(template, &run.state)?);
        }
        let scope = Scope::new(&run.state, &bindings);

        let user_prompt = substitutor.substitute(&step.prompt, &scope)?;
        let system_prompt = step
            .system_prompt
            .as_ref()
            .map(|template| substitutor.substitute(template, &scope))
            .transpose()?;

        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(Message::system(system));
        }
        if step.include_history {
            messages.extend(run.history.iter().cloned());
        }
        messages.push(Message::user(user_prompt.as_str()));

        let timeout_ms = step.timeout_ms.unwrap_or(self.config.default_timeout_ms);
        let max_attempts = step.retry.max_attempts.max(1);
        let mut attempt = 1;

        let response = loop {
            let outcome = self
                .attempt(step_id, step, &model, messages.clone(), timeout_ms, cancel)
                .await;

            let observed = match &outcome {
                AttemptOutcome::Success(_) => Ok(()),
                AttemptOutcome::Retryable(e) | AttemptOutcome::Fatal(e) => Err(e),
            };
            record_step_attempt(StepAttemptMetricParams {
                flow: flow_id.as_str(),
                step: step_id,
                outcome: attempt_outcome(&observed),
            });

            match outcome {
                AttemptOutcome::Success(response) => break response,
                AttemptOutcome::Fatal(e) => return Err(e),
                AttemptOutcome::Retryable(e) if attempt >= max_attempts => {
                    return Err(FlowError::terminal(step_id, attempt, e));
                }
                AttemptOutcome::Retryable(e) => {
                    warn!(
                        step = step_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Step attempt failed, retrying"
                    );
                    run.transitions.push(RunState::AwaitingRetry {
                        step: step_id.to_string(),
                        attempt,
                    });

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FlowError::cancelled(step_id)),
                        _ = tokio::time::sleep(Duration::from_millis(step.retry.backoff_ms)) => {}
                    }

                    attempt += 1;
                    run.transitions.push(RunState::Running {
                        step: step_id.to_string(),
                    });
                }
            }
        };

        let content = response.content().to_string();
        debug!(step = step_id, attempts = attempt, "Prompt step completed");

        let mut output = json!({
            "content": content,
            "model": response.model,
            "finishReason": response.finish_reason,
            "attempts": attempt,
        });
        if let Ok(parsed) = serde_json::from_str::<Value>(&content) {
            output["json"] = parsed;
        }

        run.history.push(Message::user(user_prompt));
        run.history.push(Message::assistant(content));

        Ok(StepOutcome {
            output: Some(output),
            attempts: attempt,
            transition: Transition::Next(step.next.clone()),
        })
    }

    /// One attempt: tool resolution plus provider call, bounded by the timeout
    ///
    /// Whatever branch wins, the losing futures (including the in-flight
    /// call) are dropped before this returns.
    async fn attempt(
        &self,
        step_id: &str,
        step: &PromptStep,
        model: &str,
        messages: Vec<Message>,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let call = self.call(step_id, step, model, messages);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => AttemptOutcome::Fatal(FlowError::cancelled(step_id)),
            result = tokio::time::timeout(Duration::from_millis(timeout_ms), call) => match result {
                Err(_) => AttemptOutcome::Retryable(FlowError::timeout(step_id, timeout_ms)),
                Ok(Ok(response)) => AttemptOutcome::Success(response),
                Ok(Err(e)) if e.is_retryable() => AttemptOutcome::Retryable(e),
                Ok(Err(e)) => AttemptOutcome::Fatal(e),
            },
        }
    }

    async fn call(
        &self,
        step_id: &str,
        step: &PromptStep,
        model: &str,
        messages: Vec<Message>,
    ) -> Result<LlmResponse, FlowError> {
        let mut builder = LlmRequest::builder().messages(messages);

        if let Some(server) = step.mcp_server.as_deref().filter(|_| !step.tools.is_empty()) {
            builder = builder.tools(self.resolve_tools(step_id, server, &step.tools).await?);
        }

        self.llm_provider
            .chat(model, builder.build())
            .await
            .map_err(|e| FlowError::provider(step_id, e.to_string()))
    }

    async fn resolve_tools(
        &self,
        step_id: &str,
        server: &str,
        tools: &[String],
    ) -> Result<Vec<ToolDefinition>, FlowError> {
        let Some(resolver) = &self.tool_resolver else {
            return Err(FlowError::tool_resolution(
                step_id,
                format!("no tool resolver configured for server '{}'", server),
            ));
        };

        resolver
            .resolve(server, tools)
            .await
            .map_err(|e| classify_tool_error(step_id, e))
    }
}

/// Transport failures are retryable; unknown servers or tools are not
fn classify_tool_error(step_id: &str, error: DomainError) -> FlowError {
    if error.is_transient() {
        FlowError::provider(step_id, error.to_string())
    } else {
        FlowError::tool_resolution(step_id, error.to_string())
    }
}

fn execute_condition(
    step_id: &str,
    step: &ConditionStep,
    state: &FlowState,
) -> Result<StepOutcome, FlowError> {
    let branch = step.select(step_id, state)?;

    debug!(
        step = step_id,
        target = %branch.target,
        matched = ?branch.matched,
        "Condition evaluated"
    );

    Ok(StepOutcome {
        output: Some(json!({
            "expression": branch.matched,
            "target": branch.target,
        })),
        attempts: 1,
        transition: Transition::Next(branch.target),
    })
}

/// Declared defaults overridden by caller inputs; undeclared inputs are rejected
fn resolve_inputs(
    flow: &FlowDefinition,
    inputs: BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, FlowError> {
    let mut variables = flow.variables().clone();

    for (name, value) in inputs {
        match variables.get_mut(&name) {
            Some(slot) => *slot = value,
            None => {
                return Err(FlowError::validation(format!(
                    "Input '{}' is not a declared variable of flow '{}'",
                    name,
                    flow.id()
                )));
            }
        }
    }

    Ok(variables)
}
