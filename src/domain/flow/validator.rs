//! Structural validation of flow graphs

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Deref;

use tracing::warn;

use super::context::Substitutor;
use super::entity::FlowDefinition;
use super::error::FlowError;
use super::expression::Expression;
use super::step_types::Step;

/// A definition that passed every load-time check
///
/// Only the validator constructs this, so holding one is proof the graph is
/// well-formed: the initial step exists, all targets resolve, the reachable
/// graph is acyclic and every reachable step can reach an End step.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFlow {
    definition: FlowDefinition,
    warnings: Vec<String>,
}

impl ValidatedFlow {
    pub fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    pub fn into_definition(self) -> FlowDefinition {
        self.definition
    }

    /// Non-fatal findings (unreachable steps, unknown placeholder roots)
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl Deref for ValidatedFlow {
    type Target = FlowDefinition;

    fn deref(&self) -> &Self::Target {
        &self.definition
    }
}

/// Run every structural check, in order
pub fn validate(definition: FlowDefinition) -> Result<ValidatedFlow, FlowError> {
    check_initial_step(&definition)?;

    for (step_id, step) in definition.steps() {
        step.validate(step_id)?;
    }

    check_references(&definition)?;
    check_acyclic(&definition)?;
    check_end_reachability(&definition)?;

    let warnings = collect_warnings(&definition);
    for warning in &warnings {
        warn!(flow = %definition.id(), "{}", warning);
    }

    Ok(ValidatedFlow {
        definition,
        warnings,
    })
}

fn check_initial_step(definition: &FlowDefinition) -> Result<(), FlowError> {
    if definition.step(definition.initial_step()).is_none() {
        return Err(FlowError::validation(format!(
            "Initial step '{}' is not defined in steps",
            definition.initial_step()
        )));
    }
    Ok(())
}

fn check_references(definition: &FlowDefinition) -> Result<(), FlowError> {
    for (step_id, step) in definition.steps() {
        for target in step.successors() {
            if definition.step(target).is_none() {
                return Err(FlowError::validation(format!(
                    "Step '{}' references unknown step '{}'",
                    step_id, target
                )));
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    InProgress,
    Done,
}

/// Three-color depth-first traversal from the initial step
///
/// Iterative so deep graphs cannot overflow the stack. Reaching a node that
/// is still in progress closes a cycle; the error names that edge.
fn check_acyclic(definition: &FlowDefinition) -> Result<(), FlowError> {
    let mut colors: HashMap<&str, Color> = HashMap::new();
    let mut stack: Vec<(&str, Vec<&str>, usize)> = Vec::new();

    let initial = definition.initial_step();
    colors.insert(initial, Color::InProgress);
    stack.push((initial, successors(definition, initial), 0));

    while let Some((node, next, index)) = stack.last_mut() {
        let Some(&target) = next.get(*index) else {
            colors.insert(*node, Color::Done);
            stack.pop();
            continue;
        };
        *index += 1;
        let node = *node;

        match colors.get(target) {
            Some(Color::InProgress) => return Err(FlowError::cycle_detected(node, target)),
            Some(Color::Done) => {}
            None => {
                colors.insert(target, Color::InProgress);
                stack.push((target, successors(definition, target), 0));
            }
        }
    }

    Ok(())
}

fn successors<'a>(definition: &'a FlowDefinition, step_id: &str) -> Vec<&'a str> {
    definition
        .step(step_id)
        .map(Step::successors)
        .unwrap_or_default()
}

/// Step IDs reachable from the initial step, in discovery order
pub(crate) fn reachable(definition: &FlowDefinition) -> Vec<&str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();
    let mut pending = vec![definition.initial_step()];

    while let Some(step_id) = pending.pop() {
        if !seen.insert(step_id) {
            continue;
        }
        order.push(step_id);
        for target in successors(definition, step_id).into_iter().rev() {
            if !seen.contains(target) {
                pending.push(target);
            }
        }
    }

    order
}

/// Every reachable step must have at least one path to an End step
///
/// Computed as a backward closure from the End steps over the reachable
/// subgraph. With acyclicity and referential integrity already established
/// this cannot fail, but it does not depend on either check.
pub(crate) fn check_end_reachability(definition: &FlowDefinition) -> Result<(), FlowError> {
    let reachable = reachable(definition);

    let mut terminates: HashSet<&str> = reachable
        .iter()
        .copied()
        .filter(|id| definition.step(id).is_some_and(Step::is_end))
        .collect();

    loop {
        let before = terminates.len();
        for &step_id in &reachable {
            if terminates.contains(step_id) {
                continue;
            }
            if successors(definition, step_id)
                .iter()
                .any(|target| terminates.contains(target))
            {
                terminates.insert(step_id);
            }
        }
        if terminates.len() == before {
            break;
        }
    }

    match reachable.iter().find(|id| !terminates.contains(*id)) {
        Some(step_id) => Err(FlowError::validation(format!(
            "Step '{}' never reaches an end step",
            step_id
        ))),
        None => Ok(()),
    }
}

fn collect_warnings(definition: &FlowDefinition) -> Vec<String> {
    let mut warnings = Vec::new();

    let reachable: HashSet<&str> = reachable(definition).into_iter().collect();
    for step_id in definition.steps().keys() {
        if !reachable.contains(step_id.as_str()) {
            warnings.push(format!("Step '{}' is unreachable from the initial step", step_id));
        }
    }

    let mut known: BTreeSet<&str> = definition.variables().keys().map(String::as_str).collect();
    known.extend(definition.steps().keys().map(String::as_str));

    for (step_id, step) in definition.steps() {
        let mut roots: Vec<String> = Vec::new();
        let mut local: BTreeSet<&str> = BTreeSet::new();

        match step {
            Step::Prompt(prompt) => {
                local.extend(prompt.context.keys().map(String::as_str));
                let templates = std::iter::once(&prompt.prompt)
                    .chain(prompt.system_prompt.iter())
                    .chain(prompt.context.values());
                for template in templates {
                    roots.extend(
                        Substitutor::extract_placeholders(template)
                            .into_iter()
                            .filter(|r| !r.has_default())
                            .map(|r| r.root().to_string()),
                    );
                }
            }
            Step::Condition(condition) => {
                for entry in &condition.conditions {
                    if let Ok(expression) = Expression::parse(&entry.expression) {
                        roots.extend(
                            expression
                                .references()
                                .into_iter()
                                .map(|path| path.split('.').next().unwrap_or(path).to_string()),
                        );
                    }
                }
            }
            Step::End => {}
        }

        for root in roots {
            if !known.contains(root.as_str()) && !local.contains(root.as_str()) {
                warnings.push(format!(
                    "Step '{}' references '{}', which is neither a variable nor a step",
                    step_id, root
                ));
            }
        }
    }

    warnings.dedup();
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::entity::FlowId;
    use crate::domain::flow::step_types::{ConditionEntry, ConditionStep, PromptStep};

    fn flow(initial: &str) -> FlowDefinition {
        FlowDefinition::new(FlowId::new("test").unwrap(), "Test", initial)
    }

    fn prompt(next: &str) -> Step {
        Step::Prompt(PromptStep::new("hi", next))
    }

    fn branch(on_true: &str, on_false: &str) -> Step {
        Step::Condition(ConditionStep::new(vec![
            ConditionEntry::new("true", on_true).with_on_false(on_false),
        ]))
    }

    #[test]
    fn test_valid_linear_flow() {
        let flow = flow("s1")
            .with_step("s1", prompt("s2"))
            .with_step("s2", Step::End);
        let validated = validate(flow).unwrap();
        assert!(validated.warnings().is_empty());
        assert_eq!(validated.step_count(), 2);
    }

    #[test]
    fn test_missing_initial_step() {
        let err = validate(flow("start").with_step("done", Step::End)).unwrap_err();
        assert!(matches!(err, FlowError::Validation(ref m) if m.contains("'start'")));
    }

    #[test]
    fn test_unknown_target() {
        let err = validate(flow("s1").with_step("s1", prompt("ghost"))).unwrap_err();
        assert_eq!(
            err,
            FlowError::validation("Step 's1' references unknown step 'ghost'")
        );

        let err = validate(
            flow("route")
                .with_step("route", branch("done", "missing"))
                .with_step("done", Step::End),
        )
        .unwrap_err();
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn test_two_step_cycle() {
        let err = validate(
            flow("a")
                .with_step("a", prompt("b"))
                .with_step("b", prompt("a"))
                .with_step("done", Step::End),
        )
        .unwrap_err();
        assert_eq!(err, FlowError::cycle_detected("b", "a"));
        assert!(err.is_validation_failure());
    }

    #[test]
    fn test_self_loop_through_condition() {
        let err = validate(
            flow("check")
                .with_step("check", branch("check", "done"))
                .with_step("done", Step::End),
        )
        .unwrap_err();
        assert_eq!(err, FlowError::cycle_detected("check", "check"));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let validated = validate(
            flow("route")
                .with_step("route", branch("left", "right"))
                .with_step("left", prompt("join"))
                .with_step("right", prompt("join"))
                .with_step("join", prompt("done"))
                .with_step("done", Step::End),
        );
        assert!(validated.is_ok());
    }

    #[test]
    fn test_unreachable_cycle_is_only_a_warning() {
        let validated = validate(
            flow("s1")
                .with_step("s1", prompt("done"))
                .with_step("done", Step::End)
                .with_step("x", prompt("y"))
                .with_step("y", prompt("x")),
        )
        .unwrap();
        assert_eq!(validated.warnings().len(), 2);
        assert!(validated.warnings()[0].contains("'x' is unreachable"));
    }

    #[test]
    fn test_end_reachability_on_endless_graph() {
        let definition = flow("a").with_step("a", prompt("b")).with_step("b", prompt("a"));

        let err = check_end_reachability(&definition).unwrap_err();
        assert!(
            matches!(err, FlowError::Validation(ref m) if m.contains("never reaches an end step"))
        );

        // Full validation stops at the cycle first; both are validation failures
        assert!(validate(definition).unwrap_err().is_validation_failure());
    }

    #[test]
    fn test_end_reachability_accepts_dag() {
        let definition = flow("route")
            .with_step("route", branch("done", "other"))
            .with_step("other", prompt("done"))
            .with_step("done", Step::End);
        assert!(check_end_reachability(&definition).is_ok());
    }

    #[test]
    fn test_per_step_validation_runs() {
        let err = validate(
            flow("s1")
                .with_step("s1", Step::Prompt(PromptStep::new("hi", "done").with_retry(0, 0)))
                .with_step("done", Step::End),
        )
        .unwrap_err();
        assert!(err.to_string().contains("maxAttempts"));
    }

    #[test]
    fn test_unknown_placeholder_root_warns() {
        let validated = validate(
            flow("ask")
                .with_variable("topic", "")
                .with_step(
                    "ask",
                    Step::Prompt(
                        PromptStep::new("${topic} ${lang} ${mystery} ${opt:x}", "route")
                            .with_context("lang", "en"),
                    ),
                )
                .with_step(
                    "route",
                    Step::Condition(ConditionStep::new(vec![
                        ConditionEntry::new("ask.content == 'x' && ghost", "done")
                            .with_on_false("done"),
                    ])),
                )
                .with_step("done", Step::End),
        )
        .unwrap();

        assert_eq!(validated.warnings().len(), 2);
        assert!(validated.warnings()[0].contains("'mystery'"));
        assert!(validated.warnings()[1].contains("'ghost'"));
    }

    #[test]
    fn test_reachable_order() {
        let definition = flow("route")
            .with_step("route", branch("left", "right"))
            .with_step("left", prompt("done"))
            .with_step("right", prompt("done"))
            .with_step("done", Step::End)
            .with_step("orphan", Step::End);
        assert_eq!(reachable(&definition), vec!["route", "left", "done", "right"]);
    }
}
