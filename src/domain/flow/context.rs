//! Run state and variable substitution
//!
//! Templates reference the run state with `${path}` or `${path:default}`.
//! The first path segment names a step-local context binding, a step output
//! or a declared variable (in that order of precedence); further segments walk
//! into JSON objects, numeric segments index arrays.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::FlowError;

/// Regex for a placeholder: ${path} or ${path:default}
static PLACEHOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*)\s*(?::([^}]*))?\}").unwrap()
});

/// Read access to values addressable by a dotted path
pub trait Lookup {
    fn lookup(&self, path: &str) -> Option<Value>;
}

/// Accumulated state of one run: declared variables plus recorded step outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    variables: BTreeMap<String, String>,
    outputs: BTreeMap<String, Value>,
}

impl FlowState {
    pub fn new(variables: BTreeMap<String, String>) -> Self {
        Self {
            variables,
            outputs: BTreeMap::new(),
        }
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.outputs
    }

    /// Record a step's output under its step ID
    pub fn record_output(&mut self, step_id: impl Into<String>, output: Value) {
        self.outputs.insert(step_id.into(), output);
    }

    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    /// Flatten into one object; outputs win over variables of the same name
    pub fn to_value(&self) -> Value {
        let mut merged = serde_json::Map::new();

        for (name, value) in &self.variables {
            merged.insert(name.clone(), Value::String(value.clone()));
        }

        for (step_id, output) in &self.outputs {
            merged.insert(step_id.clone(), output.clone());
        }

        Value::Object(merged)
    }
}

impl Lookup for FlowState {
    fn lookup(&self, path: &str) -> Option<Value> {
        let (root, rest) = split_root(path);

        if let Some(output) = self.outputs.get(root) {
            return get_nested_field(output, rest).cloned();
        }

        let variable = self.variables.get(root)?;
        match rest {
            None => Some(Value::String(variable.clone())),
            Some(_) => None,
        }
    }
}

/// Step-local bindings layered over the run state
#[derive(Debug)]
pub struct Scope<'a> {
    base: &'a FlowState,
    bindings: &'a BTreeMap<String, String>,
}

impl<'a> Scope<'a> {
    pub fn new(base: &'a FlowState, bindings: &'a BTreeMap<String, String>) -> Self {
        Self { base, bindings }
    }
}

impl Lookup for Scope<'_> {
    fn lookup(&self, path: &str) -> Option<Value> {
        let (root, rest) = split_root(path);

        match (self.bindings.get(root), rest) {
            (Some(value), None) => Some(Value::String(value.clone())),
            (Some(_), Some(_)) => None,
            (None, _) => self.base.lookup(path),
        }
    }
}

/// What to do with a placeholder that resolves to nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionPolicy {
    /// Fail the step with `MissingVariable`
    #[default]
    Strict,

    /// Substitute the empty string
    Tolerant,
}

/// Literal placeholder interpolation; never evaluates code
#[derive(Debug, Clone, Copy, Default)]
pub struct Substitutor {
    policy: SubstitutionPolicy,
}

impl Substitutor {
    pub fn new(policy: SubstitutionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> SubstitutionPolicy {
        self.policy
    }

    /// Replace every placeholder in one pass; substituted text is not rescanned
    pub fn substitute(&self, template: &str, scope: &dyn Lookup) -> Result<String, FlowError> {
        let mut result = String::with_capacity(template.len());
        let mut last_end = 0;

        for caps in PLACEHOLDER_PATTERN.captures_iter(template) {
            let full_match = caps.get(0).unwrap();
            let path = caps.get(1).unwrap().as_str();
            let default = caps.get(2).map(|m| m.as_str());

            result.push_str(&template[last_end..full_match.start()]);

            match (scope.lookup(path), default) {
                (Some(value), _) => result.push_str(&value_to_string(&value)),
                (None, Some(default_value)) => result.push_str(default_value),
                (None, None) => match self.policy {
                    SubstitutionPolicy::Strict => {
                        return Err(FlowError::missing_variable(path));
                    }
                    SubstitutionPolicy::Tolerant => {}
                },
            }

            last_end = full_match.end();
        }

        result.push_str(&template[last_end..]);
        Ok(result)
    }

    /// Check if a string contains any placeholders
    pub fn has_placeholders(template: &str) -> bool {
        PLACEHOLDER_PATTERN.is_match(template)
    }

    /// Extract all placeholders from a template
    pub fn extract_placeholders(template: &str) -> Vec<VariableRef> {
        PLACEHOLDER_PATTERN
            .captures_iter(template)
            .map(|caps| VariableRef {
                path: caps.get(1).unwrap().as_str().to_string(),
                default: caps.get(2).map(|m| m.as_str().to_string()),
            })
            .collect()
    }
}

/// A parsed placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub path: String,
    pub default: Option<String>,
}

impl VariableRef {
    /// The first path segment
    pub fn root(&self) -> &str {
        split_root(&self.path).0
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

fn split_root(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((root, rest)) => (root, Some(rest)),
        None => (path, None),
    }
}

/// Get a nested field from a JSON value using dot notation
fn get_nested_field<'a>(value: &'a Value, path: Option<&str>) -> Option<&'a Value> {
    let Some(path) = path else {
        return Some(value);
    };

    let mut current = value;

    for part in path.split('.') {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

/// Convert a JSON value to a string representation
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),

        // For arrays and objects, use JSON representation
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> FlowState {
        let mut state = FlowState::new(BTreeMap::from([
            ("topic".to_string(), "Rust".to_string()),
            ("summary".to_string(), "declared".to_string()),
        ]));
        state.record_output(
            "search",
            json!({
                "documents": [
                    {"id": 1, "text": "First doc"},
                    {"id": 2, "text": "Second doc"}
                ],
                "count": 2
            }),
        );
        state.record_output("summary", json!({"content": "from step"}));
        state
    }

    #[test]
    fn test_lookup_variable_and_output() {
        let state = state();
        assert_eq!(state.lookup("topic"), Some(json!("Rust")));
        assert_eq!(state.lookup("search.count"), Some(json!(2)));
        assert_eq!(state.lookup("search.documents.1.text"), Some(json!("Second doc")));
        assert_eq!(state.lookup("search.documents.9.text"), None);
        assert_eq!(state.lookup("topic.length"), None);
        assert_eq!(state.lookup("unknown"), None);
    }

    #[test]
    fn test_outputs_take_precedence_over_variables() {
        let state = state();
        assert_eq!(state.lookup("summary.content"), Some(json!("from step")));

        let merged = state.to_value();
        assert_eq!(merged["summary"], json!({"content": "from step"}));
        assert_eq!(merged["topic"], json!("Rust"));
    }

    #[test]
    fn test_substitute_simple() {
        let result = Substitutor::default()
            .substitute("Tell me about ${topic}!", &state())
            .unwrap();
        assert_eq!(result, "Tell me about Rust!");
    }

    #[test]
    fn test_substitute_multiple_and_non_string_values() {
        let result = Substitutor::default()
            .substitute("${search.count} docs, first: ${search.documents.0}", &state())
            .unwrap();
        assert_eq!(result, r#"2 docs, first: {"id":1,"text":"First doc"}"#);
    }

    #[test]
    fn test_strict_missing_variable() {
        let err = Substitutor::new(SubstitutionPolicy::Strict)
            .substitute("Hello ${name}", &state())
            .unwrap_err();
        assert_eq!(err, FlowError::missing_variable("name"));
    }

    #[test]
    fn test_tolerant_missing_variable() {
        let result = Substitutor::new(SubstitutionPolicy::Tolerant)
            .substitute("Hello ${name}!", &state())
            .unwrap();
        assert_eq!(result, "Hello !");
    }

    #[test]
    fn test_default_value_applies_under_both_policies() {
        for policy in [SubstitutionPolicy::Strict, SubstitutionPolicy::Tolerant] {
            let result = Substitutor::new(policy)
                .substitute("Hello ${name:stranger}", &state())
                .unwrap();
            assert_eq!(result, "Hello stranger");
        }

        let result = Substitutor::default()
            .substitute("${topic:ignored}", &state())
            .unwrap();
        assert_eq!(result, "Rust");
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let state = FlowState::new(BTreeMap::from([
            ("a".to_string(), "${b}".to_string()),
            ("b".to_string(), "boom".to_string()),
        ]));
        let result = Substitutor::default().substitute("value: ${a}", &state).unwrap();
        assert_eq!(result, "value: ${b}");
    }

    #[test]
    fn test_scope_bindings_shadow_state() {
        let state = state();
        let bindings = BTreeMap::from([("topic".to_string(), "Go".to_string())]);
        let scope = Scope::new(&state, &bindings);

        let result = Substitutor::default()
            .substitute("${topic} vs ${search.count}", &scope)
            .unwrap();
        assert_eq!(result, "Go vs 2");
    }

    #[test]
    fn test_null_output_renders_empty() {
        let mut state = FlowState::default();
        state.record_output("s1", json!({"finishReason": null}));

        let strict = Substitutor::new(SubstitutionPolicy::Strict);
        assert_eq!(strict.substitute("[${s1.finishReason}]", &state).unwrap(), "[]");
        assert_eq!(strict.substitute("[${s1.finishReason:stop}]", &state).unwrap(), "[]");
        assert!(strict.substitute("${s1.missing}", &state).is_err());
    }

    #[test]
    fn test_extract_placeholders() {
        let refs = Substitutor::extract_placeholders("${a} and ${b.c:fallback} and $notone");
        assert_eq!(
            refs,
            vec![
                VariableRef {
                    path: "a".to_string(),
                    default: None
                },
                VariableRef {
                    path: "b.c".to_string(),
                    default: Some("fallback".to_string())
                },
            ]
        );
        assert_eq!(refs[1].root(), "b");
        assert!(refs[1].has_default());
        assert!(Substitutor::has_placeholders("x ${y}"));
        assert!(!Substitutor::has_placeholders("no placeholders"));
    }
}
