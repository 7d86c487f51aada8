//! Boolean predicates for condition steps
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | comparison
//! comparison := primary ( op primary )?
//! op         := "==" | "!=" | "<" | "<=" | ">" | ">=" | contains | startsWith | endsWith
//! primary    := literal | path | "${" path "}" | empty "(" or ")" | "(" or ")"
//! ```
//!
//! Evaluation only reads the run state; unresolved references are `null`.

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

use super::context::{value_to_string, Lookup};

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { found: char, position: usize },

    #[error("Unterminated {what} starting at position {position}")]
    Unterminated { what: &'static str, position: usize },

    #[error("Unexpected '{found}' at position {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        position: usize,
        expected: &'static str,
    },

    #[error("Unexpected end of expression, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Type mismatch during '{operation}': expected {expected}, but found '{found}'")]
    TypeMismatch {
        operation: &'static str,
        expected: &'static str,
        found: Value,
    },

    #[error("Expression evaluated to '{0}', expected a boolean")]
    NotBoolean(Value),

    #[error("Expression nests deeper than {0} levels")]
    TooDeep(usize),
}

impl ExpressionError {
    fn type_mismatch(operation: &'static str, expected: &'static str, found: &Value) -> Self {
        Self::TypeMismatch {
            operation,
            expected,
            found: found.clone(),
        }
    }
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Contains,
    StartsWith,
    EndsWith,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
        }
    }
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // Leaf nodes
    Literal(Value),
    Reference(String),

    // Logical
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),

    Compare(CompareOp, Box<Expression>, Box<Expression>),

    /// `empty(x)`: null, "", [] or {}
    Empty(Box<Expression>),
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            position: 0,
            depth: 0,
        };

        let expression = parser.parse_or()?;

        match parser.peek() {
            None => Ok(expression),
            Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                found: token.to_string(),
                position: *position,
                expected: "end of expression",
            }),
        }
    }

    /// Paths this expression reads from the run state
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Self::Literal(_) => {}
            Self::Reference(path) => refs.push(path),
            Self::Not(inner) | Self::Empty(inner) => inner.collect_references(refs),
            Self::And(l, r) | Self::Or(l, r) | Self::Compare(_, l, r) => {
                l.collect_references(refs);
                r.collect_references(refs);
            }
        }
    }

    pub fn evaluate(&self, state: &dyn Lookup) -> Result<Value, ExpressionError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Reference(path) => Ok(state.lookup(path).unwrap_or(Value::Null)),
            Self::Not(inner) => {
                let value = inner.evaluate(state)?;
                Ok(Value::Bool(!expect_bool("!", &value)?))
            }
            Self::And(l, r) => {
                if !expect_bool("&&", &l.evaluate(state)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool("&&", &r.evaluate(state)?)?))
            }
            Self::Or(l, r) => {
                if expect_bool("||", &l.evaluate(state)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool("||", &r.evaluate(state)?)?))
            }
            Self::Compare(op, l, r) => {
                let left = l.evaluate(state)?;
                let right = r.evaluate(state)?;
                compare(*op, &left, &right).map(Value::Bool)
            }
            Self::Empty(inner) => {
                let empty = match inner.evaluate(state)? {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    Value::Array(items) => items.is_empty(),
                    Value::Object(map) => map.is_empty(),
                    Value::Bool(_) | Value::Number(_) => false,
                };
                Ok(Value::Bool(empty))
            }
        }
    }

    /// Evaluate and require a boolean result
    pub fn evaluate_bool(&self, state: &dyn Lookup) -> Result<bool, ExpressionError> {
        match self.evaluate(state)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::NotBoolean(other)),
        }
    }
}

fn expect_bool(operation: &'static str, value: &Value) -> Result<bool, ExpressionError> {
    value
        .as_bool()
        .ok_or_else(|| ExpressionError::type_mismatch(operation, "boolean", value))
}

/// Numbers, and strings that parse as numbers
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_equal(left: &Value, right: &Value) -> bool {
    if left.is_number() || right.is_number() {
        if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
            return l == r;
        }
    }
    left == right
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Equal => Ok(loose_equal(left, right)),
        CompareOp::NotEqual => Ok(!loose_equal(left, right)),
        CompareOp::Less
        | CompareOp::LessOrEqual
        | CompareOp::Greater
        | CompareOp::GreaterOrEqual => {
            let ordering = order(op, left, right)?;
            Ok(match op {
                CompareOp::Less => ordering == Ordering::Less,
                CompareOp::LessOrEqual => ordering != Ordering::Greater,
                CompareOp::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        CompareOp::Contains => match left {
            Value::Null => Ok(false),
            Value::String(haystack) => Ok(haystack.contains(&value_to_string(right))),
            Value::Array(items) => Ok(items.iter().any(|item| loose_equal(item, right))),
            Value::Object(map) => Ok(right.as_str().is_some_and(|key| map.contains_key(key))),
            other => Err(ExpressionError::type_mismatch(
                op.as_str(),
                "string, array or object",
                other,
            )),
        },
        CompareOp::StartsWith | CompareOp::EndsWith => match left {
            Value::Null => Ok(false),
            Value::String(text) => {
                let affix = value_to_string(right);
                Ok(if op == CompareOp::StartsWith {
                    text.starts_with(&affix)
                } else {
                    text.ends_with(&affix)
                })
            }
            other => Err(ExpressionError::type_mismatch(op.as_str(), "string", other)),
        },
    }
}

fn order(op: CompareOp, left: &Value, right: &Value) -> Result<Ordering, ExpressionError> {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l
            .partial_cmp(&r)
            .ok_or_else(|| ExpressionError::type_mismatch(op.as_str(), "comparable numbers", left));
    }

    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        (Value::String(_), other) | (other, _) => Err(ExpressionError::type_mismatch(
            op.as_str(),
            "number or string",
            other,
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Number(Value),
    Text(String),
    Placeholder(String),
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "'{}'", s),
            Self::Placeholder(path) => write!(f, "${{{}}}", path),
            Self::Op(op) => write!(f, "{}", op.as_str()),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Not => write!(f, "!"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
        }
    }
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let starts_number =
            c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit()));

        let token = match (c, next) {
            ('(', _) => {
                i += 1;
                Token::LParen
            }
            (')', _) => {
                i += 1;
                Token::RParen
            }
            ('=', Some('=')) => {
                i += 2;
                Token::Op(CompareOp::Equal)
            }
            ('!', Some('=')) => {
                i += 2;
                Token::Op(CompareOp::NotEqual)
            }
            ('!', _) => {
                i += 1;
                Token::Not
            }
            ('<', Some('=')) => {
                i += 2;
                Token::Op(CompareOp::LessOrEqual)
            }
            ('<', _) => {
                i += 1;
                Token::Op(CompareOp::Less)
            }
            ('>', Some('=')) => {
                i += 2;
                Token::Op(CompareOp::GreaterOrEqual)
            }
            ('>', _) => {
                i += 1;
                Token::Op(CompareOp::Greater)
            }
            ('&', Some('&')) => {
                i += 2;
                Token::And
            }
            ('|', Some('|')) => {
                i += 2;
                Token::Or
            }
            ('\'' | '"', _) => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ExpressionError::Unterminated {
                                what: "string",
                                position: start,
                            });
                        }
                        Some('\\') if chars.get(i + 1).is_some() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                Token::Text(text)
            }
            ('$', Some('{')) => {
                let close = chars[i..]
                    .iter()
                    .position(|&ch| ch == '}')
                    .ok_or(ExpressionError::Unterminated {
                        what: "placeholder",
                        position: start,
                    })?;
                let path: String = chars[i + 2..i + close].iter().collect();
                let path = path.trim().to_string();
                if path.is_empty() || !path.chars().all(is_path_char) {
                    return Err(ExpressionError::UnexpectedToken {
                        found: format!("${{{}}}", path),
                        position: start,
                        expected: "a dotted path inside '${}'",
                    });
                }
                i += close + 1;
                Token::Placeholder(path)
            }
            _ if starts_number => {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = if literal.contains('.') {
                    literal
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                } else {
                    literal.parse::<i64>().ok().map(Value::from)
                };
                Token::Number(number.ok_or(ExpressionError::UnexpectedToken {
                    found: literal,
                    position: start,
                    expected: "a number",
                })?)
            }
            (a, _) if a.is_ascii_alphabetic() || a == '_' => {
                while i < chars.len() && is_path_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "contains" => Token::Op(CompareOp::Contains),
                    "startsWith" => Token::Op(CompareOp::StartsWith),
                    "endsWith" => Token::Op(CompareOp::EndsWith),
                    _ => Token::Path(word),
                }
            }
            (other, _) => {
                return Err(ExpressionError::UnexpectedCharacter {
                    found: other,
                    position: start,
                });
            }
        };

        tokens.push((token, start));
    }

    Ok(tokens)
}

/// Deepest nesting of parentheses, `!` and `empty(...)` accepted by the parser
pub const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<(Token, usize)>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().is_some_and(|(token, _)| token == expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_close(&mut self) -> Result<(), ExpressionError> {
        match self.advance() {
            Some((Token::RParen, _)) => Ok(()),
            Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                found: token.to_string(),
                position,
                expected: "')'",
            }),
            None => Err(ExpressionError::UnexpectedEnd("')'")),
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_NESTING {
            return Err(ExpressionError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ExpressionError> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, ExpressionError> {
        let left = self.parse_primary()?;

        if let Some((Token::Op(op), _)) = self.peek() {
            let op = *op;
            self.position += 1;
            let right = self.parse_primary()?;
            return Ok(Expression::Compare(op, Box::new(left), Box::new(right)));
        }

        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expression, ExpressionError> {
        let Some((token, position)) = self.advance() else {
            return Err(ExpressionError::UnexpectedEnd("a value"));
        };

        match token {
            Token::LParen => {
                let inner = self.nested(Self::parse_or)?;
                self.expect_close()?;
                Ok(inner)
            }
            Token::Number(n) => Ok(Expression::Literal(n)),
            Token::Text(s) => Ok(Expression::Literal(Value::String(s))),
            Token::Placeholder(path) => Ok(Expression::Reference(path)),
            Token::Path(word) => match word.as_str() {
                "true" => Ok(Expression::Literal(Value::Bool(true))),
                "false" => Ok(Expression::Literal(Value::Bool(false))),
                "null" => Ok(Expression::Literal(Value::Null)),
                _ if self.eat(&Token::LParen) => {
                    if word != "empty" {
                        return Err(ExpressionError::UnknownFunction(word));
                    }
                    let argument = self.nested(Self::parse_or)?;
                    self.expect_close()?;
                    Ok(Expression::Empty(Box::new(argument)))
                }
                _ => Ok(Expression::Reference(word)),
            },
            other => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                position,
                expected: "a value",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::domain::flow::context::FlowState;

    fn state() -> FlowState {
        let mut state = FlowState::new(BTreeMap::from([
            ("count".to_string(), "5".to_string()),
            ("mode".to_string(), "fast".to_string()),
            ("blank".to_string(), String::new()),
        ]));
        state.record_output(
            "classify",
            json!({"content": "Bug report: crash", "attempts": 2, "tags": ["ui", "crash"]}),
        );
        state
    }

    fn eval(source: &str) -> Result<bool, ExpressionError> {
        Expression::parse(source)?.evaluate_bool(&state())
    }

    #[test]
    fn test_literals() {
        assert!(eval("true").unwrap());
        assert!(!eval("false").unwrap());
        assert!(eval("null == null").unwrap());
        assert!(eval("(true)").unwrap());
    }

    #[test]
    fn test_references_and_placeholders() {
        assert!(eval("mode == 'fast'").unwrap());
        assert!(eval("${mode} == \"fast\"").unwrap());
        assert!(eval("classify.tags.1 == 'crash'").unwrap());
        assert!(eval("missing.path == null").unwrap());
    }

    #[test]
    fn test_numeric_comparison_with_numeric_strings() {
        assert!(eval("count > 3").unwrap());
        assert!(eval("count == 5").unwrap());
        assert!(eval("count <= 5.0").unwrap());
        assert!(eval("classify.attempts >= 2").unwrap());
        assert!(eval("-1 < classify.attempts").unwrap());
        assert!(!eval("count != 5").unwrap());
    }

    #[test]
    fn test_string_operators() {
        assert!(eval("classify.content contains 'crash'").unwrap());
        assert!(eval("classify.content startsWith 'Bug'").unwrap());
        assert!(eval("classify.content endsWith 'crash'").unwrap());
        assert!(eval("classify.tags contains 'ui'").unwrap());
        assert!(!eval("missing contains 'x'").unwrap());
        assert!(eval("'abc' < 'abd'").unwrap());
    }

    #[test]
    fn test_logical_operators() {
        assert!(eval("mode == 'fast' && count > 1").unwrap());
        assert!(eval("mode == 'slow' || count > 1").unwrap());
        assert!(eval("!(mode == 'slow')").unwrap());
        assert!(eval("!false && (false || true)").unwrap());
    }

    #[test]
    fn test_short_circuit_skips_type_errors() {
        assert!(!eval("false && mode").unwrap());
        assert!(eval("true || mode").unwrap());
    }

    #[test]
    fn test_empty_function() {
        assert!(eval("empty(blank)").unwrap());
        assert!(eval("empty(missing)").unwrap());
        assert!(!eval("empty(classify.tags)").unwrap());
        assert!(!eval("empty(mode)").unwrap());
    }

    #[test]
    fn test_non_boolean_result() {
        let err = eval("mode").unwrap_err();
        assert_eq!(err, ExpressionError::NotBoolean(json!("fast")));
    }

    #[test]
    fn test_type_mismatch() {
        let err = eval("mode && true").unwrap_err();
        assert!(matches!(err, ExpressionError::TypeMismatch { operation: "&&", .. }));

        let err = eval("classify.tags > 1").unwrap_err();
        assert!(matches!(err, ExpressionError::TypeMismatch { operation: ">", .. }));

        let err = eval("classify.attempts startsWith '2'").unwrap_err();
        assert!(matches!(err, ExpressionError::TypeMismatch { .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Expression::parse("a =="),
            Err(ExpressionError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            Expression::parse("'open"),
            Err(ExpressionError::Unterminated { what: "string", .. })
        ));
        assert!(matches!(
            Expression::parse("a = b"),
            Err(ExpressionError::UnexpectedCharacter { found: '=', position: 2 })
        ));
        assert!(matches!(
            Expression::parse("true true"),
            Err(ExpressionError::UnexpectedToken { position: 5, .. })
        ));
        assert_eq!(
            Expression::parse("upper(mode)"),
            Err(ExpressionError::UnknownFunction("upper".to_string()))
        );
        assert!(Expression::parse("(true").is_err());
        assert!(Expression::parse("").is_err());
    }

    #[test]
    fn test_nesting_is_bounded() {
        let nested = |depth: usize| format!("{}true{}", "(".repeat(depth), ")".repeat(depth));

        assert!(Expression::parse(&nested(MAX_NESTING)).is_ok());
        assert_eq!(
            Expression::parse(&nested(MAX_NESTING + 1)),
            Err(ExpressionError::TooDeep(MAX_NESTING))
        );
        assert_eq!(
            Expression::parse(&nested(20_000)),
            Err(ExpressionError::TooDeep(MAX_NESTING))
        );
        assert_eq!(
            Expression::parse(&format!("{}true", "!".repeat(20_000))),
            Err(ExpressionError::TooDeep(MAX_NESTING))
        );
        assert_eq!(
            Expression::parse(&format!("{}x{}", "empty(".repeat(100), ")".repeat(100))),
            Err(ExpressionError::TooDeep(MAX_NESTING))
        );
    }

    #[test]
    fn test_references_listing() {
        let expression = Expression::parse("a.b == ${c} && !empty(d)").unwrap();
        assert_eq!(expression.references(), vec!["a.b", "c", "d"]);
    }
}
