//! Condition expressions for `conditional` steps
//!
//! Supported forms:
//!
//! - `{{path}} == literal` and `{{path}} != literal`
//! - `{{path}}` alone, true when the resolved value is truthy
//! - a bare literal with no token (`true`, `0`, `"yes"`), coerced to boolean
//!
//! Literals are quoted strings, numbers, `true`, `false` and `null`; anything
//! else is taken as a raw string. Equality is loose, see [`loose_eq`].

use serde_json::Value;

use crate::template::{self, Scope};

/// Comparison operator found in an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
}

/// Evaluate a condition against the scope
pub fn evaluate(expression: &str, scope: &Scope<'_>) -> bool {
    let Some((_, path)) = template::first_token(expression) else {
        return is_truthy(&parse_literal(expression));
    };
    let resolved = scope.resolve(&path).unwrap_or(Value::Null);

    match split_operator(expression) {
        Some((operator, right)) => {
            let equal = loose_eq(&resolved, &parse_literal(right));
            match operator {
                Operator::Eq => equal,
                Operator::Ne => !equal,
            }
        }
        None => is_truthy(&resolved),
    }
}

/// Split at the first `==` or `!=`, returning the operator and right-hand side
fn split_operator(expression: &str) -> Option<(Operator, &str)> {
    let eq = expression.find("==");
    let ne = expression.find("!=");
    let (position, operator) = match (eq, ne) {
        (Some(e), Some(n)) if n < e => (n, Operator::Ne),
        (Some(e), _) => (e, Operator::Eq),
        (None, Some(n)) => (n, Operator::Ne),
        (None, None) => return None,
    };
    Some((operator, &expression[position + 2..]))
}

/// Parse a right-hand literal
pub fn parse_literal(text: &str) -> Value {
    let text = text.trim();

    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Value::String(text[1..text.len() - 1].to_string());
        }
    }

    if let Some(number) = parse_number(text) {
        return number;
    }

    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        other => Value::String(other.to_string()),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Truthiness: `null`, `false`, `0`, `NaN` and `""` are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Loose equality between a resolved value and a literal
///
/// - equal JSON values are equal
/// - number and string compare numerically when the string parses as a number
/// - boolean and number compare with `true` as 1 and `false` as 0
/// - boolean and string compare against `"true"` / `"false"`
/// - `null` only equals `null`
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            match (n.as_f64(), s.trim().parse::<f64>()) {
                (Some(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        (Value::Bool(b), Value::Number(n)) | (Value::Number(n), Value::Bool(b)) => {
            n.as_f64() == Some(if *b { 1.0 } else { 0.0 })
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.trim() == if *b { "true" } else { "false" }
        }
        (a, b) => a == b,
    }
}
