//! `{{path}}` templates
//!
//! Grammar:
//!
//! ```text
//! token   := "{{" ws path ws "}}"
//! path    := segment ("." segment)*
//! segment := [A-Za-z0-9_-]+
//! ```
//!
//! The first segment picks the root: `input` is the invocation inputs (alone
//! it means the whole input object), `logs` is the log list, anything else
//! names a variable. Later segments walk object keys or array indices;
//! `length` on an array or string yields its size when no such key exists.
//!
//! A string that is exactly one token is replaced by the resolved value with
//! its type intact. Anywhere else a token is replaced by the value's string
//! form and unresolved tokens are left as written. Malformed tokens are
//! plain text.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved root for invocation inputs
pub const INPUT_ROOT: &str = "input";

/// Reserved root for the log list
pub const LOGS_ROOT: &str = "logs";

/// Where a path starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRoot {
    Input,
    Logs,
    Variable(String),
}

/// A parsed dotted path such as `input.title` or `result.items.0.id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePath {
    pub root: PathRoot,
    pub segments: Vec<String>,
}

impl TemplatePath {
    /// Parse a dotted path, `None` if it does not follow the grammar
    pub fn parse(path: &str) -> Option<Self> {
        let mut parts = path.trim().split('.');
        let first = parts.next().filter(|part| is_segment(part))?;
        let segments = parts
            .map(|part| is_segment(part).then(|| part.to_string()))
            .collect::<Option<Vec<_>>>()?;

        let root = match first {
            INPUT_ROOT => PathRoot::Input,
            LOGS_ROOT => PathRoot::Logs,
            name => PathRoot::Variable(name.to_string()),
        };
        Some(Self { root, segments })
    }
}

impl fmt::Display for TemplatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            PathRoot::Input => write!(f, "{}", INPUT_ROOT)?,
            PathRoot::Logs => write!(f, "{}", LOGS_ROOT)?,
            PathRoot::Variable(name) => write!(f, "{}", name)?,
        }
        for segment in &self.segments {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

fn is_segment(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A piece of a parsed template string
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    Token { raw: String, path: TemplatePath },
}

/// Split a string into literal text and tokens
pub fn parse(input: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut text = String::new();
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            break;
        };

        text.push_str(&rest[..start]);
        let raw = &rest[start..start + 2 + end + 2];
        match TemplatePath::parse(&after_open[..end]) {
            Some(path) => {
                if !text.is_empty() {
                    fragments.push(Fragment::Text(std::mem::take(&mut text)));
                }
                fragments.push(Fragment::Token {
                    raw: raw.to_string(),
                    path,
                });
            }
            None => text.push_str(raw),
        }
        rest = &after_open[end + 2..];
    }

    text.push_str(rest);
    if !text.is_empty() {
        fragments.push(Fragment::Text(text));
    }
    fragments
}

/// The path of a string that is exactly one token (ignoring surrounding whitespace)
pub fn whole_token(input: &str) -> Option<TemplatePath> {
    let mut fragments = parse(input.trim()).into_iter();
    match (fragments.next(), fragments.next()) {
        (Some(Fragment::Token { path, .. }), None) => Some(path),
        _ => None,
    }
}

/// The first token in a string, with its raw text
pub fn first_token(input: &str) -> Option<(String, TemplatePath)> {
    parse(input).into_iter().find_map(|fragment| match fragment {
        Fragment::Token { raw, path } => Some((raw, path)),
        Fragment::Text(_) => None,
    })
}

/// Read-only view of everything a path can reach
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub variables: &'a BTreeMap<String, Value>,
    pub inputs: &'a Value,
    pub logs: &'a [String],
}

impl Scope<'_> {
    /// Resolve a parsed path, `None` when any part of it is missing
    pub fn resolve(&self, path: &TemplatePath) -> Option<Value> {
        let root = match &path.root {
            PathRoot::Input => self.inputs.clone(),
            PathRoot::Logs => Value::Array(self.logs.iter().cloned().map(Value::String).collect()),
            PathRoot::Variable(name) => self.variables.get(name)?.clone(),
        };

        path.segments
            .iter()
            .try_fold(root, |current, segment| descend(current, segment))
    }

    /// Interpolate a string; whole-token strings keep the resolved type
    pub fn interpolate_str(&self, input: &str) -> Value {
        if let Some(path) = whole_token(input) {
            return self.resolve(&path).unwrap_or(Value::Null);
        }
        Value::String(self.render(input))
    }

    /// Interpolate a string into a string, stringifying every token
    pub fn render(&self, input: &str) -> String {
        parse(input)
            .into_iter()
            .map(|fragment| match fragment {
                Fragment::Text(text) => text,
                Fragment::Token { raw, path } => match self.resolve(&path) {
                    Some(value) => stringify(&value),
                    None => raw,
                },
            })
            .collect()
    }

    /// Interpolate every string inside an arbitrarily nested value
    pub fn interpolate(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.interpolate_str(s),
            Value::Array(items) => Value::Array(items.iter().map(|item| self.interpolate(item)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), self.interpolate(value)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other.clone(),
        }
    }
}

fn descend(current: Value, segment: &str) -> Option<Value> {
    match current {
        Value::Object(mut map) => map.remove(segment),
        Value::Array(mut items) => match segment.parse::<usize>() {
            Ok(index) if index < items.len() => Some(items.swap_remove(index)),
            Ok(_) => None,
            Err(_) if segment == "length" => Some(Value::from(items.len())),
            Err(_) => None,
        },
        Value::String(s) if segment == "length" => Some(Value::from(s.chars().count())),
        _ => None,
    }
}

/// String form used for partial substitution
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> BTreeMap<String, Value> {
        let mut vars = BTreeMap::new();
        vars.insert("count".to_string(), json!(3));
        vars.insert(
            "result".to_string(),
            json!({ "items": [ { "id": "a1" }, { "id": "b2" } ], "ok": true }),
        );
        vars.insert("name".to_string(), json!("Ada"));
        vars
    }

    #[test]
    fn test_parse_path() {
        let path = TemplatePath::parse(" input.title ").unwrap();
        assert_eq!(path.root, PathRoot::Input);
        assert_eq!(path.segments, vec!["title".to_string()]);
        assert_eq!(path.to_string(), "input.title");

        assert!(TemplatePath::parse("").is_none());
        assert!(TemplatePath::parse("a..b").is_none());
        assert!(TemplatePath::parse("a b").is_none());
    }

    #[test]
    fn test_parse_fragments() {
        let fragments = parse("Hello {{name}}, {{ bad path }} and {{input.x}}!");
        assert_eq!(fragments.len(), 5);
        assert_eq!(fragments[0], Fragment::Text("Hello ".into()));
        assert_eq!(fragments[2], Fragment::Text(", {{ bad path }} and ".into()));
        assert_eq!(fragments[4], Fragment::Text("!".into()));
    }

    #[test]
    fn test_unterminated_token_is_text() {
        assert_eq!(parse("{{name"), vec![Fragment::Text("{{name".into())]);
    }

    #[test]
    fn test_whole_token_keeps_type() {
        let vars = vars();
        let inputs = json!({ "title": "Fix login" });
        let scope = Scope { variables: &vars, inputs: &inputs, logs: &[] };

        assert_eq!(scope.interpolate_str("{{count}}"), json!(3));
        assert_eq!(scope.interpolate_str("  {{ result.ok }} "), json!(true));
        assert_eq!(scope.interpolate_str("{{result.items.1}}"), json!({ "id": "b2" }));
        assert_eq!(scope.interpolate_str("{{missing}}"), Value::Null);
        assert_eq!(scope.interpolate_str("{{input}}"), inputs);
    }

    #[test]
    fn test_partial_substitution_stringifies() {
        let vars = vars();
        let inputs = json!({});
        let logs = vec!["first".to_string()];
        let scope = Scope { variables: &vars, inputs: &inputs, logs: &logs };

        assert_eq!(scope.render("{{name}} has {{count}} items"), "Ada has 3 items");
        assert_eq!(scope.render("ids: {{result.items.0.id}}"), "ids: a1");
        assert_eq!(scope.render("logs={{logs}}"), r#"logs=["first"]"#);
        assert_eq!(scope.render("left {{unknown}} alone"), "left {{unknown}} alone");
        assert_eq!(scope.render("{{count}}{{count}}"), "33");
    }

    #[test]
    fn test_length_segment() {
        let vars = vars();
        let inputs = json!({});
        let scope = Scope { variables: &vars, inputs: &inputs, logs: &[] };

        assert_eq!(scope.interpolate_str("{{result.items.length}}"), json!(2));
        assert_eq!(scope.interpolate_str("{{name.length}}"), json!(3));
        assert_eq!(scope.interpolate_str("{{result.items.7}}"), Value::Null);
    }

    #[test]
    fn test_interpolate_nested_value() {
        let vars = vars();
        let inputs = json!({ "project": "p-1" });
        let scope = Scope { variables: &vars, inputs: &inputs, logs: &[] };

        let value = json!({
            "project": "{{input.project}}",
            "tags": ["{{name}}", 7, null],
            "limit": "{{count}}",
            "note": "for {{input.project}}"
        });

        assert_eq!(
            scope.interpolate(&value),
            json!({
                "project": "p-1",
                "tags": ["Ada", 7, null],
                "limit": 3,
                "note": "for p-1"
            })
        );
    }
}
