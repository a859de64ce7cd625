//! Core value and definition types shared by the environment and the driver

use crate::ast::Statement;
use crate::environment::Environment;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Location of a declaration or rule in a source stylesheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// The three independent member namespaces of a scope or module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MemberKind {
    Variable,
    Function,
    Mixin,
}

impl MemberKind {
    pub const ALL: [MemberKind; 3] = [MemberKind::Variable, MemberKind::Function, MemberKind::Mixin];

    /// Name as written in source: variables carry their `$` sigil.
    pub fn display_name(&self, name: &str) -> String {
        match self {
            MemberKind::Variable => format!("${}", name),
            _ => name.to_string(),
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberKind::Variable => "variable",
            MemberKind::Function => "function",
            MemberKind::Mixin => "mixin",
        };
        f.write_str(name)
    }
}

/// Whether a member name is private to the module that declares it
pub fn is_private(name: &str) -> bool {
    name.starts_with('-') || name.starts_with('_')
}

/// A stylesheet value as stored in variable frames
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Number { value: f64, unit: Option<String> },
    String { text: String, quoted: bool },
    List(Vec<Value>),
}

impl Value {
    /// Parse a literal as written in a manifest. Anything that is not a
    /// number, boolean, null, or quoted string is an unquoted string.
    pub fn parse(literal: &str) -> Value {
        let literal = literal.trim();
        if literal.is_empty() {
            return Value::Null;
        }

        let quoted = (literal.starts_with('"') && literal.ends_with('"'))
            || (literal.starts_with('\'') && literal.ends_with('\''));
        if quoted && literal.len() >= 2 {
            return Value::String {
                text: literal[1..literal.len() - 1].to_string(),
                quoted: true,
            };
        }

        if literal.contains(char::is_whitespace) {
            return Value::List(literal.split_whitespace().map(Value::parse).collect());
        }

        match literal {
            "null" => return Value::Null,
            "true" => return Value::Boolean(true),
            "false" => return Value::Boolean(false),
            _ => {}
        }

        let split = literal
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
            .map(|(i, _)| i)
            .unwrap_or(literal.len());
        if split > 0 {
            if let Ok(value) = literal[..split].parse::<f64>() {
                let unit = &literal[split..];
                return Value::Number {
                    value,
                    unit: if unit.is_empty() { None } else { Some(unit.to_string()) },
                };
            }
        }

        Value::String {
            text: literal.to_string(),
            quoted: false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number { value, unit } => {
                write!(f, "{}", value)?;
                if let Some(unit) = unit {
                    f.write_str(unit)?;
                }
                Ok(())
            }
            Value::String { text, quoted: true } => write!(f, "\"{}\"", text),
            Value::String { text, quoted: false } => f.write_str(text),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

struct CallableDef {
    name: String,
    site: Span,
    body: Vec<Statement>,
    environment: Environment,
}

/// A user-defined function, mixin, or content block.
///
/// Callables close over the environment they were declared in. Two callables
/// are the same member only when they are the same instance.
#[derive(Clone)]
pub struct Callable(Rc<CallableDef>);

impl Callable {
    pub fn new(name: impl Into<String>, site: Span, body: Vec<Statement>, environment: Environment) -> Self {
        Callable(Rc::new(CallableDef {
            name: name.into(),
            site,
            body,
            environment,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn site(&self) -> &Span {
        &self.0.site
    }

    pub fn body(&self) -> &[Statement] {
        &self.0.body
    }

    /// The lexical environment captured at declaration time
    pub fn environment(&self) -> &Environment {
        &self.0.environment
    }

    /// Whether no other handle to this callable exists
    pub(crate) fn is_unique(&self) -> bool {
        Rc::strong_count(&self.0) == 1
    }

    pub fn is_same(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.0.name)
            .field("site", &self.0.site)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals() {
        assert_eq!(Value::parse("null"), Value::Null);
        assert_eq!(Value::parse("true"), Value::Boolean(true));
        assert_eq!(
            Value::parse("12px"),
            Value::Number { value: 12.0, unit: Some("px".to_string()) }
        );
        assert_eq!(Value::parse("-1.5"), Value::Number { value: -1.5, unit: None });
        assert_eq!(
            Value::parse("\"Helvetica\""),
            Value::String { text: "Helvetica".to_string(), quoted: true }
        );
        assert_eq!(
            Value::parse("red"),
            Value::String { text: "red".to_string(), quoted: false }
        );
        assert_eq!(Value::parse("1px solid red").to_string(), "1px solid red");
    }

    #[test]
    fn private_names_start_with_dash_or_underscore() {
        assert!(is_private("_helper"));
        assert!(is_private("-internal"));
        assert!(!is_private("primary"));
    }

    #[test]
    fn callables_compare_by_instance() {
        let env = Environment::new();
        let a = Callable::new("theme", Span::new("a.scss", 1, 1), Vec::new(), env.closure());
        let b = Callable::new("theme", Span::new("a.scss", 1, 1), Vec::new(), env.closure());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
