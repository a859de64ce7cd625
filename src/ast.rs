//! Statements of a stylesheet, as read from a manifest.
//!
//! There is no surface syntax here: a stylesheet body is a list of already
//! parsed statements, deserialized from TOML or JSON with `kind` naming the
//! variant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    /// `$name: value`, optionally `!global`, `!default`, or `ns.$name: value`
    Variable {
        name: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
        #[serde(default)]
        global: bool,
        #[serde(default)]
        default: bool,
    },

    /// A declaration that always lands in the innermost scope, like a
    /// parameter binding or `@each` variable
    Local { name: String, value: String },

    /// `@function name { ... }`
    Function {
        name: String,
        #[serde(default)]
        body: Vec<Statement>,
    },

    /// `@mixin name { ... }`
    Mixin {
        name: String,
        #[serde(default)]
        body: Vec<Statement>,
    },

    /// `@use "url" as namespace with (...)`. A namespace of `*` makes the
    /// module's members visible unqualified.
    Use {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        with: BTreeMap<String, String>,
    },

    /// `@forward "url" as prefix-* show/hide ...`. Names starting with `$`
    /// in `show` and `hide` are variables.
    Forward {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        show: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        hide: Vec<String>,
    },

    /// Legacy `@import "url"`
    Import { url: String },

    /// A nested block such as a style rule or control-flow body
    Block {
        #[serde(default)]
        body: Vec<Statement>,
        #[serde(default)]
        semi_global: bool,
    },

    /// Raw CSS, with `#{$name}` and `#{ns.$name}` interpolated
    Css { text: String },

    /// `extender { @extend target; }`
    Extend { extender: String, target: String },

    /// Resolve a member reference and record what it names
    Inspect { reference: String },

    /// `@include ns.name { content }`
    Include {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Vec<Statement>>,
    },

    /// `@content` inside a mixin body
    Content,

    /// A loud comment, kept in the output
    Comment { text: String },
}

impl Statement {
    /// Whether this statement may appear before `@use` and `@forward`
    /// without ending the module prelude
    pub fn is_prelude(&self) -> bool {
        matches!(
            self,
            Statement::Use { .. } | Statement::Forward { .. } | Statement::Comment { .. }
        )
    }

    /// Total number of statements in this one, counting nested bodies
    pub fn count(&self) -> usize {
        let nested: usize = match self {
            Statement::Function { body, .. } | Statement::Mixin { body, .. } | Statement::Block { body, .. } => {
                body.iter().map(Statement::count).sum()
            }
            Statement::Include {
                content: Some(content), ..
            } => content.iter().map(Statement::count).sum(),
            _ => 0,
        };
        1 + nested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_statements() {
        let json = r#"[
            {"kind": "variable", "name": "primary", "value": "red", "default": true},
            {"kind": "use", "url": "theme", "namespace": "*"},
            {"kind": "block", "body": [{"kind": "local", "name": "x", "value": "1"}]},
            {"kind": "content"}
        ]"#;
        let statements: Vec<Statement> = serde_json::from_str(json).unwrap();

        assert_eq!(
            statements[0],
            Statement::Variable {
                name: "primary".to_string(),
                value: "red".to_string(),
                namespace: None,
                global: false,
                default: true,
            }
        );
        assert!(statements[1].is_prelude());
        assert!(!statements[2].is_prelude());
        assert_eq!(statements[2].count(), 2);
        assert_eq!(statements[3], Statement::Content);
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let result: std::result::Result<Statement, _> = serde_json::from_str(r#"{"kind": "while"}"#);
        assert!(result.is_err());
    }
}
