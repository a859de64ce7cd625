//! Member references and `#{...}` interpolation in manifest text

use crate::error::{CompilerError, Result};
use regex::Regex;

/// A reference to a member, optionally through a module namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `$name` or `ns.$name`
    Variable { namespace: Option<String>, name: String },
    /// `name` or `ns.name`: a function or mixin
    Callable { namespace: Option<String>, name: String },
}

impl Reference {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Reference::Variable { namespace, .. } | Reference::Callable { namespace, .. } => namespace.as_deref(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Reference::Variable { name, .. } | Reference::Callable { name, .. } => name,
        }
    }
}

#[derive(Debug)]
pub struct Patterns {
    reference: Regex,
    interpolation: Regex,
}

impl Patterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            reference: compile(r"^(?:([A-Za-z_-][\w-]*)\.)?(\$)?([A-Za-z_-][\w-]*)$")?,
            interpolation: compile(r"#\{([^}]*)\}")?,
        })
    }

    /// Parse `text` as a member reference, if it is one.
    pub fn reference(&self, text: &str) -> Option<Reference> {
        let captures = self.reference.captures(text.trim())?;
        let namespace = captures.get(1).map(|m| m.as_str().to_string());
        let name = captures.get(3)?.as_str().to_string();
        Some(if captures.get(2).is_some() {
            Reference::Variable { namespace, name }
        } else {
            Reference::Callable { namespace, name }
        })
    }

    /// Replace every `#{$name}` in `text` with what `resolve` returns for it.
    pub fn interpolate(
        &self,
        text: &str,
        mut resolve: impl FnMut(&Reference) -> Result<String>,
    ) -> Result<String> {
        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for captures in self.interpolation.captures_iter(text) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let reference = match self.reference(inner.as_str()) {
                Some(reference @ Reference::Variable { .. }) => reference,
                _ => {
                    return Err(CompilerError::manifest(format!(
                        "Expected a variable in interpolation, found \"{}\"",
                        inner.as_str().trim()
                    )))
                }
            };
            output.push_str(&text[last..whole.start()]);
            output.push_str(&resolve(&reference)?);
            last = whole.end();
        }
        output.push_str(&text[last..]);
        Ok(output)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| CompilerError::InvalidFormat {
        message: format!("Invalid pattern {}: {}", pattern, e),
    })
}
