//! Error types for the Stylec compiler

use crate::types::{MemberKind, Span};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("There's already a module with namespace \"{namespace}\".")]
    DuplicateNamespace {
        namespace: String,
        site: Span,
        original: Span,
    },

    #[error("This {kind} is available from multiple global modules.")]
    AmbiguousGlobalMember {
        kind: MemberKind,
        name: String,
        /// Definition site of every global module that exposes the member.
        sites: Vec<Span>,
    },

    #[error("Two forwarded modules both define a {kind} named {}.", .kind.display_name(.name))]
    ForwardingConflict {
        kind: MemberKind,
        name: String,
        site: Span,
        original: Span,
    },

    #[error("There is no module with the namespace \"{namespace}\".")]
    UnknownNamespace { namespace: String },

    #[error("Undefined variable: ${name}")]
    UndefinedModuleVariable { name: String },

    #[error("This module and the new module both define a variable named \"${name}\".")]
    GlobalVariableCollision { name: String, site: Span, original: Span },

    #[error("Manifest error: {message}")]
    Manifest { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },
}

pub type Result<T> = std::result::Result<T, CompilerError>;

impl CompilerError {
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }

    pub fn undefined_module_variable(name: impl Into<String>) -> Self {
        Self::UndefinedModuleVariable { name: name.into() }
    }

    pub fn unknown_namespace(namespace: impl Into<String>) -> Self {
        Self::UnknownNamespace {
            namespace: namespace.into(),
        }
    }

    /// Source spans with a human-readable label for each, primary span first.
    pub fn labeled_spans(&self) -> Vec<(Span, String)> {
        match self {
            Self::DuplicateNamespace { site, original, .. } => vec![
                (site.clone(), "new @use".to_string()),
                (original.clone(), "original @use".to_string()),
            ],
            Self::AmbiguousGlobalMember { kind, sites, .. } => sites
                .iter()
                .map(|site| (site.clone(), format!("includes {}", kind)))
                .collect(),
            Self::ForwardingConflict { site, original, .. } => vec![
                (site.clone(), "new @forward".to_string()),
                (original.clone(), "original @forward".to_string()),
            ],
            Self::GlobalVariableCollision { site, original, .. } => vec![
                (site.clone(), "new @use".to_string()),
                (original.clone(), "variable declaration".to_string()),
            ],
            _ => Vec::new(),
        }
    }
}
