//! Stylec: the environment and module engine of a CSS-superset compiler
//!
//! Resolves variable, function, and mixin references across lexical scopes,
//! namespaced `@use` modules, `@forward` re-exports, and legacy `@import`
//! merging, and materializes finished stylesheets as modules.
//!
//! # Basic Usage
//!
//! ```no_run
//! use stylec::{compile_manifest_file, Result};
//!
//! fn main() -> Result<()> {
//!     let (output, _stats) = compile_manifest_file("styles.toml")?;
//!     print!("{}", output.css);
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline
//!
//! 1. **Sources**: stylesheets come from a manifest and its load paths
//! 2. **Evaluation**: each stylesheet runs against an [`Environment`] and
//!    becomes a [`Module`]
//! 3. **Output**: upstream CSS is combined, extended, and serialized

pub mod ast;
pub mod cli;
pub mod compiler;
pub mod configuration;
pub mod css;
pub mod environment;
pub mod error;
pub mod module;
pub mod types;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// Re-export commonly used types and functions
pub use ast::Statement;
pub use compiler::{CompileOutput, Evaluator, Inspection, Manifest, ModuleSummary};
pub use configuration::{Configuration, ConfiguredValue};
pub use css::{CssStylesheet, Extension, ExtensionStore};
pub use environment::{Environment, EnvironmentModule, ScopeState};
pub use error::{CompilerError, Result};
pub use module::{ForwardRule, MemberNames, Module, ModuleId, ModuleRef, VariableIdentity};
pub use types::{Callable, MemberKind, Span, Value};
pub use cli::StylecCli;

/// Compiler version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// How compiled CSS is formatted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
}

/// Compilation options and settings
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Enable debug mode with extra logging
    pub debug_mode: bool,

    /// Stylesheet to start from instead of the manifest's entry
    pub entry: Option<String>,

    /// Directories searched for stylesheets the manifest doesn't define
    pub load_paths: Vec<PathBuf>,

    pub style: OutputStyle,

    /// Variables declared at the root of the entry stylesheet before it runs
    pub custom_variables: HashMap<String, String>,
}

/// Compilation statistics and metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompilationStats {
    /// Stylesheets defined by the manifest itself
    pub stylesheet_count: usize,

    /// Manifest files read from the load paths
    pub files_loaded: usize,

    /// Distinct modules loaded
    pub module_count: usize,

    /// Statements evaluated, counting every mixin and content invocation
    pub statement_count: usize,

    pub variable_count: usize,
    pub function_count: usize,
    pub mixin_count: usize,
    pub import_count: usize,
    pub include_count: usize,
    pub inspection_count: usize,

    /// CSS nodes in the combined output
    pub css_node_count: usize,

    /// Extensions declared across the output's modules
    pub extension_count: usize,

    /// Serialized CSS size in bytes
    pub output_size: u64,

    /// Compilation time in milliseconds
    pub compile_time_ms: u64,
}

/// Compile a manifest file with default options
pub fn compile_manifest_file(manifest_path: impl AsRef<Path>) -> Result<(CompileOutput, CompilationStats)> {
    compile_manifest_file_with_options(manifest_path, CompilerOptions::default())
}

/// Compile a manifest file with custom options.
///
/// The manifest's own directory is searched after any configured load paths.
pub fn compile_manifest_file_with_options(
    manifest_path: impl AsRef<Path>,
    mut options: CompilerOptions,
) -> Result<(CompileOutput, CompilationStats)> {
    let manifest_path = manifest_path.as_ref();

    if options.debug_mode {
        log::info!("{} v{}", NAME, VERSION);
        log::info!("Compiling '{}'...", manifest_path.display());
        log::debug!("Compiler options: {:?}", options);
    }

    let manifest = Manifest::load(manifest_path)?;
    if let Some(dir) = manifest_path.parent() {
        let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
        if !options.load_paths.iter().any(|path| path == dir) {
            options.load_paths.push(dir.to_path_buf());
        }
    }

    let (output, stats) = compiler::compile(&manifest, &options)?;

    if options.debug_mode {
        log::info!("Compilation successful!");
        log::info!("Modules: {}", stats.module_count);
        log::info!("Output size: {} bytes", stats.output_size);
        log::info!("Compile time: {}ms", stats.compile_time_ms);
        log::debug!("Full stats: {:?}", stats);
    }

    Ok((output, stats))
}

/// Compile a manifest given as TOML or JSON text.
pub fn compile_manifest_source(source: &str, options: &CompilerOptions) -> Result<(CompileOutput, CompilationStats)> {
    let manifest = if source.trim_start().starts_with('{') {
        Manifest::from_json(source)?
    } else {
        Manifest::from_toml(source)?
    };
    compiler::compile(&manifest, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn compiles_manifest_files_with_sibling_stylesheets() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("styles.toml"),
            r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "palette" },
    { kind = "css", text = ".a { color: #{palette.$accent}; }" },
]
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("palette.json"),
            r#"{"stylesheet": [{"url": "palette", "body": [{"kind": "variable", "name": "accent", "value": "teal"}]}]}"#,
        )
        .unwrap();

        let (output, stats) = compile_manifest_file(dir.path().join("styles.toml")).unwrap();
        assert_eq!(output.css, ".a { color: teal; }\n");
        assert_eq!(stats.files_loaded, 1);
        assert_eq!(stats.stylesheet_count, 1);
    }

    #[test]
    fn compiles_json_sources() {
        let source = r#"{"entry": "main", "stylesheet": [{"url": "main", "body": [{"kind": "css", "text": ".a {}"}]}]}"#;
        let (output, _) = compile_manifest_source(source, &CompilerOptions::default()).unwrap();
        assert_eq!(output.css, ".a {}\n");
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = TempDir::new().unwrap();
        let result = compile_manifest_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(CompilerError::FileNotFound { .. })));
    }
}
