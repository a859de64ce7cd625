// FILE: src/cli/config.rs

use crate::error::{CompilerError, Result};
use crate::OutputStyle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Looked up in the working directory when `--config` isn't given
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["stylec.toml", "stylec.json"];

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub entry: Option<String>,
    pub style: Option<OutputStyle>,
    pub load_paths: Option<Vec<String>>,
    pub custom_variables: Option<HashMap<String, String>>,
    pub output_directory: Option<String>,
}

pub fn load(config_path: &str) -> Result<ConfigFile> {
    let config_content = fs::read_to_string(config_path).map_err(|e| {
        CompilerError::FileNotFound {
            path: format!("Config file {}: {}", config_path, e),
        }
    })?;
    log::info!("Loaded configuration from {}", config_path);

    if config_path.ends_with(".json") {
        serde_json::from_str(&config_content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid JSON config: {}", e),
        })
    } else if config_path.ends_with(".toml") {
        toml::from_str(&config_content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid TOML config: {}", e),
        })
    } else {
        Err(CompilerError::InvalidFormat {
            message: "Config file must be .json or .toml format".to_string(),
        })
    }
}

pub fn discover() -> Result<Option<ConfigFile>> {
    discover_in(Path::new("."))
}

fn discover_in(dir: &Path) -> Result<Option<ConfigFile>> {
    for name in DEFAULT_CONFIG_FILES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return load(&candidate.to_string_lossy()).map(Some);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_toml_configuration() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("stylec.toml"),
            r#"
entry = "site"
style = "compressed"
load_paths = ["vendor"]
output_directory = "dist"

[custom_variables]
primary = "teal"
"#,
        )
        .unwrap();

        let config = discover_in(dir.path()).unwrap().unwrap();
        assert_eq!(config.entry.as_deref(), Some("site"));
        assert_eq!(config.style, Some(OutputStyle::Compressed));
        assert_eq!(config.load_paths, Some(vec!["vendor".to_string()]));
        assert_eq!(config.output_directory.as_deref(), Some("dist"));
        assert_eq!(config.custom_variables.unwrap()["primary"], "teal");
    }

    #[test]
    fn missing_configuration_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(discover_in(dir.path()).unwrap().is_none());
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stylec.yaml");
        fs::write(&path, "entry: site").unwrap();
        let result = load(&path.to_string_lossy());
        assert!(matches!(result, Err(CompilerError::InvalidFormat { .. })));
    }
}
