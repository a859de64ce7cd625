//! Manifest files: stylesheets described as lists of statements.
//!
//! A manifest is TOML or JSON:
//!
//! ```toml
//! entry = "main"
//!
//! [[stylesheet]]
//! url = "main"
//! body = [{ kind = "use", url = "theme" }]
//! ```
//!
//! Stylesheets the main manifest doesn't define are looked up in the load
//! paths as `<dir>/<url>.toml` or `<dir>/<url>.json`.

use crate::ast::Statement;
use crate::error::{CompilerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylesheetSource {
    pub url: String,
    #[serde(default)]
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    #[serde(default, rename = "stylesheet", alias = "stylesheets")]
    pub stylesheets: Vec<StylesheetSource>,
}

impl Manifest {
    /// Read a `.toml` or `.json` manifest.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| CompilerError::FileNotFound {
            path: format!("{}: {}", path.display(), e),
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            Some("toml") => Self::from_toml(&content),
            _ => Err(CompilerError::InvalidFormat {
                message: format!("Manifest {} must be .json or .toml format", path.display()),
            }),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid TOML manifest: {}", e),
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| CompilerError::InvalidFormat {
            message: format!("Invalid JSON manifest: {}", e),
        })
    }

    pub fn stylesheet(&self, url: &str) -> Option<&StylesheetSource> {
        self.stylesheets.iter().find(|stylesheet| stylesheet.url == url)
    }

    /// The stylesheet compilation starts from: `requested` if given, then
    /// the manifest's own `entry`, then its first stylesheet.
    pub fn entry_url(&self, requested: Option<&str>) -> Result<String> {
        requested
            .or(self.entry.as_deref())
            .or_else(|| self.stylesheets.first().map(|stylesheet| stylesheet.url.as_str()))
            .map(str::to_string)
            .ok_or_else(|| CompilerError::manifest("Manifest doesn't define any stylesheets"))
    }

    /// Total statements across every stylesheet
    pub fn statement_count(&self) -> usize {
        self.stylesheets
            .iter()
            .flat_map(|stylesheet| &stylesheet.body)
            .map(Statement::count)
            .sum()
    }
}

/// Every stylesheet a compilation can load, by URL
#[derive(Debug)]
pub struct SourceSet {
    sources: HashMap<String, Rc<StylesheetSource>>,
    load_paths: Vec<PathBuf>,
    files_loaded: usize,
}

impl SourceSet {
    pub fn new(manifest: &Manifest, load_paths: Vec<PathBuf>) -> Self {
        let mut sources = HashMap::new();
        for stylesheet in &manifest.stylesheets {
            if sources.contains_key(&stylesheet.url) {
                log::warn!("Stylesheet {} is defined more than once; using the first", stylesheet.url);
                continue;
            }
            sources.insert(stylesheet.url.clone(), Rc::new(stylesheet.clone()));
        }
        Self {
            sources,
            load_paths,
            files_loaded: 0,
        }
    }

    /// Find the stylesheet for `url`, reading it from the load paths if the
    /// manifest doesn't define it.
    pub fn resolve(&mut self, url: &str) -> Result<Rc<StylesheetSource>> {
        if let Some(source) = self.sources.get(url) {
            return Ok(Rc::clone(source));
        }

        for dir in &self.load_paths {
            for ext in ["toml", "json"] {
                let candidate = dir.join(format!("{}.{}", url, ext));
                if !candidate.is_file() {
                    continue;
                }

                log::debug!("Loading {} from {}", url, candidate.display());
                let manifest = Manifest::load(&candidate)?;
                self.files_loaded += 1;

                let single = manifest.stylesheets.len() == 1;
                for mut stylesheet in manifest.stylesheets {
                    // A file holding one stylesheet provides it under the requested URL.
                    if single {
                        stylesheet.url = url.to_string();
                    }
                    self.sources
                        .entry(stylesheet.url.clone())
                        .or_insert_with(|| Rc::new(stylesheet));
                }
                if let Some(source) = self.sources.get(url) {
                    return Ok(Rc::clone(source));
                }
            }
        }

        Err(CompilerError::manifest(format!("Can't find stylesheet to import: \"{}\"", url)))
    }

    /// Number of manifest files read from the load paths
    pub fn files_loaded(&self) -> usize {
        self.files_loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
entry = "main"

[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "theme", namespace = "t" },
    { kind = "css", text = ".a { color: #{t.$primary}; }" },
]

[[stylesheet]]
url = "theme"
body = [{ kind = "variable", name = "primary", value = "red", default = true }]
"#;

    #[test]
    fn parses_toml_manifests() {
        let manifest = Manifest::from_toml(MANIFEST).unwrap();
        assert_eq!(manifest.entry_url(None).unwrap(), "main");
        assert_eq!(manifest.entry_url(Some("theme")).unwrap(), "theme");
        assert_eq!(manifest.stylesheets.len(), 2);
        assert_eq!(manifest.statement_count(), 3);
        assert!(manifest.stylesheet("theme").is_some());
    }

    #[test]
    fn empty_manifest_has_no_entry() {
        let manifest = Manifest::from_json("{}").unwrap();
        assert!(matches!(manifest.entry_url(None), Err(CompilerError::Manifest { .. })));
    }

    #[test]
    fn rejects_unknown_extensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("styles.yaml");
        fs::write(&path, "entry: main").unwrap();
        assert!(matches!(Manifest::load(&path), Err(CompilerError::InvalidFormat { .. })));
    }

    #[test]
    fn resolves_stylesheets_from_load_paths() {
        let dir = TempDir::new().unwrap();
        let mut file = fs::File::create(dir.path().join("colors.json")).unwrap();
        write!(
            file,
            r#"{{"stylesheet": [{{"url": "anything", "body": [{{"kind": "css", "text": ".c {{}}"}}]}}]}}"#
        )
        .unwrap();

        let manifest = Manifest::from_toml(MANIFEST).unwrap();
        let mut sources = SourceSet::new(&manifest, vec![dir.path().to_path_buf()]);

        assert_eq!(sources.resolve("theme").unwrap().url, "theme");
        let colors = sources.resolve("colors").unwrap();
        assert_eq!(colors.url, "colors");
        assert_eq!(colors.body.len(), 1);
        assert_eq!(sources.files_loaded(), 1);

        // Cached after the first read.
        sources.resolve("colors").unwrap();
        assert_eq!(sources.files_loaded(), 1);
        assert!(sources.resolve("missing").is_err());
    }
}
