//! Compiled CSS output and the extension store a module carries along.
//!
//! Neither is interpreted here: the environment only needs to know whether a
//! module contributes anything and how to give a second consumer its own copy.

use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// CSS emitted by one stylesheet, as a flat list of serialized nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CssStylesheet {
    pub url: Option<String>,
    pub children: Vec<String>,
}

impl CssStylesheet {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, node: impl Into<String>) {
        self.children.push(node.into());
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Add each extender to the selector list of every style rule that
    /// lists its target. Returns how many rules changed.
    pub fn apply_extensions(&mut self, extensions: &[Extension]) -> usize {
        if extensions.is_empty() {
            return 0;
        }

        let mut changed = 0;
        for child in &mut self.children {
            let Some(brace) = child.find('{') else {
                continue;
            };
            let selector = child[..brace].trim();
            if selector.is_empty() || selector.starts_with('@') || selector.starts_with("/*") {
                continue;
            }

            let mut selectors: Vec<String> = selector.split(',').map(|s| s.trim().to_string()).collect();
            let before = selectors.len();
            for extension in extensions {
                if selectors.contains(&extension.target) && !selectors.contains(&extension.extender) {
                    selectors.push(extension.extender.clone());
                }
            }
            if selectors.len() != before {
                *child = format!("{} {}", selectors.join(", "), child[brace..].trim_start());
                changed += 1;
            }
        }
        changed
    }
}

/// A single `@extend`: `extender` should also match everywhere `target` does
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub extender: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionStore {
    extensions: Vec<Extension>,
}

impl ExtensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_extension(&mut self, extender: impl Into<String>, target: impl Into<String>) {
        self.extensions.push(Extension {
            extender: extender.into(),
            target: target.into(),
        });
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Append every extension recorded in `other`
    pub fn merge(&mut self, other: &ExtensionStore) {
        self.extensions.extend(other.extensions.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Mutable CSS state owned by a module
pub type SharedCss = Rc<RefCell<CssStylesheet>>;
pub type SharedExtensions = Rc<RefCell<ExtensionStore>>;

/// Deep-copy a stylesheet and its extension store so the copy can be
/// modified without affecting the original.
pub fn clone_css_stylesheet(
    css: &SharedCss,
    extensions: &SharedExtensions,
) -> (SharedCss, SharedExtensions) {
    (
        Rc::new(RefCell::new(css.borrow().clone())),
        Rc::new(RefCell::new(extensions.borrow().clone())),
    )
}
