//! Combining the CSS of a module graph into one stylesheet

use crate::css::Extension;
use crate::module::{ModuleId, ModuleRef};
use crate::types::{MemberKind, Span};
use crate::OutputStyle;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// What an `inspect` statement found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspection {
    pub reference: String,
    pub site: Span,
    pub kind: MemberKind,
    /// The variable's value, or the callable's name
    pub value: Option<String>,
    pub defined_at: Option<Span>,
}

/// The exported interface of one module, for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    pub url: Option<String>,
    pub variables: Vec<String>,
    pub functions: Vec<String>,
    pub mixins: Vec<String>,
    pub upstream: Vec<String>,
    pub css_nodes: usize,
    pub extensions: usize,
}

impl ModuleSummary {
    pub fn of(module: &ModuleRef) -> Self {
        let names = |kind: MemberKind| -> Vec<String> { module.member_names(kind).into_iter().collect() };
        Self {
            url: module.url().map(str::to_string),
            variables: names(MemberKind::Variable),
            functions: names(MemberKind::Function),
            mixins: names(MemberKind::Mixin),
            upstream: module.upstream().iter().map(module_key).collect(),
            css_nodes: module.css().borrow().children.len(),
            extensions: module.extension_store().borrow().extensions().len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileOutput {
    pub entry: String,
    pub css: String,
    /// Every module in the output, dependencies first
    pub modules: Vec<ModuleSummary>,
    pub inspections: Vec<Inspection>,
}

/// Modules are deduplicated by URL. Modules without one fall back to their
/// instance identity.
pub fn module_key(module: &ModuleRef) -> String {
    match module.url() {
        Some(url) => url.to_string(),
        None => format!("{:?}", ModuleId::of(module)),
    }
}

/// `root` and everything upstream of it, each module after all the modules
/// it depends on.
pub fn sorted_modules(root: &ModuleRef) -> Vec<ModuleRef> {
    fn visit(module: &ModuleRef, seen: &mut HashSet<String>, sorted: &mut Vec<ModuleRef>) {
        if !seen.insert(module_key(module)) {
            return;
        }
        for upstream in module.upstream() {
            visit(&upstream, seen, sorted);
        }
        sorted.push(Rc::clone(module));
    }

    let mut seen = HashSet::new();
    let mut sorted = Vec::new();
    visit(root, &mut seen, &mut sorted);
    sorted
}

/// The modules whose CSS makes up `root`'s output, in output order.
///
/// Extensions apply to the module that declares them and to everything
/// upstream of it. Modules they change are replaced by copies, so the
/// loaded modules themselves are never modified.
pub fn combine_css(root: &ModuleRef) -> Vec<ModuleRef> {
    let sorted = sorted_modules(root);
    if !root.transitively_contains_extensions() {
        return sorted;
    }

    let mut applicable: HashMap<String, Vec<Extension>> = HashMap::new();
    for downstream in &sorted {
        let extensions = downstream.extension_store().borrow().extensions().to_vec();
        if extensions.is_empty() {
            continue;
        }
        for module in sorted_modules(downstream) {
            applicable
                .entry(module_key(&module))
                .or_default()
                .extend(extensions.iter().cloned());
        }
    }

    sorted
        .into_iter()
        .map(|module| match applicable.get(&module_key(&module)) {
            Some(extensions) if module.transitively_contains_css() => {
                let copy = module.clone_css();
                let changed = copy.css().borrow_mut().apply_extensions(extensions);
                log::trace!("Extended {} rule(s) in {}", changed, module_key(&copy));
                copy
            }
            _ => module,
        })
        .collect()
}

/// Serialize the CSS of `modules`, in order.
pub fn serialize(modules: &[ModuleRef], style: OutputStyle) -> String {
    let mut nodes = Vec::new();
    for module in modules {
        nodes.extend(module.pre_module_comments());
        nodes.extend(module.css().borrow().children.iter().cloned());
    }

    match style {
        OutputStyle::Expanded => {
            let mut css = nodes.join("\n\n");
            if !css.is_empty() {
                css.push('\n');
            }
            css
        }
        OutputStyle::Compressed => nodes
            .iter()
            .filter(|node| !is_silent_comment(node))
            .map(|node| compress(node))
            .collect(),
    }
}

/// Comments that compressed output drops. `/*! ... */` is kept.
fn is_silent_comment(node: &str) -> bool {
    let node = node.trim_start();
    node.starts_with("/*") && !node.starts_with("/*!")
}

fn compress(node: &str) -> String {
    let mut output = String::with_capacity(node.len());
    let mut pending_space = false;
    for c in node.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        let punctuation = matches!(c, '{' | '}' | ';' | ':' | ',');
        if pending_space && !punctuation && !output.ends_with(&['{', '}', ';', ':', ','][..]) {
            output.push(' ');
        }
        pending_space = false;
        if c == '}' && output.ends_with(';') {
            output.pop();
        }
        output.push(c);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::{CssStylesheet, ExtensionStore};
    use crate::environment::Environment;
    use crate::module::test_support::span;

    fn module(url: &str, rules: &[&str], upstream: &[&ModuleRef], extensions: ExtensionStore) -> ModuleRef {
        let mut env = Environment::new();
        for (i, module) in upstream.iter().enumerate() {
            env.add_module(Rc::clone(module), span(i + 1), Some(module.url().unwrap_or("m")))
                .unwrap();
        }
        let mut css = CssStylesheet::new(Some(url.to_string()));
        for rule in rules {
            css.push(*rule);
        }
        env.to_module(css, Vec::new(), extensions)
    }

    #[test]
    fn dependencies_come_first_once() {
        let base = module("base", &[".base {}"], &[], ExtensionStore::new());
        let left = module("left", &[".left {}"], &[&base], ExtensionStore::new());
        let right = module("right", &[".right {}"], &[&base], ExtensionStore::new());
        let root = module("root", &[], &[&left, &right], ExtensionStore::new());

        let urls: Vec<String> = sorted_modules(&root).iter().map(module_key).collect();
        assert_eq!(urls, vec!["base", "left", "right", "root"]);
    }

    #[test]
    fn extensions_apply_to_copies_of_upstream_css() {
        let base = module("base", &[".error { color: red; }"], &[], ExtensionStore::new());
        let mut extensions = ExtensionStore::new();
        extensions.add_extension(".serious", ".error");
        let root = module("root", &[".serious { font-weight: bold; }"], &[&base], extensions);

        let combined = combine_css(&root);
        let css = serialize(&combined, OutputStyle::Expanded);
        assert_eq!(
            css,
            ".error, .serious { color: red; }\n\n.serious { font-weight: bold; }\n"
        );
        assert_eq!(base.css().borrow().children[0], ".error { color: red; }");
    }

    #[test]
    fn compressed_output_strips_whitespace_and_comments() {
        let mut css = CssStylesheet::new(Some("main".to_string()));
        css.push("/* note */");
        css.push("/*! keep */");
        css.push(".a, .b {\n  color: red;\n  margin: 0 auto;\n}");
        let root = Environment::new().to_module(css, Vec::new(), ExtensionStore::new());

        assert_eq!(
            serialize(&[root], OutputStyle::Compressed),
            "/*! keep */.a,.b{color:red;margin:0 auto}"
        );
    }
}
