//! Modules: the immutable exported interface of a compiled stylesheet.
//!
//! A module is never a copy of its members. Every implementation reads
//! through to the frame or upstream module that owns the declaration, so a
//! later write to an exported variable is visible to every consumer.

mod forwarded;
mod merged;
mod shadowed;

pub use forwarded::{ForwardRule, ForwardedModuleView};
pub use merged::MergedMembers;
pub use shadowed::{Shadowing, ShadowedModuleView};

use crate::css::{SharedCss, SharedExtensions};
use crate::error::Result;
use crate::types::{Callable, MemberKind, Span, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

pub type ModuleRef = Rc<dyn Module>;

/// Identity of a module instance, stable for as long as the module is alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

impl ModuleId {
    pub fn of(module: &ModuleRef) -> Self {
        ModuleId(Rc::as_ptr(module) as *const () as usize)
    }
}

/// The declaration a variable name ultimately resolves to.
///
/// Two modules that expose the same variable through different views (a
/// forwarded prefix, a shadowed view, a cloned module) agree on its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableIdentity {
    owner: usize,
    name: String,
}

impl VariableIdentity {
    pub(crate) fn new(owner: usize, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

/// Names a module exposes, grouped by member kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberNames {
    pub variables: BTreeSet<String>,
    pub functions: BTreeSet<String>,
    pub mixins: BTreeSet<String>,
}

impl MemberNames {
    pub fn of(module: &dyn Module) -> Self {
        Self {
            variables: module.member_names(MemberKind::Variable),
            functions: module.member_names(MemberKind::Function),
            mixins: module.member_names(MemberKind::Mixin),
        }
    }

    pub fn get(&self, kind: MemberKind) -> &BTreeSet<String> {
        match kind {
            MemberKind::Variable => &self.variables,
            MemberKind::Function => &self.functions,
            MemberKind::Mixin => &self.mixins,
        }
    }

    pub fn get_mut(&mut self, kind: MemberKind) -> &mut BTreeSet<String> {
        match kind {
            MemberKind::Variable => &mut self.variables,
            MemberKind::Function => &mut self.functions,
            MemberKind::Mixin => &mut self.mixins,
        }
    }

    pub fn extend(&mut self, other: MemberNames) {
        self.variables.extend(other.variables);
        self.functions.extend(other.functions);
        self.mixins.extend(other.mixins);
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.functions.is_empty() && self.mixins.is_empty()
    }
}

pub trait Module: fmt::Debug {
    /// Canonical URL of the stylesheet this module was compiled from
    fn url(&self) -> Option<&str>;

    /// Every module this one used or forwarded, in encounter order
    fn upstream(&self) -> Vec<ModuleRef>;

    fn variable(&self, name: &str) -> Option<Value>;

    fn variable_site(&self, name: &str) -> Option<Span>;

    fn function(&self, name: &str) -> Option<Callable>;

    fn mixin(&self, name: &str) -> Option<Callable>;

    /// Sorted names of every exposed member of `kind`
    fn member_names(&self, kind: MemberKind) -> BTreeSet<String>;

    fn has_member(&self, kind: MemberKind, name: &str) -> bool {
        match kind {
            MemberKind::Variable => self.variable(name).is_some(),
            MemberKind::Function => self.function(name).is_some(),
            MemberKind::Mixin => self.mixin(name).is_some(),
        }
    }

    fn callable(&self, kind: MemberKind, name: &str) -> Option<Callable> {
        match kind {
            MemberKind::Variable => None,
            MemberKind::Function => self.function(name),
            MemberKind::Mixin => self.mixin(name),
        }
    }

    /// Assign to an exported variable. Modules are closed member sets, so
    /// assigning a name the module doesn't export is an error.
    fn set_variable(&self, name: &str, value: Value, site: Span) -> Result<()>;

    /// Only meaningful for names this module exposes.
    fn variable_identity(&self, name: &str) -> VariableIdentity;

    fn css(&self) -> SharedCss;

    fn extension_store(&self) -> SharedExtensions;

    fn pre_module_comments(&self) -> Vec<String>;

    fn transitively_contains_css(&self) -> bool;

    fn transitively_contains_extensions(&self) -> bool;

    /// The modules this one re-exports, when it was materialized from an
    /// environment that forwarded anything.
    fn forwarded_modules(&self) -> Option<Vec<(ModuleRef, Span)>> {
        None
    }

    /// A module whose CSS can be modified independently of this one's.
    fn clone_css(self: Rc<Self>) -> ModuleRef;

    fn is_empty(&self) -> bool {
        MemberKind::ALL
            .iter()
            .all(|kind| self.member_names(*kind).is_empty())
    }
}

/// Whether `module` is already present in `modules`
pub(crate) fn contains_module(modules: &[(ModuleRef, Span)], module: &ModuleRef) -> bool {
    let id = ModuleId::of(module);
    modules.iter().any(|(other, _)| ModuleId::of(other) == id)
}

/// Insert `module`, replacing the site of an existing entry for the same
/// module instead of duplicating it.
pub(crate) fn insert_module(modules: &mut Vec<(ModuleRef, Span)>, module: ModuleRef, site: Span) {
    let id = ModuleId::of(&module);
    match modules.iter_mut().find(|(other, _)| ModuleId::of(other) == id) {
        Some(entry) => entry.1 = site,
        None => modules.push((module, site)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::css::{CssStylesheet, ExtensionStore};
    use crate::environment::Environment;
    use crate::types::Span;

    pub fn span(line: usize) -> Span {
        Span::new("test.scss", line, 1)
    }

    pub fn value(literal: &str) -> Value {
        Value::parse(literal)
    }

    /// Materialize a module with the given root variables and callables.
    pub fn module_with(variables: &[(&str, &str)], functions: &[&str], mixins: &[&str]) -> ModuleRef {
        let mut env = Environment::new();
        for (i, (name, literal)) in variables.iter().enumerate() {
            env.set_variable(name, value(literal), span(i + 1), None, false).unwrap();
        }
        for name in functions {
            env.set_function(Callable::new(*name, span(0), Vec::new(), env.closure()));
        }
        for name in mixins {
            env.set_mixin(Callable::new(*name, span(0), Vec::new(), env.closure()));
        }
        env.to_module(CssStylesheet::default(), Vec::new(), ExtensionStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn module_ids_follow_instances() {
        let a = module_with(&[("x", "1")], &[], &[]);
        let b = module_with(&[("x", "1")], &[], &[]);
        assert_eq!(ModuleId::of(&a), ModuleId::of(&a.clone()));
        assert_ne!(ModuleId::of(&a), ModuleId::of(&b));
    }

    #[test]
    fn insert_module_replaces_existing_entry() {
        let a = module_with(&[], &[], &[]);
        let mut modules = Vec::new();
        insert_module(&mut modules, a.clone(), span(1));
        insert_module(&mut modules, a.clone(), span(2));
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].1, span(2));
        assert!(contains_module(&modules, &a));
    }

    #[test]
    fn member_names_group_by_kind() {
        let module = module_with(&[("primary", "red")], &["tint"], &["theme"]);
        let names = MemberNames::of(module.as_ref());
        assert!(names.variables.contains("primary"));
        assert!(names.functions.contains("tint"));
        assert!(names.mixins.contains("theme"));
        assert!(!names.is_empty());
    }
}
