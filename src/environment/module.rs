//! Materialization of a finished root environment into a module

use super::frame::Shared;
use super::registry::ModuleTable;
use super::Environment;
use crate::css::{clone_css_stylesheet, CssStylesheet, ExtensionStore, SharedCss, SharedExtensions};
use crate::error::{CompilerError, Result};
use crate::module::{MergedMembers, Module, ModuleRef, VariableIdentity};
use crate::types::{Callable, MemberKind, Span, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// A module whose members are the public root declarations of an
/// environment plus everything it forwards
pub struct EnvironmentModule {
    url: Option<String>,
    upstream: Vec<ModuleRef>,
    members: MergedMembers,
    registry: Shared<ModuleTable>,
    css: SharedCss,
    extension_store: SharedExtensions,
    pre_module_comments: Vec<String>,
    transitively_contains_css: bool,
    transitively_contains_extensions: bool,
}

impl EnvironmentModule {
    fn new(
        environment: &Environment,
        css: CssStylesheet,
        pre_module_comments: Vec<String>,
        extension_store: ExtensionStore,
    ) -> Self {
        let registry = environment.registry.borrow();
        let forwarded: Vec<ModuleRef> = registry
            .forwarded_modules
            .iter()
            .flatten()
            .map(|(module, _)| Rc::clone(module))
            .collect();
        let upstream = registry.all_modules.clone();

        let transitively_contains_css = !css.is_empty()
            || !pre_module_comments.is_empty()
            || upstream.iter().any(|module| module.transitively_contains_css());
        let transitively_contains_extensions = !extension_store.is_empty()
            || upstream.iter().any(|module| module.transitively_contains_extensions());

        Self {
            url: css.url.clone(),
            upstream,
            members: MergedMembers::new(Rc::clone(&environment.frames[0]), forwarded),
            registry: Rc::clone(&environment.registry),
            css: Rc::new(RefCell::new(css)),
            extension_store: Rc::new(RefCell::new(extension_store)),
            pre_module_comments,
            transitively_contains_css,
            transitively_contains_extensions,
        }
    }
}

impl Environment {
    /// Freeze this environment and the CSS it produced into a module.
    /// Only the root scope is exported, even when called from a nested one.
    ///
    /// The module reads through to the root frame, so later assignments to
    /// its variables are visible to everyone holding it.
    pub fn to_module(
        &self,
        css: CssStylesheet,
        pre_module_comments: Vec<String>,
        extension_store: ExtensionStore,
    ) -> ModuleRef {
        if !self.at_root() {
            log::warn!(
                "Materializing a module at scope depth {}; only root members are exported",
                self.depth()
            );
        }
        let module = EnvironmentModule::new(self, css, pre_module_comments, extension_store);
        log::debug!(
            "Materialized module {:?} ({} upstream, css: {}, extensions: {})",
            module.url,
            module.upstream.len(),
            module.transitively_contains_css,
            module.transitively_contains_extensions
        );
        Rc::new(module)
    }

    /// A module with this environment's members but no CSS or extensions of
    /// its own, for legacy imports that need a module-shaped value.
    pub fn to_dummy_module(&self) -> ModuleRef {
        Rc::new(EnvironmentModule::new(
            self,
            CssStylesheet::default(),
            Vec::new(),
            ExtensionStore::new(),
        ))
    }
}

impl fmt::Debug for EnvironmentModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentModule")
            .field("url", &self.url)
            .field("upstream", &self.upstream.len())
            .field("forwarded", &self.members.forwarded().len())
            .finish_non_exhaustive()
    }
}

impl Module for EnvironmentModule {
    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn upstream(&self) -> Vec<ModuleRef> {
        self.upstream.clone()
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.members.variable(name)
    }

    fn variable_site(&self, name: &str) -> Option<Span> {
        self.members.variable_site(name)
    }

    fn function(&self, name: &str) -> Option<Callable> {
        self.members.callable(MemberKind::Function, name)
    }

    fn mixin(&self, name: &str) -> Option<Callable> {
        self.members.callable(MemberKind::Mixin, name)
    }

    fn member_names(&self, kind: MemberKind) -> BTreeSet<String> {
        self.members.member_names(kind)
    }

    fn has_member(&self, kind: MemberKind, name: &str) -> bool {
        self.members.has_local(kind, name) || self.members.forwarded_owner(kind, name).is_some()
    }

    fn set_variable(&self, name: &str, value: Value, site: Span) -> Result<()> {
        if self.members.has_local(MemberKind::Variable, name) {
            self.members.set_local_variable(name, value, site);
            return Ok(());
        }
        match self.members.forwarded_owner(MemberKind::Variable, name) {
            Some(module) => module.set_variable(name, value, site),
            None => Err(CompilerError::undefined_module_variable(name)),
        }
    }

    fn variable_identity(&self, name: &str) -> VariableIdentity {
        if !self.members.has_local(MemberKind::Variable, name) {
            if let Some(module) = self.members.forwarded_owner(MemberKind::Variable, name) {
                return module.variable_identity(name);
            }
        }
        VariableIdentity::new(self.members.local_id(), name)
    }

    fn css(&self) -> SharedCss {
        Rc::clone(&self.css)
    }

    fn extension_store(&self) -> SharedExtensions {
        Rc::clone(&self.extension_store)
    }

    fn pre_module_comments(&self) -> Vec<String> {
        self.pre_module_comments.clone()
    }

    fn transitively_contains_css(&self) -> bool {
        self.transitively_contains_css
    }

    fn transitively_contains_extensions(&self) -> bool {
        self.transitively_contains_extensions
    }

    fn forwarded_modules(&self) -> Option<Vec<(ModuleRef, Span)>> {
        self.registry.borrow().forwarded_modules.clone()
    }

    fn clone_css(self: Rc<Self>) -> ModuleRef {
        if !self.transitively_contains_css {
            return self;
        }

        let (css, extension_store) = clone_css_stylesheet(&self.css, &self.extension_store);
        Rc::new(EnvironmentModule {
            url: self.url.clone(),
            upstream: self.upstream.clone(),
            members: self.members.clone(),
            registry: Rc::clone(&self.registry),
            css,
            extension_store,
            pre_module_comments: self.pre_module_comments.clone(),
            transitively_contains_css: self.transitively_contains_css,
            transitively_contains_extensions: self.transitively_contains_extensions,
        })
    }
}
