//! Lexical environment: the scope stack every variable, function, and mixin
//! reference is resolved against.
//!
//! Resolution order for an unqualified name:
//! - the innermost frame that declares it (memoized per name, plus a one-slot
//!   cache for the most recently touched variable)
//! - modules forwarded by imports nested in the current scopes, innermost first
//! - modules made visible by legacy imports at the root
//! - namespaceless `@use` modules, which must agree on the declaration
//!
//! Frames are reference counted so that a closure taken from this environment
//! shares every scope that existed when it was taken, while scopes pushed
//! afterwards stay private to whichever side pushed them.

pub(crate) mod frame;
mod module;
mod registry;

pub use module::EnvironmentModule;

use crate::configuration::{Configuration, ConfiguredValue};
use crate::error::{CompilerError, Result};
use crate::module::{ModuleRef, VariableIdentity};
use crate::types::{Callable, MemberKind, Span, Value};
use frame::{Frame, Shared};
use registry::ModuleTable;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// What a namespaceless lookup found, compared to detect ambiguity
#[derive(Debug, PartialEq)]
enum MemberIdentity {
    Variable(VariableIdentity),
    Callable(Callable),
}

/// State saved by [`Environment::enter_scope`] and restored by
/// [`Environment::exit_scope`]
#[must_use]
#[derive(Debug)]
pub struct ScopeState {
    was_semi_global: bool,
    pushed: bool,
}

#[derive(Debug)]
pub struct Environment {
    frames: Vec<Shared<Frame>>,
    registry: Shared<ModuleTable>,
    /// Modules made visible without a namespace by legacy imports. Shared
    /// with every environment created for a nested import.
    imported_modules: Shared<Vec<(ModuleRef, Span)>>,
    /// Whether any frame may hold modules forwarded by a nested import
    nested_forwards: bool,

    variable_indices: HashMap<String, usize>,
    function_indices: HashMap<String, usize>,
    mixin_indices: HashMap<String, usize>,
    last_variable: Option<(String, usize)>,

    content: Option<Callable>,
    in_mixin: bool,
    in_semi_global_scope: bool,
}

impl Environment {
    pub fn new() -> Self {
        Self::with_frames(
            vec![Frame::shared()],
            Rc::new(RefCell::new(ModuleTable::default())),
            Rc::new(RefCell::new(Vec::new())),
            false,
            None,
        )
    }

    fn with_frames(
        frames: Vec<Shared<Frame>>,
        registry: Shared<ModuleTable>,
        imported_modules: Shared<Vec<(ModuleRef, Span)>>,
        nested_forwards: bool,
        content: Option<Callable>,
    ) -> Self {
        Self {
            frames,
            registry,
            imported_modules,
            nested_forwards,
            variable_indices: HashMap::new(),
            function_indices: HashMap::new(),
            mixin_indices: HashMap::new(),
            last_variable: None,
            content,
            in_mixin: false,
            in_semi_global_scope: true,
        }
    }

    /// A snapshot for a function or mixin to close over.
    ///
    /// The frame list is copied but the frames themselves are shared, so
    /// later writes to existing scopes are visible on both sides.
    pub fn closure(&self) -> Environment {
        Self::with_frames(
            self.frames.clone(),
            Rc::clone(&self.registry),
            Rc::clone(&self.imported_modules),
            self.nested_forwards,
            self.content.clone(),
        )
    }

    /// An environment for evaluating a stylesheet loaded by a legacy import.
    ///
    /// It shares frames and imported modules with this one, but `@use` and
    /// `@forward` inside the imported file get their own tables.
    pub fn for_import(&self) -> Environment {
        Self::with_frames(
            self.frames.clone(),
            Rc::new(RefCell::new(ModuleTable::default())),
            Rc::clone(&self.imported_modules),
            self.nested_forwards,
            self.content.clone(),
        )
    }

    pub fn at_root(&self) -> bool {
        self.frames.len() == 1
    }

    /// Number of open scopes, including the root
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn in_mixin(&self) -> bool {
        self.in_mixin
    }

    pub fn in_semi_global_scope(&self) -> bool {
        self.in_semi_global_scope
    }

    /// The content block passed to the innermost mixin being evaluated
    pub fn content(&self) -> Option<&Callable> {
        self.content.as_ref()
    }

    // --- Scopes ---

    /// Run `body` in a new scope.
    ///
    /// A semi-global scope may assign to existing root variables without
    /// `!global`. It can only be semi-global if the enclosing scope is.
    pub fn scope<T>(&mut self, semi_global: bool, body: impl FnOnce(&mut Self) -> T) -> T {
        self.scope_when(true, semi_global, body)
    }

    /// Like [`Environment::scope`], but only pushes a frame when `when` is
    /// true. Semi-global tracking applies either way.
    pub fn scope_when<T>(&mut self, when: bool, semi_global: bool, body: impl FnOnce(&mut Self) -> T) -> T {
        let state = self.enter_scope(when, semi_global);
        let result = body(self);
        self.exit_scope(state);
        result
    }

    /// Open a scope. Every call must be paired with [`Environment::exit_scope`].
    pub fn enter_scope(&mut self, when: bool, semi_global: bool) -> ScopeState {
        let state = ScopeState {
            was_semi_global: self.in_semi_global_scope,
            pushed: when,
        };
        self.in_semi_global_scope = semi_global && self.in_semi_global_scope;
        if when {
            self.frames.push(Frame::shared());
        }
        state
    }

    pub fn exit_scope(&mut self, state: ScopeState) {
        self.in_semi_global_scope = state.was_semi_global;
        if !state.pushed {
            return;
        }

        let depth = self.frames.len() - 1;
        if depth == 0 {
            log::warn!("Attempted to pop the root scope");
            return;
        }
        if let Some(frame) = self.frames.pop() {
            // Callables declared in a closed scope can't be reached once it
            // is gone, unless a closure elsewhere still shares the frame.
            if frame::is_only_self_referenced(&frame) {
                let released = frame::release_callables(&frame);
                if released > 0 {
                    log::trace!("Released {} callable(s) from scope at depth {}", released, depth);
                }
            }
        }
        self.last_variable = None;
        self.variable_indices.retain(|_, index| *index < depth);
        self.function_indices.retain(|_, index| *index < depth);
        self.mixin_indices.retain(|_, index| *index < depth);
        log::trace!("Closed scope at depth {}", depth);
    }

    /// Run `body` with `content` as the current content block.
    pub fn with_content<T>(&mut self, content: Option<Callable>, body: impl FnOnce(&mut Self) -> T) -> T {
        let old = self.replace_content(content);
        let result = body(self);
        self.content = old;
        result
    }

    /// Set the current content block, returning the previous one.
    pub fn replace_content(&mut self, content: Option<Callable>) -> Option<Callable> {
        std::mem::replace(&mut self.content, content)
    }

    /// Run `body` as the body of a mixin.
    pub fn as_mixin<T>(&mut self, body: impl FnOnce(&mut Self) -> T) -> T {
        let old = self.set_in_mixin(true);
        let result = body(self);
        self.in_mixin = old;
        result
    }

    /// Set the in-mixin flag, returning the previous value.
    pub fn set_in_mixin(&mut self, in_mixin: bool) -> bool {
        std::mem::replace(&mut self.in_mixin, in_mixin)
    }

    /// Forget memoized frame indices. Needed after another environment that
    /// shares these frames, such as one from [`Environment::for_import`],
    /// has declared members in them.
    pub fn clear_caches(&mut self) {
        self.variable_indices.clear();
        self.function_indices.clear();
        self.mixin_indices.clear();
        self.last_variable = None;
    }

    /// Drop every function and mixin declared at the root, including the
    /// ones modules built from this environment expose.
    ///
    /// Root callables close over the root frame, which is never freed while
    /// it holds any of them.
    pub fn release_callables(&self) -> usize {
        frame::release_callables(&self.frames[0])
    }

    pub(crate) fn root_frame(&self) -> frame::WeakFrame {
        Rc::downgrade(&self.frames[0])
    }

    fn holds_frame(&self, frame: &Shared<Frame>) -> bool {
        self.frames.iter().any(|held| Rc::ptr_eq(held, frame))
    }

    // --- Variables ---

    /// The value of the variable `name`, or `None` if it isn't declared
    /// anywhere visible.
    pub fn get_variable(&mut self, name: &str, namespace: Option<&str>) -> Result<Option<Value>> {
        if let Some(namespace) = namespace {
            return Ok(self.get_module(namespace)?.variable(name));
        }

        if let Some(index) = self.cached_variable_index(name) {
            let local = self
                .frames
                .get(index)
                .and_then(|frame| frame.borrow().variables.get(name).cloned());
            if local.is_some() {
                return Ok(local);
            }
        }
        self.variable_from_global_module(name)
    }

    /// Where the visible declaration of `name` was written
    pub fn get_variable_site(&mut self, name: &str, namespace: Option<&str>) -> Result<Option<Span>> {
        if let Some(namespace) = namespace {
            return Ok(self.get_module(namespace)?.variable_site(name));
        }

        if let Some(index) = self.cached_variable_index(name) {
            let local = self
                .frames
                .get(index)
                .and_then(|frame| frame.borrow().variable_sites.get(name).cloned());
            if local.is_some() {
                return Ok(local);
            }
        }
        self.from_one_module(
            name,
            MemberKind::Variable,
            |module| module.variable_site(name),
            |module, _| MemberIdentity::Variable(module.variable_identity(name)),
        )
    }

    pub fn variable_exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.get_variable(name, None)?.is_some())
    }

    /// Whether `name` is declared at the root or by a module visible there
    pub fn global_variable_exists(&self, name: &str, namespace: Option<&str>) -> Result<bool> {
        if let Some(namespace) = namespace {
            return Ok(self.get_module(namespace)?.has_member(MemberKind::Variable, name));
        }
        if self.frames[0].borrow().variables.contains_key(name) {
            return Ok(true);
        }
        Ok(self.variable_from_global_module(name)?.is_some())
    }

    /// Assign `value` to the variable `name`.
    ///
    /// With a namespace, the write goes to that module. With `global` or at
    /// the root, it goes to the root frame, unless the root doesn't declare
    /// the name and a module visible without a namespace does. Otherwise the
    /// nearest enclosing declaration is updated, except that a scope which
    /// isn't semi-global never implicitly writes the root frame.
    pub fn set_variable(
        &mut self,
        name: &str,
        value: Value,
        site: Span,
        namespace: Option<&str>,
        global: bool,
    ) -> Result<()> {
        if let Some(namespace) = namespace {
            return self.get_module(namespace)?.set_variable(name, value, site);
        }

        if global || self.at_root() {
            if !self.frames[0].borrow().variables.contains_key(name) {
                let owner = self.from_one_module(
                    name,
                    MemberKind::Variable,
                    |module| module.has_member(MemberKind::Variable, name).then(|| Rc::clone(module)),
                    |module, _| MemberIdentity::Variable(module.variable_identity(name)),
                )?;
                if let Some(module) = owner {
                    return module.set_variable(name, value, site);
                }
            }

            // A local declaration of the same name keeps priority for reads.
            if !self.variable_indices.contains_key(name) {
                self.variable_indices.insert(name.to_string(), 0);
                self.last_variable = Some((name.to_string(), 0));
            }
            let mut root = self.frames[0].borrow_mut();
            root.variables.insert(name.to_string(), value);
            root.variable_sites.insert(name.to_string(), site);
            return Ok(());
        }

        if self.nested_forwards
            && !self.variable_indices.contains_key(name)
            && self.variable_index(name).is_none()
        {
            if let Some(module) = self.nested_forward_with(MemberKind::Variable, name) {
                return module.set_variable(name, value, site);
            }
        }

        let mut index = match &self.last_variable {
            Some((last, index)) if last == name => *index,
            _ => match self.variable_indices.get(name) {
                Some(&index) => index,
                None => {
                    let index = self.variable_index(name).unwrap_or(self.frames.len() - 1);
                    self.variable_indices.insert(name.to_string(), index);
                    index
                }
            },
        };
        if !self.in_semi_global_scope && index == 0 {
            index = self.frames.len() - 1;
            self.variable_indices.insert(name.to_string(), index);
        }

        self.last_variable = Some((name.to_string(), index));
        let mut frame = self.frames[index].borrow_mut();
        frame.variables.insert(name.to_string(), value);
        frame.variable_sites.insert(name.to_string(), site);
        Ok(())
    }

    /// Declare `name` in the innermost scope, shadowing any outer declaration.
    pub fn set_local_variable(&mut self, name: &str, value: Value, site: Span) {
        let index = self.frames.len() - 1;
        self.last_variable = Some((name.to_string(), index));
        self.variable_indices.insert(name.to_string(), index);
        let mut frame = self.frames[index].borrow_mut();
        frame.variables.insert(name.to_string(), value);
        frame.variable_sites.insert(name.to_string(), site);
    }

    /// Frame index of the innermost declaration of `name`, caching the result
    fn cached_variable_index(&mut self, name: &str) -> Option<usize> {
        if let Some((last, index)) = &self.last_variable {
            if last == name {
                return Some(*index);
            }
        }

        let index = match self.variable_indices.get(name) {
            Some(&index) => index,
            None => {
                let index = self.variable_index(name)?;
                self.variable_indices.insert(name.to_string(), index);
                index
            }
        };
        self.last_variable = Some((name.to_string(), index));
        Some(index)
    }

    fn variable_index(&self, name: &str) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|frame| frame.borrow().variables.contains_key(name))
    }

    fn variable_from_global_module(&self, name: &str) -> Result<Option<Value>> {
        self.from_one_module(
            name,
            MemberKind::Variable,
            |module| module.variable(name),
            |module, _| MemberIdentity::Variable(module.variable_identity(name)),
        )
    }

    // --- Functions and mixins ---

    pub fn get_function(&mut self, name: &str, namespace: Option<&str>) -> Result<Option<Callable>> {
        self.get_callable(MemberKind::Function, name, namespace)
    }

    pub fn get_mixin(&mut self, name: &str, namespace: Option<&str>) -> Result<Option<Callable>> {
        self.get_callable(MemberKind::Mixin, name, namespace)
    }

    pub fn function_exists(&mut self, name: &str, namespace: Option<&str>) -> Result<bool> {
        Ok(self.get_function(name, namespace)?.is_some())
    }

    pub fn mixin_exists(&mut self, name: &str, namespace: Option<&str>) -> Result<bool> {
        Ok(self.get_mixin(name, namespace)?.is_some())
    }

    /// Declare a function in the innermost scope.
    pub fn set_function(&mut self, callable: Callable) {
        self.set_callable(MemberKind::Function, callable);
    }

    /// Declare a mixin in the innermost scope.
    pub fn set_mixin(&mut self, callable: Callable) {
        self.set_callable(MemberKind::Mixin, callable);
    }

    fn get_callable(&mut self, kind: MemberKind, name: &str, namespace: Option<&str>) -> Result<Option<Callable>> {
        if let Some(namespace) = namespace {
            return Ok(self.get_module(namespace)?.callable(kind, name));
        }

        let cached = self.callable_indices(kind).get(name).copied();
        let index = match cached {
            Some(index) => Some(index),
            None => {
                let found = self
                    .frames
                    .iter()
                    .rposition(|frame| frame.borrow().callables(kind).contains_key(name));
                if let Some(index) = found {
                    self.callable_indices(kind).insert(name.to_string(), index);
                }
                found
            }
        };

        if let Some(index) = index {
            let local = self
                .frames
                .get(index)
                .and_then(|frame| frame.borrow().callables(kind).get(name).cloned());
            if local.is_some() {
                return Ok(local);
            }
        }
        self.from_one_module(
            name,
            kind,
            |module| module.callable(kind, name),
            |_, callable| MemberIdentity::Callable(callable.clone()),
        )
    }

    fn set_callable(&mut self, kind: MemberKind, callable: Callable) {
        let index = self.frames.len() - 1;
        let name = callable.name().to_string();
        self.callable_indices(kind).insert(name.clone(), index);
        self.frames[index].borrow_mut().callables_mut(kind).insert(name, callable);
    }

    fn callable_indices(&mut self, kind: MemberKind) -> &mut HashMap<String, usize> {
        match kind {
            MemberKind::Mixin => &mut self.mixin_indices,
            _ => &mut self.function_indices,
        }
    }

    // --- Module-provided members ---

    fn get_module(&self, namespace: &str) -> Result<ModuleRef> {
        self.registry
            .borrow()
            .modules
            .get(namespace)
            .cloned()
            .ok_or_else(|| CompilerError::unknown_namespace(namespace))
    }

    /// The innermost module forwarded by a nested import that exposes `name`
    fn nested_forward_with(&self, kind: MemberKind, name: &str) -> Option<ModuleRef> {
        self.frames.iter().skip(1).rev().find_map(|frame| {
            frame
                .borrow()
                .forwarded
                .iter()
                .rev()
                .find(|module| module.has_member(kind, name))
                .cloned()
        })
    }

    /// Look `name` up in modules visible without a namespace.
    ///
    /// Nested forwards and imported modules are searched in priority order.
    /// Namespaceless `@use` modules have no priority among themselves, so
    /// more than one of them providing different declarations is an error.
    fn from_one_module<T>(
        &self,
        name: &str,
        kind: MemberKind,
        lookup: impl Fn(&ModuleRef) -> Option<T>,
        identity: impl Fn(&ModuleRef, &T) -> MemberIdentity,
    ) -> Result<Option<T>> {
        if self.nested_forwards {
            for frame in self.frames.iter().skip(1).rev() {
                let forwarded = frame.borrow().forwarded.clone();
                if let Some(found) = forwarded.iter().rev().find_map(&lookup) {
                    return Ok(Some(found));
                }
            }
        }

        let imported = self.imported_modules.borrow().clone();
        if let Some(found) = imported.iter().find_map(|(module, _)| lookup(module)) {
            return Ok(Some(found));
        }

        let globals = self.registry.borrow().global_modules.clone();
        let mut result: Option<(T, MemberIdentity)> = None;
        for (module, _) in &globals {
            let Some(found) = lookup(module) else {
                continue;
            };
            let found_identity = identity(module, &found);
            match &result {
                Some((_, existing)) if *existing == found_identity => continue,
                Some(_) => {
                    let sites = globals
                        .iter()
                        .filter(|(module, _)| lookup(module).is_some())
                        .map(|(_, site)| site.clone())
                        .collect();
                    return Err(CompilerError::AmbiguousGlobalMember {
                        kind,
                        name: name.to_string(),
                        sites,
                    });
                }
                None => result = Some((found, found_identity)),
            }
        }
        Ok(result.map(|(found, _)| found))
    }

    // --- Configuration ---

    /// Every variable visible through imported modules and the root frame,
    /// for configuring a module loaded by a legacy import.
    pub fn to_implicit_configuration(&self) -> Configuration {
        let mut values = HashMap::new();
        for (module, _) in self.imported_modules.borrow().iter() {
            for name in module.member_names(MemberKind::Variable) {
                if let (Some(value), Some(site)) = (module.variable(&name), module.variable_site(&name)) {
                    values.insert(name, ConfiguredValue { value, site });
                }
            }
        }

        let root = self.frames[0].borrow();
        for (name, value) in &root.variables {
            if let Some(site) = root.variable_sites.get(name) {
                values.insert(
                    name.clone(),
                    ConfiguredValue {
                        value: value.clone(),
                        site: site.clone(),
                    },
                );
            }
        }
        Configuration::implicit(values)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
