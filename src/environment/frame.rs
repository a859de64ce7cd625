//! One lexical scope level

use crate::module::ModuleRef;
use crate::types::{Callable, MemberKind, Span, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Mutable state shared between an environment and its closures
pub type Shared<T> = Rc<RefCell<T>>;

pub type WeakFrame = Weak<RefCell<Frame>>;

#[derive(Debug, Default)]
pub struct Frame {
    pub variables: HashMap<String, Value>,
    /// Declaration site of each variable, for diagnostics only
    pub variable_sites: HashMap<String, Span>,
    pub functions: HashMap<String, Callable>,
    pub mixins: HashMap<String, Callable>,
    /// Modules forwarded by a legacy import evaluated at this (non-root) depth
    pub forwarded: Vec<ModuleRef>,
}

impl Frame {
    pub fn shared() -> Shared<Frame> {
        Rc::new(RefCell::new(Frame::default()))
    }

    /// The function or mixin map. Variables live in their own map.
    pub fn callables(&self, kind: MemberKind) -> &HashMap<String, Callable> {
        match kind {
            MemberKind::Mixin => &self.mixins,
            _ => &self.functions,
        }
    }

    pub fn callables_mut(&mut self, kind: MemberKind) -> &mut HashMap<String, Callable> {
        match kind {
            MemberKind::Mixin => &mut self.mixins,
            _ => &mut self.functions,
        }
    }

    pub fn contains(&self, kind: MemberKind, name: &str) -> bool {
        match kind {
            MemberKind::Variable => self.variables.contains_key(name),
            _ => self.callables(kind).contains_key(name),
        }
    }

    /// Remove every function and mixin, handing them back so they are
    /// dropped after the frame is no longer borrowed.
    pub fn take_callables(&mut self) -> Vec<Callable> {
        let mut callables: Vec<Callable> = std::mem::take(&mut self.functions).into_values().collect();
        callables.extend(std::mem::take(&mut self.mixins).into_values());
        callables
    }

    /// Drop the declaration of `name`, if any
    pub fn remove(&mut self, kind: MemberKind, name: &str) {
        match kind {
            MemberKind::Variable => {
                self.variables.remove(name);
                self.variable_sites.remove(name);
            }
            _ => {
                self.callables_mut(kind).remove(name);
            }
        }
    }
}

/// Drop the functions and mixins declared in `frame`.
///
/// A callable closes over the frames it was declared in, so a frame that
/// holds one is part of a reference cycle until it is released.
pub fn release_callables(frame: &Shared<Frame>) -> usize {
    let callables = frame.borrow_mut().take_callables();
    callables.len()
}

/// Whether nothing but the callables stored in `frame` refers to it, apart
/// from the caller's own handle.
pub fn is_only_self_referenced(frame: &Shared<Frame>) -> bool {
    let inner = frame.borrow();
    let own_references = inner
        .functions
        .values()
        .chain(inner.mixins.values())
        .filter(|callable| callable.is_unique() && callable.environment().holds_frame(frame))
        .count();
    Rc::strong_count(frame) == 1 + own_references
}
