use super::ModuleRef;
use crate::environment::frame::{Frame, Shared};
use crate::types::{is_private, Callable, MemberKind, Span, Value};
use std::collections::BTreeSet;
use std::rc::Rc;

/// One lookup surface over a root frame's public members and the modules it
/// forwards.
///
/// Local declarations win over forwarded ones. Forwarded modules are queried
/// in the order they were forwarded; they cannot disagree because conflicting
/// forwards are rejected before they are recorded.
#[derive(Debug, Clone)]
pub struct MergedMembers {
    local: Shared<Frame>,
    forwarded: Vec<ModuleRef>,
}

impl MergedMembers {
    pub fn new(local: Shared<Frame>, forwarded: Vec<ModuleRef>) -> Self {
        Self { local, forwarded }
    }

    pub fn forwarded(&self) -> &[ModuleRef] {
        &self.forwarded
    }

    /// Address of the local frame, which identifies local declarations
    pub fn local_id(&self) -> usize {
        Rc::as_ptr(&self.local) as *const () as usize
    }

    pub fn has_local(&self, kind: MemberKind, name: &str) -> bool {
        if is_private(name) {
            return false;
        }
        let frame = self.local.borrow();
        match kind {
            MemberKind::Variable => frame.variables.contains_key(name),
            _ => frame.callables(kind).contains_key(name),
        }
    }

    /// The first forwarded module that exposes member `name`
    pub fn forwarded_owner(&self, kind: MemberKind, name: &str) -> Option<&ModuleRef> {
        self.forwarded.iter().find(|module| module.has_member(kind, name))
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        if !is_private(name) {
            if let Some(value) = self.local.borrow().variables.get(name) {
                return Some(value.clone());
            }
        }
        self.forwarded.iter().find_map(|module| module.variable(name))
    }

    pub fn variable_site(&self, name: &str) -> Option<Span> {
        if !is_private(name) {
            if let Some(site) = self.local.borrow().variable_sites.get(name) {
                return Some(site.clone());
            }
        }
        self.forwarded.iter().find_map(|module| module.variable_site(name))
    }

    pub fn callable(&self, kind: MemberKind, name: &str) -> Option<Callable> {
        if !is_private(name) {
            if let Some(callable) = self.local.borrow().callables(kind).get(name) {
                return Some(callable.clone());
            }
        }
        self.forwarded.iter().find_map(|module| module.callable(kind, name))
    }

    pub fn member_names(&self, kind: MemberKind) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = {
            let frame = self.local.borrow();
            let local: Vec<&String> = match kind {
                MemberKind::Variable => frame.variables.keys().collect(),
                _ => frame.callables(kind).keys().collect(),
            };
            local
                .into_iter()
                .filter(|name| !is_private(name))
                .cloned()
                .collect()
        };
        for module in &self.forwarded {
            names.extend(module.member_names(kind));
        }
        names
    }

    /// Write `value` into the local frame. Callers must have checked
    /// [`MergedMembers::has_local`].
    pub fn set_local_variable(&self, name: &str, value: Value, site: Span) {
        let mut frame = self.local.borrow_mut();
        frame.variables.insert(name.to_string(), value);
        frame.variable_sites.insert(name.to_string(), site);
    }
}
