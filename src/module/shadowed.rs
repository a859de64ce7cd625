use super::{MemberNames, Module, ModuleRef, VariableIdentity};
use crate::css::{SharedCss, SharedExtensions};
use crate::error::{CompilerError, Result};
use crate::types::{Callable, MemberKind, Span, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// Outcome of hiding a set of names from a module
#[derive(Debug)]
pub enum Shadowing {
    /// The module exposes none of the names; keep it as is.
    Unaffected,
    /// Every name the module exposes is hidden; drop it.
    Hidden,
    View(ModuleRef),
}

/// A module with some of its member names hidden
pub struct ShadowedModuleView {
    inner: ModuleRef,
    hidden: MemberNames,
}

impl ShadowedModuleView {
    pub fn if_necessary(inner: &ModuleRef, hidden: &MemberNames) -> Shadowing {
        let needs_shadowing = MemberKind::ALL.iter().any(|kind| {
            hidden
                .get(*kind)
                .iter()
                .any(|name| inner.has_member(*kind, name))
        });
        if !needs_shadowing {
            return Shadowing::Unaffected;
        }

        let view = ShadowedModuleView {
            inner: Rc::clone(inner),
            hidden: hidden.clone(),
        };
        if view.is_empty() {
            Shadowing::Hidden
        } else {
            Shadowing::View(Rc::new(view))
        }
    }

    fn hides(&self, kind: MemberKind, name: &str) -> bool {
        self.hidden.get(kind).contains(name)
    }
}

impl fmt::Debug for ShadowedModuleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowedModuleView")
            .field("inner", &self.inner)
            .field("hidden", &self.hidden)
            .finish()
    }
}

impl Module for ShadowedModuleView {
    fn url(&self) -> Option<&str> {
        self.inner.url()
    }

    fn upstream(&self) -> Vec<ModuleRef> {
        self.inner.upstream()
    }

    fn variable(&self, name: &str) -> Option<Value> {
        if self.hides(MemberKind::Variable, name) {
            None
        } else {
            self.inner.variable(name)
        }
    }

    fn variable_site(&self, name: &str) -> Option<Span> {
        if self.hides(MemberKind::Variable, name) {
            None
        } else {
            self.inner.variable_site(name)
        }
    }

    fn function(&self, name: &str) -> Option<Callable> {
        if self.hides(MemberKind::Function, name) {
            None
        } else {
            self.inner.function(name)
        }
    }

    fn mixin(&self, name: &str) -> Option<Callable> {
        if self.hides(MemberKind::Mixin, name) {
            None
        } else {
            self.inner.mixin(name)
        }
    }

    fn member_names(&self, kind: MemberKind) -> BTreeSet<String> {
        let hidden = self.hidden.get(kind);
        self.inner
            .member_names(kind)
            .into_iter()
            .filter(|name| !hidden.contains(name))
            .collect()
    }

    fn has_member(&self, kind: MemberKind, name: &str) -> bool {
        !self.hides(kind, name) && self.inner.has_member(kind, name)
    }

    fn set_variable(&self, name: &str, value: Value, site: Span) -> Result<()> {
        if self.hides(MemberKind::Variable, name) {
            return Err(CompilerError::undefined_module_variable(name));
        }
        self.inner.set_variable(name, value, site)
    }

    fn variable_identity(&self, name: &str) -> VariableIdentity {
        self.inner.variable_identity(name)
    }

    fn css(&self) -> SharedCss {
        self.inner.css()
    }

    fn extension_store(&self) -> SharedExtensions {
        self.inner.extension_store()
    }

    fn pre_module_comments(&self) -> Vec<String> {
        self.inner.pre_module_comments()
    }

    fn transitively_contains_css(&self) -> bool {
        self.inner.transitively_contains_css()
    }

    fn transitively_contains_extensions(&self) -> bool {
        self.inner.transitively_contains_extensions()
    }

    fn clone_css(self: Rc<Self>) -> ModuleRef {
        if !self.transitively_contains_css() {
            return self;
        }
        Rc::new(ShadowedModuleView {
            inner: Rc::clone(&self.inner).clone_css(),
            hidden: self.hidden.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn hide_variables(names: &[&str]) -> MemberNames {
        MemberNames {
            variables: names.iter().map(|n| n.to_string()).collect(),
            ..MemberNames::default()
        }
    }

    #[test]
    fn unrelated_names_leave_module_unaffected() {
        let module = module_with(&[("a", "1")], &[], &[]);
        assert!(matches!(
            ShadowedModuleView::if_necessary(&module, &hide_variables(&["b"])),
            Shadowing::Unaffected
        ));
    }

    #[test]
    fn hides_only_the_requested_names() {
        let module = module_with(&[("a", "1"), ("b", "2")], &["f"], &[]);
        let Shadowing::View(view) = ShadowedModuleView::if_necessary(&module, &hide_variables(&["a"])) else {
            panic!("expected a shadowed view");
        };
        assert_eq!(view.variable("a"), None);
        assert_eq!(view.variable("b"), Some(value("2")));
        assert!(view.function("f").is_some());
        assert!(view.set_variable("a", value("3"), span(9)).is_err());
        assert_eq!(module.variable("a"), Some(value("1")));
    }

    #[test]
    fn hiding_everything_drops_the_module() {
        let module = module_with(&[("a", "1")], &[], &[]);
        assert!(matches!(
            ShadowedModuleView::if_necessary(&module, &hide_variables(&["a"])),
            Shadowing::Hidden
        ));
    }
}
