use super::{Module, ModuleRef, VariableIdentity};
use crate::css::{SharedCss, SharedExtensions};
use crate::error::{CompilerError, Result};
use crate::types::{Callable, MemberKind, Span, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// A `@forward` rule: which members of the forwarded module are re-exported,
/// and under what prefix.
///
/// Show and hide lists are written in terms of the prefixed names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRule {
    pub url: String,
    pub prefix: Option<String>,
    pub shown_variables: Option<BTreeSet<String>>,
    pub shown_mixins_and_functions: Option<BTreeSet<String>>,
    pub hidden_variables: BTreeSet<String>,
    pub hidden_mixins_and_functions: BTreeSet<String>,
    pub site: Span,
}

impl ForwardRule {
    pub fn new(url: impl Into<String>, site: Span) -> Self {
        Self {
            url: url.into(),
            prefix: None,
            shown_variables: None,
            shown_mixins_and_functions: None,
            hidden_variables: BTreeSet::new(),
            hidden_mixins_and_functions: BTreeSet::new(),
            site,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Restrict the rule to `names`; `$name` entries are variables.
    pub fn show<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (variables, callables) = split_member_list(names);
        self.shown_variables = Some(variables);
        self.shown_mixins_and_functions = Some(callables);
        self
    }

    /// Exclude `names` from the rule; `$name` entries are variables.
    pub fn hide<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (variables, callables) = split_member_list(names);
        self.hidden_variables.extend(variables);
        self.hidden_mixins_and_functions.extend(callables);
        self
    }

    /// Whether forwarding through this rule exposes exactly the module's members
    pub fn is_transparent(&self) -> bool {
        self.prefix.is_none()
            && self.shown_variables.is_none()
            && self.shown_mixins_and_functions.is_none()
            && self.hidden_variables.is_empty()
            && self.hidden_mixins_and_functions.is_empty()
    }

    /// Map an exposed name back to the upstream module's name, or `None` if
    /// the rule filters it out.
    fn inner_name<'a>(&self, kind: MemberKind, name: &'a str) -> Option<&'a str> {
        let (shown, hidden) = match kind {
            MemberKind::Variable => (&self.shown_variables, &self.hidden_variables),
            _ => (&self.shown_mixins_and_functions, &self.hidden_mixins_and_functions),
        };
        match shown {
            Some(shown) if !shown.contains(name) => return None,
            None if hidden.contains(name) => return None,
            _ => {}
        }
        match &self.prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str()),
            None => Some(name),
        }
    }
}

fn split_member_list<I, S>(names: I) -> (BTreeSet<String>, BTreeSet<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut variables = BTreeSet::new();
    let mut callables = BTreeSet::new();
    for name in names {
        match name.as_ref().strip_prefix('$') {
            Some(variable) => variables.insert(variable.to_string()),
            None => callables.insert(name.as_ref().to_string()),
        };
    }
    (variables, callables)
}

/// A module as seen through a `@forward` rule's prefix and show/hide lists
pub struct ForwardedModuleView {
    inner: ModuleRef,
    rule: ForwardRule,
}

impl ForwardedModuleView {
    /// Wrap `inner` in a view only when `rule` actually changes what it exposes.
    pub fn if_necessary(inner: ModuleRef, rule: &ForwardRule) -> ModuleRef {
        if rule.is_transparent() {
            inner
        } else {
            Rc::new(ForwardedModuleView {
                inner,
                rule: rule.clone(),
            })
        }
    }

    pub fn inner(&self) -> &ModuleRef {
        &self.inner
    }
}

impl fmt::Debug for ForwardedModuleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardedModuleView")
            .field("inner", &self.inner)
            .field("prefix", &self.rule.prefix)
            .finish_non_exhaustive()
    }
}

impl Module for ForwardedModuleView {
    fn url(&self) -> Option<&str> {
        self.inner.url()
    }

    fn upstream(&self) -> Vec<ModuleRef> {
        self.inner.upstream()
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.rule
            .inner_name(MemberKind::Variable, name)
            .and_then(|name| self.inner.variable(name))
    }

    fn variable_site(&self, name: &str) -> Option<Span> {
        self.rule
            .inner_name(MemberKind::Variable, name)
            .and_then(|name| self.inner.variable_site(name))
    }

    fn function(&self, name: &str) -> Option<Callable> {
        self.rule
            .inner_name(MemberKind::Function, name)
            .and_then(|name| self.inner.function(name))
    }

    fn mixin(&self, name: &str) -> Option<Callable> {
        self.rule
            .inner_name(MemberKind::Mixin, name)
            .and_then(|name| self.inner.mixin(name))
    }

    fn member_names(&self, kind: MemberKind) -> BTreeSet<String> {
        let prefix = self.rule.prefix.as_deref().unwrap_or("");
        self.inner
            .member_names(kind)
            .into_iter()
            .map(|name| format!("{}{}", prefix, name))
            .filter(|name| self.rule.inner_name(kind, name).is_some())
            .collect()
    }

    fn has_member(&self, kind: MemberKind, name: &str) -> bool {
        self.rule
            .inner_name(kind, name)
            .map_or(false, |name| self.inner.has_member(kind, name))
    }

    fn set_variable(&self, name: &str, value: Value, site: Span) -> Result<()> {
        match self.rule.inner_name(MemberKind::Variable, name) {
            Some(inner_name) => self.inner.set_variable(inner_name, value, site),
            None => Err(CompilerError::undefined_module_variable(name)),
        }
    }

    fn variable_identity(&self, name: &str) -> VariableIdentity {
        let name = match &self.rule.prefix {
            Some(prefix) => name.strip_prefix(prefix.as_str()).unwrap_or(name),
            None => name,
        };
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
        Rc::new(ForwardedModuleView {
            inner: Rc::clone(&self.inner).clone_css(),
            rule: self.rule.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::ModuleId;
    use super::*;

    #[test]
    fn transparent_rule_returns_the_module_itself() {
        let module = module_with(&[("x", "1")], &[], &[]);
        let view = ForwardedModuleView::if_necessary(module.clone(), &ForwardRule::new("a", span(1)));
        assert_eq!(ModuleId::of(&module), ModuleId::of(&view));
    }

    #[test]
    fn prefix_renames_every_member() {
        let module = module_with(&[("color", "red")], &["tint"], &["theme"]);
        let rule = ForwardRule::new("a", span(1)).with_prefix("brand-");
        let view = ForwardedModuleView::if_necessary(module, &rule);

        assert_eq!(view.variable("brand-color"), Some(value("red")));
        assert_eq!(view.variable("color"), None);
        assert!(view.function("brand-tint").is_some());
        assert!(view.mixin("brand-theme").is_some());
        assert_eq!(
            view.member_names(MemberKind::Variable).into_iter().collect::<Vec<_>>(),
            vec!["brand-color".to_string()]
        );
    }

    #[test]
    fn show_and_hide_filter_prefixed_names() {
        let module = module_with(&[("a", "1"), ("b", "2")], &["f", "g"], &[]);

        let shown = ForwardedModuleView::if_necessary(
            module.clone(),
            &ForwardRule::new("m", span(1)).with_prefix("p-").show(["$p-a", "p-g"]),
        );
        assert!(shown.has_member(MemberKind::Variable, "p-a"));
        assert!(!shown.has_member(MemberKind::Variable, "p-b"));
        assert!(shown.has_member(MemberKind::Function, "p-g"));
        assert!(!shown.has_member(MemberKind::Function, "p-f"));

        let hidden = ForwardedModuleView::if_necessary(module, &ForwardRule::new("m", span(1)).hide(["$b", "f"]));
        assert_eq!(hidden.member_names(MemberKind::Variable).len(), 1);
        assert_eq!(hidden.member_names(MemberKind::Function).len(), 1);
    }

    #[test]
    fn writes_go_through_to_the_upstream_module() {
        let module = module_with(&[("color", "red")], &[], &[]);
        let view = ForwardedModuleView::if_necessary(module.clone(), &ForwardRule::new("a", span(1)).with_prefix("x-"));

        view.set_variable("x-color", value("blue"), span(2)).unwrap();
        assert_eq!(module.variable("color"), Some(value("blue")));

        let err = view.set_variable("color", value("green"), span(3)).unwrap_err();
        assert!(matches!(err, CompilerError::UndefinedModuleVariable { .. }));
    }

    #[test]
    fn prefixed_identity_matches_upstream_identity() {
        let module = module_with(&[("color", "red")], &[], &[]);
        let view = ForwardedModuleView::if_necessary(module.clone(), &ForwardRule::new("a", span(1)).with_prefix("x-"));
        assert_eq!(view.variable_identity("x-color"), module.variable_identity("color"));
    }
}
