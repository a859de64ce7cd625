//! Module registration, forwarding, and legacy import merging

use super::Environment;
use crate::error::{CompilerError, Result};
use crate::module::{
    contains_module, insert_module, ForwardRule, ForwardedModuleView, MemberNames, ModuleRef, Shadowing,
    ShadowedModuleView,
};
use crate::types::{MemberKind, Span};
use std::collections::HashMap;
use std::rc::Rc;

/// The modules an environment has loaded
#[derive(Debug, Default)]
pub(crate) struct ModuleTable {
    pub modules: HashMap<String, ModuleRef>,
    pub namespace_sites: HashMap<String, Span>,
    pub global_modules: Vec<(ModuleRef, Span)>,
    /// `None` until the first `@forward`
    pub forwarded_modules: Option<Vec<(ModuleRef, Span)>>,
    /// Every module this environment touched, in encounter order. Only used
    /// to collect CSS and extensions.
    pub all_modules: Vec<ModuleRef>,
}

impl Environment {
    /// Make `module` available, under `namespace` or (without one) as a
    /// global module whose members are visible unqualified.
    pub fn add_module(&mut self, module: ModuleRef, site: Span, namespace: Option<&str>) -> Result<()> {
        match namespace {
            None => {
                {
                    let root = self.frames[0].borrow();
                    let mut collisions: Vec<&String> = root
                        .variables
                        .keys()
                        .filter(|name| module.has_member(MemberKind::Variable, name))
                        .collect();
                    collisions.sort();
                    if let Some(name) = collisions.first() {
                        let original = root.variable_sites.get(*name).cloned().unwrap_or_else(|| site.clone());
                        return Err(CompilerError::GlobalVariableCollision {
                            name: name.to_string(),
                            site,
                            original,
                        });
                    }
                }

                log::debug!("Using module {:?} without a namespace", module.url());
                let mut registry = self.registry.borrow_mut();
                registry.global_modules.push((Rc::clone(&module), site));
                registry.all_modules.push(module);
            }
            Some(namespace) => {
                let mut registry = self.registry.borrow_mut();
                if let Some(original) = registry.namespace_sites.get(namespace) {
                    return Err(CompilerError::DuplicateNamespace {
                        namespace: namespace.to_string(),
                        site,
                        original: original.clone(),
                    });
                }

                log::debug!("Using module {:?} as {}", module.url(), namespace);
                registry.modules.insert(namespace.to_string(), Rc::clone(&module));
                registry.namespace_sites.insert(namespace.to_string(), site);
                registry.all_modules.push(module);
            }
        }
        Ok(())
    }

    /// Re-export `module`'s members (filtered through `rule`) from the module
    /// this environment will become.
    pub fn forward_module(&mut self, module: ModuleRef, rule: &ForwardRule) -> Result<()> {
        let view = ForwardedModuleView::if_necessary(Rc::clone(&module), rule);

        if let Some(forwarded) = &self.registry.borrow().forwarded_modules {
            for (other, original) in forwarded {
                for kind in MemberKind::ALL {
                    assert_no_conflicts(&view, other, kind, &rule.site, original)?;
                }
            }
        }

        log::debug!("Forwarding module {:?} from {}", module.url(), rule.site);
        let mut registry = self.registry.borrow_mut();
        registry.all_modules.push(module);
        let forwarded = registry.forwarded_modules.get_or_insert_with(Vec::new);
        insert_module(forwarded, view, rule.site.clone());
        Ok(())
    }

    /// Splice the modules forwarded by a legacy-imported stylesheet into
    /// this environment.
    ///
    /// At the root they become imported and forwarded modules here, hiding
    /// same-named members of modules that were already visible. Below the
    /// root they're only visible in the current scope. Either way they take
    /// precedence over local declarations of the same names, which are removed.
    pub fn import_forwards(&mut self, module: &ModuleRef) {
        let Some(mut forwarded) = module.forwarded_modules() else {
            return;
        };

        {
            let registry = self.registry.borrow();
            if let Some(own) = &registry.forwarded_modules {
                forwarded.retain(|(module, _)| {
                    !contains_module(own, module) || !contains_module(&registry.global_modules, module)
                });
            }
        }

        let mut names = MemberNames::default();
        for (module, _) in &forwarded {
            names.extend(MemberNames::of(module.as_ref()));
        }

        if self.at_root() {
            {
                let mut imported = self.imported_modules.borrow_mut();
                let shadowed = shadow_all(std::mem::take(&mut *imported), &names);
                *imported = shadowed;
                for (module, site) in &forwarded {
                    insert_module(&mut imported, Rc::clone(module), site.clone());
                }
            }

            let mut registry = self.registry.borrow_mut();
            let own = registry.forwarded_modules.take().unwrap_or_default();
            let mut own = shadow_all(own, &names);
            for (module, site) in &forwarded {
                insert_module(&mut own, Rc::clone(module), site.clone());
            }
            registry.forwarded_modules = Some(own);
        } else {
            self.nested_forwards = true;
            let mut frame = self.frames[self.frames.len() - 1].borrow_mut();
            frame.forwarded.extend(forwarded.iter().map(|(module, _)| Rc::clone(module)));
        }

        log::debug!(
            "Imported {} forwarded module(s) at depth {}",
            forwarded.len(),
            self.frames.len() - 1
        );

        let mut frame = self.frames[self.frames.len() - 1].borrow_mut();
        for kind in MemberKind::ALL {
            for name in names.get(kind) {
                frame.remove(kind, name);
                match kind {
                    MemberKind::Variable => self.variable_indices.remove(name),
                    MemberKind::Function => self.function_indices.remove(name),
                    MemberKind::Mixin => self.mixin_indices.remove(name),
                };
            }
        }
        if !names.variables.is_empty() {
            self.last_variable = None;
        }
    }

    /// Modules used under a namespace, by namespace
    pub fn modules(&self) -> HashMap<String, ModuleRef> {
        self.registry.borrow().modules.clone()
    }

    /// Modules used without a namespace, in registration order
    pub fn global_modules(&self) -> Vec<ModuleRef> {
        self.registry
            .borrow()
            .global_modules
            .iter()
            .map(|(module, _)| Rc::clone(module))
            .collect()
    }

    /// Modules visible through legacy imports, in priority order
    pub fn imported_modules(&self) -> Vec<ModuleRef> {
        self.imported_modules
            .borrow()
            .iter()
            .map(|(module, _)| Rc::clone(module))
            .collect()
    }

    /// The forward ledger, or `None` if nothing was forwarded yet
    pub fn forwarded_modules(&self) -> Option<Vec<(ModuleRef, Span)>> {
        self.registry.borrow().forwarded_modules.clone()
    }

    /// Every module this environment has touched
    pub fn all_modules(&self) -> Vec<ModuleRef> {
        self.registry.borrow().all_modules.clone()
    }
}

/// Fail if `new` and `old` expose the same name with different declarations.
fn assert_no_conflicts(
    new: &ModuleRef,
    old: &ModuleRef,
    kind: MemberKind,
    site: &Span,
    original: &Span,
) -> Result<()> {
    let new_names = new.member_names(kind);
    let old_names = old.member_names(kind);
    for name in new_names.intersection(&old_names) {
        let same = match kind {
            MemberKind::Variable => new.variable_identity(name) == old.variable_identity(name),
            _ => new.callable(kind, name) == old.callable(kind, name),
        };
        if !same {
            return Err(CompilerError::ForwardingConflict {
                kind,
                name: name.clone(),
                site: site.clone(),
                original: original.clone(),
            });
        }
    }
    Ok(())
}

/// Hide `names` from every module in `modules`, dropping modules that end
/// up exposing nothing.
fn shadow_all(modules: Vec<(ModuleRef, Span)>, names: &MemberNames) -> Vec<(ModuleRef, Span)> {
    modules
        .into_iter()
        .filter_map(|(module, site)| match ShadowedModuleView::if_necessary(&module, names) {
            Shadowing::Unaffected => Some((module, site)),
            Shadowing::Hidden => None,
            Shadowing::View(view) => Some((view, site)),
        })
        .collect()
}
