//! Variable values that configure a module as it is loaded

use crate::module::ForwardRule;
use crate::types::{Span, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredValue {
    pub value: Value,
    /// Where the configuring value was declared
    pub site: Span,
}

/// A set of `!default` overrides.
///
/// Explicit configurations come from `@use ... with (...)`; implicit ones
/// are inherited from the variables visible at a legacy `@import`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    values: HashMap<String, ConfiguredValue>,
    implicit: bool,
}

impl Configuration {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn explicit(values: HashMap<String, ConfiguredValue>) -> Self {
        Self {
            values,
            implicit: false,
        }
    }

    pub fn implicit(values: HashMap<String, ConfiguredValue>) -> Self {
        Self {
            values,
            implicit: true,
        }
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn get(&self, name: &str) -> Option<&ConfiguredValue> {
        self.values.get(name)
    }

    /// Take the value for `name`, marking it as used
    pub fn remove(&mut self, name: &str) -> Option<ConfiguredValue> {
        self.values.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// The configuration a module forwarded through `rule` sees: only names
    /// the rule exposes, with the rule's prefix removed.
    pub fn through_forward(&self, rule: &ForwardRule) -> Configuration {
        let values = self
            .values
            .iter()
            .filter_map(|(name, value)| Some((forwarded_name(rule, name)?, value.clone())))
            .collect();
        Configuration {
            values,
            implicit: self.implicit,
        }
    }

    /// Mark every value that `forwarded`, derived from this configuration
    /// through `rule`, has consumed as used here too.
    pub fn consume_through(&mut self, rule: &ForwardRule, forwarded: &Configuration) {
        self.values.retain(|name, _| match forwarded_name(rule, name) {
            Some(inner) => forwarded.values.contains_key(&inner),
            None => true,
        });
    }

    /// Names of values that were never consumed, sorted
    pub fn unused_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }
}

/// The upstream name `name` configures through `rule`, if the rule exposes it
fn forwarded_name(rule: &ForwardRule, name: &str) -> Option<String> {
    if let Some(shown) = &rule.shown_variables {
        if !shown.contains(name) {
            return None;
        }
    }
    if rule.hidden_variables.contains(name) {
        return None;
    }
    match &rule.prefix {
        Some(prefix) => name.strip_prefix(prefix.as_str()).map(str::to_string),
        None => Some(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_consumes_values() {
        let mut values = HashMap::new();
        values.insert(
            "primary".to_string(),
            ConfiguredValue {
                value: Value::parse("red"),
                site: Span::new("main.scss", 1, 1),
            },
        );
        let mut configuration = Configuration::explicit(values);
        assert!(!configuration.is_implicit());
        assert_eq!(configuration.len(), 1);

        let taken = configuration.remove("primary").unwrap();
        assert_eq!(taken.value, Value::parse("red"));
        assert!(configuration.is_empty());
        assert!(configuration.unused_names().is_empty());
    }

    #[test]
    fn forwarding_strips_prefixes_and_tracks_usage() {
        let site = Span::new("main.scss", 1, 1);
        let mut values = HashMap::new();
        for name in ["lib-a", "lib-b", "other"] {
            values.insert(
                name.to_string(),
                ConfiguredValue {
                    value: Value::parse("1"),
                    site: site.clone(),
                },
            );
        }
        let mut configuration = Configuration::explicit(values);
        let rule = ForwardRule::new("lib", site).with_prefix("lib-").hide(["$lib-b"]);

        let mut forwarded = configuration.through_forward(&rule);
        assert_eq!(forwarded.len(), 1);
        assert!(forwarded.remove("a").is_some());

        configuration.consume_through(&rule, &forwarded);
        assert_eq!(configuration.unused_names(), vec!["lib-b".to_string(), "other".to_string()]);
    }
}
