//! The evaluator: runs manifest stylesheets against the environment and
//! module engine and combines the result into CSS.

pub mod manifest;
pub mod output;
pub mod reference;

pub use manifest::{Manifest, SourceSet, StylesheetSource};
pub use output::{CompileOutput, Inspection, ModuleSummary};
pub use reference::{Patterns, Reference};

use crate::ast::Statement;
use crate::configuration::{Configuration, ConfiguredValue};
use crate::css::{CssStylesheet, ExtensionStore};
use crate::environment::frame::{self, WeakFrame};
use crate::environment::Environment;
use crate::error::{CompilerError, Result};
use crate::module::{ForwardRule, ModuleRef};
use crate::types::{Callable, MemberKind, Span, Value};
use crate::{CompilationStats, CompilerOptions};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

/// Maximum depth of nested blocks, includes, and content blocks
pub const MAX_NESTING_DEPTH: usize = 100;

/// URL reported for variables defined on the command line
const COMMAND_LINE: &str = "<command line>";

/// Per-stylesheet evaluation state
struct Stylesheet {
    url: String,
    css: CssStylesheet,
    extensions: ExtensionStore,
    pre_module_comments: Vec<String>,
    configuration: Configuration,
    ordinal: usize,
    /// Whether only `@use`, `@forward`, and comments have been seen so far
    in_prelude: bool,
    nesting: usize,
}

impl Stylesheet {
    fn new(url: &str, configuration: Configuration) -> Self {
        Self {
            url: url.to_string(),
            css: CssStylesheet::new(Some(url.to_string())),
            extensions: ExtensionStore::new(),
            pre_module_comments: Vec::new(),
            configuration,
            ordinal: 0,
            in_prelude: true,
            nesting: 0,
        }
    }

    /// Statements are identified by their position in the stylesheet.
    fn next_site(&mut self) -> Span {
        self.ordinal += 1;
        Span::new(self.url.clone(), self.ordinal, 1)
    }
}

#[derive(Debug, Default)]
struct Counters {
    statements: usize,
    variables: usize,
    functions: usize,
    mixins: usize,
    imports: usize,
    includes: usize,
}

/// Evaluates stylesheets into modules.
///
/// Dropping the evaluator releases the functions and mixins of every module
/// it loaded. Variables and CSS of modules still held elsewhere stay intact.
pub struct Evaluator {
    sources: SourceSet,
    patterns: Patterns,
    /// Loaded modules by URL
    modules: HashMap<String, ModuleRef>,
    /// URLs currently being loaded, outermost first
    loading: Vec<String>,
    /// First namespace each URL was used under
    namespaces: HashMap<String, String>,
    /// Variables declared at the root of the entry stylesheet before it runs
    predefined: Vec<(String, String)>,
    inspections: Vec<Inspection>,
    counters: Counters,
    depth: usize,
    /// Root frame of every evaluated stylesheet
    roots: Vec<WeakFrame>,
}

impl Evaluator {
    pub fn new(sources: SourceSet) -> Result<Self> {
        Ok(Self {
            sources,
            patterns: Patterns::new()?,
            modules: HashMap::new(),
            loading: Vec::new(),
            namespaces: HashMap::new(),
            predefined: Vec::new(),
            inspections: Vec::new(),
            counters: Counters::default(),
            depth: 0,
            roots: Vec::new(),
        })
    }

    /// Declare `variables` at the root of the entry stylesheet before it runs.
    pub fn with_variables(mut self, variables: impl IntoIterator<Item = (String, String)>) -> Self {
        self.predefined.extend(variables);
        self.predefined.sort();
        self
    }

    /// Evaluate the stylesheet at `url` as the entry point.
    pub fn evaluate_entry(&mut self, url: &str) -> Result<ModuleRef> {
        let (module, _) = self.load_module(url, Configuration::empty())?;
        Ok(module)
    }

    pub fn inspections(&self) -> &[Inspection] {
        &self.inspections
    }

    /// Number of distinct modules loaded so far
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Load the module at `url`, evaluating it unless it was loaded already.
    ///
    /// Returns the module and what's left of `configuration`: the values its
    /// `!default` declarations didn't consume.
    pub fn load_module(&mut self, url: &str, configuration: Configuration) -> Result<(ModuleRef, Configuration)> {
        if let Some(module) = self.modules.get(url) {
            if !configuration.is_empty() && !configuration.is_implicit() {
                return Err(CompilerError::manifest(format!(
                    "{} was already loaded, so it can't be configured using \"with\".",
                    url
                )));
            }
            return Ok((Rc::clone(module), configuration));
        }

        self.enter_load(url)?;
        let result = self.evaluate_module(url, configuration);
        self.loading.pop();
        let (module, configuration) = result?;

        log::debug!("Loaded module {}", url);
        self.modules.insert(url.to_string(), Rc::clone(&module));
        Ok((module, configuration))
    }

    fn enter_load(&mut self, url: &str) -> Result<()> {
        if self.loading.iter().any(|loading| loading == url) {
            let mut chain = self.loading.clone();
            chain.push(url.to_string());
            return Err(CompilerError::manifest(format!("Module loop: {}", chain.join(" -> "))));
        }
        self.loading.push(url.to_string());
        Ok(())
    }

    fn evaluate_module(&mut self, url: &str, configuration: Configuration) -> Result<(ModuleRef, Configuration)> {
        let source = self.sources.resolve(url)?;
        let mut environment = Environment::new();
        let mut sheet = Stylesheet::new(url, configuration);

        // Only the entry stylesheet sees command-line variables.
        if self.loading.len() == 1 {
            for (i, (name, literal)) in self.predefined.iter().enumerate() {
                let site = Span::new(COMMAND_LINE, i + 1, 1);
                environment.set_variable(name, Value::parse(literal), site, None, true)?;
            }
        }

        self.roots.push(environment.root_frame());
        self.evaluate_body(&mut environment, &mut sheet, &source.body)?;

        let module = environment.to_module(sheet.css, sheet.pre_module_comments, sheet.extensions);
        Ok((module, sheet.configuration))
    }

    fn evaluate_body(&mut self, env: &mut Environment, sheet: &mut Stylesheet, body: &[Statement]) -> Result<()> {
        for statement in body {
            self.evaluate(env, sheet, statement)?;
        }
        Ok(())
    }

    fn evaluate(&mut self, env: &mut Environment, sheet: &mut Stylesheet, statement: &Statement) -> Result<()> {
        self.counters.statements += 1;
        let site = sheet.next_site();
        if !statement.is_prelude() {
            sheet.in_prelude = false;
        }

        match statement {
            Statement::Variable {
                name,
                value,
                namespace,
                global,
                default,
            } => self.declare_variable(env, sheet, site, name, value, namespace.as_deref(), *global, *default),

            Statement::Local { name, value } => {
                let value = self.evaluate_value(env, value, &site)?;
                env.set_local_variable(name, value, site);
                self.counters.variables += 1;
                Ok(())
            }

            Statement::Function { name, body } => {
                env.set_function(Callable::new(name.as_str(), site, body.clone(), env.closure()));
                self.counters.functions += 1;
                Ok(())
            }

            Statement::Mixin { name, body } => {
                env.set_mixin(Callable::new(name.as_str(), site, body.clone(), env.closure()));
                self.counters.mixins += 1;
                Ok(())
            }

            Statement::Use { url, namespace, with } => {
                self.assert_module_rule(sheet, &site, "@use")?;
                self.use_module(env, site, url, namespace.as_deref(), with)
            }

            Statement::Forward {
                url,
                prefix,
                show,
                hide,
            } => {
                self.assert_module_rule(sheet, &site, "@forward")?;
                let mut rule = ForwardRule::new(url.as_str(), site);
                if let Some(prefix) = prefix {
                    rule = rule.with_prefix(prefix.as_str());
                }
                if let Some(show) = show {
                    rule = rule.show(show);
                }
                if !hide.is_empty() {
                    rule = rule.hide(hide);
                }

                let forwarded = sheet.configuration.through_forward(&rule);
                let (module, unused) = self.load_module(url, forwarded)?;
                sheet.configuration.consume_through(&rule, &unused);
                env.forward_module(module, &rule)
            }

            Statement::Import { url } => self.import(env, sheet, url),

            Statement::Block { body, semi_global } => {
                self.enter_nesting(&site)?;
                sheet.nesting += 1;
                let state = env.enter_scope(true, *semi_global);
                let result = self.evaluate_body(env, sheet, body);
                env.exit_scope(state);
                sheet.nesting -= 1;
                self.depth -= 1;
                result
            }

            Statement::Css { text } => {
                let text = self.interpolate(env, text, &site)?;
                sheet.css.push(text);
                Ok(())
            }

            Statement::Extend { extender, target } => {
                sheet.extensions.add_extension(extender.as_str(), target.as_str());
                Ok(())
            }

            Statement::Inspect { reference } => {
                let inspection = self.inspect(env, reference, site)?;
                self.inspections.push(inspection);
                Ok(())
            }

            Statement::Include {
                name,
                namespace,
                content,
            } => self.include(env, sheet, site, name, namespace.as_deref(), content.as_deref()),

            Statement::Content => {
                if !env.in_mixin() {
                    return Err(CompilerError::manifest(format!(
                        "{}: @content is only allowed within mixin declarations.",
                        site
                    )));
                }
                let Some(content) = env.content().cloned() else {
                    return Ok(());
                };

                self.enter_nesting(&site)?;
                sheet.nesting += 1;
                let mut content_env = content.environment().closure();
                let result = content_env.scope(false, |e| self.evaluate_body(e, sheet, content.body()));
                sheet.nesting -= 1;
                self.depth -= 1;
                result
            }

            Statement::Comment { text } => {
                if sheet.in_prelude && sheet.nesting == 0 {
                    sheet.pre_module_comments.push(text.clone());
                } else {
                    sheet.css.push(text.as_str());
                }
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn declare_variable(
        &mut self,
        env: &mut Environment,
        sheet: &mut Stylesheet,
        site: Span,
        name: &str,
        value: &str,
        namespace: Option<&str>,
        global: bool,
        default: bool,
    ) -> Result<()> {
        if default {
            if namespace.is_none() && env.at_root() {
                if let Some(configured) = sheet.configuration.remove(name) {
                    if !configured.value.is_null() {
                        log::trace!("Configured ${} from {}", name, configured.site);
                        return env.set_variable(name, configured.value, configured.site, None, global);
                    }
                }
            }

            let existing = env.get_variable(name, namespace)?;
            if existing.is_some_and(|value| !value.is_null()) {
                return Ok(());
            }
        }

        let value = self.evaluate_value(env, value, &site)?;
        env.set_variable(name, value, site, namespace, global)?;
        self.counters.variables += 1;
        Ok(())
    }

    /// `@use` and `@forward` must come first, at the top level.
    fn assert_module_rule(&self, sheet: &Stylesheet, site: &Span, rule: &str) -> Result<()> {
        if sheet.nesting > 0 {
            return Err(CompilerError::manifest(format!(
                "{}: {} rules must be written at the root of a stylesheet.",
                site, rule
            )));
        }
        if !sheet.in_prelude {
            return Err(CompilerError::manifest(format!(
                "{}: {} rules must be written before any other rules.",
                site, rule
            )));
        }
        Ok(())
    }

    fn use_module(
        &mut self,
        env: &mut Environment,
        site: Span,
        url: &str,
        namespace: Option<&str>,
        with: &BTreeMap<String, String>,
    ) -> Result<()> {
        let configuration = if with.is_empty() {
            Configuration::empty()
        } else {
            let mut values = HashMap::new();
            for (name, literal) in with {
                let value = self.evaluate_value(env, literal, &site)?;
                values.insert(
                    name.clone(),
                    ConfiguredValue {
                        value,
                        site: site.clone(),
                    },
                );
            }
            Configuration::explicit(values)
        };

        let (module, unused) = self.load_module(url, configuration)?;
        if !unused.is_implicit() {
            if let Some(name) = unused.unused_names().first() {
                return Err(CompilerError::manifest(format!(
                    "{}: ${} was not declared with !default in the @used module.",
                    site, name
                )));
            }
        }

        let namespace = match namespace {
            Some("*") => None,
            Some(namespace) => Some(namespace.to_string()),
            None => Some(default_namespace(url)),
        };
        if let Some(namespace) = &namespace {
            let first = self
                .namespaces
                .entry(url.to_string())
                .or_insert_with(|| namespace.clone());
            if first != namespace {
                log::warn!("{} is used as both {} and {}", url, first, namespace);
            }
        }
        env.add_module(module, site, namespace.as_deref())
    }

    /// Evaluate a legacy import: the imported stylesheet runs in this
    /// stylesheet's scopes and its CSS lands here.
    fn import(&mut self, env: &mut Environment, sheet: &mut Stylesheet, url: &str) -> Result<()> {
        self.counters.imports += 1;
        let source = self.sources.resolve(url)?;

        self.enter_load(url)?;
        let mut nested = env.for_import();
        let mut imported = Stylesheet::new(url, env.to_implicit_configuration());
        let result = self.evaluate_body(&mut nested, &mut imported, &source.body);
        self.loading.pop();
        result?;

        // CSS of modules the imported stylesheet used goes first.
        let mut seen = HashSet::new();
        for upstream in nested.all_modules() {
            for module in output::combine_css(&upstream) {
                if !seen.insert(output::module_key(&module)) {
                    continue;
                }
                sheet.css.children.extend(module.pre_module_comments());
                sheet.css.children.extend(module.css().borrow().children.iter().cloned());
            }
        }
        sheet.css.children.extend(imported.pre_module_comments);
        sheet.css.children.extend(imported.css.children);
        sheet.extensions.merge(&imported.extensions);

        env.clear_caches();
        env.import_forwards(&nested.to_dummy_module());
        log::debug!("Imported {} into {}", url, sheet.url);
        Ok(())
    }

    fn include(
        &mut self,
        env: &mut Environment,
        sheet: &mut Stylesheet,
        site: Span,
        name: &str,
        namespace: Option<&str>,
        content: Option<&[Statement]>,
    ) -> Result<()> {
        self.counters.includes += 1;
        let mixin = env
            .get_mixin(name, namespace)?
            .ok_or_else(|| CompilerError::manifest(format!("{}: Undefined mixin {}.", site, name)))?;
        let content = content.map(|body| Callable::new("@content", site.clone(), body.to_vec(), env.closure()));

        self.enter_nesting(&site)?;
        sheet.nesting += 1;
        let mut mixin_env = mixin.environment().closure();
        let result = mixin_env.with_content(content, |e| {
            e.as_mixin(|e| e.scope(false, |e| self.evaluate_body(e, sheet, mixin.body())))
        });
        sheet.nesting -= 1;
        self.depth -= 1;
        result
    }

    fn inspect(&mut self, env: &mut Environment, text: &str, site: Span) -> Result<Inspection> {
        let reference = self
            .patterns
            .reference(text)
            .ok_or_else(|| CompilerError::manifest(format!("{}: Invalid reference \"{}\"", site, text)))?;
        let namespace = reference.namespace();
        let name = reference.name();

        let (kind, value, defined_at) = match &reference {
            Reference::Variable { .. } => (
                MemberKind::Variable,
                env.get_variable(name, namespace)?.map(|value| value.to_string()),
                env.get_variable_site(name, namespace)?,
            ),
            Reference::Callable { .. } => {
                let (kind, callable) = match env.get_function(name, namespace)? {
                    Some(function) => (MemberKind::Function, Some(function)),
                    None => (MemberKind::Mixin, env.get_mixin(name, namespace)?),
                };
                match callable {
                    Some(callable) => (kind, Some(callable.name().to_string()), Some(callable.site().clone())),
                    None => (MemberKind::Function, None, None),
                }
            }
        };

        Ok(Inspection {
            reference: text.to_string(),
            site,
            kind,
            value,
            defined_at,
        })
    }

    fn enter_nesting(&mut self, site: &Span) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(CompilerError::manifest(format!("{}: Stack depth exceeded.", site)));
        }
        self.depth += 1;
        Ok(())
    }

    /// Evaluate a value expression: variable references are resolved,
    /// anything else is parsed as a literal.
    fn evaluate_value(&mut self, env: &mut Environment, text: &str, site: &Span) -> Result<Value> {
        let text = self.interpolate(env, text, site)?;
        let trimmed = text.trim();
        if trimmed.starts_with('"') || trimmed.starts_with('\'') {
            return Ok(Value::parse(trimmed));
        }

        let mut items = Vec::new();
        for word in trimmed.split_whitespace() {
            let item = match self.patterns.reference(word) {
                Some(Reference::Variable { namespace, name }) => env
                    .get_variable(&name, namespace.as_deref())?
                    .ok_or_else(|| CompilerError::manifest(format!("{}: Undefined variable ${}.", site, name)))?,
                _ => Value::parse(word),
            };
            items.push(item);
        }
        Ok(match items.len() {
            0 => Value::Null,
            1 => items.remove(0),
            _ => Value::List(items),
        })
    }

    fn interpolate(&self, env: &mut Environment, text: &str, site: &Span) -> Result<String> {
        self.patterns.interpolate(text, |reference| {
            let value = env
                .get_variable(reference.name(), reference.namespace())?
                .ok_or_else(|| {
                    CompilerError::manifest(format!("{}: Undefined variable ${}.", site, reference.name()))
                })?;
            Ok(match value {
                Value::String { text, .. } => text,
                other => other.to_string(),
            })
        })
    }

    fn stats(&self) -> CompilationStats {
        CompilationStats {
            module_count: self.modules.len(),
            statement_count: self.counters.statements,
            variable_count: self.counters.variables,
            function_count: self.counters.functions,
            mixin_count: self.counters.mixins,
            import_count: self.counters.imports,
            include_count: self.counters.includes,
            inspection_count: self.inspections.len(),
            files_loaded: self.sources.files_loaded(),
            ..CompilationStats::default()
        }
    }
}

impl Drop for Evaluator {
    fn drop(&mut self) {
        let released: usize = self
            .roots
            .drain(..)
            .filter_map(|root| root.upgrade())
            .map(|root| frame::release_callables(&root))
            .sum();
        log::trace!("Released {} callable(s) from {} module(s)", released, self.modules.len());
    }
}

/// The namespace `@use "url"` gets without `as`: the URL's basename, minus
/// any extension and leading underscore.
pub fn default_namespace(url: &str) -> String {
    let basename = url.rsplit('/').next().unwrap_or(url);
    let basename = basename.strip_prefix('_').unwrap_or(basename);
    basename.split('.').next().unwrap_or(basename).to_string()
}

/// Compile `manifest` starting from its entry stylesheet.
pub fn compile(manifest: &Manifest, options: &CompilerOptions) -> Result<(CompileOutput, CompilationStats)> {
    let start_time = Instant::now();

    // STAGE 1: SOURCES
    // Index the manifest's stylesheets; anything else comes from the load paths.
    let entry = manifest.entry_url(options.entry.as_deref())?;
    let sources = SourceSet::new(manifest, options.load_paths.clone());

    // STAGE 2: EVALUATION
    // Run the entry stylesheet, loading every module it depends on.
    let mut evaluator = Evaluator::new(sources)?.with_variables(
        options
            .custom_variables
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );
    let root = evaluator.evaluate_entry(&entry)?;

    if options.debug_mode {
        log::debug!("Evaluated {} module(s) from {}", evaluator.module_count(), entry);
    }

    // STAGE 3: OUTPUT
    // Combine every module's CSS, applying extensions, and serialize it.
    let modules = output::combine_css(&root);
    let css = output::serialize(&modules, options.style);

    let mut stats = evaluator.stats();
    stats.stylesheet_count = manifest.stylesheets.len();
    stats.css_node_count = modules.iter().map(|module| module.css().borrow().children.len()).sum();
    stats.extension_count = modules
        .iter()
        .map(|module| module.extension_store().borrow().extensions().len())
        .sum();
    stats.output_size = css.len() as u64;
    stats.compile_time_ms = start_time.elapsed().as_millis() as u64;

    let output = CompileOutput {
        entry,
        css,
        modules: modules.iter().map(ModuleSummary::of).collect(),
        inspections: evaluator.inspections().to_vec(),
    };
    Ok((output, stats))
}

#[cfg(test)]
mod tests;
