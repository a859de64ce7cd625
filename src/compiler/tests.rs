use super::*;
use crate::OutputStyle;

fn compile_with(manifest: &str, options: &CompilerOptions) -> Result<(CompileOutput, CompilationStats)> {
    compile(&Manifest::from_toml(manifest).unwrap(), options)
}

fn compile_toml(manifest: &str) -> Result<(CompileOutput, CompilationStats)> {
    compile_with(manifest, &CompilerOptions::default())
}

fn css_of(manifest: &str) -> String {
    compile_toml(manifest).unwrap().0.css
}

fn error_of(manifest: &str) -> String {
    compile_toml(manifest).unwrap_err().to_string()
}

fn inspected(output: &CompileOutput, reference: &str) -> Option<String> {
    output
        .inspections
        .iter()
        .find(|inspection| inspection.reference == reference)
        .and_then(|inspection| inspection.value.clone())
}

#[test]
fn default_namespace_is_the_basename() {
    assert_eq!(default_namespace("lib/_theme.scss"), "theme");
    assert_eq!(default_namespace("colors"), "colors");
}

#[test]
fn used_module_css_comes_first() {
    let (output, stats) = compile_toml(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "lib/_theme" },
    { kind = "css", text = ".a { color: #{theme.$primary}; }" },
]

[[stylesheet]]
url = "lib/_theme"
body = [
    { kind = "variable", name = "primary", value = "red" },
    { kind = "css", text = ".theme { margin: 0; }" },
]
"#,
    )
    .unwrap();

    assert_eq!(output.entry, "main");
    assert_eq!(output.css, ".theme { margin: 0; }\n\n.a { color: red; }\n");
    let urls: Vec<_> = output.modules.iter().map(|module| module.url.clone().unwrap()).collect();
    assert_eq!(urls, vec!["lib/_theme", "main"]);
    assert_eq!(output.modules[0].variables, vec!["primary".to_string()]);
    assert_eq!(stats.module_count, 2);
    assert_eq!(stats.statement_count, 4);
    assert_eq!(stats.css_node_count, 2);
}

#[test]
fn compressed_style() {
    let options = CompilerOptions {
        style: OutputStyle::Compressed,
        ..CompilerOptions::default()
    };
    let (output, _) = compile_with(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "comment", text = "/* header */" },
    { kind = "css", text = ".a {\n  color: red;\n}" },
]
"#,
        &options,
    )
    .unwrap();
    assert_eq!(output.css, ".a{color:red}");
}

#[test]
fn configuration_overrides_defaults() {
    let css = css_of(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "theme", with = { primary = "blue" } },
    { kind = "css", text = ".a { color: #{theme.$primary}; }" },
]

[[stylesheet]]
url = "theme"
body = [{ kind = "variable", name = "primary", value = "red", default = true }]
"#,
    );
    assert_eq!(css, ".a { color: blue; }\n");
}

#[test]
fn configuring_a_variable_without_default_fails() {
    let error = error_of(
        r#"
[[stylesheet]]
url = "main"
body = [{ kind = "use", url = "theme", with = { missing = "1" } }]

[[stylesheet]]
url = "theme"
body = [{ kind = "variable", name = "primary", value = "red", default = true }]
"#,
    );
    assert!(error.contains("$missing was not declared with !default"), "{}", error);
}

#[test]
fn configuring_an_already_loaded_module_fails() {
    let error = error_of(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "other" },
    { kind = "use", url = "theme", with = { primary = "blue" } },
]

[[stylesheet]]
url = "other"
body = [{ kind = "use", url = "theme" }]

[[stylesheet]]
url = "theme"
body = [{ kind = "variable", name = "primary", value = "red", default = true }]
"#,
    );
    assert!(error.contains("already loaded"), "{}", error);
}

#[test]
fn forwarded_members_are_prefixed_and_filtered() {
    let (output, _) = compile_toml(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "lib", namespace = "*", with = { lib-primary = "green" } },
    { kind = "include", name = "lib-button" },
    { kind = "inspect", reference = "$lib-primary" },
    { kind = "inspect", reference = "$lib-secondary" },
]

[[stylesheet]]
url = "lib"
body = [{ kind = "forward", url = "theme", prefix = "lib-", show = ["$lib-primary", "lib-button"] }]

[[stylesheet]]
url = "theme"
body = [
    { kind = "variable", name = "primary", value = "red", default = true },
    { kind = "variable", name = "secondary", value = "blue" },
    { kind = "mixin", name = "button", body = [{ kind = "css", text = ".button { color: #{$primary}; }" }] },
]
"#,
    )
    .unwrap_or_else(|e| panic!("{}", e));

    assert_eq!(output.css, ".button { color: green; }\n");
    assert_eq!(inspected(&output, "$lib-primary"), Some("green".to_string()));
    assert_eq!(inspected(&output, "$lib-secondary"), None);
}

#[test]
fn unknown_namespace_in_inspection_fails() {
    let error = error_of(
        r#"
[[stylesheet]]
url = "main"
body = [{ kind = "inspect", reference = "nowhere.$x" }]
"#,
    );
    assert!(error.contains("no module with the namespace \"nowhere\""), "{}", error);
}

#[test]
fn duplicate_namespaces_are_rejected() {
    let result = compile_toml(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "a", namespace = "x" },
    { kind = "use", url = "b", namespace = "x" },
]

[[stylesheet]]
url = "a"

[[stylesheet]]
url = "b"
"#,
    );
    assert!(matches!(result, Err(CompilerError::DuplicateNamespace { ref namespace, .. }) if namespace == "x"));
}

#[test]
fn legacy_imports_share_scope_and_forwards() {
    let (output, _) = compile_toml(
        r##"
[[stylesheet]]
url = "main"
body = [
    { kind = "variable", name = "gap", value = "4px" },
    { kind = "import", url = "legacy" },
    { kind = "inspect", reference = "$from-legacy" },
    { kind = "inspect", reference = "$tone" },
    { kind = "css", text = ".m { gap: #{$gap}; }" },
]

[[stylesheet]]
url = "legacy"
body = [
    { kind = "forward", url = "tones" },
    { kind = "variable", name = "from-legacy", value = "#{$gap}" },
    { kind = "css", text = ".legacy {}" },
]

[[stylesheet]]
url = "tones"
body = [
    { kind = "variable", name = "tone", value = "warm" },
    { kind = "css", text = ".tones {}" },
]
"##,
    )
    .unwrap_or_else(|e| panic!("{}", e));

    assert_eq!(inspected(&output, "$from-legacy"), Some("4px".to_string()));
    assert_eq!(inspected(&output, "$tone"), Some("warm".to_string()));
    assert_eq!(output.css, ".tones {}\n\n.legacy {}\n\n.m { gap: 4px; }\n");
}

#[test]
fn mixins_run_with_content_blocks() {
    let css = css_of(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "variable", name = "size", value = "10px" },
    { kind = "mixin", name = "box", body = [
        { kind = "local", name = "size", value = "2px" },
        { kind = "css", text = ".box { size: #{$size}; }" },
        { kind = "content" },
    ] },
    { kind = "include", name = "box", content = [{ kind = "css", text = ".inside { size: #{$size}; }" }] },
]
"#,
    );
    assert_eq!(css, ".box { size: 2px; }\n\n.inside { size: 10px; }\n");
}

#[test]
fn content_outside_a_mixin_fails() {
    let error = error_of(
        r#"
[[stylesheet]]
url = "main"
body = [{ kind = "content" }]
"#,
    );
    assert!(error.contains("@content is only allowed within mixin declarations"), "{}", error);
}

#[test]
fn runaway_recursion_is_reported() {
    let error = error_of(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "mixin", name = "forever", body = [{ kind = "include", name = "forever" }] },
    { kind = "include", name = "forever" },
]
"#,
    );
    assert!(error.contains("Stack depth exceeded"), "{}", error);
}

#[test]
fn semi_global_blocks_update_root_variables() {
    let (output, _) = compile_toml(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "variable", name = "x", value = "1" },
    { kind = "block", semi_global = true, body = [{ kind = "variable", name = "x", value = "2" }] },
    { kind = "block", body = [
        { kind = "variable", name = "x", value = "3" },
        { kind = "variable", name = "y", value = "4", global = true },
    ] },
    { kind = "inspect", reference = "$x" },
    { kind = "inspect", reference = "$y" },
]
"#,
    )
    .unwrap();
    assert_eq!(inspected(&output, "$x"), Some("2".to_string()));
    assert_eq!(inspected(&output, "$y"), Some("4".to_string()));
}

#[test]
fn inspects_callables() {
    let (output, stats) = compile_toml(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "function", name = "double" },
    { kind = "mixin", name = "theme" },
    { kind = "inspect", reference = "double" },
    { kind = "inspect", reference = "theme" },
]
"#,
    )
    .unwrap();

    assert_eq!(output.inspections[0].kind, MemberKind::Function);
    assert_eq!(output.inspections[0].defined_at, Some(Span::new("main", 1, 1)));
    assert_eq!(output.inspections[1].kind, MemberKind::Mixin);
    assert_eq!(output.inspections[1].value, Some("theme".to_string()));
    assert_eq!(stats.function_count, 1);
    assert_eq!(stats.inspection_count, 2);
}

#[test]
fn module_loops_are_reported() {
    let error = error_of(
        r#"
[[stylesheet]]
url = "a"
body = [{ kind = "use", url = "b" }]

[[stylesheet]]
url = "b"
body = [{ kind = "use", url = "a" }]
"#,
    );
    assert!(error.contains("Module loop: a -> b -> a"), "{}", error);
}

#[test]
fn use_after_other_rules_fails() {
    let error = error_of(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "css", text = ".a {}" },
    { kind = "use", url = "b" },
]

[[stylesheet]]
url = "b"
"#,
    );
    assert!(error.contains("before any other rules"), "{}", error);
}

#[test]
fn extensions_reach_upstream_modules() {
    let css = css_of(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "base" },
    { kind = "extend", extender = ".serious", target = ".error" },
]

[[stylesheet]]
url = "base"
body = [{ kind = "css", text = ".error { color: red; }" }]
"#,
    );
    assert_eq!(css, ".error, .serious { color: red; }\n");
}

#[test]
fn command_line_variables_win_over_defaults() {
    let mut options = CompilerOptions::default();
    options.custom_variables.insert("primary".to_string(), "blue".to_string());
    let (output, _) = compile_with(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "variable", name = "primary", value = "red", default = true },
    { kind = "css", text = ".a { color: #{$primary}; }" },
]
"#,
        &options,
    )
    .unwrap();
    assert_eq!(output.css, ".a { color: blue; }\n");
}

#[test]
fn ambiguous_namespaceless_members_fail_on_reference() {
    let result = compile_toml(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "a", namespace = "*" },
    { kind = "use", url = "b", namespace = "*" },
    { kind = "inspect", reference = "$shared" },
]

[[stylesheet]]
url = "a"
body = [{ kind = "variable", name = "shared", value = "1" }]

[[stylesheet]]
url = "b"
body = [{ kind = "variable", name = "shared", value = "2" }]
"#,
    );
    match result {
        Err(CompilerError::AmbiguousGlobalMember { name, sites, .. }) => {
            assert_eq!(name, "shared");
            assert_eq!(sites, vec![Span::new("main", 1, 1), Span::new("main", 2, 1)]);
        }
        other => panic!("unexpected result: {:?}", other.map(|(output, _)| output.css)),
    }
}

#[test]
fn dropping_the_evaluator_frees_loaded_modules() {
    let manifest = Manifest::from_toml(
        r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "use", url = "lib" },
    { kind = "variable", name = "gap", value = "2px" },
    { kind = "mixin", name = "frame", body = [{ kind = "css", text = ".f { gap: #{lib.$gap}; }" }] },
    { kind = "include", name = "frame" },
]

[[stylesheet]]
url = "lib"
body = [
    { kind = "variable", name = "gap", value = "4px" },
    { kind = "function", name = "double" },
]
"#,
    )
    .unwrap();

    let mut evaluator = Evaluator::new(SourceSet::new(&manifest, Vec::new())).unwrap();
    let main = evaluator.evaluate_entry("main").unwrap();
    let (lib, _) = evaluator.load_module("lib", Configuration::empty()).unwrap();
    assert!(main.mixin("frame").is_some());
    assert!(lib.function("double").is_some());
    assert_eq!(main.css().borrow().children, vec![".f { gap: 4px; }".to_string()]);

    let lib = Rc::downgrade(&lib);
    drop(evaluator);
    assert!(main.mixin("frame").is_none());
    assert_eq!(main.variable("gap"), Some(Value::parse("2px")));

    drop(main);
    assert!(lib.upgrade().is_none());
}
