// FILE: src/cli/handlers.rs
use super::{config::DEFAULT_CONFIG_FILES, required, string, ReportFormat, StylecCli};
use crate::{
    compile_manifest_file_with_options, CompilationStats, CompileOutput, CompilerError, CompilerOptions, Result,
};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Instant;

// --- COMPILE ---
pub fn handle_compile_command(cli: &StylecCli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = required(matches, "input")?;
    let output_path = string(matches, "output").or_else(|| {
        cli.output_directory().map(|dir| {
            Path::new(dir)
                .join(Path::new(&input_path).with_extension("css").file_name().unwrap_or_default())
                .to_string_lossy()
                .into_owned()
        })
    });

    let options = cli.build_compiler_options(matches)?;

    if matches.get_flag("watch") {
        watch_and_compile(&input_path, output_path.as_deref(), options)
    } else {
        compile_single_file(&input_path, output_path.as_deref(), options, matches.get_flag("stats"))
    }
}

fn compile_single_file(
    input_path: &str,
    output_path: Option<&str>,
    options: CompilerOptions,
    show_stats: bool,
) -> Result<()> {
    let compile_start = Instant::now();
    let stats = compile_to(input_path, output_path, options)?;
    let compile_time = compile_start.elapsed();

    // Keep stdout clean when the CSS itself goes there.
    if let Some(output_path) = output_path {
        println!("🔨 Compiled {} -> {}", input_path, output_path);
        println!("✅ Compilation successful!");
        println!("   Output: {} bytes", stats.output_size);
        println!("   Time: {:.2}ms", compile_time.as_millis());
    }

    if show_stats {
        eprint!("{}", detailed_stats(&stats));
    }

    Ok(())
}

fn compile_to(input_path: &str, output_path: Option<&str>, options: CompilerOptions) -> Result<CompilationStats> {
    let (output, stats) = compile_manifest_file_with_options(input_path, options)?;
    match output_path {
        Some(output_path) => {
            if let Some(parent) = Path::new(output_path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(output_path, &output.css)?;
        }
        None => print!("{}", output.css),
    }
    Ok(stats)
}

/// The manifest and every load path it can read stylesheets from
fn watched_paths(input_path: &str, options: &CompilerOptions) -> Vec<(PathBuf, RecursiveMode)> {
    let mut paths = vec![(PathBuf::from(input_path), RecursiveMode::NonRecursive)];
    for dir in &options.load_paths {
        if dir.is_dir() {
            paths.push((dir.clone(), RecursiveMode::Recursive));
        }
    }
    if let Some(dir) = Path::new(input_path).parent() {
        if !dir.as_os_str().is_empty() && !options.load_paths.iter().any(|path| path == dir) {
            paths.push((dir.to_path_buf(), RecursiveMode::NonRecursive));
        }
    }
    paths
}

fn watch_and_compile(input_path: &str, output_path: Option<&str>, options: CompilerOptions) -> Result<()> {
    println!("👀 Watching {} for changes...", input_path);

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if let Err(e) = tx.send(event) {
                    eprintln!("Watch error: {}", e);
                }
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| {
        CompilerError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to create file watcher: {}", e),
        ))
    })?;

    for (path, mode) in watched_paths(input_path, &options) {
        log::debug!("Watching {}", path.display());
        watcher.watch(&path, mode).map_err(|e| {
            CompilerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to watch {}: {}", path.display(), e),
            ))
        })?;
    }

    if let Err(e) = compile_to(input_path, output_path, options.clone()) {
        eprintln!("❌ Initial compilation failed: {}", e);
    } else {
        println!("✅ Initial compilation successful");
    }

    loop {
        match rx.recv() {
            Ok(event) => {
                // Our own output may live next to the manifest.
                if output_path.is_some_and(|out| event.paths.iter().all(|path| path.ends_with(out))) {
                    continue;
                }
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    continue;
                }
                println!("🔄 File changed, recompiling...");
                match compile_to(input_path, output_path, options.clone()) {
                    Ok(stats) => {
                        println!(
                            "✅ Recompiled successfully ({} bytes, {}ms)",
                            stats.output_size, stats.compile_time_ms
                        );
                    }
                    Err(e) => eprintln!("❌ Compilation failed: {}", e),
                }
            }
            Err(e) => {
                eprintln!("Watch error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

// --- CHECK ---
pub fn handle_check_command(cli: &StylecCli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = required(matches, "input")?;
    let options = cli.build_compiler_options(matches)?;

    if Path::new(&input_path).is_dir() {
        check_directory(&input_path, matches.get_flag("recursive"), &options)
    } else {
        check_single_file(&input_path, &options)
    }
}

fn check_single_file(input_path: &str, options: &CompilerOptions) -> Result<()> {
    println!("🔍 Checking {}", input_path);
    let options = CompilerOptions {
        debug_mode: true,
        ..options.clone()
    };
    match compile_manifest_file_with_options(input_path, options) {
        Ok((output, _)) => {
            println!("✅ {} - No issues found ({} modules)", input_path, output.modules.len());
            Ok(())
        }
        Err(e) => {
            println!("❌ {} - {}", input_path, e);
            for (span, label) in e.labeled_spans() {
                println!("     {}: {}", span, label);
            }
            Err(e)
        }
    }
}

fn is_manifest(path: &Path) -> bool {
    let is_config = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| DEFAULT_CONFIG_FILES.contains(&name));
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext == "toml" || ext == "json");
    has_extension && !is_config
}

fn check_directory(dir_path: &str, recursive: bool, options: &CompilerOptions) -> Result<()> {
    let mut total_files = 0;
    let mut error_files = 0;

    let walker = walkdir::WalkDir::new(dir_path).sort_by_file_name();
    let walker = if recursive { walker } else { walker.max_depth(1) };

    for entry in walker {
        let entry = entry.map_err(|e| {
            CompilerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Directory traversal error: {}", e),
            ))
        })?;
        if entry.file_type().is_file() && is_manifest(entry.path()) {
            total_files += 1;
            if check_single_file(&entry.path().to_string_lossy(), options).is_err() {
                error_files += 1;
            }
        }
    }

    println!("\n📊 Check Summary:");
    println!("   Total manifests: {}", total_files);
    println!("   Manifests with errors: {}", error_files);
    if total_files > 0 {
        println!(
            "   Success rate: {:.1}%",
            (total_files - error_files) as f64 / total_files as f64 * 100.0
        );
    }

    if error_files > 0 {
        Err(CompilerError::manifest(format!("{} manifests have errors", error_files)))
    } else {
        Ok(())
    }
}

// --- INSPECT ---
#[derive(Serialize)]
struct InspectReport<'a> {
    output: &'a CompileOutput,
    stats: &'a CompilationStats,
}

pub fn handle_inspect_command(cli: &StylecCli, matches: &clap::ArgMatches) -> Result<()> {
    let input_path = required(matches, "input")?;
    let output_path = string(matches, "output");
    let format = matches
        .get_one::<ReportFormat>("format")
        .copied()
        .unwrap_or(ReportFormat::Debug);

    let options = cli.build_compiler_options(matches)?;
    let (output, stats) = compile_manifest_file_with_options(&input_path, options)?;

    let report = match format {
        ReportFormat::Json => serde_json::to_string_pretty(&InspectReport {
            output: &output,
            stats: &stats,
        })
        .map_err(|e| CompilerError::InvalidFormat {
            message: format!("JSON serialization error: {}", e),
        })?,
        ReportFormat::Debug => debug_report(&input_path, &output, &stats),
    };

    if let Some(output_file) = output_path {
        fs::write(&output_file, report)?;
        println!("✅ Report saved to {}", output_file);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn debug_report(input_path: &str, output: &CompileOutput, stats: &CompilationStats) -> String {
    let mut lines = vec![format!("Module graph of {} (entry: {})", input_path, output.entry)];
    for module in &output.modules {
        lines.push(String::new());
        lines.push(format!("  {}", module.url.as_deref().unwrap_or("<anonymous>")));
        if !module.upstream.is_empty() {
            lines.push(format!("    upstream:  {}", module.upstream.join(", ")));
        }
        for (label, names, sigil) in [
            ("variables", &module.variables, "$"),
            ("functions", &module.functions, ""),
            ("mixins", &module.mixins, ""),
        ] {
            if !names.is_empty() {
                let names: Vec<String> = names.iter().map(|name| format!("{}{}", sigil, name)).collect();
                lines.push(format!("    {:<10} {}", format!("{}:", label), names.join(", ")));
            }
        }
        lines.push(format!(
            "    css:       {} node(s), {} extension(s)",
            module.css_nodes, module.extensions
        ));
    }

    if !output.inspections.is_empty() {
        lines.push(String::new());
        lines.push("Inspections:".to_string());
        for inspection in &output.inspections {
            let mut line = format!(
                "  {} [{}] {} = {}",
                inspection.site,
                inspection.kind,
                inspection.reference,
                inspection.value.as_deref().unwrap_or("<unset>")
            );
            if let Some(defined_at) = &inspection.defined_at {
                line.push_str(&format!(" (defined at {})", defined_at));
            }
            lines.push(line);
        }
    }

    lines.push(detailed_stats(stats));
    lines.join("\n")
}

fn detailed_stats(stats: &CompilationStats) -> String {
    let mut lines = vec![
        String::new(),
        "📊 Detailed Compilation Statistics:".to_string(),
        format!("   Output size: {} bytes", stats.output_size),
        format!("   Compile time: {}ms", stats.compile_time_ms),
        format!(
            "   Stylesheets: {} in manifest, {} loaded from disk",
            stats.stylesheet_count, stats.files_loaded
        ),
        String::new(),
        "   Evaluation breakdown:".to_string(),
        format!("     Modules: {}", stats.module_count),
        format!("     Statements: {}", stats.statement_count),
        format!("     Variables: {}", stats.variable_count),
        format!("     Functions: {}", stats.function_count),
        format!("     Mixins: {}", stats.mixin_count),
    ];
    for (label, count) in [
        ("Imports", stats.import_count),
        ("Includes", stats.include_count),
        ("Inspections", stats.inspection_count),
    ] {
        if count > 0 {
            lines.push(format!("     {}: {}", label, count));
        }
    }
    lines.push(format!("     CSS nodes: {}", stats.css_node_count));
    lines.push(format!("     Extensions: {}", stats.extension_count));
    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[[stylesheet]]
url = "main"
body = [
    { kind = "variable", name = "gap", value = "4px" },
    { kind = "inspect", reference = "$gap" },
    { kind = "css", text = ".a { gap: #{$gap}; }" },
]
"#;

    #[test]
    fn manifests_are_recognized_by_extension() {
        assert!(is_manifest(Path::new("styles/site.toml")));
        assert!(is_manifest(Path::new("theme.json")));
        assert!(!is_manifest(Path::new("stylec.toml")));
        assert!(!is_manifest(Path::new("notes.md")));
    }

    #[test]
    fn compiles_into_nested_output_directories() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("site.toml");
        fs::write(&manifest, MANIFEST).unwrap();
        let output = dir.path().join("dist/css/site.css");

        let stats = compile_to(
            &manifest.to_string_lossy(),
            Some(&output.to_string_lossy()),
            CompilerOptions::default(),
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), ".a { gap: 4px; }\n");
        assert_eq!(stats.inspection_count, 1);
    }

    #[test]
    fn directory_checks_count_failures() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.toml"), MANIFEST).unwrap();
        fs::write(
            dir.path().join("bad.toml"),
            r#"
[[stylesheet]]
url = "bad"
body = [{ kind = "css", text = "a { b: #{missing.$c}; }" }]
"#,
        )
        .unwrap();
        fs::write(dir.path().join("stylec.toml"), "style = \"compressed\"").unwrap();

        let result = check_directory(&dir.path().to_string_lossy(), false, &CompilerOptions::default());
        match result {
            Err(CompilerError::Manifest { message }) => assert_eq!(message, "1 manifests have errors"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn debug_reports_list_modules_and_inspections() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("site.toml");
        fs::write(&manifest, MANIFEST).unwrap();
        let (output, stats) =
            compile_manifest_file_with_options(&manifest, CompilerOptions::default()).unwrap();

        let report = debug_report("site.toml", &output, &stats);
        assert!(report.contains("Module graph of site.toml (entry: main)"));
        assert!(report.contains("variables: $gap"));
        assert!(report.contains("[variable] $gap = 4px"));
    }

    #[test]
    fn detailed_stats_skip_unused_counters() {
        let stats = CompilationStats {
            module_count: 2,
            include_count: 3,
            ..Default::default()
        };

        let text = detailed_stats(&stats);
        assert!(text.contains("     Modules: 2\n"));
        assert!(text.contains("     Includes: 3\n"));
        assert!(!text.contains("Imports"));
        assert!(text.ends_with("     Extensions: 0\n"));
    }
}
