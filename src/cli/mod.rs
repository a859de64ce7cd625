// FILE: src/cli/mod.rs

mod config;
mod handlers;

use crate::error::{CompilerError, Result};
use crate::{CompilerOptions, OutputStyle};
use clap::{Arg, ArgAction, Command, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Style {
    Expanded,
    Compressed,
}

impl From<Style> for OutputStyle {
    fn from(style: Style) -> Self {
        match style {
            Style::Expanded => OutputStyle::Expanded,
            Style::Compressed => OutputStyle::Compressed,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    Json,
    Debug,
}

pub struct StylecCli {
    config: config::ConfigFile,
    start_time: Instant,
}

impl Default for StylecCli {
    fn default() -> Self {
        Self::new()
    }
}

impl StylecCli {
    pub fn new() -> Self {
        Self {
            config: config::ConfigFile::default(),
            start_time: Instant::now(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        self.start_time = Instant::now();
        let matches = self.build_cli().get_matches();

        self.setup_logging(matches.get_count("verbose"))?;

        self.config = match matches.get_one::<String>("config") {
            Some(config_path) => config::load(config_path)?,
            None => config::discover()?.unwrap_or_default(),
        };

        let result = match matches.subcommand() {
            Some(("compile", sub_matches)) => handlers::handle_compile_command(self, sub_matches),
            Some(("check", sub_matches)) => handlers::handle_check_command(self, sub_matches),
            Some(("inspect", sub_matches)) => handlers::handle_inspect_command(self, sub_matches),
            _ => {
                println!("No subcommand specified. Use --help for usage information.");
                Ok(())
            }
        };
        log::debug!("Finished in {}ms", self.start_time.elapsed().as_millis());
        result
    }

    fn build_cli(&self) -> Command {
        Command::new(crate::NAME)
            .version(crate::VERSION)
            .about(crate::DESCRIPTION)
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (defaults to ./stylec.toml or ./stylec.json)")
                    .action(ArgAction::Set),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .help("Increase verbosity (can be used multiple times)")
                    .action(ArgAction::Count)
                    .global(true),
            )
            .subcommand(
                Command::new("compile")
                    .about("Compile a stylesheet manifest to CSS")
                    .arg(Arg::new("input").help("Manifest file (.toml or .json)").required(true).index(1))
                    .arg(Arg::new("output").short('o').long("output").value_name("FILE").help("Output CSS file (defaults to stdout)"))
                    .arg(Arg::new("entry").short('e').long("entry").value_name("URL").help("Stylesheet to compile instead of the manifest's entry"))
                    .arg(Arg::new("style").short('s').long("style").value_parser(clap::value_parser!(Style)).help("Output style [default: expanded]"))
                    .arg(Arg::new("debug").short('d').long("debug").help("Enable debug mode with extra logging").action(ArgAction::SetTrue))
                    .arg(Arg::new("load-path").short('I').long("load-path").value_name("DIR").help("Add a directory to search for stylesheets").action(ArgAction::Append))
                    .arg(Arg::new("define").short('D').long("define").value_name("VAR=VALUE").help("Define a global variable in the entry stylesheet").action(ArgAction::Append))
                    .arg(Arg::new("stats").long("stats").help("Show detailed compilation statistics").action(ArgAction::SetTrue))
                    .arg(Arg::new("watch").short('w').long("watch").help("Watch the manifest and load paths and recompile on change").action(ArgAction::SetTrue)),
            )
            .subcommand(
                Command::new("check")
                    .about("Check manifests for module and resolution errors")
                    .arg(Arg::new("input").help("Manifest file or directory").required(true).index(1))
                    .arg(Arg::new("recursive").short('r').long("recursive").help("Check every manifest in the directory recursively").action(ArgAction::SetTrue)),
            )
            .subcommand(
                Command::new("inspect")
                    .about("Show the module graph and inspected references of a manifest")
                    .arg(Arg::new("input").help("Manifest file (.toml or .json)").required(true).index(1))
                    .arg(Arg::new("output").short('o').long("output").value_name("FILE").help("Write the report to a file"))
                    .arg(Arg::new("entry").short('e').long("entry").value_name("URL").help("Stylesheet to inspect instead of the manifest's entry"))
                    .arg(Arg::new("format").short('f').long("format").value_parser(clap::value_parser!(ReportFormat)).default_value("debug").help("Report format")),
            )
    }

    fn setup_logging(&self, verbose_count: u8) -> Result<()> {
        let log_level = match verbose_count {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        env_logger::Builder::from_default_env()
            .filter_level(log_level)
            .format_timestamp_secs()
            .init();
        Ok(())
    }

    /// Options from the command line, with the configuration file filling
    /// in anything not given there.
    pub fn build_compiler_options(&self, matches: &clap::ArgMatches) -> Result<CompilerOptions> {
        build_compiler_options(&self.config, matches)
    }

    fn output_directory(&self) -> Option<&str> {
        self.config.output_directory.as_deref()
    }
}

fn build_compiler_options(config: &config::ConfigFile, matches: &clap::ArgMatches) -> Result<CompilerOptions> {
    let mut options = CompilerOptions::default();

    options.debug_mode = flag(matches, "debug");
    options.entry = string(matches, "entry").or_else(|| config.entry.clone());
    options.style = match matches.try_get_one::<Style>("style").ok().flatten() {
        Some(style) => (*style).into(),
        None => config.style.unwrap_or_default(),
    };

    if let Ok(Some(load_paths)) = matches.try_get_many::<String>("load-path") {
        options.load_paths.extend(load_paths.map(PathBuf::from));
    }
    if let Some(config_paths) = &config.load_paths {
        options.load_paths.extend(config_paths.iter().map(PathBuf::from));
    }

    if let Ok(Some(defines)) = matches.try_get_many::<String>("define") {
        for define in defines {
            if let Some((key, value)) = define.split_once('=') {
                let key = key.trim().trim_start_matches('$');
                options.custom_variables.insert(key.to_string(), value.to_string());
            } else {
                return Err(CompilerError::InvalidFormat {
                    message: format!("Invalid variable definition: {}. Use VAR=VALUE format.", define),
                });
            }
        }
    }
    if let Some(config_vars) = &config.custom_variables {
        for (key, value) in config_vars {
            options
                .custom_variables
                .entry(key.trim_start_matches('$').to_string())
                .or_insert_with(|| value.clone());
        }
    }

    Ok(options)
}

/// `check` and `inspect` share options with `compile` but don't declare
/// all of its arguments.
fn flag(matches: &clap::ArgMatches, id: &str) -> bool {
    matches.try_get_one::<bool>(id).ok().flatten().copied().unwrap_or(false)
}

fn string(matches: &clap::ArgMatches, id: &str) -> Option<String> {
    matches.try_get_one::<String>(id).ok().flatten().cloned()
}

fn required(matches: &clap::ArgMatches, id: &str) -> Result<String> {
    string(matches, id).ok_or_else(|| CompilerError::InvalidFormat {
        message: format!("Missing required argument <{}>", id),
    })
}
