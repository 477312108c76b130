//! The classck command-line driver.
//!
//! Provides the `classckc` command with the following subcommands:
//!
//! - `classckc check <program.json>` - Check a program snapshot and report diagnostics
//! - `classckc ancestors <program.json>` - Print the resolved ancestor set of each class
//!
//! Options for `check`:
//! - `--config` - Checker settings (default: `classck.toml` beside the snapshot, if present)
//! - `--json` - Output diagnostics as JSON (one object per line)
//! - `--no-color` - Disable colorized output
//! - `-v/--verbose` - Debug logging (otherwise `CLASSCK_LOG` controls it)
//!
//! Exit status is 0 when the program is clean, 1 when any error was
//! reported, and 2 when the snapshot or config could not be loaded.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use classck::diagnostics::{render_diagnostic, DiagnosticOptions};
use classck::{check_program, resolve_ancestors, CheckConfig, CheckError, CheckOutput, Program, ProgramTables};
use classck_common::SourceLoc;

const CONFIG_FILE: &str = "classck.toml";
const LOG_ENV: &str = "CLASSCK_LOG";

#[derive(Parser)]
#[command(name = "classckc", version, about = "Type-class instance checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the classes, instances and declarations of a program snapshot
    Check {
        /// Path to the program snapshot (JSON)
        program: PathBuf,

        /// Checker settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output diagnostics as JSON (one object per line) instead of human-readable format
        #[arg(long)]
        json: bool,

        /// Disable colorized output
        #[arg(long = "no-color")]
        no_color: bool,

        /// Log checker progress at debug level
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the ancestor constraints of every class
    Ancestors {
        /// Path to the program snapshot (JSON)
        program: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { program, config, json, no_color, verbose } => {
            init_logging(verbose);
            let diag_opts = DiagnosticOptions { color: !no_color && !json, json };
            match check(&program, config.as_deref(), &diag_opts) {
                Ok(has_errors) => process::exit(if has_errors { 1 } else { 0 }),
                Err(msg) => {
                    if json {
                        let msg = serde_json::json!({
                            "code": "L0001",
                            "severity": "error",
                            "phase": "load",
                            "message": msg,
                            "internal": false,
                            "locations": [],
                        });
                        eprintln!("{}", msg);
                    } else {
                        eprintln!("error: {}", msg);
                    }
                    process::exit(2);
                }
            }
        }
        Commands::Ancestors { program } => {
            init_logging(false);
            match ancestors(&program) {
                Ok(has_errors) => process::exit(if has_errors { 1 } else { 0 }),
                Err(msg) => {
                    eprintln!("error: {}", msg);
                    process::exit(2);
                }
            }
        }
    }
}

/// Load and lower a snapshot. Errors are returned as display text.
fn load(path: &Path) -> Result<ProgramTables, String> {
    let program = Program::from_file(path).map_err(|e| e.to_string())?;
    program.lower().map_err(|e| e.to_string())
}

/// The explicit config, else `classck.toml` beside the snapshot, else defaults.
fn load_config(program: &Path, explicit: Option<&Path>) -> Result<CheckConfig, String> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let beside = base_dir(program).join(CONFIG_FILE);
            if !beside.is_file() {
                return Ok(CheckConfig::default());
            }
            beside
        }
    };
    debug!(path = %path.display(), "loading config");
    CheckConfig::from_file(&path).map_err(|e| e.to_string())
}

fn base_dir(program: &Path) -> PathBuf {
    program.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Run the checker and report its diagnostics. Returns true if any error
/// was reported.
fn check(program: &Path, config: Option<&Path>, diag_opts: &DiagnosticOptions) -> Result<bool, String> {
    let config = load_config(program, config)?;
    let tables = load(program)?;
    let output = check_program(tables, &config);
    let mut sources = SourceCache::new(base_dir(program));
    report_diagnostics(&output, &mut sources, diag_opts);
    Ok(output.error_count() > 0)
}

/// Source text of the files diagnostics point at, read on first use.
struct SourceCache {
    base: PathBuf,
    files: FxHashMap<String, Option<String>>,
}

impl SourceCache {
    fn new(base: PathBuf) -> Self {
        SourceCache { base, files: FxHashMap::default() }
    }

    fn get(&mut self, loc: &SourceLoc) -> Option<&str> {
        if loc.is_builtin() {
            return None;
        }
        let base = &self.base;
        self.files
            .entry(loc.file.clone())
            .or_insert_with(|| {
                let path = base.join(&loc.file);
                match std::fs::read_to_string(&path) {
                    Ok(text) => Some(text),
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "source not available");
                        None
                    }
                }
            })
            .as_deref()
    }
}

/// Print every diagnostic to stderr, followed by a summary line in
/// human-readable mode.
fn report_diagnostics(output: &CheckOutput, sources: &mut SourceCache, diag_opts: &DiagnosticOptions) {
    for diag in &output.diagnostics {
        let source = if diag_opts.json { None } else { sources.get(diag.loc()) };
        let rendered = render_diagnostic(diag, source, diag_opts);
        if diag_opts.json {
            eprintln!("{}", rendered);
        } else {
            eprint!("{}", rendered);
        }
    }

    if let Some(phase) = output.halted_after {
        warn!(?phase, "checking stopped early");
    }
    if output.has_internal_error() {
        eprintln!("error: the instance checker found an internal inconsistency");
    }
    if !diag_opts.json && !output.diagnostics.is_empty() {
        eprintln!(
            "{} error(s), {} warning(s)",
            output.error_count(),
            output.warning_count()
        );
    }
}

/// Print `class/arity: ancestor, ...` for every class, in declaration order.
/// Returns true if resolution reported an error.
fn ancestors(program: &Path) -> Result<bool, String> {
    let tables = load(program)?;
    let (classes, errors) = resolve_ancestors(tables.classes);
    for err in &errors {
        eprint!("{}", render_diagnostic(err, None, &DiagnosticOptions::colorless()));
    }
    for class in classes.iter() {
        let ancestors: Vec<String> =
            class.ancestors.iter().map(|c| c.display(&class.varset).to_string()).collect();
        println!("{}: {}", class.id, ancestors.join(", "));
    }
    Ok(errors.iter().any(CheckError::is_error))
}
