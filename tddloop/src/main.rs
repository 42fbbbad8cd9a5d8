//! Command-line entry point for the generate/execute/revise loop.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use tddloop::core::symbols::discover_symbols;
use tddloop::core::types::{Attempt, AttemptOutcome, NO_SYMBOLS_MESSAGE, Phase};
use tddloop::exit_codes;
use tddloop::io::config::{DEFAULT_CONFIG_FILE, LoopConfig, load_config, write_config};
use tddloop::io::harness::{PythonHarness, TestHarness};
use tddloop::logging;
use tddloop::orchestrate::{LoopOutcome, LoopStop, Orchestrator, Task};

#[derive(Parser)]
#[command(
    name = "tddloop",
    version,
    about = "Generate code and tests with an LLM, run them, and revise until they pass"
)]
struct Cli {
    /// Path to the TOML config file (defaults apply when it does not exist).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a config file with the default settings.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the loop for a task (read from stdin when omitted).
    Run {
        task: Option<String>,
        /// Override `max_attempts` from the config.
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Override the per-run test timeout from the config.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print the full outcome as JSON instead of progress lines.
        #[arg(long)]
        json: bool,
    },
    /// Run a test file against a solution file once.
    Exec {
        #[arg(long)]
        solution: PathBuf,
        #[arg(long)]
        tests: PathBuf,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Print the importable top-level names of a Python file.
    Symbols { file: PathBuf },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run {
            task,
            max_attempts,
            timeout_secs,
            json,
        } => {
            let mut cfg = load_config(&cli.config)?;
            apply_overrides(&mut cfg, max_attempts, timeout_secs)?;
            let task = match task {
                Some(task) => task,
                None => read_stdin()?,
            };
            cmd_run(&cfg, task, json)
        }
        Command::Exec {
            solution,
            tests,
            timeout_secs,
            json,
        } => {
            let mut cfg = load_config(&cli.config)?;
            apply_overrides(&mut cfg, None, timeout_secs)?;
            cmd_exec(&cfg, &solution, &tests, json)
        }
        Command::Symbols { file } => cmd_symbols(&file),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &LoopConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn apply_overrides(
    cfg: &mut LoopConfig,
    max_attempts: Option<u32>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    if let Some(max_attempts) = max_attempts {
        cfg.max_attempts = max_attempts;
    }
    if let Some(timeout_secs) = timeout_secs {
        cfg.harness.timeout_secs = timeout_secs;
    }
    cfg.validate().context("invalid command-line overrides")
}

fn cmd_run(cfg: &LoopConfig, task: String, json: bool) -> Result<i32> {
    if task.trim().is_empty() {
        bail!("task must be non-empty");
    }
    let task = Task::new(task);
    let orchestrator = Orchestrator::new(
        cfg.command_oracle()?,
        PythonHarness::new(cfg.harness_settings()),
        cfg.markers.clone(),
        cfg.prompt.diagnostics_budget_bytes,
    )?;

    let max_attempts = cfg.max_attempts;
    let outcome = orchestrator.run_with(&task, max_attempts, |attempt| {
        if !json {
            print_attempt(attempt, max_attempts);
        }
    })?;

    if json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }
    Ok(match outcome.stop {
        LoopStop::Passed => exit_codes::OK,
        LoopStop::Exhausted { .. } => exit_codes::FAILED,
        LoopStop::OracleError { .. } => exit_codes::ORACLE_ERROR,
    })
}

fn cmd_exec(cfg: &LoopConfig, solution: &Path, tests: &Path, json: bool) -> Result<i32> {
    let solution =
        fs::read_to_string(solution).with_context(|| format!("read {}", solution.display()))?;
    let tests = fs::read_to_string(tests).with_context(|| format!("read {}", tests.display()))?;

    let harness = PythonHarness::new(cfg.harness_settings());
    let result = harness.run(&solution, &tests);

    if json {
        print_json(&result)?;
    } else {
        println!("{}", result.output);
    }
    Ok(if result.passed {
        exit_codes::OK
    } else if result.is_internal() {
        exit_codes::INVALID
    } else {
        exit_codes::FAILED
    })
}

fn cmd_symbols(file: &Path) -> Result<i32> {
    let source = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let discovery = discover_symbols(&source);
    if discovery.symbols.is_empty() {
        match discovery.syntax_error {
            Some(diagnostic) => eprintln!("{NO_SYMBOLS_MESSAGE}: {diagnostic}"),
            None => eprintln!("{NO_SYMBOLS_MESSAGE}"),
        }
        return Ok(exit_codes::FAILED);
    }
    for name in discovery.symbols.iter() {
        println!("{name}");
    }
    Ok(exit_codes::OK)
}

fn print_attempt(attempt: &Attempt, max_attempts: u32) {
    let phase = match attempt.phase {
        Phase::Generate => "generate",
        Phase::Revise => "revise",
    };
    let status = match attempt.outcome {
        AttemptOutcome::Passed => "tests passed".to_string(),
        AttemptOutcome::Failed(kind) => format!("tests failed ({})", kind.as_str()),
        AttemptOutcome::FormatError => "unusable response".to_string(),
        AttemptOutcome::OracleError => "oracle unavailable".to_string(),
    };
    println!(
        "Attempt {}/{} [{}]: {}",
        attempt.index, max_attempts, phase, status
    );
    if attempt.outcome != AttemptOutcome::Passed {
        println!("{}\n", attempt.output.trim_end());
    }
}

fn print_outcome(outcome: &LoopOutcome) {
    match &outcome.stop {
        LoopStop::Passed => {
            println!("All tests passed!\n");
            println!("Final code:\n");
        }
        LoopStop::Exhausted { .. } => {
            println!("Max attempts reached. Human review required.\n");
            println!("Last generated code:\n");
        }
        LoopStop::OracleError { message } => {
            println!("Stopped early: {message}\n");
            println!("Last generated code:\n");
        }
    }
    println!("{}", outcome.solution);
    println!("\nFinal test output:\n");
    println!("{}", outcome.output);
    if outcome.harness_errors > 0 {
        println!(
            "\nwarning: {} attempt(s) failed because of the test harness itself",
            outcome.harness_errors
        );
    }
}

/// Print `value` as pretty JSON with a trailing newline.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut task = String::new();
    std::io::stdin()
        .read_to_string(&mut task)
        .context("read task from stdin")?;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_defaults() {
        let cli = Cli::parse_from(["tddloop", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["tddloop", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "tddloop",
            "run",
            "add two numbers",
            "--max-attempts",
            "5",
            "--json",
        ]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        match cli.command {
            Command::Run {
                task,
                max_attempts,
                timeout_secs,
                json,
            } => {
                assert_eq!(task.as_deref(), Some("add two numbers"));
                assert_eq!(max_attempts, Some(5));
                assert_eq!(timeout_secs, None);
                assert!(json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_without_task_reads_stdin_later() {
        let cli = Cli::parse_from(["tddloop", "--config", "custom.toml", "run"]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(matches!(cli.command, Command::Run { task: None, .. }));
    }

    #[test]
    fn parse_exec_requires_both_files() {
        assert!(Cli::try_parse_from(["tddloop", "exec", "--solution", "a.py"]).is_err());
        let cli = Cli::parse_from([
            "tddloop",
            "exec",
            "--solution",
            "a.py",
            "--tests",
            "b.py",
        ]);
        assert!(matches!(cli.command, Command::Exec { .. }));
    }

    #[test]
    fn overrides_are_validated() {
        let mut cfg = LoopConfig::default();
        let err = apply_overrides(&mut cfg, Some(0), None).unwrap_err();
        assert!(format!("{err:#}").contains("max_attempts"));

        let mut cfg = LoopConfig::default();
        apply_overrides(&mut cfg, Some(7), Some(2)).expect("overrides");
        assert_eq!(cfg.max_attempts, 7);
        assert_eq!(cfg.harness.timeout_secs, 2);
    }
}
