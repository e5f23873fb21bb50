use crate::config::validator::validate_limits;
use crate::config::{GradeLimits, GraderConfig};
use crate::core::runner::on_runner_stack;
use crate::problem::ProblemBank;
use crate::vet::{vet_source, VetPolicy};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Grader config file (defaults to ./gradebox.json when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// JSON array of problems replacing the built-in bank
    #[arg(long, global = true, value_name = "FILE")]
    problems: Option<PathBuf>,
    /// Mirror audit events to this file
    #[arg(long, global = true, value_name = "FILE")]
    audit_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Read the submission from a file ("-" for stdin)
    #[arg(long, value_name = "PATH", conflicts_with = "code")]
    file: Option<PathBuf>,
    /// Submission source passed inline
    #[arg(long, value_name = "SRC")]
    code: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available problems
    List,
    /// Show one problem without its tests
    Show {
        /// Problem id
        id: String,
    },
    /// Grade a submission against a problem's hidden tests
    Grade {
        /// Problem id
        #[arg(long)]
        problem: String,
        #[command(flatten)]
        source: SourceArgs,
        /// Wall clock time limit in seconds
        #[arg(long)]
        time_limit: Option<f64>,
        /// Memory limit in MB
        #[arg(long)]
        mem_limit_mb: Option<u64>,
    },
    /// Run only the static checks on a submission
    Vet {
        #[command(flatten)]
        source: SourceArgs,
    },
}

/// Parse arguments, run one command, and return the process exit code.
pub fn run() -> Result<i32> {
    env_logger::init();

    let cli = Cli::parse();

    if let Some(path) = cli.audit_log.as_deref() {
        crate::observability::audit::init_audit_log(path)?;
    }

    let config = GraderConfig::load(cli.config.as_deref())?;
    let bank = load_bank(cli.problems.as_deref().or(config.problems_file.as_deref()))?;

    match cli.command {
        Commands::List => {
            println!("{}", serde_json::to_string_pretty(&bank.list())?);
            Ok(0)
        }
        Commands::Show { id } => {
            let problem = bank.require(&id)?;
            println!("{}", serde_json::to_string_pretty(&problem.summary())?);
            Ok(0)
        }
        Commands::Grade {
            problem,
            source,
            time_limit,
            mem_limit_mb,
        } => {
            let problem = bank.require(&problem)?;
            let limits = checked_limits(config.limits.with_overrides(time_limit, mem_limit_mb))?;
            let code = read_source(&source)?;

            log::info!("grading submission for '{}' ({} bytes)", problem.id, code.len());
            let result = crate::core::grade(problem, &code, &limits);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.all_passed() { 0 } else { 1 })
        }
        Commands::Vet { source } => {
            let code = read_source(&source)?;
            let policy = VetPolicy::default().with_max_source_bytes(config.limits.max_source_bytes);
            let verdict = on_runner_stack(move || vet_source(&code, &policy).map(|_| ()))
                .map_err(|panic| anyhow!("vettor crashed: {}", panic))?;

            let (report, code) = match verdict {
                Ok(()) => (serde_json::json!({"status": "ok"}), 0),
                Err(e) => (serde_json::json!({"status": "error", "error": e.reason}), 1),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(code)
        }
    }
}

fn load_bank(problems_file: Option<&Path>) -> Result<ProblemBank> {
    match problems_file {
        Some(path) => Ok(ProblemBank::load_from_file(path)?),
        None => Ok(ProblemBank::builtin()),
    }
}

/// Validation errors are fatal; warnings are logged.
fn checked_limits(limits: GradeLimits) -> Result<GradeLimits> {
    let warnings = validate_limits(&limits).into_result()?;
    for warning in warnings {
        log::warn!("{}", warning);
    }
    Ok(limits)
}

fn read_source(source: &SourceArgs) -> Result<String> {
    if let Some(code) = &source.code {
        return Ok(code.clone());
    }

    match source.file.as_deref() {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read submission {}", path.display())),
        _ => {
            let mut code = String::new();
            std::io::stdin()
                .read_to_string(&mut code)
                .context("Failed to read submission from stdin")?;
            Ok(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_grade_arguments_parse() {
        let cli = Cli::parse_from([
            "gradebox",
            "--problems",
            "bank.json",
            "grade",
            "--problem",
            "two_sum",
            "--code",
            "def two_sum(a, b): return []",
            "--time-limit",
            "0.5",
        ]);
        assert_eq!(cli.problems, Some(PathBuf::from("bank.json")));
        let Commands::Grade {
            problem,
            source,
            time_limit,
            mem_limit_mb,
        } = cli.command
        else {
            panic!("expected grade command");
        };
        assert_eq!(problem, "two_sum");
        assert_eq!(time_limit, Some(0.5));
        assert_eq!(mem_limit_mb, None);
        assert_eq!(read_source(&source).unwrap(), "def two_sum(a, b): return []");
    }

    #[test]
    fn test_file_and_code_conflict() {
        let parsed = Cli::try_parse_from([
            "gradebox", "vet", "--file", "a.py", "--code", "x = 1",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_invalid_override_is_fatal() {
        let limits = GradeLimits::default().with_overrides(Some(0.0), None);
        assert!(checked_limits(limits).is_err());
    }
}
