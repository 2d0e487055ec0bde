/*
 * algae - run comparison jobs over a submission corpus
 *
 * Usage:
 *   algae --config algae.yaml hw1 hw2
 *   algae --config algae.yaml --mode process --force hw1
 *   algae --config algae.yaml --clean hw1
 *
 * Exit status is 0 iff every requested job succeeded.
 */

use std::path::PathBuf;
use std::process::ExitCode;

use algae_orchestration::{
    AlgaeConfig, JobOrchestrator, RunOptions, RunRequest, StageMask, StageRegistry,
};
use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "algae", version, about = "Batch comparison pipeline over student submissions")]
struct Args {
    /// Job configuration file (YAML)
    #[arg(short, long, default_value = "algae.yaml")]
    config: PathBuf,

    /// Stage kinds to run: all, preprocess, process or postprocess
    #[arg(short, long, default_value_t = StageMask::All)]
    mode: StageMask,

    /// Wipe derived artifacts and progress before running
    #[arg(long)]
    clean: bool,

    /// Re-run stages already recorded as completed
    #[arg(long)]
    force: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    /// Jobs to run, in order
    #[arg(required = true)]
    jobs: Vec<String>,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> anyhow::Result<bool> {
    let config = AlgaeConfig::from_yaml(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let orchestrator = JobOrchestrator::from_config(config, StageRegistry::with_builtins())
        .context("Failed to open corpus")?;

    let request = RunRequest::new(args.jobs)
        .with_mask(args.mode)
        .with_options(RunOptions {
            clean: args.clean,
            force: args.force,
        });

    let report = orchestrator.run(&request)?;
    Ok(report.succeeded())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("algae: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "algae", "--config", "c.yaml", "--mode", "process", "--force", "hw1", "hw2",
        ]);
        assert_eq!(args.config, PathBuf::from("c.yaml"));
        assert_eq!(args.mode, StageMask::Process);
        assert!(args.force);
        assert!(!args.clean);
        assert_eq!(args.jobs, vec!["hw1", "hw2"]);
    }

    #[test]
    fn test_cli_mode_defaults_to_all_and_rejects_unknown() {
        let args = Args::parse_from(["algae", "hw1"]);
        assert_eq!(args.mode, StageMask::All);
        assert!(Args::try_parse_from(["algae", "--mode", "everything", "hw1"]).is_err());
    }

    #[test]
    fn test_cli_requires_a_job() {
        assert!(Args::try_parse_from(["algae", "--config", "c.yaml"]).is_err());
    }
}
