// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! Bootstrap-layer CLI handling for the demo pipeline runner.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. Cli::parse()                    │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate_cli()                  │  Range-check numeric arguments
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. DemoArgs                        │  Safe, validated configuration
//! └─────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Demo runner for the dataflow pipeline engine.
#[derive(Debug, Parser)]
#[command(name = "dataflow-demo", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML configuration file overriding engine defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a synthetic pipeline end to end and print a run summary.
    Run {
        /// Number of synthetic resources to push through the pipeline.
        #[arg(long, default_value_t = 100)]
        resource_count: usize,

        /// Maximum resources processed concurrently per stage.
        #[arg(long, default_value_t = 4)]
        parallelism: usize,

        /// Fail resources whose synthetic id is a multiple of this value (0 disables).
        #[arg(long, default_value_t = 0)]
        fail_every: usize,
    },
    /// Retry a prior run's incomplete resources.
    Retry {
        /// The run id to retry, as printed by a previous `run` or `retry` invocation.
        parent_run_id: String,
    },
}

/// Validated CLI configuration.
///
/// Holds all CLI arguments after range validation. A separate struct from
/// [`Cli`] keeps the argument surface `clap` parses distinct from the
/// shape the rest of the program consumes.
#[derive(Debug, Clone)]
pub struct DemoArgs {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Run { resource_count: usize, parallelism: usize, fail_every: usize },
    Retry { parent_run_id: String },
}

/// Errors produced while validating parsed CLI arguments.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },
}

/// Parses `std::env::args()` and validates the result.
///
/// # Errors
///
/// Returns [`ParseError`] if any argument fails range validation. Clap
/// handles `--help` and `--version` itself and exits the process before
/// this function returns.
pub fn parse_and_validate() -> Result<DemoArgs, ParseError> {
    validate_cli(Cli::parse())
}

fn validate_cli(cli: Cli) -> Result<DemoArgs, ParseError> {
    let command = match cli.command {
        Command::Run {
            resource_count,
            parallelism,
            fail_every,
        } => {
            if resource_count == 0 {
                return Err(ParseError::InvalidValue {
                    arg: "resource-count".to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
            if parallelism == 0 || parallelism > 1024 {
                return Err(ParseError::InvalidValue {
                    arg: "parallelism".to_string(),
                    reason: "must be between 1 and 1024".to_string(),
                });
            }
            ValidatedCommand::Run {
                resource_count,
                parallelism,
                fail_every,
            }
        }
        Command::Retry { parent_run_id } => {
            if parent_run_id.trim().is_empty() {
                return Err(ParseError::InvalidValue {
                    arg: "parent-run-id".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
            ValidatedCommand::Retry { parent_run_id }
        }
    };

    Ok(DemoArgs {
        command,
        verbose: cli.verbose,
        config: cli.config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> DemoArgs {
        let cli = Cli::parse_from(args);
        validate_cli(cli).unwrap()
    }

    #[test]
    fn run_command_defaults() {
        let args = parse(&["dataflow-demo", "run"]);
        match args.command {
            ValidatedCommand::Run {
                resource_count,
                parallelism,
                fail_every,
            } => {
                assert_eq!(resource_count, 100);
                assert_eq!(parallelism, 4);
                assert_eq!(fail_every, 0);
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn run_command_rejects_zero_resource_count() {
        let cli = Cli::parse_from(["dataflow-demo", "run", "--resource-count", "0"]);
        assert!(matches!(validate_cli(cli), Err(ParseError::InvalidValue { arg, .. }) if arg == "resource-count"));
    }

    #[test]
    fn run_command_rejects_out_of_range_parallelism() {
        let cli = Cli::parse_from(["dataflow-demo", "run", "--parallelism", "0"]);
        assert!(matches!(validate_cli(cli), Err(ParseError::InvalidValue { arg, .. }) if arg == "parallelism"));
    }

    #[test]
    fn retry_command_rejects_empty_run_id() {
        let cli = Cli::parse_from(["dataflow-demo", "retry", ""]);
        assert!(matches!(validate_cli(cli), Err(ParseError::InvalidValue { arg, .. }) if arg == "parent-run-id"));
    }

    #[test]
    fn retry_command_carries_run_id() {
        let args = parse(&["dataflow-demo", "retry", "01J000EXAMPLE"]);
        match args.command {
            ValidatedCommand::Retry { parent_run_id } => assert_eq!(parent_run_id, "01J000EXAMPLE"),
            _ => panic!("expected Retry"),
        }
    }
}
