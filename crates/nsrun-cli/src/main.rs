//! # nsrun
//!
//! Runs a single command inside fresh PID, UTS, mount, and network
//! namespaces, chrooted into a root filesystem, under cgroup limits, with
//! an optional veth link to a host bridge.
//!
//! Exits with the command's own status, or with a fixed status per
//! failure category when the launch itself fails.

#![allow(clippy::print_stderr, clippy::print_stdout)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod cli;
mod output;

use std::process::ExitCode;

use clap::Parser;
use nsrun_common::constants::APP_NAME;
use nsrun_runtime::{FailureCategory, Orchestrator};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, LogFormat};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = match cli.to_run_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{APP_NAME}: {}: {e:#}", FailureCategory::InvalidArgument);
            return ExitCode::from(FailureCategory::InvalidArgument.exit_code());
        }
    };

    if cli.print_config {
        return match serde_json::to_string_pretty(&config) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{APP_NAME}: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let mut orchestrator = Orchestrator::new();
    let cancel = orchestrator.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
        tracing::warn!(error = %e, "failed to install Ctrl+C handler");
    }

    tracing::info!(name = %config.name, run = %output::describe_run(&config), "launching");
    match orchestrator.run(&config) {
        Ok(outcome) => {
            tracing::info!(pid = outcome.pid, exit_code = outcome.exit_code, "run complete");
            ExitCode::from(status_byte(outcome.exit_code))
        }
        Err(e) => {
            eprintln!("{APP_NAME}: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Reduces a wait status to the byte a process can exit with.
fn status_byte(code: i32) -> u8 {
    u8::try_from(code & 0xff).unwrap_or(u8::MAX)
}
