//! External command execution for link management.
//!
//! All network state changes go through a [`CommandRunner`], so the
//! provisioner can be exercised without touching the host and the shell
//! tool can later be swapped for a native netlink implementation.

use std::process::Command;

use nsrun_common::error::{NsrunError, Result};

/// Runs an external program and reports how it exited.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it.
    ///
    /// Returns the exit code, or `None` if the program was terminated by
    /// a signal. A nonzero code is not an error at this level.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be located or started.
    fn run(&self, program: &str, args: &[String]) -> Result<Option<i32>>;
}

/// Runs programs found on the host `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<Option<i32>> {
        let path = which::which(program).map_err(|e| NsrunError::Io {
            path: program.into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
        })?;
        let output = Command::new(&path)
            .args(args)
            .output()
            .map_err(|e| NsrunError::Io { path, source: e })?;
        if !output.status.success() {
            tracing::debug!(
                program,
                ?args,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "command exited unsuccessfully"
            );
        }
        Ok(output.status.code())
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &str, args: &[String]) -> Result<Option<i32>> {
        (**self).run(program, args)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<R> {
    fn run(&self, program: &str, args: &[String]) -> Result<Option<i32>> {
        (**self).run(program, args)
    }
}

/// Renders a command line for diagnostics.
#[must_use]
pub fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_joins_program_and_args() {
        let args = vec!["link".to_string(), "show".into(), "br0".into()];
        assert_eq!(render("ip", &args), "ip link show br0");
    }

    #[test]
    fn system_runner_reports_missing_program() {
        let err = SystemRunner
            .run("nsrun-definitely-not-installed", &[])
            .unwrap_err();
        assert!(matches!(err, NsrunError::Io { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn system_runner_returns_exit_code() {
        assert_eq!(SystemRunner.run("true", &[]).expect("true"), Some(0));
        assert_eq!(SystemRunner.run("false", &[]).expect("false"), Some(1));
    }
}
