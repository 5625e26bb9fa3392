//! Process creation inside fresh namespaces.
//!
//! The container process is created with `clone(2)` on a stack allocated
//! for that launch alone. It then blocks on a readiness pipe until the
//! parent has attached it to its cgroup and moved its network interface
//! in, and only then runs the entry sequence: hostname, network
//! finalisation, root change, exec.

use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use nsrun_common::error::{NsrunError, Result};
use nsrun_core::namespace::NamespaceDescriptor;

use crate::error::FailureCategory;

/// Byte the parent writes to let the container proceed.
const READY: u8 = 1;

/// Container-side network settings applied by the entry sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNetwork {
    /// Interface moved into the container's namespace.
    pub if_name: String,
    /// Address in CIDR form.
    pub address: String,
    /// Default gateway, if any.
    pub gateway: Option<String>,
}

/// Everything the entry sequence needs. Built before `clone(2)`, so a
/// missing rootfs or command, or a command with a NUL byte, is rejected
/// in the parent rather than in the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPlan {
    hostname: Option<String>,
    network: Option<ChildNetwork>,
    rootfs: PathBuf,
    command: CString,
    strict: bool,
}

impl EntryPlan {
    /// Builds the plan for an unlaunched descriptor.
    ///
    /// With `strict`, a failure to finalise the network aborts the entry
    /// sequence instead of being reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor was already launched, lacks a
    /// rootfs or command, or the command contains a NUL byte.
    pub fn new(
        descriptor: &NamespaceDescriptor,
        network: Option<ChildNetwork>,
        strict: bool,
    ) -> Result<Self> {
        if descriptor.is_launched() {
            return Err(NsrunError::Launch {
                message: format!(
                    "descriptor '{}' was already launched; create a fresh one",
                    descriptor.name()
                ),
            });
        }
        let rootfs = descriptor
            .rootfs()
            .ok_or_else(|| NsrunError::invalid("rootfs is not set"))?
            .to_path_buf();
        let command = descriptor
            .command()
            .ok_or_else(|| NsrunError::invalid("command is not set"))?;
        let command = CString::new(command)
            .map_err(|_| NsrunError::invalid(format!("command {command:?} contains NUL")))?;
        Ok(Self {
            hostname: descriptor.hostname().map(str::to_string),
            network,
            rootfs,
            command,
            strict,
        })
    }
}

/// Write end of the readiness pipe held by the parent.
///
/// Dropping it without calling [`ReleaseGate::release`] makes the child
/// read end-of-file and exit before running anything.
#[derive(Debug)]
pub struct ReleaseGate(File);

impl ReleaseGate {
    /// Lets the child start its entry sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipe cannot be written, typically because
    /// the child already exited.
    pub fn release(mut self) -> Result<()> {
        self.0.write_all(&[READY]).map_err(|e| NsrunError::Launch {
            message: format!("could not release container process: {e}"),
        })
    }
}

/// A created, not yet released, container process.
#[derive(Debug)]
pub struct LaunchedChild {
    /// Host-visible PID.
    pub pid: u32,
    /// Gate the child is blocked on.
    pub gate: ReleaseGate,
}

/// Runs the entry sequence in the child. Returns only on failure.
#[cfg(target_os = "linux")]
fn run_entry<R: nsrun_core::network::CommandRunner>(
    plan: &EntryPlan,
    network: &nsrun_core::network::NetworkProvisioner<R>,
) -> NsrunError {
    use nsrun_core::network::NetnsTarget;

    if let Some(hostname) = plan.hostname.as_deref() {
        if let Err(e) = nsrun_core::namespace::uts::set_hostname(hostname) {
            return e;
        }
    }

    if let Some(net) = &plan.network {
        let configured = network.configure_in_namespace(
            NetnsTarget::Current,
            &net.if_name,
            &net.address,
            net.gateway.as_deref(),
        );
        if let Err(e) = configured {
            if plan.strict {
                return NsrunError::InNamespace {
                    step: "network",
                    reason: e.to_string(),
                };
            }
            tracing::warn!(error = %e, "network finalisation failed, continuing without it");
        }
    }

    if let Err(e) = nsrun_core::filesystem::chroot::enter_root(&plan.rootfs) {
        return e;
    }

    match nix::unistd::execvp(&plan.command, &[plan.command.as_c_str()]) {
        Ok(never) => match never {},
        Err(e) => NsrunError::InNamespace {
            step: "exec",
            reason: format!("{}: {e}", plan.command.to_string_lossy()),
        },
    }
}

/// Blocks until the parent releases the gate. Returns whether it did.
#[cfg(target_os = "linux")]
fn await_release(read_end: std::os::fd::OwnedFd) -> bool {
    let mut gate = File::from(read_end);
    let mut byte = [0_u8; 1];
    matches!(gate.read_exact(&mut byte), Ok(()) if byte[0] == READY)
}

/// Reserves the stack for one cloned process.
fn allocate_stack(size: usize) -> Result<Vec<u8>> {
    let mut stack = Vec::new();
    stack
        .try_reserve_exact(size)
        .map_err(|e| NsrunError::Allocation {
            message: format!("{size}-byte child stack: {e}"),
        })?;
    stack.resize(size, 0);
    Ok(stack)
}

/// Creates the container process under `plan` and the descriptor's
/// namespace set, held at its readiness gate.
///
/// # Errors
///
/// Returns an error if the stack or pipe cannot be allocated or
/// `clone(2)` fails.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn spawn<R: nsrun_core::network::CommandRunner>(
    plan: &EntryPlan,
    namespaces: nsrun_core::namespace::NamespaceSet,
    network: &nsrun_core::network::NetworkProvisioner<R>,
) -> Result<LaunchedChild> {
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    let mut stack = allocate_stack(nsrun_common::constants::CHILD_STACK_SIZE)?;
    let (read_end, write_end) = nix::unistd::pipe().map_err(|e| NsrunError::Launch {
        message: format!("readiness pipe: {e}"),
    })?;
    let write_raw = write_end.as_raw_fd();
    let exit_status = isize::from(FailureCategory::Launch.exit_code());

    let mut read_end = Some(read_end);
    let child_fn = Box::new(move || -> isize {
        // SAFETY: in the child this descriptor is a private copy of the
        // parent's write end; nothing else in this process owns it.
        drop(unsafe { OwnedFd::from_raw_fd(write_raw) });
        let Some(read_end) = read_end.take() else {
            return exit_status;
        };
        if !await_release(read_end) {
            return exit_status;
        }
        let err = run_entry(plan, network);
        tracing::error!(error = %err, "container entry sequence failed");
        exit_status
    });

    let flags = namespaces.to_clone_flags();
    // SAFETY: the child does not share memory with the parent (no
    // CLONE_VM); it runs on its own copy of `stack`, which outlives the
    // call, and either execs or returns.
    let pid = unsafe { nix::sched::clone(child_fn, &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|e| NsrunError::Launch {
            message: format!("clone({flags:?}): {e}"),
        })?;

    let pid = u32::try_from(pid.as_raw()).map_err(|_| NsrunError::Launch {
        message: format!("clone returned invalid PID {pid}"),
    })?;
    tracing::info!(pid, "container process created");
    Ok(LaunchedChild {
        pid,
        gate: ReleaseGate(File::from(write_end)),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: namespaced processes require Linux.
#[cfg(not(target_os = "linux"))]
pub fn spawn<R: nsrun_core::network::CommandRunner>(
    _plan: &EntryPlan,
    _namespaces: nsrun_core::namespace::NamespaceSet,
    _network: &nsrun_core::network::NetworkProvisioner<R>,
) -> Result<LaunchedChild> {
    Err(NsrunError::Unsupported {
        message: "Linux required for namespaced process creation".into(),
    })
}

#[cfg(target_os = "linux")]
fn to_pid(pid: u32) -> Result<nix::unistd::Pid> {
    i32::try_from(pid)
        .map(nix::unistd::Pid::from_raw)
        .map_err(|_| NsrunError::invalid(format!("PID {pid} out of range")))
}

/// Waits for `pid` to exit and returns its status: the exit code, or
/// 128 plus the signal number if it was killed.
///
/// # Errors
///
/// Returns an error if `waitpid(2)` fails for a reason other than
/// interruption.
#[cfg(target_os = "linux")]
pub fn wait_for_exit(pid: u32) -> Result<i32> {
    use nix::errno::Errno;
    use nix::sys::wait::{WaitStatus, waitpid};

    let target = to_pid(pid)?;
    loop {
        match waitpid(target, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
            Ok(status) => tracing::debug!(?status, "ignoring non-terminal wait status"),
            Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(NsrunError::Launch {
                    message: format!("waitpid({pid}): {e}"),
                });
            }
        }
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error.
#[cfg(not(target_os = "linux"))]
pub fn wait_for_exit(_pid: u32) -> Result<i32> {
    Err(NsrunError::Unsupported {
        message: "Linux required for container processes".into(),
    })
}

/// Sends `SIGKILL` to `pid`. A process that is already gone is not an
/// error.
///
/// # Errors
///
/// Returns an error if the signal cannot be delivered.
#[cfg(target_os = "linux")]
pub fn kill(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};

    match kill(to_pid(pid)?, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(NsrunError::Launch {
            message: format!("kill({pid}): {e}"),
        }),
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error.
#[cfg(not(target_os = "linux"))]
pub fn kill(_pid: u32) -> Result<()> {
    Err(NsrunError::Unsupported {
        message: "Linux required for container processes".into(),
    })
}
