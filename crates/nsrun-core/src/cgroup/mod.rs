//! Cgroup resource management.
//!
//! Creates one control group per launch, writes limit values into its
//! control files, attaches the container process, and removes the group
//! once the process has exited.
//!
//! The hierarchy is identified by the filesystem mounted at the root:
//! `cgroup2` is the unified hierarchy, `cgroup` a co-mounted legacy one.
//! Anything else (typically a tmpfs holding one legacy mount per
//! controller) is searched for per-controller hierarchies, and the group
//! is created once in each.

pub mod cpu;
pub mod memory;
pub mod pids;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use nsrun_common::error::{NsrunError, Result};
use nsrun_common::types::ResourceLimits;

/// Controllers looked up below a root that is not itself a cgroup mount.
const V1_CONTROLLERS: [&str; 3] = ["memory", "cpu", "pids"];

static LAUNCH_SEQ: AtomicU32 = AtomicU32::new(0);

/// Cgroup hierarchy layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// Legacy per-controller file names.
    V1,
    /// Unified hierarchy.
    V2,
}

impl CgroupVersion {
    /// Name of the file a PID is written to in order to join the group.
    #[must_use]
    pub const fn membership_file(self) -> &'static str {
        match self {
            Self::V1 => "tasks",
            Self::V2 => "cgroup.procs",
        }
    }
}

/// A single value written to a single control file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlWrite {
    /// Control file name, relative to the group directory.
    pub file: &'static str,
    /// Decimal text written to the file.
    pub value: String,
}

impl ControlWrite {
    /// Creates a write of `value` into `file`.
    #[must_use]
    pub const fn new(file: &'static str, value: String) -> Self {
        Self { file, value }
    }

    /// Controller owning the file, e.g. `memory` for `memory.max`.
    #[must_use]
    pub fn controller(&self) -> &'static str {
        self.file.split('.').next().unwrap_or(self.file)
    }
}

/// Returns the ordered control-file writes that enforce `limits`.
///
/// Order: memory, CPU (period before quota), process count. Unset and
/// zero limits produce no write at all.
#[must_use]
pub fn write_plan(version: CgroupVersion, limits: &ResourceLimits) -> Vec<ControlWrite> {
    let limits = limits.effective();
    let mut plan = Vec::new();
    if let Some(bytes) = limits.memory_bytes {
        plan.push(memory::memory_limit(version, bytes));
    }
    if let Some(cpu_limit) = limits.cpu {
        plan.extend(cpu::cpu_bandwidth(version, cpu_limit));
    }
    if let Some(max) = limits.pids_max {
        plan.push(pids::pids_limit(max));
    }
    plan
}

/// Returns the group name for launch number `launch` of the process
/// running as `host_pid`.
#[must_use]
pub fn group_name(host_pid: u32, launch: u32) -> String {
    format!(
        "{}-{host_pid}-{launch}",
        nsrun_common::constants::CGROUP_PREFIX
    )
}

/// Returns a group name not yet handed out by this process.
///
/// The host PID keeps concurrent orchestrators apart; the sequence number
/// keeps successive launches from one orchestrator apart.
#[must_use]
pub fn next_group_name() -> String {
    group_name(std::process::id(), LAUNCH_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// One directory of a group. `controller` is `None` when the directory
/// serves every controller.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ControlDir {
    path: PathBuf,
    controller: Option<&'static str>,
}

impl ControlDir {
    const fn shared(path: PathBuf) -> Self {
        Self {
            path,
            controller: None,
        }
    }

    fn serves(&self, controller: &str) -> bool {
        self.controller.is_none_or(|c| c == controller)
    }
}

/// Handle to the control group of one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cgroup {
    dirs: Vec<ControlDir>,
    version: CgroupVersion,
}

impl Cgroup {
    /// Creates the group `name` in the hierarchy mounted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a cgroup hierarchy and holds no
    /// per-controller hierarchies, or if a group directory cannot be
    /// created, including when one already exists.
    pub fn create(root: &Path, name: &str) -> Result<Self> {
        let (version, dirs) = locate(root, name)?;
        Self::create_dirs(version, dirs)
    }

    fn create_dirs(version: CgroupVersion, dirs: Vec<ControlDir>) -> Result<Self> {
        for (made, dir) in dirs.iter().enumerate() {
            if let Err(e) = std::fs::create_dir(&dir.path) {
                for earlier in dirs[..made].iter().rev() {
                    let _ = std::fs::remove_dir(&earlier.path);
                }
                return Err(NsrunError::ResourceCreation {
                    resource: format!("cgroup {}", dir.path.display()),
                    reason: e.to_string(),
                });
            }
            tracing::info!(path = %dir.path.display(), controller = ?dir.controller, ?version, "cgroup created");
        }
        Ok(Self { dirs, version })
    }

    /// Writes every configured limit into the group's control files.
    ///
    /// Writes are applied in [`write_plan`] order. The first failure
    /// aborts the call and leaves earlier writes in place.
    ///
    /// # Errors
    ///
    /// Returns an error if a limit's controller has no hierarchy or any
    /// control file cannot be written.
    pub fn apply_limits(&self, limits: &ResourceLimits) -> Result<()> {
        if self.version == CgroupVersion::V2 {
            self.delegate_controllers(&limits.effective());
        }
        for write in write_plan(self.version, limits) {
            let dir = self.dir_for(write.controller())?;
            let file = dir.join(write.file);
            std::fs::write(&file, &write.value).map_err(|e| NsrunError::Io {
                path: file.clone(),
                source: e,
            })?;
            tracing::debug!(file = %file.display(), value = %write.value, "cgroup limit written");
        }
        Ok(())
    }

    /// Adds a process to this cgroup by writing its PID into every
    /// directory of the group.
    ///
    /// Call only after [`Cgroup::apply_limits`], so the process is bounded
    /// from the moment it is visible in the group.
    ///
    /// # Errors
    ///
    /// Returns an error if writing a membership file fails.
    pub fn attach_process(&self, pid: u32) -> Result<()> {
        for dir in &self.dirs {
            let file = dir.path.join(self.version.membership_file());
            std::fs::write(&file, pid.to_string()).map_err(|e| NsrunError::Attach {
                target: format!("PID {pid} to cgroup {}", dir.path.display()),
                reason: e.to_string(),
            })?;
            tracing::debug!(pid, path = %dir.path.display(), "added process to cgroup");
        }
        Ok(())
    }

    /// Removes every directory of the group.
    ///
    /// The kernel refuses while processes are still attached, so the
    /// caller must reap the container process first. A directory that is
    /// already gone counts as removed. Removal continues past a failure.
    ///
    /// # Errors
    ///
    /// Returns the first removal error.
    pub fn destroy(&self) -> Result<()> {
        let mut first_error = None;
        for dir in self.dirs.iter().rev() {
            match std::fs::remove_dir(&dir.path) {
                Ok(()) => tracing::info!(path = %dir.path.display(), "cgroup destroyed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(NsrunError::Io {
                            path: dir.path.clone(),
                            source: e,
                        });
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Returns the group's first directory. On a unified or co-mounted
    /// hierarchy this is the only one.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dirs.first().map_or_else(|| Path::new(""), |d| d.path.as_path())
    }

    /// Returns every directory of the group.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().map(|d| d.path.as_path())
    }

    /// Returns the detected hierarchy layout.
    #[must_use]
    pub const fn version(&self) -> CgroupVersion {
        self.version
    }

    fn dir_for(&self, controller: &str) -> Result<&Path> {
        self.dirs
            .iter()
            .find(|d| d.serves(controller))
            .map(|d| d.path.as_path())
            .ok_or_else(|| NsrunError::Unsupported {
                message: format!("no {controller} cgroup hierarchy is mounted"),
            })
    }

    /// Enables the controllers `limits` needs in the parent's
    /// `cgroup.subtree_control`. Failures are logged; the following limit
    /// write reports the real error if the controller stays unavailable.
    fn delegate_controllers(&self, limits: &ResourceLimits) {
        let Some(parent) = self.path().parent() else {
            return;
        };
        let subtree = parent.join("cgroup.subtree_control");
        let enabled = std::fs::read_to_string(&subtree).unwrap_or_default();
        let wanted = [
            ("memory", limits.memory_bytes.is_some()),
            ("cpu", limits.cpu.is_some()),
            ("pids", limits.pids_max.is_some()),
        ];
        for (controller, needed) in wanted {
            if !needed || enabled.split_whitespace().any(|c| c == controller) {
                continue;
            }
            if let Err(e) = std::fs::write(&subtree, format!("+{controller}")) {
                tracing::warn!(controller, error = %e, "could not delegate cgroup controller");
            }
        }
    }
}

/// Finds where the group `name` lives below `root`.
#[cfg(target_os = "linux")]
fn locate(root: &Path, name: &str) -> Result<(CgroupVersion, Vec<ControlDir>)> {
    let unusable = |reason: String| NsrunError::ResourceCreation {
        resource: format!("cgroup {name} under {}", root.display()),
        reason,
    };

    if let Some(version) = mounted_version(root).map_err(|e| unusable(e.to_string()))? {
        return Ok((version, vec![ControlDir::shared(root.join(name))]));
    }

    let dirs: Vec<ControlDir> = V1_CONTROLLERS
        .iter()
        .copied()
        .filter(|c| matches!(mounted_version(&root.join(c)), Ok(Some(CgroupVersion::V1))))
        .map(|c| ControlDir {
            path: root.join(c).join(name),
            controller: Some(c),
        })
        .collect();
    if dirs.is_empty() {
        return Err(unusable(
            "not a cgroup filesystem and no controller hierarchies below it".into(),
        ));
    }
    Ok((CgroupVersion::V1, dirs))
}

/// Stub for non-Linux platforms.
#[cfg(not(target_os = "linux"))]
fn locate(_root: &Path, _name: &str) -> Result<(CgroupVersion, Vec<ControlDir>)> {
    Err(NsrunError::Unsupported {
        message: "Linux required for cgroups".into(),
    })
}

/// Returns which cgroup hierarchy, if any, is mounted at `path`.
#[cfg(target_os = "linux")]
fn mounted_version(path: &Path) -> nix::Result<Option<CgroupVersion>> {
    use nix::sys::statfs::{CGROUP_SUPER_MAGIC, CGROUP2_SUPER_MAGIC, statfs};

    let kind = statfs(path)?.filesystem_type();
    Ok(if kind == CGROUP2_SUPER_MAGIC {
        Some(CgroupVersion::V2)
    } else if kind == CGROUP_SUPER_MAGIC {
        Some(CgroupVersion::V1)
    } else {
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsrun_common::config::RunConfig;
    use nsrun_common::types::CpuLimit;

    fn files(plan: &[ControlWrite]) -> Vec<&'static str> {
        plan.iter().map(|w| w.file).collect()
    }

    fn scratch_group(root: &Path, version: CgroupVersion, launch: u32) -> Cgroup {
        let path = root.join(group_name(1, launch));
        Cgroup::create_dirs(version, vec![ControlDir::shared(path)]).expect("create")
    }

    #[test]
    fn empty_limits_produce_no_writes() {
        assert!(write_plan(CgroupVersion::V1, &ResourceLimits::default()).is_empty());
        assert!(write_plan(CgroupVersion::V2, &ResourceLimits::default()).is_empty());
    }

    #[test]
    fn v1_plan_writes_period_before_quota() {
        let limits = ResourceLimits {
            memory_bytes: Some(256 * 1024 * 1024),
            cpu: Some(CpuLimit {
                quota_us: 50_000,
                period_us: 100_000,
            }),
            pids_max: Some(64),
        };
        let plan = write_plan(CgroupVersion::V1, &limits);
        assert_eq!(
            files(&plan),
            [
                "memory.limit_in_bytes",
                "cpu.cfs_period_us",
                "cpu.cfs_quota_us",
                "pids.max"
            ]
        );
        assert_eq!(plan[0].value, "268435456");
        assert_eq!(plan[1].value, "100000");
        assert_eq!(plan[2].value, "50000");
    }

    #[test]
    fn v2_plan_combines_cpu_into_one_write() {
        let limits = ResourceLimits {
            cpu: Some(CpuLimit {
                quota_us: 25_000,
                period_us: 100_000,
            }),
            ..ResourceLimits::default()
        };
        let plan = write_plan(CgroupVersion::V2, &limits);
        assert_eq!(plan, [ControlWrite::new("cpu.max", "25000 100000".into())]);
    }

    #[test]
    fn plan_only_covers_configured_subset() {
        let limits = ResourceLimits {
            pids_max: Some(16),
            ..ResourceLimits::default()
        };
        assert_eq!(files(&write_plan(CgroupVersion::V1, &limits)), ["pids.max"]);
    }

    #[test]
    fn zero_limits_from_config_file_produce_no_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"limits": {"memory_bytes": 0, "pids_max": 0, "cpu": {"quota_us": 0, "period_us": 100000}}}"#,
        )
        .expect("write");
        let config = RunConfig::from_file(&path).expect("load");

        assert!(write_plan(CgroupVersion::V2, &config.limits).is_empty());
        assert!(write_plan(CgroupVersion::V1, &config.limits).is_empty());
    }

    #[test]
    fn writes_know_their_controller() {
        assert_eq!(ControlWrite::new("memory.max", "1".into()).controller(), "memory");
        assert_eq!(ControlWrite::new("cpu.cfs_quota_us", "1".into()).controller(), "cpu");
        assert_eq!(ControlWrite::new("pids.max", "1".into()).controller(), "pids");
    }

    #[test]
    fn group_name_carries_pid_and_launch() {
        assert_eq!(group_name(1234, 7), "nsrun-1234-7");
    }

    #[test]
    fn successive_names_differ_within_one_process() {
        let first = next_group_name();
        let second = next_group_name();
        let prefix = format!("nsrun-{}-", std::process::id());
        assert_ne!(first, second);
        assert!(first.starts_with(&prefix));
        assert!(second.starts_with(&prefix));
    }

    #[test]
    fn second_launch_does_not_collide_with_live_group() {
        let root = tempfile::tempdir().expect("tempdir");
        let live = root.path().join(next_group_name());
        let _held = Cgroup::create_dirs(CgroupVersion::V1, vec![ControlDir::shared(live)])
            .expect("first group");
        let next = root.path().join(next_group_name());
        Cgroup::create_dirs(CgroupVersion::V1, vec![ControlDir::shared(next)])
            .expect("second group");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn plain_directory_is_not_a_hierarchy() {
        let root = tempfile::tempdir().expect("tempdir");
        let err = Cgroup::create(root.path(), "nsrun-test").unwrap_err();
        assert!(matches!(err, NsrunError::ResourceCreation { .. }));
        assert!(!root.path().join("nsrun-test").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn missing_root_is_a_creation_error() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            Cgroup::create(&root.path().join("absent"), "nsrun-test"),
            Err(NsrunError::ResourceCreation { .. })
        ));
    }

    #[test]
    fn create_fails_when_path_exists() {
        let root = tempfile::tempdir().expect("tempdir");
        let _cg = scratch_group(root.path(), CgroupVersion::V1, 1);
        let again = vec![ControlDir::shared(root.path().join(group_name(1, 1)))];
        assert!(matches!(
            Cgroup::create_dirs(CgroupVersion::V1, again),
            Err(NsrunError::ResourceCreation { .. })
        ));
    }

    #[test]
    fn failed_creation_removes_earlier_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let memory = root.path().join("memory");
        std::fs::create_dir(&memory).expect("mkdir");
        let dirs = vec![
            ControlDir {
                path: memory.join("g"),
                controller: Some("memory"),
            },
            ControlDir {
                path: root.path().join("cpu").join("g"),
                controller: Some("cpu"),
            },
        ];
        assert!(Cgroup::create_dirs(CgroupVersion::V1, dirs).is_err());
        assert!(!memory.join("g").exists());
    }

    #[test]
    fn apply_limits_writes_only_configured_files() {
        let root = tempfile::tempdir().expect("tempdir");
        let cg = scratch_group(root.path(), CgroupVersion::V1, 2);
        let limits = ResourceLimits {
            memory_bytes: Some(1024),
            ..ResourceLimits::default()
        };
        cg.apply_limits(&limits).expect("apply");

        let value = std::fs::read_to_string(cg.path().join("memory.limit_in_bytes")).expect("read");
        assert_eq!(value, "1024");
        assert!(!cg.path().join("cpu.cfs_quota_us").exists());
        assert!(!cg.path().join("cpu.cfs_period_us").exists());
        assert!(!cg.path().join("pids.max").exists());
    }

    #[test]
    fn split_hierarchy_routes_writes_by_controller() {
        let root = tempfile::tempdir().expect("tempdir");
        let dirs: Vec<ControlDir> = ["memory", "pids"]
            .into_iter()
            .map(|c| {
                std::fs::create_dir(root.path().join(c)).expect("mkdir");
                ControlDir {
                    path: root.path().join(c).join("g"),
                    controller: Some(c),
                }
            })
            .collect();
        let cg = Cgroup::create_dirs(CgroupVersion::V1, dirs).expect("create");
        let limits = ResourceLimits {
            memory_bytes: Some(4096),
            pids_max: Some(8),
            ..ResourceLimits::default()
        };
        cg.apply_limits(&limits).expect("apply");
        cg.attach_process(42).expect("attach");

        let memory = root.path().join("memory/g");
        let pids = root.path().join("pids/g");
        assert_eq!(std::fs::read_to_string(memory.join("memory.limit_in_bytes")).expect("read"), "4096");
        assert_eq!(std::fs::read_to_string(pids.join("pids.max")).expect("read"), "8");
        assert!(!memory.join("pids.max").exists());
        assert_eq!(std::fs::read_to_string(memory.join("tasks")).expect("read"), "42");
        assert_eq!(std::fs::read_to_string(pids.join("tasks")).expect("read"), "42");
        assert_eq!(cg.paths().count(), 2);
    }

    #[test]
    fn limit_without_controller_hierarchy_is_an_error() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("memory")).expect("mkdir");
        let dirs = vec![ControlDir {
            path: root.path().join("memory/g"),
            controller: Some("memory"),
        }];
        let cg = Cgroup::create_dirs(CgroupVersion::V1, dirs).expect("create");
        let limits = ResourceLimits {
            pids_max: Some(8),
            ..ResourceLimits::default()
        };
        assert!(matches!(
            cg.apply_limits(&limits),
            Err(NsrunError::Unsupported { .. })
        ));
    }

    #[test]
    fn v2_apply_delegates_needed_controllers() {
        let root = tempfile::tempdir().expect("tempdir");
        let cg = scratch_group(root.path(), CgroupVersion::V2, 3);
        assert_eq!(cg.version(), CgroupVersion::V2);

        let limits = ResourceLimits {
            pids_max: Some(8),
            ..ResourceLimits::default()
        };
        cg.apply_limits(&limits).expect("apply");

        let subtree =
            std::fs::read_to_string(root.path().join("cgroup.subtree_control")).expect("read");
        assert_eq!(subtree, "+pids");
        let pids = std::fs::read_to_string(cg.path().join("pids.max")).expect("read");
        assert_eq!(pids, "8");
    }

    #[test]
    fn attach_writes_membership_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let cg = scratch_group(root.path(), CgroupVersion::V1, 4);
        cg.attach_process(777).expect("attach");
        let tasks = std::fs::read_to_string(cg.path().join("tasks")).expect("read");
        assert_eq!(tasks, "777");
    }

    #[test]
    fn attach_to_missing_group_is_attach_error() {
        let root = tempfile::tempdir().expect("tempdir");
        let cg = scratch_group(root.path(), CgroupVersion::V1, 5);
        cg.destroy().expect("destroy");
        assert!(matches!(
            cg.attach_process(1),
            Err(NsrunError::Attach { .. })
        ));
    }

    #[test]
    fn destroy_removes_directory_and_is_idempotent() {
        let root = tempfile::tempdir().expect("tempdir");
        let cg = scratch_group(root.path(), CgroupVersion::V1, 6);
        cg.destroy().expect("destroy");
        assert!(!cg.path().exists());
        cg.destroy().expect("second destroy");
    }
}
