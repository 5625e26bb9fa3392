//! # nsrun-core
//!
//! Low-level Linux isolation primitives for the nsrun runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: the per-container descriptor and the PID, UTS,
//!   mount, and network namespace set requested at clone time.
//! - **Cgroups**: group creation, ordered limit writes, process
//!   attachment, and removal, on unified or legacy hierarchies.
//! - **Filesystem**: switching the container root with `chroot`.
//! - **Network**: bridge, veth pair, and in-namespace address setup
//!   through a validated link-management command layer.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod network;
