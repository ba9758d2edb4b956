//! # System Interaction Layer
//!
//! This module provides abstractions for interacting with the underlying operating system.
//! It serves as a boundary between the supervisor and the specifics of process
//! management, signal handling and the filesystem.
//!
//! ## Modules
//!
//! - **`process`**: The spawn primitive. A `ProcessHandle` carries a pid and an idempotent
//!   kill switch; an `ExitNotice` resolves exactly once when the child exits.
//! - **`executor`**: The `CommandRunner`, which exposes the pid at spawn time and runs a
//!   caller-supplied failure hook before reporting a non-zero exit.
//! - **`shutdown`**: The process-wide `ShutdownRegistry` that runs cleanup hooks once on
//!   SIGINT, SIGTERM, SIGHUP or an explicit exit.
//! - **`fs_ops`**: Small filesystem helpers for build output directories.

pub mod executor;
pub mod fs_ops;
pub mod process;
pub mod shutdown;
