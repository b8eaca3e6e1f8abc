//! Platform helpers shared by the swapkit crates.
//!
//! - Per-user application directories.
//! - The shared file and terminal logger.
//! - Command adapters (hidden console windows, elevated execution).
//! - Process table queries used while waiting for a process to exit.
//! - Write-permission probing for ledger destinations.

mod commands;
pub mod logging;
mod paths;
mod permissions;
mod process;

pub use commands::{ElevationError, HideWindow, elevated_command};
pub use paths::{AppPaths, AppPathsError};
pub use permissions::WritePermissionProbe;
pub use process::{ProcessQuery, current_pid, is_running};
