//! Deferred file operations for replacing a running application.
//!
//! An [`ActionLedger`] records moves, copies, removals and program starts,
//! serializes them to a tab-separated action file and launches the
//! `swapkit-executor` helper, which replays the file once the application has
//! exited.

mod action;
mod launch;
mod ledger;

pub use action::{
    Action, ActionParseError, InvalidAction, action_lines, parse_action_file, render_action_file,
};
pub use launch::{HelperExecutable, LaunchError, LaunchHandle, LaunchOptions, clean_previous_helper};
pub use ledger::ActionLedger;
