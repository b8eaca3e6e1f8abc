use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use swapkit_platform::ProcessQuery;

pub const DEFAULT_WAIT_MS: u64 = 500;

/// Waits for a process to exit, then replays an action file.
#[derive(Debug, Clone, Parser)]
#[command(name = "swapkit-executor", version)]
#[command(group(ArgGroup::new("target").required(true).args(["pid", "name"])))]
pub struct ExecutorArgs {
    /// Process id to wait for
    #[arg(long)]
    pub pid: Option<u32>,

    /// Wait for every process whose name contains this text
    #[arg(long)]
    pub name: Option<String>,

    /// Action file to replay
    #[arg(long = "action-file", value_name = "PATH")]
    pub action_file: PathBuf,

    /// Delay in milliseconds between the target exiting and the replay
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_WAIT_MS)]
    pub wait: u64,
}

impl ExecutorArgs {
    #[must_use]
    pub fn target(&self) -> ProcessQuery {
        match (&self.name, self.pid) {
            (Some(name), _) => ProcessQuery::Name(name.clone()),
            (None, pid) => ProcessQuery::Pid(pid.unwrap_or_default()),
        }
    }

    #[must_use]
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait)
    }
}
