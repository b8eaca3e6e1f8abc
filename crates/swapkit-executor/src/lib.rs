//! Deferred executor: waits for an application to exit, then replays the
//! action file it left behind.

mod args;
mod error;
pub mod logging;
mod replay;

use std::fmt;
use std::time::Duration;

use log::{debug, error, info};
use swapkit_ledger::action_lines;
use swapkit_platform::{ProcessQuery, is_running};

pub use args::{DEFAULT_WAIT_MS, ExecutorArgs};
pub use error::{ExecutorError, ReplayError};

/// Interval between two looks at the process table.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    WaitingForTarget,
    Replaying,
    Done,
    Failed,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitingForTarget => "waiting for target",
            Self::Replaying => "replaying",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One run of the executor, from waiting to the final state.
#[derive(Debug)]
pub struct Executor {
    args: ExecutorArgs,
    state: ExecutorState,
    applied: usize,
}

impl Executor {
    /// # Errors
    /// Returns [`ExecutorError::MissingActionFile`] when the action file does
    /// not exist.
    pub fn new(args: ExecutorArgs) -> Result<Self, ExecutorError> {
        if !args.action_file.is_file() {
            return Err(ExecutorError::MissingActionFile(args.action_file));
        }
        Ok(Self {
            args,
            state: ExecutorState::WaitingForTarget,
            applied: 0,
        })
    }

    #[must_use]
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Number of actions applied so far.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Wait for the target, replay every action and delete the action file.
    ///
    /// # Errors
    /// Returns the first failure; the action file is then left in place and
    /// the state is [`ExecutorState::Failed`].
    pub async fn run(&mut self) -> Result<(), ExecutorError> {
        let result = self.drive().await;
        match &result {
            Ok(()) => self.transition(ExecutorState::Done),
            Err(error) => {
                error!("{error}");
                self.transition(ExecutorState::Failed);
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<(), ExecutorError> {
        wait_for_exit(&self.args.target()).await;
        if !self.args.wait().is_zero() {
            debug!("Waiting {} ms before replaying", self.args.wait);
            tokio::time::sleep(self.args.wait()).await;
        }

        self.transition(ExecutorState::Replaying);
        self.replay()?;

        let path = &self.args.action_file;
        std::fs::remove_file(path).map_err(|source| ExecutorError::RemoveActionFile {
            path: path.clone(),
            source,
        })?;
        info!(
            "Applied {} action(s), removed {}",
            self.applied,
            path.display()
        );
        Ok(())
    }

    fn replay(&mut self) -> Result<(), ExecutorError> {
        let path = &self.args.action_file;
        let content =
            std::fs::read_to_string(path).map_err(|source| ExecutorError::ReadActionFile {
                path: path.clone(),
                source,
            })?;

        for (line, parsed) in action_lines(&content) {
            let action = parsed.map_err(|parse_error| ExecutorError::ReplayFailed {
                line,
                action: content
                    .lines()
                    .nth(line - 1)
                    .unwrap_or_default()
                    .to_string(),
                source: ReplayError::Parse(parse_error.reason),
            })?;

            debug!("Line {line}: {action}");
            replay::apply(&action).map_err(|source| ExecutorError::ReplayFailed {
                line,
                action: action.to_string(),
                source,
            })?;
            self.applied += 1;
        }
        Ok(())
    }

    fn transition(&mut self, next: ExecutorState) {
        debug!("Executor state: {} -> {next}", self.state);
        self.state = next;
    }
}

/// Poll the process table until nothing matches `target`.
pub async fn wait_for_exit(target: &ProcessQuery) {
    info!("Waiting for {target} to exit");
    while is_running(target) {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    info!("{target} is no longer running");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{Executor, ExecutorArgs, ExecutorError, ExecutorState, ReplayError};

    fn args_for(action_file: PathBuf) -> ExecutorArgs {
        ExecutorArgs {
            pid: Some(std::process::id()),
            name: None,
            action_file,
            wait: 0,
        }
    }

    #[test]
    fn missing_action_file_is_rejected_up_front() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let result = Executor::new(args_for(temp.path().join("missing.txt")));
        assert!(matches!(result, Err(ExecutorError::MissingActionFile(_))));
    }

    #[tokio::test]
    async fn successful_replay_deletes_the_action_file() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let victim = temp.path().join("old.txt");
        std::fs::write(&victim, b"old").expect("write victim");
        let action_file = temp.path().join("actions.txt");
        std::fs::write(
            &action_file,
            format!("\nremove\t{}\n\nremove\t{}\n", victim.display(), victim.display()),
        )
        .expect("write action file");

        let mut executor = Executor::new(args_for(action_file.clone())).expect("executor");
        assert_eq!(executor.state(), ExecutorState::WaitingForTarget);
        executor.run().await.expect("replay should succeed");

        assert_eq!(executor.state(), ExecutorState::Done);
        assert_eq!(executor.applied(), 2);
        assert!(!victim.exists());
        assert!(!action_file.exists());
    }

    #[tokio::test]
    async fn unknown_line_stops_the_replay_and_keeps_the_file() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let first = temp.path().join("first.txt");
        let second = temp.path().join("second.txt");
        std::fs::write(&first, b"1").expect("write first");
        std::fs::write(&second, b"2").expect("write second");
        let action_file = temp.path().join("actions.txt");
        std::fs::write(
            &action_file,
            format!(
                "remove\t{}\nchmod\t{}\nremove\t{}\n",
                first.display(),
                second.display(),
                second.display()
            ),
        )
        .expect("write action file");

        let mut executor = Executor::new(args_for(action_file.clone())).expect("executor");
        let error = executor.run().await.expect_err("unknown action should fail");

        match error {
            ExecutorError::ReplayFailed {
                line,
                action,
                source: ReplayError::Parse(_),
            } => {
                assert_eq!(line, 2);
                assert!(action.starts_with("chmod\t"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(executor.state(), ExecutorState::Failed);
        assert_eq!(executor.applied(), 1);
        assert!(!first.exists());
        assert!(second.exists());
        assert!(action_file.exists());
    }
}
