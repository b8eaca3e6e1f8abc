use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind,
};

/// Identifies the process a deferred helper waits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessQuery {
    /// Exact process id.
    Pid(u32),
    /// Any process whose name contains this substring.
    Name(String),
}

impl fmt::Display for ProcessQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid(pid) => write!(f, "pid {pid}"),
            Self::Name(name) => write!(f, "process name containing '{name}'"),
        }
    }
}

#[must_use]
pub fn current_pid() -> u32 {
    std::process::id()
}

/// Snapshot the process table and report whether any process matches
/// `query`. The calling process itself never matches, and neither do zombies
/// waiting to be reaped.
///
/// Names are matched against the executable's file name and the first
/// command-line word as well as the short process name, which Linux
/// truncates to 15 bytes.
#[must_use]
pub fn is_running(query: &ProcessQuery) -> bool {
    let mut system = System::new();
    let own_pid = Pid::from_u32(current_pid());

    match query {
        ProcessQuery::Pid(pid) => {
            let pid = Pid::from_u32(*pid);
            if pid == own_pid {
                return false;
            }
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::new(),
            );
            system.process(pid).is_some_and(is_alive)
        }
        ProcessQuery::Name(name) => {
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::new()
                    .with_exe(UpdateKind::OnlyIfNotSet)
                    .with_cmd(UpdateKind::OnlyIfNotSet),
            );
            system.processes().iter().any(|(pid, process)| {
                *pid != own_pid && is_alive(process) && name_matches(process, name)
            })
        }
    }
}

fn is_alive(process: &Process) -> bool {
    !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

fn name_matches(process: &Process, name: &str) -> bool {
    let contains = |candidate: &OsStr| candidate.to_string_lossy().contains(name);

    contains(process.name())
        || process
            .exe()
            .and_then(Path::file_name)
            .is_some_and(contains)
        || process
            .cmd()
            .first()
            .and_then(|word| Path::new(word).file_name())
            .is_some_and(contains)
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    use std::path::Path;
    #[cfg(unix)]
    use std::process::{Child, Command, Stdio};

    use super::{ProcessQuery, current_pid, is_running};

    /// Start `program 30`, retrying while a freshly copied binary is still
    /// held open for writing by a concurrent fork.
    #[cfg(unix)]
    fn spawn_sleeper(program: &Path) -> Child {
        for _ in 0..50 {
            match Command::new(program)
                .arg("30")
                .stdout(Stdio::null())
                .spawn()
            {
                Ok(child) => return child,
                Err(error) if error.kind() == std::io::ErrorKind::ExecutableFileBusy => {
                    std::thread::sleep(std::time::Duration::from_millis(20));
                }
                Err(error) => panic!("sleeper should start: {error}"),
            }
        }
        panic!("sleeper binary stayed busy");
    }

    #[test]
    fn own_process_never_matches() {
        assert!(!is_running(&ProcessQuery::Pid(current_pid())));
    }

    #[test]
    fn exited_child_is_not_running() {
        let mut child = std::process::Command::new(std::env::current_exe().expect("test exe"))
            .arg("--list")
            .stdout(std::process::Stdio::null())
            .spawn()
            .expect("child process should start");
        let pid = child.id();
        child.wait().expect("child should exit");

        assert!(!is_running(&ProcessQuery::Pid(pid)));
    }

    #[test]
    fn unknown_name_is_not_running() {
        assert!(!is_running(&ProcessQuery::Name(
            "swapkit-no-such-process-name-7f3a".to_string()
        )));
    }

    #[cfg(unix)]
    #[test]
    fn running_child_matches_by_pid() {
        let mut child = spawn_sleeper(Path::new("/bin/sleep"));
        let pid = child.id();

        assert!(is_running(&ProcessQuery::Pid(pid)));

        child.kill().expect("child should be killed");
        child.wait().expect("child should be reaped");
        assert!(!is_running(&ProcessQuery::Pid(pid)));
    }

    #[cfg(unix)]
    #[test]
    fn long_executable_name_matches_past_the_short_name() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let long_name = temp_dir.path().join("swapkit-long-named-updater-target");
        std::fs::copy("/bin/sleep", &long_name).expect("sleep should be copied");
        let mut child = spawn_sleeper(&long_name);

        let matched = is_running(&ProcessQuery::Name("updater-target".to_string()));

        child.kill().expect("child should be killed");
        child.wait().expect("child should be reaped");
        assert!(matched, "a name past the 15th character should match");
        assert!(!is_running(&ProcessQuery::Name(
            "swapkit-long-named-updater-target".to_string()
        )));
    }

    #[test]
    fn query_display_names_the_target() {
        assert_eq!(ProcessQuery::Pid(12).to_string(), "pid 12");
        assert_eq!(
            ProcessQuery::Name("app".to_string()).to_string(),
            "process name containing 'app'"
        );
    }
}
