use std::borrow::Cow;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, warn};
use swapkit_platform::{AppPaths, ElevationError, HideWindow, current_pid, elevated_command};
use thiserror::Error;

use crate::ledger::ActionLedger;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("the ledger has no actions to replay")]
    EmptyLedger,
    #[error("helper file name '{0}' is not a plain file name")]
    InvalidHelperName(String),
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Elevation(#[from] ElevationError),
}

impl LaunchError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The deferred executor program to start.
#[derive(Debug, Clone)]
pub enum HelperExecutable {
    /// An executor binary already on disk, e.g. shipped next to the app.
    Path(PathBuf),
    /// An executor binary embedded in the application.
    Bytes {
        file_name: String,
        bytes: Cow<'static, [u8]>,
    },
}

impl HelperExecutable {
    fn file_name(&self) -> Result<OsString, LaunchError> {
        let name = match self {
            Self::Path(path) => path.file_name().map(ToOwned::to_owned),
            Self::Bytes { file_name, .. } => {
                let path = Path::new(file_name);
                (path.components().count() == 1)
                    .then(|| path.file_name().map(ToOwned::to_owned))
                    .flatten()
            }
        };
        name.ok_or_else(|| {
            let shown = match self {
                Self::Path(path) => path.display().to_string(),
                Self::Bytes { file_name, .. } => file_name.clone(),
            };
            LaunchError::InvalidHelperName(shown)
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Process to wait for; the calling process when `None`.
    pub wait_for_pid: Option<u32>,
    /// Extra delay between the target exiting and the replay starting.
    pub delay: Option<Duration>,
    /// Nests the helper working directory under this name in the temp dir.
    pub sub_directory: Option<String>,
}

impl LaunchOptions {
    #[must_use]
    pub fn with_wait_for_pid(mut self, pid: u32) -> Self {
        self.wait_for_pid = Some(pid);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_sub_directory(mut self, sub_directory: impl Into<String>) -> Self {
        self.sub_directory = Some(sub_directory.into());
        self
    }
}

/// A running deferred executor.
#[derive(Debug)]
pub struct LaunchHandle {
    child: Child,
    action_file: PathBuf,
}

impl LaunchHandle {
    /// Process id of the launched helper (or of the elevation wrapper).
    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    #[must_use]
    pub fn action_file(&self) -> &Path {
        &self.action_file
    }

    /// Block until the helper exits.
    ///
    /// # Errors
    /// Returns the I/O error reported while waiting on the child.
    pub fn wait_for_exit(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait()
    }

    /// # Errors
    /// Returns the I/O error reported while polling the child.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }
}

impl ActionLedger {
    /// Place the helper and the action file in the helper working directory
    /// and start the helper, elevated when any target needs it.
    ///
    /// The caller is expected to exit soon after; from here on the action
    /// file and the files it names belong to the helper.
    ///
    /// # Errors
    /// Returns [`LaunchError`] when the ledger is empty, the helper or action
    /// file cannot be written, or the process cannot be started.
    pub fn launch(
        &self,
        helper: &HelperExecutable,
        options: &LaunchOptions,
    ) -> Result<LaunchHandle, LaunchError> {
        if self.is_empty() {
            return Err(LaunchError::EmptyLedger);
        }

        let work_dir = AppPaths::helper_dir(options.sub_directory.as_deref());
        std::fs::create_dir_all(&work_dir).map_err(|error| {
            LaunchError::io("failed to create helper directory", &work_dir, error)
        })?;

        let helper_path = install_helper(helper, &work_dir)?;
        let action_file = self.write_temp_action_file(&work_dir)?;

        let pid = options.wait_for_pid.unwrap_or_else(current_pid);
        let mut args: Vec<OsString> = vec![
            "--pid".into(),
            pid.to_string().into(),
            "--action-file".into(),
            action_file.clone().into_os_string(),
        ];
        if let Some(delay) = options.delay {
            args.push("--wait".into());
            args.push(delay.as_millis().to_string().into());
        }

        let mut cmd = if self.needs_elevation() {
            info!("Launching helper with elevated rights");
            elevated_command(&helper_path, &args)?
        } else {
            let mut cmd = Command::new(&helper_path);
            cmd.args(&args);
            cmd
        };
        cmd.stdin(Stdio::null()).hide_window();

        let child = cmd
            .spawn()
            .map_err(|error| LaunchError::io("failed to start helper", &helper_path, error))?;
        info!(
            "Started helper {} (pid {}) waiting on pid {pid}",
            helper_path.display(),
            child.id()
        );

        Ok(LaunchHandle { child, action_file })
    }

    fn write_temp_action_file(&self, dir: &Path) -> Result<PathBuf, LaunchError> {
        let mut file = tempfile::Builder::new()
            .prefix("actions-")
            .suffix(".txt")
            .tempfile_in(dir)
            .map_err(|error| LaunchError::io("failed to create action file", dir, error))?;
        file.write_all(self.serialize().as_bytes())
            .and_then(|()| file.flush())
            .map_err(|error| LaunchError::io("failed to write action file", file.path(), error))?;

        let path = file
            .into_temp_path()
            .keep()
            .map_err(|error| LaunchError::io("failed to keep action file", dir, error.error))?;
        debug!("Wrote {} action(s) to {}", self.len(), path.display());
        Ok(path)
    }
}

fn install_helper(helper: &HelperExecutable, work_dir: &Path) -> Result<PathBuf, LaunchError> {
    let target = work_dir.join(helper.file_name()?);

    match helper {
        HelperExecutable::Path(source) if source == &target => {}
        HelperExecutable::Path(source) => {
            std::fs::copy(source, &target)
                .map_err(|error| LaunchError::io("failed to copy helper", source, error))?;
        }
        HelperExecutable::Bytes { bytes, .. } => {
            std::fs::write(&target, bytes)
                .map_err(|error| LaunchError::io("failed to write helper", &target, error))?;
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))
            .map_err(|error| LaunchError::io("failed to make helper executable", &target, error))?;
    }

    Ok(target)
}

/// Remove the helper working directory left behind by an earlier launch.
/// Returns true when a directory was removed.
pub fn clean_previous_helper(sub_directory: Option<&str>) -> bool {
    let dir = AppPaths::helper_dir(sub_directory);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => {
            info!("Removed previous helper directory {}", dir.display());
            true
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => false,
        Err(error) => {
            warn!(
                "Failed to remove previous helper directory {}: {error}",
                dir.display()
            );
            false
        }
    }
}
