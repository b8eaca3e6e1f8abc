use std::path::{Path, PathBuf};

use log::{debug, warn};
use swapkit_platform::WritePermissionProbe;

use crate::action::{Action, render_action_file};

/// Ordered list of file and process operations to apply once the current
/// process has exited.
///
/// Every `add_*` call validates its input and returns `false` without
/// recording anything when the action could not be replayed.
#[derive(Debug, Default)]
pub struct ActionLedger {
    actions: Vec<Action>,
    needs_elevation: bool,
    probe: WritePermissionProbe,
}

impl ActionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the existing file `from` to `to`, replacing any file there.
    pub fn add_move(&mut self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> bool {
        let Some((from, to)) = transfer_paths("move", from.as_ref(), to.as_ref()) else {
            return false;
        };
        self.push(Action::Move { from, to });
        true
    }

    /// Copy the existing file `from` to `to`, replacing any file there.
    pub fn add_copy(&mut self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> bool {
        let Some((from, to)) = transfer_paths("copy", from.as_ref(), to.as_ref()) else {
            return false;
        };
        self.push(Action::Copy { from, to });
        true
    }

    /// Remove an existing file or directory tree.
    pub fn add_remove(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Not recording remove: {} does not exist", path.display());
            return false;
        }
        let Some(path) = representable_path(path) else {
            return false;
        };
        self.push(Action::Remove { path });
        true
    }

    /// Start `exe` once the other actions are done. `exe` may be a bare
    /// program name resolved through `PATH`, so it does not need to exist yet.
    pub fn add_start(&mut self, exe: impl AsRef<Path>, args: Option<&str>) -> bool {
        let exe = exe.as_ref();
        if exe.as_os_str().is_empty() {
            warn!("Not recording start: empty executable path");
            return false;
        }

        let exe = if exe.components().count() > 1 {
            match representable_path(exe) {
                Some(exe) => exe,
                None => return false,
            }
        } else {
            match exe.to_str().filter(|s| is_representable(s)) {
                Some(_) => exe.to_path_buf(),
                None => {
                    warn!("Not recording start: unsupported executable name {}", exe.display());
                    return false;
                }
            }
        };

        let args = args.filter(|args| !args.trim().is_empty());
        if let Some(args) = args
            && !is_representable(args)
        {
            warn!("Not recording start: arguments contain a tab or line break");
            return false;
        }

        self.push(Action::Start {
            exe,
            args: args.map(str::to_string),
        });
        true
    }

    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// True once any recorded target lies in a location the current user
    /// cannot write to.
    #[must_use]
    pub fn needs_elevation(&self) -> bool {
        self.needs_elevation
    }

    /// Render the action file content.
    #[must_use]
    pub fn serialize(&self) -> String {
        render_action_file(&self.actions)
    }

    /// Write the action file to `path`, replacing an existing file.
    ///
    /// # Errors
    /// Returns the underlying I/O error when the file cannot be written.
    pub fn write_action_file(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.serialize())
    }

    fn push(&mut self, action: Action) {
        if let Some(target) = action.target()
            && !self.needs_elevation
            && !self.probe.can_write(target)
        {
            debug!(
                "{} is not writable by the current user, elevation required",
                target.display()
            );
            self.needs_elevation = true;
        }

        debug!("Recorded action: {action}");
        self.actions.push(action);
    }
}

fn transfer_paths(kind: &str, from: &Path, to: &Path) -> Option<(PathBuf, PathBuf)> {
    if !from.is_file() {
        warn!("Not recording {kind}: source {} is not a file", from.display());
        return None;
    }
    if to.as_os_str().is_empty() {
        warn!("Not recording {kind}: empty destination");
        return None;
    }
    Some((representable_path(from)?, representable_path(to)?))
}

fn is_representable(value: &str) -> bool {
    !value.contains(['\t', '\n', '\r'])
}

fn representable_path(path: &Path) -> Option<PathBuf> {
    let absolute = match std::path::absolute(path) {
        Ok(absolute) => absolute,
        Err(error) => {
            warn!("Cannot resolve {}: {error}", path.display());
            return None;
        }
    };

    if absolute.to_str().is_some_and(is_representable) {
        Some(absolute)
    } else {
        warn!(
            "{} cannot be stored in an action file",
            absolute.display()
        );
        None
    }
}
