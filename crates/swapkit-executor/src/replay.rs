use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, info, warn};
use swapkit_ledger::Action;
use swapkit_platform::HideWindow;

use crate::error::ReplayError;

/// Apply one action to the file system.
pub(crate) fn apply(action: &Action) -> Result<(), ReplayError> {
    match action {
        Action::Start { exe, args } => start(exe, args.as_deref()),
        Action::Move { from, to } => move_file(from, to),
        Action::Copy { from, to } => copy_file(from, to),
        Action::Remove { path } => remove(path),
    }
}

fn start(exe: &Path, args: Option<&str>) -> Result<(), ReplayError> {
    let words = match args {
        Some(args) => shlex::split(args).ok_or_else(|| ReplayError::Arguments(args.to_string()))?,
        None => Vec::new(),
    };

    let child = Command::new(exe)
        .args(&words)
        .stdin(Stdio::null())
        .hide_window()
        .spawn()
        .map_err(|error| ReplayError::io("failed to start", exe, error))?;
    info!("Started {} (pid {})", exe.display(), child.id());
    Ok(())
}

fn move_file(from: &Path, to: &Path) -> Result<(), ReplayError> {
    prepare_destination(to)?;

    if let Err(error) = std::fs::rename(from, to) {
        debug!(
            "Rename {} -> {} failed ({error}), copying instead",
            from.display(),
            to.display()
        );
        std::fs::copy(from, to).map_err(|error| ReplayError::io("failed to copy", from, error))?;
        std::fs::remove_file(from)
            .map_err(|error| ReplayError::io("failed to remove moved file", from, error))?;
    }

    info!("Moved {} -> {}", from.display(), to.display());
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<(), ReplayError> {
    prepare_destination(to)?;
    std::fs::copy(from, to).map_err(|error| ReplayError::io("failed to copy", from, error))?;
    info!("Copied {} -> {}", from.display(), to.display());
    Ok(())
}

fn remove(path: &Path) -> Result<(), ReplayError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            debug!("{} is already gone", path.display());
            return Ok(());
        }
        Err(error) => return Err(ReplayError::io("failed to inspect", path, error)),
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => {
            info!("Removed {}", path.display());
            Ok(())
        }
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(ReplayError::io("failed to remove", path, error)),
    }
}

/// Delete a file already at `to` and make sure its parent exists.
fn prepare_destination(to: &Path) -> Result<(), ReplayError> {
    match std::fs::remove_file(to) {
        Ok(()) => debug!("Deleted existing {}", to.display()),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => {
            warn!("Cannot delete existing {}: {error}", to.display());
            return Err(ReplayError::io("failed to replace", to, error));
        }
    }

    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|error| ReplayError::io("failed to create directory", parent, error))?;
    }
    Ok(())
}
