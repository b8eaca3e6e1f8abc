use std::path::{Path, PathBuf};

pub const LOG_FILE_NAME: &str = "swapkit-executor.log";

/// Log file used for a run replaying `action_file`.
#[must_use]
pub fn log_path_for(action_file: &Path) -> PathBuf {
    action_file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from(LOG_FILE_NAME), |parent| parent.join(LOG_FILE_NAME))
}

/// Install the global logger. Failing to open the log file only drops the
/// file sink; the executor keeps running.
pub fn init_logging(action_file: &Path) {
    swapkit_platform::logging::init_logging(Some(&log_path_for(action_file)), None);
}
