use swapkit_platform::AppPaths;
use swapkit_platform::logging::{init_logging as install, set_logging_enabled};

/// Log to the per-user log file, trimmed to `max_log_size`, at debug or
/// warning level.
pub fn init_logging(debug_enabled: bool, max_log_size: u64) {
    let log_path = AppPaths::new().ok().and_then(|paths| match paths.ensure_dirs() {
        Ok(()) => Some(paths.log_file()),
        Err(error) => {
            eprintln!("cannot create application directories: {error}");
            None
        }
    });

    install(log_path.as_deref(), Some(max_log_size));
    set_logging_enabled(debug_enabled);
}
