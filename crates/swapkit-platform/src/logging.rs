#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appending log writer that reopens its file when it was deleted underneath.
struct ReopeningLogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ReopeningLogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = append_to(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    fn with_file<R>(&self, op: impl FnOnce(&mut File) -> io::Result<R>) -> io::Result<R> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if guard.is_none() || !self.path.exists() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            *guard = Some(append_to(&self.path)?);
        }

        match guard.as_mut() {
            Some(file) => op(file),
            None => Err(io::Error::other("log file not available")),
        }
    }
}

impl Write for ReopeningLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(Write::flush)
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Drop the older half of the log once it outgrows `max_log_size`, cutting
/// at a line boundary.
fn trim_log_file(log_path: &Path, max_log_size: u64) {
    if let Ok(metadata) = std::fs::metadata(log_path)
        && metadata.len() > max_log_size
        && let Ok(contents) = std::fs::read(log_path)
    {
        let half = contents.len() / 2;
        let keep_from = contents[half..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(half, |pos| half + pos + 1);
        if let Err(error) = std::fs::write(log_path, &contents[keep_from..]) {
            eprintln!("cannot trim log file {}: {error}", log_path.display());
        }
    }
}

/// Install the global logger for the swapkit crates.
///
/// Records go to `log_file` when one is given and can be opened, trimmed
/// first when `max_log_size` is set. Debug builds also log to the terminal.
/// A missing file sink never stops the caller.
pub fn init_logging(log_file: Option<&Path>, max_log_size: Option<u64>) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("swapkit")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if let Some(log_path) = log_file {
        if let Some(max_log_size) = max_log_size {
            trim_log_file(log_path, max_log_size);
        }
        match ReopeningLogFile::open(log_path.to_path_buf()) {
            Ok(writer) => loggers.push(WriteLogger::new(LevelFilter::Debug, config.clone(), writer)),
            Err(error) => eprintln!("cannot open log file {}: {error}", log_path.display()),
        }
    }

    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Debug,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
}

/// Debug logging records everything; otherwise only warnings and errors.
pub fn set_logging_enabled(enabled: bool) {
    if enabled {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Warn);
    }
}
