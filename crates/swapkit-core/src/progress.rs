/// Progress of a single streaming download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Declared size of the download, `0` when the server did not send one.
    pub total: u64,
    /// Bytes written so far.
    pub done: u64,
}

impl DownloadProgress {
    #[must_use]
    pub const fn new(total: u64, done: u64) -> Self {
        Self { total, done }
    }

    /// Completion ratio in `0.0..=1.0`, or `None` when the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        (self.total > 0).then(|| (self.done as f64 / self.total as f64).min(1.0))
    }
}

/// Callback invoked after every chunk written during a download.
pub type ProgressCallback<'a> = &'a mut (dyn FnMut(DownloadProgress) + Send);
