use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::debug;

/// Probes whether the current user can create files at a location.
///
/// A probe creates and immediately deletes a throwaway file in the nearest
/// existing ancestor directory. Successful directories are remembered, so a
/// probe instance touches each writable directory at most once.
#[derive(Debug, Default)]
pub struct WritePermissionProbe {
    writable_dirs: HashSet<PathBuf>,
}

impl WritePermissionProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a file can be written (or removed) at `file_path`.
    ///
    /// Missing parent directories are accounted for by also probing directory
    /// creation in the closest ancestor that exists.
    pub fn can_write(&mut self, file_path: &Path) -> bool {
        let Some(mut dir) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return false;
        };

        let mut needs_subdir = false;
        while !dir.is_dir() {
            needs_subdir = true;
            match dir.parent() {
                Some(parent) => dir = parent,
                None => return false,
            }
        }

        if self.writable_dirs.contains(dir) {
            return true;
        }

        if let Err(error) = probe_dir(dir, needs_subdir) {
            debug!(
                "Write permission probe failed in {}: {error}",
                dir.display()
            );
            return false;
        }

        self.writable_dirs.insert(dir.to_path_buf());
        true
    }

    #[must_use]
    pub fn is_cached(&self, dir: &Path) -> bool {
        self.writable_dirs.contains(dir)
    }
}

fn probe_dir(dir: &Path, needs_subdir: bool) -> std::io::Result<()> {
    let file = tempfile::Builder::new()
        .prefix(".swapkit-probe")
        .tempfile_in(dir)?;
    file.close()?;

    if needs_subdir {
        let subdir = tempfile::Builder::new()
            .prefix(".swapkit-probe")
            .tempdir_in(dir)?;
        subdir.close()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::WritePermissionProbe;

    #[test]
    fn writable_directory_is_cached_and_left_clean() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let mut probe = WritePermissionProbe::new();

        assert!(probe.can_write(&temp.path().join("target.bin")));
        assert!(probe.is_cached(temp.path()));
        assert!(probe.can_write(&temp.path().join("other.bin")));

        let leftovers = std::fs::read_dir(temp.path())
            .expect("tempdir should be readable")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn missing_parents_probe_the_closest_existing_ancestor() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let mut probe = WritePermissionProbe::new();

        assert!(probe.can_write(&temp.path().join("a/b/c/target.bin")));
        assert!(probe.is_cached(temp.path()));
        assert!(!temp.path().join("a").exists());
    }

    #[test]
    fn bare_file_name_is_not_writable() {
        let mut probe = WritePermissionProbe::new();
        assert!(!probe.can_write(std::path::Path::new("target.bin")));
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_is_not_writable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir should be created");
        let locked = temp.path().join("locked");
        std::fs::create_dir(&locked).expect("locked dir should be created");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555))
            .expect("permissions should be set");

        let mut probe = WritePermissionProbe::new();
        let writable = probe.can_write(&locked.join("target.bin"));
        // root bypasses directory permissions
        let running_as_root = std::fs::File::create(locked.join("root-check")).is_ok();

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755))
            .expect("permissions should be restored");

        assert_eq!(writable, running_as_root);
    }
}
