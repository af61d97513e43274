//! Host filesystem collaborator.
//!
//! `make_dirs` reports exactly which directories it created, outermost first,
//! so the caller can trace them and uninstall can remove only those.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

pub trait HostFs {
    /// Create `path` and any missing ancestors, returning the ones created
    fn make_dirs(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl HostFs for LocalFs {
    fn make_dirs(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        make_dirs_list(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "directory already gone");
                Ok(())
            }
            other => other,
        }
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }
}

/// `create_dir_all` that returns the directories it actually created.
pub fn make_dirs_list(path: &Path) -> io::Result<Vec<PathBuf>> {
    let missing: Vec<PathBuf> = path
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect();

    let mut created = Vec::with_capacity(missing.len());
    for dir in missing.into_iter().rev() {
        match fs::create_dir(&dir) {
            Ok(()) => created.push(dir),
            // lost a race with another creator; not ours to trace
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}
