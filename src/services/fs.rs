use crate::backup::engine::remove_tree;
use crate::error::Result;
use std::io;
use std::path::Path;

/// Destructive directory operations used by retention, cleanup and restore.
pub trait FileSystem: Send + Sync {
    /// Removes `path` recursively. A missing path is not an error.
    fn remove_tree(&self, path: &Path) -> Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

#[derive(Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn remove_tree(&self, path: &Path) -> Result<()> {
        remove_tree(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}
