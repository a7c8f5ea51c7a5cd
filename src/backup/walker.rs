use crate::error::{Error, IoContext, Result};
use std::fs::{self, Permissions};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Path relative to the walk root, never empty.
    pub relative_path: PathBuf,
    pub kind: EntryKind,
    pub permissions: Permissions,
}

/// Lazily enumerates everything below a root directory. A directory is always yielded
/// before its contents and symlinks are reported as links, not followed. Sockets, fifos
/// and device nodes are reported as errors.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
}

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Each call re-reads the filesystem.
    pub fn entries(&self) -> impl Iterator<Item = Result<WalkEntry>> + '_ {
        WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .map(move |entry| {
                let entry = entry.map_err(|source| Error::Walk {
                    root: self.root.clone(),
                    source,
                })?;
                let metadata = entry.metadata().map_err(|source| Error::Walk {
                    root: self.root.clone(),
                    source,
                })?;

                let file_type = entry.file_type();
                let kind = if file_type.is_symlink() {
                    EntryKind::Symlink
                } else if file_type.is_dir() {
                    EntryKind::Directory
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    // fifos and devices would block or never end when read
                    return Err(Error::UnsupportedFileType {
                        path: entry.path().to_path_buf(),
                    });
                };

                let relative_path = entry
                    .path()
                    .strip_prefix(&self.root)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| PathBuf::from(entry.file_name()));

                Ok(WalkEntry {
                    relative_path,
                    kind,
                    permissions: metadata.permissions(),
                })
            })
    }
}

pub fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Creates `dir` and any missing parents with mode 0755. Existing directories are left alone.
pub fn create_if_not_exists(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder
        .create(dir)
        .context("failed to create directory", dir)
}

/// Recreates the link at `src` as `dst`, pointing at the same target.
pub fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).context("failed to read link", src)?;

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, dst).context("failed to create link", dst)
    }

    #[cfg(windows)]
    {
        let resolved = src.parent().map(|p| p.join(&target)).unwrap_or_else(|| target.clone());
        if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(&target, dst).context("failed to create link", dst)
        } else {
            std::os::windows::fs::symlink_file(&target, dst).context("failed to create link", dst)
        }
    }
}

pub fn apply_permissions(path: &Path, permissions: Permissions) -> Result<()> {
    fs::set_permissions(path, permissions).context("failed to set permissions on", path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn parents_come_before_children() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().join("save00");
        fs::create_dir_all(root.join("persistent/flags")).expect("mkdirs");
        fs::write(root.join("persistent/flags/a"), b"a").expect("write");
        fs::write(root.join("player.xml"), b"p").expect("write");

        let walker = DirectoryWalker::new(&root);
        let entries: Vec<(PathBuf, EntryKind)> = walker
            .entries()
            .map(|e| e.expect("entry"))
            .map(|e| (e.relative_path, e.kind))
            .collect();

        assert_eq!(
            entries,
            vec![
                (PathBuf::from("persistent"), EntryKind::Directory),
                (PathBuf::from("persistent/flags"), EntryKind::Directory),
                (PathBuf::from("persistent/flags/a"), EntryKind::File),
                (PathBuf::from("player.xml"), EntryKind::File),
            ]
        );
    }

    #[test]
    fn walking_twice_rereads_the_tree() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("one"), b"1").expect("write");

        let walker = DirectoryWalker::new(dir.path());
        assert_eq!(walker.entries().count(), 1);

        fs::write(dir.path().join("two"), b"2").expect("write");
        assert_eq!(walker.entries().count(), 2);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let walker = DirectoryWalker::new(dir.path().join("missing"));

        let first = walker.entries().next().expect("one item");
        assert!(matches!(first, Err(Error::Walk { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("real")).expect("mkdirs");
        fs::write(root.join("real/file"), b"x").expect("write");
        std::os::unix::fs::symlink("real", root.join("link")).expect("symlink");

        let kinds: Vec<(PathBuf, EntryKind)> = DirectoryWalker::new(&root)
            .entries()
            .map(|e| e.expect("entry"))
            .map(|e| (e.relative_path, e.kind))
            .collect();

        assert_eq!(
            kinds,
            vec![
                (PathBuf::from("link"), EntryKind::Symlink),
                (PathBuf::from("real"), EntryKind::Directory),
                (PathBuf::from("real/file"), EntryKind::File),
            ]
        );

        let copy = dir.path().join("copy");
        copy_symlink(&root.join("link"), &copy).expect("copy link");
        assert_eq!(fs::read_link(&copy).expect("read link"), PathBuf::from("real"));
    }

    #[cfg(unix)]
    #[test]
    fn special_files_are_rejected() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("a.xml"), b"a").expect("write");
        let socket = dir.path().join("b.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket).expect("bind");
        fs::write(dir.path().join("c.xml"), b"c").expect("write");

        let results: Vec<Result<WalkEntry>> = DirectoryWalker::new(dir.path()).entries().collect();

        assert_eq!(results.len(), 3);
        assert!(matches!(&results[0], Ok(e) if e.kind == EntryKind::File));
        match &results[1] {
            Err(Error::UnsupportedFileType { path }) => assert_eq!(*path, socket),
            other => panic!("expected unsupported file type, got {:?}", other),
        }
        assert!(matches!(&results[2], Ok(e) if e.kind == EntryKind::File));
    }

    #[cfg(unix)]
    #[test]
    fn fifo_is_rejected_instead_of_queued() {
        let dir = tempdir().expect("tempdir");
        let fifo = dir.path().join("pipe");
        let made = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .map(|status| status.success())
            .unwrap_or(false);
        if !made {
            return;
        }

        let first = DirectoryWalker::new(dir.path()).entries().next().expect("one entry");
        assert!(matches!(first, Err(Error::UnsupportedFileType { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn created_directories_use_0755() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("a/b");
        create_if_not_exists(&target).expect("create");
        create_if_not_exists(&target).expect("create again");

        let mode = fs::metadata(&target).expect("metadata").permissions().mode() & 0o777;
        // umask may only clear bits
        assert_eq!(mode & !DIR_MODE, 0);
        assert!(target.is_dir());
    }
}
