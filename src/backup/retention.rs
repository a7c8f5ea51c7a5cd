use crate::error::{Error, IoContext, Result};
use crate::logring::StatusSink;
use crate::services::fs::FileSystem;
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Backup directory names, e.g. `2024-03-09-18-05-42`.
pub const TIME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
pub const MAX_BACKUPS_TO_KEEP: i32 = 64;
pub const DEFAULT_BACKUPS_TO_KEEP: i32 = 16;

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIME_FORMAT).to_string()
}

/// Strict parse: the name must round-trip through [`TIME_FORMAT`] unchanged.
pub fn parse_timestamp(name: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(name, TIME_FORMAT)
        .ok()
        .filter(|parsed| format_timestamp(parsed) == name)
        .ok_or_else(|| Error::InvalidBackupName {
            name: name.to_string(),
        })
}

pub fn backup_path(dest_root: &Path, timestamp: &NaiveDateTime) -> PathBuf {
    dest_root.join(format_timestamp(timestamp))
}

/// Every backup directory under `dest_root`, oldest first. Plain files are ignored,
/// a directory with any other name fails the whole listing.
pub fn list_backups(dest_root: &Path) -> Result<Vec<NaiveDateTime>> {
    if !dest_root.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in fs::read_dir(dest_root).context("failed to read backup directory", dest_root)? {
        let entry = entry.context("failed to read backup directory", dest_root)?;
        let path = entry.path();
        let metadata = fs::metadata(&path).context("failed to stat", &path)?;
        if !metadata.is_dir() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_str().ok_or_else(|| Error::InvalidBackupName {
            name: name.to_string_lossy().into_owned(),
        })?;
        backups.push(parse_timestamp(name)?);
    }

    backups.sort();
    Ok(backups)
}

/// Deletes the oldest backups until at most `keep_count` remain. Stops at the first
/// deletion that fails.
pub fn prune_oldest(
    sorted: &[NaiveDateTime],
    dest_root: &Path,
    keep_count: i32,
    filesystem: &dyn FileSystem,
    sink: &dyn StatusSink,
) -> Result<usize> {
    if keep_count <= 0 {
        return Err(Error::InvalidKeepCount(keep_count));
    }

    let to_remove = sorted.len().saturating_sub(keep_count as usize);
    remove_oldest(sorted, dest_root, to_remove, filesystem, sink)
}

/// Prunes so that, once one more backup is added, exactly `max_to_keep` remain.
pub fn make_room(
    sorted: &[NaiveDateTime],
    dest_root: &Path,
    max_to_keep: i32,
    filesystem: &dyn FileSystem,
    sink: &dyn StatusSink,
) -> Result<usize> {
    if max_to_keep <= 0 {
        return Err(Error::InvalidKeepCount(max_to_keep));
    }

    let to_remove = (sorted.len() + 1).saturating_sub(max_to_keep as usize);
    remove_oldest(sorted, dest_root, to_remove, filesystem, sink)
}

/// Invalid configured values fall back to the hard ceiling.
pub fn effective_max_backups(configured: i32) -> i32 {
    if configured <= 0 || configured > MAX_BACKUPS_TO_KEEP {
        MAX_BACKUPS_TO_KEEP
    } else {
        configured
    }
}

fn remove_oldest(
    sorted: &[NaiveDateTime],
    dest_root: &Path,
    count: usize,
    filesystem: &dyn FileSystem,
    sink: &dyn StatusSink,
) -> Result<usize> {
    for (removed, timestamp) in sorted.iter().take(count).enumerate() {
        let folder = backup_path(dest_root, timestamp);
        sink.info(format!("removing backup folder: {}", folder.display()));
        if let Err(e) = filesystem.remove_tree(&folder) {
            sink.error(format!("failure deleting backups: {}", e));
            log::debug!("{} of {} backups removed before failure", removed, count);
            return Err(e);
        }
    }
    Ok(count.min(sorted.len()))
}
