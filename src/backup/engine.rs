use crate::backup::walker::{
    apply_permissions, copy_symlink, create_if_not_exists, DirectoryWalker, EntryKind,
};
use crate::error::{Error, IoContext, Result};
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::fs::{self, File, Permissions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const MAX_WORKERS: usize = 32;
pub const DEFAULT_WORKERS: usize = 4;

/// One file to copy. Directories never become jobs.
#[derive(Debug)]
pub struct CopyJob {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub permissions: Permissions,
}

/// Directory and file totals for one operation, shared by the producer and every worker.
#[derive(Debug, Default)]
pub struct CopyCounters {
    dirs: AtomicUsize,
    files: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CopyStats {
    pub dirs: usize,
    pub files: usize,
}

impl CopyCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CopyStats {
        CopyStats {
            dirs: self.dirs.load(Ordering::SeqCst),
            files: self.files.load(Ordering::SeqCst),
        }
    }

    pub fn reset(&self) {
        self.dirs.store(0, Ordering::SeqCst);
        self.files.store(0, Ordering::SeqCst);
    }

    fn add_dir(&self) {
        self.dirs.fetch_add(1, Ordering::SeqCst);
    }

    fn add_file(&self) {
        self.files.fetch_add(1, Ordering::SeqCst);
    }
}

/// Copies a directory tree with a fixed number of workers.
#[derive(Debug, Clone, Copy)]
pub struct CopyEngine {
    workers: usize,
}

impl CopyEngine {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 || workers > MAX_WORKERS {
            return Err(Error::InvalidWorkerCount {
                requested: workers,
                max: MAX_WORKERS,
            });
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Mirrors everything below `src` into the existing directory `dst`.
    ///
    /// The walk runs on the calling thread and queues file jobs for the pool. A worker
    /// quits on its first failure; the call returns only after every worker is done and
    /// then reports all failures together.
    pub fn copy_tree(&self, src: &Path, dst: &Path, counters: &CopyCounters) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("copy-worker-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("cannot start copy workers: {}", e)))?;

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<CopyJob>();
        let (err_tx, err_rx) = crossbeam_channel::unbounded::<Error>();
        let mut deferred_dirs = Vec::new();

        pool.in_place_scope(|scope| {
            for _ in 0..self.workers {
                let jobs = job_rx.clone();
                let errs = err_tx.clone();
                scope.spawn(move |_| worker(jobs, errs, counters));
            }
            drop(job_rx);

            // job_tx is dropped on return, which closes the queue
            if let Err(e) = hydrate(src, dst, job_tx, counters, &mut deferred_dirs) {
                let _ = err_tx.send(e);
            }
        });
        drop(err_tx);

        let errors: Vec<Error> = err_rx.iter().collect();
        if !errors.is_empty() {
            return Err(Error::Workers {
                count: errors.len(),
                messages: errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        // deepest first, so a read-only directory is locked only after its children
        for (dir, permissions) in deferred_dirs.into_iter().rev() {
            apply_permissions(&dir, permissions)?;
        }

        Ok(())
    }
}

/// Producer: walks `src`, creates directories and links directly and queues files.
fn hydrate(
    src: &Path,
    dst: &Path,
    jobs: Sender<CopyJob>,
    counters: &CopyCounters,
    deferred_dirs: &mut Vec<(PathBuf, Permissions)>,
) -> Result<()> {
    let walker = DirectoryWalker::new(src);
    for entry in walker.entries() {
        let entry = entry?;
        let src_path = src.join(&entry.relative_path);
        let dst_path = dst.join(&entry.relative_path);

        match entry.kind {
            EntryKind::Directory => {
                create_if_not_exists(&dst_path)?;
                deferred_dirs.push((dst_path, entry.permissions));
                counters.add_dir();
            }
            EntryKind::Symlink => {
                copy_symlink(&src_path, &dst_path)?;
                counters.add_file();
            }
            EntryKind::File => {
                let job = CopyJob {
                    src: src_path,
                    dst: dst_path,
                    permissions: entry.permissions,
                };
                if jobs.send(job).is_err() {
                    // every worker has already failed and reported
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

fn worker(jobs: Receiver<CopyJob>, errs: Sender<Error>, counters: &CopyCounters) {
    for job in jobs.iter() {
        if let Err(e) = copy_file(&job) {
            let _ = errs.send(e);
            return;
        }
        counters.add_file();
    }
}

fn copy_file(job: &CopyJob) -> Result<u64> {
    let mut input = File::open(&job.src).context("cannot open", &job.src)?;
    let mut output = File::create(&job.dst).context("cannot create", &job.dst)?;
    let bytes = io::copy(&mut input, &mut output).context("cannot copy to", &job.dst)?;
    drop(output);
    apply_permissions(&job.dst, job.permissions.clone())?;
    Ok(bytes)
}

/// Removes `path` recursively if it exists.
pub fn remove_tree(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path).context("failed to remove directory", path)
        }
        Ok(_) => fs::remove_file(path).context("failed to remove file", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io("failed to inspect", path, e)),
    }
}
