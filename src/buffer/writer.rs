use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use super::error::BufferError;
use super::fileset::FileSet;

struct ActiveFile {
    file: File,
    path: PathBuf,
    suffix: String,
    len: u64,
}

/// Append side of the buffer: one serialized document per line, rolling to
/// a new file when the time bucket changes or the active file passes the
/// size limit.
///
/// The writer holds a non-blocking exclusive advisory lock on the active
/// file for as long as it is active. The shipper probes exactly this lock
/// to decide whether a drained file may still grow; rolling to a successor
/// releases it.
pub struct BufferWriter {
    file_set: FileSet,
    size_limit_bytes: Option<u64>,
    active: Option<ActiveFile>,
}

impl BufferWriter {
    pub fn new(file_set: FileSet, size_limit_bytes: Option<u64>) -> Result<Self, BufferError> {
        fs::create_dir_all(file_set.dir()).map_err(|e| BufferError::io(file_set.dir(), e))?;
        Ok(Self {
            file_set,
            size_limit_bytes,
            active: None,
        })
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| active.path.as_path())
    }

    /// Appends one document to the active buffer file.
    ///
    /// The record and its terminating newline reach the OS in a single
    /// append write, so a concurrent reader observes either nothing or the
    /// complete record. `document` must be a single line; framing breaks if
    /// it contains raw newlines.
    pub fn append(&mut self, document: &str) -> Result<(), BufferError> {
        let suffix = self.file_set.bucket().suffix(Utc::now());
        let limit = self.size_limit_bytes;
        let active = match self.active.take() {
            Some(active) if active.suffix == suffix && !over_limit(limit, active.len) => active,
            stale => {
                // Release any held lock before probing successor files.
                drop(stale);
                self.open_active(&suffix)?
            }
        };
        let active = self.active.insert(active);

        let mut line = String::with_capacity(document.len() + 1);
        line.push_str(document);
        line.push('\n');
        active
            .file
            .write_all(line.as_bytes())
            .map_err(|e| BufferError::io(&active.path, e))?;
        active.len += line.len() as u64;
        Ok(())
    }

    /// Opens (or creates) the newest writable file for `suffix`, skipping
    /// past any already-full predecessors from an earlier run.
    fn open_active(&self, suffix: &str) -> Result<ActiveFile, BufferError> {
        let mut seq = self.latest_seq(suffix)?;
        loop {
            let path = self.file_set.buffer_file_path(suffix, seq);
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .map_err(|e| BufferError::io(&path, e))?;
            match file.try_lock() {
                Ok(()) => {}
                Err(TryLockError::WouldBlock) => return Err(BufferError::FileBusy { path }),
                Err(TryLockError::Error(e)) => return Err(BufferError::io(&path, e)),
            }
            let len = file
                .metadata()
                .map_err(|e| BufferError::io(&path, e))?
                .len();
            if over_limit(self.size_limit_bytes, len) {
                seq = Some(seq.map_or(1, |n| n.saturating_add(1)));
                continue;
            }
            debug!(path = %path.display(), "Opened active buffer file");
            return Ok(ActiveFile {
                file,
                path,
                suffix: suffix.to_string(),
                len,
            });
        }
    }

    fn latest_seq(&self, suffix: &str) -> Result<Option<u32>, BufferError> {
        let files = self.file_set.list_buffer_files()?;
        Ok(files
            .into_iter()
            .filter(|f| f.suffix == suffix)
            .map(|f| f.seq)
            .max()
            .flatten())
    }
}

fn over_limit(limit: Option<u64>, len: u64) -> bool {
    limit.is_some_and(|limit| len >= limit && len > 0)
}
