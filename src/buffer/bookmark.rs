use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::BufferError;

const SEPARATOR: &str = ":::";

/// Shipping progress: everything before `next_offset` in `file` has been
/// durably shipped. Resets to offset 0 when advancing to a new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSetPosition {
    pub next_offset: u64,
    pub file: PathBuf,
}

impl FileSetPosition {
    pub fn new(next_offset: u64, file: impl Into<PathBuf>) -> Self {
        Self {
            next_offset,
            file: file.into(),
        }
    }

    /// Position at the start of a file.
    pub fn start_of(file: impl Into<PathBuf>) -> Self {
        Self::new(0, file)
    }
}

/// The persisted read-cursor, one line of `"{offset}:::{path}"`.
///
/// Opening takes the OS exclusive advisory lock on the cursor file and holds
/// it for the value's lifetime; this is the single cross-process mutual
/// exclusion point between shipper instances. A second instance blocks in
/// `open` until the first releases the lock by dropping its `Bookmark`.
pub struct Bookmark {
    file: File,
    path: PathBuf,
}

impl Bookmark {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BufferError> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| BufferError::io(&path, e))?;
        file.lock().map_err(|e| BufferError::io(&path, e))?;
        debug!(path = %path.display(), "Acquired bookmark lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted position. Empty or malformed content yields
    /// `None`, which callers treat as "start from the oldest file at
    /// offset 0".
    pub fn try_read(&mut self) -> Result<Option<FileSetPosition>, BufferError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| BufferError::io(&self.path, e))?;
        let mut content = String::new();
        self.file
            .read_to_string(&mut content)
            .map_err(|e| BufferError::io(&self.path, e))?;
        Ok(parse_entry(&content))
    }

    /// Overwrites the persisted position. The line is short enough that
    /// truncate-then-write never leaves a reader with a torn mix of old and
    /// new content once the trailing newline is in place.
    pub fn write(&mut self, position: &FileSetPosition) -> Result<(), BufferError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| BufferError::io(&self.path, e))?;
        self.file
            .set_len(0)
            .map_err(|e| BufferError::io(&self.path, e))?;
        let line = format!(
            "{}{}{}\n",
            position.next_offset,
            SEPARATOR,
            position.file.display()
        );
        self.file
            .write_all(line.as_bytes())
            .map_err(|e| BufferError::io(&self.path, e))?;
        self.file.flush().map_err(|e| BufferError::io(&self.path, e))?;
        Ok(())
    }
}

fn parse_entry(content: &str) -> Option<FileSetPosition> {
    let line = content.lines().next()?;
    let (offset, file) = line.split_once(SEPARATOR)?;
    let next_offset = offset.trim().parse().ok()?;
    if file.is_empty() {
        return None;
    }
    Some(FileSetPosition::new(next_offset, file))
}
