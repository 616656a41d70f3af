use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::bucket::TimeBucket;
use super::error::BufferError;

/// One enumerated buffer file with the naming parts used for ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferFile {
    pub path: PathBuf,
    /// Time-bucket digits from the name, empty for `TimeBucket::Infinite`.
    pub suffix: String,
    /// Size-rollover sequence number, `None` for the bare first file.
    pub seq: Option<u32>,
}

/// Names, enumerates and prunes the buffer files of one log stream.
///
/// Everything lives flat in `dir`: live buffer files
/// (`{base}-{bucket}[_NNN].json`, no dash or digits for
/// `TimeBucket::Infinite`), quarantined payloads
/// (`invalid-{status}-{uuid}.json`) and the shipper cursor
/// (`{base}.bookmark`). Files that match none of these patterns are left
/// alone.
#[derive(Debug, Clone)]
pub struct FileSet {
    dir: PathBuf,
    base: String,
    bucket: TimeBucket,
    pattern: Regex,
}

impl FileSet {
    pub fn new(
        dir: impl Into<PathBuf>,
        base: impl Into<String>,
        bucket: TimeBucket,
    ) -> Result<Self, BufferError> {
        let dir = dir.into();
        let base = base.into();
        let pattern = if bucket == TimeBucket::Infinite {
            Regex::new(&format!(r"^{}(?:_(\d+))?\.json$", regex::escape(&base)))?
        } else {
            Regex::new(&format!(
                r"^{}-(\d{{{}}})(?:_(\d+))?\.json$",
                regex::escape(&base),
                bucket.suffix_len()
            ))?
        };
        Ok(Self {
            dir,
            base,
            bucket,
            pattern,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bucket(&self) -> TimeBucket {
        self.bucket
    }

    pub fn bookmark_path(&self) -> PathBuf {
        self.dir.join(format!("{}.bookmark", self.base))
    }

    /// Path of the buffer file for a bucket suffix and rollover sequence.
    pub fn buffer_file_path(&self, suffix: &str, seq: Option<u32>) -> PathBuf {
        let mut name = if suffix.is_empty() {
            self.base.clone()
        } else {
            format!("{}-{}", self.base, suffix)
        };
        if let Some(seq) = seq {
            name.push_str(&format!("_{seq:03}"));
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    /// Splits a directory entry name into its bucket suffix and sequence
    /// number. Names outside the buffer convention (quarantine files, the
    /// bookmark, foreign files, unparseable sequences) yield `None`.
    pub fn parse_file_name(&self, name: &str) -> Option<(String, Option<u32>)> {
        let caps = self.pattern.captures(name)?;
        let (suffix, seq) = if self.bucket == TimeBucket::Infinite {
            (String::new(), caps.get(1))
        } else {
            (caps[1].to_string(), caps.get(2))
        };
        let seq = match seq {
            Some(m) => Some(m.as_str().parse().ok()?),
            None => None,
        };
        Some((suffix, seq))
    }

    /// Lists the buffer files oldest-first: ascending by bucket suffix, then
    /// by sequence number with the bare (no `_NNN`) file first.
    pub fn list_buffer_files(&self) -> Result<Vec<BufferFile>, BufferError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| BufferError::io(&self.dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BufferError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((suffix, seq)) = self.parse_file_name(name) else {
                continue;
            };
            files.push(BufferFile {
                path: entry.path(),
                suffix,
                seq,
            });
        }
        files.sort_by(|a, b| (a.suffix.as_str(), a.seq).cmp(&(b.suffix.as_str(), b.seq)));
        Ok(files)
    }

    /// Deletes the oldest buffer files once their cumulative size exceeds
    /// `max_total_bytes`, always keeping the newest `always_retain` files.
    /// Failures are logged, never returned: retention is best-effort.
    pub fn cleanup_buffer_files(&self, max_total_bytes: u64, always_retain: usize) {
        let files = match self.list_buffer_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Buffer cleanup skipped, listing failed");
                return;
            }
        };
        let newest_first: Vec<PathBuf> = files.into_iter().rev().map(|f| f.path).collect();
        delete_over_cap(&newest_first, max_total_bytes, always_retain);
    }

    /// Unique quarantine file name embedding the server status code.
    pub fn quarantine_path(&self, status_code: u16) -> PathBuf {
        self.dir
            .join(format!("invalid-{status_code}-{}.json", Uuid::new_v4().simple()))
    }

    /// Deletes the oldest quarantine files (by modification time) once their
    /// cumulative size exceeds `max_total_bytes`.
    pub fn cleanup_quarantine_files(&self, max_total_bytes: u64) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Quarantine cleanup skipped, listing failed");
                return;
            }
        };
        let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("invalid-") || !name.ends_with(".json") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((entry.path(), modified));
        }
        files.sort_by(|a, b| b.1.cmp(&a.1));
        let newest_first: Vec<PathBuf> = files.into_iter().map(|(p, _)| p).collect();
        delete_over_cap(&newest_first, max_total_bytes, 0);
    }
}

/// Walks `newest_first`, accumulating file sizes; deletes every file past
/// the first `always_retain` once the running total exceeds the cap.
fn delete_over_cap(newest_first: &[PathBuf], max_total_bytes: u64, always_retain: usize) {
    let mut total: u64 = 0;
    for (i, path) in newest_first.iter().enumerate() {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not stat file during cleanup");
                continue;
            }
        };
        total = total.saturating_add(len);
        if i < always_retain {
            continue;
        }
        if total > max_total_bytes {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Deleted file over retention cap"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not delete file during cleanup");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day_set() -> FileSet {
        FileSet::new("/tmp/buffers", "events", TimeBucket::Day).unwrap()
    }

    #[test]
    fn parses_bare_and_sequenced_names() {
        let set = day_set();
        assert_eq!(
            set.parse_file_name("events-20240102.json"),
            Some(("20240102".into(), None))
        );
        assert_eq!(
            set.parse_file_name("events-20240102_003.json"),
            Some(("20240102".into(), Some(3)))
        );
    }

    #[test]
    fn rejects_foreign_and_malformed_names() {
        let set = day_set();
        assert_eq!(set.parse_file_name("events.bookmark"), None);
        assert_eq!(set.parse_file_name("invalid-400-abc.json"), None);
        assert_eq!(set.parse_file_name("events-2024010.json"), None);
        assert_eq!(set.parse_file_name("events-202401022.json"), None);
        assert_eq!(set.parse_file_name("other-20240102.json"), None);
        assert_eq!(set.parse_file_name("events-20240102.json.bak"), None);
    }

    #[test]
    fn infinite_bucket_uses_bare_base_name() {
        let set = FileSet::new("/tmp/buffers", "events", TimeBucket::Infinite).unwrap();
        assert_eq!(set.parse_file_name("events.json"), Some((String::new(), None)));
        assert_eq!(
            set.parse_file_name("events_001.json"),
            Some((String::new(), Some(1)))
        );
        assert_eq!(set.parse_file_name("events-20240102.json"), None);
    }

    #[test]
    fn builds_paths_matching_its_own_pattern() {
        let set = day_set();
        let bare = set.buffer_file_path("20240102", None);
        let seq = set.buffer_file_path("20240102", Some(12));
        assert!(bare.ends_with("events-20240102.json"));
        assert!(seq.ends_with("events-20240102_012.json"));
        for path in [bare, seq] {
            let name = path.file_name().unwrap().to_str().unwrap().to_string();
            assert!(set.parse_file_name(&name).is_some());
        }
    }

    #[test]
    fn regex_special_characters_in_base_are_literal() {
        let set = FileSet::new("/tmp/buffers", "app.log", TimeBucket::Day).unwrap();
        assert!(set.parse_file_name("app.log-20240102.json").is_some());
        assert!(set.parse_file_name("appxlog-20240102.json").is_none());
    }
}
