use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::bookmark::FileSetPosition;
use super::bucket::TimeBucket;
use super::error::BufferError;
use super::fileset::FileSet;

const DOC_TYPE: &str = "_doc";

/// One bulk operation: the action/metadata line and the raw document line
/// exactly as read from the buffer file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadItem {
    pub action: String,
    pub document: String,
}

/// An ordered batch of bulk operations, built fresh per read and alive for
/// one ship attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub items: Vec<PayloadItem>,
}

impl Payload {
    /// The "nothing to send" payload used for a zero-document tick.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Renders the interleaved action/document NDJSON body, with the
    /// trailing newline the bulk protocol requires.
    pub fn body(&self) -> String {
        let mut body = String::new();
        for item in &self.items {
            body.push_str(&item.action);
            body.push('\n');
            body.push_str(&item.document);
            body.push('\n');
        }
        body
    }
}

/// Result of one bounded batch read.
#[derive(Debug)]
pub struct BatchRead {
    pub payload: Payload,
    /// First unread byte in the file; what the bookmark records after a
    /// successful ship.
    pub next_offset: u64,
    /// Records consumed, including oversized drops but not blank lines.
    /// `count == batch_limit` means the file may hold more.
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Maximum documents per batch.
    pub batch_limit: usize,
    /// Per-event byte ceiling; larger records are dropped, never sent.
    pub max_event_bytes: Option<usize>,
    /// chrono format string producing the target index name from the
    /// file's bucket date.
    pub index_format: String,
    /// Optional ingest pipeline named in every action line.
    pub pipeline: Option<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            batch_limit: 50,
            max_event_bytes: None,
            index_format: "logs-%Y.%m.%d".to_string(),
            pipeline: None,
        }
    }
}

/// Reads bounded batches of newline-delimited documents from buffer files.
///
/// The file is opened read-only and never locked, so the writer may keep
/// appending while a read is in progress. Only newline-terminated records
/// are consumed; an unterminated tail is the writer mid-append and is left
/// for a later tick.
pub struct PayloadReader {
    file_set: FileSet,
    batch_limit: usize,
    max_event_bytes: Option<usize>,
    index_format: String,
    pipeline: Option<String>,
}

impl PayloadReader {
    pub fn new(file_set: FileSet, config: ReaderConfig) -> Result<Self, BufferError> {
        if StrftimeItems::new(&config.index_format).any(|item| matches!(item, Item::Error)) {
            return Err(BufferError::InvalidIndexFormat {
                format: config.index_format,
            });
        }
        Ok(Self {
            file_set,
            // A zero limit would stall the drain loop.
            batch_limit: config.batch_limit.max(1),
            max_event_bytes: config.max_event_bytes,
            index_format: config.index_format,
            pipeline: config.pipeline,
        })
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Reads up to `batch_limit` records starting at `position`.
    pub fn read_payload(&self, position: &FileSetPosition) -> Result<BatchRead, BufferError> {
        let date = self.bucket_date(&position.file)?;
        let index = date.format(&self.index_format).to_string();
        let payload_id = Uuid::new_v4().to_string();

        let mut file =
            File::open(&position.file).map_err(|e| BufferError::io(&position.file, e))?;
        file.seek(SeekFrom::Start(position.next_offset))
            .map_err(|e| BufferError::io(&position.file, e))?;
        let mut lines = BufReader::new(file);

        let mut payload = Payload::empty();
        let mut next_offset = position.next_offset;
        let mut count = 0usize;
        let mut buf = Vec::new();

        while count < self.batch_limit {
            buf.clear();
            let n = lines
                .read_until(b'\n', &mut buf)
                .map_err(|e| BufferError::io(&position.file, e))?;
            if n == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') {
                // Unterminated tail: the writer has not finished this record.
                break;
            }
            next_offset += n as u64;
            let line = trim_terminator(&buf);
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            if let Some(max) = self.max_event_bytes
                && line.len() > max
            {
                warn!(
                    file = %position.file.display(),
                    bytes = line.len(),
                    limit = max,
                    "Dropping oversized event"
                );
                count += 1;
                continue;
            }
            let document = String::from_utf8_lossy(line).into_owned();
            let action = self.render_action(&index, payload.items.len(), &payload_id)?;
            payload.items.push(PayloadItem { action, document });
            count += 1;
        }

        Ok(BatchRead {
            payload,
            next_offset,
            count,
        })
    }

    /// Recovers the bucket date encoded in a buffer file name. A name that
    /// does not match the naming convention, or whose digits are not a real
    /// date, is a formatting error the caller must surface rather than skip.
    fn bucket_date(&self, path: &Path) -> Result<NaiveDateTime, BufferError> {
        let malformed = || BufferError::MalformedFileName {
            path: path.to_path_buf(),
            bucket: self.file_set.bucket(),
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(malformed)?;
        let (suffix, _seq) = self.file_set.parse_file_name(name).ok_or_else(malformed)?;
        match self.file_set.bucket().parse_suffix(&suffix) {
            Some(date) => Ok(date),
            // Infinite buckets carry no date; index by the current time.
            None if self.file_set.bucket() == TimeBucket::Infinite => Ok(Utc::now().naive_utc()),
            None => Err(malformed()),
        }
    }

    fn render_action(
        &self,
        index: &str,
        item_index: usize,
        payload_id: &str,
    ) -> Result<String, BufferError> {
        let action = BulkAction {
            index: BulkIndex {
                index,
                doc_type: DOC_TYPE,
                id: format!("{item_index}_{payload_id}"),
                pipeline: self.pipeline.as_deref(),
            },
        };
        Ok(serde_json::to_string(&action)?)
    }
}

fn trim_terminator(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

#[derive(Serialize)]
struct BulkAction<'a> {
    index: BulkIndex<'a>,
}

#[derive(Serialize)]
struct BulkIndex<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type")]
    doc_type: &'a str,
    #[serde(rename = "_id")]
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pipeline: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_interleaves_pairs_with_trailing_newline() {
        let payload = Payload {
            items: vec![
                PayloadItem {
                    action: r#"{"index":{}}"#.to_string(),
                    document: r#"{"msg":"a"}"#.to_string(),
                },
                PayloadItem {
                    action: r#"{"index":{}}"#.to_string(),
                    document: r#"{"msg":"b"}"#.to_string(),
                },
            ],
        };
        assert_eq!(
            payload.body(),
            "{\"index\":{}}\n{\"msg\":\"a\"}\n{\"index\":{}}\n{\"msg\":\"b\"}\n"
        );
    }

    #[test]
    fn empty_payload_renders_nothing() {
        assert!(Payload::empty().is_empty());
        assert_eq!(Payload::empty().body(), "");
    }

    #[test]
    fn terminator_trimming_handles_crlf() {
        assert_eq!(trim_terminator(b"abc\n"), b"abc");
        assert_eq!(trim_terminator(b"abc\r\n"), b"abc");
        assert_eq!(trim_terminator(b"abc"), b"abc");
    }
}
