use std::path::PathBuf;

use frakt_log_shipper::buffer::{
    BufferError, FileSet, FileSetPosition, PayloadReader, ReaderConfig, TimeBucket,
};
use tempfile::TempDir;

#[test]
fn test_reads_documents_with_rendered_actions() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(
        &temp_dir,
        "events-20240102.json",
        "{\"msg\":\"a\"}\n{\"msg\":\"b\"}\n",
    );
    let reader = reader(&temp_dir, ReaderConfig::default());

    let batch = reader.read_payload(&FileSetPosition::start_of(&path)).unwrap();

    assert_eq!(batch.count, 2);
    assert_eq!(batch.next_offset, 24);
    assert_eq!(batch.payload.len(), 2);
    assert_eq!(batch.payload.items[0].document, "{\"msg\":\"a\"}");
    assert_eq!(batch.payload.items[1].document, "{\"msg\":\"b\"}");

    let action: serde_json::Value =
        serde_json::from_str(&batch.payload.items[0].action).unwrap();
    assert_eq!(action["index"]["_index"], "logs-2024.01.02");
    assert_eq!(action["index"]["_type"], "_doc");
    let id = action["index"]["_id"].as_str().unwrap();
    assert!(id.starts_with("0_"));
    assert!(action["index"].get("pipeline").is_none());

    // Both items share the payload id; the numeric prefix is the position.
    let second: serde_json::Value =
        serde_json::from_str(&batch.payload.items[1].action).unwrap();
    let second_id = second["index"]["_id"].as_str().unwrap();
    assert!(second_id.starts_with("1_"));
    assert_eq!(&id[2..], &second_id[2..]);
}

#[test]
fn test_resumes_from_an_offset() {
    let temp_dir = TempDir::new().unwrap();
    let content = "{\"msg\":\"a\"}\n{\"msg\":\"b\"}\n";
    let path = write_file(&temp_dir, "events-20240102.json", content);
    let reader = reader(&temp_dir, ReaderConfig::default());

    let batch = reader
        .read_payload(&FileSetPosition::new(12, &path))
        .unwrap();
    assert_eq!(batch.count, 1);
    assert_eq!(batch.payload.items[0].document, "{\"msg\":\"b\"}");
    assert_eq!(batch.next_offset, content.len() as u64);
}

#[test]
fn test_stops_at_the_batch_limit() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(&temp_dir, "events-20240102.json", "{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n");
    let reader = reader(
        &temp_dir,
        ReaderConfig {
            batch_limit: 2,
            ..Default::default()
        },
    );

    let batch = reader.read_payload(&FileSetPosition::start_of(&path)).unwrap();
    assert_eq!(batch.count, 2);
    assert_eq!(batch.payload.len(), 2);
    assert_eq!(batch.next_offset, 16);

    // The next read picks up exactly where this one stopped.
    let rest = reader
        .read_payload(&FileSetPosition::new(batch.next_offset, &path))
        .unwrap();
    assert_eq!(rest.count, 1);
    assert_eq!(rest.payload.items[0].document, "{\"n\":3}");
}

#[test]
fn test_leaves_an_unterminated_tail_for_later() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(&temp_dir, "events-20240102.json", "{\"n\":1}\n{\"n\":2");
    let reader = reader(&temp_dir, ReaderConfig::default());

    let batch = reader.read_payload(&FileSetPosition::start_of(&path)).unwrap();
    assert_eq!(batch.count, 1);
    assert_eq!(batch.payload.len(), 1);
    // Offset stops before the partial record.
    assert_eq!(batch.next_offset, 8);
}

#[test]
fn test_blank_lines_advance_without_counting() {
    let temp_dir = TempDir::new().unwrap();
    let content = "{\"n\":1}\n\n   \n{\"n\":2}\n";
    let path = write_file(&temp_dir, "events-20240102.json", content);
    let reader = reader(&temp_dir, ReaderConfig::default());

    let batch = reader.read_payload(&FileSetPosition::start_of(&path)).unwrap();
    assert_eq!(batch.count, 2);
    assert_eq!(batch.payload.len(), 2);
    assert_eq!(batch.next_offset, content.len() as u64);
}

#[test]
fn test_oversized_events_are_dropped_but_counted() {
    let temp_dir = TempDir::new().unwrap();
    let big = format!("{{\"pad\":\"{}\"}}", "x".repeat(64));
    let content = format!("{{\"n\":1}}\n{big}\n{{\"n\":2}}\n");
    let path = write_file(&temp_dir, "events-20240102.json", &content);
    let reader = reader(
        &temp_dir,
        ReaderConfig {
            max_event_bytes: Some(32),
            ..Default::default()
        },
    );

    let batch = reader.read_payload(&FileSetPosition::start_of(&path)).unwrap();

    // The drop consumes the record and counts toward the limit.
    assert_eq!(batch.count, 3);
    assert_eq!(batch.next_offset, content.len() as u64);
    assert_eq!(batch.payload.len(), 2);
    assert_eq!(batch.payload.items[0].document, "{\"n\":1}");
    assert_eq!(batch.payload.items[1].document, "{\"n\":2}");

    // Ids follow payload positions, not record positions, so the server can
    // correlate rejections back to what was actually sent.
    let action: serde_json::Value =
        serde_json::from_str(&batch.payload.items[1].action).unwrap();
    assert!(action["index"]["_id"].as_str().unwrap().starts_with("1_"));
}

#[test]
fn test_pipeline_is_rendered_when_configured() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(&temp_dir, "events-20240102.json", "{\"n\":1}\n");
    let reader = reader(
        &temp_dir,
        ReaderConfig {
            pipeline: Some("geoip".to_string()),
            ..Default::default()
        },
    );

    let batch = reader.read_payload(&FileSetPosition::start_of(&path)).unwrap();
    let action: serde_json::Value =
        serde_json::from_str(&batch.payload.items[0].action).unwrap();
    assert_eq!(action["index"]["pipeline"], "geoip");
}

#[test]
fn test_index_format_follows_the_bucket_date() {
    let temp_dir = TempDir::new().unwrap();
    let file_set = FileSet::new(temp_dir.path(), "events", TimeBucket::Hour).unwrap();
    let path = temp_dir.path().join("events-2024010213.json");
    std::fs::write(&path, "{\"n\":1}\n").unwrap();
    let reader = PayloadReader::new(
        file_set,
        ReaderConfig {
            index_format: "logs-%Y.%m.%d.%H".to_string(),
            ..Default::default()
        },
    )
    .unwrap();

    let batch = reader.read_payload(&FileSetPosition::start_of(&path)).unwrap();
    let action: serde_json::Value =
        serde_json::from_str(&batch.payload.items[0].action).unwrap();
    assert_eq!(action["index"]["_index"], "logs-2024.01.02.13");
}

#[test]
fn test_malformed_file_name_is_a_hard_error() {
    let temp_dir = TempDir::new().unwrap();
    let reader = reader(&temp_dir, ReaderConfig::default());

    for name in ["evil.json", "events-2024.json", "events-99999999.json"] {
        let path = temp_dir.path().join(name);
        std::fs::write(&path, "{\"n\":1}\n").unwrap();
        let result = reader.read_payload(&FileSetPosition::start_of(&path));
        assert!(
            matches!(result, Err(BufferError::MalformedFileName { .. })),
            "name {name:?}"
        );
    }
}

#[test]
fn test_invalid_index_format_is_rejected_up_front() {
    let temp_dir = TempDir::new().unwrap();
    let file_set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();
    let result = PayloadReader::new(
        file_set,
        ReaderConfig {
            index_format: "logs-%Q".to_string(),
            ..Default::default()
        },
    );
    assert!(matches!(result, Err(BufferError::InvalidIndexFormat { .. })));
}

#[test]
fn test_empty_file_reads_an_empty_batch() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_file(&temp_dir, "events-20240102.json", "");
    let reader = reader(&temp_dir, ReaderConfig::default());

    let batch = reader.read_payload(&FileSetPosition::start_of(&path)).unwrap();
    assert_eq!(batch.count, 0);
    assert_eq!(batch.next_offset, 0);
    assert!(batch.payload.is_empty());
}

fn reader(temp_dir: &TempDir, config: ReaderConfig) -> PayloadReader {
    let file_set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();
    PayloadReader::new(file_set, config).unwrap()
}

fn write_file(temp_dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = temp_dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}
