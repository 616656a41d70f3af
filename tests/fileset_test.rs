use std::path::PathBuf;

use frakt_log_shipper::buffer::{FileSet, TimeBucket};
use tempfile::TempDir;

#[test]
fn test_lists_buffer_files_oldest_first() {
    let temp_dir = TempDir::new().unwrap();
    let set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();

    // Created deliberately out of order.
    for name in [
        "events-20240102_002.json",
        "events-20240101.json",
        "events-20240102.json",
        "events-20240101_001.json",
    ] {
        std::fs::write(temp_dir.path().join(name), "x\n").unwrap();
    }
    // Foreign files are invisible to the listing.
    std::fs::write(temp_dir.path().join("events.bookmark"), "0:::a\n").unwrap();
    std::fs::write(temp_dir.path().join("invalid-400-aaaa.json"), "{}\n").unwrap();
    std::fs::write(temp_dir.path().join("other-20240101.json"), "x\n").unwrap();

    let files = set.list_buffer_files().unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "events-20240101.json",
            "events-20240101_001.json",
            "events-20240102.json",
            "events-20240102_002.json",
        ]
    );
    assert_eq!(files[0].seq, None);
    assert_eq!(files[1].seq, Some(1));
    assert_eq!(files[0].suffix, "20240101");
}

#[test]
fn test_cleanup_deletes_oldest_over_the_cap() {
    let temp_dir = TempDir::new().unwrap();
    let set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();

    // Four files of 10 bytes each, oldest to newest.
    for day in 1..=4 {
        let name = format!("events-2024010{day}.json");
        std::fs::write(temp_dir.path().join(name), "123456789\n").unwrap();
    }

    // Retained files still count toward the running total, so with a 25-byte
    // cap the two retained newest files (20 bytes) leave no room for older
    // ones.
    set.cleanup_buffer_files(25, 2);

    let files = set.list_buffer_files().unwrap();
    let names: Vec<&str> = files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(names, vec!["events-20240103.json", "events-20240104.json"]);
}

#[test]
fn test_cleanup_under_the_cap_deletes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();

    for day in 1..=4 {
        let name = format!("events-2024010{day}.json");
        std::fs::write(temp_dir.path().join(name), "123456789\n").unwrap();
    }

    set.cleanup_buffer_files(100, 2);
    assert_eq!(set.list_buffer_files().unwrap().len(), 4);
}

#[test]
fn test_always_retained_files_survive_a_zero_cap() {
    let temp_dir = TempDir::new().unwrap();
    let set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();

    for day in 1..=3 {
        let name = format!("events-2024010{day}.json");
        std::fs::write(temp_dir.path().join(name), "123456789\n").unwrap();
    }

    set.cleanup_buffer_files(0, 2);

    let files = set.list_buffer_files().unwrap();
    let names: Vec<&str> = files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(names, vec!["events-20240102.json", "events-20240103.json"]);
}

#[test]
fn test_quarantine_names_embed_the_status_code() {
    let temp_dir = TempDir::new().unwrap();
    let set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();

    let path = set.quarantine_path(400);
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("invalid-400-"));
    assert!(name.ends_with(".json"));
    // 32 hex digits between the status and the extension.
    let uuid_part = &name["invalid-400-".len()..name.len() - ".json".len()];
    assert_eq!(uuid_part.len(), 32);
    assert!(uuid_part.chars().all(|c| c.is_ascii_hexdigit()));

    // Quarantine files never collide.
    assert_ne!(path, set.quarantine_path(400));
}

#[test]
fn test_quarantine_cleanup_keeps_the_newest_within_the_cap() {
    let temp_dir = TempDir::new().unwrap();
    let set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();

    // Three 10-byte quarantine files with strictly increasing mtimes.
    let mut paths: Vec<PathBuf> = Vec::new();
    for status in [400u16, 422, 400] {
        let path = set.quarantine_path(status);
        std::fs::write(&path, "123456789\n").unwrap();
        paths.push(path);
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    // 15-byte cap: the newest file fits, everything older goes.
    set.cleanup_quarantine_files(15);

    assert!(!paths[0].exists());
    assert!(!paths[1].exists());
    assert!(paths[2].exists());
}

#[test]
fn test_quarantine_cleanup_ignores_buffer_files() {
    let temp_dir = TempDir::new().unwrap();
    let set = FileSet::new(temp_dir.path(), "events", TimeBucket::Day).unwrap();

    let buffer = temp_dir.path().join("events-20240101.json");
    std::fs::write(&buffer, "123456789\n").unwrap();
    let quarantined = set.quarantine_path(500);
    std::fs::write(&quarantined, "123456789\n").unwrap();

    set.cleanup_quarantine_files(0);

    assert!(buffer.exists());
    assert!(!quarantined.exists());
}
