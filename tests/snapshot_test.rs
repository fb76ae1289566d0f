//! Tests for snapshot writing and reading.

use devdb::schema::{EntitySchema, Field, PkValue, Row, Schema};
use devdb::snapshot::{
    read_snapshot, read_snapshot_as, write_snapshot, SnapshotFormat, SnapshotRecord,
};
use serde_json::json;
use std::fs;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn records() -> Vec<SnapshotRecord> {
    let mut schema = Schema::new();
    let user = schema.add_entity(
        EntitySchema::new("auth_user", "id")
            .with_field(Field::scalar("username"))
            .with_field(Field::scalar("is_staff")),
    );
    let post = schema.add_entity(
        EntitySchema::new("app_post", "uuid")
            .with_field(Field::reference("author_id", "auth_user"))
            .with_field(Field::many("tags", "app_tag")),
    );

    let rows = vec![
        Row::new(user, 1)
            .with("id", 1)
            .with("username", "alice")
            .with("is_staff", true),
        Row::new(post, "a1b2")
            .with("uuid", "a1b2")
            .with("author_id", 1)
            .with("tags", json!([3, 4])),
    ];
    rows.iter()
        .map(|row| SnapshotRecord::from_row(&schema, row))
        .collect()
}

#[test]
fn test_record_shape() {
    let records = records();

    assert_eq!(records[0].model, "auth_user");
    assert_eq!(records[0].pk, PkValue::Int(1));
    assert!(!records[0].fields.contains_key("id"));
    assert_eq!(records[1].pk, PkValue::from("a1b2"));
    assert!(!records[1].fields.contains_key("uuid"));

    let value = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(
        value,
        json!({"model": "auth_user", "pk": 1, "fields": {"username": "alice", "is_staff": true}})
    );
}

#[test]
fn test_write_then_read_every_format() {
    let dir = TempDir::new().unwrap();
    let records = records();

    for name in [
        "dump.json",
        "dump.json.gz",
        "dump.jsonl",
        "dump.jsonl.bz2",
        "dump.yaml",
        "dump.yaml.xz",
        "dump.json.zst",
    ] {
        let path = dir.path().join(name);
        let format = SnapshotFormat::from_path(&path).unwrap();
        write_snapshot(&path, format, 4, &records).unwrap();
        assert_eq!(read_snapshot(&path).unwrap(), records, "{}", name);
    }
}

#[test]
fn test_gzip_output_is_compressed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("development_data.json.gz");

    write_snapshot(&path, SnapshotFormat::Json, 4, &records()).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    let mut decoded = String::new();
    flate2::read::GzDecoder::new(&bytes[..])
        .read_to_string(&mut decoded)
        .unwrap();
    assert!(decoded.starts_with("[\n    {\n        \"model\": \"auth_user\""));
}

#[test]
fn test_indent_zero_is_compact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.json");

    write_snapshot(&path, SnapshotFormat::Json, 0, &records()).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(!content.contains('\n'));
    assert!(content.starts_with("[{\"model\":\"auth_user\""));
}

#[test]
fn test_json_lines_has_one_record_per_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.jsonl");

    write_snapshot(&path, SnapshotFormat::JsonLines, 4, &records()).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 2);
}

#[test]
fn test_explicit_format_overrides_name() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.data");

    write_snapshot(&path, SnapshotFormat::Yaml, 4, &records()).unwrap();

    assert!(read_snapshot(&path).is_err());
    assert_eq!(
        read_snapshot_as(&path, SnapshotFormat::Yaml).unwrap(),
        records()
    );
}

#[test]
fn test_failed_write_leaves_destination_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.json");
    fs::write(&path, "previous").unwrap();

    // Writing into a missing directory fails before anything is persisted
    let missing = dir.path().join("missing").join("out.json");
    assert!(write_snapshot(&missing, SnapshotFormat::Json, 4, &records()).is_err());
    assert!(!missing.exists());

    assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn test_unknown_format_is_rejected() {
    assert!("xml".parse::<SnapshotFormat>().is_err());
    assert!(SnapshotFormat::from_path(Path::new("dump.csv.gz")).is_err());
    assert_eq!(
        "JSON".parse::<SnapshotFormat>().unwrap(),
        SnapshotFormat::Json
    );
}
