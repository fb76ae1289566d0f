//! Integration tests for the devdb binary.

use duckdb::Connection;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn devdb(cache_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_devdb"));
    cmd.env("XDG_CACHE_HOME", cache_home).env_remove("RUST_LOG");
    cmd
}

const SHOP_DDL: &str = r#"
CREATE TABLE auth_user (id INTEGER PRIMARY KEY, username VARCHAR, is_staff BOOLEAN);
CREATE TABLE shop_order (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER REFERENCES auth_user(id),
    total DECIMAL(10, 2)
);
CREATE TABLE shop_audit_log (id INTEGER PRIMARY KEY, message VARCHAR);
"#;

fn create_database(path: &Path, with_data: bool) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SHOP_DDL).unwrap();
    if with_data {
        conn.execute_batch(
            r#"
INSERT INTO auth_user VALUES (1, 'admin', true), (2, 'bob', false), (3, 'carol', false);
INSERT INTO shop_order VALUES (1, 1, 10.50), (2, 3, 99.00), (3, 1, 5.25);
INSERT INTO shop_audit_log VALUES (1, 'created');
"#,
        )
        .unwrap();
    }
}

fn count(path: &Path, table: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT count(*) FROM {}", table), [], |r| {
        r.get::<_, i64>(0)
    })
    .unwrap()
}

#[test]
fn test_create_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("prod.duckdb");
    let target = temp_dir.path().join("dev.duckdb");
    let snapshot = temp_dir.path().join("development_data.json.gz");
    create_database(&source, true);
    create_database(&target, false);

    let output = devdb(temp_dir.path())
        .args([
            "create",
            "-d",
            source.to_str().unwrap(),
            "-o",
            snapshot.to_str().unwrap(),
            "-p",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "Command failed: {:?}", output);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Sample Statistics:"), "{}", stderr);
    assert!(snapshot.exists());
    assert!(temp_dir.path().join("devdb").join("plans").is_dir());

    let output = devdb(temp_dir.path())
        .args([
            "load",
            snapshot.to_str().unwrap(),
            "-d",
            target.to_str().unwrap(),
            "--force",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "Command failed: {:?}", output);

    // The staff seed and its orders; both tables are then skipped in bulk
    assert_eq!(count(&target, "auth_user"), 1);
    assert_eq!(count(&target, "shop_order"), 2);
    // Excluded by the default "log" pattern
    assert_eq!(count(&target, "shop_audit_log"), 0);
}

#[test]
fn test_create_with_config_and_format() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("prod.duckdb");
    let snapshot = temp_dir.path().join("dump.out");
    let config = temp_dir.path().join("devdb.yaml");
    create_database(&source, true);
    fs::write(
        &config,
        "seed: null\nplan_ttl_secs: 0\nsizes:\n  default_limit: 1\n",
    )
    .unwrap();

    let output = devdb(temp_dir.path())
        .args([
            "create",
            "-d",
            source.to_str().unwrap(),
            "-o",
            snapshot.to_str().unwrap(),
            "-f",
            "jsonl",
            "-c",
            config.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "Command failed: {:?}", output);

    let content = fs::read_to_string(&snapshot).unwrap();
    let models: Vec<String> = content
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["model"].as_str().unwrap().to_string()
        })
        .collect();

    // Newest order plus the customer it references
    assert_eq!(models.len(), 3);
    assert!(models.contains(&"shop_order".to_string()));
    assert_eq!(models.iter().filter(|m| *m == "auth_user").count(), 2);
}

#[test]
fn test_unknown_format_fails_before_opening_database() {
    let temp_dir = TempDir::new().unwrap();
    let database = temp_dir.path().join("missing.duckdb");

    let output = devdb(temp_dir.path())
        .args([
            "create",
            "-d",
            database.to_str().unwrap(),
            "-o",
            temp_dir.path().join("out.xml").to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown serialization format"), "{}", stderr);
    assert!(!database.exists());
}

#[test]
fn test_completions() {
    let temp_dir = TempDir::new().unwrap();
    let output = devdb(temp_dir.path())
        .args(["completions", "bash"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("devdb"));
}
