use std::io::Write;

use syncd_config::{load, TargetSystem};

fn write_fixture(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.yml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

const FARMAX_YAML: &str = r#"
target_system: farmax
cloud:
  api_url: "https://cloud.example.test/graphql"
  websocket_url: "wss://cloud.example.test/ws"
  integration_name: "TESTPOS"
erp:
  host: "localhost"
  file: "C:/erp/data.fdb"
  user: "SYSDBA"
  password: "secret"
auth:
  domain: "tenant.example.test"
  client_id: "abc123"
  scope: "openid profile"
  audience: "https://cloud.example.test/api"
store:
  sqlite_path: "./data/tracking.sqlite3"
  lock_path: "./data/daemon.lock"
  token_store_path: "./data/token.b64"
"#;

#[test]
fn loads_valid_farmax_config_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, FARMAX_YAML);
    let cfg = load(&path).expect("should load");

    assert_eq!(cfg.target_system, TargetSystem::Farmax);
    assert!(cfg.erp.is_some());
    assert_eq!(cfg.reconciliation.sync_interval.as_millis(), 60_000);
    assert_eq!(cfg.reconciliation.cooldown.as_secs_f64(), 45.0);
    assert_eq!(cfg.retention.as_secs(), 30 * 24 * 3600);
    assert_eq!(cfg.ops_http_bind, "127.0.0.1:8090");
}

#[test]
fn farmax_without_erp_section_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = FARMAX_YAML.replace(
        "erp:\n  host: \"localhost\"\n  file: \"C:/erp/data.fdb\"\n  user: \"SYSDBA\"\n  password: \"secret\"\n",
        "",
    );
    let path = write_fixture(&dir, &yaml);
    assert!(load(&path).is_err());
}

#[test]
fn sync_interval_below_one_second_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!("{FARMAX_YAML}reconciliation:\n  sync_interval_ms: 500\n");
    let path = write_fixture(&dir, &yaml);
    assert!(load(&path).is_err());
}

#[test]
fn missing_file_returns_error() {
    let path = std::path::Path::new("/nonexistent/config.yml");
    assert!(load(path).is_err());
}

#[test]
fn unknown_top_level_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    // A typo'd field name should fail loudly rather than being silently
    // ignored while the intended field falls back to its default.
    let yaml = format!("{FARMAX_YAML}retry_reconciliation_enabled: true\n");
    let path = write_fixture(&dir, &yaml);
    assert!(load(&path).is_err());
}

#[test]
fn file_watch_without_watch_dir_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = FARMAX_YAML
        .replace("target_system: farmax", "target_system: file_watch")
        .replace(
            "erp:\n  host: \"localhost\"\n  file: \"C:/erp/data.fdb\"\n  user: \"SYSDBA\"\n  password: \"secret\"\n",
            "",
        );
    let path = write_fixture(&dir, &yaml);
    assert!(load(&path).is_err());
}
