#[path = "common/mod.rs"]
mod common;

use std::{env, fs, time::Duration};

use duet::config::{Manifest, load_manifest, parse_duration};
use tempfile::tempdir;

#[test]
fn builtin_pair_advertises_fixed_ports() {
    let manifest = Manifest::builtin();
    manifest.validate().unwrap();

    assert_eq!(manifest.services.len(), 2);

    let dashboard = &manifest.services[0];
    assert_eq!(dashboard.name, "dashboard");
    assert_eq!(dashboard.port, Some(8501));
    assert_eq!(dashboard.dir.as_deref(), Some("/app/frontend"));

    let api = &manifest.services[1];
    assert_eq!(api.name, "api");
    assert_eq!(api.port, Some(8000));
    assert_eq!(api.dir.as_deref(), Some("/app/backend"));
}

#[test]
fn manifest_preserves_declared_order() {
    let temp = tempdir().unwrap();
    let path = common::write_manifest(
        temp.path(),
        r#"version: "1"
services:
  - name: first
    command: "sleep 1"
  - name: second
    command: "sleep 1"
  - name: third
    command: "sleep 1"
"#,
    );

    let manifest = load_manifest(path.to_str().unwrap()).unwrap();
    let names: Vec<_> = manifest
        .services
        .iter()
        .map(|svc| svc.name.as_str())
        .collect();
    assert_eq!(names, ["first", "second", "third"]);
}

#[test]
fn manifest_expands_environment_variables() {
    let _lock = common::env_lock();
    unsafe {
        env::set_var("DUET_TEST_PORT", "8000");
    }

    let temp = tempdir().unwrap();
    let path = common::write_manifest(
        temp.path(),
        r#"version: "1"
services:
  - name: api
    command: "uvicorn main:app --host 0.0.0.0 --port ${DUET_TEST_PORT}"
"#,
    );

    let manifest = load_manifest(path.to_str().unwrap()).unwrap();
    assert_eq!(
        manifest.services[0].command,
        "uvicorn main:app --host 0.0.0.0 --port 8000"
    );
}

#[test]
fn missing_environment_variable_is_a_load_error() {
    let _lock = common::env_lock();
    unsafe {
        env::remove_var("DUET_TEST_MISSING");
    }

    let temp = tempdir().unwrap();
    let path = common::write_manifest(
        temp.path(),
        r#"version: "1"
services:
  - name: api
    command: "echo ${DUET_TEST_MISSING}"
"#,
    );

    let err = load_manifest(path.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("DUET_TEST_MISSING"), "{err}");
}

#[test]
fn duplicate_service_names_are_rejected() {
    let temp = tempdir().unwrap();
    let path = common::write_manifest(
        temp.path(),
        r#"version: "1"
services:
  - name: api
    command: "sleep 1"
  - name: api
    command: "sleep 1"
"#,
    );

    let err = load_manifest(path.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("Duplicate service name"), "{err}");
}

#[test]
fn empty_service_list_is_rejected() {
    let temp = tempdir().unwrap();
    let path = common::write_manifest(
        temp.path(),
        r#"version: "1"
services: []
"#,
    );

    let err = load_manifest(path.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("no services"), "{err}");
}

#[test]
fn service_env_files_feed_children_with_inline_precedence() {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("service.env"),
        "BACKEND_URL=\"http://localhost:8000\"\nSHARED=from_file\n",
    )
    .unwrap();

    let path = common::write_manifest(
        temp.path(),
        r#"version: "1"
services:
  - name: dashboard
    command: "sleep 1"
    env:
      file: "service.env"
      vars:
        SHARED: "inline"
"#,
    );

    let manifest = load_manifest(path.to_str().unwrap()).unwrap();
    let service = &manifest.services[0];
    let working_dir = service.resolved_dir(&manifest.project_root());
    let env = service.environment(&working_dir);

    assert_eq!(
        env.get("BACKEND_URL").map(String::as_str),
        Some("http://localhost:8000")
    );
    assert_eq!(env.get("SHARED").map(String::as_str), Some("inline"));
}

#[test]
fn grace_period_accepts_human_durations() {
    assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
    assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));

    assert!(parse_duration("").is_err());
    assert!(parse_duration("fast").is_err());
}

#[test]
fn grace_period_from_manifest_overrides_default() {
    let temp = tempdir().unwrap();
    let path = common::write_manifest(
        temp.path(),
        r#"version: "1"
grace_period: "3s"
services:
  - name: api
    command: "sleep 1"
"#,
    );

    let manifest = load_manifest(path.to_str().unwrap()).unwrap();
    assert_eq!(manifest.grace_period().unwrap(), Duration::from_secs(3));
}
