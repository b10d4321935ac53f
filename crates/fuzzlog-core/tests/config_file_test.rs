#![allow(clippy::unwrap_used)]

use std::io::Write;

use fuzzlog_core::config::load_config;
use fuzzlog_core::{FuzzlogError, VmOptions};

#[test]
fn explicit_file_is_loaded_and_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "identifier: nightly_42\nvm:\n  roll: true\n  time: true").unwrap();

    let (cfg, used) = load_config(Some(file.path())).unwrap();
    assert_eq!(used.as_deref(), Some(file.path()));
    assert_eq!(cfg.identifier, "nightly_42");
    assert_eq!(
        cfg.vm,
        VmOptions {
            roll: true,
            time: true,
            prank: false
        }
    );
}

#[test]
fn missing_explicit_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    match load_config(Some(&missing)) {
        Err(FuzzlogError::Config(message)) => assert!(message.contains("nope.yaml"), "{message}"),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn malformed_yaml_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "vm: [not, a, map").unwrap();
    assert!(matches!(load_config(Some(file.path())), Err(FuzzlogError::Config(_))));
}

#[test]
fn invalid_identifier_fails_validation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "identifier: \"has space\"").unwrap();
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("identifier"), "{err}");
}
