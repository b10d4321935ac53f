#![allow(clippy::unwrap_used)]

use std::io::Write;
use std::path::Path;

use fuzzlog_cli::{run_for_test, FsLogSource, InMemoryLogSource};
use fuzzlog_core::{GeneratorConfig, VmOptions};

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../fuzzlog-parse/testdata")
        .join(name);
    match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) => panic!("read fixture {}: {err}", path.display()),
    }
}

fn source() -> InMemoryLogSource {
    InMemoryLogSource::default()
        .with_log("echidna.log", &fixture("echidna.txt"))
        .with_log("medusa.log", &fixture("medusa.txt"))
        .with_log("halmos.log", &fixture("halmos.txt"))
        .with_log("clean.log", "echidna_ok: passing\n")
}

#[test]
fn summary_text() {
    let out = run_for_test(&["summary", "--fuzzer", "echidna", "echidna.log"], &source());
    assert_eq!(out.exit_code, 0, "stderr={}", out.stderr);
    assert!(out.stderr.is_empty());
    assert_eq!(
        out.stdout,
        "Fuzzer:    echidna\n\
         Duration:  2h0m3s\n\
         Coverage:  1876\n\
         Tests:     5 (2 passed, 3 failed)\n\
         Broken properties:\n  \
         - check_balance(uint256)\n  \
         - echidna_total_supply\n"
    );
}

#[test]
fn summary_json_uses_camel_case_keys() {
    let out = run_for_test(&["summary", "-f", "medusa", "medusa.log", "--json"], &source());
    assert_eq!(out.exit_code, 0, "stderr={}", out.stderr);
    let value: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    assert_eq!(value["fuzzer"], "medusa");
    assert_eq!(value["numberOfTests"], 5);
    assert_eq!(value["coverage"], 26);
    assert_eq!(value["brokenProperties"][0]["brokenProperty"], "deposit");
    assert_eq!(value["brokenProperties"].as_array().unwrap().len(), 2);
}

#[test]
fn repro_matches_library_golden() {
    let out = run_for_test(&["repro", "--fuzzer", "halmos", "halmos.log", "-i", "ci"], &source());
    assert_eq!(out.exit_code, 0, "stderr={}", out.stderr);
    assert_eq!(out.stdout, include_str!("../../fuzzlog-parse/tests/golden/halmos_functions.txt"));
}

#[test]
fn repro_vm_flag_enables_cheatcodes() {
    let out = run_for_test(
        &["repro", "--fuzzer", "echidna", "echidna.log", "-i", "ci", "--vm"],
        &source(),
    );
    assert_eq!(out.exit_code, 0, "stderr={}", out.stderr);
    assert_eq!(out.stdout, include_str!("../../fuzzlog-parse/tests/golden/echidna_functions.txt"));
}

#[test]
fn repro_stream_and_batch_agree_for_medusa() {
    let batch = run_for_test(&["repro", "-f", "medusa", "medusa.log", "-i", "ci"], &source());
    let stream = run_for_test(
        &["repro", "-f", "medusa", "medusa.log", "-i", "ci", "--stream"],
        &source(),
    );
    assert_eq!(batch.exit_code, 0);
    assert_eq!(batch.stdout, stream.stdout);
}

#[test]
fn repro_config_file_then_flags() {
    let source =
        source().with_config_file("fuzzlog.yaml", "identifier: nightly\nvm:\n  prank: true\n");
    let out = run_for_test(
        &["repro", "-f", "echidna", "echidna.log", "--config", "fuzzlog.yaml", "--roll"],
        &source,
    );
    assert_eq!(out.exit_code, 0, "stderr={}", out.stderr);
    assert!(out.stdout.starts_with("function test_check_balance_uint256__nightly_0() public {"));
    assert!(out.stdout.contains("    vm.roll(block.number + 1);\n"));
    assert!(out.stdout.contains("    vm.prank(0x0000000000000000000000000000000000010000);\n"));
    assert!(!out.stdout.contains("vm.warp"));
}

#[test]
fn repro_base_config_is_used_without_flags() {
    let source = source().with_base_config(GeneratorConfig {
        identifier: "base".to_string(),
        vm: VmOptions::default(),
    });
    let out = run_for_test(&["repro", "-f", "halmos", "halmos.log"], &source);
    assert_eq!(out.exit_code, 0);
    assert!(out.stdout.starts_with("function test_check_xor_bool_bool__base_0() public {"));
}

#[test]
fn repro_without_failures() {
    let out = run_for_test(&["repro", "-f", "echidna", "clean.log"], &source());
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout, "// No failed properties found in echidna logs\n");
}

#[test]
fn bad_identifier_flag_is_rejected() {
    let out = run_for_test(&["repro", "-f", "echidna", "echidna.log", "-i", "a-b"], &source());
    assert_eq!(out.exit_code, 1);
    assert!(out.stdout.is_empty());
    assert!(out.stderr.contains("identifier"), "stderr={}", out.stderr);
}

#[test]
fn missing_log_reports_path() {
    let out = run_for_test(&["summary", "-f", "halmos", "absent.log"], &source());
    assert_eq!(out.exit_code, 1);
    assert_eq!(out.stderr, "read absent.log: no such file\n");
}

#[test]
fn fuzzer_flag_is_required() {
    let out = run_for_test(&["summary", "halmos.log"], &source());
    assert_eq!(out.exit_code, 1);
    assert_eq!(out.stderr, "error: --fuzzer is required\n");
}

#[test]
fn unknown_command_lists_help() {
    let out = run_for_test(&["replay"], &source());
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.starts_with("error: unknown command 'replay'"));
    assert!(out.stderr.contains("Usage:"));
}

#[test]
fn help_goes_to_stdout() {
    let out = run_for_test(&["repro", "--help"], &source());
    assert_eq!(out.exit_code, 0);
    assert!(out.stdout.contains("--stream"));
}

#[test]
fn filesystem_source_reads_log_files() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", fixture("halmos.txt")).unwrap();
    let path = file.path().to_string_lossy().into_owned();

    let out = run_for_test(&["summary", "--fuzzer", "halmos", &path], &FsLogSource);
    assert_eq!(out.exit_code, 0, "stderr={}", out.stderr);
    assert!(out.stdout.contains("Tests:     5 (1 passed, 4 failed)\n"));
    assert!(out.stdout.contains("  - invariant_isNeverManager()\n"));
}

#[test]
fn filesystem_source_reports_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.log");
    let path = missing.to_string_lossy().into_owned();

    let out = run_for_test(&["summary", "--fuzzer", "echidna", &path], &FsLogSource);
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.starts_with(&format!("read {path}: io: ")), "stderr={}", out.stderr);
}
