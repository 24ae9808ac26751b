use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;

fn marlin() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("marlin").expect("binary builds")
}

fn write_fixture(dir: &tempfile::TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).expect("fixture written");
    path
}

// ── check command ───────────────────────────────────────────

#[test]
fn check_valid_file_reports_ok_and_types() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir, "good.sml", "val x = 4*7+3;\nfun inc n = n + 1;\n");

    marlin()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"))
        .stdout(predicate::str::contains("val x : int"))
        .stdout(predicate::str::contains("int -> int"));
}

#[test]
fn check_type_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir, "bad.sml", "val x : int = true;\n");

    marlin()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("type error"));
}

#[test]
fn check_reports_line_and_column() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir, "bad.sml", "val a = 1;\nval x = unknown;\n");

    marlin()
        .args(["check", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains(":2:"));
}

// ── run command ─────────────────────────────────────────────

#[test]
fn run_factorial_binds_it() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(
        &dir,
        "fac.sml",
        "val rec fac = fn n => if n < 1 then 1 else n * fac (n - 1);\nfac 10;\n",
    );

    marlin()
        .args(["run", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("3628800"));
}

#[test]
fn run_print_writes_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir, "hello.sml", "print \"hello there\\n\";\n");

    marlin()
        .args(["run", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello there"));
}

#[test]
fn run_uncaught_exception_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir, "boom.sml", "1 div 0;\n");

    marlin()
        .args(["run", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("uncaught exception Div"));
}

#[test]
fn run_step_limit_stops_loops() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(
        &dir,
        "loop.sml",
        "val rec loop = fn x => loop x;\nloop 0;\n",
    );

    marlin()
        .args(["run", file.to_str().unwrap(), "--step-limit", "5000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("step limit"));
}

#[test]
fn run_vectors_require_the_flag() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir, "vec.sml", "#[1, 2, 3];\n");

    marlin()
        .args(["run", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("disabled feature"));

    marlin()
        .args(["run", file.to_str().unwrap(), "--vectors"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#[1, 2, 3]"));
}

// ── parse command ───────────────────────────────────────────

#[test]
fn parse_dumps_declarations() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir, "decl.sml", "val x = 1;\n");

    marlin()
        .args(["parse", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Val"));
}

#[test]
fn parse_syntax_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_fixture(&dir, "bad.sml", "val = 3;\n");

    marlin()
        .args(["parse", file.to_str().unwrap()])
        .assert()
        .failure();
}
