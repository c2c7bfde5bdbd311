use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn corvid_run_quickstart() {
    let mut cmd = Command::cargo_bin("corvid").expect("binary exists");
    cmd.arg("run").arg("demos/quickstart.cv");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Hello from Corvid!"))
        .stdout(predicate::str::contains("rect with area 12"))
        .stdout(predicate::str::contains("levels: 0, 5, 6"))
        .stdout(predicate::str::contains("caught IndexOutOfRangeError"));
}

#[test]
fn corvid_eval_prints_value() {
    let mut cmd = Command::cargo_bin("corvid").expect("binary exists");
    cmd.arg("eval").arg("1 + 2 + 3");
    cmd.assert().success().stdout(predicate::str::contains("6"));
}

#[test]
fn corvid_eval_reports_runtime_errors() {
    let mut cmd = Command::cargo_bin("corvid").expect("binary exists");
    cmd.arg("eval").arg("var x = 1\nx / 0");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("DivisionOrModuloByZero"))
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn corvid_run_reports_uncaught_exceptions() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("fail.cv");
    fs::write(&script, "println(\"before\")\nthrow Exception(\"bad news\")\n")
        .expect("write script");

    let mut cmd = Command::cargo_bin("corvid").expect("binary exists");
    cmd.arg("run").arg(&script);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("before"))
        .stderr(predicate::str::contains("uncaught Exception: bad news"));
}

#[test]
fn corvid_run_uses_module_paths() {
    let dir = tempdir().expect("create temp dir");
    let lib = dir.path().join("lib");
    fs::create_dir_all(&lib).expect("create lib dir");
    fs::write(lib.join("greet.cv"), "fn Hello(name) { return \"hi \" + name }")
        .expect("write module");
    let script = dir.path().join("main.cv");
    fs::write(&script, "import { Hello } from \"greet\"\nprintln(Hello(\"crow\"))")
        .expect("write script");

    let mut cmd = Command::cargo_bin("corvid").expect("binary exists");
    cmd.arg("-I").arg(&lib).arg("run").arg(&script);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hi crow"));
}

#[test]
fn corvid_run_missing_file_fails() {
    let mut cmd = Command::cargo_bin("corvid").expect("binary exists");
    cmd.arg("run").arg("demos/does-not-exist.cv");
    cmd.assert().failure().stderr(predicate::str::contains("error"));
}
