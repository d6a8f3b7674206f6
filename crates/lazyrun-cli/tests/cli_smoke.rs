#![cfg(unix)]

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

const RUNTIME_UNAVAILABLE: &str = "evaluation runtime failed to load; reload to try again";

const ECHO_RUNTIME: &str = r#"#!/bin/sh
input=$(cat)
case "$input" in
  "(car '())") echo "car: expected pair" >&2; exit 1 ;;
  "(+ 1 2)") echo 3 ;;
  *) echo "=$input" ;;
esac
"#;

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "lazyrun-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn runtime(&self) -> PathBuf {
        let path = self.path.join("runtime.sh");
        fs::write(&path, ECHO_RUNTIME).expect("runtime script should be written");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("runtime script should be executable");
        path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_lazyrun<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_lazyrun");
    Command::new(bin)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("lazyrun command should execute")
}

fn run_lazyrun_with_stdin(args: &[&str], stdin: &str) -> Output {
    let bin = env!("CARGO_BIN_EXE_lazyrun");
    let mut child = Command::new(bin)
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("lazyrun command should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(stdin.as_bytes())
        .expect("stdin should accept input");
    child
        .wait_with_output()
        .expect("lazyrun command should finish")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn run_prints_results_in_submission_order() {
    let tmp = TempDirGuard::new("run-text");
    let runtime = tmp.runtime();

    let output = run_lazyrun([
        OsStr::new("run"),
        OsStr::new("--module"),
        runtime.as_os_str(),
        OsStr::new("(+ 1 2)"),
        OsStr::new("a"),
        OsStr::new("b"),
    ]);
    assert_success(&output);
    assert_eq!(stdout_of(&output), "[0] 3\n[1] =a\n[2] =b\n");
}

#[test]
fn run_json_reports_errors_and_exits_nonzero() {
    let tmp = TempDirGuard::new("run-json");
    let runtime = tmp.runtime();
    let file = tmp.path().join("input.scm");
    fs::write(&file, "from-file").expect("input file should be written");

    let output = run_lazyrun([
        OsStr::new("run"),
        OsStr::new("--module"),
        runtime.as_os_str(),
        OsStr::new("--json"),
        OsStr::new("(car '())"),
        OsStr::new("--file"),
        file.as_os_str(),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["state"], "ready");
    assert_eq!(payload["errors"], 1);
    let results = payload["results"].as_array().expect("results array");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["index"], 0);
    assert!(results[0].get("seq").is_none());
    assert_eq!(results[0]["isError"], true);
    assert_eq!(results[0]["output"], "car: expected pair");
    assert_eq!(results[1]["input"], "from-file");
    assert_eq!(results[1]["output"], "=from-file");
    assert!(results[1]["completedAt"].is_string());
}

#[test]
fn run_accepts_matching_integrity_from_config_file() {
    let tmp = TempDirGuard::new("run-integrity");
    let runtime = tmp.runtime();
    let digest = format!("sha256:{:x}", Sha256::digest(ECHO_RUNTIME.as_bytes()));
    let config = tmp.path().join("lazyrun.toml");
    fs::write(
        &config,
        format!(
            "module = \"{}\"\nintegrity = \"{digest}\"\nload_timeout_ms = 5000\n",
            runtime.display()
        ),
    )
    .expect("config should be written");

    let output = run_lazyrun([
        OsStr::new("run"),
        OsStr::new("--config"),
        config.as_os_str(),
        OsStr::new("x"),
    ]);
    assert_success(&output);
    assert_eq!(stdout_of(&output), "[0] =x\n");
}

#[test]
fn integrity_mismatch_fails_every_request_with_the_fixed_message() {
    let tmp = TempDirGuard::new("run-mismatch");
    let runtime = tmp.runtime();
    let wrong = format!("sha256:{}", "0".repeat(64));

    let output = run_lazyrun([
        OsStr::new("run"),
        OsStr::new("--module"),
        runtime.as_os_str(),
        OsStr::new("--integrity"),
        OsStr::new(&wrong),
        OsStr::new("--json"),
        OsStr::new("a"),
        OsStr::new("b"),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let payload = parse_json_stdout(&output);
    assert_eq!(payload["state"], "failed");
    for result in payload["results"].as_array().expect("results array") {
        assert_eq!(result["isError"], true);
        assert_eq!(result["output"], RUNTIME_UNAVAILABLE);
    }
    assert!(
        payload["loadError"]
            .as_str()
            .expect("load error recorded")
            .contains("integrity")
    );
}

#[test]
fn missing_module_reports_the_fixed_message() {
    let tmp = TempDirGuard::new("run-missing");
    let missing = tmp.path().join("does-not-exist");

    let output = run_lazyrun([
        OsStr::new("run"),
        OsStr::new("--module"),
        missing.as_os_str(),
        OsStr::new("(+ 1 2)"),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stdout_of(&output),
        format!("[0] error: {RUNTIME_UNAVAILABLE}\n")
    );
}

#[test]
fn check_reports_ready_and_failed_runtimes() {
    let tmp = TempDirGuard::new("check");
    let runtime = tmp.runtime();

    let ok = run_lazyrun([
        OsStr::new("check"),
        OsStr::new("--module"),
        runtime.as_os_str(),
        OsStr::new("--json"),
    ]);
    assert_success(&ok);
    let payload = parse_json_stdout(&ok);
    assert_eq!(payload["state"], "ready");
    assert!(payload["loadError"].is_null());

    let missing = tmp.path().join("missing");
    let failed = run_lazyrun([
        OsStr::new("check"),
        OsStr::new("--module"),
        missing.as_os_str(),
    ]);
    assert_eq!(failed.status.code(), Some(1));
    let text = stdout_of(&failed);
    assert!(text.contains("state: failed"));
    assert!(text.contains("error: failed to fetch runtime"));
}

#[test]
fn repl_runs_lines_and_handles_commands() {
    let tmp = TempDirGuard::new("repl");
    let runtime = tmp.runtime();
    let module = runtime.display().to_string();

    let output = run_lazyrun_with_stdin(
        &["repl", "--module", &module],
        "(+ 1 2)\n(car '())\n:state\n:clear\n:quit\nnever-run\n",
    );
    assert_success(&output);
    assert_eq!(
        stdout_of(&output),
        "3\nerror: car: expected pair\nready\n"
    );
}

#[test]
fn missing_module_flag_is_a_usage_error() {
    let output = run_lazyrun(["run", "x"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--module"));
}
