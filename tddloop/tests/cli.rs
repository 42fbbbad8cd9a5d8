//! CLI tests: spawn the tddloop binary and check stdout and exit codes.

use std::fs;
use std::path::Path;
use std::process::Command;

use tddloop::exit_codes;
use tddloop::io::config::{HarnessConfig, LoopConfig, OracleConfig, load_config, write_config};
use tddloop::test_support::{python_interpreter, well_formed_response};

fn tddloop() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tddloop"));
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Config whose oracle ignores the prompt and prints `response_file`.
fn write_canned_config(root: &Path, response_file: &Path, interpreter: &str) -> std::path::PathBuf {
    let config_path = root.join("tddloop.toml");
    let cfg = LoopConfig {
        max_attempts: 2,
        harness: HarnessConfig {
            interpreter: interpreter.to_string(),
            scratch_dir: Some(root.join("scratch")),
            ..HarnessConfig::default()
        },
        oracle: OracleConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("cat >/dev/null; cat '{}'", response_file.display()),
            ],
            timeout_secs: 30,
            ..OracleConfig::default()
        },
        ..LoopConfig::default()
    };
    write_config(&config_path, &cfg).expect("write config");
    config_path
}

#[test]
fn symbols_lists_top_level_names_in_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("solution.py");
    fs::write(
        &file,
        "import math\n\nLIMIT = 10\n\n@staticmethod\ndef helper():\n    pass\n\nclass Shape:\n    side = 1\n\nasync def fetch():\n    return LIMIT\n",
    )
    .expect("write solution");

    let output = tddloop()
        .arg("symbols")
        .arg(&file)
        .output()
        .expect("tddloop symbols");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let names: Vec<&str> = stdout.lines().collect();
    assert_eq!(names, vec!["LIMIT", "helper", "Shape", "fetch"]);
}

#[test]
fn symbols_reports_syntax_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("broken.py");
    fs::write(&file, "def add(a, b)\n    return a + b\n").expect("write solution");

    let output = tddloop()
        .arg("symbols")
        .arg(&file)
        .output()
        .expect("tddloop symbols");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no importable symbols found"));
}

#[test]
fn init_writes_default_config_and_refuses_to_clobber() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_path = temp.path().join("tddloop.toml");

    let output = tddloop()
        .current_dir(temp.path())
        .arg("init")
        .output()
        .expect("tddloop init");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&config_path).expect("load"), LoopConfig::default());

    fs::write(&config_path, "max_attempts = 9\n").expect("edit config");
    let output = tddloop()
        .current_dir(temp.path())
        .arg("init")
        .output()
        .expect("tddloop init");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--force"));
    assert_eq!(load_config(&config_path).expect("load").max_attempts, 9);

    let output = tddloop()
        .current_dir(temp.path())
        .args(["init", "--force"])
        .output()
        .expect("tddloop init --force");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&config_path).expect("load"), LoopConfig::default());
}

#[test]
fn run_rejects_zero_max_attempts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = tddloop()
        .current_dir(temp.path())
        .args(["run", "add two numbers", "--max-attempts", "0"])
        .output()
        .expect("tddloop run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_attempts"));
}

#[cfg(unix)]
#[test]
fn run_passes_with_canned_oracle() {
    let Some(python) = python_interpreter() else {
        eprintln!("skipping: no python interpreter available");
        return;
    };
    let temp = tempfile::tempdir().expect("tempdir");
    let response = temp.path().join("response.txt");
    fs::write(
        &response,
        well_formed_response(
            "def add(a, b):\n    return a + b",
            "class TestAdd(unittest.TestCase):\n    def test_add(self):\n        self.assertEqual(add(2, 2), 4)",
        ),
    )
    .expect("write response");
    let config = write_canned_config(temp.path(), &response, &python);

    let output = tddloop()
        .arg("--config")
        .arg(&config)
        .args(["run", "add two numbers", "--json"])
        .output()
        .expect("tddloop run");

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(outcome["passed"], serde_json::json!(true));
    assert_eq!(outcome["stop"]["reason"], serde_json::json!("passed"));
    assert_eq!(outcome["attempts"].as_array().map(Vec::len), Some(1));
}

#[cfg(unix)]
#[test]
fn run_exhausts_on_malformed_responses() {
    let temp = tempfile::tempdir().expect("tempdir");
    let response = temp.path().join("response.txt");
    fs::write(&response, "no markers here").expect("write response");
    let config = write_canned_config(temp.path(), &response, "python3");

    let output = tddloop()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .stdin(std::process::Stdio::null())
        .arg("add two numbers")
        .output()
        .expect("tddloop run");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Attempt 1/2"));
    assert!(stdout.contains("Attempt 2/2"));
    assert!(stdout.contains("Max attempts reached. Human review required."));
    assert!(stdout.contains("missing marker [FUNCTION]"));
}

#[cfg(unix)]
#[test]
fn run_reports_oracle_failure_with_its_own_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_path = temp.path().join("tddloop.toml");
    let cfg = LoopConfig {
        oracle: OracleConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
            ..OracleConfig::default()
        },
        ..LoopConfig::default()
    };
    write_config(&config_path, &cfg).expect("write config");

    let output = tddloop()
        .arg("--config")
        .arg(&config_path)
        .args(["run", "--json"])
        .arg("add two numbers")
        .output()
        .expect("tddloop run");

    assert_eq!(output.status.code(), Some(exit_codes::ORACLE_ERROR));
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(outcome["stop"]["reason"], serde_json::json!("oracle_error"));
    assert_eq!(outcome["attempts"].as_array().map(Vec::len), Some(1));
}

#[cfg(unix)]
#[test]
fn run_reads_task_from_stdin() {
    use std::io::Write;
    use std::process::Stdio;

    let temp = tempfile::tempdir().expect("tempdir");
    let response = temp.path().join("response.txt");
    fs::write(&response, "still no markers").expect("write response");
    let config = write_canned_config(temp.path(), &response, "python3");

    let mut child = tddloop()
        .arg("--config")
        .arg(&config)
        .args(["run", "--max-attempts", "1", "--json"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn tddloop");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"add two numbers\n")
        .expect("write task");
    let output = child.wait_with_output().expect("wait tddloop");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(outcome["attempts"].as_array().map(Vec::len), Some(1));
}
