//! CLI tests for `persona-sim run` and `persona-sim show`.
//!
//! Spawns the binary against a temp directory and verifies exit codes and
//! output. The model is a small shell script that answers from fixture files,
//! so these tests only run on unix.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use persona_sim::core::response::Stance;
use persona_sim::exit_codes;
use persona_sim::io::config::{ResponderConfig, SimConfig, write_config};
use persona_sim::io::store::{FileRunStore, RunStatus, RunStore};
use persona_sim::test_support::{payload, persona, report, run_request, stimulus};
use uuid::Uuid;

struct Workspace {
    temp: tempfile::TempDir,
}

impl Workspace {
    /// Config whose model answers with the evaluation report when the
    /// conversation is an evaluator prompt and with a persona payload otherwise.
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let persona_json = root.join("persona.json");
        let report_json = root.join("report.json");
        fs::write(
            &persona_json,
            serde_json::to_string(&payload(Stance::Yes, &[])).expect("payload json"),
        )
        .expect("write persona fixture");
        fs::write(
            &report_json,
            serde_json::to_string(&report(0.2)).expect("report json"),
        )
        .expect("write report fixture");

        let script = format!(
            "if grep -c 'impartial evaluator' >/dev/null; then cat '{}'; else cat '{}'; fi",
            report_json.display(),
            persona_json.display()
        );
        let config = SimConfig {
            store_dir: root.join("runs"),
            responder: ResponderConfig {
                command: vec!["sh".to_string(), "-c".to_string(), script],
                timeout_secs: 10,
                output_limit_bytes: 100_000,
            },
            ..SimConfig::default()
        };
        write_config(&root.join("persona-sim.toml"), &config).expect("write config");
        Self { temp }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn store(&self) -> FileRunStore {
        FileRunStore::new(self.path().join("runs"))
    }

    fn write_request(&self, name: &str, steps: i64) -> PathBuf {
        let request = run_request(
            vec![persona("Alice")],
            vec![stimulus("Automated evidence collection")],
            "multi-turn",
            steps,
        );
        let path = self.path().join(name);
        fs::write(
            &path,
            serde_json::to_string_pretty(&request).expect("request json"),
        )
        .expect("write request");
        path
    }

    fn sim(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_persona-sim"))
            .current_dir(self.path())
            .args(args)
            .output()
            .expect("persona-sim")
    }
}

#[test]
fn run_prints_id_and_show_returns_completed_run() {
    let ws = Workspace::new();
    let request = ws.write_request("request.json", 2);

    let output = ws.sim(&["run", request.to_str().expect("utf8 path")]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let run_id: Uuid = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .expect("run id");

    let stored = ws.store().get_run(run_id).expect("get").expect("stored run");
    assert_eq!(stored.record.status, RunStatus::Completed);
    assert_eq!(stored.evaluation, Some(report(0.2)));

    let output = ws.sim(&["show", &run_id.to_string(), "--trust"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).expect("show json");
    assert_eq!(shown["run_id"], run_id.to_string());
    assert_eq!(shown["status"], "completed");
    let alice = stored.record.personas[0].id.to_string();
    let trust = shown["trust"][alice.as_str()]["trust_score"]
        .as_f64()
        .expect("trust score");
    assert!((trust - 0.6).abs() < 1e-9);
}

#[test]
fn invalid_request_exits_with_invalid_code() {
    let ws = Workspace::new();
    let request = ws.write_request("request.json", 0);

    let output = ws.sim(&["run", request.to_str().expect("utf8 path")]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("steps must be positive"));
    assert!(!ws.path().join("runs").exists());
}

#[test]
fn unsupported_request_format_exits_with_invalid_code() {
    let ws = Workspace::new();
    let request = ws.path().join("request.yaml");
    fs::write(&request, "steps: 1\n").expect("write");

    let output = ws.sim(&["run", request.to_str().expect("utf8 path")]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn show_unknown_run_exits_with_not_found_code() {
    let ws = Workspace::new();
    let output = ws.sim(&["show", &Uuid::new_v4().to_string()]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
}

#[test]
fn failing_model_exits_with_run_failed_code() {
    let ws = Workspace::new();
    let config = SimConfig {
        store_dir: ws.path().join("runs"),
        responder: ResponderConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat >/dev/null; echo model offline >&2; exit 7".to_string(),
            ],
            ..ResponderConfig::default()
        },
        ..SimConfig::default()
    };
    write_config(&ws.path().join("broken.toml"), &config).expect("write config");
    let request = ws.write_request("request.json", 1);

    let output = ws.sim(&[
        "--config",
        "broken.toml",
        "run",
        request.to_str().expect("utf8 path"),
    ]);
    assert_eq!(output.status.code(), Some(exit_codes::RUN_FAILED));
    assert!(String::from_utf8_lossy(&output.stderr).contains("model offline"));

    let runs: Vec<_> = fs::read_dir(ws.path().join("runs"))
        .expect("runs dir")
        .collect();
    assert_eq!(runs.len(), 1);
}
