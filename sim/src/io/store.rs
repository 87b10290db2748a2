//! Persistence gateway for runs, their event log and evaluation report.
//!
//! The file-backed store keeps one directory per run:
//!
//! ```text
//! <store_dir>/<run_id>/run.json          run record, rewritten atomically on status change
//! <store_dir>/<run_id>/events.jsonl      transcript, one event per line, append-only
//! <store_dir>/<run_id>/evaluation.json   evaluation report, atomic upsert
//! ```

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::core::response::EvaluationReport;
use crate::core::transcript::TranscriptEvent;
use crate::core::types::{Persona, RunMode, Scenario};

const RUN_FILE: &str = "run.json";
const EVENTS_FILE: &str = "events.jsonl";
const EVALUATION_FILE: &str = "evaluation.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Created => "created",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run header written by `create_run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub scenario: Scenario,
    pub personas: Vec<Persona>,
    pub mode: RunMode,
    pub model_name: String,
    pub temperature: f64,
    pub status: RunStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Hydrated run: header, ordered transcript and the optional report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    #[serde(flatten)]
    pub record: RunRecord,
    pub transcript: Vec<TranscriptEvent>,
    pub evaluation: Option<EvaluationReport>,
}

/// Lookup failure for a run id the store has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown run {0}")]
pub struct UnknownRunError(pub Uuid);

/// Persistence gateway consumed by the run state machine and the service.
///
/// Mutating calls on an unknown run fail with [`UnknownRunError`] inside the
/// returned `anyhow::Error`.
pub trait RunStore {
    fn create_run(&self, record: &RunRecord) -> Result<()>;
    fn add_event(&self, run_id: Uuid, event: &TranscriptEvent) -> Result<()>;
    fn set_status(&self, run_id: Uuid, status: RunStatus) -> Result<()>;
    /// Insert or replace the run's evaluation report.
    fn save_evaluation(&self, run_id: Uuid, report: &EvaluationReport) -> Result<()>;
    fn get_run(&self, run_id: Uuid) -> Result<Option<StoredRun>>;
}

/// File-backed [`RunStore`].
#[derive(Debug, Clone)]
pub struct FileRunStore {
    root: PathBuf,
}

impl FileRunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    /// Run directory, or `UnknownRunError` when no run header exists.
    fn existing_run_dir(&self, run_id: Uuid) -> Result<PathBuf> {
        let dir = self.run_dir(run_id);
        if !dir.join(RUN_FILE).is_file() {
            return Err(UnknownRunError(run_id).into());
        }
        Ok(dir)
    }

    fn read_record(&self, dir: &Path) -> Result<RunRecord> {
        read_json(&dir.join(RUN_FILE))
    }
}

impl RunStore for FileRunStore {
    #[instrument(skip_all, fields(run_id = %record.run_id, status = %record.status))]
    fn create_run(&self, record: &RunRecord) -> Result<()> {
        let dir = self.run_dir(record.run_id);
        if dir.join(RUN_FILE).exists() {
            return Err(anyhow!("run {} already exists", record.run_id));
        }
        fs::create_dir_all(&dir).with_context(|| format!("create run dir {}", dir.display()))?;
        write_json_atomic(&dir.join(RUN_FILE), record)?;
        debug!(dir = %dir.display(), "run created");
        Ok(())
    }

    fn add_event(&self, run_id: Uuid, event: &TranscriptEvent) -> Result<()> {
        let path = self.existing_run_dir(run_id)?.join(EVENTS_FILE);
        let mut line = serde_json::to_string(event).context("serialize transcript event")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))?;
        Ok(())
    }

    #[instrument(skip_all, fields(run_id = %run_id, status = %status))]
    fn set_status(&self, run_id: Uuid, status: RunStatus) -> Result<()> {
        let dir = self.existing_run_dir(run_id)?;
        let mut record = self.read_record(&dir)?;
        record.status = status;
        write_json_atomic(&dir.join(RUN_FILE), &record)?;
        debug!("run status updated");
        Ok(())
    }

    fn save_evaluation(&self, run_id: Uuid, report: &EvaluationReport) -> Result<()> {
        let dir = self.existing_run_dir(run_id)?;
        write_json_atomic(&dir.join(EVALUATION_FILE), report)
    }

    fn get_run(&self, run_id: Uuid) -> Result<Option<StoredRun>> {
        let dir = self.run_dir(run_id);
        if !dir.join(RUN_FILE).is_file() {
            return Ok(None);
        }
        let record = self.read_record(&dir)?;
        let transcript = read_events(&dir.join(EVENTS_FILE))?;
        let evaluation_path = dir.join(EVALUATION_FILE);
        let evaluation = if evaluation_path.is_file() {
            Some(read_json(&evaluation_path)?)
        } else {
            None
        };
        Ok(Some(StoredRun {
            record,
            transcript,
            evaluation,
        }))
    }
}

fn read_events(path: &Path) -> Result<Vec<TranscriptEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

/// Write `contents` to a sibling temp file, then rename it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
