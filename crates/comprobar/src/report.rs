//! Step results, scenario reports and report sinks.
//!
//! ```text
//! ┌────────────────┐  record  ┌──────────────┐  flush  ┌────────────────────────┐
//! │ ScenarioRunner │ ───────▶ │  ReportSink  │ ──────▶ │ <scenario>/report.json │
//! └────────────────┘          └──────────────┘         └────────────────────────┘
//!                                    │
//!                                    ▼
//!                             ScenarioReport ──▶ BatchReport (exit code)
//! ```
//!
//! Results are append-only and name elements by their semantic reference,
//! never by a concrete selector.

use crate::driver::{ArtifactKind, ArtifactRef};
use crate::login::LoginState;
use crate::result::{ComprobarResult, FailureKind};
use crate::scenario::{slugify, Role};
use crate::selector::UiRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Result of a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Step succeeded
    Passed,
    /// The application did not behave as expected
    Failed {
        /// Failure kind
        kind: FailureKind,
        /// Human-readable reason
        reason: String,
    },
    /// The harness could not evaluate the step
    Errored {
        /// Failure kind
        kind: FailureKind,
        /// Underlying cause
        cause: String,
    },
}

impl StepOutcome {
    /// Build a non-passing outcome, routing by kind
    #[must_use]
    pub fn from_kind(kind: FailureKind, detail: impl Into<String>) -> Self {
        if kind.is_error() {
            Self::Errored {
                kind,
                cause: detail.into(),
            }
        } else {
            Self::Failed {
                kind,
                reason: detail.into(),
            }
        }
    }

    /// Whether the step passed
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Failure kind, if any
    #[must_use]
    pub const fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Passed => None,
            Self::Failed { kind, .. } | Self::Errored { kind, .. } => Some(*kind),
        }
    }

    /// Reason or cause, if any
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Failed { reason, .. } => Some(reason),
            Self::Errored { cause, .. } => Some(cause),
        }
    }
}

/// Recorded outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the scenario; the trailing final-state check uses `steps.len()`
    pub index: usize,
    /// Semantic step label
    pub step: String,
    /// Element the step targeted
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ui_ref: Option<UiRef>,
    /// Outcome
    pub outcome: StepOutcome,
    /// When the step finished
    pub timestamp: DateTime<Utc>,
    /// Wall time spent on the step
    pub duration_ms: u64,
    /// Captured evidence: a screenshot and, when available, an HTML snapshot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
}

impl StepResult {
    /// Create a result stamped now
    #[must_use]
    pub fn new(
        index: usize,
        step: impl Into<String>,
        outcome: StepOutcome,
        duration: Duration,
    ) -> Self {
        Self {
            index,
            step: step.into(),
            ui_ref: None,
            outcome,
            timestamp: Utc::now(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            artifacts: Vec::new(),
        }
    }

    /// Record the targeted element
    #[must_use]
    pub fn with_ref(mut self, ui_ref: Option<UiRef>) -> Self {
        self.ui_ref = ui_ref;
        self
    }

    /// Attach an artifact
    #[must_use]
    pub fn with_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Attach several artifacts
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: impl IntoIterator<Item = ArtifactRef>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }

    /// The screenshot attached to this step
    #[must_use]
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::Screenshot)
    }

    /// `step 2 (admin-panel-heading): assertion_timeout: ...`
    #[must_use]
    pub fn failure_line(&self) -> Option<String> {
        let kind = self.outcome.kind()?;
        let detail = self.outcome.detail().unwrap_or_default();
        let target = self
            .ui_ref
            .as_ref()
            .map_or_else(|| self.step.clone(), ToString::to_string);
        Some(format!("step {} ({target}): {kind}: {detail}", self.index))
    }
}

/// Overall scenario status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Every step passed
    Passed,
    /// A step failed
    Failed,
    /// A step errored
    Errored,
}

impl ScenarioStatus {
    /// Status implied by a list of results
    #[must_use]
    pub fn from_results(results: &[StepResult]) -> Self {
        let mut status = Self::Passed;
        for result in results {
            match result.outcome {
                StepOutcome::Errored { .. } => return Self::Errored,
                StepOutcome::Failed { .. } => status = Self::Failed,
                StepOutcome::Passed => {}
            }
        }
        status
    }

    /// Whether the scenario passed
    #[must_use]
    pub const fn is_passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
        })
    }
}

/// Everything recorded for one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Overall status
    pub status: ScenarioStatus,
    /// Expected final role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Role>,
    /// Login state the session ended in
    pub final_state: LoginState,
    /// Step results, in order
    pub steps: Vec<StepResult>,
    /// Most recent screenshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_artifact: Option<ArtifactRef>,
    /// When the scenario started
    pub started_at: DateTime<Utc>,
    /// Wall time of the whole scenario
    pub duration_ms: u64,
}

impl ScenarioReport {
    /// Build a report from recorded results
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        expect: Option<Role>,
        final_state: LoginState,
        steps: Vec<StepResult>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let last_artifact = steps.iter().rev().find_map(StepResult::artifact).cloned();
        Self {
            name: name.into(),
            status: ScenarioStatus::from_results(&steps),
            expect,
            final_state,
            steps,
            last_artifact,
            started_at,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// First non-passing step
    #[must_use]
    pub fn failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.outcome.is_passed())
    }

    /// One-line summary
    #[must_use]
    pub fn summary_line(&self) -> String {
        match self.failure().and_then(StepResult::failure_line) {
            Some(line) => format!("{} [{}] {line}", self.name, self.status),
            None => format!(
                "{} [{}] {} steps in {}ms",
                self.name,
                self.status,
                self.steps.len(),
                self.duration_ms
            ),
        }
    }
}

/// Reports for a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Unique run id
    pub run_id: Uuid,
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// Wall time of the batch
    pub duration_ms: u64,
    /// Scenario reports, in input order
    pub scenarios: Vec<ScenarioReport>,
}

impl BatchReport {
    /// Create a batch report with a fresh run id
    #[must_use]
    pub fn new(
        started_at: DateTime<Utc>,
        duration: Duration,
        scenarios: Vec<ScenarioReport>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            scenarios,
        }
    }

    /// Number of scenarios with a status
    #[must_use]
    pub fn count(&self, status: ScenarioStatus) -> usize {
        self.scenarios.iter().filter(|s| s.status == status).count()
    }

    /// Whether every scenario passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.status.is_passed())
    }

    /// 0 when every scenario passed, 1 otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_passed())
    }

    /// `4 scenarios: 3 passed, 1 failed, 0 errored`
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "{} scenarios: {} passed, {} failed, {} errored",
            self.scenarios.len(),
            self.count(ScenarioStatus::Passed),
            self.count(ScenarioStatus::Failed),
            self.count(ScenarioStatus::Errored)
        )
    }

    /// One line per non-passing scenario
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.scenarios
            .iter()
            .filter(|s| !s.status.is_passed())
            .map(ScenarioReport::summary_line)
            .collect()
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> ComprobarResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write as JSON, creating parent directories
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn write(&self, path: &Path) -> ComprobarResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Destination for step results
pub trait ReportSink: Send {
    /// Append a step result for a scenario
    ///
    /// # Errors
    ///
    /// Returns error if the result cannot be stored
    fn record(&mut self, scenario: &str, result: &StepResult) -> ComprobarResult<()>;

    /// Called once when a scenario finishes
    ///
    /// # Errors
    ///
    /// Returns error if the report cannot be persisted
    fn flush(&mut self, report: &ScenarioReport) -> ComprobarResult<()>;
}

/// Keeps results in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: BTreeMap<String, Vec<StepResult>>,
    last_artifacts: BTreeMap<String, ArtifactRef>,
    flushed: Vec<String>,
}

impl MemorySink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Results recorded for a scenario
    #[must_use]
    pub fn records(&self, scenario: &str) -> &[StepResult] {
        self.records.get(scenario).map_or(&[], Vec::as_slice)
    }

    /// Most recent screenshot recorded for a scenario
    #[must_use]
    pub fn last_artifact(&self, scenario: &str) -> Option<&ArtifactRef> {
        self.last_artifacts.get(scenario)
    }

    /// Scenarios flushed so far, in order
    #[must_use]
    pub fn flushed(&self) -> &[String] {
        &self.flushed
    }
}

impl ReportSink for MemorySink {
    fn record(&mut self, scenario: &str, result: &StepResult) -> ComprobarResult<()> {
        if let Some(artifact) = result.artifact() {
            self.last_artifacts
                .insert(scenario.to_string(), artifact.clone());
        }
        self.records
            .entry(scenario.to_string())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    fn flush(&mut self, report: &ScenarioReport) -> ComprobarResult<()> {
        self.flushed.push(report.name.clone());
        Ok(())
    }
}

/// Writes `<dir>/<scenario-slug>/report.json` on flush
#[derive(Debug, Clone)]
pub struct JsonSink {
    dir: PathBuf,
    memory: MemorySink,
}

impl JsonSink {
    /// Create a sink writing under `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            memory: MemorySink::new(),
        }
    }

    /// Path the report for `scenario` is written to
    #[must_use]
    pub fn report_path(&self, scenario: &str) -> PathBuf {
        self.dir.join(slugify(scenario)).join("report.json")
    }

    /// Records kept in memory
    #[must_use]
    pub const fn memory(&self) -> &MemorySink {
        &self.memory
    }
}

impl ReportSink for JsonSink {
    fn record(&mut self, scenario: &str, result: &StepResult) -> ComprobarResult<()> {
        self.memory.record(scenario, result)
    }

    fn flush(&mut self, report: &ScenarioReport) -> ComprobarResult<()> {
        let path = self.report_path(&report.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
        debug!(scenario = %report.name, path = %path.display(), "scenario report written");
        self.memory.flush(report)
    }
}
