//! Execution snapshot: the peer's latest complete view of a running analysis.
//!
//! Every field is `#[serde(default)]` so a snapshot from an older or newer
//! peer still decodes; unknown fields are ignored.

use serde::{Deserialize, Deserializer, Serialize};

/// Decode `null` as the type's default. The peer sends `None` for text it
/// never captured.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Status of one plan step. Upper-case on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    /// Planned, not yet run.
    #[default]
    Pending,
    /// Code for this step is running.
    Executing,
    /// Ran successfully.
    Completed,
    /// Ran and failed after all debug attempts.
    Failed,
    /// Invalidated by a backtrack; this and later steps may be replaced.
    Backtracked,
}

impl StepStatus {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Executing => "EXECUTING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Backtracked => "BACKTRACKED",
        }
    }
}

/// One step of the agent's analysis plan.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanStep {
    /// Zero-based position in the plan.
    pub index: u32,
    /// What the step does.
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    /// Current status.
    pub status: StepStatus,
    /// When the peer created the step, ISO-8601 as sent (may lack an offset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// The peer's analysis of one input file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDescriptor {
    /// Path as the peer sees it.
    pub path: String,
    /// Declared type, e.g. `csv`.
    #[serde(deserialize_with = "null_as_default")]
    pub file_type: String,
    /// Human-readable summary.
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    /// Row count for tabular files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// Column schema, shape chosen by the peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    /// Sample rows rendered as text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<String>,
    /// File size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Outcome of one remote code execution. Immutable once received.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionResult {
    /// Whether the code ran without error.
    pub success: bool,
    /// Captured standard output.
    #[serde(deserialize_with = "null_as_default")]
    pub stdout: String,
    /// Captured standard error.
    #[serde(deserialize_with = "null_as_default")]
    pub stderr: String,
    /// Traceback for runtime faults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_traceback: Option<String>,
    /// Wall time in milliseconds.
    pub execution_time_ms: f64,
}

/// Latest known progress of the active session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSnapshot {
    /// Query the peer is answering.
    pub query: String,
    /// Files the peer is reading.
    pub data_files: Vec<String>,
    /// Per-file analyses, in peer order.
    pub file_descriptions: Vec<FileDescriptor>,
    /// Plan steps, in plan order.
    pub steps: Vec<PlanStep>,
    /// Most recently generated code.
    pub current_code: Option<String>,
    /// Execution results, oldest first.
    pub execution_results: Vec<ExecutionResult>,
    /// Iteration counter as reported inside the snapshot.
    pub iteration: u32,
    /// Whether the verifier judged the plan sufficient.
    pub is_complete: bool,
    /// Answer text, only set by the peer on the final snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

/// Coarse progress classification derived from a snapshot. Never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No file has been described yet.
    Analyzing,
    /// Files described, plan not yet sufficient.
    Planning,
    /// Plan judged sufficient, answer being produced.
    Finalizing,
}

impl Phase {
    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Planning => "planning",
            Self::Finalizing => "finalizing",
        }
    }
}

impl ExecutionSnapshot {
    /// Classify progress. Pure; recomputed on every call.
    pub fn phase(&self) -> Phase {
        if self.file_descriptions.is_empty() {
            Phase::Analyzing
        } else if !self.is_complete {
            Phase::Planning
        } else {
            Phase::Finalizing
        }
    }

    /// Index of the earliest backtracked step, if any.
    pub fn backtrack_point(&self) -> Option<u32> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Backtracked)
            .map(|s| s.index)
            .min()
    }

    /// The most recent execution result.
    pub fn latest_result(&self) -> Option<&ExecutionResult> {
        self.execution_results.last()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
