//! Shared value types for the third-party CI domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (a vote is one of three values, a raw event
//! always has a `type` discriminator) and participate in domain decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DecodeError;
use crate::job_id::JOB_NOT_FOUND;
use crate::{
    ArtifactUrl, BuildUrl, HostAddress, JobId, PatchsetRef, PatchsetVersion, ReviewNumber,
    TriggerRunId,
};

// ---------------------------------------------------------------------------
// Raw events
// ---------------------------------------------------------------------------

/// One record decoded from a line of the Gerrit event feed.
///
/// No schema is assumed beyond a string `type` discriminator. Relevant events
/// also carry a `project` field, which newer Gerrit versions place at the top
/// level and older ones only under `change.project`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent(Value);

impl RawEvent {
    /// Decodes a single feed line.
    ///
    /// Fails if the line is not JSON, is not a JSON object, or has no string
    /// `type` field.
    pub fn from_line(line: &str) -> Result<Self, DecodeError> {
        Self::from_bytes(line.as_bytes())
    }

    /// Decodes a feed line as received off the wire. Bytes that are not valid
    /// UTF-8 fail like any other malformed JSON.
    pub fn from_bytes(line: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(line.trim_ascii())?;
        Self::from_value(value)
    }

    /// Wraps an already-decoded JSON value, applying the same checks as
    /// [`RawEvent::from_line`].
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        if value.get("type").and_then(Value::as_str).is_none() {
            return Err(DecodeError::MissingType);
        }
        Ok(Self(value))
    }

    /// The event kind, e.g. `"comment-added"`.
    pub fn event_type(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    /// The project the event refers to, if any.
    pub fn project(&self) -> Option<&str> {
        self.0
            .get("project")
            .and_then(Value::as_str)
            .or_else(|| self.0.pointer("/change/project").and_then(Value::as_str))
    }

    /// Looks up a nested field by JSON pointer (e.g. `"/author/username"`).
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// The normalized record that authorizes one validation run for one patchset.
///
/// Built fresh from a qualifying [`RawEvent`] and never persisted. Every field
/// is populated; extraction never yields a partial trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Gerrit change number.
    pub review_number: ReviewNumber,
    /// Patchset number within the change.
    pub patchset_version: PatchsetVersion,
    /// Git ref the patchset is published under.
    pub patchset_ref: PatchsetRef,
    /// Web URL of the change, for log correlation.
    pub review_url: Option<String>,
    /// URL of the Zuul build that produced the package.
    pub artifact_locator: BuildUrl,
    /// Download URL of the package resolved from `artifact_locator`.
    pub artifact_url: ArtifactUrl,
}

impl Trigger {
    /// The `(review, patchset)` pair identifying what this trigger validates.
    pub fn key(&self) -> (ReviewNumber, PatchsetVersion) {
        (self.review_number, self.patchset_version)
    }
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

/// Value of the `Verified` label posted back to the review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    /// `-1`
    Reject,
    /// `0`
    Neutral,
    /// `+1`
    Approve,
}

impl Vote {
    /// Returns the numeric label value.
    pub fn as_i8(self) -> i8 {
        match self {
            Vote::Reject => -1,
            Vote::Neutral => 0,
            Vote::Approve => 1,
        }
    }
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

// ---------------------------------------------------------------------------
// Remote execution
// ---------------------------------------------------------------------------

/// A host the validation steps run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetHost {
    /// Address the remote executor connects to.
    pub address: HostAddress,
}

impl TargetHost {
    /// Creates a target host from its address.
    pub fn new(address: HostAddress) -> Self {
        Self { address }
    }
}

impl std::fmt::Display for TargetHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Exit status and captured output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was killed by a signal.
    pub exit_code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ---------------------------------------------------------------------------
// Pipeline outcome
// ---------------------------------------------------------------------------

/// The fixed steps of the validation pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Post the "in progress" comment.
    AnnounceStart,
    /// Obtain a target host.
    Provision,
    /// Fetch the reviewed patchset on the target host.
    FetchPatchset,
    /// Download and install the resolved package.
    InstallArtifact,
    /// Build the agent container.
    BuildContainer,
    /// Run the agent and capture the job id.
    RunAgent,
}

impl PipelineStep {
    /// Stable name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            PipelineStep::AnnounceStart => "announce_start",
            PipelineStep::Provision => "provision",
            PipelineStep::FetchPatchset => "fetch_patchset",
            PipelineStep::InstallArtifact => "install_artifact",
            PipelineStep::BuildContainer => "build_container",
            PipelineStep::RunAgent => "run_agent",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: PipelineStep,
    /// Exit code of the last command the step ran. `None` when the step never
    /// produced one (transport error, or a step without a command).
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration_ms: u64,
}

/// The terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub run_id: TriggerRunId,
    /// `true` only when the agent ran successfully and a job id was captured.
    pub success: bool,
    pub vote: Vote,
    pub job_id: Option<JobId>,
    /// Reports for every step that was attempted, in order.
    pub steps: Vec<StepReport>,
    pub started_at: Timestamp,
}

impl PipelineOutcome {
    /// The job id, or the `job_not_found` sentinel when none was captured.
    pub fn job_reference(&self) -> &str {
        self.job_id.as_ref().map(JobId::as_str).unwrap_or(JOB_NOT_FOUND)
    }

    /// Reports of steps that did not succeed.
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| !s.success)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
