//! Core domain for the DCI third-party CI bridge.
//!
//! This crate turns Gerrit stream events into validation runs: it decides which
//! events qualify, extracts a [`Trigger`] from them, walks the fixed validation
//! pipeline, and maps the result to a `Verified` vote. Infrastructure crates
//! implement the port traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no network or
//! process I/O. It defines *what* is needed; `listener`, `remote`, `gerrit` and
//! `zuul` define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ReviewNumber`, `PatchsetRef`, `BuildUrl`, etc.) |
//! | [`types`] | Value types (`RawEvent`, `Trigger`, `Vote`, `PipelineOutcome`, etc.) |
//! | [`errors`] | Per-port error types and the [`FaultKind`] classification |
//! | [`ports`] | Collaborator traits implemented by infrastructure crates |
//! | [`filter`] | Event matching and trigger extraction |
//! | [`orchestrator`] | The six-step validation pipeline |
//! | [`dispatch`] | The queue-consuming dispatch loop |
//! | [`queue`] / [`shutdown`] | Plumbing shared with the stream reader |

pub mod dedup;
pub mod dispatch;
pub mod errors;
pub mod filter;
pub mod identifiers;
pub mod job_id;
pub mod orchestrator;
pub mod ports;
pub mod queue;
pub mod settings;
pub mod shutdown;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use dispatch::{DispatchReport, Dispatcher};
pub use errors::{
    DecodeError, ExecError, FaultKind, ProvisionError, ResolveError, ReviewError, SettingsError,
};
pub use filter::{extract_trigger, find_build_locator, match_event, Candidate, FilterCriteria};
pub use identifiers::{
    ArtifactUrl, BuildUrl, HostAddress, JobId, PatchsetRef, PatchsetVersion, ReviewNumber,
    TriggerRunId,
};
pub use job_id::{extract_job_id, JOB_NOT_FOUND};
pub use orchestrator::OrchestrationPipeline;
pub use ports::{ArtifactResolver, HostProvisioner, RemoteExecutor, ReviewClient};
pub use queue::{event_queue, EventReceiver, EventSender, QueueClosed};
pub use settings::{shell_quote, PipelineSettings, SetupFailurePolicy};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use types::{
    CommandOutput, PipelineOutcome, PipelineStep, RawEvent, StepReport, TargetHost, Timestamp,
    Trigger, Vote,
};
