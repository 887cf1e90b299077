//! Error types for the third-party CI domain.
//!
//! Each port has its own error enum. None of them is allowed to escape the
//! reader loop or the dispatch loop; [`FaultKind`] tells those loops what a
//! given error means for them.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Fault classification
// ---------------------------------------------------------------------------

/// How a failure affects the loops that observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Connect, auth or I/O failure on an SSH session or HTTP call. The
    /// affected session is dropped and re-established later.
    Transport,
    /// A single item (feed line, metadata document) could not be interpreted.
    /// Only that item is dropped.
    Decode,
    /// A setup step reported failure. Handled by the configured
    /// [`crate::SetupFailurePolicy`].
    Step,
}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

/// A feed line could not be turned into a [`crate::RawEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event is not a JSON object")]
    NotAnObject,

    #[error("event has no string `type` field")]
    MissingType,
}

impl DecodeError {
    pub fn kind(&self) -> FaultKind {
        FaultKind::Decode
    }
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Errors from [`crate::ArtifactResolver`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The metadata service answered but the expected artifact could not be
    /// located (missing field, unexpected document shape).
    #[error("artifact not found for build '{build}': {reason}")]
    NotFound {
        /// The build URL or id being resolved.
        build: String,
        /// Which part of the lookup failed.
        reason: String,
    },

    /// The metadata service could not be reached or answered with an error.
    #[error("metadata request to {url} failed: {message}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// Transport or status description.
        message: String,
    },
}

impl ResolveError {
    pub fn kind(&self) -> FaultKind {
        match self {
            ResolveError::NotFound { .. } => FaultKind::Decode,
            ResolveError::Http { .. } => FaultKind::Transport,
        }
    }
}

/// Errors from [`crate::RemoteExecutor`].
///
/// A command that runs and exits non-zero is not an error; it is reported
/// through [`crate::CommandOutput::exit_code`].
#[derive(Debug, Error)]
pub enum ExecError {
    /// The session could not be opened or broke while the command ran.
    #[error("remote session to {host} failed: {message}")]
    Session {
        /// Target host.
        host: String,
        /// Underlying failure.
        message: String,
    },
}

impl ExecError {
    pub fn kind(&self) -> FaultKind {
        FaultKind::Transport
    }
}

/// Errors from [`crate::HostProvisioner`].
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A provisioning command exited non-zero.
    #[error("provisioning command `{command}` exited with code {exit_code}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Its exit code.
        exit_code: i32,
    },

    /// Provisioning completed but no host address could be determined.
    #[error("no target host address found: {0}")]
    NoAddress(String),

    /// A provisioning command could not be started.
    #[error("failed to run provisioning command: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    pub fn kind(&self) -> FaultKind {
        match self {
            ProvisionError::CommandFailed { .. } | ProvisionError::NoAddress(_) => FaultKind::Step,
            ProvisionError::Io(_) => FaultKind::Transport,
        }
    }
}

/// Errors from [`crate::ReviewClient`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReviewError {
    /// The review session could not be opened or the command could not be sent.
    #[error("review session failed: {0}")]
    Session(String),

    /// The review server rejected the command.
    #[error("review command rejected (exit code {exit_code}): {stderr}")]
    Rejected {
        /// Exit code of the review command.
        exit_code: i32,
        /// Server-side error output.
        stderr: String,
    },
}

impl ReviewError {
    pub fn kind(&self) -> FaultKind {
        match self {
            ReviewError::Session(_) => FaultKind::Transport,
            ReviewError::Rejected { .. } => FaultKind::Step,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// A pipeline or filter setting is unusable.
///
/// Produced at load time; the process never starts with invalid settings.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid setting `{field}`: {message}")]
pub struct SettingsError {
    /// Dotted path of the offending setting.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl SettingsError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
