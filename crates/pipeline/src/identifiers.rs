//! Newtype identifiers for Gerrit, Zuul and DCI values.
//!
//! Review numbers, patchset versions, refs and URLs are all plain integers or
//! strings on the wire. Wrapping each one keeps a [`ReviewNumber`] from being
//! passed where a [`PatchsetVersion`] is expected, and a [`BuildUrl`] from being
//! downloaded as if it were an [`ArtifactUrl`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// String newtypes: non-empty on construction, borrowed as &str, Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for u64-wrapped newtypes (Gerrit-assigned integers).
// Copy, infallible new(), as_u64(), Display.
// ---------------------------------------------------------------------------
macro_rules! u64_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Gerrit-assigned integers
// ---------------------------------------------------------------------------

u64_id! {
    /// The Gerrit change number of a review (`change.number` in stream events).
    ReviewNumber
}

u64_id! {
    /// The patchset number within a review (`patchSet.number` in stream events).
    PatchsetVersion
}

// ---------------------------------------------------------------------------
// Generated locally
// ---------------------------------------------------------------------------

/// Identifies a single pipeline run for one [`crate::Trigger`].
///
/// Generated fresh for every accepted trigger; recorded on the run span so all
/// log lines from one validation run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerRunId(Uuid);

impl TriggerRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TriggerRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

string_id! {
    /// A Git ref under which Gerrit publishes a patchset
    /// (e.g. `"refs/changes/45/12345/3"`).
    PatchsetRef
}

string_id! {
    /// URL of the companion Zuul build job that produced the package under
    /// review. This is the artifact locator embedded in Zuul's comment.
    BuildUrl
}

impl BuildUrl {
    /// Returns the build identifier: the last non-empty path segment.
    pub fn build_id(&self) -> Option<&str> {
        self.0.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
    }
}

string_id! {
    /// Concrete download URL of the package resolved from a [`BuildUrl`].
    ArtifactUrl
}

impl ArtifactUrl {
    /// Returns the file name component of the URL.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

string_id! {
    /// A DCI job identifier captured from the agent's output.
    JobId
}

string_id! {
    /// Address (IP or hostname) of the provisioned target host.
    HostAddress
}
