//! Port traits implemented by the infrastructure crates.
//!
//! The orchestration code in this crate only ever sees these traits. `zuul`
//! implements [`ArtifactResolver`], `remote` implements [`RemoteExecutor`] and
//! [`HostProvisioner`], and `gerrit` implements [`ReviewClient`].

use async_trait::async_trait;

use crate::{
    ArtifactUrl, BuildUrl, CommandOutput, ExecError, PatchsetVersion, ProvisionError,
    ResolveError, ReviewError, ReviewNumber, TargetHost, Vote,
};

/// Resolves a build-artifact locator into a concrete download URL.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    /// Must fail closed: any unexpected metadata shape is
    /// [`ResolveError::NotFound`], never a panic.
    async fn resolve(&self, locator: &BuildUrl) -> Result<ArtifactUrl, ResolveError>;
}

/// Runs one command on a target host and waits for it to finish.
///
/// There is no implicit retry and no timeout; a hung command blocks the caller.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, host: &TargetHost, command: &str)
        -> Result<CommandOutput, ExecError>;
}

/// Obtains a host on which to run the validation steps.
#[async_trait]
pub trait HostProvisioner: Send + Sync {
    async fn provision(&self) -> Result<TargetHost, ProvisionError>;
}

/// Posts feedback on a review.
///
/// The pipeline treats both operations as fire-and-forget: errors are logged
/// and never change the pipeline's course.
#[async_trait]
pub trait ReviewClient: Send + Sync {
    /// Adds a plain comment to a patchset.
    async fn comment(
        &self,
        review: ReviewNumber,
        patchset: PatchsetVersion,
        text: &str,
    ) -> Result<(), ReviewError>;

    /// Sets the `Verified` label on a patchset with an accompanying message.
    async fn vote(
        &self,
        review: ReviewNumber,
        patchset: PatchsetVersion,
        vote: Vote,
        message: &str,
    ) -> Result<(), ReviewError>;
}
