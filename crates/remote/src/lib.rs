//! DCI third-party CI remote execution adapter.
//!
//! Implements [`pipeline::RemoteExecutor`] over SSH and
//! [`pipeline::HostProvisioner`] over the local libvirt virtual-setup
//! playbook. [`SshTarget`] is also the session primitive used by the
//! `listener` and `gerrit` crates.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, SSH client options, and output capture
//! live here. The [`pipeline`] crate sees only the port traits.

pub mod executor;
pub mod provisioner;
pub mod ssh;

pub use executor::SshExecutor;
pub use provisioner::{parse_domifaddr, LibvirtProvisioner, ProvisionerSettings};
pub use ssh::{SshTarget, SSH_FAILURE_EXIT_CODE};
