//! DCI third-party CI artifact adapter.
//!
//! Implements [`pipeline::ArtifactResolver`] against the Zuul REST API: a
//! `dci-rpm-build` build URL found in a review comment becomes the download
//! URL of the package that build published.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP, the Zuul manifest layout, and URL joining live
//! here. The [`pipeline`] crate sees only [`pipeline::BuildUrl`] in and
//! [`pipeline::ArtifactUrl`] out.

pub mod resolver;

pub use resolver::{
    artifact_name_from_manifest, artifact_url, log_url_from_build, ZuulResolver, ZuulSettings,
};
