//! DCI third-party CI review adapter.
//!
//! Implements [`pipeline::ReviewClient`] by running `gerrit review` over an
//! SSH session as the bot account. Comments carry no label; votes set
//! `Verified` to -1, 0 or +1.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Command quoting and the mapping from ssh exit codes to
//! [`pipeline::ReviewError`] live here.

pub mod review;

pub use review::{review_command, GerritReviewClient};
