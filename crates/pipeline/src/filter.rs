//! Event filtering and trigger extraction.
//!
//! [`match_event`] decides whether a [`RawEvent`] is a Zuul `Verified +1`
//! comment on the watched project and pulls the review coordinates out of it.
//! [`extract_trigger`] then locates the companion build in the comment text and
//! resolves its package URL. Either a complete [`Trigger`] comes out, or nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    ArtifactResolver, BuildUrl, PatchsetRef, PatchsetVersion, RawEvent, ReviewNumber,
    SettingsError, Trigger,
};

/// What a qualifying event must look like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Gerrit project to watch.
    pub project: String,
    /// Event `type` discriminator.
    pub event_type: String,
    /// `author.username` of the commenting account.
    pub author: String,
    /// Approval label that must be present.
    pub approval_label: String,
    /// Value the label must carry, as a string (Gerrit sends `"1"`, not `1`).
    pub approval_value: String,
    /// Text identifying the comment line that links the package build job.
    pub build_marker: String,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            project: "dci-rhel-agent".to_string(),
            event_type: "comment-added".to_string(),
            author: "zuul".to_string(),
            approval_label: "Verified".to_string(),
            approval_value: "1".to_string(),
            build_marker: "dci-rpm-build".to_string(),
        }
    }
}

impl FilterCriteria {
    /// Rejects criteria with empty fields, which would match nothing useful.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let fields = [
            ("filter.project", &self.project),
            ("filter.event_type", &self.event_type),
            ("filter.author", &self.author),
            ("filter.approval_label", &self.approval_label),
            ("filter.approval_value", &self.approval_value),
            ("filter.build_marker", &self.build_marker),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(SettingsError::new(name, "must not be empty"));
            }
        }
        Ok(())
    }
}

/// Review coordinates of an event that passed [`match_event`], before the
/// build artifact has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub review_number: ReviewNumber,
    pub patchset_version: PatchsetVersion,
    pub patchset_ref: PatchsetRef,
    pub review_url: Option<String>,
    pub comment: String,
}

/// Returns the review coordinates if `event` satisfies `criteria`.
///
/// Pure and total: any missing or mistyped field yields `None`.
pub fn match_event(event: &RawEvent, criteria: &FilterCriteria) -> Option<Candidate> {
    if event.project()? != criteria.project {
        return None;
    }
    if event.event_type() != criteria.event_type {
        return None;
    }
    if event.pointer("/author/username")?.as_str()? != criteria.author {
        return None;
    }

    let approvals = event.pointer("/approvals")?.as_array()?;
    let verified = approvals.iter().any(|approval| {
        approval.get("type").and_then(Value::as_str) == Some(criteria.approval_label.as_str())
            && approval
                .get("value")
                .and_then(scalar_to_string)
                .is_some_and(|v| v == criteria.approval_value)
    });
    if !verified {
        return None;
    }

    Some(Candidate {
        review_number: ReviewNumber::new(lenient_u64(event.pointer("/change/number")?)?),
        patchset_version: PatchsetVersion::new(lenient_u64(event.pointer("/patchSet/number")?)?),
        patchset_ref: PatchsetRef::new(event.pointer("/patchSet/ref")?.as_str()?)?,
        review_url: event
            .pointer("/change/url")
            .and_then(Value::as_str)
            .map(str::to_string),
        comment: event.pointer("/comment")?.as_str()?.to_string(),
    })
}

/// Finds the build job URL in a Zuul report comment.
///
/// Takes the first line mentioning `marker`, then the first space-separated
/// token on it that starts with `https`.
pub fn find_build_locator(comment: &str, marker: &str) -> Option<BuildUrl> {
    let line = comment.lines().find(|line| line.contains(marker))?;
    line.split_whitespace()
        .find(|token| token.starts_with("https"))
        .and_then(BuildUrl::new)
}

/// Turns a raw event into a fully resolved [`Trigger`], or `None` if the event
/// is not relevant or any lookup fails.
pub async fn extract_trigger(
    event: &RawEvent,
    criteria: &FilterCriteria,
    resolver: &dyn ArtifactResolver,
) -> Option<Trigger> {
    let Some(candidate) = match_event(event, criteria) else {
        debug!(event_type = event.event_type(), "Event not relevant");
        return None;
    };
    info!(
        review = %candidate.review_number,
        patchset = %candidate.patchset_version,
        url = candidate.review_url.as_deref().unwrap_or_default(),
        "Patchset verified by {}",
        criteria.author
    );

    let Some(locator) = find_build_locator(&candidate.comment, &criteria.build_marker) else {
        info!(
            review = %candidate.review_number,
            marker = %criteria.build_marker,
            "No build job link in comment, ignoring"
        );
        return None;
    };

    let artifact_url = match resolver.resolve(&locator).await {
        Ok(url) => url,
        Err(e) => {
            warn!(
                review = %candidate.review_number,
                build = %locator,
                error = %e,
                "Could not resolve build artifact, ignoring"
            );
            return None;
        }
    };
    info!(build = %locator, artifact = %artifact_url, "Resolved build artifact");

    Some(Trigger {
        review_number: candidate.review_number,
        patchset_version: candidate.patchset_version,
        patchset_ref: candidate.patchset_ref,
        review_url: candidate.review_url,
        artifact_locator: locator,
        artifact_url,
    })
}

// Gerrit has sent change and patchset numbers both as JSON strings and as
// JSON numbers across versions.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
