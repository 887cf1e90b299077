//! DCI job id extraction from agent output.

use std::sync::LazyLock;

use regex::Regex;

use crate::JobId;

/// Placeholder used in review messages when no job id was captured.
pub const JOB_NOT_FOUND: &str = "job_not_found";

/// Matches the `"job_id": "<uuid-like>"` fragment the agent prints when it
/// registers a job with the DCI control server.
static JOB_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"job_id": "(\w{8}-\w{4}-\w{4}-\w{4}-\w{12})""#)
        .expect("job id regex is valid")
});

/// Returns the first job id found in `output`.
pub fn extract_job_id(output: &str) -> Option<JobId> {
    JOB_ID_REGEX
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| JobId::new(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_job_id() {
        let output = r#"TASK [dci-job] ok: {"job_id": "11111111-1111-1111-1111-111111111111"}
later {"job_id": "22222222-2222-2222-2222-222222222222"}"#;
        assert_eq!(
            extract_job_id(output).unwrap().as_str(),
            "11111111-1111-1111-1111-111111111111"
        );
    }

    #[test]
    fn label_match_is_case_insensitive() {
        let output = r#""JOB_ID": "abcdefab-cdef-abcd-efab-cdefabcdefab""#;
        assert!(extract_job_id(output).is_some());
    }

    #[test]
    fn no_match_yields_none() {
        assert!(extract_job_id("agent finished").is_none());
        assert!(extract_job_id(r#""job_id": "not-a-uuid""#).is_none());
    }
}
