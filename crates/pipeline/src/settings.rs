//! Pipeline settings and the remote commands derived from them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ArtifactUrl, PipelineOutcome, SettingsError, Trigger};

/// What to do when fetch, install or build reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupFailurePolicy {
    /// Log the failure and carry on to the next step. The agent run still
    /// decides the vote.
    #[default]
    Continue,
    /// Stop at the first failed setup step and vote -1 without running the agent.
    Abort,
}

/// Settings for the orchestration pipeline and the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Checkout of the agent repository on the target host.
    pub agent_dir: String,
    /// Git URL the reviewed patchset is fetched from.
    pub repo_url: String,
    /// Container image reference passed to the agent on start.
    pub image: String,
    pub setup_failure_policy: SetupFailurePolicy,
    /// Comment posted when a run starts.
    pub start_message: String,
    /// Prefix of the job page linked in the vote message.
    pub job_url_base: String,
    /// Number of recent `(review, patchset)` pairs remembered to skip
    /// duplicate triggers. `0` disables deduplication.
    pub dedupe_window: usize,
    /// How often the dispatch loop polls the event queue.
    pub dispatch_interval_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            agent_dir: "/home/dci/dci-rhel-agent".to_string(),
            repo_url: "https://softwarefactory-project.io/r/dci-rhel-agent".to_string(),
            image: "localhost/dci-rhel-agent:latest".to_string(),
            setup_failure_policy: SetupFailurePolicy::Continue,
            start_message: "dci-third-party starting job...".to_string(),
            job_url_base: "https://www.distributed-ci.io/jobs".to_string(),
            dedupe_window: 0,
            dispatch_interval_ms: 1000,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.agent_dir.trim().is_empty() {
            return Err(SettingsError::new("pipeline.agent_dir", "must not be empty"));
        }
        if self.repo_url.trim().is_empty() {
            return Err(SettingsError::new("pipeline.repo_url", "must not be empty"));
        }
        if self.image.trim().is_empty() {
            return Err(SettingsError::new("pipeline.image", "must not be empty"));
        }
        if self.dispatch_interval_ms == 0 {
            return Err(SettingsError::new(
                "pipeline.dispatch_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    /// Checks out the reviewed patchset in the agent directory.
    pub fn fetch_command(&self, trigger: &Trigger) -> String {
        format!(
            "cd {}; git fetch {} {} && git checkout FETCH_HEAD",
            shell_quote(&self.agent_dir),
            shell_quote(&self.repo_url),
            shell_quote(trigger.patchset_ref.as_str()),
        )
    }

    /// Downloads the package to `/tmp`.
    pub fn download_command(&self, artifact: &ArtifactUrl) -> String {
        format!(
            "wget {} -O {}",
            shell_quote(artifact.as_str()),
            shell_quote(&staged_path(artifact)),
        )
    }

    /// Installs the package downloaded by [`Self::download_command`].
    pub fn install_command(&self, artifact: &ArtifactUrl) -> String {
        format!("sudo rpm -i --force {}", shell_quote(&staged_path(artifact)))
    }

    /// Builds the agent container from the checked-out sources.
    pub fn build_command(&self) -> String {
        format!(
            "cd {}; sudo dci-rhel-agent-ctl --build",
            shell_quote(&self.agent_dir)
        )
    }

    /// Starts the agent against the locally built image.
    pub fn run_command(&self) -> String {
        format!(
            "cd {}; sudo dci-rhel-agent-ctl --start --url {} --local --skip-download",
            shell_quote(&self.agent_dir),
            shell_quote(&self.image),
        )
    }

    /// Message accompanying the final vote.
    pub fn outcome_message(&self, outcome: &PipelineOutcome) -> String {
        let verdict = if outcome.success { "success" } else { "failure" };
        format!(
            "dci-third-party {} ! {}/{}",
            verdict,
            self.job_url_base.trim_end_matches('/'),
            outcome.job_reference()
        )
    }
}

fn staged_path(artifact: &ArtifactUrl) -> String {
    format!("/tmp/{}", artifact.file_name())
}

/// Quotes `value` for a POSIX shell, leaving plain words untouched.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildUrl, PatchsetRef, PatchsetVersion, ReviewNumber};

    fn trigger() -> Trigger {
        Trigger {
            review_number: ReviewNumber::new(4242),
            patchset_version: PatchsetVersion::new(3),
            patchset_ref: PatchsetRef::new("refs/changes/42/4242/3").unwrap(),
            review_url: None,
            artifact_locator: BuildUrl::new("https://zuul.example/build/b1").unwrap(),
            artifact_url: ArtifactUrl::new("https://logs.example/b1/buildset/el/7/x86_64/agent.rpm")
                .unwrap(),
        }
    }

    #[test]
    fn fetch_command_checks_out_patchset_ref() {
        let cmd = PipelineSettings::default().fetch_command(&trigger());
        assert_eq!(
            cmd,
            "cd /home/dci/dci-rhel-agent; git fetch https://softwarefactory-project.io/r/dci-rhel-agent refs/changes/42/4242/3 && git checkout FETCH_HEAD"
        );
    }

    #[test]
    fn install_commands_share_staged_path() {
        let settings = PipelineSettings::default();
        let t = trigger();
        assert_eq!(
            settings.download_command(&t.artifact_url),
            "wget https://logs.example/b1/buildset/el/7/x86_64/agent.rpm -O /tmp/agent.rpm"
        );
        assert_eq!(
            settings.install_command(&t.artifact_url),
            "sudo rpm -i --force /tmp/agent.rpm"
        );
    }

    #[test]
    fn shell_quote_escapes_metacharacters() {
        assert_eq!(shell_quote("refs/changes/1/1/1"), "refs/changes/1/1/1");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("x; rm -rf /"), "'x; rm -rf /'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn zero_dispatch_interval_is_invalid() {
        let settings = PipelineSettings {
            dispatch_interval_ms: 0,
            ..PipelineSettings::default()
        };
        assert_eq!(
            settings.validate().unwrap_err().field,
            "pipeline.dispatch_interval_ms"
        );
    }
}
