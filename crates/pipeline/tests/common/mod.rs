//! In-memory fakes of the port traits.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use pipeline::{
    ArtifactResolver, ArtifactUrl, BuildUrl, CommandOutput, ExecError, HostAddress,
    HostProvisioner, PatchsetRef, PatchsetVersion, ProvisionError, RawEvent, ResolveError,
    RemoteExecutor, ReviewClient, ReviewError, ReviewNumber, TargetHost, Trigger, Vote,
};

pub const JOB_UUID: &str = "11111111-1111-1111-1111-111111111111";

pub fn agent_output() -> String {
    format!(r#"PLAY RECAP ok=42 {{"job_id": "{JOB_UUID}", "state": "success"}}"#)
}

pub fn sample_trigger() -> Trigger {
    Trigger {
        review_number: ReviewNumber::new(4242),
        patchset_version: PatchsetVersion::new(3),
        patchset_ref: PatchsetRef::new("refs/changes/42/4242/3").unwrap(),
        review_url: Some("https://review.example/4242".to_string()),
        artifact_locator: BuildUrl::new("https://zuul.example/t/local/build/b1").unwrap(),
        artifact_url: ArtifactUrl::new(
            "https://logs.example/b1/buildset/el/7/x86_64/dci-rhel-agent-0.1.rpm",
        )
        .unwrap(),
    }
}

pub fn verified_event_json() -> Value {
    json!({
        "type": "comment-added",
        "project": "dci-rhel-agent",
        "author": {"name": "Zuul", "username": "zuul"},
        "approvals": [{"type": "Verified", "value": "1", "description": "Verified"}],
        "comment": "Build succeeded (check pipeline).\n\n- dci-rpm-build https://zuul.example/t/local/build/b1 : SUCCESS in 4m 02s\n- tox-pep8 https://zuul.example/t/local/build/b2 : SUCCESS in 31s",
        "change": {
            "project": "dci-rhel-agent",
            "number": "4242",
            "url": "https://review.example/4242"
        },
        "patchSet": {"number": "3", "ref": "refs/changes/42/4242/3"}
    })
}

pub fn verified_event() -> RawEvent {
    RawEvent::from_value(verified_event_json()).unwrap()
}

// ---------------------------------------------------------------------------

/// Resolver returning a fixed answer and counting calls.
pub struct StaticResolver {
    answer: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl StaticResolver {
    pub fn found(url: &str) -> Self {
        Self {
            answer: Some(url.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn not_found() -> Self {
        Self {
            answer: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactResolver for StaticResolver {
    async fn resolve(&self, locator: &BuildUrl) -> Result<ArtifactUrl, ResolveError> {
        self.calls.lock().unwrap().push(locator.to_string());
        match &self.answer {
            Some(url) => Ok(ArtifactUrl::new(url.clone()).unwrap()),
            None => Err(ResolveError::NotFound {
                build: locator.to_string(),
                reason: "no buildset in manifest".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------

enum Reply {
    Output(CommandOutput),
    Broken,
}

/// Executor answering by command substring; unmatched commands succeed.
pub struct ScriptedExecutor {
    rules: Vec<(&'static str, Reply)>,
    pub commands: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: &'static str, exit_code: i32, stdout: impl Into<String>) -> Self {
        self.rules.push((
            needle,
            Reply::Output(CommandOutput {
                exit_code,
                stdout: stdout.into(),
                stderr: if exit_code == 0 {
                    String::new()
                } else {
                    "boom".to_string()
                },
            }),
        ));
        self
    }

    pub fn broken_on(mut self, needle: &'static str) -> Self {
        self.rules.push((needle, Reply::Broken));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        host: &TargetHost,
        command: &str,
    ) -> Result<CommandOutput, ExecError> {
        self.commands.lock().unwrap().push(command.to_string());
        for (needle, reply) in &self.rules {
            if command.contains(needle) {
                return match reply {
                    Reply::Output(output) => Ok(output.clone()),
                    Reply::Broken => Err(ExecError::Session {
                        host: host.to_string(),
                        message: "connection reset".to_string(),
                    }),
                };
            }
        }
        Ok(CommandOutput::default())
    }
}

// ---------------------------------------------------------------------------

pub struct FixedProvisioner {
    address: Option<&'static str>,
    pub calls: Mutex<usize>,
}

impl FixedProvisioner {
    pub fn ready(address: &'static str) -> Self {
        Self {
            address: Some(address),
            calls: Mutex::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            address: None,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl HostProvisioner for FixedProvisioner {
    async fn provision(&self) -> Result<TargetHost, ProvisionError> {
        *self.calls.lock().unwrap() += 1;
        match self.address {
            Some(a) => Ok(TargetHost::new(HostAddress::new(a).unwrap())),
            None => Err(ProvisionError::CommandFailed {
                command: "ansible-playbook site.yml".to_string(),
                exit_code: 2,
            }),
        }
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PostedVote {
    pub review: u64,
    pub patchset: u64,
    pub vote: Vote,
    pub message: String,
}

/// Review client recording everything; optionally failing every call.
#[derive(Default)]
pub struct RecordingReview {
    fail: bool,
    pub comments: Mutex<Vec<String>>,
    pub votes: Mutex<Vec<PostedVote>>,
}

impl RecordingReview {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn votes(&self) -> Vec<PostedVote> {
        self.votes.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<String> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewClient for RecordingReview {
    async fn comment(
        &self,
        _review: ReviewNumber,
        _patchset: PatchsetVersion,
        text: &str,
    ) -> Result<(), ReviewError> {
        self.comments.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(ReviewError::Session("ssh: connect refused".to_string()));
        }
        Ok(())
    }

    async fn vote(
        &self,
        review: ReviewNumber,
        patchset: PatchsetVersion,
        vote: Vote,
        message: &str,
    ) -> Result<(), ReviewError> {
        self.votes.lock().unwrap().push(PostedVote {
            review: review.as_u64(),
            patchset: patchset.as_u64(),
            vote,
            message: message.to_string(),
        });
        if self.fail {
            return Err(ReviewError::Session("ssh: connect refused".to_string()));
        }
        Ok(())
    }
}
