//! [`RemoteExecutor`] over one-shot SSH sessions.

use async_trait::async_trait;
use pipeline::{CommandOutput, ExecError, RemoteExecutor, TargetHost};

use crate::ssh::{SshTarget, SSH_FAILURE_EXIT_CODE};

/// Runs each command in a fresh SSH session to the target host.
///
/// The credentials template's `host` is ignored; the host comes from each call.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    credentials: SshTarget,
}

impl SshExecutor {
    pub fn new(credentials: SshTarget) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, host: &TargetHost, command: &str) -> Result<CommandOutput, ExecError> {
        let target = self.credentials.for_host(host.address.as_str());
        let output = target.run(command).await.map_err(|e| ExecError::Session {
            host: target.destination(),
            message: e.to_string(),
        })?;

        // ssh reserves 255 for its own failures; anything else is the remote
        // command's exit code.
        if output.exit_code == SSH_FAILURE_EXIT_CODE {
            return Err(ExecError::Session {
                host: target.destination(),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pipeline::HostAddress;
    use std::os::unix::fs::PermissionsExt;

    fn fake_client(dir: &tempfile::TempDir, script: &str) -> String {
        let path = dir.path().join("fake-ssh");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn executor(program: String) -> SshExecutor {
        let mut credentials = SshTarget::new("template", "dci");
        credentials.program = program;
        SshExecutor::new(credentials)
    }

    fn host() -> TargetHost {
        TargetHost::new(HostAddress::new("192.168.122.10").unwrap())
    }

    #[tokio::test]
    async fn remote_exit_code_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(fake_client(&dir, "echo '{\"job_id\": \"x\"}'; exit 4"));

        let output = exec.execute(&host(), "dci-rhel-agent-ctl --start").await.unwrap();

        assert_eq!(output.exit_code, 4);
        assert!(output.stdout.contains("job_id"));
    }

    #[tokio::test]
    async fn ssh_failure_is_a_session_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(fake_client(
            &dir,
            "echo 'Permission denied (publickey).' >&2; exit 255",
        ));

        let err = exec.execute(&host(), "true").await.unwrap_err();

        let ExecError::Session { host, message } = err;
        assert_eq!(host, "dci@192.168.122.10");
        assert!(message.contains("Permission denied"));
    }
}
