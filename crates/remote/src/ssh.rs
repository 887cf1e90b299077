//! SSH session plumbing over the system `ssh` client.
//!
//! Every session (the long-lived event stream, review commands, jumpbox
//! commands) is one `ssh` child process with key-based, non-interactive
//! authentication.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use pipeline::CommandOutput;
use tokio::process::Command;
use tracing::debug;

/// Exit code `ssh` uses for its own failures (connect, auth, protocol).
pub const SSH_FAILURE_EXIT_CODE: i32 = 255;

/// Where and how to open an SSH session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub key_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub keepalive_secs: u64,
    /// Value of `StrictHostKeyChecking`.
    pub host_key_checking: String,
    /// Program to run instead of `ssh` (tests substitute a script).
    pub program: String,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: username.into(),
            key_file: None,
            connect_timeout_secs: 5,
            keepalive_secs: 60,
            host_key_checking: "accept-new".to_string(),
            program: "ssh".to_string(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    /// Same credentials, different host.
    pub fn for_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self.clone()
        }
    }

    /// `user@host`, for logs.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// Arguments passed to the ssh client to run `remote_command`.
    pub fn args(&self, remote_command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.keepalive_secs),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", self.host_key_checking),
        ];
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(key) = &self.key_file {
            args.push("-i".to_string());
            args.push(key.to_string_lossy().into_owned());
        }
        args.push(self.destination());
        args.push("--".to_string());
        args.push(remote_command.to_string());
        args
    }

    /// A ready-to-spawn command for `remote_command`, with stdout and stderr
    /// piped. The child is killed if its handle is dropped.
    pub fn command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(remote_command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Runs `remote_command` to completion and captures its output.
    ///
    /// Fails only if the ssh client could not be started; remote exit codes,
    /// including [`SSH_FAILURE_EXIT_CODE`], come back in the output.
    pub async fn run(&self, remote_command: &str) -> std::io::Result<CommandOutput> {
        let start = Instant::now();
        let output = self.command(remote_command).output().await?;
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            destination = %self.destination(),
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "SSH command finished"
        );
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_include_port_key_and_command() {
        let target = SshTarget::new("review.example", "dci-ci-bot")
            .with_port(29418)
            .with_key_file("/home/dci/bot.id_rsa");

        let args = target.args("gerrit stream-events -s comment-added");

        assert!(args.windows(2).any(|w| w == ["-p", "29418"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/home/dci/bot.id_rsa"]));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        let tail = &args[args.len() - 3..];
        assert_eq!(
            tail,
            ["dci-ci-bot@review.example", "--", "gerrit stream-events -s comment-added"]
        );
    }

    #[test]
    fn for_host_keeps_credentials() {
        let base = SshTarget::new("unused", "dci").with_key_file("/k");
        let jumpbox = base.for_host("192.168.122.10");
        assert_eq!(jumpbox.destination(), "dci@192.168.122.10");
        assert_eq!(jumpbox.key_file, base.key_file);
        assert!(!jumpbox.args("true").contains(&"-p".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_captures_output_of_client_program() {
        // `echo` stands in for ssh and prints the arguments it was given.
        let mut target = SshTarget::new("h", "u");
        target.program = "echo".to_string();

        let result = target.run("hello world").await.unwrap();

        assert!(result.success());
        assert!(result.stdout.contains("u@h -- hello world"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_reports_nonzero_exit() {
        // `false` ignores its arguments and exits 1.
        let mut target = SshTarget::new("h", "u");
        target.program = "false".to_string();

        let result = target.run("anything").await.unwrap();

        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test]
    async fn run_fails_when_client_is_missing() {
        let mut target = SshTarget::new("h", "u");
        target.program = "/nonexistent/ssh-client".to_string();
        assert!(target.run("true").await.is_err());
    }
}
