//! [`EventFeed`] over `ssh <gerrit> gerrit stream-events`.

use async_trait::async_trait;
use remote::SshTarget;
use tokio::io::{AsyncBufReadExt, BufReader, Split};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::feed::{EventFeed, EventSession, FeedError};

/// Subscription issued when none is configured.
pub const DEFAULT_SUBSCRIPTION: &str = "gerrit stream-events -s comment-added";

/// Streams Gerrit events through the system ssh client.
#[derive(Debug, Clone)]
pub struct SshEventFeed {
    target: SshTarget,
    subscription: String,
}

impl SshEventFeed {
    pub fn new(target: SshTarget, subscription: impl Into<String>) -> Self {
        Self {
            target,
            subscription: subscription.into(),
        }
    }
}

/// One running `stream-events` ssh process.
///
/// Authentication happens after spawn, so an auth failure surfaces as the
/// stream closing with ssh's exit code 255.
pub struct SshEventSession {
    child: Child,
    lines: Split<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl EventFeed for SshEventFeed {
    type Session = SshEventSession;

    async fn connect(&self) -> Result<SshEventSession, FeedError> {
        let mut child = self
            .target
            .command(&self.subscription)
            .spawn()
            .map_err(|e| FeedError::Connect(format!("{}: {e}", self.target.destination())))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FeedError::Connect("ssh stdout was not captured".to_string()))?;

        // Forward ssh diagnostics (host key warnings, auth errors) to the log.
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "listener::ssh", "{line}");
                }
            })
        });

        info!(
            destination = %self.target.destination(),
            command = %self.subscription,
            "Subscribed to Gerrit event stream"
        );
        Ok(SshEventSession {
            child,
            lines: BufReader::new(stdout).split(b'\n'),
            stderr_task,
        })
    }
}

#[async_trait]
impl EventSession for SshEventSession {
    async fn next_line(&mut self) -> Result<Option<Vec<u8>>, FeedError> {
        match self.lines.next_segment().await? {
            Some(line) => Ok(Some(line)),
            None => {
                let status = self.child.wait().await?;
                Err(FeedError::Closed {
                    exit_code: status.code(),
                })
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "ssh process already exited");
        }
        if let Err(e) = self.child.wait().await {
            debug!(error = %e, "Failed to reap ssh process");
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::reader::{run, StreamOptions};
    use pipeline::{event_queue, shutdown_channel};
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn fake_ssh(dir: &tempfile::TempDir, script: &str) -> SshTarget {
        let path = dir.path().join("fake-ssh");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        let mut target = SshTarget::new("review.example", "dci-ci-bot").with_port(29418);
        target.program = path.to_string_lossy().into_owned();
        target
    }

    #[tokio::test]
    async fn session_yields_lines_then_closes_with_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let target = fake_ssh(
            &dir,
            r#"echo '{"type":"comment-added"}'; echo '{"type":"ref-updated"}'; exit 255"#,
        );
        let feed = SshEventFeed::new(target, DEFAULT_SUBSCRIPTION);

        let mut session = feed.connect().await.unwrap();
        assert_eq!(
            session.next_line().await.unwrap().as_deref(),
            Some(br#"{"type":"comment-added"}"#.as_slice())
        );
        assert_eq!(
            session.next_line().await.unwrap().as_deref(),
            Some(br#"{"type":"ref-updated"}"#.as_slice())
        );
        let end = session.next_line().await.unwrap_err();
        assert!(matches!(end, FeedError::Closed { exit_code: Some(255) }));
        session.close().await;
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_dropped_and_the_stream_continues() {
        let dir = tempfile::tempdir().unwrap();
        let target = fake_ssh(
            &dir,
            r#"printf '{"type":"a","seq":1}\n\377\376bad\n{"type":"a","seq":2}\n'; sleep 30"#,
        );
        let feed = SshEventFeed::new(target, DEFAULT_SUBSCRIPTION);
        let (tx, mut rx) = event_queue();
        let (trigger, shutdown) = shutdown_channel();
        let options = StreamOptions {
            poll_interval: Duration::from_millis(20),
            ..StreamOptions::default()
        };

        let reader = tokio::spawn(run(feed, tx, options, shutdown));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while rx.len() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "timed out waiting for events");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        trigger.trigger();
        let report = reader.await.unwrap();

        let seqs: Vec<u64> = std::iter::from_fn(|| rx.try_pop())
            .map(|event| event.pointer("/seq").and_then(|v| v.as_u64()).unwrap())
            .collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(report.connect_attempts, 1);
        assert_eq!(report.sessions_established, 1);
        assert_eq!(report.lines_dropped, 1);
    }

    #[tokio::test]
    async fn close_kills_a_running_stream() {
        let dir = tempfile::tempdir().unwrap();
        let feed = SshEventFeed::new(fake_ssh(&dir, "sleep 30"), DEFAULT_SUBSCRIPTION);

        let mut session = feed.connect().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), session.close())
            .await
            .expect("close does not wait for the stream to end");
    }

    #[tokio::test]
    async fn missing_client_is_a_connect_error() {
        let mut target = SshTarget::new("review.example", "dci-ci-bot");
        target.program = "/nonexistent/ssh".to_string();
        let feed = SshEventFeed::new(target, DEFAULT_SUBSCRIPTION);
        assert!(matches!(feed.connect().await, Err(FeedError::Connect(_))));
    }
}
