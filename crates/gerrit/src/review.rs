//! [`ReviewClient`] over `ssh <gerrit> gerrit review`.

use async_trait::async_trait;
use pipeline::{PatchsetVersion, ReviewClient, ReviewError, ReviewNumber, Vote};
use remote::{SshTarget, SSH_FAILURE_EXIT_CODE};
use tracing::{info, instrument};

/// Builds the `gerrit review` command line.
///
/// The message is wrapped in double quotes with `\` and `"` escaped, so
/// arbitrary text (including the job URL) reaches Gerrit as one argument.
pub fn review_command(
    review: ReviewNumber,
    patchset: PatchsetVersion,
    message: &str,
    vote: Option<Vote>,
) -> String {
    let mut command = format!("gerrit review --message {}", quote_message(message));
    if let Some(vote) = vote {
        command.push_str(&format!(" --verified {vote}"));
    }
    command.push_str(&format!(" {review},{patchset}"));
    command
}

fn quote_message(message: &str) -> String {
    let mut quoted = String::with_capacity(message.len() + 2);
    quoted.push('"');
    for c in message.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Posts to Gerrit as the bot account, one SSH session per command.
#[derive(Debug, Clone)]
pub struct GerritReviewClient {
    target: SshTarget,
}

impl GerritReviewClient {
    pub fn new(target: SshTarget) -> Self {
        Self { target }
    }

    async fn send(&self, command: &str) -> Result<(), ReviewError> {
        let output = self
            .target
            .run(command)
            .await
            .map_err(|e| ReviewError::Session(format!("{}: {e}", self.target.destination())))?;

        match output.exit_code {
            0 => Ok(()),
            SSH_FAILURE_EXIT_CODE => Err(ReviewError::Session(output.stderr.trim().to_string())),
            exit_code => Err(ReviewError::Rejected {
                exit_code,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }
}

#[async_trait]
impl ReviewClient for GerritReviewClient {
    #[instrument(skip(self, text), fields(review = %review, patchset = %patchset))]
    async fn comment(
        &self,
        review: ReviewNumber,
        patchset: PatchsetVersion,
        text: &str,
    ) -> Result<(), ReviewError> {
        self.send(&review_command(review, patchset, text, None)).await?;
        info!("Comment posted");
        Ok(())
    }

    #[instrument(skip(self, message), fields(review = %review, patchset = %patchset, vote = %vote))]
    async fn vote(
        &self,
        review: ReviewNumber,
        patchset: PatchsetVersion,
        vote: Vote,
        message: &str,
    ) -> Result<(), ReviewError> {
        self.send(&review_command(review, patchset, message, Some(vote)))
            .await?;
        info!("Verified vote posted");
        Ok(())
    }
}
