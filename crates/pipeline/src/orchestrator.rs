//! The fixed validation pipeline run for each trigger.
//!
//! Steps run strictly in order: announce, provision, fetch, install, build,
//! run. Only the agent run decides the vote; setup failures are reported and,
//! under [`SetupFailurePolicy::Continue`], stepped over.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn, Span};

use crate::job_id::extract_job_id;
use crate::{
    CommandOutput, HostProvisioner, JobId, PipelineOutcome, PipelineSettings, PipelineStep,
    RemoteExecutor, ReviewClient, SetupFailurePolicy, StepReport, TargetHost, Timestamp, Trigger,
    TriggerRunId, Vote,
};

/// Runs the validation steps for one trigger against injected collaborators.
pub struct OrchestrationPipeline {
    provisioner: Arc<dyn HostProvisioner>,
    executor: Arc<dyn RemoteExecutor>,
    review: Arc<dyn ReviewClient>,
    settings: PipelineSettings,
}

impl OrchestrationPipeline {
    pub fn new(
        provisioner: Arc<dyn HostProvisioner>,
        executor: Arc<dyn RemoteExecutor>,
        review: Arc<dyn ReviewClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            provisioner,
            executor,
            review,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs every step for `trigger`, posts the vote, and returns the outcome.
    ///
    /// Never fails: every collaborator error is logged and folded into the
    /// outcome.
    #[instrument(
        name = "trigger_run",
        skip_all,
        fields(
            review = %trigger.review_number,
            patchset = %trigger.patchset_version,
            run_id = tracing::field::Empty,
        )
    )]
    pub async fn run(&self, trigger: &Trigger) -> PipelineOutcome {
        let run_id = TriggerRunId::new_random();
        Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Timestamp::now();
        let mut steps = Vec::with_capacity(6);

        info!(
            artifact = %trigger.artifact_url,
            patchset_ref = %trigger.patchset_ref,
            "Starting third-party validation"
        );
        steps.push(self.announce_start(trigger).await);

        let step_start = Instant::now();
        let host = match self.provisioner.provision().await {
            Ok(host) => {
                info!(host = %host, "Target host ready");
                steps.push(report(PipelineStep::Provision, None, true, step_start));
                host
            }
            Err(e) => {
                error!(error = %e, kind = ?e.kind(), "Failed to provision target host");
                steps.push(report(PipelineStep::Provision, None, false, step_start));
                return self.conclude(trigger, run_id, started_at, steps, None, false).await;
            }
        };

        let setup = [
            (
                PipelineStep::FetchPatchset,
                vec![self.settings.fetch_command(trigger)],
            ),
            (
                PipelineStep::InstallArtifact,
                vec![
                    self.settings.download_command(&trigger.artifact_url),
                    self.settings.install_command(&trigger.artifact_url),
                ],
            ),
            (PipelineStep::BuildContainer, vec![self.settings.build_command()]),
        ];
        for (step, commands) in setup {
            let step_report = self.run_setup_step(&host, step, &commands).await;
            let failed = !step_report.success;
            steps.push(step_report);
            if failed && self.settings.setup_failure_policy == SetupFailurePolicy::Abort {
                warn!(step = %step, "Setup step failed, aborting run");
                return self.conclude(trigger, run_id, started_at, steps, None, false).await;
            }
        }

        let (run_report, job_id) = self.run_agent(&host).await;
        let success = run_report.success && job_id.is_some();
        steps.push(run_report);

        self.conclude(trigger, run_id, started_at, steps, job_id, success)
            .await
    }

    async fn announce_start(&self, trigger: &Trigger) -> StepReport {
        let start = Instant::now();
        let posted = self
            .review
            .comment(
                trigger.review_number,
                trigger.patchset_version,
                &self.settings.start_message,
            )
            .await;
        if let Err(e) = &posted {
            warn!(error = %e, "Failed to post start comment");
        }
        report(PipelineStep::AnnounceStart, None, posted.is_ok(), start)
    }

    /// Runs every command of a setup step. Under [`SetupFailurePolicy::Abort`]
    /// the step stops at its first failed command; otherwise the remaining
    /// commands still run. The report carries the first failure's exit code.
    async fn run_setup_step(
        &self,
        host: &TargetHost,
        step: PipelineStep,
        commands: &[String],
    ) -> StepReport {
        let start = Instant::now();
        let stop_early = self.settings.setup_failure_policy == SetupFailurePolicy::Abort;
        let mut exit_code = None;
        let mut success = true;
        for command in commands {
            let output = self.execute(host, step, command).await;
            let ok = output.as_ref().is_some_and(CommandOutput::success);
            if let Some(output) = output.as_ref().filter(|_| !ok) {
                error!(
                    step = %step,
                    exit_code = output.exit_code,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "Step failed on target host"
                );
            }
            if success {
                exit_code = output.map(|output| output.exit_code);
            }
            if !ok {
                success = false;
                if stop_early {
                    break;
                }
            }
        }
        report(step, exit_code, success, start)
    }

    async fn run_agent(&self, host: &TargetHost) -> (StepReport, Option<JobId>) {
        let start = Instant::now();
        let step = PipelineStep::RunAgent;
        let Some(output) = self.execute(host, step, &self.settings.run_command()).await else {
            return (report(step, None, false, start), None);
        };

        let job_id = extract_job_id(&output.stdout);
        if !output.success() {
            error!(
                exit_code = output.exit_code,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "Agent failed"
            );
        } else if job_id.is_none() {
            error!("Agent succeeded but no job id was found in its output");
        }
        (
            report(step, Some(output.exit_code), output.success(), start),
            job_id,
        )
    }

    async fn execute(
        &self,
        host: &TargetHost,
        step: PipelineStep,
        command: &str,
    ) -> Option<CommandOutput> {
        tracing::debug!(step = %step, host = %host, command, "Running remote command");
        match self.executor.execute(host, command).await {
            Ok(output) => Some(output),
            Err(e) => {
                error!(step = %step, error = %e, kind = ?e.kind(), "Remote command could not run");
                None
            }
        }
    }

    async fn conclude(
        &self,
        trigger: &Trigger,
        run_id: TriggerRunId,
        started_at: Timestamp,
        steps: Vec<StepReport>,
        job_id: Option<JobId>,
        success: bool,
    ) -> PipelineOutcome {
        let outcome = PipelineOutcome {
            run_id,
            success,
            vote: if success { Vote::Approve } else { Vote::Reject },
            job_id,
            steps,
            started_at,
        };

        let message = self.settings.outcome_message(&outcome);
        if let Err(e) = self
            .review
            .vote(
                trigger.review_number,
                trigger.patchset_version,
                outcome.vote,
                &message,
            )
            .await
        {
            warn!(error = %e, vote = %outcome.vote, "Failed to post vote");
        }
        info!(
            vote = %outcome.vote,
            job_id = outcome.job_reference(),
            failed_steps = outcome.failed_steps().count(),
            "Validation finished"
        );
        outcome
    }
}

fn report(step: PipelineStep, exit_code: Option<i32>, success: bool, start: Instant) -> StepReport {
    StepReport {
        step,
        exit_code,
        success,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
