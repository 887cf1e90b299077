//! The single-consumer dispatch loop.
//!
//! Pops raw events off the queue, extracts triggers, and runs the pipeline for
//! each one to completion before looking at the next event. The queue is
//! polled on a fixed interval so the shutdown flag is seen between events.

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::dedup::RecentTriggers;
use crate::filter::extract_trigger;
use crate::{
    ArtifactResolver, EventReceiver, FilterCriteria, OrchestrationPipeline, PipelineOutcome,
    RawEvent, Shutdown, Trigger,
};

/// Counters returned when the dispatch loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub events_seen: u64,
    pub triggers_run: u64,
    pub duplicates_skipped: u64,
    /// The loop stopped because every producer of the queue went away, not
    /// because shutdown was requested.
    pub source_lost: bool,
}

/// Owns everything needed to turn queued events into pipeline runs.
pub struct Dispatcher {
    criteria: Arc<FilterCriteria>,
    resolver: Arc<dyn ArtifactResolver>,
    pipeline: Arc<OrchestrationPipeline>,
    recent: RecentTriggers,
    report: DispatchReport,
}

impl Dispatcher {
    pub fn new(
        criteria: FilterCriteria,
        resolver: Arc<dyn ArtifactResolver>,
        pipeline: OrchestrationPipeline,
    ) -> Self {
        let recent = RecentTriggers::new(pipeline.settings().dedupe_window);
        Self {
            criteria: Arc::new(criteria),
            resolver,
            pipeline: Arc::new(pipeline),
            recent,
            report: DispatchReport::default(),
        }
    }

    /// Runs until `shutdown` is triggered or the queue is closed for good.
    ///
    /// A run already in progress is finished before the flag is checked again.
    pub async fn run(mut self, mut queue: EventReceiver, mut shutdown: Shutdown) -> DispatchReport {
        let interval = self.pipeline.settings().dispatch_interval();
        info!("Ready to receive Gerrit stream events");
        loop {
            if shutdown.is_triggered() {
                break;
            }
            match queue.try_pop() {
                Some(event) => {
                    self.handle(event).await;
                }
                None if queue.is_closed() => {
                    warn!("Event source is gone, stopping dispatch loop");
                    self.report.source_lost = true;
                    break;
                }
                None => {
                    if shutdown.sleep(interval).await {
                        break;
                    }
                }
            }
        }
        info!(
            events = self.report.events_seen,
            runs = self.report.triggers_run,
            "Dispatch loop stopped"
        );
        self.report
    }

    /// Handles one event: extraction, duplicate check, pipeline run.
    ///
    /// Returns the outcome if a pipeline ran.
    pub async fn handle(&mut self, event: RawEvent) -> Option<PipelineOutcome> {
        self.report.events_seen += 1;

        let criteria = Arc::clone(&self.criteria);
        let resolver = Arc::clone(&self.resolver);
        let trigger: Trigger = isolated("extract_trigger", async move {
            extract_trigger(&event, &criteria, resolver.as_ref()).await
        })
        .await
        .flatten()?;

        if !self.recent.insert(trigger.key()) {
            info!(
                review = %trigger.review_number,
                patchset = %trigger.patchset_version,
                "Patchset already validated recently, skipping"
            );
            self.report.duplicates_skipped += 1;
            return None;
        }

        self.report.triggers_run += 1;
        let pipeline = Arc::clone(&self.pipeline);
        isolated("pipeline_run", async move { pipeline.run(&trigger).await }).await
    }

    pub fn report(&self) -> DispatchReport {
        self.report
    }
}

// Runs `fut` on its own task and waits for it, so that a panic while handling
// one event is logged instead of ending the loop.
async fn isolated<T, F>(what: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(task = what, error = %e, "Event handling task failed");
            None
        }
    }
}
