//! DCI third-party CI entry point.
//!
//! This binary is the composition root. It:
//!
//! 1. **Loads configuration** from the TOML file, flags, and environment, and
//!    validates it before anything starts.
//! 2. **Wires observability**: `tracing-subscriber` with text or JSON output,
//!    plus an OTLP span exporter when an endpoint is configured.
//! 3. **Builds the adapters**: the SSH event feed, the Zuul resolver, the
//!    libvirt provisioner, the jumpbox executor, and the Gerrit review client.
//! 4. **Runs two tasks**: the stream reader filling the event queue, and the
//!    dispatch loop draining it. SIGINT or SIGTERM stops both; a trigger run
//!    already in progress finishes first.

mod config;
mod observability;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gerrit::GerritReviewClient;
use listener::SshEventFeed;
use pipeline::{event_queue, shutdown_channel, Dispatcher, OrchestrationPipeline, ShutdownTrigger};
use remote::{LibvirtProvisioner, SshExecutor};
use tracing::{info, warn};
use zuul::ZuulResolver;

use crate::config::{Args, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::resolve(&args)
        .with_context(|| format!("invalid configuration ({})", args.config.display()))?;
    let observability = observability::init(&config.observability)?;

    info!(
        config = %args.config.display(),
        gerrit = %config.gerrit.host,
        project = %config.filter.project,
        "Starting dci-thirdparty"
    );
    let result = run(config).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "dci-thirdparty stopped with an error");
    }
    observability.shutdown();
    result
}

async fn run(config: Config) -> anyhow::Result<()> {
    let (trigger, shutdown) = shutdown_channel();
    let (sender, receiver) = event_queue();

    let gerrit = config.gerrit.ssh_target();
    let feed = SshEventFeed::new(gerrit.clone(), config.gerrit.subscription.clone());
    let reader = tokio::spawn(listener::run(
        feed,
        sender,
        config.stream.options(),
        trigger.subscribe(),
    ));

    let pipeline = OrchestrationPipeline::new(
        Arc::new(LibvirtProvisioner::new(config.provisioner_settings())),
        Arc::new(SshExecutor::new(config.jumpbox.credentials())),
        Arc::new(GerritReviewClient::new(gerrit)),
        config.pipeline.clone(),
    );
    let dispatcher = Dispatcher::new(
        config.filter.clone(),
        Arc::new(ZuulResolver::new(config.zuul.clone())),
        pipeline,
    );

    tokio::spawn(stop_on_signal(trigger));

    let dispatch = dispatcher.run(receiver, shutdown).await;
    let stream = reader.await.context("stream reader task failed")?;
    info!(
        events_seen = dispatch.events_seen,
        triggers_run = dispatch.triggers_run,
        duplicates_skipped = dispatch.duplicates_skipped,
        connect_attempts = stream.connect_attempts,
        events_enqueued = stream.events_enqueued,
        lines_dropped = stream.lines_dropped,
        "dci-thirdparty stopped"
    );
    if dispatch.source_lost {
        anyhow::bail!("event stream reader stopped without a shutdown request");
    }
    Ok(())
}

/// Triggers shutdown on SIGINT or SIGTERM.
async fn stop_on_signal(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, only SIGINT stops the process");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Cannot listen for SIGINT");
                    // Dropping the trigger would count as a shutdown request.
                    std::future::pending::<()>().await;
                }
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT");
    }

    info!("Shutting down after the current trigger run");
    trigger.trigger();
}

