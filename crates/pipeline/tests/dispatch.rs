//! Integration tests for trigger extraction and the dispatch loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    agent_output, verified_event, verified_event_json, FixedProvisioner, RecordingReview,
    ScriptedExecutor, StaticResolver,
};
use pipeline::{
    event_queue, extract_trigger, shutdown_channel, Dispatcher, FilterCriteria,
    OrchestrationPipeline, PipelineSettings, RawEvent, Vote,
};
use serde_json::json;

const RPM_URL: &str = "https://logs.example/b1/buildset/el/7/x86_64/dci-rhel-agent-0.1.rpm";

/// Test: canonical Zuul +1 comment yields a complete trigger
#[tokio::test]
async fn test_qualifying_event_yields_trigger() {
    let resolver = StaticResolver::found(RPM_URL);

    let trigger = extract_trigger(&verified_event(), &FilterCriteria::default(), &resolver)
        .await
        .expect("trigger");

    assert_eq!(trigger.review_number.as_u64(), 4242);
    assert_eq!(trigger.patchset_version.as_u64(), 3);
    assert_eq!(trigger.patchset_ref.as_str(), "refs/changes/42/4242/3");
    assert_eq!(
        trigger.artifact_locator.as_str(),
        "https://zuul.example/t/local/build/b1"
    );
    assert_eq!(trigger.artifact_url.as_str(), RPM_URL);
    assert_eq!(
        *resolver.calls.lock().unwrap(),
        vec!["https://zuul.example/t/local/build/b1".to_string()]
    );
}

/// Test: irrelevant events never reach the resolver
#[tokio::test]
async fn test_irrelevant_events_have_no_side_effects() {
    let resolver = StaticResolver::found(RPM_URL);
    let criteria = FilterCriteria::default();

    let mut other_project = verified_event_json();
    other_project["project"] = json!("python-dciclient");
    let mut other_author = verified_event_json();
    other_author["author"]["username"] = json!("dci-ci-bot");
    let mut no_vote = verified_event_json();
    no_vote["approvals"] = json!([{"type": "Verified", "value": "0"}]);
    let patchset_created = json!({"type": "patchset-created", "project": "dci-rhel-agent"});

    for value in [other_project, other_author, no_vote, patchset_created] {
        let event = RawEvent::from_value(value).unwrap();
        assert!(extract_trigger(&event, &criteria, &resolver).await.is_none());
    }
    assert_eq!(resolver.call_count(), 0);
}

/// Test: missing build link or failed resolution yields nothing
#[tokio::test]
async fn test_incomplete_lookups_yield_no_trigger() {
    let criteria = FilterCriteria::default();

    let mut no_marker = verified_event_json();
    no_marker["comment"] =
        json!("Build succeeded.\n\n- tox-pep8 https://zuul.example/b2 : SUCCESS");
    let resolver = StaticResolver::found(RPM_URL);
    let event = RawEvent::from_value(no_marker).unwrap();
    assert!(extract_trigger(&event, &criteria, &resolver).await.is_none());
    assert_eq!(resolver.call_count(), 0);

    let failing = StaticResolver::not_found();
    assert!(extract_trigger(&verified_event(), &criteria, &failing)
        .await
        .is_none());
    assert_eq!(failing.call_count(), 1);
}

struct Harness {
    dispatcher: Dispatcher,
    review: Arc<RecordingReview>,
    provisioner: Arc<FixedProvisioner>,
}

fn harness(settings: PipelineSettings) -> Harness {
    let review = Arc::new(RecordingReview::default());
    let provisioner = Arc::new(FixedProvisioner::ready("192.168.122.10"));
    let pipeline = OrchestrationPipeline::new(
        provisioner.clone(),
        Arc::new(ScriptedExecutor::new().on("--start", 0, agent_output())),
        review.clone(),
        settings,
    );
    let dispatcher = Dispatcher::new(
        FilterCriteria::default(),
        Arc::new(StaticResolver::found(RPM_URL)),
        pipeline,
    );
    Harness {
        dispatcher,
        review,
        provisioner,
    }
}

/// Test: duplicates run twice by default and once with a dedupe window
#[tokio::test]
async fn test_duplicate_triggers_follow_dedupe_window() {
    let mut default = harness(PipelineSettings::default());
    assert!(default.dispatcher.handle(verified_event()).await.is_some());
    assert!(default.dispatcher.handle(verified_event()).await.is_some());
    assert_eq!(default.review.votes().len(), 2);

    let mut deduped = harness(PipelineSettings {
        dedupe_window: 16,
        ..PipelineSettings::default()
    });
    assert!(deduped.dispatcher.handle(verified_event()).await.is_some());
    assert!(deduped.dispatcher.handle(verified_event()).await.is_none());
    assert_eq!(deduped.review.votes().len(), 1);
    assert_eq!(deduped.dispatcher.report().duplicates_skipped, 1);
}

/// Test: the loop drains queued events in order and stops on shutdown
#[tokio::test]
async fn test_dispatch_loop_processes_queue_then_stops() {
    let h = harness(PipelineSettings {
        dispatch_interval_ms: 10,
        ..PipelineSettings::default()
    });
    let (tx, rx) = event_queue();
    let (trigger, shutdown) = shutdown_channel();

    let mut second = verified_event_json();
    second["patchSet"]["number"] = json!("4");
    second["patchSet"]["ref"] = json!("refs/changes/42/4242/4");
    tx.push(verified_event()).unwrap();
    tx.push(RawEvent::from_value(json!({"type": "ref-updated"})).unwrap())
        .unwrap();
    tx.push(RawEvent::from_value(second).unwrap()).unwrap();

    let review = h.review.clone();
    let provisioner = h.provisioner.clone();
    let task = tokio::spawn(h.dispatcher.run(rx, shutdown));

    for _ in 0..200 {
        if review.votes().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    trigger.trigger();
    let report = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop stops promptly")
        .unwrap();

    assert_eq!(report.events_seen, 3);
    assert_eq!(report.triggers_run, 2);
    let patchsets: Vec<u64> = review.votes().iter().map(|v| v.patchset).collect();
    assert_eq!(patchsets, vec![3, 4], "FIFO order");
    assert!(review.votes().iter().all(|v| v.vote == Vote::Approve));
    assert_eq!(*provisioner.calls.lock().unwrap(), 2);
}

/// Test: the loop drains what is left and stops once the producer is gone
#[tokio::test]
async fn test_dispatch_loop_stops_when_source_is_lost() {
    let h = harness(PipelineSettings {
        dispatch_interval_ms: 10,
        ..PipelineSettings::default()
    });
    let (tx, rx) = event_queue();
    let (_trigger, shutdown) = shutdown_channel();
    tx.push(verified_event()).unwrap();
    drop(tx);

    let report = tokio::time::timeout(Duration::from_secs(5), h.dispatcher.run(rx, shutdown))
        .await
        .expect("loop stops without a shutdown request");

    assert!(report.source_lost);
    assert_eq!(report.triggers_run, 1);
    assert_eq!(h.review.votes().len(), 1);
}

/// Test: shutdown before any event means nothing runs
#[tokio::test]
async fn test_shutdown_prevents_new_runs() {
    let h = harness(PipelineSettings::default());
    let (tx, rx) = event_queue();
    let (trigger, shutdown) = shutdown_channel();
    trigger.trigger();
    tx.push(verified_event()).unwrap();

    let report = h.dispatcher.run(rx, shutdown).await;

    assert_eq!(report.events_seen, 0);
    assert!(!report.source_lost);
    assert!(h.review.votes().is_empty());
}
