mod common;

use common::*;
use courier_core::events::ErrorEventType;
use courier_core::test_helpers::{MockDestination, MockSource};
use courier_core::{ConnectorState, EngineError, InitialState, RawMessage, Status};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_failing_channel_does_not_block_the_batch() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());

    harness.save(channel("broken").with_destination(destination("Nowhere", "missing_transport")));
    harness.save(channel("healthy").with_destination(destination("Lab", CAPTURE)));

    harness
        .engine()
        .deploy_channels(&["broken".to_string(), "healthy".to_string()])
        .await
        .unwrap();

    assert!(!harness.engine().is_deployed("broken"));
    let errors = harness.listener.errors_for("broken");
    assert_eq!(errors.len(), 1, "exactly one error event per failed channel");
    assert_eq!(errors[0].event_type, ErrorEventType::Deploy);

    let healthy = harness.engine().channel("healthy").unwrap();
    assert_eq!(healthy.current_state(), ConnectorState::Started);
    assert!(harness.listener.errors_for("healthy").is_empty());

    harness
        .engine()
        .dispatch_raw_message("healthy", RawMessage::new("MSH|1"), false)
        .await
        .unwrap();
    assert_eq!(capture.sent(), vec!["MSH|1".to_string()]);
}

#[tokio::test]
async fn test_deploy_failure_releases_deployed_connectors() {
    let harness = TestEngine::new();
    let source = harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    capture.lifecycle.fail_on("deploy");

    harness.save(channel("adt").with_destination(destination("Lab", CAPTURE)));
    harness.engine().deploy_all_channels().await.unwrap();

    assert!(!harness.engine().is_deployed("adt"));
    assert_eq!(source.lifecycle.count("deploy"), 1);
    assert_eq!(source.lifecycle.count("undeploy"), 1);
    assert_eq!(source.lifecycle.count("start"), 0);
    assert_eq!(harness.listener.errors_for("adt").len(), 1);
}

#[tokio::test]
async fn test_start_failure_leaves_channel_deployed_and_stopped() {
    let harness = TestEngine::new();
    let source = harness.connectors.source(PUSH, MockSource::push());
    source.lifecycle.fail_on("start");
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());

    let channel = harness
        .deploy(channel("adt").with_destination(destination("Lab", CAPTURE)))
        .await;

    assert_eq!(channel.current_state(), ConnectorState::Stopped);
    assert_eq!(
        channel.destination(1).unwrap().current_state(),
        ConnectorState::Stopped,
        "destinations started before the failure are rolled back"
    );
    assert_eq!(capture.lifecycle.count("stop"), 1);

    let errors = harness.listener.errors_for("adt");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event_type, ErrorEventType::Start);

    source.lifecycle.clear_failures();
    harness.engine().start_channel("adt").await.unwrap();
    assert_eq!(channel.current_state(), ConnectorState::Started);
}

#[tokio::test]
async fn test_initial_states_are_applied_after_deploy() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    harness.connectors.destination(CAPTURE, MockDestination::new());

    for (id, state) in [
        ("started", InitialState::Started),
        ("paused", InitialState::Paused),
        ("stopped", InitialState::Stopped),
    ] {
        harness.save(with_initial_state(
            channel(id).with_destination(destination("Lab", CAPTURE)),
            state,
        ));
    }
    harness.engine().deploy_all_channels().await.unwrap();

    let state_of = |id: &str| harness.engine().channel(id).unwrap().current_state();
    assert_eq!(state_of("started"), ConnectorState::Started);
    assert_eq!(state_of("paused"), ConnectorState::Paused);
    assert_eq!(state_of("stopped"), ConnectorState::Stopped);

    let err = harness
        .engine()
        .dispatch_raw_message("stopped", RawMessage::new("x"), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::ChannelNotStarted { state: ConnectorState::Stopped, .. }
    ));
}

#[tokio::test]
async fn test_disabled_channels_are_skipped() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());

    let mut disabled = channel("disabled");
    disabled.enabled = false;
    harness.save(disabled);
    harness.save(channel("enabled"));

    harness.engine().deploy_all_channels().await.unwrap();
    assert_eq!(harness.engine().deployed_channel_ids(), vec!["enabled".to_string()]);

    harness
        .engine()
        .deploy_channels(&["disabled".to_string()])
        .await
        .unwrap();
    assert!(!harness.engine().is_deployed("disabled"));
    assert!(harness.listener.errors().is_empty());
}

#[tokio::test]
async fn test_deploying_a_deployed_channel_redeploys_it() {
    let harness = TestEngine::new();
    let source = harness.connectors.source(PUSH, MockSource::push());

    let first = harness.deploy(channel("adt")).await;
    assert_eq!(first.revision(), 1);

    let mut updated = channel("adt");
    updated.revision = 2;
    let second = harness.deploy(updated).await;

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.revision(), 2);
    assert_eq!(second.current_state(), ConnectorState::Started);
    assert_eq!(source.lifecycle.count("undeploy"), 1);
    assert_eq!(
        source.lifecycle.calls(),
        vec!["deploy", "start", "stop", "undeploy", "deploy", "start"]
    );
}

#[tokio::test]
async fn test_pause_stops_the_source_and_resume_restarts_it() {
    let harness = TestEngine::new();
    let source = harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    let channel = harness
        .deploy(channel("adt").with_destination(destination("Lab", CAPTURE)))
        .await;

    harness.engine().pause_channel("adt").await.unwrap();
    assert_eq!(channel.current_state(), ConnectorState::Paused);
    assert_eq!(channel.source().current_state(), ConnectorState::Stopped);
    assert_eq!(
        channel.destination(1).unwrap().current_state(),
        ConnectorState::Started
    );

    let err = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("held"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ChannelNotStarted { .. }));

    let forced = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("forced"), true)
        .await
        .unwrap();
    assert_eq!(forced.status_of(1), Some(Status::Sent));

    harness.engine().resume_channel("adt").await.unwrap();
    assert_eq!(channel.current_state(), ConnectorState::Started);
    harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("after"), false)
        .await
        .unwrap();

    assert_eq!(capture.sent(), vec!["forced".to_string(), "after".to_string()]);
    assert_eq!(source.lifecycle.calls(), vec!["deploy", "start", "stop", "start"]);
}

#[tokio::test]
async fn test_start_on_paused_channel_resumes() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let channel = harness
        .deploy(with_initial_state(channel("adt"), InitialState::Paused))
        .await;

    harness.engine().start_channel("adt").await.unwrap();
    assert_eq!(channel.current_state(), ConnectorState::Started);
}

#[tokio::test]
async fn test_halt_during_slow_stop_wins() {
    let harness = TestEngine::new();
    let source = harness.connectors.source(
        PUSH,
        MockSource::push().with_stop_delay(Duration::from_millis(300)),
    );
    harness.connectors.destination(CAPTURE, MockDestination::new());
    let channel = harness
        .deploy(channel("adt").with_destination(destination("Lab", CAPTURE)))
        .await;

    let engine = Arc::clone(harness.engine());
    let stopping = tokio::spawn(async move { engine.stop_channel("adt").await });

    assert!(
        courier_core::test_helpers::eventually(Duration::from_secs(1), || {
            channel.current_state() == ConnectorState::Stopping
        })
        .await
    );
    harness.engine().halt_channel("adt").await.unwrap();
    assert_eq!(channel.current_state(), ConnectorState::Stopped);

    stopping.await.unwrap().unwrap();
    assert_eq!(channel.current_state(), ConnectorState::Stopped);
    assert_eq!(source.lifecycle.count("halt"), 1);
}

#[tokio::test]
async fn test_lifecycle_calls_on_undeployed_channels() {
    let harness = TestEngine::new();

    harness.engine().start_channel("ghost").await.unwrap();
    harness.engine().stop_channel("ghost").await.unwrap();

    for result in [
        harness.engine().pause_channel("ghost").await,
        harness.engine().resume_channel("ghost").await,
        harness.engine().halt_channel("ghost").await,
    ] {
        assert!(matches!(result, Err(EngineError::ChannelNotFound { .. })));
    }
}

#[tokio::test]
async fn test_connector_level_stop_and_start() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .deploy(channel("adt").with_destination(destination("Lab", CAPTURE)))
        .await;

    harness.engine().stop_connector("adt", 1).await.unwrap();
    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("while stopped"), false)
        .await
        .unwrap();
    assert_eq!(result.status_of(1), Some(Status::Error));
    let destination = result
        .processed_message
        .as_ref()
        .and_then(|m| m.destination(1))
        .unwrap();
    assert!(destination
        .processing_error
        .as_deref()
        .unwrap()
        .contains("is not started"));

    harness.engine().start_connector("adt", 1).await.unwrap();
    harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("restarted"), false)
        .await
        .unwrap();
    assert_eq!(capture.sent(), vec!["restarted".to_string()]);

    let missing = harness.engine().start_connector("adt", 9).await;
    assert!(matches!(
        missing,
        Err(EngineError::ConnectorNotFound { metadata_id: 9, .. })
    ));
}

#[tokio::test]
async fn test_redeploy_all_reports_interruption_as_fatal() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    harness.save(channel("adt"));
    harness.save(channel("lab"));
    harness.engine().deploy_all_channels().await.unwrap();

    harness
        .engine()
        .context()
        .global_map
        .put("shared", serde_json::json!(1));

    harness.engine().interrupt();
    let err = harness.engine().redeploy_all_channels().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, EngineError::Interrupted { .. }));
    assert!(harness.engine().deployed_channel_ids().is_empty());

    harness.engine().redeploy_all_channels().await.unwrap();
    assert_eq!(
        harness.engine().deployed_channel_ids(),
        vec!["adt".to_string(), "lab".to_string()]
    );
    assert!(harness.engine().context().global_map.is_empty());
}

#[tokio::test]
async fn test_interrupt_only_stops_the_batch_that_observes_it() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    harness.save(channel("adt"));
    harness.save(channel("lab"));
    let ids = vec!["adt".to_string(), "lab".to_string()];

    harness.engine().interrupt();
    let err = harness.engine().deploy_channels(&ids).await.unwrap_err();
    assert!(matches!(err, EngineError::Interrupted { ref operation } if operation == "deploy"));
    assert!(harness.engine().deployed_channel_ids().is_empty());

    harness.engine().deploy_channels(&ids).await.unwrap();
    assert_eq!(harness.engine().deployed_channel_ids(), ids);

    harness.engine().interrupt();
    harness.engine().clear_interrupt();
    harness.engine().redeploy_all_channels().await.unwrap();
    assert_eq!(harness.engine().deployed_channel_ids(), ids);
}

#[tokio::test]
async fn test_dashboard_status_reports_children_and_stale_revision() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .deploy(
            channel("adt")
                .with_destination(destination("Lab", CAPTURE))
                .with_destination(destination("Billing", CAPTURE).new_chain()),
        )
        .await;

    for body in ["a", "b"] {
        harness
            .engine()
            .dispatch_raw_message("adt", RawMessage::new(body), false)
            .await
            .unwrap();
    }

    let mut stored = channel("adt")
        .with_destination(destination("Lab", CAPTURE))
        .with_destination(destination("Billing", CAPTURE).new_chain());
    stored.revision = 3;
    harness.save(stored);

    let status = harness.engine().get_channel_status("adt").await.unwrap();
    assert_eq!(status.state, ConnectorState::Started);
    assert_eq!(status.deployed_revision_delta, 2);
    assert_eq!(status.children.len(), 3);
    assert_eq!(status.children[0].name, "Source");
    assert_eq!(status.statistics.received, 2);
    assert_eq!(status.statistics.sent, 4);
    assert_eq!(status.child(2).unwrap().statistics.sent, 2);

    harness.engine().reset_statistics("adt", None);
    let reset = harness.engine().get_channel_status("adt").await.unwrap();
    assert_eq!(reset.statistics.sent, 0);
    assert_eq!(reset.lifetime_statistics.sent, 4);

    let list = harness.engine().get_channel_status_list(None).await;
    assert_eq!(list.len(), 1);
    assert!(harness.engine().get_channel_status("ghost").await.is_none());
}

#[tokio::test]
async fn test_engine_bootstrap_start_and_stop() {
    let harness = TestEngine::new();
    let source = harness.connectors.source(PUSH, MockSource::push());
    harness.save(channel("adt"));
    harness.save(channel("lab"));

    harness.bootstrap.start_engine(Vec::new()).await.unwrap();
    assert_eq!(harness.engine().deployed_channel_ids().len(), 2);

    harness.bootstrap.stop_engine().await.unwrap();
    assert!(harness.engine().deployed_channel_ids().is_empty());
    assert_eq!(source.lifecycle.count("undeploy"), 2);
}
