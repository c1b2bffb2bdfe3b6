mod common;

use common::*;
use courier_core::config::{ResponseSelection, TransformerConfig};
use courier_core::events::ErrorEventType;
use courier_core::message::MessageMap;
use courier_core::storage::MessageStorageMode;
use courier_core::test_helpers::{eventually, MockDestination, MockSource};
use courier_core::{RawMessage, Response, Status};
use serde_json::{json, Value};
use std::time::Duration;

#[tokio::test]
async fn test_passthrough_pipeline_preserves_raw_bytes() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .deploy(channel("adt").with_destination(destination("Lab", CAPTURE)))
        .await;

    let raw = "MSH|^~\\&|LAB|Ünïcødé|\r\nPID|||12345\r\n  trailing  ";
    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new(raw), false)
        .await
        .unwrap();

    let message = result.processed_message.as_ref().unwrap();
    let source = message.source().unwrap();
    assert_eq!(source.status(), Status::Transformed);
    assert_eq!(source.encoded_content(), raw);
    assert!(source.transformed.is_none());
    assert_eq!(capture.sent(), vec![raw.to_string()]);

    assert_eq!(harness.evaluator.compiled(), 0, "no-op pipelines never compile");
    assert_eq!(harness.evaluator.evaluated(), 0);
}

#[tokio::test]
async fn test_transformer_steps_feed_the_destination() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .deploy(
            source_steps(channel("adt"), &["uppercase", "append:|OK"])
                .with_destination(destination("Lab", CAPTURE).with_transformer(steps(&["replace:MSH=HDR"]))),
        )
        .await;

    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("msh|a"), false)
        .await
        .unwrap();

    let message = result.processed_message.as_ref().unwrap();
    assert_eq!(message.source().unwrap().encoded_content(), "MSH|A|OK");
    assert_eq!(message.destination(1).unwrap().raw_content(), "MSH|A|OK");
    assert_eq!(capture.sent(), vec!["HDR|A|OK".to_string()]);
    assert_eq!(result.status_of(1), Some(Status::Sent));
}

#[tokio::test]
async fn test_source_filter_rejects_before_any_destination() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .deploy(
            source_filter(channel("adt"), "contains:ADT")
                .with_destination(destination("Lab", CAPTURE)),
        )
        .await;

    let filtered = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("ORU^R01"), false)
        .await
        .unwrap();
    let message = filtered.processed_message.as_ref().unwrap();
    assert_eq!(message.source().unwrap().status(), Status::Filtered);
    assert!(message.destination(1).is_none());
    assert_eq!(filtered.selected_response.unwrap().status, Status::Filtered);

    let accepted = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("ADT^A01"), false)
        .await
        .unwrap();
    assert_eq!(accepted.status_of(1), Some(Status::Sent));
    assert_eq!(capture.sent(), vec!["ADT^A01".to_string()]);
    assert!(harness.listener.errors().is_empty());
}

#[tokio::test]
async fn test_destination_filter_only_skips_that_destination() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    let mut lab = destination("Lab", CAPTURE);
    lab.filter = lab.filter.with_rule("only results", "contains:ORU");
    harness
        .deploy(
            channel("adt")
                .with_destination(lab)
                .with_destination(destination("Archive", CAPTURE)),
        )
        .await;

    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("ADT^A01"), false)
        .await
        .unwrap();

    assert_eq!(result.status_of(1), Some(Status::Filtered));
    assert_eq!(result.status_of(2), Some(Status::Sent));
    assert_eq!(capture.sent_count(), 1);
}

#[tokio::test]
async fn test_source_transformer_failure_marks_error_and_reports() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .deploy(
            source_steps(channel("adt"), &["uppercase", "fail"])
                .with_destination(destination("Lab", CAPTURE)),
        )
        .await;

    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("MSH|1"), false)
        .await
        .unwrap();

    let source = result.processed_message.as_ref().unwrap().source().unwrap().clone();
    assert_eq!(source.status(), Status::Error);
    assert!(source.processing_error.as_deref().unwrap().contains("step 2"));
    assert_eq!(result.selected_response.unwrap().status, Status::Error);
    assert_eq!(capture.sent_count(), 0);

    let errors = harness.listener.errors_for("adt");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event_type, ErrorEventType::Transformer);
    assert_eq!(errors[0].metadata_id, Some(0));
}

#[tokio::test]
async fn test_unknown_step_fails_the_deploy() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    harness.save(source_steps(channel("adt"), &["uppercase", "launch_rockets"]));

    harness.engine().deploy_all_channels().await.unwrap();

    assert!(!harness.engine().is_deployed("adt"));
    let errors = harness.listener.errors_for("adt");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event_type, ErrorEventType::Deploy);
    assert!(errors[0].message.contains("launch_rockets"));
}

#[tokio::test]
async fn test_invalid_json_is_a_serializer_error() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let mut config = channel("feed");
    config.source.transformer = TransformerConfig::with_data_types("JSON", "JSON")
        .with_inbound_properties(json!({ "validate": true }));
    harness.deploy(config).await;

    let result = harness
        .engine()
        .dispatch_raw_message("feed", RawMessage::new("{not json"), false)
        .await
        .unwrap();

    let source = result.processed_message.as_ref().unwrap().source().unwrap().clone();
    assert_eq!(source.status(), Status::Error);
    assert_eq!(
        harness.listener.errors_for("feed")[0].event_type,
        ErrorEventType::Serializer
    );
}

#[tokio::test]
async fn test_response_selection_modes() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    harness.connectors.destination(CAPTURE, MockDestination::new());
    harness.connectors.destination(
        "billing",
        MockDestination::new().with_response(Response::sent("BILLED")),
    );

    let destinations = |config: courier_core::ChannelConfig| {
        config
            .with_destination(destination("Lab", CAPTURE))
            .with_destination(destination("Billing", "billing").new_chain())
    };

    harness
        .deploy(with_response(
            destinations(channel("by-destination")),
            ResponseSelection::Destination("Billing".to_string()),
        ))
        .await;
    harness
        .deploy(with_response(
            destinations(source_steps(channel("by-map"), &["set_response:ack=AA"])),
            ResponseSelection::ResponseMap("ack".to_string()),
        ))
        .await;
    harness
        .deploy(with_response(
            destinations(channel("silent")),
            ResponseSelection::None,
        ))
        .await;

    let dispatch = |id: &'static str| {
        let engine = harness.engine().clone();
        async move {
            engine
                .dispatch_raw_message(id, RawMessage::new("MSH|1"), false)
                .await
                .unwrap()
                .selected_response
        }
    };

    let response = dispatch("by-destination").await.unwrap();
    assert_eq!(response.status, Status::Sent);
    assert_eq!(response.data, "BILLED");

    let response = dispatch("by-map").await.unwrap();
    assert_eq!(response.data, "AA");

    assert!(dispatch("silent").await.is_none());
}

#[tokio::test]
async fn test_auto_response_reports_destination_error() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .connectors
        .destination("broken", MockDestination::new().failing(u32::MAX, false));
    harness
        .deploy(
            channel("adt")
                .with_destination(destination("Lab", CAPTURE))
                .with_destination(destination("Billing", "broken").new_chain()),
        )
        .await;

    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("MSH|1"), false)
        .await
        .unwrap();

    assert_eq!(result.status_of(1), Some(Status::Sent));
    assert_eq!(result.status_of(2), Some(Status::Error));
    let response = result.selected_response.unwrap();
    assert_eq!(response.status, Status::Error);
    assert!(response.status_message.contains("Billing"));

    let errors = harness.listener.errors_for("adt");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].event_type, ErrorEventType::DestinationConnector);
    assert_eq!(errors[0].metadata_id, Some(2));
}

#[tokio::test]
async fn test_response_transformer_can_fail_a_send() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .deploy(channel("adt").with_destination(
            destination("Lab", CAPTURE).with_response_transformer(steps(&["response_status:ERROR"])),
        ))
        .await;

    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("MSH|1"), false)
        .await
        .unwrap();

    assert_eq!(capture.sent_count(), 1);
    assert_eq!(result.status_of(1), Some(Status::Error));
    let lab = result.processed_message.as_ref().unwrap().destination(1).unwrap();
    assert_eq!(lab.response.as_ref().unwrap().content, "ACK:MSH|1");
}

#[tokio::test]
async fn test_targeted_dispatch_skips_other_destinations() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    harness
        .deploy(
            channel("adt")
                .with_destination(destination("Lab", CAPTURE))
                .with_destination(destination("Billing", CAPTURE).new_chain()),
        )
        .await;

    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("only billing").with_destinations(vec![2]), false)
        .await
        .unwrap();

    assert_eq!(result.status_of(1), None);
    assert_eq!(result.status_of(2), Some(Status::Sent));
    assert_eq!(capture.sent_count(), 1);
}

#[tokio::test]
async fn test_acknowledge_on_receipt_processes_from_source_queue() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    let channel = harness
        .deploy(acknowledge_on_receipt(channel("adt")).with_destination(destination("Lab", CAPTURE)))
        .await;

    let mut source_map = MessageMap::new();
    source_map.insert("remote".to_string(), Value::String("10.0.0.7".to_string()));

    let result = harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("MSH|1").with_source_map(source_map), false)
        .await
        .unwrap();

    assert!(result.queued);
    assert!(result.processed_message.is_none());
    assert_eq!(result.selected_response.unwrap().status, Status::Sent);

    assert!(capture.wait_for_sent(1, Duration::from_secs(2)).await);
    let stored = harness
        .store
        .get("adt", result.message_id, 1)
        .expect("destination message persisted");
    assert_eq!(
        stored.source_map.get("remote"),
        Some(&Value::String("10.0.0.7".to_string()))
    );
    assert!(
        eventually(Duration::from_secs(1), || channel.source().dispatches().in_flight() == 0).await
    );
}

#[tokio::test]
async fn test_dispatch_accounting_returns_to_idle() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    harness
        .connectors
        .destination(CAPTURE, MockDestination::new().with_delay(Duration::from_millis(200)));
    let channel = harness
        .deploy(channel("adt").with_destination(destination("Lab", CAPTURE)))
        .await;

    let engine = harness.engine().clone();
    let in_flight = tokio::spawn(async move {
        engine
            .dispatch_raw_message("adt", RawMessage::new("slow"), false)
            .await
    });

    assert!(
        eventually(Duration::from_secs(1), || channel.source().dispatches().in_flight() == 1).await
    );
    in_flight.await.unwrap().unwrap();
    assert_eq!(channel.source().dispatches().in_flight(), 0);
    assert_eq!(channel.source().dispatches().started(), 1);
    assert_eq!(channel.source().dispatches().finished(), 1);
}

#[tokio::test]
async fn test_storage_mode_controls_persisted_artifacts() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());

    let mut production = source_steps(channel("production"), &["uppercase"]);
    production.properties.storage_mode = MessageStorageMode::Production;
    let mut disabled = channel("disabled");
    disabled.properties.storage_mode = MessageStorageMode::Disabled;
    let mut scrubbed = channel("scrubbed");
    scrubbed.properties.storage_overrides.remove_content_on_completion = true;

    harness.deploy(production).await;
    harness.deploy(disabled).await;
    harness.deploy(scrubbed).await;

    for id in ["production", "disabled", "scrubbed"] {
        harness
            .engine()
            .dispatch_raw_message(id, RawMessage::new("msh|1"), false)
            .await
            .unwrap();
    }

    let stored = harness.store.get("production", 1, 0).unwrap();
    assert_eq!(stored.raw.as_ref().unwrap().content, "msh|1");
    assert!(stored.transformed.is_none());
    assert_eq!(stored.encoded.as_ref().unwrap().content, "MSH|1");

    assert_eq!(harness.store.message_count("disabled"), 0);

    let scrubbed = harness.store.get("scrubbed", 1, 0).unwrap();
    assert!(scrubbed.raw.is_none());
    assert_eq!(scrubbed.status(), Status::Transformed);
}

#[tokio::test]
async fn test_global_channel_map_is_shared_across_messages() {
    let harness = TestEngine::new();
    harness.connectors.source(PUSH, MockSource::push());
    let channel = harness
        .deploy(source_steps(channel("adt"), &["set_global:last=seen"]))
        .await;

    harness
        .engine()
        .dispatch_raw_message("adt", RawMessage::new("MSH|1"), false)
        .await
        .unwrap();

    assert_eq!(
        channel.global_channel_map().get("last"),
        Some(Value::String("seen".to_string()))
    );
}

#[tokio::test]
async fn test_polling_source_dispatches_and_reports_poll_errors() {
    let harness = TestEngine::new();
    let source = harness
        .connectors
        .source("poller", MockSource::polling(Duration::from_millis(10)));
    let capture = harness.connectors.destination(CAPTURE, MockDestination::new());
    source.fail_next_polls(1);
    source.deliver(RawMessage::new("first"));
    source.deliver(RawMessage::new("second"));

    harness
        .deploy(channel_with_source("inbox", "poller").with_destination(destination("Lab", CAPTURE)))
        .await;

    assert!(capture.wait_for_sent(2, Duration::from_secs(2)).await);
    assert_eq!(capture.sent(), vec!["first".to_string(), "second".to_string()]);

    let poll_errors: Vec<_> = harness
        .listener
        .errors_for("inbox")
        .into_iter()
        .filter(|e| e.event_type == ErrorEventType::SourceConnector)
        .collect();
    assert_eq!(poll_errors.len(), 1);

    harness.engine().stop_channel("inbox").await.unwrap();
    let polls = source.polls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.polls(), polls, "no polling after stop");
}
