mod common;

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use common::{Call, RecordingDesktop, FRAME};
use deskit_common::wire::{EVENT_ACTION, EVENT_SCREENSHOT_AND_ACTION};
use deskitd::capture::spawn_input_hook;
use deskitd::CaptureHub;
use serde_json::json;

#[tokio::test]
async fn click_and_drag_are_published_with_a_frame() {
    let desktop = RecordingDesktop::new();
    let hub = CaptureHub::new(desktop.clone(), 16);
    let mut rx = hub.subscribe();

    let click = json!({"action": "click_mouse", "at": {"x": 4, "y": 2}});
    let published = hub.ingest(click.clone()).await.unwrap();
    let received = rx.recv().await.unwrap();

    assert_eq!(published, received);
    assert_eq!(received.event, EVENT_SCREENSHOT_AND_ACTION);
    assert_eq!(received.data["action"], click);
    assert_eq!(
        received.data["screenshot"]["image"],
        general_purpose::STANDARD.encode(FRAME)
    );
    assert_eq!(desktop.calls(), vec![Call::Capture]);
}

#[tokio::test]
async fn other_actions_are_published_bare() {
    let desktop = RecordingDesktop::new();
    let hub = CaptureHub::new(desktop.clone(), 16);
    let mut rx = hub.subscribe();

    let typed = json!({"action": "type_text", "text": "hi"});
    hub.ingest(typed.clone()).await.unwrap();
    let received = rx.recv().await.unwrap();

    assert_eq!(received.event, EVENT_ACTION);
    assert_eq!(received.data, typed);
    assert!(desktop.calls().is_empty());
}

#[tokio::test]
async fn failed_frame_capture_falls_back_to_bare_action() {
    let desktop = RecordingDesktop::new();
    desktop.fail("capture");
    let hub = CaptureHub::new(desktop, 16);
    let mut rx = hub.subscribe();

    let drag = json!({"action": "drag_mouse", "path": [{"x": 0, "y": 0}]});
    hub.ingest(drag.clone()).await.unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received.event, EVENT_ACTION);
    assert_eq!(received.data, drag);
}

#[tokio::test]
async fn non_object_payloads_are_dropped() {
    let hub = CaptureHub::new(RecordingDesktop::new(), 16);
    let mut rx = hub.subscribe();

    assert!(hub.ingest(json!("click")).await.is_none());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn publishing_without_subscribers_is_harmless() {
    let hub = CaptureHub::new(RecordingDesktop::new(), 16);
    assert_eq!(hub.subscriber_count(), 0);
    assert!(hub
        .ingest(json!({"action": "scroll", "direction": "up"}))
        .await
        .is_some());

    let _rx = hub.subscribe();
    assert_eq!(hub.subscriber_count(), 1);
}

#[tokio::test]
async fn input_hook_lines_are_ingested() {
    let hub = Arc::new(CaptureHub::new(RecordingDesktop::new(), 16));
    let mut rx = hub.subscribe();

    let command = r#"printf '%s\n' '{"action":"press_keys","keys":["ctrl"]}' 'not json' '' '{"action":"scroll"}'"#;
    spawn_input_hook(hub.clone(), command.to_string())
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.data["action"], "press_keys");
    assert_eq!(second.data["action"], "scroll");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn lagging_subscriber_skips_ahead_and_counts_losses() {
    let hub = CaptureHub::new(RecordingDesktop::new(), 1);
    let mut rx = hub.subscribe();

    for text in ["a", "b", "c"] {
        hub.ingest(json!({"action": "type_text", "text": text}))
            .await
            .unwrap();
    }

    let event = hub.next_event(&mut rx, "client:slow").await.unwrap();
    assert_eq!(event.data["text"], json!("c"));
    assert_eq!(hub.lost_events(), 2);
}
