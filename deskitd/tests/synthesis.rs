mod common;

use std::time::Duration;

use common::{assert_near, synthesizer, Call, RecordingDesktop, FRAME};
use deskit_common::{ActionResult, CanonicalAction, MouseButton, Payload, Phase, Point, ScrollDirection};
use tokio::time::Instant;

fn is_err_containing(result: &ActionResult, needle: &str) -> bool {
    matches!(result, ActionResult::Err { message } if message.contains(needle))
}

#[tokio::test]
async fn type_text_mixed_case_issues_one_chord_per_character() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    let result = synth
        .execute(&CanonicalAction::TypeText {
            text: "Ab1!".into(),
            delay_ms: None,
        })
        .await;

    assert_eq!(result, ActionResult::ok());
    assert_eq!(
        desktop.calls(),
        vec![
            Call::Press(vec!["Shift_L", "a"]),
            Call::Release(vec!["a", "Shift_L"]),
            Call::Press(vec!["b"]),
            Call::Release(vec!["b"]),
            Call::Press(vec!["1"]),
            Call::Release(vec!["1"]),
            Call::Press(vec!["Shift_L", "1"]),
            Call::Release(vec!["1", "Shift_L"]),
        ]
    );
}

#[tokio::test]
async fn type_text_empty_touches_nothing() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    let result = synth
        .execute(&CanonicalAction::TypeText {
            text: String::new(),
            delay_ms: Some(25),
        })
        .await;

    assert!(result.is_ok());
    assert!(desktop.calls().is_empty());
}

#[tokio::test]
async fn type_text_with_unmappable_character_fails_before_typing() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    let result = synth
        .execute(&CanonicalAction::TypeText {
            text: "café".into(),
            delay_ms: None,
        })
        .await;

    assert!(is_err_containing(&result, "'é'"));
    assert!(desktop.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn type_text_delay_only_between_characters() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);
    let start = Instant::now();

    let result = synth
        .execute(&CanonicalAction::TypeText {
            text: "abc".into(),
            delay_ms: Some(40),
        })
        .await;

    assert!(result.is_ok());
    assert_near(start.elapsed(), Duration::from_millis(80));
    let presses: Vec<Duration> = desktop
        .timed_calls()
        .into_iter()
        .filter(|(_, call)| matches!(call, Call::Press(_)))
        .map(|(at, _)| at - start)
        .collect();
    assert_eq!(presses.len(), 3);
    assert_near(presses[0], Duration::ZERO);
    assert_near(presses[1], Duration::from_millis(40));
    assert_near(presses[2], Duration::from_millis(80));
}

#[tokio::test]
async fn type_keys_with_unknown_key_presses_nothing() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    let result = synth
        .execute(&CanonicalAction::TypeKeys {
            keys: vec!["ctrl".into(), "Hyperdrive".into(), "c".into()],
            delay_ms: None,
        })
        .await;

    assert!(is_err_containing(&result, "Hyperdrive"));
    assert!(desktop.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn type_keys_holds_for_delay_and_releases_in_reverse() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);
    let start = Instant::now();

    let result = synth
        .execute(&CanonicalAction::TypeKeys {
            keys: vec!["ctrl".into(), "Shift".into(), "T".into()],
            delay_ms: Some(50),
        })
        .await;

    assert!(result.is_ok());
    let calls = desktop.timed_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1, Call::Press(vec!["Control_L", "Shift_L", "t"]));
    assert_eq!(calls[1].1, Call::Release(vec!["t", "Shift_L", "Control_L"]));
    assert_near(calls[1].0 - start, Duration::from_millis(50));
}

#[tokio::test]
async fn press_keys_up_releases_in_reverse() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    synth
        .execute(&CanonicalAction::PressKeys {
            keys: vec!["alt".into(), "Tab".into()],
            phase: Phase::Down,
        })
        .await;
    synth
        .execute(&CanonicalAction::PressKeys {
            keys: vec!["alt".into(), "Tab".into()],
            phase: Phase::Up,
        })
        .await;

    assert_eq!(
        desktop.calls(),
        vec![
            Call::Press(vec!["Alt_L", "Tab"]),
            Call::Release(vec!["Tab", "Alt_L"]),
        ]
    );
}

#[tokio::test]
async fn click_moves_first_and_treats_zero_count_as_one() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    let result = synth
        .execute(&CanonicalAction::ClickMouse {
            at: Some(Point::new(10, 20)),
            button: MouseButton::Right,
            hold_keys: vec![],
            count: 0,
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(
        desktop.calls(),
        vec![
            Call::SetCursor(Point::new(10, 20)),
            Call::Click(MouseButton::Right, 1)
        ]
    );
}

#[tokio::test]
async fn held_keys_are_released_when_click_fails() {
    let desktop = RecordingDesktop::new();
    desktop.fail("click");
    let synth = synthesizer(desktop.clone(), None);

    let result = synth
        .execute(&CanonicalAction::ClickMouse {
            at: None,
            button: MouseButton::Left,
            hold_keys: vec!["shift".into(), "ctrl".into()],
            count: 2,
        })
        .await;

    assert!(is_err_containing(&result, "injected failure"));
    assert_eq!(
        desktop.calls(),
        vec![
            Call::Press(vec!["Shift_L", "Control_L"]),
            Call::Click(MouseButton::Left, 2),
            Call::Release(vec!["Control_L", "Shift_L"]),
        ]
    );
}

#[tokio::test]
async fn drag_presses_at_start_and_releases_at_end() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    let result = synth
        .execute(&CanonicalAction::DragMouse {
            path: vec![Point::new(0, 0), Point::new(5, 5), Point::new(9, 9)],
            button: MouseButton::Left,
            hold_keys: vec![],
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(
        desktop.calls(),
        vec![
            Call::SetCursor(Point::new(0, 0)),
            Call::PressButton(MouseButton::Left),
            Call::SetCursor(Point::new(5, 5)),
            Call::SetCursor(Point::new(9, 9)),
            Call::ReleaseButton(MouseButton::Left),
        ]
    );
}

#[tokio::test]
async fn drag_releases_button_when_a_move_fails() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    desktop.fail_after("set_cursor", 1);
    let result = synth
        .execute(&CanonicalAction::DragMouse {
            path: vec![Point::new(0, 0), Point::new(5, 5)],
            button: MouseButton::Middle,
            hold_keys: vec![],
        })
        .await;

    assert!(!result.is_ok());
    assert_eq!(
        desktop.calls(),
        vec![
            Call::SetCursor(Point::new(0, 0)),
            Call::PressButton(MouseButton::Middle),
            Call::SetCursor(Point::new(5, 5)),
            Call::ReleaseButton(MouseButton::Middle),
        ]
    );
}

#[tokio::test]
async fn empty_paths_are_rejected_before_touching_the_device() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    let drag = synth
        .execute(&CanonicalAction::DragMouse {
            path: vec![],
            button: MouseButton::Left,
            hold_keys: vec!["ctrl".into()],
        })
        .await;
    let trace = synth
        .execute(&CanonicalAction::TraceMouse {
            path: vec![],
            hold_keys: vec![],
        })
        .await;

    assert!(is_err_containing(&drag, "non-empty path"));
    assert!(is_err_containing(&trace, "non-empty path"));
    assert!(desktop.calls().is_empty());
}

#[tokio::test]
async fn scroll_moves_then_scrolls() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    synth
        .execute(&CanonicalAction::Scroll {
            at: Some(Point::new(300, 400)),
            direction: ScrollDirection::Up,
            count: 3,
            hold_keys: vec![],
        })
        .await;

    assert_eq!(
        desktop.calls(),
        vec![
            Call::SetCursor(Point::new(300, 400)),
            Call::Scroll(ScrollDirection::Up, 3)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn paste_waits_for_clipboard_then_sends_shortcut() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);
    let start = Instant::now();

    let result = synth
        .execute(&CanonicalAction::PasteText {
            text: "naïve ☃".into(),
        })
        .await;

    assert!(result.is_ok());
    let calls = desktop.timed_calls();
    assert_eq!(calls[0].1, Call::Clipboard("naïve ☃".into()));
    assert_eq!(calls[1].1, Call::Press(vec!["Control_L", "v"]));
    assert_eq!(calls[2].1, Call::Release(vec!["v", "Control_L"]));
    assert_near(calls[1].0 - start, Duration::from_millis(100));
}

#[tokio::test]
async fn observations_return_payloads() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);

    let shot = synth.execute(&CanonicalAction::Screenshot).await;
    let cursor = synth.execute(&CanonicalAction::CursorPosition).await;

    assert_eq!(
        shot,
        ActionResult::Ok(Payload::Image {
            bytes: FRAME.to_vec(),
            media_type: "image/png".into()
        })
    );
    assert_eq!(cursor, ActionResult::Ok(Payload::Cursor(Point::new(640, 360))));
}

#[tokio::test]
async fn capability_failures_become_error_results() {
    let desktop = RecordingDesktop::new();
    desktop.fail("capture");
    desktop.fail("launch");
    let synth = synthesizer(desktop.clone(), None);

    let shot = synth.execute(&CanonicalAction::Screenshot).await;
    let launch = synth
        .execute(&CanonicalAction::LaunchApplication {
            name: "firefox".into(),
        })
        .await;

    assert!(is_err_containing(&shot, "Desktop automation failed during capture"));
    assert!(is_err_containing(&launch, "launch"));
}

#[tokio::test]
async fn files_round_trip_through_the_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), Some(dir.path()));

    let written = synth
        .execute(&CanonicalAction::WriteFile {
            path: "out/report.txt".into(),
            data: b"quarterly".to_vec(),
        })
        .await;
    let read = synth
        .execute(&CanonicalAction::ReadFile {
            path: "out/report.txt".into(),
        })
        .await;
    let escaped = synth
        .execute(&CanonicalAction::ReadFile {
            path: "../../etc/passwd".into(),
        })
        .await;

    assert_eq!(written, ActionResult::ok());
    assert_eq!(
        read,
        ActionResult::Ok(Payload::File {
            data: b"quarterly".to_vec(),
            name: "report.txt".into(),
            size: 9,
            media_type: "text/plain".into(),
        })
    );
    assert!(is_err_containing(&escaped, "outside the shared file root"));
    assert!(desktop.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn device_lock_serializes_mutations_but_not_observations() {
    let desktop = RecordingDesktop::new();
    let synth = synthesizer(desktop.clone(), None);
    let start = Instant::now();

    let move_action = CanonicalAction::MoveMouse {
        to: Point::new(3, 4),
    };
    let (wait, moved, shot) = tokio::join!(
        synth.execute(&CanonicalAction::Wait { duration_ms: 1_000 }),
        synth.execute(&move_action),
        synth.execute(&CanonicalAction::Screenshot),
    );

    assert!(wait.is_ok() && moved.is_ok() && shot.is_ok());
    let calls = desktop.timed_calls();
    let capture_at = calls
        .iter()
        .find(|(_, call)| *call == Call::Capture)
        .map(|(at, _)| *at - start);
    let move_at = calls
        .iter()
        .find(|(_, call)| matches!(call, Call::SetCursor(_)))
        .map(|(at, _)| *at - start);
    assert_near(capture_at.unwrap(), Duration::ZERO);
    assert_near(move_at.unwrap(), Duration::from_secs(1));
}
