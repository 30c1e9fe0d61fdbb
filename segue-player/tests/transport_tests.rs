//! Transport integration tests
//!
//! Play / pause / stop / toggle / reset against a manually rendered graph:
//! derived playback state, queue clearing on stop, and graph operations
//! issued (or not) by each transition.

mod helpers;

use helpers::*;
use segue_player::graph::{GraphFault, GraphOp, RenderGraph};
use segue_player::{Error, PlaybackState};

/// State must always be the pure function of (graph running, node playing)
fn assert_state_consistent(fixture: &Fixture) {
    let state = fixture.engine.playback_state();
    if fixture.graph.is_running() {
        assert_ne!(state, PlaybackState::Stopped);
    } else {
        assert_eq!(state, PlaybackState::Stopped);
    }
}

#[test]
fn test_new_engine_is_stopped() {
    let fixture = Fixture::new();
    assert_eq!(fixture.engine.playback_state(), PlaybackState::Stopped);
    assert!(fixture.engine.is_stopped());
    assert!(fixture.engine.queue_is_empty());
    assert!(fixture.engine.now_playing().is_none());
}

#[test]
fn test_transport_sequence_keeps_state_derived() {
    let fixture = Fixture::new();
    fixture
        .engine
        .enqueue_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();

    let steps: Vec<(&str, PlaybackState)> = vec![
        ("play", PlaybackState::Playing),
        ("pause", PlaybackState::Paused),
        ("pause", PlaybackState::Paused),
        ("toggle", PlaybackState::Playing),
        ("play", PlaybackState::Playing),
        ("toggle", PlaybackState::Paused),
        ("stop", PlaybackState::Stopped),
        ("pause", PlaybackState::Stopped),
        ("toggle", PlaybackState::Playing),
        ("stop", PlaybackState::Stopped),
        ("stop", PlaybackState::Stopped),
    ];

    for (step, expected) in steps {
        match step {
            "play" => fixture.engine.play().unwrap(),
            "pause" => fixture.engine.pause().unwrap(),
            "toggle" => fixture.engine.toggle_play_pause().unwrap(),
            "stop" => fixture.engine.stop().unwrap(),
            _ => unreachable!(),
        }
        assert_eq!(fixture.engine.playback_state(), expected, "after {}", step);
        assert_state_consistent(&fixture);
    }
}

#[test]
fn test_state_changes_are_reported_once_each() {
    let fixture = Fixture::new();
    fixture.engine.play().unwrap();
    fixture.engine.play().unwrap();
    fixture.engine.pause().unwrap();
    fixture.engine.stop().unwrap();

    let states: Vec<_> = fixture
        .recorder
        .records()
        .into_iter()
        .filter_map(|r| match r {
            Record::State(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Stopped
        ]
    );
}

#[test]
fn test_stop_empties_both_queues() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("b", 44100, 44100))
        .unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("c", 48000, 48000))
        .unwrap();
    assert!(!fixture.engine.queue_is_empty());

    fixture.engine.stop().unwrap();
    assert!(fixture.engine.queue_is_empty());
    assert!(fixture.engine.is_stopped());
}

#[test]
fn test_stop_while_stopped_empties_queues_without_graph_operations() {
    let fixture = Fixture::new();
    fixture
        .engine
        .enqueue_decoder(tone("b", 44100, 44100))
        .unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("c", 48000, 48000))
        .unwrap();
    fixture.graph.clear_operations();

    fixture.engine.stop().unwrap();
    assert!(fixture.engine.queue_is_empty());
    assert!(fixture.graph.operations().is_empty());
}

#[test]
fn test_second_stop_issues_no_graph_operation() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    fixture.engine.stop().unwrap();
    assert!(fixture.graph.operations().contains(&GraphOp::Stop));

    fixture.graph.clear_operations();
    fixture.engine.stop().unwrap();
    assert!(fixture.graph.operations().is_empty());
    assert!(fixture.engine.is_stopped());
}

#[test]
fn test_play_when_playing_is_a_no_op() {
    let fixture = Fixture::new();
    fixture.engine.play().unwrap();
    fixture.graph.clear_operations();

    fixture.engine.play().unwrap();
    assert!(fixture.graph.operations().is_empty());
    assert!(fixture.engine.is_playing());
}

#[test]
fn test_graph_start_failure_leaves_engine_stopped() {
    let fixture = Fixture::new();
    fixture.graph.fail_next(GraphFault::Start);

    let result = fixture.engine.play();
    assert!(matches!(result, Err(Error::GraphStart(_))));
    assert!(fixture.engine.is_stopped());
    assert!(!fixture.recorder.contains(&Record::State(PlaybackState::Playing)));

    // The fault is one-shot
    fixture.engine.play().unwrap();
    assert!(fixture.engine.is_playing());
}

#[test]
fn test_play_decoder_surfaces_graph_start_failure() {
    let fixture = Fixture::new();
    fixture.graph.fail_next(GraphFault::Start);

    let result = fixture.engine.play_decoder(tone("a", 44100, 4096));
    assert!(matches!(result, Err(Error::GraphStart(_))));
    assert!(fixture.engine.is_stopped());
}

#[test]
fn test_play_decoder_open_failure_changes_nothing() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    assert!(fixture.render_until(|f| f.is_now_playing("a")));
    fixture.graph.clear_operations();
    fixture.recorder.clear();

    let result = fixture
        .engine
        .play_decoder(failing_tone("broken", "unsupported container"));
    match result {
        Err(Error::Open(message)) => assert!(message.contains("unsupported container")),
        other => panic!("expected open error, got {:?}", other),
    }

    assert_eq!(fixture.engine.playback_state(), PlaybackState::Playing);
    assert!(fixture.graph.operations().is_empty());
    assert!(fixture.is_now_playing("a"));
    assert!(fixture.recorder.now_playing_history().is_empty());
}

#[test]
fn test_reset_clears_overflow_queue() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("c", 48000, 48000))
        .unwrap();
    assert!(!fixture.engine.queue_is_empty());
    fixture.graph.clear_operations();

    fixture.engine.reset().unwrap();
    assert!(fixture.engine.queue_is_empty());
    assert!(fixture.graph.operations().contains(&GraphOp::Reset));
}

#[test]
fn test_stop_clears_now_playing_through_cancellation() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    assert!(fixture.render_until(|f| f.is_now_playing("a")));

    fixture.engine.stop().unwrap();
    assert!(wait_until(|| fixture.engine.now_playing().is_none()));
    assert!(fixture
        .recorder
        .contains(&Record::DecodingCanceled("a".into(), true)));
}

#[test]
fn test_control_calls_fail_after_shutdown() {
    let fixture = Fixture::new();
    fixture.engine.shutdown();
    fixture.engine.shutdown();

    assert!(matches!(
        fixture.engine.play(),
        Err(Error::ControlContextGone)
    ));
    assert!(fixture.graph.attached_nodes().is_empty());
}
