//! Queue integration tests
//!
//! Two-tier queueing: the node's gapless chain versus the overflow queue,
//! skipping, promotion at end of audio and the FIFO order of overflow entries.

mod helpers;

use helpers::*;
use segue_player::audio::{Decoder, DecoderFactory, SampleEncoding};
use segue_player::graph::{GraphOp, SoftwareGraph};
use segue_player::{
    DecoderHandle, Error, PlaybackEngine, PlayerEvent, ProcessingFormat, ProgramSource,
    ToneDecoder,
};
use std::sync::Arc;

fn dsd_tone(name: &str) -> DecoderHandle {
    let format = ProcessingFormat::new(2_822_400, 2, SampleEncoding::Dsd, false);
    DecoderHandle::new(ToneDecoder::sine(440.0, format, 4096).named(name))
}

/// Graph operations that only a full `play_decoder` issues
fn is_replay_operation(op: &GraphOp) -> bool {
    matches!(
        op,
        GraphOp::Pause | GraphOp::Reset | GraphOp::Attach(_) | GraphOp::Detach(_)
    )
}

#[test]
fn test_matching_format_joins_gapless_chain() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("b", 44100, 44100))
        .unwrap();

    assert!(!fixture.engine.queue_is_empty());
    // Still a single node: nothing was rebuilt
    assert_eq!(fixture.graph.attached_nodes().len(), 1);
}

#[test]
fn test_enqueue_open_failure_leaves_queue_untouched() {
    let fixture = Fixture::new();
    let result = fixture
        .engine
        .enqueue_decoder(failing_tone("broken", "truncated stream"));

    match result {
        Err(Error::Open(message)) => assert!(message.contains("truncated stream")),
        other => panic!("expected open error, got {:?}", other),
    }
    assert!(fixture.engine.queue_is_empty());
}

#[test]
fn test_skip_within_chain_cancels_instead_of_replaying() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("b", 44100, 44100 * 10))
        .unwrap();
    assert!(fixture.render_until(|f| f.is_now_playing("a")));
    fixture.graph.clear_operations();

    assert!(fixture.engine.skip_to_next().unwrap());
    assert!(fixture.render_until(|f| f.is_now_playing("b")));

    assert!(!fixture.graph.operations().iter().any(is_replay_operation));
    assert!(fixture
        .recorder
        .contains(&Record::DecodingCanceled("a".into(), true)));
    // The pending successor kept NowPlaying from flickering to nothing
    assert_eq!(
        fixture.recorder.now_playing_history(),
        vec![Some("a".to_string()), Some("b".to_string())]
    );
}

#[test]
fn test_skip_to_decoded_ahead_successor() {
    let fixture = Fixture::new();
    fixture.engine.play_decoder(tone("a", 44100, 2048)).unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("b", 44100, 44100))
        .unwrap();

    // a fits in the ring, so b starts decoding before anything renders
    assert!(wait_until(|| fixture
        .recorder
        .contains(&Record::DecodingStarted("b".into()))));
    fixture.graph.render_cycle(PERIOD_FRAMES);
    assert!(wait_until(|| fixture.is_now_playing("a")));
    fixture.graph.clear_operations();

    assert!(fixture.engine.skip_to_next().unwrap());
    assert!(fixture.render_until(|f| f.is_now_playing("b")));
    assert!(!fixture.graph.operations().iter().any(is_replay_operation));
    // The canceled decoder hands over without NowPlaying dropping to nothing
    assert_eq!(
        fixture.recorder.now_playing_history(),
        vec![Some("a".to_string()), Some("b".to_string())]
    );

    // No pending flag left behind: NowPlaying clears once b ends
    assert!(fixture.render_until(|f| f.recorder.contains(&Record::EndOfAudio)));
    assert!(wait_until(|| fixture.engine.now_playing().is_none()));
    assert_eq!(
        fixture.recorder.count(&Record::DecodingStarted("b".into())),
        1
    );
}

#[test]
fn test_skip_promotes_overflow_head_in_fifo_order() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("b", 48000, 48000 * 10))
        .unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("c", 48000, 48000 * 10))
        .unwrap();

    assert!(fixture.engine.skip_to_next().unwrap());
    assert!(fixture.render_until(|f| f.is_now_playing("b")));
    // c stays queued behind b
    assert!(!fixture.engine.queue_is_empty());

    assert!(fixture.engine.skip_to_next().unwrap());
    assert!(fixture.render_until(|f| f.is_now_playing("c")));
    assert!(fixture.engine.queue_is_empty());

    // Only the switch to 48 kHz needed a rebuild
    assert_eq!(fixture.recorder.count(&Record::Configuration(48000)), 1);
}

#[test]
fn test_skip_with_nothing_queued_does_nothing() {
    let fixture = Fixture::new();
    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    assert!(fixture.render_until(|f| f.is_now_playing("a")));

    assert!(!fixture.engine.skip_to_next().unwrap());
    assert!(fixture.engine.is_playing());
    assert!(fixture.is_now_playing("a"));
}

#[test]
fn test_clear_queue_keeps_current_decoder() {
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

    fixture.engine.clear_queue().unwrap();
    assert!(fixture.engine.queue_is_empty());
    assert!(fixture.engine.is_playing());
    assert!(fixture.render_until(|f| f.is_now_playing("a")));
}

#[test]
fn test_play_decoder_replaces_overflow_queue() {
    let fixture = Fixture::new();
    fixture
        .engine
        .enqueue_decoder(tone("b", 48000, 48000))
        .unwrap();
    assert!(!fixture.engine.queue_is_empty());

    fixture
        .engine
        .play_decoder(tone("a", 44100, 44100 * 10))
        .unwrap();
    // a itself leaves the chain as soon as it starts decoding
    assert!(wait_until(|| fixture.engine.queue_is_empty()));
}

#[test]
fn test_end_of_audio_promotes_mismatched_decoder_after_rebuild() {
    let fixture = Fixture::new();
    fixture.engine.play_decoder(tone("a", 44100, 4096)).unwrap();
    fixture
        .engine
        .enqueue_decoder(tone("b", 48000, 48000 * 2))
        .unwrap();
    assert!(!fixture.engine.queue_is_empty());

    assert!(fixture.render_until(|f| f
        .recorder
        .contains(&Record::RenderingStarted("b".into()))));

    let recorder = &fixture.recorder;
    let a_complete = recorder
        .position(&Record::RenderingComplete("a".into()))
        .unwrap();
    let rebuilt = recorder.position(&Record::Configuration(48000)).unwrap();
    let b_decoding = recorder
        .position(&Record::DecodingStarted("b".into()))
        .unwrap();
    assert!(a_complete < rebuilt);
    assert!(rebuilt < b_decoding);
    assert!(!recorder.contains(&Record::EndOfAudio));
    assert_eq!(fixture.engine.rendering_format(), stereo(48000));

    assert!(fixture.render_until(|f| f.recorder.contains(&Record::EndOfAudio)));
    assert!(fixture.engine.queue_is_empty());
    assert_eq!(fixture.graph.render_errors(), 0);
}

#[test]
fn test_failed_promotion_is_reported_and_skipped() {
    let fixture = Fixture::new();
    fixture.engine.play_decoder(tone("a", 44100, 2048)).unwrap();
    fixture.engine.enqueue_decoder(dsd_tone("dsd")).unwrap();
    fixture.engine.enqueue_decoder(tone("c", 48000, 4800)).unwrap();

    assert!(fixture.render_until(|f| f
        .recorder
        .contains(&Record::RenderingStarted("c".into()))));
    let errors = fixture
        .recorder
        .records()
        .into_iter()
        .filter(|r| matches!(r, Record::Error(_)))
        .count();
    assert_eq!(errors, 1);
}

#[test]
fn test_end_of_audio_without_handler_stops() {
    let fixture = Fixture::builder().stop_at_end_of_audio().build();
    let mut events = fixture.engine.subscribe_events();
    fixture.engine.play_decoder(tone("a", 44100, 2048)).unwrap();

    assert!(fixture.render_until(|f| f.engine.is_stopped()));
    assert!(!fixture.recorder.contains(&Record::EndOfAudio));

    let mut saw_end = false;
    while let Ok(event) = events.try_recv() {
        saw_end |= matches!(event, PlayerEvent::EndOfAudio { .. });
    }
    assert!(saw_end);
}

struct ToneFactory;

impl DecoderFactory for ToneFactory {
    fn decoder_for(&self, source: &ProgramSource) -> segue_player::Result<Box<dyn Decoder>> {
        Ok(Box::new(
            ToneDecoder::sine(440.0, stereo(44100), 44100 * 10).named(source.to_string()),
        ))
    }
}

#[test]
fn test_play_source_uses_decoder_factory() {
    let graph = Arc::new(SoftwareGraph::new(stereo(44100), PERIOD_FRAMES));
    let engine = PlaybackEngine::builder(graph.clone())
        .decoder_factory(Arc::new(ToneFactory))
        .build()
        .unwrap();

    engine
        .play_source(ProgramSource::Url("tone://first".into()))
        .unwrap();
    engine
        .enqueue_source(ProgramSource::Url("tone://second".into()))
        .unwrap();
    assert!(engine.is_playing());
    assert!(!engine.queue_is_empty());
}

#[test]
fn test_play_source_without_factory_is_an_open_error() {
    let fixture = Fixture::new();
    let result = fixture
        .engine
        .play_source(ProgramSource::Url("tone://missing".into()));
    assert!(matches!(result, Err(Error::Open(_))));
    assert!(fixture.engine.is_stopped());
}
