//! Test helpers for segue-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - Fixture: engine over a manually rendered SoftwareGraph
//! - Recorder: delegate that logs every callback in arrival order
//! - tone / failing_tone: short generated decoders
//! - wait_until: polling with a timeout

#![allow(dead_code)]

use parking_lot::Mutex;
use segue_common::config::PlaybackConfig;
use segue_player::audio::StaticDevices;
use segue_player::graph::SoftwareGraph;
use segue_player::{
    DecoderHandle, PlaybackEngine, PlaybackState, PlayerDelegate, ProcessingFormat, ToneDecoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const PERIOD_FRAMES: u32 = 512;
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One delegate callback
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    DecodingStarted(String),
    DecodingComplete(String),
    DecodingCanceled(String, bool),
    RenderingWillStart(String),
    RenderingStarted(String),
    RenderingComplete(String),
    EndOfAudio,
    Error(String),
    NowPlaying(Option<String>),
    State(PlaybackState),
    Configuration(u32),
}

/// Delegate that records every callback
#[derive(Clone, Default)]
pub struct Recorder {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: Record) {
        self.records.lock().push(record);
    }

    /// Delegate feeding this recorder; `handle_end_of_audio` decides whether
    /// the end-of-audio slot is set (unset means the engine stops itself)
    pub fn delegate(&self, handle_end_of_audio: bool) -> PlayerDelegate {
        let r = self.clone();
        let mut delegate = PlayerDelegate::new()
            .on_decoding_started({
                let r = r.clone();
                move |d| r.push(Record::DecodingStarted(d.source().to_string()))
            })
            .on_decoding_complete({
                let r = r.clone();
                move |d| r.push(Record::DecodingComplete(d.source().to_string()))
            })
            .on_decoding_canceled({
                let r = r.clone();
                move |d, partial| r.push(Record::DecodingCanceled(d.source().to_string(), partial))
            })
            .on_rendering_will_start({
                let r = r.clone();
                move |d, _| r.push(Record::RenderingWillStart(d.source().to_string()))
            })
            .on_rendering_started({
                let r = r.clone();
                move |d| r.push(Record::RenderingStarted(d.source().to_string()))
            })
            .on_rendering_complete({
                let r = r.clone();
                move |d| r.push(Record::RenderingComplete(d.source().to_string()))
            })
            .on_encountered_error({
                let r = r.clone();
                move |e| r.push(Record::Error(e.to_string()))
            })
            .on_now_playing_changed({
                let r = r.clone();
                move |current, _| r.push(Record::NowPlaying(current.map(|d| d.source().to_string())))
            })
            .on_playback_state_changed({
                let r = r.clone();
                move |state| r.push(Record::State(state))
            })
            .on_configuration_changed({
                let r = r.clone();
                move |format| r.push(Record::Configuration(format.sample_rate))
            });

        if handle_end_of_audio {
            delegate = delegate.on_end_of_audio(move || r.push(Record::EndOfAudio));
        }
        delegate
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.records.lock().contains(record)
    }

    pub fn count(&self, record: &Record) -> usize {
        self.records.lock().iter().filter(|r| *r == record).count()
    }

    /// Index of the first occurrence of `record`
    pub fn position(&self, record: &Record) -> Option<usize> {
        self.records.lock().iter().position(|r| r == record)
    }

    /// NowPlaying transitions in order
    pub fn now_playing_history(&self) -> Vec<Option<String>> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                Record::NowPlaying(current) => Some(current.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Engine over a `SoftwareGraph` that only renders when the test asks it to
pub struct Fixture {
    pub graph: Arc<SoftwareGraph>,
    pub engine: PlaybackEngine,
    pub recorder: Recorder,
}

pub struct FixtureBuilder {
    output_rate: u32,
    handle_end_of_audio: bool,
    devices: Option<StaticDevices>,
}

impl FixtureBuilder {
    pub fn output_rate(mut self, rate: u32) -> Self {
        self.output_rate = rate;
        self
    }

    /// Leave the end-of-audio slot unset so the engine stops at the end
    pub fn stop_at_end_of_audio(mut self) -> Self {
        self.handle_end_of_audio = false;
        self
    }

    pub fn devices(mut self, devices: StaticDevices) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn build(self) -> Fixture {
        let graph = Arc::new(SoftwareGraph::new(
            ProcessingFormat::standard(self.output_rate, 2),
            PERIOD_FRAMES,
        ));
        let recorder = Recorder::new();

        let mut builder = PlaybackEngine::builder(graph.clone())
            .config(test_config())
            .delegate(recorder.delegate(self.handle_end_of_audio));
        if let Some(devices) = self.devices {
            builder = builder.devices(Arc::new(devices));
        }
        let engine = builder.build().expect("engine builds");

        Fixture {
            graph,
            engine,
            recorder,
        }
    }
}

impl Fixture {
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder {
            output_rate: 44100,
            handle_end_of_audio: true,
            devices: None,
        }
    }

    /// Engine with a 44.1 kHz stereo output
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Render cycles until `condition` holds; `false` on timeout
    pub fn render_until(&self, condition: impl Fn(&Fixture) -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition(self) {
                return true;
            }
            self.graph.render_cycle(PERIOD_FRAMES);
            std::thread::sleep(Duration::from_millis(1));
        }
        condition(self)
    }

    pub fn now_playing_source(&self) -> Option<String> {
        self.engine.now_playing().map(|d| d.source().to_string())
    }

    pub fn is_now_playing(&self, source: &str) -> bool {
        self.now_playing_source().as_deref() == Some(source)
    }
}

fn test_config() -> PlaybackConfig {
    PlaybackConfig {
        frame_budget: PERIOD_FRAMES,
        ring_buffer_frames: 8192,
        decode_chunk_frames: 1024,
        event_ring_capacity: 256,
        notifier_tick_ms: 2,
        active_decoder_slots: 8,
    }
}

pub fn stereo(rate: u32) -> ProcessingFormat {
    ProcessingFormat::standard(rate, 2)
}

/// Stereo sine decoder named `name`
pub fn tone(name: &str, rate: u32, frames: u64) -> DecoderHandle {
    DecoderHandle::new(ToneDecoder::sine(440.0, stereo(rate), frames).named(name))
}

/// Decoder whose open fails with `diagnostic`
pub fn failing_tone(name: &str, diagnostic: &str) -> DecoderHandle {
    DecoderHandle::new(
        ToneDecoder::sine(440.0, stereo(44100), 4096)
            .named(name)
            .failing_open(diagnostic),
    )
}

/// Poll `condition` until it holds; `false` on timeout
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
