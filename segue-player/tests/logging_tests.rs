//! Logger injection tests
//!
//! The engine logs through the dispatcher given to its builder, including on
//! the control and node threads it spawns, without any global subscriber.

mod helpers;

use helpers::*;
use parking_lot::Mutex;
use segue_player::graph::SoftwareGraph;
use segue_player::PlaybackEngine;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

#[derive(Debug, Clone)]
struct LogRecord {
    level: Level,
    message: String,
    thread: Option<String>,
}

#[derive(Clone, Default)]
struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.message.clone()).collect()
    }

    fn contains(&self, needle: &str) -> bool {
        self.records.lock().iter().any(|r| r.message.contains(needle))
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.records.lock().push(LogRecord {
            level: *event.metadata().level(),
            message: visitor.0,
            thread: std::thread::current().name().map(str::to_string),
        });
    }
}

#[test]
fn test_engine_logs_through_injected_dispatcher() {
    let capture = LogCapture::default();
    let dispatch = Dispatch::new(tracing_subscriber::registry().with(capture.clone()));

    let graph = Arc::new(SoftwareGraph::new(stereo(44100), PERIOD_FRAMES));
    let engine = PlaybackEngine::builder(graph.clone())
        .logger(dispatch)
        .build()
        .unwrap();

    engine.play_decoder(tone("a", 44100, 44100 * 10)).unwrap();
    assert!(wait_until(|| capture.contains("Playing a")));

    // Control thread logs land in the same capture
    let off_test_thread = capture
        .records
        .lock()
        .iter()
        .any(|r| r.thread.as_deref() != std::thread::current().name());
    assert!(off_test_thread, "captured: {:?}", capture.messages());

    engine.shutdown();
}

#[test]
fn test_reconfiguration_failures_are_logged_as_warnings() {
    let capture = LogCapture::default();
    let dispatch = Dispatch::new(tracing_subscriber::registry().with(capture.clone()));

    let graph = Arc::new(SoftwareGraph::new(stereo(44100), PERIOD_FRAMES));
    let engine = PlaybackEngine::builder(graph.clone())
        .logger(dispatch)
        .build()
        .unwrap();

    graph.fail_next(segue_player::graph::GraphFault::Attach);
    assert!(engine.play_decoder(tone("b", 48000, 48000)).is_err());

    let warned = capture
        .records
        .lock()
        .iter()
        .any(|r| r.level == Level::WARN && r.message.contains("Reconfiguration"));
    assert!(warned, "captured: {:?}", capture.messages());
}
