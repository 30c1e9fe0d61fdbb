//! Builder for `PlaybackEngine`.

use super::control::{ControlMessage, ControlQueue};
use super::core::{ControlState, EngineShared, PlaybackEngine};
use super::events::node_sink;
use crate::audio::{DecoderFactory, DeviceQuery};
use crate::error::{Error, Result};
use crate::graph::{ConnectionPoint, RenderGraph};
use crate::playback::delegate::PlayerDelegate;
use crate::playback::flags::PlayerFlags;
use crate::playback::node::PlaybackNode;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use segue_common::config::{PlaybackConfig, SegueConfig};
use segue_common::PlaybackState;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn, Dispatch};

/// Capacity of the broadcast event channel.
/// Slow subscribers lag rather than block the control thread.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Builder for configuring and starting a playback engine.
///
/// Use [`PlaybackEngine::builder()`] to create a new builder.
///
/// # Example
///
/// ```ignore
/// use segue_player::{PlaybackEngine, PlayerDelegate, SoftwareGraph};
///
/// let graph = Arc::new(SoftwareGraph::from_config(&config.output).with_render_thread());
/// let engine = PlaybackEngine::builder(graph)
///     .config(config.playback.clone())
///     .delegate(PlayerDelegate::new().on_end_of_audio(|| println!("done")))
///     .build()?;
/// ```
///
/// [`PlaybackEngine::builder()`]: crate::PlaybackEngine::builder
#[must_use]
pub struct PlaybackEngineBuilder {
    graph: Arc<dyn RenderGraph>,
    config: PlaybackConfig,
    delegate: PlayerDelegate,
    decoder_factory: Option<Arc<dyn DecoderFactory>>,
    devices: Option<Arc<dyn DeviceQuery>>,
    dispatch: Option<Dispatch>,
    event_capacity: usize,
}

impl PlaybackEngineBuilder {
    pub fn new(graph: Arc<dyn RenderGraph>) -> Self {
        Self {
            graph,
            config: PlaybackConfig::default(),
            delegate: PlayerDelegate::default(),
            decoder_factory: None,
            devices: None,
            dispatch: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Engine tuning (frame budget, ring sizes, slot count)
    pub fn config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn delegate(mut self, delegate: PlayerDelegate) -> Self {
        self.delegate = delegate;
        self
    }

    /// Factory used by `play_source` / `enqueue_source`
    pub fn decoder_factory(mut self, factory: Arc<dyn DecoderFactory>) -> Self {
        self.decoder_factory = Some(factory);
        self
    }

    /// Device service used to resolve output device ids
    pub fn devices(mut self, devices: Arc<dyn DeviceQuery>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Logger for the engine's threads.
    ///
    /// Defaults to the dispatcher current when `build` is called.
    pub fn logger(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Attach an initial node matching the graph's output format and start
    /// the control thread.
    pub fn build(self) -> Result<PlaybackEngine> {
        let dispatch = self
            .dispatch
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(|current| current.clone()));
        tracing::dispatcher::with_default(&dispatch.clone(), || self.build_with(dispatch))
    }

    fn build_with(self, dispatch: Dispatch) -> Result<PlaybackEngine> {
        SegueConfig {
            playback: self.config.clone(),
            ..SegueConfig::default()
        }
        .validate()?;

        let graph = self.graph;
        let output = graph.output_format();
        let format = output
            .canonical()
            .ok_or_else(|| Error::FormatConversion(output.to_string()))?;

        let (control, receiver) = ControlQueue::new();
        let token = 1;
        let node = Arc::new(PlaybackNode::new(
            format,
            &self.config,
            node_sink(control.sender(), token),
            dispatch.clone(),
        )?);

        let node_id = graph.attach(node.clone())?;
        let mixer = ConnectionPoint::new(graph.main_mixer(), 0);
        if let Err(e) = graph.connect(node_id, mixer, &format) {
            let _ = graph.detach(node_id);
            return Err(e);
        }

        let (events, _) = broadcast::channel(self.event_capacity);
        let shared = Arc::new(EngineShared {
            graph: Arc::clone(&graph),
            node: ArcSwap::new(node),
            flags: PlayerFlags::new(),
            now_playing: Mutex::new(None),
            overflow: Mutex::new(VecDeque::new()),
            control_state: Mutex::new(ControlState {
                node_id,
                node_token: token,
                next_token: token + 1,
                reported_state: PlaybackState::derive(graph.is_running(), false),
            }),
            control,
            delegate: self.delegate,
            events,
            config: self.config,
            decoder_factory: self.decoder_factory,
            devices: self.devices,
            dispatch: dispatch.clone(),
        });

        shared.sync_output_bridge();
        shared.apply_render_headroom(node_id, &format);
        if let Err(e) = graph.prepare() {
            warn!("Render graph prepare failed: {}", e);
        }

        let sender = shared.control.sender();
        graph.set_configuration_change_handler(Some(Box::new(move || {
            let _ = sender.send(ControlMessage::ConfigurationChanged);
        })));

        let handle = match ControlQueue::spawn(Arc::clone(&shared), receiver, dispatch) {
            Ok(handle) => handle,
            Err(e) => {
                graph.set_configuration_change_handler(None);
                let _ = graph.detach(node_id);
                return Err(e);
            }
        };

        info!("Playback engine ready ({})", format);
        Ok(PlaybackEngine::from_parts(shared, handle))
    }
}
