//! In-process render graph
//!
//! `SoftwareGraph` implements `RenderGraph` without an audio device: a main
//! mixer, a mixer→output bridge and any number of attached sources. Rendering
//! happens either on a timer thread paced like a device (`with_render_thread`)
//! or cycle by cycle through `render_cycle`, which is what the tests use.
//!
//! Nodes whose rate differs from the output are pulled for proportionally more
//! (or fewer) frames per cycle. A pull larger than the node's maximum frame
//! budget fails that cycle for the node and is counted in `render_errors`.
//!
//! Every control call is appended to an operation journal so callers can
//! assert exactly which graph operations an engine issued.

use super::{
    ConfigurationChangeHandler, ConnectionPoint, NodeId, RenderGraph, RenderSource,
    RenderTimestamp,
};
use crate::audio::{OutputDevice, ProcessingFormat};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use segue_common::config::OutputConfig;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Id of the main mixer
const MIXER: NodeId = NodeId(0);

/// A control operation issued against the graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    Attach(NodeId),
    Detach(NodeId),
    Connect {
        node: NodeId,
        to: ConnectionPoint,
        format: ProcessingFormat,
    },
    ConnectMixerToOutput(ProcessingFormat),
    Prepare,
    Start,
    Pause,
    Stop,
    Reset,
    SetMaximumFramesToRender { node: NodeId, frames: u32 },
    AllocateRenderResources(NodeId),
    DeallocateRenderResources(NodeId),
    SetOutputVolume(f32),
    SetOutputDevice(String),
}

/// Operations that can be made to fail once, for exercising error paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFault {
    Attach,
    Connect,
    Prepare,
    Start,
}

struct NodeEntry {
    source: Arc<dyn RenderSource>,
    output: Option<ConnectionPoint>,
    format: Option<ProcessingFormat>,
    maximum_frames: u32,
    scratch: Vec<f32>,
    allocated: bool,
}

impl NodeEntry {
    fn allocate(&mut self) {
        let channels = self.source.format().channels.max(1) as usize;
        self.scratch = vec![0.0; self.maximum_frames as usize * channels];
        self.allocated = true;
    }

    fn deallocate(&mut self) {
        self.scratch = Vec::new();
        self.allocated = false;
    }
}

struct Topology {
    next_id: u32,
    nodes: BTreeMap<NodeId, NodeEntry>,
    mixer_output_format: ProcessingFormat,
    output_format: ProcessingFormat,
    device: Option<String>,
    faults: Vec<GraphFault>,
}

impl Topology {
    fn entry_mut(&mut self, node: NodeId) -> Result<&mut NodeEntry> {
        self.nodes
            .get_mut(&node)
            .ok_or_else(|| Error::Graph(format!("{} is not attached", node)))
    }

    fn take_fault(&mut self, fault: GraphFault) -> bool {
        match self.faults.iter().position(|f| *f == fault) {
            Some(index) => {
                self.faults.remove(index);
                true
            }
            None => false,
        }
    }
}

struct GraphShared {
    topology: Mutex<Topology>,
    running: AtomicBool,
    shutdown: AtomicBool,
    period_frames: u32,
    volume: AtomicU32,
    sample_time: AtomicU64,
    render_errors: AtomicU64,
    peak: AtomicU32,
    journal: Mutex<Vec<GraphOp>>,
    change_handler: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl GraphShared {
    fn record(&self, op: GraphOp) {
        self.journal.lock().push(op);
    }

    fn notify_configuration_change(&self) {
        // Clone out so the handler runs without the lock held
        let handler = self.change_handler.lock().clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    /// One render cycle of `frames` output frames.
    ///
    /// Never blocks: if a control call holds the topology, the cycle renders
    /// nothing.
    fn render_cycle(&self, frames: u32) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        let Some(mut topology) = self.topology.try_lock() else {
            return false;
        };

        let output_rate = topology.mixer_output_format.sample_rate.max(1);
        let sample_time = self.sample_time.load(Ordering::Relaxed);
        let latency = Duration::from_secs_f64(self.period_frames as f64 / output_rate as f64);
        let timestamp = RenderTimestamp {
            host_time: Instant::now() + latency,
            sample_time,
        };

        let mut peak = 0.0f32;
        for entry in topology.nodes.values_mut() {
            match entry.output {
                Some(point) if point.node == MIXER => {}
                _ => continue,
            }
            if !entry.allocated {
                self.render_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let node_rate = entry.format.map_or(output_rate, |f| f.sample_rate);
            let needed = frames_for_rate(frames, node_rate, output_rate);
            if needed > entry.maximum_frames {
                self.render_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let channels = entry.source.format().channels.max(1) as usize;
            let len = needed as usize * channels;
            if entry.scratch.len() < len {
                self.render_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let buffer = &mut entry.scratch[..len];
            entry.source.render(&timestamp, buffer, needed as usize);
            peak = buffer.iter().fold(peak, |acc, s| acc.max(s.abs()));
        }
        drop(topology);

        let volume = f32::from_bits(self.volume.load(Ordering::Relaxed));
        self.peak.store((peak * volume).to_bits(), Ordering::Relaxed);
        self.sample_time
            .store(sample_time + frames as u64, Ordering::Relaxed);
        true
    }
}

/// Frames a node at `node_rate` must supply for `frames` output frames
fn frames_for_rate(frames: u32, node_rate: u32, output_rate: u32) -> u32 {
    if node_rate == output_rate || output_rate == 0 {
        return frames;
    }
    let scaled = frames as u64 * node_rate as u64;
    scaled.div_ceil(output_rate as u64) as u32
}

/// Device-less render graph
pub struct SoftwareGraph {
    shared: Arc<GraphShared>,
    realtime: bool,
    render_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SoftwareGraph {
    /// Graph rendering `output_format` in periods of `period_frames`.
    ///
    /// Rendering is manual (`render_cycle`) unless `with_render_thread` is
    /// used. Newly attached nodes get a maximum frame budget of one period.
    pub fn new(output_format: ProcessingFormat, period_frames: u32) -> Self {
        let topology = Topology {
            next_id: MIXER.0 + 1,
            nodes: BTreeMap::new(),
            mixer_output_format: output_format,
            output_format,
            device: None,
            faults: Vec::new(),
        };

        Self {
            shared: Arc::new(GraphShared {
                topology: Mutex::new(topology),
                running: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                period_frames: period_frames.max(1),
                volume: AtomicU32::new(1.0f32.to_bits()),
                sample_time: AtomicU64::new(0),
                render_errors: AtomicU64::new(0),
                peak: AtomicU32::new(0.0f32.to_bits()),
                journal: Mutex::new(Vec::new()),
                change_handler: Mutex::new(None),
            }),
            realtime: false,
            render_thread: Mutex::new(None),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(
            ProcessingFormat::standard(config.sample_rate, config.channels),
            config.period_frames,
        )
    }

    /// Pace rendering on a dedicated thread once started
    pub fn with_render_thread(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Select the initial output device
    pub fn with_device(self, device: &OutputDevice) -> Self {
        {
            let mut topology = self.shared.topology.lock();
            let format = ProcessingFormat::standard(device.sample_rate, device.channels);
            topology.device = Some(device.id.clone());
            topology.output_format = format;
            topology.mixer_output_format = format;
        }
        self
    }

    /// Render one cycle of `frames` output frames.
    ///
    /// Returns `false` if the graph is not running.
    pub fn render_cycle(&self, frames: u32) -> bool {
        self.shared.render_cycle(frames)
    }

    pub fn period_frames(&self) -> u32 {
        self.shared.period_frames
    }

    /// Journal of control operations, oldest first
    pub fn operations(&self) -> Vec<GraphOp> {
        self.shared.journal.lock().clone()
    }

    pub fn clear_operations(&self) {
        self.shared.journal.lock().clear();
    }

    /// Make the next call of the given kind fail
    pub fn fail_next(&self, fault: GraphFault) {
        self.shared.topology.lock().faults.push(fault);
    }

    /// Nodes currently attached (the main mixer excluded)
    pub fn attached_nodes(&self) -> Vec<NodeId> {
        self.shared.topology.lock().nodes.keys().copied().collect()
    }

    /// Format a node was connected with
    pub fn connection_format(&self, node: NodeId) -> Option<ProcessingFormat> {
        self.shared
            .topology
            .lock()
            .nodes
            .get(&node)
            .and_then(|entry| entry.format)
    }

    /// Output frames rendered since creation
    pub fn frames_rendered(&self) -> u64 {
        self.shared.sample_time.load(Ordering::Relaxed)
    }

    /// Node pulls that failed (budget exceeded or resources missing)
    pub fn render_errors(&self) -> u64 {
        self.shared.render_errors.load(Ordering::Relaxed)
    }

    /// Peak absolute sample value of the last cycle, after volume
    pub fn peak_level(&self) -> f32 {
        f32::from_bits(self.shared.peak.load(Ordering::Relaxed))
    }

    /// Behave as if the platform reconfigured the graph: rendering stops and
    /// the configuration change handler runs
    pub fn simulate_configuration_change(&self) {
        info!("Simulating render graph configuration change");
        self.shared.running.store(false, Ordering::Release);
        self.shared.notify_configuration_change();
    }

    /// Like `simulate_configuration_change`, with the device now reporting
    /// `format`
    pub fn simulate_output_format_change(&self, format: ProcessingFormat) {
        self.shared.topology.lock().output_format = format;
        self.simulate_configuration_change();
    }

    fn ensure_render_thread(&self) -> Result<()> {
        if !self.realtime {
            return Ok(());
        }
        let mut slot = self.render_thread.lock();
        if slot.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("segue-render".to_string())
            .spawn(move || render_loop(shared))
            .map_err(|e| Error::GraphStart(format!("Failed to spawn render thread: {}", e)))?;
        *slot = Some(handle);
        Ok(())
    }

    fn allocate_connected(topology: &mut Topology) {
        for entry in topology.nodes.values_mut() {
            if entry.output.is_some() && !entry.allocated {
                entry.allocate();
            }
        }
    }
}

fn render_loop(shared: Arc<GraphShared>) {
    debug!("Render thread started");
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let rate = shared.topology.lock().mixer_output_format.sample_rate.max(1);
        let period = Duration::from_secs_f64(shared.period_frames as f64 / rate as f64);
        let cycle_start = Instant::now();

        shared.render_cycle(shared.period_frames);

        if let Some(remaining) = period.checked_sub(cycle_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
    debug!("Render thread stopped");
}

impl RenderGraph for SoftwareGraph {
    fn attach(&self, source: Arc<dyn RenderSource>) -> Result<NodeId> {
        let mut topology = self.shared.topology.lock();
        if topology.take_fault(GraphFault::Attach) {
            return Err(Error::Graph("attach refused".to_string()));
        }

        let node = NodeId(topology.next_id);
        topology.next_id += 1;
        topology.nodes.insert(
            node,
            NodeEntry {
                source,
                output: None,
                format: None,
                maximum_frames: self.shared.period_frames,
                scratch: Vec::new(),
                allocated: false,
            },
        );
        drop(topology);

        debug!("Attached {}", node);
        self.shared.record(GraphOp::Attach(node));
        Ok(node)
    }

    fn detach(&self, node: NodeId) -> Result<()> {
        let mut topology = self.shared.topology.lock();
        if topology.nodes.remove(&node).is_none() {
            return Err(Error::Graph(format!("{} is not attached", node)));
        }
        for entry in topology.nodes.values_mut() {
            if entry.output.is_some_and(|point| point.node == node) {
                entry.output = None;
                entry.format = None;
            }
        }
        drop(topology);

        debug!("Detached {}", node);
        self.shared.record(GraphOp::Detach(node));
        Ok(())
    }

    fn connect(&self, node: NodeId, to: ConnectionPoint, format: &ProcessingFormat) -> Result<()> {
        let mut topology = self.shared.topology.lock();
        if topology.take_fault(GraphFault::Connect) {
            return Err(Error::Graph(format!("connect {} refused", node)));
        }
        if to.node != MIXER && !topology.nodes.contains_key(&to.node) {
            return Err(Error::Graph(format!("{} is not attached", to.node)));
        }
        if to.node == node {
            return Err(Error::Graph(format!("cannot connect {} to itself", node)));
        }

        let running = self.shared.running.load(Ordering::Acquire);
        let entry = topology.entry_mut(node)?;
        let source_format = entry.source.format();
        if !source_format.joins_gaplessly_with(format) {
            return Err(Error::Graph(format!(
                "{} renders {} but connection requested {}",
                node, source_format, format
            )));
        }

        entry.output = Some(to);
        entry.format = Some(*format);
        if running && !entry.allocated {
            entry.allocate();
        }
        drop(topology);

        debug!("Connected {} to {}:{} ({})", node, to.node, to.bus, format);
        self.shared.record(GraphOp::Connect {
            node,
            to,
            format: *format,
        });
        Ok(())
    }

    fn output_connection(&self, node: NodeId) -> Option<ConnectionPoint> {
        self.shared
            .topology
            .lock()
            .nodes
            .get(&node)
            .and_then(|entry| entry.output)
    }

    fn main_mixer(&self) -> NodeId {
        MIXER
    }

    fn mixer_output_format(&self) -> ProcessingFormat {
        self.shared.topology.lock().mixer_output_format
    }

    fn output_format(&self) -> ProcessingFormat {
        self.shared.topology.lock().output_format
    }

    fn connect_mixer_to_output(&self, format: &ProcessingFormat) -> Result<()> {
        if format.canonical().is_none() {
            return Err(Error::Graph(format!("unusable output format {}", format)));
        }
        self.shared.topology.lock().mixer_output_format = *format;
        debug!("Connected main mixer to output ({})", format);
        self.shared.record(GraphOp::ConnectMixerToOutput(*format));
        Ok(())
    }

    fn prepare(&self) -> Result<()> {
        let mut topology = self.shared.topology.lock();
        if topology.take_fault(GraphFault::Prepare) {
            return Err(Error::Graph("prepare failed".to_string()));
        }
        Self::allocate_connected(&mut topology);
        drop(topology);

        self.shared.record(GraphOp::Prepare);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        {
            let mut topology = self.shared.topology.lock();
            if topology.take_fault(GraphFault::Start) {
                return Err(Error::GraphStart("output device unavailable".to_string()));
            }
            Self::allocate_connected(&mut topology);
        }

        self.ensure_render_thread()?;
        self.shared.running.store(true, Ordering::Release);
        info!("Render graph started");
        self.shared.record(GraphOp::Start);
        Ok(())
    }

    fn pause(&self) {
        self.shared.running.store(false, Ordering::Release);
        debug!("Render graph paused");
        self.shared.record(GraphOp::Pause);
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        let mut topology = self.shared.topology.lock();
        for entry in topology.nodes.values_mut() {
            entry.deallocate();
        }
        drop(topology);

        info!("Render graph stopped");
        self.shared.record(GraphOp::Stop);
    }

    fn reset(&self) {
        self.shared.peak.store(0.0f32.to_bits(), Ordering::Relaxed);
        self.shared.record(GraphOp::Reset);
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn maximum_frames_to_render(&self, node: NodeId) -> Result<u32> {
        Ok(self.shared.topology.lock().entry_mut(node)?.maximum_frames)
    }

    fn set_maximum_frames_to_render(&self, node: NodeId, frames: u32) -> Result<()> {
        let mut topology = self.shared.topology.lock();
        let entry = topology.entry_mut(node)?;
        if entry.allocated {
            return Err(Error::Graph(format!(
                "cannot change frame budget of {} while render resources are allocated",
                node
            )));
        }
        entry.maximum_frames = frames;
        drop(topology);

        debug!("Maximum frames to render for {} set to {}", node, frames);
        self.shared
            .record(GraphOp::SetMaximumFramesToRender { node, frames });
        Ok(())
    }

    fn render_resources_allocated(&self, node: NodeId) -> bool {
        self.shared
            .topology
            .lock()
            .nodes
            .get(&node)
            .is_some_and(|entry| entry.allocated)
    }

    fn allocate_render_resources(&self, node: NodeId) -> Result<()> {
        self.shared.topology.lock().entry_mut(node)?.allocate();
        self.shared.record(GraphOp::AllocateRenderResources(node));
        Ok(())
    }

    fn deallocate_render_resources(&self, node: NodeId) {
        if let Some(entry) = self.shared.topology.lock().nodes.get_mut(&node) {
            entry.deallocate();
        }
        self.shared.record(GraphOp::DeallocateRenderResources(node));
    }

    fn output_volume(&self) -> f32 {
        f32::from_bits(self.shared.volume.load(Ordering::Relaxed))
    }

    fn set_output_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::Graph(format!("volume {} out of range", volume)));
        }
        self.shared.volume.store(volume.to_bits(), Ordering::Relaxed);
        self.shared.record(GraphOp::SetOutputVolume(volume));
        Ok(())
    }

    fn output_device(&self) -> Option<String> {
        self.shared.topology.lock().device.clone()
    }

    fn set_output_device(&self, device: &OutputDevice) -> Result<()> {
        let format = ProcessingFormat::standard(device.sample_rate, device.channels);
        if format.canonical().is_none() {
            return Err(Error::Graph(format!(
                "device '{}' reports unusable format {}",
                device.id, format
            )));
        }

        {
            let mut topology = self.shared.topology.lock();
            topology.device = Some(device.id.clone());
            topology.output_format = format;
        }
        info!("Output device set to '{}' ({})", device.name, format);
        self.shared.record(GraphOp::SetOutputDevice(device.id.clone()));

        // Switching devices reconfigures the graph
        self.shared.running.store(false, Ordering::Release);
        self.shared.notify_configuration_change();
        Ok(())
    }

    fn set_configuration_change_handler(&self, handler: Option<ConfigurationChangeHandler>) {
        *self.shared.change_handler.lock() = handler.map(Arc::from);
    }
}

impl Drop for SoftwareGraph {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.render_thread.lock().take() {
            if handle.join().is_err() {
                warn!("Render thread panicked");
            }
        }
    }
}
