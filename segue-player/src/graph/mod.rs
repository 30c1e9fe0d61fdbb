//! Render graph boundary
//!
//! The engine drives an external node graph through `RenderGraph`: attach and
//! detach nodes, wire them with explicit formats, control render budgets and
//! start/stop rendering. Implementations are internally synchronized; the
//! engine guarantees that every mutating call comes from its single control
//! context, so topology changes are totally ordered.
//!
//! `RenderSource` is the other direction: the graph's real-time render
//! context pulls frames from attached sources.

pub mod software;

use crate::audio::{OutputDevice, ProcessingFormat};
use crate::error::Result;
use std::sync::Arc;
use std::time::Instant;

pub use software::{GraphFault, GraphOp, SoftwareGraph};

/// Graph-assigned node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// An input bus of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionPoint {
    pub node: NodeId,
    pub bus: u32,
}

impl ConnectionPoint {
    pub fn new(node: NodeId, bus: u32) -> Self {
        Self { node, bus }
    }
}

/// Timing of a render cycle
#[derive(Debug, Clone, Copy)]
pub struct RenderTimestamp {
    /// When the first frame of this cycle reaches the output
    pub host_time: Instant,
    /// Running frame counter of the output
    pub sample_time: u64,
}

/// Invoked when the graph's configuration changed underneath the engine
/// (device removed, route changed, device format switched)
pub type ConfigurationChangeHandler = Box<dyn Fn() + Send + Sync>;

/// Pull-model render callback.
///
/// `render` runs on the real-time context: it must not block, allocate or log.
pub trait RenderSource: Send + Sync {
    /// Fill `output` with `frames` interleaved frames in `format()`
    fn render(&self, timestamp: &RenderTimestamp, output: &mut [f32], frames: usize);

    /// The fixed format this source renders
    fn format(&self) -> ProcessingFormat;
}

/// External audio node graph
pub trait RenderGraph: Send + Sync {
    /// Attach a source node; it is not connected yet
    fn attach(&self, source: Arc<dyn RenderSource>) -> Result<NodeId>;

    /// Detach a node, dropping its connections
    fn detach(&self, node: NodeId) -> Result<()>;

    /// Connect a node's output to `to` using `format`
    fn connect(&self, node: NodeId, to: ConnectionPoint, format: &ProcessingFormat) -> Result<()>;

    /// Where a node's output is connected, if anywhere
    fn output_connection(&self, node: NodeId) -> Option<ConnectionPoint>;

    /// The default mixing node
    fn main_mixer(&self) -> NodeId;

    /// Format of the mixer→output bridge
    fn mixer_output_format(&self) -> ProcessingFormat;

    /// Format of the output device
    fn output_format(&self) -> ProcessingFormat;

    /// Rewire the mixer→output bridge with `format`
    fn connect_mixer_to_output(&self, format: &ProcessingFormat) -> Result<()>;

    /// Allocate render resources so `start` is fast
    fn prepare(&self) -> Result<()>;

    fn start(&self) -> Result<()>;

    /// Halt rendering, keeping resources allocated
    fn pause(&self);

    /// Halt rendering and release resources
    fn stop(&self);

    /// Drop any rendering state (e.g. effect tails)
    fn reset(&self);

    fn is_running(&self) -> bool;

    fn maximum_frames_to_render(&self, node: NodeId) -> Result<u32>;

    fn set_maximum_frames_to_render(&self, node: NodeId, frames: u32) -> Result<()>;

    fn render_resources_allocated(&self, node: NodeId) -> bool;

    fn allocate_render_resources(&self, node: NodeId) -> Result<()>;

    fn deallocate_render_resources(&self, node: NodeId);

    fn output_volume(&self) -> f32;

    fn set_output_volume(&self, volume: f32) -> Result<()>;

    /// Identifier of the current output device
    fn output_device(&self) -> Option<String>;

    /// Switch output device; the graph reports the change through the
    /// configuration change handler
    fn set_output_device(&self, device: &OutputDevice) -> Result<()>;

    /// Register (or clear) the configuration change handler
    fn set_configuration_change_handler(&self, handler: Option<ConfigurationChangeHandler>);
}
