//! Graph reconfiguration
//!
//! A node renders exactly one format, so a decoder in another format (or an
//! external interruption of the graph) means building a new node and wiring
//! it where the old one was. The swap is all-or-nothing: the engine's node
//! pointer changes only once the replacement is attached and connected, and
//! a failed attempt restores the previous node.

use super::core::EngineShared;
use super::events::node_sink;
use crate::audio::ProcessingFormat;
use crate::error::{Error, Result};
use crate::graph::{ConnectionPoint, NodeId};
use crate::playback::flags::PlayerFlags;
use crate::playback::node::PlaybackNode;
use chrono::Utc;
use segue_common::PlayerEvent;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Per-cycle frame budget for a node at `node_rate` feeding `downstream_rate`.
///
/// A node rendering faster than its downstream must supply proportionally
/// more frames per cycle.
pub fn render_frame_budget(frame_budget: u32, node_rate: u32, downstream_rate: u32) -> u32 {
    if downstream_rate == 0 || node_rate <= downstream_rate {
        return frame_budget;
    }
    let scaled = frame_budget as u64 * node_rate as u64;
    scaled.div_ceil(downstream_rate as u64) as u32
}

impl EngineShared {
    /// Rebuild the graph around a node rendering `format`.
    ///
    /// Returns `false` if the current node already renders the canonical
    /// equivalent of `format` and `force` is not set.
    pub(super) fn reconfigure(&self, format: ProcessingFormat, force: bool) -> Result<bool> {
        let target = format.canonical().ok_or_else(|| {
            error!("No canonical equivalent for {}; keeping current graph", format);
            Error::FormatConversion(format.to_string())
        })?;

        let previous = self.node.load_full();
        if !force && previous.format() == target {
            debug!("Node already renders {}", target);
            return Ok(false);
        }

        let (previous_id, token) = {
            let mut control = self.control_state.lock();
            let token = control.next_token;
            control.next_token += 1;
            (control.node_id, token)
        };
        let downstream = self
            .graph
            .output_connection(previous_id)
            .unwrap_or_else(|| ConnectionPoint::new(self.graph.main_mixer(), 0));

        let node = Arc::new(PlaybackNode::new(
            target,
            &self.config,
            node_sink(self.control.sender(), token),
            self.dispatch.clone(),
        )?);

        self.graph.detach(previous_id)?;
        let node_id = match self.attach_connected(&node, downstream, &target) {
            Ok(id) => id,
            Err(e) => {
                warn!("Rebuild for {} failed: {}; restoring previous node", target, e);
                self.restore(&previous, downstream);
                return Err(e);
            }
        };

        {
            let mut control = self.control_state.lock();
            control.node_id = node_id;
            control.node_token = token;
        }
        self.node.store(node);
        previous.stop();
        drop(previous);

        // Decoders of the replaced node are gone, and so is anything it was
        // about to render
        self.flags.clear(PlayerFlags::RENDERING_IMMINENT);
        self.set_now_playing(None);

        self.sync_output_bridge();
        self.apply_render_headroom(node_id, &target);
        if let Err(e) = self.graph.prepare() {
            warn!("Render graph prepare failed: {}", e);
        }

        info!(
            "Render graph reconfigured for {}{}",
            target,
            if force { " (forced)" } else { "" }
        );
        self.broadcast(PlayerEvent::ConfigurationChanged {
            sample_rate: target.sample_rate,
            channels: target.channels,
            forced: force,
            timestamp: Utc::now(),
        });
        self.delegate.configuration_changed(&target);
        Ok(true)
    }

    /// Attach `node` and connect it to `downstream`; detached again on failure
    fn attach_connected(
        &self,
        node: &Arc<PlaybackNode>,
        downstream: ConnectionPoint,
        format: &ProcessingFormat,
    ) -> Result<NodeId> {
        let node_id = self.graph.attach(node.clone())?;
        if let Err(e) = self.graph.connect(node_id, downstream, format) {
            let _ = self.graph.detach(node_id);
            return Err(e);
        }
        Ok(node_id)
    }

    /// Put the previous node back after a failed rebuild
    fn restore(&self, previous: &Arc<PlaybackNode>, downstream: ConnectionPoint) {
        match self.attach_connected(previous, downstream, &previous.format()) {
            Ok(node_id) => {
                self.control_state.lock().node_id = node_id;
                self.apply_render_headroom(node_id, &previous.format());
                debug!("Restored previous node as {}", node_id);
            }
            Err(e) => error!("Failed to restore previous node: {}", e),
        }
    }

    /// Rewire the mixer→output bridge if the output format moved
    pub(super) fn sync_output_bridge(&self) {
        let output = self.graph.output_format();
        let Some(format) = output.canonical() else {
            warn!("Output reports unusable format {}", output);
            return;
        };
        if self.graph.mixer_output_format() == format {
            return;
        }
        if let Err(e) = self.graph.connect_mixer_to_output(&format) {
            warn!("Failed to rewire mixer output for {}: {}", format, e);
        }
    }

    /// Size the node's per-cycle frame budget for its rate relative to the
    /// mixer output. Render resources are reallocated only if they were
    /// allocated.
    pub(super) fn apply_render_headroom(&self, node_id: NodeId, format: &ProcessingFormat) {
        let downstream_rate = self.graph.mixer_output_format().sample_rate;
        let budget = render_frame_budget(self.config.frame_budget, format.sample_rate, downstream_rate);

        match self.graph.maximum_frames_to_render(node_id) {
            Ok(current) if current == budget => return,
            Ok(_) => {}
            Err(e) => {
                warn!("Cannot read frame budget of {}: {}", node_id, e);
                return;
            }
        }

        let allocated = self.graph.render_resources_allocated(node_id);
        if allocated {
            self.graph.deallocate_render_resources(node_id);
        }
        if let Err(e) = self.graph.set_maximum_frames_to_render(node_id, budget) {
            warn!("Failed to set frame budget of {}: {}", node_id, e);
        } else {
            debug!("Frame budget of {} set to {}", node_id, budget);
        }
        if allocated {
            if let Err(e) = self.graph.allocate_render_resources(node_id) {
                warn!("Failed to reallocate render resources of {}: {}", node_id, e);
            }
        }
    }

    /// The graph was torn down from outside (device or route change).
    ///
    /// Always rebuilds, even if the format is unchanged, and leaves starting
    /// to the next `play`.
    pub(super) fn handle_configuration_change(&self) {
        info!("Render graph configuration changed");
        if self.graph.is_running() {
            self.graph.stop();
        }

        let format = self.node.load().format();
        if let Err(e) = self.reconfigure(format, true) {
            self.report_error(&e);
        }
        self.update_playback_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_unchanged_at_or_below_downstream_rate() {
        assert_eq!(render_frame_budget(512, 44100, 44100), 512);
        assert_eq!(render_frame_budget(512, 22050, 44100), 512);
        assert_eq!(render_frame_budget(512, 48000, 0), 512);
    }

    #[test]
    fn test_budget_scales_with_ceiling() {
        // 512 * 48000 / 44100 = 557.27
        assert_eq!(render_frame_budget(512, 48000, 44100), 558);
        assert_eq!(render_frame_budget(512, 96000, 48000), 1024);
        assert_eq!(render_frame_budget(4096, 192000, 44100), 17833);
    }
}
