//! Decoder queueing
//!
//! Two tiers: the node's gapless chain holds decoders in the node's format;
//! the overflow queue holds, in FIFO order, decoders that need a rebuild
//! before they can play.

use super::core::{EngineShared, PlaybackEngine};
use crate::audio::{DecoderHandle, ProcessingFormat, ProgramSource};
use crate::error::{Error, Result};
use crate::playback::flags::PlayerFlags;
use tracing::{debug, info, warn};

fn opened_format(decoder: &DecoderHandle) -> Result<ProcessingFormat> {
    decoder.open()?;
    decoder
        .processing_format()
        .ok_or_else(|| Error::Open(format!("{} reported no format", decoder.source())))
}

impl EngineShared {
    /// Replace the playback plan with `decoder` and start playing it
    pub(super) fn play_decoder(&self, decoder: DecoderHandle) -> Result<()> {
        let format = opened_format(&decoder)?;
        self.start_decoder(decoder, format, true)
    }

    /// Play a decoder taken from the head of the overflow queue, keeping the
    /// entries behind it
    pub(super) fn promote_decoder(&self, decoder: DecoderHandle) -> Result<()> {
        let format = opened_format(&decoder)?;
        self.start_decoder(decoder, format, false)
    }

    fn start_decoder(
        &self,
        decoder: DecoderHandle,
        format: ProcessingFormat,
        replace_queue: bool,
    ) -> Result<()> {
        self.flags.set(PlayerFlags::HAVE_PENDING_DECODER);

        self.graph.pause();
        self.graph.reset();
        {
            let node = self.node.load();
            node.pause();
            node.reset();
        }

        if !self.node.load().supports_format(&format) {
            if let Err(e) = self.reconfigure(format, false) {
                warn!("Reconfiguration for {} failed: {}", format, e);
            }
        }
        if replace_queue {
            self.clear_overflow();
        }

        if let Err(e) = self.node.load().reset_and_enqueue(decoder.clone()) {
            self.flags.clear(PlayerFlags::HAVE_PENDING_DECODER);
            self.set_now_playing(None);
            self.update_playback_state();
            return Err(Error::Enqueue(Box::new(e)));
        }

        info!("Playing {}", decoder.source());
        self.play_returning_error()
    }

    /// Append `decoder` to the node's chain, or to the overflow queue when
    /// its format needs a rebuild
    pub(super) fn enqueue_decoder(&self, decoder: DecoderHandle) -> Result<()> {
        let format = opened_format(&decoder)?;

        let node = self.node.load();
        if node.supports_format(&format) {
            return node.enqueue(decoder);
        }

        let mut overflow = self.overflow.lock();
        debug!(
            "Queued {} for later playback ({}; {} waiting)",
            decoder.source(),
            format,
            overflow.len()
        );
        overflow.push_back(decoder);
        Ok(())
    }

    /// Advance to the next decoder.
    ///
    /// Returns `false` if there was nothing to advance to.
    pub(super) fn skip_to_next(&self) -> Result<bool> {
        let node = self.node.load_full();

        if node.has_active_successor() {
            // Already decoding, so no DecodingStarted follows to clear a
            // pending flag. The successor's RenderingStarted clears this one.
            self.flags.set(PlayerFlags::RENDERING_IMMINENT);
            node.cancel_current_decoder();
            debug!("Skipped to decoded-ahead successor");
            return Ok(true);
        }

        if !node.queue_is_empty() {
            self.flags.set(PlayerFlags::HAVE_PENDING_DECODER);
            node.cancel_current_decoder();
            debug!("Skipped within the gapless chain");
            return Ok(true);
        }

        let next = self.overflow.lock().pop_front();
        match next {
            Some(decoder) => {
                debug!("Skipping to queued {}", decoder.source());
                self.promote_decoder(decoder)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(super) fn clear_queue(&self) {
        let queued = self.node.load().clear_queue();
        let overflow = self.clear_overflow();
        debug!("Queue cleared ({} gapless, {} overflow)", queued, overflow);
    }

    pub(super) fn queue_is_empty(&self) -> bool {
        self.overflow.lock().is_empty() && self.node.load().queue_is_empty()
    }

    fn decoder_for(&self, source: &ProgramSource) -> Result<DecoderHandle> {
        let factory = self
            .decoder_factory
            .as_ref()
            .ok_or_else(|| Error::Open(format!("no decoder factory for {}", source)))?;
        Ok(DecoderHandle::from_boxed(factory.decoder_for(source)?))
    }
}

impl PlaybackEngine {
    /// Open `decoder` if needed and play it immediately, replacing anything
    /// queued.
    ///
    /// # Errors
    /// - `Error::Open` if the decoder cannot be opened (nothing changes)
    /// - `Error::Enqueue` if the node rejects it
    /// - `Error::GraphStart` if rendering cannot start
    pub fn play_decoder(&self, decoder: DecoderHandle) -> Result<()> {
        self.shared.run_sync(move |shared| shared.play_decoder(decoder))?
    }

    /// Queue `decoder` after everything already queued.
    ///
    /// Decoders in the current node's format join the gapless chain; others
    /// wait in the overflow queue until the chain runs dry.
    pub fn enqueue_decoder(&self, decoder: DecoderHandle) -> Result<()> {
        self.shared.run_sync(move |shared| shared.enqueue_decoder(decoder))?
    }

    /// Create a decoder through the configured factory and play it
    pub fn play_source(&self, source: ProgramSource) -> Result<()> {
        let decoder = self.shared.decoder_for(&source)?;
        self.play_decoder(decoder)
    }

    /// Create a decoder through the configured factory and queue it
    pub fn enqueue_source(&self, source: ProgramSource) -> Result<()> {
        let decoder = self.shared.decoder_for(&source)?;
        self.enqueue_decoder(decoder)
    }

    /// Cancel the current decoder in favour of the next queued one.
    ///
    /// Returns `false` (and does nothing) if nothing is queued.
    pub fn skip_to_next(&self) -> Result<bool> {
        self.shared.run_sync(|shared| shared.skip_to_next())?
    }

    /// Drop every queued decoder; the current one keeps rendering
    pub fn clear_queue(&self) -> Result<()> {
        self.shared.run_sync(|shared| shared.clear_queue())
    }

    /// True if neither the gapless chain nor the overflow queue holds a
    /// decoder. Never waits on the control thread.
    pub fn queue_is_empty(&self) -> bool {
        self.shared.queue_is_empty()
    }

    /// Whether a decoder in `format` would join the current chain gaplessly
    pub fn format_will_be_gapless(&self, format: &ProcessingFormat) -> bool {
        self.shared.node.load().supports_format(format)
    }

    /// Format the current node renders
    pub fn rendering_format(&self) -> ProcessingFormat {
        self.shared.node.load().format()
    }
}
