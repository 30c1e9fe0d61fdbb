//! Client callbacks
//!
//! Every slot is optional. Callbacks run on the engine's control thread, so
//! they may call back into the engine but must not block for long.

use crate::audio::{DecoderHandle, ProcessingFormat};
use crate::error::Error;
use segue_common::PlaybackState;
use std::time::Instant;

type DecoderCallback = Box<dyn Fn(&DecoderHandle) + Send + Sync>;

/// Optional notification slots for lifecycle events
#[derive(Default)]
pub struct PlayerDelegate {
    decoding_started: Option<DecoderCallback>,
    decoding_complete: Option<DecoderCallback>,
    decoding_canceled: Option<Box<dyn Fn(&DecoderHandle, bool) + Send + Sync>>,
    rendering_will_start: Option<Box<dyn Fn(&DecoderHandle, Instant) + Send + Sync>>,
    rendering_started: Option<DecoderCallback>,
    rendering_complete: Option<DecoderCallback>,
    end_of_audio: Option<Box<dyn Fn() + Send + Sync>>,
    encountered_error: Option<Box<dyn Fn(&Error) + Send + Sync>>,
    now_playing_changed:
        Option<Box<dyn Fn(Option<&DecoderHandle>, Option<&DecoderHandle>) + Send + Sync>>,
    playback_state_changed: Option<Box<dyn Fn(PlaybackState) + Send + Sync>>,
    configuration_changed: Option<Box<dyn Fn(&ProcessingFormat) + Send + Sync>>,
}

impl PlayerDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_decoding_started(mut self, f: impl Fn(&DecoderHandle) + Send + Sync + 'static) -> Self {
        self.decoding_started = Some(Box::new(f));
        self
    }

    pub fn on_decoding_complete(mut self, f: impl Fn(&DecoderHandle) + Send + Sync + 'static) -> Self {
        self.decoding_complete = Some(Box::new(f));
        self
    }

    /// `f` receives whether any of the decoder's frames were rendered
    pub fn on_decoding_canceled(
        mut self,
        f: impl Fn(&DecoderHandle, bool) + Send + Sync + 'static,
    ) -> Self {
        self.decoding_canceled = Some(Box::new(f));
        self
    }

    /// `f` receives the host time at which the first frame will be audible
    pub fn on_rendering_will_start(
        mut self,
        f: impl Fn(&DecoderHandle, Instant) + Send + Sync + 'static,
    ) -> Self {
        self.rendering_will_start = Some(Box::new(f));
        self
    }

    pub fn on_rendering_started(mut self, f: impl Fn(&DecoderHandle) + Send + Sync + 'static) -> Self {
        self.rendering_started = Some(Box::new(f));
        self
    }

    pub fn on_rendering_complete(mut self, f: impl Fn(&DecoderHandle) + Send + Sync + 'static) -> Self {
        self.rendering_complete = Some(Box::new(f));
        self
    }

    /// Called instead of stopping when all audio has been rendered
    pub fn on_end_of_audio(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.end_of_audio = Some(Box::new(f));
        self
    }

    pub fn on_encountered_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.encountered_error = Some(Box::new(f));
        self
    }

    /// `f` receives the new and the previous now-playing decoder
    pub fn on_now_playing_changed(
        mut self,
        f: impl Fn(Option<&DecoderHandle>, Option<&DecoderHandle>) + Send + Sync + 'static,
    ) -> Self {
        self.now_playing_changed = Some(Box::new(f));
        self
    }

    pub fn on_playback_state_changed(
        mut self,
        f: impl Fn(PlaybackState) + Send + Sync + 'static,
    ) -> Self {
        self.playback_state_changed = Some(Box::new(f));
        self
    }

    /// `f` receives the rendering format after a graph reconfiguration
    pub fn on_configuration_changed(
        mut self,
        f: impl Fn(&ProcessingFormat) + Send + Sync + 'static,
    ) -> Self {
        self.configuration_changed = Some(Box::new(f));
        self
    }

    pub(crate) fn decoding_started(&self, decoder: &DecoderHandle) {
        if let Some(f) = &self.decoding_started {
            f(decoder);
        }
    }

    pub(crate) fn decoding_complete(&self, decoder: &DecoderHandle) {
        if let Some(f) = &self.decoding_complete {
            f(decoder);
        }
    }

    pub(crate) fn decoding_canceled(&self, decoder: &DecoderHandle, partially_rendered: bool) {
        if let Some(f) = &self.decoding_canceled {
            f(decoder, partially_rendered);
        }
    }

    pub(crate) fn rendering_will_start(&self, decoder: &DecoderHandle, host_time: Instant) {
        if let Some(f) = &self.rendering_will_start {
            f(decoder, host_time);
        }
    }

    pub(crate) fn rendering_started(&self, decoder: &DecoderHandle) {
        if let Some(f) = &self.rendering_started {
            f(decoder);
        }
    }

    pub(crate) fn rendering_complete(&self, decoder: &DecoderHandle) {
        if let Some(f) = &self.rendering_complete {
            f(decoder);
        }
    }

    /// Invoke the end-of-audio callback; `false` if none is set
    pub(crate) fn end_of_audio(&self) -> bool {
        match &self.end_of_audio {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }

    pub(crate) fn encountered_error(&self, error: &Error) {
        if let Some(f) = &self.encountered_error {
            f(error);
        }
    }

    pub(crate) fn now_playing_changed(
        &self,
        current: Option<&DecoderHandle>,
        previous: Option<&DecoderHandle>,
    ) {
        if let Some(f) = &self.now_playing_changed {
            f(current, previous);
        }
    }

    pub(crate) fn playback_state_changed(&self, state: PlaybackState) {
        if let Some(f) = &self.playback_state_changed {
            f(state);
        }
    }

    pub(crate) fn configuration_changed(&self, format: &ProcessingFormat) {
        if let Some(f) = &self.configuration_changed {
            f(format);
        }
    }
}

impl std::fmt::Debug for PlayerDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerDelegate")
            .field("end_of_audio", &self.end_of_audio.is_some())
            .field("encountered_error", &self.encountered_error.is_some())
            .finish_non_exhaustive()
    }
}
