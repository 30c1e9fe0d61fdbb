//! Decoder boundary
//!
//! Format-specific decoding lives outside this crate. The engine only needs a
//! positionable, sequential supply of `f32` PCM frames in a known format.
//!
//! `DecoderHandle` wraps a decoder with a stable identity so it can move
//! between the engine's overflow queue, the node's gapless chain and the
//! now-playing slot. Frames are only ever pulled by one node's decoding
//! thread at a time.

use super::format::ProcessingFormat;
use crate::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use segue_common::events::DecoderInfo;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// A program source a decoder can be created for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSource {
    /// Local file
    Path(PathBuf),
    /// Remote or custom-scheme location
    Url(String),
}

impl std::fmt::Display for ProgramSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramSource::Path(path) => write!(f, "{}", path.display()),
            ProgramSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// PCM decoder
pub trait Decoder: Send {
    /// Human readable description of what is being decoded
    fn source_name(&self) -> String;

    /// Prepare the decoder for reading. May fail with a diagnostic.
    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Format of the frames `read_frames` produces. Only meaningful once open.
    fn processing_format(&self) -> ProcessingFormat;

    /// Total frames, if known
    fn frame_length(&self) -> Option<u64>;

    /// Index of the next frame `read_frames` will return
    fn frame_position(&self) -> u64;

    /// Read up to `frames` interleaved frames into `buffer`.
    ///
    /// `buffer` holds at least `frames * channels` samples. Returns the number
    /// of frames written; zero means the end of the stream.
    fn read_frames(&mut self, buffer: &mut [f32], frames: usize) -> Result<usize>;

    fn supports_seeking(&self) -> bool {
        false
    }

    fn seek_to_frame(&mut self, _frame: u64) -> Result<()> {
        Err(Error::Decode(format!(
            "{} does not support seeking",
            self.source_name()
        )))
    }
}

/// Creates decoders for program sources
pub trait DecoderFactory: Send + Sync {
    fn decoder_for(&self, source: &ProgramSource) -> Result<Box<dyn Decoder>>;
}

struct HandleInner {
    id: Uuid,
    source: String,
    decoder: Mutex<Box<dyn Decoder>>,
    format: OnceLock<ProcessingFormat>,
    open: AtomicBool,
}

/// Shared, identity-carrying reference to a decoder
#[derive(Clone)]
pub struct DecoderHandle {
    inner: Arc<HandleInner>,
}

impl DecoderHandle {
    pub fn new<D: Decoder + 'static>(decoder: D) -> Self {
        Self::from_boxed(Box::new(decoder))
    }

    pub fn from_boxed(decoder: Box<dyn Decoder>) -> Self {
        let source = decoder.source_name();
        let open = decoder.is_open();
        let format = OnceLock::new();
        if open {
            let _ = format.set(decoder.processing_format());
        }

        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                source,
                decoder: Mutex::new(decoder),
                format,
                open: AtomicBool::new(open),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Open the decoder if it is not open yet.
    ///
    /// Failures surface as `Error::Open` carrying the decoder's diagnostic.
    pub fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let mut decoder = self.inner.decoder.lock();
        if !decoder.is_open() {
            decoder.open().map_err(|e| match e {
                Error::Open(_) => e,
                other => Error::Open(format!("{}: {}", self.inner.source, other)),
            })?;
        }
        let _ = self.inner.format.set(decoder.processing_format());
        self.inner.open.store(true, Ordering::Release);
        Ok(())
    }

    /// Processing format, available once the decoder is open
    pub fn processing_format(&self) -> Option<ProcessingFormat> {
        self.inner.format.get().copied()
    }

    pub fn supports_seeking(&self) -> bool {
        self.inner.decoder.lock().supports_seeking()
    }

    pub fn frame_length(&self) -> Option<u64> {
        self.inner.decoder.lock().frame_length()
    }

    pub fn info(&self) -> DecoderInfo {
        DecoderInfo {
            id: self.inner.id,
            source: self.inner.source.clone(),
        }
    }

    /// Exclusive access for reading frames or seeking
    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn Decoder>> {
        self.inner.decoder.lock()
    }
}

impl PartialEq for DecoderHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for DecoderHandle {}

impl std::fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderHandle")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("format", &self.inner.format.get())
            .finish()
    }
}
