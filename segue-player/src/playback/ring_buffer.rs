/// Lock-free PCM ring buffer
///
/// Single-producer single-consumer buffer of interleaved `f32` samples between
/// a node's decoding thread (producer) and the render callback (consumer).
///
/// - Producer: pushes whole frames; a short write is an overrun and the
///   decoding thread retries later
/// - Consumer: pops whole frames; a short read is an underrun and the caller
///   renders silence for the rest
/// - Neither side logs; counters are read off-thread through `stats`

use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Ring buffer sized in frames of a fixed channel count
pub struct PcmRingBuffer {
    buffer: HeapRb<f32>,
    channels: usize,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    underruns: AtomicU64,
    overruns: AtomicU64,
}

impl PcmRingBuffer {
    /// Create a buffer holding `capacity_frames` frames of `channels` samples
    pub fn new(capacity_frames: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        let capacity_frames = capacity_frames.max(1);

        debug!(
            "Creating PCM ring buffer: {} frames x {} channels",
            capacity_frames, channels
        );

        Self {
            buffer: HeapRb::new(capacity_frames * channels),
            channels,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Split into producer and consumer halves
    pub fn split(self) -> (PcmProducer, PcmConsumer) {
        let (producer, consumer) = self.buffer.split();
        (
            PcmProducer {
                producer,
                channels: self.channels,
                counters: Arc::clone(&self.counters),
            },
            PcmConsumer {
                consumer,
                channels: self.channels,
                counters: self.counters,
            },
        )
    }
}

/// Producer half (decoding thread)
pub struct PcmProducer {
    producer: ringbuf::HeapProd<f32>,
    channels: usize,
    counters: Arc<Counters>,
}

impl PcmProducer {
    /// Free space in whole frames
    pub fn vacant_frames(&self) -> usize {
        self.producer.vacant_len() / self.channels
    }

    /// Push as many whole frames of `samples` as fit; returns frames written
    pub fn push_frames(&mut self, samples: &[f32]) -> usize {
        let frames = (samples.len() / self.channels).min(self.vacant_frames());
        if frames * self.channels < samples.len() {
            self.counters.overruns.fetch_add(1, Ordering::Relaxed);
        }
        let written = self.producer.push_slice(&samples[..frames * self.channels]);
        written / self.channels
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            underruns: self.counters.underruns.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
            capacity_frames: self.producer.capacity().get() / self.channels,
            occupied_frames: self.producer.occupied_len() / self.channels,
        }
    }
}

/// Consumer half (render callback)
pub struct PcmConsumer {
    consumer: ringbuf::HeapCons<f32>,
    channels: usize,
    counters: Arc<Counters>,
}

impl PcmConsumer {
    /// Buffered whole frames
    pub fn occupied_frames(&self) -> usize {
        self.consumer.occupied_len() / self.channels
    }

    /// Pop up to `frames` frames into `output`; returns frames read.
    ///
    /// Counts an underrun when fewer than `frames` were available.
    pub fn pop_frames(&mut self, output: &mut [f32], frames: usize) -> usize {
        let wanted = frames.min(output.len() / self.channels);
        let available = wanted.min(self.occupied_frames());
        if available < wanted {
            self.counters.underruns.fetch_add(1, Ordering::Relaxed);
        }
        let read = self
            .consumer
            .pop_slice(&mut output[..available * self.channels]);
        read / self.channels
    }

    /// Discard up to `frames` buffered frames; returns frames discarded
    pub fn skip_frames(&mut self, frames: usize) -> usize {
        let count = frames.min(self.occupied_frames());
        self.consumer.skip(count * self.channels) / self.channels
    }

    /// Discard everything buffered
    pub fn clear(&mut self) -> usize {
        self.consumer.clear() / self.channels
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            underruns: self.counters.underruns.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
            capacity_frames: self.consumer.capacity().get() / self.channels,
            occupied_frames: self.occupied_frames(),
        }
    }
}

/// Ring buffer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingBufferStats {
    /// Reads that found fewer frames than requested
    pub underruns: u64,

    /// Writes that could not store every frame
    pub overruns: u64,

    /// Capacity in frames
    pub capacity_frames: usize,

    /// Currently buffered frames
    pub occupied_frames: usize,
}

impl RingBufferStats {
    /// Fill level from 0.0 to 1.0
    pub fn fill_percent(&self) -> f32 {
        if self.capacity_frames == 0 {
            return 0.0;
        }
        self.occupied_frames as f32 / self.capacity_frames as f32
    }
}
