//! Render callback
//!
//! Runs on the graph's real-time context: no blocking, no allocation, no
//! logging. If the decoding thread holds the ring (cancel or seek in
//! progress) the cycle renders silence.
//!
//! Rendered frames are attributed to active decoders in sequence order.
//! Start notifications for decoders beginning in this cycle are posted before
//! completion notifications for decoders ending in it.

use super::decoder_state::state_flags::*;
use super::{NodeShared, RenderEvent, MAX_ACTIVE_DECODERS};
use crate::graph::RenderTimestamp;
use ringbuf::traits::*;
use std::sync::atomic::Ordering;
use std::time::Duration;

pub(super) fn render(
    shared: &NodeShared,
    timestamp: &RenderTimestamp,
    output: &mut [f32],
    frames: usize,
) {
    let channels = shared.format.channels.max(1) as usize;
    let len = (frames * channels).min(output.len());
    let output = &mut output[..len];

    if !shared.playing.load(Ordering::Acquire) {
        output.fill(0.0);
        return;
    }
    let Some(mut consumer) = shared.consumer.try_lock() else {
        output.fill(0.0);
        return;
    };

    let read = consumer.pop_frames(output, frames);
    output[read * channels..].fill(0.0);

    // Attribution happens under the consumer lock so cancels see consistent
    // counters
    attribute(shared, timestamp, read as u64);
    drop(consumer);
}

/// Occupied slots as (sequence, slot) pairs, ascending by sequence
fn ordered_slots(shared: &NodeShared, order: &mut [(u64, usize); MAX_ACTIVE_DECODERS]) -> usize {
    let mut count = 0;
    for (index, slot) in shared.slots.iter().enumerate() {
        if let Some(state) = &*slot.load() {
            let mut position = count;
            while position > 0 && order[position - 1].0 > state.sequence {
                order[position] = order[position - 1];
                position -= 1;
            }
            order[position] = (state.sequence, index);
            count += 1;
        }
    }
    count
}

fn attribute(shared: &NodeShared, timestamp: &RenderTimestamp, frames: u64) {
    let mut order = [(0u64, 0usize); MAX_ACTIVE_DECODERS];
    let count = ordered_slots(shared, &mut order);
    let sample_rate = shared.format.sample_rate.max(1) as f64;

    let mut remaining = frames;
    let mut offset = 0u64;
    let mut completed = 0u64;

    for (position, &(sequence, index)) in order[..count].iter().enumerate() {
        let guard = shared.slots[index].load();
        let Some(state) = &*guard else { continue };
        // Slot recycled since ordering
        if state.sequence != sequence || state.is_finished() {
            continue;
        }

        let take = remaining.min(state.frames_buffered());
        let decoding_complete = state.has(DECODING_COMPLETE);

        if !state.has(RENDERING_STARTED) && (take > 0 || (decoding_complete && state.frames_decoded() == 0)) {
            state.set(RENDERING_STARTED);
            let host_time = timestamp.host_time + Duration::from_secs_f64(offset as f64 / sample_rate);
            post(shared, RenderEvent::WillStart { sequence, host_time });
        }

        state.add_rendered(take);
        remaining -= take;
        offset += take;

        if decoding_complete
            && state.has(RENDERING_STARTED)
            && state.frames_rendered() >= state.frames_decoded()
        {
            state.set(RENDERING_COMPLETE);
            completed |= 1u64 << position;
        }
    }

    if completed == 0 {
        return;
    }
    for (position, &(sequence, _)) in order[..count].iter().enumerate() {
        if completed & (1u64 << position) != 0 {
            post(shared, RenderEvent::Complete { sequence });
        }
    }
}

fn post(shared: &NodeShared, event: RenderEvent) {
    // Single producer: only the render context posts, so this never contends
    let pushed = match shared.render_events.try_lock() {
        Some(mut producer) => producer.try_push(event).is_ok(),
        None => false,
    };
    if !pushed {
        shared.dropped_events.fetch_add(1, Ordering::Relaxed);
    }
}
