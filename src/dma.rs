//! Starts, chains, and cancels DMA against the image pipeline (spec
//! "DMAController"). Called from both user-context operations
//! (`StreamManager`) and `NotifyPath`'s interrupt-context chaining
//! step, so this is a pair of free functions rather than an object
//! that would need to be shared across that boundary.

use crate::buffer::Stream;
use crate::collaborators::{ImageData, SensorCtl};
use crate::error::Result;
use crate::queue::FrameBufferQueue;
use crate::state::StreamVariant;

/// Applies a `cur -> next` transition for `stream`'s DMA ownership.
/// Returns the state actually reached: `next`, or `StreamOn` if `next`
/// was `Dma` but no slot was available to start.
pub fn apply(
    sensor: &dyn SensorCtl,
    pipeline: &dyn ImageData,
    cur: StreamVariant,
    next: StreamVariant,
    stream: Stream,
    queue: &mut FrameBufferQueue,
) -> Result<StreamVariant> {
    if cur != StreamVariant::Dma && next == StreamVariant::Dma {
        return start(sensor, pipeline, stream, queue);
    }
    if cur == StreamVariant::Dma && next != StreamVariant::Dma {
        // Best-effort: the hardware may still deliver one more
        // completion, with the error flag set, which NotifyPath
        // handles the same way as any other completion.
        let _ = pipeline.cancel_dma();
        tracing::debug!(?stream, "dma canceled");
        return Ok(next);
    }
    Ok(next)
}

fn start(
    sensor: &dyn SensorCtl,
    pipeline: &dyn ImageData,
    stream: Stream,
    queue: &mut FrameBufferQueue,
) -> Result<StreamVariant> {
    let Some(slot) = queue.pop_for_dma() else {
        tracing::trace!(?stream, "no queued buffer available, staying at STREAMON");
        return Ok(StreamVariant::StreamOn);
    };
    let desc = *queue.dma_current().expect("pop_for_dma just set dma_current");
    sensor.set_buftype(stream)?;
    let format = sensor.get_format()?;
    pipeline.start_dma(format, desc.mem.as_ptr(), desc.mem.len())?;
    tracing::info!(?stream, slot, "dma started");
    Ok(StreamVariant::Dma)
}

/// Chains the next queued buffer before the current completion is
/// reported to the caller. Demotes to `StreamOn` if nothing is queued
/// (and `Ring`-mode recycling in the queue itself found nothing
/// either).
pub fn set_next_for_still_or_video(
    sensor: &dyn SensorCtl,
    pipeline: &dyn ImageData,
    stream: Stream,
    queue: &mut FrameBufferQueue,
) -> Result<StreamVariant> {
    match queue.pop_for_dma() {
        Some(slot) => {
            let desc = *queue.dma_current().expect("pop_for_dma just set dma_current");
            sensor.set_buftype(stream)?;
            let format = sensor.get_format()?;
            pipeline.start_dma(format, desc.mem.as_ptr(), desc.mem.len())?;
            tracing::trace!(?stream, slot, "dma chained to next buffer");
            Ok(StreamVariant::Dma)
        }
        None => {
            let _ = pipeline.cancel_dma();
            Ok(StreamVariant::StreamOn)
        }
    }
}
