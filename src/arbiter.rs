//! Pure arbitration: computes the video stream's next state, given its
//! own and its sibling still stream's current state, and a transition
//! cause (spec "Arbiter"). No side effects, no locks, no logging — a
//! total function over its domain that cannot fail.

use crate::state::StreamVariant;

/// What triggered a video-state transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// `streamon` on the video stream.
    VideoStart,
    /// `streamoff` on the video stream.
    VideoStop,
    /// Video's `dequeue` found nothing done and is about to block;
    /// gives video one more chance to claim DMA if still is idle.
    VideoDqbuf,
    /// `take_picture_start` on the still stream.
    StillStart,
    /// `take_picture_stop`, or a still burst completing on its own.
    StillStop,
}

/// Computes the next video-stream state. Still always wins DMA
/// ownership while it is active (`StreamOn` or `Dma`): `VideoStart`
/// cannot promote video past `StreamOn` if still already holds the
/// pipeline, and `VideoDqbuf` cannot claim DMA unless still is fully
/// `StreamOff`.
#[must_use]
pub fn next_video_state(cur_video: StreamVariant, cur_still: StreamVariant, cause: Cause) -> StreamVariant {
    use StreamVariant::{Dma, StreamOff, StreamOn};

    match cause {
        Cause::VideoStop => StreamOff,

        Cause::VideoStart => {
            if matches!(cur_still, StreamOn | Dma) {
                StreamOn
            } else {
                Dma
            }
        }

        Cause::StillStart => {
            if cur_video == Dma {
                StreamOn
            } else {
                cur_video
            }
        }

        Cause::StillStop => {
            if cur_video == StreamOn {
                Dma
            } else {
                cur_video
            }
        }

        Cause::VideoDqbuf => {
            if cur_video == StreamOn && cur_still == StreamOff {
                Dma
            } else {
                cur_video
            }
        }
    }
}
