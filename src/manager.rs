//! `StreamManager`: owns both streams' queues and state, and is the
//! single entry point every public operation and `NotifyPath` itself
//! goes through (spec "StreamManager" and "NotifyPath").

use parking_lot::Mutex;

use crate::arbiter::{self, Cause};
use crate::buffer::{BufferDescriptor, Stream};
use crate::collaborators::{CtrlDescriptor, ImageData, SensorCtl};
use crate::config::StreamManagerConfig;
use crate::dma;
use crate::error::{CoreError, ExtControlsError, Result};
use crate::format::{FormatCatalog, FormatEntry, FormatId, FrameIntervalCaps, FrameSizeEntry, PixFormat, StreamParm};
use crate::queue::QueueMode;
use crate::state::{self, StreamState, StreamVariant, WakeCause};

struct StreamCtx {
    state: StreamState,
    catalog: FormatCatalog,
}

impl StreamCtx {
    fn new(stream: Stream, catalog: FormatCatalog, capacity_hint: usize) -> Self {
        Self {
            state: StreamState::new(stream, capacity_hint),
            catalog,
        }
    }
}

/// Aggregate counters surfaced for diagnostics, mirroring the small
/// stats structs the teacher crate returns from its manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerStats {
    pub video_queued: usize,
    pub video_done: usize,
    pub still_queued: usize,
    pub still_done: usize,
}

/// Owns the dual stream state machine over one DMA-capable pipeline.
pub struct StreamManager {
    sensor: Box<dyn SensorCtl>,
    pipeline: Box<dyn ImageData>,
    config: StreamManagerConfig,
    open_lock: Mutex<()>,
    open_count: Mutex<u32>,
    video: StreamCtx,
    still: StreamCtx,
}

impl StreamManager {
    /// Builds the manager, intersecting the sensor's and pipeline's
    /// advertised formats once per stream up front (spec
    /// "FormatCatalogs are built once at init").
    pub fn new(sensor: Box<dyn SensorCtl>, pipeline: Box<dyn ImageData>, config: StreamManagerConfig) -> Result<Self> {
        config.validate().map_err(|issues| CoreError::InvalidArg(issues.join("; ")))?;

        let video_catalog = FormatCatalog::build(sensor.as_ref(), pipeline.as_ref());
        let still_catalog = FormatCatalog::build(sensor.as_ref(), pipeline.as_ref());

        tracing::info!(device_path = %config.device_path, "capture manager constructed");

        Ok(Self {
            video: StreamCtx::new(Stream::Video, video_catalog, config.queue_capacity_hint),
            still: StreamCtx::new(Stream::Still, still_catalog, config.queue_capacity_hint),
            sensor,
            pipeline,
            config,
            open_lock: Mutex::new(()),
            open_count: Mutex::new(0),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StreamManagerConfig {
        &self.config
    }

    fn ctx(&self, stream: Stream) -> &StreamCtx {
        match stream {
            Stream::Video => &self.video,
            Stream::Still => &self.still,
        }
    }

    // ---- lifecycle -----------------------------------------------

    /// Increments the open-reference count, resetting both streams to
    /// `STREAMOFF` on the first open.
    pub fn open(&self) -> Result<()> {
        let _guard = self.open_lock.lock();
        let mut count = self.open_count.lock();
        if *count == 0 {
            self.video.state.set_variant(StreamVariant::StreamOff);
            self.still.state.set_variant(StreamVariant::StreamOff);
        }
        *count += 1;
        tracing::debug!(open_count = *count, "device opened");
        Ok(())
    }

    /// Decrements the open-reference count, cancelling any in-flight
    /// DMA and resetting both streams on the last close. Resolves the
    /// first Open Question: the success path returns `Ok(())` rather
    /// than the source's unconditional error.
    pub fn close(&self) -> Result<()> {
        let _guard = self.open_lock.lock();
        let mut count = self.open_count.lock();
        if *count == 0 {
            return Ok(());
        }
        *count -= 1;
        if *count == 0 {
            self.force_streamoff(Stream::Video);
            self.force_streamoff(Stream::Still);
            tracing::info!("last reference closed, streams reset");
        }
        tracing::debug!(open_count = *count, "device closed");
        Ok(())
    }

    /// Resolves the second Open Question: proceeds only while the
    /// manager is currently open, rather than the source's inverted
    /// early return.
    pub fn uninitialize(&self) -> Result<()> {
        let count = self.open_count.lock();
        if *count == 0 {
            return Err(CoreError::NotPermitted("manager is not initialized".into()));
        }
        drop(count);
        self.force_streamoff(Stream::Video);
        self.force_streamoff(Stream::Still);
        tracing::info!("manager uninitialized");
        Ok(())
    }

    fn force_streamoff(&self, stream: Stream) {
        let ctx = self.ctx(stream);
        ctx.state.with_queue(|q| {
            if ctx.state.variant() == StreamVariant::Dma {
                let _ = self.pipeline.cancel_dma();
                q.cancel_dma_current();
            }
            let _ = q.realloc(0);
        });
        ctx.state.set_variant(StreamVariant::StreamOff);
        ctx.state.set_remaining(state::INFINITE);
    }

    // ---- buffer queue management -----------------------------------

    /// Allocates `count` buffers for `stream` using `mode`'s overflow
    /// policy. Refused while that stream currently owns DMA.
    pub fn request_buffers(&self, stream: Stream, count: usize, mode: QueueMode) -> Result<()> {
        let ctx = self.ctx(stream);
        if ctx.state.variant() == StreamVariant::Dma {
            return Err(CoreError::NotPermitted("cannot reallocate buffers while DMA is in flight".into()));
        }
        ctx.state.with_queue(|q| {
            q.set_mode(mode);
            q.realloc(count)
        })
    }

    /// Validates the buffer's size is non-zero, then queues it. If the
    /// stream is idle and this newly-queued slot lets it start (or
    /// resume) DMA, does so immediately.
    pub fn queue(&self, stream: Stream, mut buf: BufferDescriptor) -> Result<()> {
        if buf.mem.is_empty() {
            return Err(CoreError::InvalidArg("buffer has zero length".into()));
        }
        buf.stream = stream;

        let ctx = self.ctx(stream);
        let variant = ctx.state.variant();

        let slot = ctx.state.with_queue(|q| {
            let slot = q.acquire_free()?;
            q.enqueue(slot, buf);
            Ok::<u32, CoreError>(slot)
        })?;
        tracing::trace!(?stream, slot, "buffer accepted");

        if variant == StreamVariant::Dma {
            return Ok(());
        }

        match stream {
            Stream::Video => {
                if variant == StreamVariant::StreamOn {
                    self.transition_video(Cause::VideoStart)?;
                }
            }
            Stream::Still => {
                if variant == StreamVariant::StreamOn {
                    let reached = self.still.state.with_queue(|sq| {
                        dma::apply(self.sensor.as_ref(), self.pipeline.as_ref(), StreamVariant::StreamOn, StreamVariant::Dma, Stream::Still, sq)
                    })?;
                    self.still.state.set_variant(reached);
                }
            }
        }
        Ok(())
    }

    /// Blocks until a completed buffer is available for `stream`, or
    /// returns `Canceled` if `cancel_dequeue` won the race. Video's
    /// loop re-consults the arbiter (`VideoDqbuf`) before each wait, so
    /// it can claim DMA the instant still goes idle.
    pub fn dequeue(&self, stream: Stream) -> Result<BufferDescriptor> {
        let ctx = self.ctx(stream);
        loop {
            if let Some(desc) = ctx.state.try_take_done() {
                return Ok(desc);
            }

            if stream == Stream::Video {
                self.transition_video(Cause::VideoDqbuf)?;
                // A buffer may have completed synchronously as part of
                // that transition in single-threaded test doubles;
                // re-check before blocking.
                if let Some(desc) = ctx.state.try_take_done() {
                    return Ok(desc);
                }
            }

            // `wait_for_done` re-checks for a completion under the
            // same lock it registers as a waiter under, so a buffer
            // finishing between the check above and this call is
            // never missed.
            let (done_slot, cause) = ctx.state.wait_for_done();
            match cause {
                WakeCause::DmaDone => {
                    if let Some(desc) = done_slot {
                        return Ok(desc);
                    }
                }
                WakeCause::DqCancel => return Err(CoreError::Canceled),
                WakeCause::StillStop => continue,
            }
        }
    }

    /// Wakes a blocked `dequeue` on `stream` with `Canceled`, if one is
    /// waiting. A no-op otherwise. Races against a concurrent
    /// `DmaDone` post by design: whichever reaches the rendezvous last
    /// is what the waiter observes.
    pub fn cancel_dequeue(&self, stream: Stream) -> Result<()> {
        let state = &self.ctx(stream).state;
        if state.has_waiter() {
            state.post(None, WakeCause::DqCancel);
        }
        Ok(())
    }

    // ---- streaming lifecycle --------------------------------------

    pub fn streamon(&self, stream: Stream) -> Result<()> {
        if stream != Stream::Video {
            return Err(CoreError::InvalidArg("streamon only applies to the video stream".into()));
        }
        if self.video.state.variant() != StreamVariant::StreamOff {
            return Err(CoreError::NotPermitted("video stream is already on".into()));
        }
        tracing::info!("video streamon");
        self.transition_video(Cause::VideoStart)
    }

    pub fn streamoff(&self, stream: Stream) -> Result<()> {
        if stream != Stream::Video {
            return Err(CoreError::InvalidArg("streamoff only applies to the video stream".into()));
        }
        tracing::info!("video streamoff");
        self.transition_video(Cause::VideoStop)?;
        self.video.state.with_queue(|q| q.cancel_dma_current());
        Ok(())
    }

    /// Starts a still burst of `count` captures (or unbounded if
    /// `count <= 0`), first consulting the arbiter to see whether video
    /// must yield DMA.
    pub fn take_picture_start(&self, count: i64) -> Result<()> {
        if self.still.state.variant() != StreamVariant::StreamOff {
            return Err(CoreError::NotPermitted("still capture is already in progress".into()));
        }
        let remaining = if count <= 0 { state::INFINITE } else { count };
        self.still.state.set_remaining(remaining);

        self.transition_video(Cause::StillStart)?;

        let reached = self.still.state.with_queue(|sq| {
            dma::apply(
                self.sensor.as_ref(),
                self.pipeline.as_ref(),
                StreamVariant::StreamOff,
                StreamVariant::Dma,
                Stream::Still,
                sq,
            )
        })?;
        self.still.state.set_variant(reached);
        tracing::info!(remaining, reached = ?reached, "take_picture_start");
        Ok(())
    }

    /// Stops an in-progress still burst, cancelling DMA if one is
    /// active, and lets video resume DMA if it was waiting.
    pub fn take_picture_stop(&self, halfpush: bool) -> Result<()> {
        let never_started =
            self.still.state.variant() == StreamVariant::StreamOff && self.still.state.remaining() == state::INFINITE;
        if never_started {
            return Err(CoreError::NotPermitted("take_picture_stop: still capture was never started".into()));
        }

        if self.still.state.variant() == StreamVariant::Dma {
            let _ = self.pipeline.cancel_dma();
            self.still.state.with_queue(|sq| sq.cancel_dma_current());
        }
        self.still.state.set_variant(StreamVariant::StreamOff);
        self.still.state.set_remaining(state::INFINITE);

        self.transition_video(Cause::StillStop)?;
        self.sensor.do_halfpush(halfpush)?;
        tracing::info!("take_picture_stop");
        Ok(())
    }

    fn transition_video(&self, cause: Cause) -> Result<()> {
        let cur_video = self.video.state.variant();
        let cur_still = self.still.state.variant();
        let next = arbiter::next_video_state(cur_video, cur_still, cause);
        if next == cur_video {
            return Ok(());
        }
        let reached = self
            .video
            .state
            .with_queue(|q| dma::apply(self.sensor.as_ref(), self.pipeline.as_ref(), cur_video, next, Stream::Video, q))?;
        self.video.state.set_variant(reached);
        tracing::info!(cause = ?cause, from = ?cur_video, to = ?reached, "video transition");
        Ok(())
    }

    // ---- interrupt-context notification path -----------------------

    /// Invoked by the image pipeline on every DMA completion. Cannot
    /// fail outward: an unrecognized buffer-type or an already-idle
    /// stream is logged and dropped rather than propagated (spec
    /// "NotifyPath").
    pub fn notify_dma_done(&self, bytes_used: usize, error: bool) {
        let stream = match self.sensor.get_buftype() {
            Some(s) => s,
            None => {
                tracing::debug!("notify: unknown buffer-type reported, dropping completion");
                return;
            }
        };
        let ctx = self.ctx(stream);

        // Marks the slot done and, if a `dequeue` is already waiting,
        // pops and posts it atomically under the same lock — closing
        // the gap a separate queue-lock/rendezvous-lock pair would
        // leave between "completed" and "waiter notified".
        let Some(_slot) = ctx.state.complete_dma(bytes_used, error) else {
            tracing::debug!(?stream, "notify: no dma-current slot, dropping completion");
            return;
        };

        if ctx.state.remaining() > 0 {
            ctx.state.decrement_remaining();
        }

        if ctx.state.remaining() == 0 {
            let _ = self.pipeline.cancel_dma();
            ctx.state.set_variant(StreamVariant::StreamOff);
            ctx.state.set_remaining(state::INFINITE);

            if stream == Stream::Still {
                let video_state = &self.video.state;
                if video_state.has_waiter() {
                    video_state.post(None, WakeCause::StillStop);
                }
            }
        } else {
            let next = ctx
                .state
                .with_queue(|q| dma::set_next_for_still_or_video(self.sensor.as_ref(), self.pipeline.as_ref(), stream, q))
                .unwrap_or(StreamVariant::StreamOn);
            ctx.state.set_variant(next);
        }
    }

    // ---- format negotiation pass-through ----------------------------

    pub fn enum_fmt(&self, stream: Stream, index: u32) -> Result<FormatEntry> {
        self.ctx(stream).catalog.get(index)
    }

    pub fn enum_framesizes(&self, stream: Stream, format: FormatId) -> Result<Vec<FrameSizeEntry>> {
        self.ctx(stream)
            .catalog
            .enum_frame_sizes(self.sensor.as_ref(), self.pipeline.as_ref(), format)
    }

    /// Enumerates `format`'s frame intervals at `width`x`height` (spec
    /// §6: interval is pass-through, unlike frame sizes which the
    /// catalog intersects with the pipeline).
    pub fn enum_frameintervals(&self, format: FormatId, width: u32, height: u32, index: u32) -> Result<FrameIntervalCaps> {
        self.sensor
            .get_range_of_frameinterval(format, width, height, index)
            .ok_or_else(|| CoreError::InvalidArg("frame interval index out of range".into()))
    }

    pub fn try_fmt(&self, format: PixFormat) -> Result<PixFormat> {
        if !self.pipeline.try_format(format.width, format.height) {
            return Err(CoreError::NotSupported("pipeline rejected frame size".into()));
        }
        self.sensor.try_format(format)
    }

    pub fn s_fmt(&self, stream: Stream, format: PixFormat) -> Result<PixFormat> {
        if self.ctx(stream).state.variant() == StreamVariant::Dma {
            return Err(CoreError::NotPermitted("cannot set format while DMA is in flight".into()));
        }
        if !self.pipeline.try_format(format.width, format.height) {
            return Err(CoreError::NotSupported("pipeline rejected frame size".into()));
        }
        self.sensor.set_format(format)
    }

    pub fn g_fmt(&self) -> Result<PixFormat> {
        self.sensor.get_format()
    }

    pub fn s_parm(&self, parm: StreamParm) -> Result<()> {
        self.sensor.set_frameinterval(parm.numerator, parm.denominator)
    }

    pub fn do_halfpush(&self, enable: bool) -> Result<()> {
        self.sensor.do_halfpush(enable)
    }

    // ---- control pass-through, with the legacy truncation rule ------

    const LEGACY_UNSUPPORTED: [crate::collaborators::CtrlType; 4] = [
        crate::collaborators::CtrlType::Integer64,
        crate::collaborators::CtrlType::U8,
        crate::collaborators::CtrlType::U16,
        crate::collaborators::CtrlType::U32,
    ];

    fn reject_legacy_unsupported(desc: &CtrlDescriptor) -> Result<()> {
        if Self::LEGACY_UNSUPPORTED.contains(&desc.ctrl_type) {
            return Err(CoreError::InvalidArg(
                "legacy control access does not support this control type".into(),
            ));
        }
        Ok(())
    }

    pub fn queryctrl(&self, id: u32) -> Result<CtrlDescriptor> {
        let desc = self.sensor.query_ext_ctrl(id)?;
        Self::reject_legacy_unsupported(&desc)?;
        Ok(desc)
    }

    pub fn g_ctrl(&self, id: u32) -> Result<i64> {
        let desc = self.sensor.query_ext_ctrl(id)?;
        Self::reject_legacy_unsupported(&desc)?;
        let values = self.sensor.g_ext_ctrls(&[id])?;
        values
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::InvalidArg("unknown control id".into()))
    }

    pub fn s_ctrl(&self, id: u32, value: i64) -> Result<()> {
        let desc = self.sensor.query_ext_ctrl(id)?;
        Self::reject_legacy_unsupported(&desc)?;
        self.sensor.s_ext_ctrls(&[(id, value)]).map_err(|e| e.cause)
    }

    pub fn query_ext_ctrl(&self, id: u32) -> Result<CtrlDescriptor> {
        self.sensor.query_ext_ctrl(id)
    }

    pub fn querymenu(&self, id: u32, index: u32) -> Result<String> {
        self.sensor.query_menu(id, index)
    }

    pub fn g_ext_ctrls(&self, ids: &[u32]) -> Result<Vec<i64>> {
        self.sensor.g_ext_ctrls(ids)
    }

    pub fn s_ext_ctrls(&self, values: &[(u32, i64)]) -> std::result::Result<(), ExtControlsError> {
        self.sensor.s_ext_ctrls(values)
    }

    pub fn query_ext_ctrl_scene(&self, id: u32) -> Result<CtrlDescriptor> {
        self.sensor.query_ext_ctrl_scene(id)
    }

    pub fn querymenu_scene(&self, id: u32, index: u32) -> Result<String> {
        self.sensor.query_menu_scene(id, index)
    }

    pub fn g_ext_ctrls_scene(&self, ids: &[u32]) -> Result<Vec<i64>> {
        self.sensor.g_ext_ctrls_scene(ids)
    }

    pub fn s_ext_ctrls_scene(&self, values: &[(u32, i64)]) -> std::result::Result<(), ExtControlsError> {
        self.sensor.s_ext_ctrls_scene(values)
    }

    // ---- diagnostics -------------------------------------------------

    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        let (video_queued, video_done) = self.video.state.with_queue(|q| (q.queued_count(), q.done_count()));
        let (still_queued, still_done) = self.still.state.with_queue(|q| (q.queued_count(), q.done_count()));
        ManagerStats {
            video_queued,
            video_done,
            still_queued,
            still_done,
        }
    }

    #[must_use]
    pub fn video_state(&self) -> StreamVariant {
        self.video.state.variant()
    }

    #[must_use]
    pub fn still_state(&self) -> StreamVariant {
        self.still.state.variant()
    }
}
