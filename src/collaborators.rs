//! Capability records the core is built against (spec "External
//! interfaces"): the sensor control surface and the image-data (DMA)
//! pipeline. Modeled as traits rather than a concrete dependency so
//! the manager stays agnostic of the underlying hardware binding
//! (Design Note "Dynamic dispatch").

use crate::buffer::Stream;
use crate::error::{ExtControlsError, Result};
use crate::format::{FormatId, FrameIntervalCaps, FrameSizeCaps, PixFormat};

/// One entry in the sensor's advertised-format enumeration.
#[derive(Debug, Clone)]
pub struct SensorFormatEntry {
    pub format: FormatId,
    pub flags: u32,
    pub description: String,
}

/// A control's shape, as reported by `QUERY_EXT_CTRL` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlType {
    Integer,
    Boolean,
    Menu,
    Integer64,
    U8,
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlDescriptor {
    pub id: u32,
    pub ctrl_type: CtrlType,
    pub min: i64,
    pub max: i64,
    pub step: i64,
    pub default: i64,
}

/// Capability surface the sensor driver exposes. The core calls this
/// only through `&dyn SensorCtl`; it never assumes a concrete
/// implementation.
pub trait SensorCtl: Send + Sync {
    /// The `index`-th advertised format, or `None` past the last one
    /// (the terminal sentinel `ENUM_FMT` relies on).
    fn enum_format(&self, index: u32) -> Option<SensorFormatEntry>;

    fn frame_size_caps(&self, format: FormatId) -> Option<FrameSizeCaps>;

    /// The `index`-th frame-interval capability at `format`/`width`/
    /// `height`, or `None` past the last one. Unlike frame sizes, this
    /// is a direct pass-through of the sensor's answer — the pipeline
    /// is never consulted.
    fn get_range_of_frameinterval(&self, format: FormatId, width: u32, height: u32, index: u32) -> Option<FrameIntervalCaps>;

    fn set_buftype(&self, stream: Stream) -> Result<()>;
    fn get_buftype(&self) -> Option<Stream>;

    fn get_format(&self) -> Result<PixFormat>;
    fn set_format(&self, format: PixFormat) -> Result<PixFormat>;
    fn try_format(&self, format: PixFormat) -> Result<PixFormat>;

    fn set_frameinterval(&self, numerator: u32, denominator: u32) -> Result<()>;
    fn do_halfpush(&self, enable: bool) -> Result<()>;

    fn query_ext_ctrl(&self, id: u32) -> Result<CtrlDescriptor>;
    fn query_menu(&self, id: u32, index: u32) -> Result<String>;
    fn g_ext_ctrls(&self, ids: &[u32]) -> Result<Vec<i64>>;
    fn s_ext_ctrls(&self, values: &[(u32, i64)]) -> std::result::Result<(), ExtControlsError>;

    fn query_ext_ctrl_scene(&self, id: u32) -> Result<CtrlDescriptor>;
    fn query_menu_scene(&self, id: u32, index: u32) -> Result<String>;
    fn g_ext_ctrls_scene(&self, ids: &[u32]) -> Result<Vec<i64>>;
    fn s_ext_ctrls_scene(&self, values: &[(u32, i64)]) -> std::result::Result<(), ExtControlsError>;
}

/// Capability surface the image (DMA) pipeline exposes.
pub trait ImageData: Send + Sync {
    /// Whether the pipeline accepts this pixel/sub-pixel format pair.
    fn accepts_format(&self, format: FormatId) -> bool;

    fn frame_size_caps(&self) -> FrameSizeCaps;

    /// Whether the pipeline can drive DMA at this exact frame size.
    fn try_format(&self, width: u32, height: u32) -> bool;

    /// Starts DMA into `ptr..ptr+len`, tagged with the negotiated
    /// format. The core never dereferences `ptr`; it is the caller's
    /// buffer, handed through unchanged.
    fn start_dma(&self, format: PixFormat, ptr: *mut u8, len: usize) -> Result<()>;

    /// Best-effort cancel of any in-flight DMA. May or may not produce
    /// a subsequent completion callback; both outcomes are handled by
    /// `NotifyPath`/the manager.
    fn cancel_dma(&self) -> Result<()>;
}
