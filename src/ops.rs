//! ioctl-style command dispatch surface (spec §6's operation table).
//!
//! This is a thin convenience layer over [`StreamManager`]'s typed
//! methods for callers that want to route on a single command code the
//! way the original device-file operation table does. The typed
//! methods remain the primary API; `dispatch` exists so a
//! character-device-style front end has a single switch point.

use crate::buffer::{BufferDescriptor, Stream};
use crate::collaborators::CtrlDescriptor;
use crate::error::{CoreError, ExtControlsError, Result};
use crate::format::{FormatEntry, FormatId, FrameIntervalCaps, FrameSizeEntry, PixFormat, StreamParm};
use crate::manager::StreamManager;
use crate::queue::QueueMode;

/// One command from spec §6's operation surface table.
#[derive(Debug, Clone)]
pub enum Command {
    Open,
    Close,
    Uninitialize,
    ReqBufs { stream: Stream, count: usize, mode: QueueMode },
    QBuf { stream: Stream, buf: BufferDescriptor },
    DQBuf { stream: Stream },
    CancelDQBuf { stream: Stream },
    StreamOn,
    StreamOff,
    TakePictureStart { count: i64 },
    TakePictureStop { halfpush: bool },
    EnumFmt { stream: Stream, index: u32 },
    EnumFrameSizes { stream: Stream, format: FormatId },
    EnumFrameIntervals { format: FormatId, width: u32, height: u32, index: u32 },
    TryFmt { format: PixFormat },
    SFmt { stream: Stream, format: PixFormat },
    GFmt,
    SParm(StreamParm),
    DoHalfpush { enable: bool },
    QueryCtrl { id: u32 },
    GCtrl { id: u32 },
    SCtrl { id: u32, value: i64 },
    QueryExtCtrl { id: u32 },
    QueryMenu { id: u32, index: u32 },
    GExtCtrls { ids: Vec<u32> },
    SExtCtrls { values: Vec<(u32, i64)> },
    QueryExtCtrlScene { id: u32 },
    QueryMenuScene { id: u32, index: u32 },
    GExtCtrlsScene { ids: Vec<u32> },
    SExtCtrlsScene { values: Vec<(u32, i64)> },
}

/// The outcome of a [`Command`], shaped per-variant the way the
/// corresponding typed method returns it.
#[derive(Debug, Clone)]
pub enum Response {
    Unit,
    Buffer(BufferDescriptor),
    Format(FormatEntry),
    FrameSizes(Vec<FrameSizeEntry>),
    FrameInterval(FrameIntervalCaps),
    PixFormat(PixFormat),
    CtrlDescriptor(CtrlDescriptor),
    CtrlValue(i64),
    CtrlValues(Vec<i64>),
    MenuEntry(String),
}

/// Routes `cmd` to the matching [`StreamManager`] method.
pub fn dispatch(manager: &StreamManager, cmd: Command) -> std::result::Result<Response, DispatchError> {
    use Response::{Buffer, CtrlDescriptor as CtrlDesc, CtrlValue, CtrlValues, Format, FrameInterval, FrameSizes, MenuEntry, PixFormat as PixFmt, Unit};

    let ok = |r: Result<()>| r.map(|()| Unit).map_err(DispatchError::Core);

    match cmd {
        Command::Open => ok(manager.open()),
        Command::Close => ok(manager.close()),
        Command::Uninitialize => ok(manager.uninitialize()),
        Command::ReqBufs { stream, count, mode } => ok(manager.request_buffers(stream, count, mode)),
        Command::QBuf { stream, buf } => ok(manager.queue(stream, buf)),
        Command::DQBuf { stream } => manager.dequeue(stream).map(Buffer).map_err(DispatchError::Core),
        Command::CancelDQBuf { stream } => ok(manager.cancel_dequeue(stream)),
        Command::StreamOn => ok(manager.streamon(Stream::Video)),
        Command::StreamOff => ok(manager.streamoff(Stream::Video)),
        Command::TakePictureStart { count } => ok(manager.take_picture_start(count)),
        Command::TakePictureStop { halfpush } => ok(manager.take_picture_stop(halfpush)),
        Command::EnumFmt { stream, index } => manager.enum_fmt(stream, index).map(Format).map_err(DispatchError::Core),
        Command::EnumFrameSizes { stream, format } => {
            manager.enum_framesizes(stream, format).map(FrameSizes).map_err(DispatchError::Core)
        }
        Command::EnumFrameIntervals { format, width, height, index } => manager
            .enum_frameintervals(format, width, height, index)
            .map(FrameInterval)
            .map_err(DispatchError::Core),
        Command::TryFmt { format } => manager.try_fmt(format).map(PixFmt).map_err(DispatchError::Core),
        Command::SFmt { stream, format } => manager.s_fmt(stream, format).map(PixFmt).map_err(DispatchError::Core),
        Command::GFmt => manager.g_fmt().map(PixFmt).map_err(DispatchError::Core),
        Command::SParm(parm) => ok(manager.s_parm(parm)),
        Command::DoHalfpush { enable } => ok(manager.do_halfpush(enable)),
        Command::QueryCtrl { id } => manager.queryctrl(id).map(CtrlDesc).map_err(DispatchError::Core),
        Command::GCtrl { id } => manager.g_ctrl(id).map(CtrlValue).map_err(DispatchError::Core),
        Command::SCtrl { id, value } => ok(manager.s_ctrl(id, value)),
        Command::QueryExtCtrl { id } => manager.query_ext_ctrl(id).map(CtrlDesc).map_err(DispatchError::Core),
        Command::QueryMenu { id, index } => manager.querymenu(id, index).map(MenuEntry).map_err(DispatchError::Core),
        Command::GExtCtrls { ids } => manager.g_ext_ctrls(&ids).map(CtrlValues).map_err(DispatchError::Core),
        Command::SExtCtrls { values } => manager.s_ext_ctrls(&values).map(|()| Unit).map_err(DispatchError::ExtControls),
        Command::QueryExtCtrlScene { id } => manager.query_ext_ctrl_scene(id).map(CtrlDesc).map_err(DispatchError::Core),
        Command::QueryMenuScene { id, index } => {
            manager.querymenu_scene(id, index).map(MenuEntry).map_err(DispatchError::Core)
        }
        Command::GExtCtrlsScene { ids } => manager.g_ext_ctrls_scene(&ids).map(CtrlValues).map_err(DispatchError::Core),
        Command::SExtCtrlsScene { values } => {
            manager.s_ext_ctrls_scene(&values).map(|()| Unit).map_err(DispatchError::ExtControls)
        }
    }
}

/// Error from [`dispatch`]: either a plain [`CoreError`], or the
/// indexed-failure shape `S_EXT_CTRLS`/`S_EXT_CTRLS_SCENE` use.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    ExtControls(#[from] ExtControlsError),
}
