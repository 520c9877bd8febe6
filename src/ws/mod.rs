pub mod loopback;
pub mod mirror_channel;
pub mod protocol;
pub mod websocket_server;

pub use mirror_channel::{
    LIVENESS_POLL, MirrorError, MirrorHandle, MirrorLink, MirrorNotice, MirrorOptions,
    MirrorSyncChannel, SurfaceHost, SurfaceLiveness,
};
pub use protocol::{ControlAction, StateSnapshot, SyncMessage};
pub use websocket_server::{TerminalSurfaceHost, accept_mirror};
