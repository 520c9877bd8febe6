use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use super::protocol::{ControlAction, SyncMessage};

/// Fallback cadence for noticing a mirror that vanished without saying so.
pub const LIVENESS_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("detached views are not available here: {0}")]
    UnsupportedSurface(String),
    #[error("the detached view could not be created: {0}")]
    SurfaceCreationDenied(String),
}

#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub title: String,
    pub connect_timeout: Duration,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            title: "tick_it".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// What a mirror can tell the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorNotice {
    Control(ControlAction),
    Closed,
}

/// Liveness probe for the surface behind a link.
pub trait SurfaceLiveness: Send {
    fn is_open(&self) -> bool;
    fn close(&mut self);
}

/// A freshly created mirror surface, as handed over by a [`SurfaceHost`].
pub struct MirrorLink {
    pub outbound: mpsc::UnboundedSender<SyncMessage>,
    pub inbound: mpsc::UnboundedReceiver<MirrorNotice>,
    pub surface: Box<dyn SurfaceLiveness>,
}

/// Something able to create detached views. Hosts are cloned into the task
/// that opens a surface, so the caller's loop keeps running meanwhile.
pub trait SurfaceHost: Clone + Send + 'static {
    fn open(
        &mut self,
        options: &MirrorOptions,
    ) -> impl Future<Output = Result<MirrorLink, MirrorError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MirrorHandle(u64);

struct ActiveMirror {
    handle: MirrorHandle,
    link: MirrorLink,
}

/// The primary's side of the mirror protocol. Owns the one live mirror, if
/// any; once a mirror is seen closed it is dropped and never written to again.
#[derive(Default)]
pub struct MirrorSyncChannel {
    active: Option<ActiveMirror>,
    next_handle: u64,
}

impl MirrorSyncChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn handle(&self) -> Option<MirrorHandle> {
        self.active.as_ref().map(|active| active.handle)
    }

    /// Opens a mirror through `host`, or returns the live one.
    pub async fn open<H: SurfaceHost>(
        &mut self,
        host: &mut H,
        options: &MirrorOptions,
    ) -> Result<MirrorHandle, MirrorError> {
        if let Some(handle) = self.live_handle() {
            debug!("Mirror {handle:?} already open");
            return Ok(handle);
        }
        let link = host.open(options).await?;
        Ok(self.install(link))
    }

    /// Adopts a link created elsewhere. Any mirror still held is closed first.
    pub fn install(&mut self, link: MirrorLink) -> MirrorHandle {
        self.teardown();
        self.next_handle += 1;
        let handle = MirrorHandle(self.next_handle);
        info!("Mirror {handle:?} opened");
        self.active = Some(ActiveMirror { handle, link });
        handle
    }

    /// Best-effort delivery. Returns whether the message went out; a closed
    /// mirror is torn down here instead of surfacing an error.
    pub fn send(&mut self, handle: MirrorHandle, message: &SyncMessage) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if active.handle != handle {
            debug!("Dropping message for stale mirror {handle:?}");
            return false;
        }
        if active.link.surface.is_open() && active.link.outbound.send(*message).is_ok() {
            return true;
        }
        warn!("Mirror {handle:?} went away while sending");
        self.teardown();
        false
    }

    /// Checks the surface directly, for mirrors closed without a notice.
    /// Returns `true` when this call found it closed.
    pub fn poll_liveness(&mut self) -> bool {
        let closed = self
            .active
            .as_ref()
            .is_some_and(|active| !active.link.surface.is_open());
        if closed {
            info!("Mirror closed (liveness poll)");
            self.teardown();
        }
        closed
    }

    /// Next notice from the mirror. Pending while no mirror is open. A
    /// `Closed` notice has already torn the mirror down.
    pub async fn recv(&mut self) -> MirrorNotice {
        let Some(active) = self.active.as_mut() else {
            return std::future::pending().await;
        };
        match active.link.inbound.recv().await {
            Some(MirrorNotice::Control(action)) => MirrorNotice::Control(action),
            Some(MirrorNotice::Closed) | None => {
                info!("Mirror closed (notice)");
                self.teardown();
                MirrorNotice::Closed
            }
        }
    }

    /// Closes the mirror from the primary side.
    pub fn close(&mut self) {
        if self.active.is_some() {
            info!("Closing mirror");
            self.teardown();
        }
    }

    fn live_handle(&mut self) -> Option<MirrorHandle> {
        self.poll_liveness();
        self.handle()
    }

    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.link.surface.close();
        }
    }
}

impl Drop for MirrorSyncChannel {
    fn drop(&mut self) {
        self.teardown();
    }
}
