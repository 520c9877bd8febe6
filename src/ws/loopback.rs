//! In-process surface host. The far end of every link is handed to the
//! caller as a [`LoopbackSurface`], which stands in for a mirror window.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use super::mirror_channel::{
    MirrorError, MirrorLink, MirrorNotice, MirrorOptions, SurfaceHost, SurfaceLiveness,
};
use super::protocol::{ControlAction, SyncMessage};

#[derive(Clone)]
enum Capability {
    Available(mpsc::UnboundedSender<LoopbackSurface>),
    Unsupported,
    Denied,
}

#[derive(Clone)]
pub struct LoopbackHost {
    capability: Capability,
    delay: Option<Duration>,
}

impl LoopbackHost {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoopbackSurface>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                capability: Capability::Available(tx),
                delay: None,
            },
            rx,
        )
    }

    /// Like [`LoopbackHost::new`], but every link is handed over only after
    /// `delay`, as a slow window would.
    pub fn delayed(delay: Duration) -> (Self, mpsc::UnboundedReceiver<LoopbackSurface>) {
        let (mut host, surfaces) = Self::new();
        host.delay = Some(delay);
        (host, surfaces)
    }

    pub fn unsupported() -> Self {
        Self {
            capability: Capability::Unsupported,
            delay: None,
        }
    }

    pub fn denying() -> Self {
        Self {
            capability: Capability::Denied,
            delay: None,
        }
    }

    fn create(&self, options: &MirrorOptions) -> Result<MirrorLink, MirrorError> {
        let surfaces = match &self.capability {
            Capability::Available(surfaces) => surfaces,
            Capability::Unsupported => {
                return Err(MirrorError::UnsupportedSurface(
                    "loopback host has no surfaces".to_string(),
                ));
            }
            Capability::Denied => {
                return Err(MirrorError::SurfaceCreationDenied(format!(
                    "{} was refused",
                    options.title
                )));
            }
        };

        let (outbound, messages) = mpsc::unbounded_channel();
        let (notices, inbound) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let surface = LoopbackSurface {
            title: options.title.clone(),
            messages,
            notices,
            open: Arc::clone(&open),
        };
        surfaces.send(surface).map_err(|_| {
            MirrorError::SurfaceCreationDenied("nobody is watching loopback surfaces".to_string())
        })?;

        Ok(MirrorLink {
            outbound,
            inbound,
            surface: Box::new(LoopbackLiveness { open }),
        })
    }
}

impl SurfaceHost for LoopbackHost {
    fn open(
        &mut self,
        options: &MirrorOptions,
    ) -> impl Future<Output = Result<MirrorLink, MirrorError>> + Send {
        let result = self.create(options);
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                time::sleep(delay).await;
            }
            result
        }
    }
}

struct LoopbackLiveness {
    open: Arc<AtomicBool>,
}

impl SurfaceLiveness for LoopbackLiveness {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// The mirror-side end of a loopback link.
pub struct LoopbackSurface {
    pub title: String,
    messages: mpsc::UnboundedReceiver<SyncMessage>,
    notices: mpsc::UnboundedSender<MirrorNotice>,
    open: Arc<AtomicBool>,
}

impl LoopbackSurface {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Next message already delivered by the primary, without waiting.
    pub fn next_message(&mut self) -> Option<SyncMessage> {
        self.messages.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<SyncMessage> {
        self.messages.recv().await
    }

    pub fn drain(&mut self) -> Vec<SyncMessage> {
        std::iter::from_fn(|| self.next_message()).collect()
    }

    pub fn press(&self, action: ControlAction) {
        let _ = self.notices.send(MirrorNotice::Control(action));
    }

    /// Closed by the user, with a notice.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.notices.send(MirrorNotice::Closed);
    }

    /// Closed from outside, without any notice.
    pub fn vanish(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
