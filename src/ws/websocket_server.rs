use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::mirror_channel::{
    MirrorError, MirrorLink, MirrorNotice, MirrorOptions, SurfaceHost, SurfaceLiveness,
};
use super::protocol::{self, SyncMessage};

/// Opens mirrors as `tick_it mirror` processes that dial back over a local
/// WebSocket. `launcher` is the command prefix that gives the mirror its
/// own window (for example `kitty -e`); an empty launcher runs the mirror
/// directly, and no launcher at all means this host cannot detach views.
#[derive(Debug, Clone)]
pub struct TerminalSurfaceHost {
    launcher: Option<Vec<String>>,
    program: PathBuf,
    bind: SocketAddr,
}

impl TerminalSurfaceHost {
    pub fn new(launcher: Option<Vec<String>>, program: PathBuf, bind: SocketAddr) -> Self {
        Self {
            launcher,
            program,
            bind,
        }
    }

    fn command(&self, launcher: &[String], url: &str, title: &str) -> Command {
        let mut argv: Vec<String> = launcher.to_vec();
        argv.push(self.program.display().to_string());
        argv.extend(
            ["mirror", "--connect", url, "--title", title]
                .iter()
                .map(|arg| arg.to_string()),
        );
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command
    }
}

impl SurfaceHost for TerminalSurfaceHost {
    fn open(
        &mut self,
        options: &MirrorOptions,
    ) -> impl Future<Output = Result<MirrorLink, MirrorError>> + Send {
        let host = self.clone();
        let options = options.clone();
        async move {
            let Some(launcher) = host.launcher.clone() else {
                return Err(MirrorError::UnsupportedSurface(
                    "no terminal launcher configured (set TICK_IT_TERMINAL)".to_string(),
                ));
            };

            let listener = TcpListener::bind(host.bind).await.map_err(|e| {
                MirrorError::SurfaceCreationDenied(format!("cannot listen on {}: {e}", host.bind))
            })?;
            let addr = listener
                .local_addr()
                .map_err(|e| MirrorError::SurfaceCreationDenied(e.to_string()))?;
            let url = format!("ws://{addr}");

            let mut command = host.command(&launcher, &url, &options.title);
            command.kill_on_drop(true);
            let process = match command.spawn() {
                Ok(child) => {
                    debug!("Mirror launcher started (pid {:?})", child.id());
                    child
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(MirrorError::UnsupportedSurface(format!(
                        "launcher not found: {e}"
                    )));
                }
                Err(e) => {
                    return Err(MirrorError::SurfaceCreationDenied(format!(
                        "launcher failed: {e}"
                    )));
                }
            };

            info!("Waiting for mirror on {url}");
            let link = accept_mirror(&listener, options.connect_timeout).await?;
            Ok(MirrorLink {
                surface: Box::new(LaunchedSurface {
                    socket: link.surface,
                    _process: process,
                }),
                ..link
            })
        }
    }
}

/// Accepts one mirror connection on `listener` and starts pumping messages.
/// `timeout` bounds the TCP accept and the WebSocket handshake together.
pub async fn accept_mirror(
    listener: &TcpListener,
    timeout: Duration,
) -> Result<MirrorLink, MirrorError> {
    let connect = async {
        let (stream, peer_addr) = listener
            .accept()
            .await
            .map_err(|e| MirrorError::SurfaceCreationDenied(e.to_string()))?;
        info!("New mirror connection from: {peer_addr}");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| {
                MirrorError::SurfaceCreationDenied(format!(
                    "WebSocket handshake failed with {peer_addr}: {e}"
                ))
            })?;
        info!("WebSocket handshake completed with {peer_addr}");
        Ok::<_, MirrorError>((ws_stream, peer_addr))
    };

    let (ws_stream, peer_addr) = time::timeout(timeout, connect).await.map_err(|_| {
        MirrorError::SurfaceCreationDenied(format!(
            "mirror did not connect within {}s",
            timeout.as_secs_f32()
        ))
    })??;

    Ok(spawn_link(ws_stream, peer_addr))
}

/// A link whose mirror runs in a launched process. The process is killed
/// when the link is dropped.
struct LaunchedSurface {
    socket: Box<dyn SurfaceLiveness>,
    _process: Child,
}

impl SurfaceLiveness for LaunchedSurface {
    fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    fn close(&mut self) {
        self.socket.close();
    }
}

struct WebSocketLiveness {
    open: Arc<AtomicBool>,
}

impl SurfaceLiveness for WebSocketLiveness {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

fn spawn_link<S>(ws_stream: WebSocketStream<S>, peer_addr: SocketAddr) -> MirrorLink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let (notice_tx, inbound) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));

    tokio::spawn(handle_connection(
        ws_stream,
        peer_addr,
        outbound_rx,
        notice_tx,
        Arc::clone(&open),
    ));

    MirrorLink {
        outbound,
        inbound,
        surface: Box::new(WebSocketLiveness { open }),
    }
}

async fn handle_connection<S>(
    ws_stream: WebSocketStream<S>,
    peer_addr: SocketAddr,
    mut outbound_rx: mpsc::UnboundedReceiver<SyncMessage>,
    notice_tx: mpsc::UnboundedSender<MirrorNotice>,
    open: Arc<AtomicBool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => match outgoing {
                Some(message) => {
                    let text = match protocol::encode(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode message for {peer_addr}: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(Message::Text(text)).await {
                        warn!("Failed to send to mirror {peer_addr}: {e}");
                        break;
                    }
                }
                None => {
                    // The primary dropped its end: close the mirror politely.
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match protocol::decode(&text) {
                    Ok(Some(SyncMessage::Control { action })) => {
                        debug!("[WebSocket] Control from {peer_addr}: {action:?}");
                        if notice_tx.send(MirrorNotice::Control(action)).is_err() {
                            break;
                        }
                    }
                    Ok(Some(SyncMessage::StatePush(_))) => {
                        debug!("Ignoring state push sent by mirror {peer_addr}");
                    }
                    Ok(None) => debug!("Ignoring unknown message from {peer_addr}"),
                    Err(e) => warn!("Failed to parse message from {peer_addr}: {e}"),
                },
                Some(Ok(Message::Close(_))) => {
                    info!("WebSocket connection closed by {peer_addr}");
                    break;
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {e}");
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error from {peer_addr}: {e}");
                    break;
                }
                None => break,
            },
        }
    }

    open.store(false, Ordering::SeqCst);
    let _ = notice_tx.send(MirrorNotice::Closed);
    info!("WebSocket connection with {peer_addr} terminated");
}
