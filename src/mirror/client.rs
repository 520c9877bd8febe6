use std::io::Write;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use super::mirror_clock::{DetachedMirrorClock, status_line};
use crate::ws::protocol::{self, ControlAction, SyncMessage};

/// Keys understood by the mirror window.
pub fn parse_key(line: &str) -> Option<MirrorKey> {
    match line.trim() {
        "s" | "start" => Some(MirrorKey::Control(ControlAction::Start)),
        "p" | "stop" | "pause" => Some(MirrorKey::Control(ControlAction::Stop)),
        "r" | "reset" => Some(MirrorKey::Control(ControlAction::Reset)),
        "q" | "quit" | "close" => Some(MirrorKey::Close),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorKey {
    Control(ControlAction),
    Close,
}

fn render(title: &str, clock: &DetachedMirrorClock) {
    if !clock.is_synced() {
        return;
    }
    print!("\r\x1b[2K{}", status_line(title, clock.state()));
    let _ = std::io::stdout().flush();
}

/// Runs a detached view connected to the primary at `url` until either side
/// closes. `input` carries the user's key presses, one per line.
pub async fn run_mirror<R>(url: &str, title: &str, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to primary at {url}"))?;
    info!("Mirror connected to {url}");
    println!("🪞 {title} (s = start, p = stop, r = reset, q = close)");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut clock = DetachedMirrorClock::default();
    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match protocol::decode(&text) {
                    Ok(Some(SyncMessage::StatePush(snapshot))) => {
                        clock.apply(&snapshot);
                        render(title, &clock);
                    }
                    Ok(Some(SyncMessage::Control { .. })) => {
                        debug!("Ignoring control message sent by primary");
                    }
                    Ok(None) => debug!("Ignoring unknown message from primary"),
                    Err(e) => warn!("Failed to parse message from primary: {e}"),
                },
                Some(Ok(Message::Ping(data))) => {
                    ws_sender.send(Message::Pong(data)).await.context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Primary closed the mirror");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Mirror connection error: {e}");
                    break;
                }
            },
            _ = clock.tick() => {
                clock.advance();
                render(title, &clock);
            }
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => match parse_key(&line) {
                    Some(MirrorKey::Control(action)) => {
                        let message = clock.press(action);
                        let text = protocol::encode(&message)?;
                        ws_sender
                            .send(Message::Text(text))
                            .await
                            .context("Failed to send control message")?;
                        render(title, &clock);
                    }
                    Some(MirrorKey::Close) => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                    None => println!("\nUnknown key {:?} (s, p, r, q)", line.trim()),
                },
                Ok(None) => input_open = false,
                Err(e) => {
                    warn!("Failed to read mirror input: {e}");
                    input_open = false;
                }
            },
        }
    }

    clock.stop();
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_controls() {
        assert_eq!(
            parse_key("s\n"),
            Some(MirrorKey::Control(ControlAction::Start))
        );
        assert_eq!(
            parse_key("pause"),
            Some(MirrorKey::Control(ControlAction::Stop))
        );
        assert_eq!(
            parse_key(" r "),
            Some(MirrorKey::Control(ControlAction::Reset))
        );
        assert_eq!(parse_key("q"), Some(MirrorKey::Close));
        assert_eq!(parse_key("skip"), None);
    }
}
