//! One websocket per room. The task only moves frames: inbound messages become
//! [`Event::Server`], outbound batches arrive over the [`Transport`] handed to the keeper.

use std::time::Duration;

use anyhow::Context;
use crownkeeper::{unix_ms, ConnId, Event, Transport};
use futures_util::{SinkExt, StreamExt};
use roomproto::{decode_frame, encode_frame, ClientMsg, ServerMsg};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::debug;

const OUTBOUND_QUEUE: usize = 256;
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(20);

#[derive(Clone, Debug)]
pub struct Link {
    pub conn: ConnId,
    pub url: String,
    pub room: String,
    pub token: Option<String>,
}

struct ChannelTransport(mpsc::Sender<Vec<ClientMsg>>);

impl Transport for ChannelTransport {
    fn send(&self, batch: Vec<ClientMsg>) -> bool {
        self.0.try_send(batch).is_ok()
    }
}

/// Runs one connection attempt to completion and always reports `Event::Closed`.
pub async fn run(link: Link, events: mpsc::Sender<Event>) {
    let reason = match session(&link, &events).await {
        Ok(()) => "closed by server".to_string(),
        Err(e) => format!("{e:#}"),
    };
    let _ = events
        .send(Event::Closed {
            conn: link.conn,
            reason,
        })
        .await;
}

async fn session(link: &Link, events: &mpsc::Sender<Event>) -> anyhow::Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(link.url.as_str())
        .await
        .with_context(|| format!("connect {}", link.url))?;
    let (mut sink, mut stream) = ws.split();

    let hello = encode_frame(&[
        ClientMsg::Hi {
            token: link.token.clone(),
        },
        ClientMsg::Ch {
            id: link.room.clone(),
        },
    ])?;
    sink.send(Message::Text(hello)).await?;

    let (out_tx, mut out_rx) = mpsc::channel::<Vec<ClientMsg>>(OUTBOUND_QUEUE);
    events
        .send(Event::Opened {
            conn: link.conn,
            transport: Box::new(ChannelTransport(out_tx)),
        })
        .await
        .map_err(|_| anyhow::anyhow!("event loop stopped"))?;

    let mut keepalive = tokio::time::interval(KEEPALIVE_PERIOD);
    keepalive.tick().await;

    loop {
        tokio::select! {
            m = stream.next() => {
                let Some(m) = m else { break; };
                match m? {
                    Message::Text(s) => {
                        let msgs = match decode_frame(&s) {
                            Ok(msgs) => msgs,
                            Err(e) => {
                                debug!(room = %link.room, err = %e, "dropping frame");
                                continue;
                            }
                        };
                        for msg in msgs {
                            if matches!(msg, ServerMsg::Other) {
                                continue;
                            }
                            events
                                .send(Event::Server { conn: link.conn, msg })
                                .await
                                .map_err(|_| anyhow::anyhow!("event loop stopped"))?;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            batch = out_rx.recv() => {
                // The keeper dropped our transport.
                let Some(batch) = batch else { break; };
                sink.send(Message::Text(encode_frame(&batch)?)).await?;
            }
            _ = keepalive.tick() => {
                let ping = encode_frame(&[ClientMsg::T { e: unix_ms() }])?;
                sink.send(Message::Text(ping)).await?;
            }
        }
    }

    Ok(())
}
