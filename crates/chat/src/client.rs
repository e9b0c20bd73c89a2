// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection chat client and its read/write pumps.
//!
//! A [`Client`] is created once the upgrade request has been validated and
//! lives in exactly one room. The hub owns delivery into its mailbox; the
//! connection owns the two pumps that move frames between the mailbox, the
//! hub and the socket. Either pump ending tears the client down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hub::HubHandle;
use crate::message::{decode_inbound, ChatMessage, Payload};

/// Sender type used when the connection does not name one.
pub const DEFAULT_USER_TYPE: &str = "user";

/// Unique per-connection identifier.
pub type ClientId = Uuid;

/// Who is connected, and to which room. Fixed for the client's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_id: String,
    /// Sender tag such as `customer` or `shop`.
    pub user_type: String,
    /// Service-request identifier naming the room.
    pub room_id: String,
}

impl ClientIdentity {
    pub fn new(
        user_id: impl Into<String>,
        room_id: impl Into<String>,
        user_type: Option<String>,
    ) -> Self {
        let user_type = user_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_TYPE.to_owned());
        Self { user_id: user_id.into(), user_type, room_id: room_id.into() }
    }
}

/// Outcome of a non-blocking mailbox delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Full,
    Closed,
}

/// A live connection as seen by the hub.
pub struct Client {
    id: ClientId,
    identity: ClientIdentity,
    mailbox: Mutex<Option<mpsc::Sender<Payload>>>,
    cancel: CancellationToken,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Client {
    /// Create a client and the receiving end of its mailbox.
    pub fn new(identity: ClientIdentity, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let client = Arc::new(Self {
            id: Uuid::new_v4(),
            identity,
            mailbox: Mutex::new(Some(tx)),
            cancel: CancellationToken::new(),
        });
        (client, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn room_id(&self) -> &str {
        &self.identity.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn user_type(&self) -> &str {
        &self.identity.user_type
    }

    /// Try to queue a payload without waiting.
    pub fn deliver(&self, payload: Payload) -> Delivery {
        let guard = self.mailbox.lock();
        let Some(tx) = guard.as_ref() else {
            return Delivery::Closed;
        };
        match tx.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Close the mailbox and cancel the read pump. Idempotent.
    ///
    /// Payloads already queued are still drained by the write pump before
    /// it sends the close frame.
    pub fn shutdown(&self) {
        self.mailbox.lock().take();
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the client has been shut down.
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

/// Keepalive and write timing for the pumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpTiming {
    /// Read deadline, refreshed by every pong.
    pub pong_wait: Duration,
    /// Ping interval; must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Upper bound for a single frame write.
    pub write_wait: Duration,
}

impl Default for PumpTiming {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self { pong_wait, ping_period: pong_wait * 9 / 10, write_wait: Duration::from_secs(10) }
    }
}

/// Read frames from the peer and broadcast them to the client's room.
///
/// Returns when the peer closes, the transport errors, the pong deadline
/// passes, or the client is shut down by the hub. Always unregisters the
/// client on the way out.
pub async fn read_pump<S, E>(client: Arc<Client>, hub: HubHandle, mut stream: S, timing: PumpTiming)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let deadline = tokio::time::sleep(timing.pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = client.closed() => break,
            _ = &mut deadline => {
                debug!(client_id = %client.id, user_id = %client.user_id(), "pong wait expired");
                break;
            }
            frame = stream.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!(client_id = %client.id, err = %e, "read failed");
                        break;
                    }
                    None => break,
                };
                let forwarded = match frame {
                    Message::Text(text) => forward(&client, &hub, text.as_str()).await,
                    Message::Binary(data) => {
                        forward(&client, &hub, &String::from_utf8_lossy(&data)).await
                    }
                    Message::Pong(_) => {
                        deadline.as_mut().reset(Instant::now() + timing.pong_wait);
                        true
                    }
                    Message::Ping(_) => true,
                    Message::Close(_) => false,
                };
                if !forwarded {
                    break;
                }
            }
        }
    }

    teardown(&client, &hub).await;
}

/// Decode one inbound frame and hand it to the hub. Returns false once the
/// hub is gone.
async fn forward(client: &Client, hub: &HubHandle, frame: &str) -> bool {
    let text = decode_inbound(frame);
    let payload = match ChatMessage::text(&client.identity, text).encode() {
        Ok(p) => p,
        Err(e) => {
            warn!(client_id = %client.id, err = %e, "failed to encode chat message, dropping");
            return true;
        }
    };
    debug!(room = %client.room_id(), user_id = %client.user_id(), "message received");
    hub.broadcast(client.room_id(), payload).await.is_ok()
}

/// Drain the mailbox to the peer, interleaved with keepalive pings.
///
/// Sends a close frame once the hub closes the mailbox. A failed or timed
/// out write unregisters the client.
pub async fn write_pump<S>(
    client: Arc<Client>,
    hub: HubHandle,
    mut sink: S,
    mut mailbox: mpsc::Receiver<Payload>,
    timing: PumpTiming,
) where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let mut ticker =
        tokio::time::interval_at(Instant::now() + timing.ping_period, timing.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let failed = loop {
        tokio::select! {
            payload = mailbox.recv() => match payload {
                Some(payload) => {
                    if let Err(e) = write_frame(&mut sink, Message::Text(payload), timing.write_wait).await {
                        debug!(client_id = %client.id, err = %e, "write failed");
                        break true;
                    }
                }
                None => {
                    let _ = write_frame(&mut sink, Message::Close(None), timing.write_wait).await;
                    break false;
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = write_frame(&mut sink, Message::Ping(Bytes::new()), timing.write_wait).await {
                    debug!(client_id = %client.id, err = %e, "ping failed");
                    break true;
                }
            }
        }
    };

    if failed {
        teardown(&client, &hub).await;
    }
}

async fn write_frame<S>(sink: &mut S, frame: Message, wait: Duration) -> anyhow::Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    match tokio::time::timeout(wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => anyhow::bail!("{e}"),
        Err(_) => anyhow::bail!("write timed out after {wait:?}"),
    }
}

/// Unregister through the hub, or shut down locally if the hub has stopped.
async fn teardown(client: &Arc<Client>, hub: &HubHandle) {
    if hub.unregister(Arc::clone(client)).await.is_err() {
        client.shutdown();
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
