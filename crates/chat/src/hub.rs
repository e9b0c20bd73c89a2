// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room registry and broadcast loop.
//!
//! One task owns every structural change to the room map. Callers talk to it
//! through [`HubHandle`]: register, unregister and broadcast requests share a
//! single ordered queue, so a client's last messages always reach the room
//! before its leave. Readers outside the loop (stats, presence lookups) copy
//! what they need under a shared lock and never hold it across an await.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientId, Delivery};
use crate::error::ChatError;
use crate::message::{ChatMessage, Payload};

/// Depth of the hub command queue.
const COMMAND_QUEUE: usize = 256;

type Room = HashMap<ClientId, Arc<Client>>;
type Rooms = HashMap<String, Room>;

/// A payload addressed to one room.
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub room_id: String,
    pub payload: Payload,
}

enum HubCommand {
    Register(Arc<Client>),
    Unregister(Arc<Client>),
    Broadcast(BroadcastRequest),
}

/// A room member as reported by presence lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presence {
    pub user_id: String,
    pub user_type: String,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub rooms: usize,
    pub clients: usize,
}

/// Cloneable front door to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    rooms: Arc<RwLock<Rooms>>,
    cancel: CancellationToken,
}

impl HubHandle {
    /// Join `client` to its room. The hub sends the newcomer a presence
    /// snapshot of existing members, then announces it to the room.
    pub async fn register(&self, client: Arc<Client>) -> Result<(), ChatError> {
        if self.cancel.is_cancelled() {
            return Err(ChatError::HubClosed);
        }
        self.send(HubCommand::Register(client)).await
    }

    /// Remove `client` from its room. A no-op if it is already gone.
    pub async fn unregister(&self, client: Arc<Client>) -> Result<(), ChatError> {
        self.send(HubCommand::Unregister(client)).await
    }

    /// Queue `payload` for every member of `room_id`.
    pub async fn broadcast(
        &self,
        room_id: impl Into<String>,
        payload: Payload,
    ) -> Result<(), ChatError> {
        let req = BroadcastRequest { room_id: room_id.into(), payload };
        self.send(HubCommand::Broadcast(req)).await
    }

    async fn send(&self, command: HubCommand) -> Result<(), ChatError> {
        self.tx.send(command).await.map_err(|_| ChatError::HubClosed)
    }

    /// Current members of a room, or `None` if the room does not exist.
    pub fn members(&self, room_id: &str) -> Option<Vec<Presence>> {
        let rooms = self.rooms.read();
        rooms.get(room_id).map(|room| {
            room.values()
                .map(|c| Presence {
                    user_id: c.user_id().to_owned(),
                    user_type: c.user_type().to_owned(),
                })
                .collect()
        })
    }

    pub fn stats(&self) -> HubStats {
        let rooms = self.rooms.read();
        HubStats { rooms: rooms.len(), clients: rooms.values().map(HashMap::len).sum() }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

/// Owns the hub task. Dropping it without [`HubService::stop`] leaves the
/// loop running until its parent token is cancelled.
pub struct HubService {
    handle: HubHandle,
    task: JoinHandle<()>,
}

impl HubService {
    /// Spawn the event loop. It stops when `shutdown` (or [`Self::stop`])
    /// cancels.
    pub fn start(shutdown: &CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let rooms = Arc::new(RwLock::new(Rooms::new()));
        let cancel = shutdown.child_token();

        let event_loop = EventLoop { rooms: Arc::clone(&rooms), rx, cancel: cancel.clone() };
        let task = tokio::spawn(event_loop.run());

        let handle = HubHandle { tx, rooms, cancel };
        Self { handle, task }
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Stop the loop, close every member's mailbox and wait for the task.
    pub async fn stop(self) {
        self.handle.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(err = %e, "chat hub task failed");
        }
    }
}

struct EventLoop {
    rooms: Arc<RwLock<Rooms>>,
    rx: mpsc::Receiver<HubCommand>,
    cancel: CancellationToken,
}

impl EventLoop {
    async fn run(mut self) {
        info!("chat hub running");
        loop {
            let command = tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            match command {
                HubCommand::Register(client) => self.on_register(client),
                HubCommand::Unregister(client) => self.on_unregister(&client),
                HubCommand::Broadcast(req) => self.dispatch(&req.room_id, &req.payload),
            }
        }
        self.close_all();
    }

    fn on_register(&self, client: Arc<Client>) {
        let (others, members) = {
            let mut rooms = self.rooms.write();
            let room = rooms.entry(client.room_id().to_owned()).or_default();
            let others: Vec<Arc<Client>> = room.values().cloned().collect();
            room.insert(client.id(), Arc::clone(&client));
            (others, room.len())
        };

        info!(
            client_id = %client.id(),
            user_id = %client.user_id(),
            user_type = %client.user_type(),
            room = %client.room_id(),
            members,
            "client registered"
        );

        // Presence snapshot goes to the newcomer only. An overflow here is
        // acted on after the join, so the room never sees an unpaired leave.
        let snapshot_delivered = others.iter().all(|other| {
            encode(&ChatMessage::join(other.identity()))
                .is_none_or(|payload| self.try_deliver(&client, payload))
        });

        if let Some(payload) = encode(&ChatMessage::join(client.identity())) {
            self.dispatch(client.room_id(), &payload);
        }

        if !snapshot_delivered {
            self.on_unregister(&client);
        }
    }

    fn on_unregister(&self, client: &Arc<Client>) {
        if !self.remove_member(client) {
            debug!(client_id = %client.id(), "client already unregistered");
            return;
        }
        client.shutdown();

        info!(
            client_id = %client.id(),
            user_id = %client.user_id(),
            user_type = %client.user_type(),
            room = %client.room_id(),
            "client unregistered"
        );

        if let Some(payload) = encode(&ChatMessage::leave(client.identity())) {
            self.dispatch(client.room_id(), &payload);
        }
    }

    /// Remove `client` from its room, dropping the room once empty.
    fn remove_member(&self, client: &Client) -> bool {
        let mut rooms = self.rooms.write();
        let Some(room) = rooms.get_mut(client.room_id()) else {
            return false;
        };
        if room.remove(&client.id()).is_none() {
            return false;
        }
        if room.is_empty() {
            rooms.remove(client.room_id());
            debug!(room = %client.room_id(), "room closed");
        }
        true
    }

    /// Fan `payload` out to every member of `room_id`. Members whose mailbox
    /// cannot take it are unregistered.
    fn dispatch(&self, room_id: &str, payload: &Payload) {
        let members: Vec<Arc<Client>> = {
            let rooms = self.rooms.read();
            rooms.get(room_id).map(|room| room.values().cloned().collect()).unwrap_or_default()
        };
        debug!(room = %room_id, clients = members.len(), "broadcasting");

        let dropped: Vec<&Arc<Client>> =
            members.iter().filter(|member| !self.try_deliver(member, payload.clone())).collect();
        for member in dropped {
            self.on_unregister(member);
        }
    }

    fn try_deliver(&self, client: &Client, payload: Payload) -> bool {
        match client.deliver(payload) {
            Delivery::Queued => true,
            Delivery::Full => {
                warn!(
                    client_id = %client.id(),
                    user_id = %client.user_id(),
                    room = %client.room_id(),
                    "mailbox full, dropping client"
                );
                false
            }
            Delivery::Closed => {
                debug!(client_id = %client.id(), "mailbox closed, dropping client");
                false
            }
        }
    }

    fn close_all(&mut self) {
        let rooms = std::mem::take(&mut *self.rooms.write());
        let mut closed = 0usize;
        for client in rooms.into_values().flat_map(HashMap::into_values) {
            client.shutdown();
            closed += 1;
        }

        // Registrations accepted but never processed.
        self.rx.close();
        while let Ok(command) = self.rx.try_recv() {
            if let HubCommand::Register(client) = command {
                client.shutdown();
                closed += 1;
            }
        }

        info!(clients = closed, "chat hub stopped");
    }
}

fn encode(msg: &ChatMessage) -> Option<Payload> {
    match msg.encode() {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(
                room = %msg.room_id,
                kind = msg.kind.as_str(),
                err = %e,
                "failed to encode chat event, skipping"
            );
            None
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
