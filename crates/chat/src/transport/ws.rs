// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/ws/chat` connection entry point.
//!
//! Validates the identifiers a chat connection needs before upgrading, then
//! hands the socket to a hub-registered [`Client`] and its two pumps.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::client::{self, Client, ClientIdentity};
use crate::error::ChatError;
use crate::state::ChatState;

/// Query parameters for the chat upgrade.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatQuery {
    pub user_id: Option<String>,
    /// Customer request the chat belongs to; names the room.
    pub request_id: Option<String>,
    pub user_type: Option<String>,
}

impl ChatQuery {
    /// Build the client identity, or name the first missing parameter.
    pub fn into_identity(self) -> Result<ClientIdentity, &'static str> {
        let user_id = non_empty(self.user_id).ok_or("user_id")?;
        let request_id = non_empty(self.request_id).ok_or("request_id")?;
        Ok(ClientIdentity::new(user_id, request_id, self.user_type))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `GET /ws/chat?user_id=..&request_id=..`: WebSocket upgrade for a chat room.
pub async fn ws_chat_handler(
    State(state): State<Arc<ChatState>>,
    Query(query): Query<ChatQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(ws) = ws else {
        return ChatError::UpgradeRequired
            .to_http_response("WebSocket upgrade required")
            .into_response();
    };

    let identity = match query.into_identity() {
        Ok(identity) => identity,
        Err(missing) => {
            warn!(missing, "rejecting chat connection");
            return ChatError::BadRequest
                .to_http_response(format!("missing required parameter: {missing}"))
                .into_response();
        }
    };

    if !state.hub.is_running() {
        return ChatError::HubClosed.to_http_response("chat hub is shutting down").into_response();
    }

    info!(user_id = %identity.user_id, room = %identity.room_id, "new chat connection");
    ws.on_upgrade(move |socket| serve_client(state, identity, socket)).into_response()
}

/// Register the connection with the hub and run its pumps until teardown.
async fn serve_client(state: Arc<ChatState>, identity: ClientIdentity, socket: WebSocket) {
    let (client, mailbox) = Client::new(identity, state.config.mailbox_capacity);
    let hub = state.hub.clone();

    if let Err(e) = hub.register(Arc::clone(&client)).await {
        warn!(client_id = %client.id(), err = %e, "hub unavailable, dropping connection");
        return;
    }

    let timing = state.config.pump_timing();
    let (sink, stream) = socket.split();
    let writer =
        tokio::spawn(client::write_pump(Arc::clone(&client), hub.clone(), sink, mailbox, timing));
    client::read_pump(Arc::clone(&client), hub, stream, timing).await;
    if let Err(e) = writer.await {
        warn!(client_id = %client.id(), err = %e, "write pump failed");
    }

    info!(
        client_id = %client.id(),
        user_id = %client.user_id(),
        room = %client.room_id(),
        "chat connection closed"
    );
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
