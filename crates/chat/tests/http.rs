// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the chat HTTP API.
//!
//! Uses `axum_test::TestServer`, no real TCP needed.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use tokio::sync::mpsc;

use recycle_chat::client::{Client, ClientIdentity};
use recycle_chat::config::ChatConfig;
use recycle_chat::message::Payload;
use recycle_chat::state::ChatState;
use recycle_chat::test_support::test_state;
use recycle_chat::transport::build_router;

fn test_server(state: Arc<ChatState>) -> anyhow::Result<TestServer> {
    TestServer::new(build_router(state))
}

type Member = (Arc<Client>, mpsc::Receiver<Payload>);

/// Register a member directly with the hub and wait until it is visible.
/// The mailbox must stay alive or the hub drops the member on first delivery.
async fn join(state: &ChatState, user: &str, room: &str, kind: &str) -> anyhow::Result<Member> {
    let identity = ClientIdentity::new(user.to_owned(), room.to_owned(), Some(kind.to_owned()));
    let (client, mailbox) = Client::new(identity, 8);
    state.hub.register(Arc::clone(&client)).await?;
    wait_for(|| {
        state.hub.members(room).is_some_and(|m| m.iter().any(|p| p.user_id == user))
    })
    .await?;
    Ok((client, mailbox))
}

async fn wait_for(cond: impl Fn() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("condition not reached");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

#[tokio::test]
async fn health_reports_empty_hub() -> anyhow::Result<()> {
    let (state, hub) = test_state(ChatConfig::test());
    let server = test_server(state)?;

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["rooms"], 0);
    assert_eq!(body["clients"], 0);

    hub.stop().await;
    Ok(())
}

#[tokio::test]
async fn health_counts_rooms_and_clients() -> anyhow::Result<()> {
    let (state, hub) = test_state(ChatConfig::test());
    let server = test_server(Arc::clone(&state))?;

    let _a = join(&state, "cust-1", "req-1", "customer").await?;
    let _b = join(&state, "shop-1", "req-1", "shop").await?;
    let _c = join(&state, "cust-2", "req-2", "customer").await?;

    let body: serde_json::Value = server.get("/api/v1/health").await.json();
    assert_eq!(body["rooms"], 2);
    assert_eq!(body["clients"], 3);

    hub.stop().await;
    Ok(())
}

#[tokio::test]
async fn health_reports_stopping_after_shutdown() -> anyhow::Result<()> {
    let (state, hub) = test_state(ChatConfig::test());
    let server = test_server(state)?;

    hub.stop().await;

    let body: serde_json::Value = server.get("/api/v1/health").await.json();
    assert_eq!(body["status"], "stopping");
    Ok(())
}

#[tokio::test]
async fn room_members_lists_presence() -> anyhow::Result<()> {
    let (state, hub) = test_state(ChatConfig::test());
    let server = test_server(Arc::clone(&state))?;

    let _a = join(&state, "cust-1", "req-1", "customer").await?;
    let _b = join(&state, "shop-1", "req-1", "shop").await?;

    let resp = server.get("/api/v1/rooms/req-1").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["request_id"], "req-1");

    let mut members: Vec<(String, String)> = body["members"]
        .as_array()
        .map(|list| {
            list.iter()
                .map(|m| {
                    (
                        m["user_id"].as_str().unwrap_or_default().to_owned(),
                        m["user_type"].as_str().unwrap_or_default().to_owned(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    members.sort();
    assert_eq!(
        members,
        vec![("cust-1".to_owned(), "customer".to_owned()), ("shop-1".to_owned(), "shop".to_owned())]
    );

    hub.stop().await;
    Ok(())
}

#[tokio::test]
async fn unknown_room_is_not_found() -> anyhow::Result<()> {
    let (state, hub) = test_state(ChatConfig::test());
    let server = test_server(state)?;

    let resp = server.get("/api/v1/rooms/nope").await;
    resp.assert_status_not_found();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "ROOM_NOT_FOUND");

    hub.stop().await;
    Ok(())
}

#[tokio::test]
async fn room_disappears_when_last_member_leaves() -> anyhow::Result<()> {
    let (state, hub) = test_state(ChatConfig::test());
    let server = test_server(Arc::clone(&state))?;

    let (client, _mailbox) = join(&state, "cust-1", "req-9", "customer").await?;
    server.get("/api/v1/rooms/req-9").await.assert_status_ok();

    state.hub.unregister(client).await?;
    wait_for(|| state.hub.members("req-9").is_none()).await?;
    server.get("/api/v1/rooms/req-9").await.assert_status_not_found();

    hub.stop().await;
    Ok(())
}

#[tokio::test]
async fn chat_endpoint_requires_upgrade() -> anyhow::Result<()> {
    let (state, hub) = test_state(ChatConfig::test());
    let server = test_server(state)?;

    let resp = server
        .get("/ws/chat")
        .add_query_param("user_id", "u1")
        .add_query_param("request_id", "r1")
        .await;
    resp.assert_status(axum::http::StatusCode::UPGRADE_REQUIRED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UPGRADE_REQUIRED");

    hub.stop().await;
    Ok(())
}
