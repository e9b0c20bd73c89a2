// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: in-process servers and assertion helpers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::hub::HubService;
use crate::state::ChatState;

/// Build chat state around a freshly started hub.
pub fn test_state(config: ChatConfig) -> (Arc<ChatState>, HubService) {
    let shutdown = CancellationToken::new();
    let hub = HubService::start(&shutdown);
    let state = Arc::new(ChatState::new(config, hub.handle(), shutdown));
    (state, hub)
}

/// A chat server bound to an ephemeral local port.
pub struct SpawnedServer {
    pub addr: SocketAddr,
    pub state: Arc<ChatState>,
    hub: HubService,
    task: JoinHandle<()>,
}

impl SpawnedServer {
    pub fn ws_url(&self, query: &str) -> String {
        format!("ws://{}/ws/chat?{query}", self.addr)
    }

    /// Stop the hub (closing every chat socket) and the HTTP server.
    pub async fn stop(self) {
        self.state.shutdown.cancel();
        self.hub.stop().await;
        let _ = self.task.await;
    }
}

/// Spawn an HTTP server on a random port for integration testing.
pub async fn spawn_http_server(config: ChatConfig) -> anyhow::Result<SpawnedServer> {
    let (state, hub) = test_state(config);
    let router = crate::transport::build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let shutdown = state.shutdown.clone();
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await;
    });
    Ok(SpawnedServer { addr, state, hub, task })
}

/// Assert that an expression returns `Err` whose message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
