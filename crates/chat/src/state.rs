// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::hub::HubHandle;

/// Shared server state handed to every handler.
pub struct ChatState {
    pub config: ChatConfig,
    pub hub: HubHandle,
    pub shutdown: CancellationToken,
}

impl ChatState {
    pub fn new(config: ChatConfig, hub: HubHandle, shutdown: CancellationToken) -> Self {
        Self { config, hub, shutdown }
    }
}
