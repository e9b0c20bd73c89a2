// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Smallest accepted pong wait. The ping period is derived from it and must
/// stay non-zero.
const MIN_PONG_WAIT_MS: u64 = 10;

/// Real-time chat hub for customer/shop service requests.
#[derive(Debug, Clone, Parser)]
#[command(name = "recycle-chat", version, about)]
pub struct ChatConfig {
    /// Host address to bind to.
    #[arg(long, default_value = "0.0.0.0", env = "RECYCLE_CHAT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "RECYCLE_CHAT_PORT")]
    pub port: u16,

    /// Outbound mailbox capacity per connection. A client whose mailbox is
    /// full when a broadcast arrives is disconnected.
    #[arg(long, default_value_t = 256, env = "RECYCLE_CHAT_MAILBOX_CAPACITY")]
    pub mailbox_capacity: usize,

    /// Time allowed between pongs before a connection is considered dead.
    #[arg(long, default_value_t = 60_000, env = "RECYCLE_CHAT_PONG_WAIT_MS")]
    pub pong_wait_ms: u64,

    /// Time allowed for a single frame write.
    #[arg(long, default_value_t = 10_000, env = "RECYCLE_CHAT_WRITE_WAIT_MS")]
    pub write_wait_ms: u64,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "RECYCLE_CHAT_LOG_FORMAT")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RECYCLE_CHAT_LOG_LEVEL")]
    pub log_level: String,
}

impl ChatConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mailbox_capacity == 0 {
            anyhow::bail!("--mailbox-capacity must be at least 1");
        }
        if self.pong_wait_ms < MIN_PONG_WAIT_MS {
            anyhow::bail!("--pong-wait-ms must be at least {MIN_PONG_WAIT_MS}");
        }
        if self.write_wait_ms == 0 {
            anyhow::bail!("--write-wait-ms must be positive");
        }
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Ping interval, kept below the pong wait so a ping always goes out
    /// before the peer's deadline can expire.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn pump_timing(&self) -> crate::client::PumpTiming {
        crate::client::PumpTiming {
            pong_wait: self.pong_wait(),
            ping_period: self.ping_period(),
            write_wait: self.write_wait(),
        }
    }

    /// Config for tests: ephemeral port, quiet logging, default timings.
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 0,
            mailbox_capacity: 256,
            pong_wait_ms: 60_000,
            write_wait_ms: 10_000,
            log_format: "text".to_owned(),
            log_level: "warn".to_owned(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
