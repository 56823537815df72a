// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options recognized by an RPC server at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// If true, deliveries are settled by the broker as soon as they are handed to the server.
    /// Otherwise the server acknowledges each one after its reply has been published.
    pub auto_ack: bool,
    /// Upper bound on concurrently running handlers. `None` means unbounded.
    pub max_in_flight: Option<usize>,
    /// What `close` does with handlers that are still running.
    pub shutdown: ShutdownPolicy,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            auto_ack: false,
            max_in_flight: None,
            shutdown: ShutdownPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Wait for in-flight handlers to reply, for at most `timeout_ms`, then abort the rest.
    Drain { timeout_ms: u64 },
    /// Abort in-flight handlers immediately; their callers get no reply.
    Abandon,
}

impl ShutdownPolicy {
    pub fn drain(timeout: Duration) -> Self {
        ShutdownPolicy::Drain {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicy::Drain { timeout_ms: 5000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_config() {
        let options: ServerOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ServerOptions::default());
        assert!(!options.auto_ack);
        assert_eq!(options.max_in_flight, None);
        assert_eq!(options.shutdown, ShutdownPolicy::Drain { timeout_ms: 5000 });
    }

    #[test]
    fn test_partial_config() {
        let options: ServerOptions = serde_json::from_str(
            r#"{"auto_ack": true, "max_in_flight": 8, "shutdown": {"mode": "abandon"}}"#,
        )
        .unwrap();
        assert_eq!(
            options,
            ServerOptions {
                auto_ack: true,
                max_in_flight: Some(8),
                shutdown: ShutdownPolicy::Abandon,
            }
        );
    }

    #[test]
    fn test_drain_from_duration() {
        assert_eq!(
            ShutdownPolicy::drain(Duration::from_secs(2)),
            ShutdownPolicy::Drain { timeout_ms: 2000 }
        );
    }
}
