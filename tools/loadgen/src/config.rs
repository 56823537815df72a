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

use porthos_common::ServerOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Service (and queue) name.
    pub service: String,
    /// Total number of calls to make.
    pub requests: usize,
    /// Calls kept outstanding at once.
    pub concurrency: usize,
    #[serde(with = "human_duration")]
    pub call_timeout: Duration,
    pub server: ServerOptions,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            service: "LoadService".to_string(),
            requests: 1000,
            concurrency: 32,
            call_timeout: Duration::from_secs(5),
            server: ServerOptions::default(),
        }
    }
}

/// Durations as humantime strings ("250ms", "5s") in config files.
mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}
