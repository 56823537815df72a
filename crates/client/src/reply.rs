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

use crate::ClientError;
use bytes::Bytes;
use porthos_common::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The answer to one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// The `error` message of a fault reply, if the body has one.
    pub fn error_message(&self) -> Option<String> {
        let body: Value = serde_json::from_slice(&self.body).ok()?;
        body.get("error")?.as_str().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sum {
        original: f64,
        sum: f64,
    }

    #[test]
    fn test_decode_success() {
        let reply = Reply {
            status: StatusCode::OK,
            body: Bytes::from_static(br#"{"original":10.0,"sum":11.0}"#),
        };
        assert!(reply.is_success());
        assert_eq!(
            reply.json::<Sum>().unwrap(),
            Sum {
                original: 10.0,
                sum: 11.0
            }
        );
        assert_eq!(reply.error_message(), None);
    }

    #[test]
    fn test_fault_reply() {
        let reply = Reply {
            status: StatusCode::NOT_FOUND,
            body: Bytes::from_static(br#"{"error":"method not found: nope"}"#),
        };
        assert!(!reply.is_success());
        assert_eq!(
            reply.error_message().as_deref(),
            Some("method not found: nope")
        );
        assert!(matches!(reply.json::<Sum>(), Err(ClientError::Decode(_))));
    }
}
