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

use crate::HeaderValue;
use bytes::Bytes;
use serde_json::json;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// The status of a reply. Values follow the HTTP convention (200 success, 404 unknown method,
/// 500 fault) but nothing on the wire enforces that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Read a status back out of a `statusCode` header.
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        value
            .as_int()
            .and_then(|code| u16::try_from(code).ok())
            .map(StatusCode)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<StatusCode> for HeaderValue {
    fn from(status: StatusCode) -> Self {
        HeaderValue::Int(i64::from(status.0))
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failures the server answers on the handler's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("missing {} header", crate::METHOD_HEADER)]
    MissingMethod,
    #[error("{} header is not a string", crate::METHOD_HEADER)]
    InvalidMethod,
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("{0}")]
    HandlerFailed(String),
    #[error("handler panicked")]
    HandlerPanicked,
    #[error("handler did not write a response")]
    NoResponse,
}

impl Fault {
    pub fn status(&self) -> StatusCode {
        match self {
            Fault::MissingMethod | Fault::InvalidMethod | Fault::MethodNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Fault::HandlerFailed(_) | Fault::HandlerPanicked | Fault::NoResponse => {
                StatusCode::INTERNAL_ERROR
            }
        }
    }

    /// The JSON reply body: `{"error": "<message>"}`.
    pub fn body(&self) -> Bytes {
        Bytes::from(json!({ "error": self.to_string() }).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(Fault::MissingMethod, 404, r#"{"error":"missing X-Method header"}"#; "missing method")]
    #[test_case(Fault::InvalidMethod, 404, r#"{"error":"X-Method header is not a string"}"#; "non-string method")]
    #[test_case(Fault::MethodNotFound("nope".into()), 404, r#"{"error":"method not found: nope"}"#; "unknown method")]
    #[test_case(Fault::HandlerFailed("bad input".into()), 500, r#"{"error":"bad input"}"#; "handler error")]
    #[test_case(Fault::HandlerPanicked, 500, r#"{"error":"handler panicked"}"#; "panic")]
    #[test_case(Fault::NoResponse, 500, r#"{"error":"handler did not write a response"}"#; "no response")]
    fn test_fault_table(fault: Fault, status: u16, body: &str) {
        assert_eq!(fault.status().as_u16(), status);
        assert_eq!(std::str::from_utf8(&fault.body()).unwrap(), body);
    }

    #[test]
    fn test_status_header_round_trip() {
        let header = HeaderValue::from(StatusCode::NOT_FOUND);
        assert_eq!(header, HeaderValue::Int(404));
        assert_eq!(StatusCode::from_header(&header), Some(StatusCode::NOT_FOUND));
        assert_eq!(StatusCode::from_header(&HeaderValue::Int(-1)), None);
        assert_eq!(StatusCode::from_header(&HeaderValue::from("200")), None);
    }

    #[test]
    fn test_success_range() {
        assert!(StatusCode::OK.is_success());
        assert!(StatusCode::new(204).is_success());
        assert!(!StatusCode::NOT_FOUND.is_success());
        assert!(!StatusCode::INTERNAL_ERROR.is_success());
    }
}
