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

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

/// A single application header value, as carried in a message's header table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Display for HeaderValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderValue::Bool(b) => write!(f, "{b}"),
            HeaderValue::Int(i) => write!(f, "{i}"),
            HeaderValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

/// Application headers, ordered by name so that messages print deterministically.
pub type Headers = BTreeMap<String, HeaderValue>;

/// The expiration property did not hold a non-negative number of milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid expiration {0:?}: expected a non-negative number of milliseconds")]
pub struct InvalidExpiration(pub String);

/// Basic message properties. Everything but the headers is optional, as on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    /// Time-to-live of the message while it sits in a queue, in milliseconds, as a decimal
    /// string.
    pub expiration: Option<String>,
    pub headers: Headers,
}

impl Properties {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_expiration(mut self, ttl: Duration) -> Self {
        self.expiration = Some(ttl.as_millis().to_string());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// The parsed expiration, if one was set.
    pub fn ttl(&self) -> Result<Option<Duration>, InvalidExpiration> {
        self.expiration.as_deref().map(parse_expiration).transpose()
    }
}

fn parse_expiration(expiration: &str) -> Result<Duration, InvalidExpiration> {
    expiration
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| InvalidExpiration(expiration.to_string()))
}

/// A message ready to be handed to a broker: properties plus an opaque body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publishing {
    pub properties: Properties,
    pub body: Bytes,
}

impl Publishing {
    pub fn new(properties: Properties, body: impl Into<Bytes>) -> Self {
        Self {
            properties,
            body: body.into(),
        }
    }
}
