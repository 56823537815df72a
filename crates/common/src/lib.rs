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

//! The vocabulary shared between the broker, the RPC server and the RPC client: message
//! properties and headers, status codes, the standard fault replies, and server options.

pub use message::{HeaderValue, Headers, InvalidExpiration, Properties, Publishing};
pub use options::{ServerOptions, ShutdownPolicy};
pub use status::{Fault, StatusCode};

mod message;
mod options;
mod status;
pub mod tracing;

/// Request header naming the remote method to invoke.
pub const METHOD_HEADER: &str = "X-Method";

/// Response header carrying the status code of the reply.
pub const STATUS_HEADER: &str = "statusCode";

/// Content type of every request and response body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The nameless direct exchange. A message published to it is routed to the queue whose name
/// equals the routing key.
pub const DEFAULT_EXCHANGE: &str = "";
