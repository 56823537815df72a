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

//! Request/response RPC over a message broker.
//!
//! A `Server` owns a queue named after the service. Callers publish requests to it carrying an
//! `X-Method` header, a correlation id and a reply-to queue; the server runs the matching
//! handler on its own task and publishes one reply, tagged with a `statusCode` header, back to
//! the reply-to queue.

pub use form::{Arg, Form, FormError};
pub use registry::{Handler, HandlerError, HandlerResult, MethodRegistry, RegistryError};
pub use request::Request;
pub use response::{Response, ResponseError};
pub use server::{Server, ServerError, ServerState};

pub use porthos_common::{ServerOptions, ShutdownPolicy, StatusCode};

mod form;
mod registry;
mod request;
mod response;
mod server;
