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
use porthos_common::StatusCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    #[error("response already written with status {0}")]
    AlreadyWritten(StatusCode),
    #[error("could not serialize response payload: {0}")]
    Serialize(String),
}

/// The reply a handler fills in. It can be written once; the server publishes whatever was
/// written after the handler returns it.
#[derive(Debug, Default)]
pub struct Response {
    written: Option<(StatusCode, Bytes)>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `payload` as the reply body with the given status.
    pub fn json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        payload: &T,
    ) -> Result<(), ResponseError> {
        self.check_unwritten()?;
        let body =
            serde_json::to_vec(payload).map_err(|e| ResponseError::Serialize(e.to_string()))?;
        self.written = Some((status, Bytes::from(body)));
        Ok(())
    }

    /// Use an already-encoded JSON body as-is.
    pub fn raw(
        &mut self,
        status: StatusCode,
        body: impl Into<Bytes>,
    ) -> Result<(), ResponseError> {
        self.check_unwritten()?;
        self.written = Some((status, body.into()));
        Ok(())
    }

    /// A reply with an empty object body.
    pub fn empty(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.raw(status, Bytes::from_static(b"{}"))
    }

    fn check_unwritten(&self) -> Result<(), ResponseError> {
        match &self.written {
            Some((status, _)) => Err(ResponseError::AlreadyWritten(*status)),
            None => Ok(()),
        }
    }

    pub fn is_written(&self) -> bool {
        self.written.is_some()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.written.as_ref().map(|(status, _)| *status)
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.written.as_ref().map(|(_, body)| body)
    }

    pub fn into_parts(self) -> Option<(StatusCode, Bytes)> {
        self.written
    }
}
