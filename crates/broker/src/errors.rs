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

use porthos_common::InvalidExpiration;
use thiserror::Error;

/// Failures establishing (or binding) a broker session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("invalid broker url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },
    #[error("connection refused: nothing is bound at {0}")]
    Refused(String),
    #[error("broker address already bound: {0}")]
    AddressInUse(String),
}

/// Failures opening a channel or declaring/consuming a queue on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("channel is closed")]
    ChannelClosed,
    #[error("no queue named {0:?}")]
    QueueNotFound(String),
    #[error("queue {0:?} is exclusive to another connection")]
    ResourceLocked(String),
    #[error("queue {0:?} already exists with a different exclusivity")]
    PreconditionFailed(String),
}

/// The broker refused an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("channel is closed")]
    ChannelClosed,
    #[error("no exchange named {0:?}")]
    ExchangeNotFound(String),
    #[error(transparent)]
    InvalidExpiration(#[from] InvalidExpiration),
}

/// Failures settling a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AckError {
    #[error("channel is closed")]
    ChannelClosed,
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),
}
