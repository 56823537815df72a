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

use crate::channel::{Channel, ChannelInner};
use crate::errors::{ChannelError, ConnectionError};
use crate::lock;
use crate::vhost::{self, VhostInner};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(crate) struct ConnectionInner {
    pub(crate) id: u64,
    pub(crate) vhost: Arc<VhostInner>,
    pub(crate) closed: CancellationToken,
    channels: Mutex<Vec<Weak<ChannelInner>>>,
    next_channel_id: AtomicU64,
}

impl ConnectionInner {
    fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        let channels: Vec<_> = lock(&self.channels).drain(..).collect();
        for channel in channels.iter().filter_map(Weak::upgrade) {
            channel.close();
        }
        self.vhost.delete_exclusive_queues(self.id);
        info!(connection = self.id, "broker connection closed");
    }
}

/// A session with a broker, and the factory for the channels used to talk to it.
///
/// Closing the broker (explicitly, or by dropping it) closes every channel opened from it,
/// requeues their unacknowledged deliveries, and deletes the queues declared exclusive to it.
pub struct Broker {
    inner: Arc<ConnectionInner>,
}

impl Broker {
    /// Connect to the broker at `url`, e.g. `memory://orders`.
    pub fn connect(url: &str) -> Result<Self, ConnectionError> {
        let vhost = vhost::resolve(url)?;
        let id = vhost.next_connection_id();
        info!(%url, connection = id, "connected to broker");
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                id,
                vhost,
                closed: CancellationToken::new(),
                channels: Mutex::new(Vec::new()),
                next_channel_id: AtomicU64::new(0),
            }),
        })
    }

    /// Open a new channel on this connection.
    pub fn new_channel(&self) -> Result<Channel, ChannelError> {
        if self.inner.closed.is_cancelled() {
            return Err(ChannelError::ConnectionClosed);
        }
        let id = self.inner.next_channel_id.fetch_add(1, Ordering::SeqCst) + 1;
        let channel = Channel::open(self.inner.clone(), id);
        let mut channels = lock(&self.inner.channels);
        channels.retain(|c| c.strong_count() > 0);
        channels.push(channel.downgrade());
        debug!(connection = self.inner.id, channel = id, "channel opened");
        Ok(channel)
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.inner.close();
    }
}
