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

//! Virtual hosts: the broker-side state (queues) that connections attach to.
//!
//! A virtual host is bound under a name and then reachable by any code in the process at
//! `memory://<name>`, much like an `inproc://` endpoint has to be bound before anyone can
//! connect to it. The registry only holds weak references; the host goes away once its
//! `VirtualHost` handle and all connections to it are dropped.

use crate::errors::{ChannelError, ConnectionError};
use crate::lock;
use crate::queue::{Queue, QueueInfo};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

/// URL scheme for in-process brokers.
pub const MEMORY_SCHEME: &str = "memory";

lazy_static! {
    static ref VIRTUAL_HOSTS: Mutex<HashMap<String, Weak<VhostInner>>> =
        Mutex::new(HashMap::new());
}

pub(crate) struct VhostInner {
    name: String,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    next_connection_id: AtomicU64,
}

impl VhostInner {
    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn declare_queue(
        &self,
        name: &str,
        exclusive: bool,
        connection_id: u64,
    ) -> Result<Arc<Queue>, ChannelError> {
        let mut queues = lock(&self.queues);
        if let Some(existing) = queues.get(name) {
            return match existing.exclusive_owner() {
                Some(owner) if owner != connection_id => {
                    Err(ChannelError::ResourceLocked(name.to_string()))
                }
                Some(_) if !exclusive => Err(ChannelError::PreconditionFailed(name.to_string())),
                None if exclusive => Err(ChannelError::PreconditionFailed(name.to_string())),
                _ => Ok(existing.clone()),
            };
        }
        let owner = exclusive.then_some(connection_id);
        let queue = Arc::new(Queue::new(name.to_string(), owner));
        queues.insert(name.to_string(), queue.clone());
        Ok(queue)
    }

    pub(crate) fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        lock(&self.queues).get(name).cloned()
    }

    /// Exclusive queues live only as long as the connection that declared them.
    pub(crate) fn delete_exclusive_queues(&self, connection_id: u64) {
        let mut queues = lock(&self.queues);
        queues.retain(|name, queue| {
            let keep = queue.exclusive_owner() != Some(connection_id);
            if !keep {
                debug!(vhost = %self.name, queue = %name, "deleting exclusive queue");
            }
            keep
        });
    }
}

/// A broker instance living in this process.
pub struct VirtualHost {
    inner: Arc<VhostInner>,
}

impl VirtualHost {
    /// Create a broker and make it reachable at `memory://<name>`.
    pub fn bind(name: &str) -> Result<Self, ConnectionError> {
        let url = format!("{MEMORY_SCHEME}://{name}");
        if name.is_empty() || name.contains('/') {
            return Err(ConnectionError::InvalidUrl {
                url,
                reason: "virtual host names must be non-empty and contain no '/'",
            });
        }

        let mut hosts = lock(&*VIRTUAL_HOSTS);
        hosts.retain(|_, host| host.strong_count() > 0);
        if hosts.contains_key(name) {
            return Err(ConnectionError::AddressInUse(url));
        }
        let inner = Arc::new(VhostInner {
            name: name.to_string(),
            queues: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(0),
        });
        hosts.insert(name.to_string(), Arc::downgrade(&inner));
        info!(%url, "virtual host bound");
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The URL to hand to `Broker::connect`.
    pub fn url(&self) -> String {
        format!("{MEMORY_SCHEME}://{}", self.inner.name)
    }

    /// Current state of a queue, if it exists.
    pub fn queue_info(&self, queue: &str) -> Option<QueueInfo> {
        self.inner.queue(queue).map(|q| q.info())
    }
}

/// Find the virtual host a `memory://<name>` URL refers to.
pub(crate) fn resolve(url: &str) -> Result<Arc<VhostInner>, ConnectionError> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ConnectionError::InvalidUrl {
            url: url.to_string(),
            reason: "expected <scheme>://<virtual host>",
        });
    };
    if scheme != MEMORY_SCHEME {
        return Err(ConnectionError::InvalidUrl {
            url: url.to_string(),
            reason: "unsupported scheme, only memory:// is available",
        });
    }
    let name = rest.strip_suffix('/').unwrap_or(rest);
    if name.is_empty() || name.contains('/') {
        return Err(ConnectionError::InvalidUrl {
            url: url.to_string(),
            reason: "missing or malformed virtual host name",
        });
    }

    lock(&*VIRTUAL_HOSTS)
        .get(name)
        .and_then(Weak::upgrade)
        .ok_or_else(|| ConnectionError::Refused(url.to_string()))
}
