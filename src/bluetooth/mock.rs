// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory transport for tests and runs without a radio.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::ble_constants::Endpoint;
use super::transport::{DiscoveredPeer, NotifyHandler, PeerDescriptor, Transport};
use crate::state::LinkEvents;

type SharedHandler = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// A write captured by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub address: String,
    pub endpoint: Endpoint,
    pub data: Vec<u8>,
    pub with_response: bool,
}

/// Link handle issued by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLink {
    pub address: String,
}

#[derive(Default)]
struct MockTransportInner {
    peers: Vec<DiscoveredPeer>,
    fail_scan: bool,
    fail_connect: bool,
    fail_writes: bool,
    missing: HashSet<Endpoint>,
    links: HashMap<String, LinkEvents>,
    reads: HashMap<Endpoint, Vec<u8>>,
    writes: Vec<RecordedWrite>,
    subscriptions: HashMap<(String, Endpoint), SharedHandler>,
    connects: usize,
    disconnects: usize,
    releases: usize,
    resolves: usize,
    subscribes: usize,
}

/// Mock transport.
///
/// Cloning shares state, so a test can keep a handle to inject
/// notifications while the driver owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an advertisement returned by every subsequent scan.
    pub fn add_peer(&self, address: &str, name: &str, service_match: bool) {
        self.inner.lock().peers.push(DiscoveredPeer {
            address: address.to_string(),
            name: name.to_string(),
            service_match,
        });
    }

    pub fn clear_peers(&self) {
        self.inner.lock().peers.clear();
    }

    pub fn fail_scan(&self, fail: bool) {
        self.inner.lock().fail_scan = fail;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.inner.lock().fail_connect = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Make `endpoint` absent from the service description.
    pub fn remove_endpoint(&self, endpoint: Endpoint) {
        self.inner.lock().missing.insert(endpoint);
    }

    /// Value returned by reads of `endpoint`.
    pub fn set_read(&self, endpoint: Endpoint, data: Vec<u8>) {
        self.inner.lock().reads.insert(endpoint, data);
    }

    /// Deliver a notification as the radio stack would.
    ///
    /// Returns `false` when nothing is subscribed.
    pub fn notify(&self, address: &str, endpoint: Endpoint, data: &[u8]) -> bool {
        let handler = self
            .inner
            .lock()
            .subscriptions
            .get(&(address.to_string(), endpoint))
            .cloned();
        match handler {
            Some(handler) => {
                handler(data);
                true
            }
            None => false,
        }
    }

    /// Simulate the peer dropping the link.
    ///
    /// Subscriptions stay registered until the link is released, so late
    /// notifications can still be injected.
    pub fn drop_link(&self, address: &str) {
        let events = self.inner.lock().links.remove(address);
        if let Some(events) = events {
            events.down();
        }
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.inner.lock().writes.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.inner.lock().connects
    }

    pub fn disconnect_count(&self) -> usize {
        self.inner.lock().disconnects
    }

    pub fn release_count(&self) -> usize {
        self.inner.lock().releases
    }

    pub fn resolve_count(&self) -> usize {
        self.inner.lock().resolves
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscribes
    }
}

impl Transport for MockTransport {
    type Link = MockLink;
    type Handle = Endpoint;

    async fn scan(&self, duration: Duration) -> Result<Vec<DiscoveredPeer>> {
        let inner = self.inner.lock();
        if inner.fail_scan {
            return Err(anyhow!("scan could not be started"));
        }
        debug!("Mock scan for {:?}: {} peers", duration, inner.peers.len());
        Ok(inner.peers.clone())
    }

    async fn connect(&self, peer: &PeerDescriptor, events: LinkEvents) -> Result<MockLink> {
        {
            let mut inner = self.inner.lock();
            if inner.fail_connect {
                return Err(anyhow!("connection to {} refused", peer.address));
            }
            inner.connects += 1;
            inner.links.insert(peer.address.clone(), events.clone());
        }
        if !events.up() {
            self.inner.lock().links.remove(&peer.address);
            return Err(anyhow!("link to {} refused", peer.address));
        }
        Ok(MockLink {
            address: peer.address.clone(),
        })
    }

    async fn resolve(&self, _link: &MockLink, endpoint: Endpoint) -> Result<Option<Endpoint>> {
        let mut inner = self.inner.lock();
        inner.resolves += 1;
        if inner.missing.contains(&endpoint) {
            Ok(None)
        } else {
            Ok(Some(endpoint))
        }
    }

    async fn write(
        &self,
        link: &MockLink,
        handle: &Endpoint,
        data: &[u8],
        with_response: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(anyhow!("write to {} failed", handle.as_str()));
        }
        inner.writes.push(RecordedWrite {
            address: link.address.clone(),
            endpoint: *handle,
            data: data.to_vec(),
            with_response,
        });
        Ok(())
    }

    async fn read(&self, _link: &MockLink, handle: &Endpoint) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .reads
            .get(handle)
            .cloned()
            .ok_or_else(|| anyhow!("no value for {}", handle.as_str()))
    }

    async fn subscribe(
        &self,
        link: &MockLink,
        handle: &Endpoint,
        handler: NotifyHandler,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.subscribes += 1;
        inner
            .subscriptions
            .insert((link.address.clone(), *handle), Arc::from(handler));
        Ok(())
    }

    async fn disconnect(&self, link: &MockLink) -> Result<()> {
        let events = {
            let mut inner = self.inner.lock();
            inner.disconnects += 1;
            inner.subscriptions.retain(|(a, _), _| a != &link.address);
            inner.links.remove(&link.address)
        };
        if let Some(events) = events {
            events.down();
        }
        Ok(())
    }

    fn release(&self, link: &MockLink) {
        let mut inner = self.inner.lock();
        inner.releases += 1;
        inner.subscriptions.retain(|(a, _), _| a != &link.address);
    }
}
