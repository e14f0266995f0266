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

//! Radio transport abstraction.
//!
//! The driver core never talks to the radio directly. Scanning, link
//! establishment and GATT primitives go through [`Transport`], implemented by
//! [`super::bluez::BluezTransport`] on Linux and [`super::mock::MockTransport`]
//! in tests.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

use super::ble_constants::Endpoint;
use crate::state::LinkEvents;

/// Callback invoked with the raw payload of every notification.
///
/// Runs on a transport-owned task, never on the dispatch tick.
pub type NotifyHandler = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// An advertisement seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub address: String,
    pub name: String,
    /// Advertisement carries the toio service UUID.
    pub service_match: bool,
}

/// Identity of a candidate robot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerDescriptor {
    pub address: String,
    pub name: String,
}

impl From<DiscoveredPeer> for PeerDescriptor {
    fn from(peer: DiscoveredPeer) -> Self {
        Self {
            address: peer.address,
            name: peer.name,
        }
    }
}

/// GATT central operations needed by the driver.
pub trait Transport: Send + Sync + 'static {
    /// Opaque handle for an established link.
    type Link: Clone + Send + Sync + 'static;

    /// Resolved characteristic handle.
    type Handle: Clone + Send + Sync + 'static;

    /// Active scan for `duration`.
    fn scan(&self, duration: Duration) -> impl Future<Output = Result<Vec<DiscoveredPeer>>> + Send;

    /// Establish a link. The transport reports link up/down through `events`.
    fn connect(
        &self,
        peer: &PeerDescriptor,
        events: LinkEvents,
    ) -> impl Future<Output = Result<Self::Link>> + Send;

    /// Look up an endpoint in the peer's service description.
    fn resolve(
        &self,
        link: &Self::Link,
        endpoint: Endpoint,
    ) -> impl Future<Output = Result<Option<Self::Handle>>> + Send;

    fn write(
        &self,
        link: &Self::Link,
        handle: &Self::Handle,
        data: &[u8],
        with_response: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    fn read(
        &self,
        link: &Self::Link,
        handle: &Self::Handle,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn subscribe(
        &self,
        link: &Self::Link,
        handle: &Self::Handle,
        handler: NotifyHandler,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Request teardown. Completion is reported through the link's events.
    fn disconnect(&self, link: &Self::Link) -> impl Future<Output = Result<()>> + Send;

    /// Free local resources of a link that is already down.
    ///
    /// Stops its notification delivery. Does not report through the link's
    /// events.
    fn release(&self, link: &Self::Link);
}
