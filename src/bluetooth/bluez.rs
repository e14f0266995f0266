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

//! BLE GATT central transport backed by BlueZ.

use anyhow::{anyhow, Result};
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use bluer::gatt::WriteOp;
use bluer::{
    Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport,
};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ble_constants::{Endpoint, SERVICE_UUID};
use super::transport::{DiscoveredPeer, NotifyHandler, PeerDescriptor, Transport};
use crate::config::BluetoothConfig;
use crate::state::LinkEvents;

/// How long to wait for BlueZ to resolve GATT services after connecting.
const SERVICES_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for services.
const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An established BlueZ link.
#[derive(Clone)]
pub struct BluezLink {
    device: Device,
    events: LinkEvents,
    // Notification and link-watch tasks, aborted on disconnect
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BluezLink {
    pub fn address(&self) -> Address {
        self.device.address()
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Transport talking to BlueZ over D-Bus.
pub struct BluezTransport {
    adapter: Adapter,
}

impl BluezTransport {
    /// Open a BlueZ session and power on the configured adapter.
    pub async fn new(config: &BluetoothConfig) -> Result<Self> {
        info!("Initializing BLE central...");

        // Create BlueZ session
        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = match &config.adapter {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        info!("Using Bluetooth adapter: {}", adapter.name());

        // Ensure adapter is powered on
        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self { adapter })
    }

    async fn wait_services_resolved(device: &Device) -> Result<()> {
        let wait = async {
            loop {
                if device.is_services_resolved().await? {
                    return Ok::<(), bluer::Error>(());
                }
                tokio::time::sleep(SERVICES_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(SERVICES_RESOLVE_TIMEOUT, wait).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(anyhow!("services of {} not resolved in time", device.address())),
        }
    }

    /// Report a link drop (remote or local) through `events`.
    fn watch_link(device: &Device, events: LinkEvents) -> JoinHandle<()> {
        let device = device.clone();
        tokio::spawn(async move {
            let stream = match device.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Cannot watch link to {}: {}", device.address(), e);
                    return;
                }
            };
            let mut stream = Box::pin(stream);
            while let Some(event) = stream.next().await {
                if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                    info!("Link to {} lost", device.address());
                    events.down();
                    break;
                }
            }
        })
    }
}

impl Transport for BluezTransport {
    type Link = BluezLink;
    type Handle = Characteristic;

    async fn scan(&self, duration: Duration) -> Result<Vec<DiscoveredPeer>> {
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            ..Default::default()
        };
        self.adapter.set_discovery_filter(filter).await?;

        let mut seen: Vec<Address> = Vec::new();
        {
            let discover = self.adapter.discover_devices().await?;
            let mut discover = Box::pin(discover);
            let deadline = tokio::time::sleep(duration);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = discover.next() => match event {
                        Some(AdapterEvent::DeviceAdded(addr)) => {
                            if !seen.contains(&addr) {
                                debug!("Advertisement from {}", addr);
                                seen.push(addr);
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            // Dropping the stream stops discovery
        }

        let mut peers = Vec::with_capacity(seen.len());
        for addr in seen {
            let device = match self.adapter.device(addr) {
                Ok(device) => device,
                Err(e) => {
                    warn!("Device {} vanished: {}", addr, e);
                    continue;
                }
            };
            let uuids: HashSet<uuid::Uuid> = device.uuids().await.ok().flatten().unwrap_or_default();
            let name = device.name().await.ok().flatten().unwrap_or_default();
            peers.push(DiscoveredPeer {
                address: addr.to_string(),
                name,
                service_match: uuids.contains(&SERVICE_UUID),
            });
        }
        Ok(peers)
    }

    async fn connect(&self, peer: &PeerDescriptor, events: LinkEvents) -> Result<BluezLink> {
        let addr: Address = peer
            .address
            .parse()
            .map_err(|e| anyhow!("invalid address {}: {}", peer.address, e))?;
        let device = self.adapter.device(addr)?;

        if !device.is_connected().await? {
            device.connect().await?;
        }
        if let Err(e) = Self::wait_services_resolved(&device).await {
            let _ = device.disconnect().await;
            return Err(e);
        }

        let link = BluezLink {
            device: device.clone(),
            events: events.clone(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        };
        if !events.up() {
            let _ = device.disconnect().await;
            return Err(anyhow!("link to {} refused: another cube owns the link", addr));
        }
        link.track(Self::watch_link(&device, events));
        Ok(link)
    }

    async fn resolve(&self, link: &BluezLink, endpoint: Endpoint) -> Result<Option<Characteristic>> {
        for service in link.device.services().await? {
            if service.uuid().await? != SERVICE_UUID {
                continue;
            }
            for characteristic in service.characteristics().await? {
                if characteristic.uuid().await? == endpoint.uuid() {
                    return Ok(Some(characteristic));
                }
            }
            return Ok(None);
        }
        Err(anyhow!("toio service not found: UUID={}", SERVICE_UUID))
    }

    async fn write(
        &self,
        _link: &BluezLink,
        handle: &Characteristic,
        data: &[u8],
        with_response: bool,
    ) -> Result<()> {
        let op_type = if with_response {
            WriteOp::Request
        } else {
            WriteOp::Command
        };
        let request = CharacteristicWriteRequest {
            op_type,
            ..Default::default()
        };
        handle.write_ext(data, &request).await?;
        Ok(())
    }

    async fn read(&self, _link: &BluezLink, handle: &Characteristic) -> Result<Vec<u8>> {
        Ok(handle.read().await?)
    }

    async fn subscribe(
        &self,
        link: &BluezLink,
        handle: &Characteristic,
        handler: NotifyHandler,
    ) -> Result<()> {
        let stream = handle.notify().await?;
        let address = link.address();
        link.track(tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(value) = stream.next().await {
                handler(&value);
            }
            debug!("Notification stream from {} ended", address);
        }));
        Ok(())
    }

    async fn disconnect(&self, link: &BluezLink) -> Result<()> {
        let result = link.device.disconnect().await;
        link.abort_tasks();
        // The watcher is gone, so report the drop here; repeated downs are ignored
        link.events.down();
        result?;
        Ok(())
    }

    fn release(&self, link: &BluezLink) {
        debug!("Releasing stale link to {}", link.address());
        link.abort_tasks();
    }
}
