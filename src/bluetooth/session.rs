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

//! Session with a single toio Core Cube.

use anyhow::{anyhow, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ble_constants::Endpoint;
use super::protocol::{self, Direction, MotionReading, MotorSpeed, Threshold};
use super::transport::{PeerDescriptor, Transport};
use crate::config::TimingConfig;
use crate::events::EventHandlers;
use crate::state::{ConnectionStatus, LinkEvents, LinkRegistry, SessionId};

/// Characteristic handles resolved at connect time.
#[derive(Clone)]
struct Endpoints<H> {
    battery: H,
    light: H,
    sound: H,
    button: H,
    motion: H,
    configuration: H,
    motor: H,
}

impl<H> Endpoints<H> {
    fn get(&self, endpoint: Endpoint) -> &H {
        match endpoint {
            Endpoint::Battery => &self.battery,
            Endpoint::Light => &self.light,
            Endpoint::Sound => &self.sound,
            Endpoint::Button => &self.button,
            Endpoint::Motion => &self.motion,
            Endpoint::Configuration => &self.configuration,
            Endpoint::Motor => &self.motor,
        }
    }
}

/// An established link and its endpoints.
struct ActiveLink<T: Transport> {
    link: T::Link,
    endpoints: Endpoints<T::Handle>,
}

impl<T: Transport> Clone for ActiveLink<T> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            endpoints: self.endpoints.clone(),
        }
    }
}

/// Session with one discovered cube.
///
/// All command methods are no-ops returning a neutral value unless this
/// session currently owns the link.
pub struct PeerSession<T: Transport> {
    id: SessionId,
    descriptor: PeerDescriptor,
    transport: Arc<T>,
    registry: Arc<LinkRegistry>,
    timing: TimingConfig,
    status: RwLock<ConnectionStatus>,
    active: RwLock<Option<ActiveLink<T>>>,
    handlers: EventHandlers,
    // Serializes connect/disconnect on this session
    lifecycle: tokio::sync::Mutex<()>,
    version: Mutex<Option<String>>,
}

impl<T: Transport> PeerSession<T> {
    /// Create a session for a discovered peer.
    pub fn new(
        descriptor: PeerDescriptor,
        transport: Arc<T>,
        registry: Arc<LinkRegistry>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            id: SessionId::next(),
            descriptor,
            transport,
            registry,
            timing,
            status: RwLock::new(ConnectionStatus::Disconnected),
            active: RwLock::new(None),
            handlers: EventHandlers::default(),
            lifecycle: tokio::sync::Mutex::new(()),
            version: Mutex::new(None),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.descriptor.address
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &PeerDescriptor {
        &self.descriptor
    }

    /// True iff this session currently owns the link.
    pub fn is_connected(&self) -> bool {
        self.registry.is_owner(self.id)
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.is_connected() {
            ConnectionStatus::Connected
        } else {
            match *self.status.read() {
                ConnectionStatus::Connecting => ConnectionStatus::Connecting,
                _ => ConnectionStatus::Disconnected,
            }
        }
    }

    /// Connect, resolve all endpoints and subscribe to notifications.
    ///
    /// Returns `true` immediately if already connected. Fails without
    /// touching the radio while another session owns the link.
    pub async fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        let _guard = self.lifecycle.lock().await;
        // A concurrent connect may have finished while we waited
        if self.is_connected() {
            return true;
        }

        if !self.registry.claim(self.id) {
            return false;
        }
        let connected = self.establish().await;
        self.registry.release_claim(self.id);
        if !connected {
            *self.status.write() = ConnectionStatus::Disconnected;
            return false;
        }

        // Let the cube start notifying before the caller issues commands
        tokio::time::sleep(Duration::from_millis(self.timing.settle_ms)).await;

        // The peer may have dropped the link during the wait
        let connected = self.is_connected();
        if connected {
            info!("Connected to {}", self.descriptor.address);
        } else {
            warn!("Link to {} lost while settling", self.descriptor.address);
        }
        connected
    }

    /// Bring up a link and install it. Requires the link claim.
    async fn establish(&self) -> bool {
        // A link lost without an intervening tick is still installed
        let stale = self.active.write().take();
        if let Some(stale) = stale {
            self.transport.release(&stale.link);
        }

        info!("Connecting to {} ({})", self.descriptor.name, self.descriptor.address);
        *self.status.write() = ConnectionStatus::Connecting;

        let events = LinkEvents::new(self.id, self.registry.clone());
        let link = match self.transport.connect(&self.descriptor, events).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Failed to connect to {}: {}", self.descriptor.address, e);
                return false;
            }
        };

        self.registry.reset_sensor_latches();

        match self.setup(&link).await {
            Ok(endpoints) => {
                *self.active.write() = Some(ActiveLink { link, endpoints });
                *self.status.write() = ConnectionStatus::Connected;
                true
            }
            Err(e) => {
                warn!("Setup of {} failed: {}", self.descriptor.address, e);
                if let Err(e) = self.transport.disconnect(&link).await {
                    warn!("Disconnect after failed setup: {}", e);
                }
                false
            }
        }
    }

    async fn resolve(&self, link: &T::Link, endpoint: Endpoint) -> Result<T::Handle> {
        self.transport.resolve(link, endpoint).await?.ok_or_else(|| {
            anyhow!(
                "characteristic for {} not found: UUID={}",
                endpoint.as_str(),
                endpoint.uuid()
            )
        })
    }

    async fn setup(&self, link: &T::Link) -> Result<Endpoints<T::Handle>> {
        // Fields are evaluated in declaration order, which is the resolution order
        let endpoints = Endpoints {
            battery: self.resolve(link, Endpoint::Battery).await?,
            light: self.resolve(link, Endpoint::Light).await?,
            sound: self.resolve(link, Endpoint::Sound).await?,
            button: self.resolve(link, Endpoint::Button).await?,
            motion: self.resolve(link, Endpoint::Motion).await?,
            configuration: self.resolve(link, Endpoint::Configuration).await?,
            motor: self.resolve(link, Endpoint::Motor).await?,
        };

        let (registry, id) = (self.registry.clone(), self.id);
        self.transport
            .subscribe(
                link,
                &endpoints.battery,
                Box::new(move |data| {
                    registry.notify_battery(id, data);
                }),
            )
            .await?;

        let (registry, id) = (self.registry.clone(), self.id);
        self.transport
            .subscribe(
                link,
                &endpoints.button,
                Box::new(move |data| {
                    registry.notify_button(id, data);
                }),
            )
            .await?;

        let (registry, id) = (self.registry.clone(), self.id);
        self.transport
            .subscribe(
                link,
                &endpoints.motion,
                Box::new(move |data| {
                    registry.notify_motion(id, data);
                }),
            )
            .await?;

        debug!("Endpoints resolved and subscribed for {}", self.descriptor.address);
        Ok(endpoints)
    }

    /// Request link teardown. The registry is updated by the transport.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        let active = self.active.write().take();
        *self.status.write() = ConnectionStatus::Disconnected;

        if let Some(active) = active {
            info!("Disconnecting from {}", self.descriptor.address);
            if let Err(e) = self.transport.disconnect(&active.link).await {
                warn!("Disconnect from {} failed: {}", self.descriptor.address, e);
            }
        }
    }

    /// Link and endpoints, only while this session owns the link.
    fn active_link(&self) -> Option<ActiveLink<T>> {
        if !self.is_connected() {
            debug!("{} is not connected", self.descriptor.address);
            return None;
        }
        self.active.read().clone()
    }

    async fn write(&self, endpoint: Endpoint, data: &[u8], with_response: bool) -> bool {
        let Some(active) = self.active_link() else {
            return false;
        };
        let handle = active.endpoints.get(endpoint);
        match self.transport.write(&active.link, handle, data, with_response).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Write to {} endpoint failed: {}", endpoint.as_str(), e);
                false
            }
        }
    }

    async fn read(&self, endpoint: Endpoint) -> Option<Vec<u8>> {
        let active = self.active_link()?;
        let handle = active.endpoints.get(endpoint);
        match self.transport.read(&active.link, handle).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Read from {} endpoint failed: {}", endpoint.as_str(), e);
                None
            }
        }
    }

    /// Write raw sound data to the sound endpoint unmodified.
    pub async fn play_sound_raw(&self, data: &[u8]) -> bool {
        self.write(Endpoint::Sound, data, true).await
    }

    pub async fn play_sound_effect(&self, sound_id: u8, volume: u8) -> bool {
        self.write(Endpoint::Sound, &protocol::encode_sound_effect(sound_id, volume), true)
            .await
    }

    pub async fn stop_sound(&self) -> bool {
        self.write(Endpoint::Sound, &protocol::SOUND_STOP, true).await
    }

    pub async fn turn_on_led(&self, r: u8, g: u8, b: u8) -> bool {
        self.write(Endpoint::Light, &protocol::encode_led(r, g, b), false)
            .await
    }

    pub async fn turn_off_led(&self) -> bool {
        self.write(Endpoint::Light, &protocol::encode_led_off(), false)
            .await
    }

    /// Battery level 0–100, or 0 on any failure.
    pub async fn battery_level(&self) -> u8 {
        self.read(Endpoint::Battery)
            .await
            .and_then(|data| protocol::decode_battery(&data))
            .unwrap_or(0)
    }

    /// Button state, `false` on any failure.
    pub async fn button_state(&self) -> bool {
        self.read(Endpoint::Button)
            .await
            .and_then(|data| protocol::decode_button(&data))
            .unwrap_or(false)
    }

    /// Motion reading, all-clear on any failure.
    pub async fn motion(&self) -> MotionReading {
        self.read(Endpoint::Motion)
            .await
            .and_then(|data| protocol::decode_motion(&data))
            .unwrap_or_default()
    }

    /// Query the BLE protocol version. Empty on failure or invalid response.
    pub async fn protocol_version(&self) -> String {
        if !self.write(Endpoint::Configuration, &protocol::VERSION_QUERY, true).await {
            return String::new();
        }

        // The cube needs time to update the characteristic value
        tokio::time::sleep(Duration::from_millis(self.timing.version_query_ms)).await;

        let Some(response) = self.read(Endpoint::Configuration).await else {
            return String::new();
        };
        match protocol::decode_version(&response) {
            Some(version) => {
                *self.version.lock() = Some(version.clone());
                version
            }
            None => {
                debug!("Invalid version response ({} bytes)", response.len());
                String::new()
            }
        }
    }

    /// Last successfully queried protocol version.
    pub fn cached_protocol_version(&self) -> Option<String> {
        self.version.lock().clone()
    }

    async fn set_threshold(&self, threshold: Threshold, value: u8) -> bool {
        self.write(
            Endpoint::Configuration,
            &protocol::encode_threshold(threshold, value),
            true,
        )
        .await
    }

    /// Flat detection threshold in degrees, clamped to 1–45.
    pub async fn set_flat_threshold(&self, degrees: u8) -> bool {
        self.set_threshold(Threshold::Flat, degrees).await
    }

    /// Collision threshold, clamped to 1–10.
    pub async fn set_clash_threshold(&self, level: u8) -> bool {
        self.set_threshold(Threshold::Clash, level).await
    }

    /// Double tap interval, clamped to 1–7.
    pub async fn set_double_tap_threshold(&self, level: u8) -> bool {
        self.set_threshold(Threshold::DoubleTap, level).await
    }

    /// Low-level motor control. `duration_ms == 0` runs until changed.
    pub async fn control_motor(
        &self,
        left_forward: bool,
        left_speed: u8,
        right_forward: bool,
        right_speed: u8,
        duration_ms: u16,
    ) -> bool {
        let left = MotorSpeed::new(Direction::from_forward(left_forward), left_speed);
        let right = MotorSpeed::new(Direction::from_forward(right_forward), right_speed);
        self.write(
            Endpoint::Motor,
            &protocol::encode_timed_motor(left, right, duration_ms),
            true,
        )
        .await
    }

    /// Drive with throttle and steering, each -100..=100.
    pub async fn drive(&self, throttle: i8, steering: i8) -> bool {
        self.write(Endpoint::Motor, &protocol::encode_drive(throttle, steering), true)
            .await
    }

    pub fn on_connection<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.handlers.connection.set(callback);
    }

    pub fn on_battery<F>(&self, callback: F)
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.handlers.battery.set(callback);
    }

    pub fn on_button<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.handlers.button.set(callback);
    }

    pub fn on_motion<F>(&self, callback: F)
    where
        F: Fn(MotionReading) + Send + Sync + 'static,
    {
        self.handlers.motion.set(callback);
    }

    /// Deliver pending events addressed to this session.
    ///
    /// Connection changes go to the last session that brought a link up.
    /// Sensor events only go to the current owner.
    pub fn tick(&self) {
        let events = self.registry.drain(self.id);
        if events.is_empty() {
            return;
        }
        if let Some(false) = events.connection {
            // The link is gone; its handles are stale
            let stale = self.active.write().take();
            if let Some(stale) = stale {
                self.transport.release(&stale.link);
            }
            *self.status.write() = ConnectionStatus::Disconnected;
        }
        self.handlers.deliver(events);
    }
}

impl<T: Transport> std::fmt::Debug for PeerSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("address", &self.descriptor.address)
            .field("name", &self.descriptor.name)
            .field("status", &self.status().as_str())
            .finish()
    }
}

/// Defaults for the optional parameters of the command surface.
pub mod defaults {
    use crate::bluetooth::protocol::{self, Threshold};

    pub const VOLUME: u8 = protocol::DEFAULT_VOLUME;
    pub const FLAT_THRESHOLD: u8 = Threshold::Flat.default_value();
    pub const CLASH_THRESHOLD: u8 = Threshold::Clash.default_value();
    pub const DOUBLE_TAP_THRESHOLD: u8 = Threshold::DoubleTap.default_value();
}
