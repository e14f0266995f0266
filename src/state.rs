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

//! Shared link ownership and pending event latches.
//!
//! Only one BLE link may be active at a time. The [`LinkRegistry`] records
//! which session owns it and holds one latch per notification kind. Transport
//! tasks arm latches; the dispatch tick drains them for the owning session.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bluetooth::protocol::{self, MotionReading};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Connection status of a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
        }
    }
}

/// Single-slot holder for an undelivered value. Newer values overwrite.
#[derive(Debug, Clone, Copy)]
pub struct Latch<T>(Option<T>);

impl<T> Latch<T> {
    pub const fn new() -> Self {
        Self(None)
    }

    /// Arm with a value, replacing any undelivered one.
    pub fn arm(&mut self, value: T) {
        self.0 = Some(value);
    }

    /// Take the value and disarm.
    pub fn take(&mut self) -> Option<T> {
        self.0.take()
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

impl<T> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Events taken from the registry for one session by a single tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingEvents {
    pub connection: Option<bool>,
    pub battery: Option<u8>,
    pub button: Option<bool>,
    pub motion: Option<MotionReading>,
}

impl PendingEvents {
    pub fn is_empty(&self) -> bool {
        self.connection.is_none()
            && self.battery.is_none()
            && self.button.is_none()
            && self.motion.is_none()
    }
}

#[derive(Debug, Default)]
struct Inner {
    owner: Option<SessionId>,
    // Session between a successful claim and its link coming up
    claimant: Option<SessionId>,
    last_owner: Option<SessionId>,
    connection: Latch<bool>,
    battery: Latch<u8>,
    button: Latch<bool>,
    motion: Latch<MotionReading>,
}

/// Shared link registry.
///
/// Construct one per process (or per independent radio) and hand the same
/// `Arc` to every session.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    inner: Mutex<Inner>,
}

impl LinkRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Session currently holding the link.
    pub fn owner(&self) -> Option<SessionId> {
        self.inner.lock().owner
    }

    /// Session that most recently brought a link up.
    pub fn last_owner(&self) -> Option<SessionId> {
        self.inner.lock().last_owner
    }

    pub fn is_owner(&self, session: SessionId) -> bool {
        self.inner.lock().owner == Some(session)
    }

    /// Reserve the link for `session` before it starts connecting.
    ///
    /// Fails while another session owns the link or holds a claim.
    pub fn claim(&self, session: SessionId) -> bool {
        let mut inner = self.inner.lock();
        if let Some(holder) = inner.owner.or(inner.claimant).filter(|s| *s != session) {
            warn!("{} cannot claim the link: held by {}", session, holder);
            return false;
        }
        inner.claimant = Some(session);
        true
    }

    /// Drop a claim taken by `session`, if it still holds one.
    pub fn release_claim(&self, session: SessionId) {
        let mut inner = self.inner.lock();
        if inner.claimant == Some(session) {
            inner.claimant = None;
        }
    }

    /// Record that `session`'s link came up.
    ///
    /// Returns `false`, leaving ownership unchanged, while another session
    /// owns the link.
    pub fn link_up(&self, session: SessionId) -> bool {
        let mut inner = self.inner.lock();
        if let Some(owner) = inner.owner.filter(|owner| *owner != session) {
            warn!("Link up from {} refused: owned by {}", session, owner);
            return false;
        }
        if inner.claimant == Some(session) {
            inner.claimant = None;
        }
        inner.owner = Some(session);
        inner.last_owner = Some(session);
        inner.connection.arm(true);
        info!("Link up: {}", session);
        true
    }

    /// Record that `session`'s link went down.
    pub fn link_down(&self, session: SessionId) {
        let mut inner = self.inner.lock();
        if inner.owner != Some(session) {
            debug!("Ignoring link down from non-owner {}", session);
            return;
        }
        inner.owner = None;
        inner.connection.arm(false);
        info!("Link down: {}", session);
    }

    /// Discard stale battery and button values before a new link is set up.
    pub fn reset_sensor_latches(&self) {
        let mut inner = self.inner.lock();
        inner.battery.clear();
        inner.button.clear();
    }

    /// Arm the battery latch from a notification received on `from`'s link.
    ///
    /// Returns `false` when the payload was dropped: `from` does not own the
    /// link or the payload is malformed.
    pub fn notify_battery(&self, from: SessionId, data: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        if inner.owner != Some(from) {
            return false;
        }
        match protocol::decode_battery(data) {
            Some(level) => {
                inner.battery.arm(level);
                true
            }
            None => {
                debug!("Dropped battery notification ({} bytes)", data.len());
                false
            }
        }
    }

    /// Arm the button latch from a notification payload.
    pub fn notify_button(&self, from: SessionId, data: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        if inner.owner != Some(from) {
            return false;
        }
        match protocol::decode_button(data) {
            Some(pressed) => {
                inner.button.arm(pressed);
                true
            }
            None => {
                debug!("Dropped button notification ({} bytes)", data.len());
                false
            }
        }
    }

    /// Arm the motion latch from a notification payload.
    pub fn notify_motion(&self, from: SessionId, data: &[u8]) -> bool {
        let mut inner = self.inner.lock();
        if inner.owner != Some(from) {
            return false;
        }
        match protocol::decode_motion(data) {
            Some(reading) => {
                inner.motion.arm(reading);
                true
            }
            None => {
                debug!("Dropped motion notification ({} bytes)", data.len());
                false
            }
        }
    }

    /// Take every event deliverable to `session`.
    ///
    /// The connection latch goes to the last owner even after it lost the
    /// link. Sensor latches are only taken by the current owner.
    pub fn drain(&self, session: SessionId) -> PendingEvents {
        let mut inner = self.inner.lock();
        let mut events = PendingEvents::default();

        if inner.last_owner == Some(session) {
            if let Some(connected) = inner.connection.take() {
                if !connected {
                    inner.last_owner = None;
                }
                events.connection = Some(connected);
            }
        }

        if inner.owner != Some(session) {
            return events;
        }

        events.battery = inner.battery.take();
        events.button = inner.button.take();
        events.motion = inner.motion.take();
        events
    }
}

/// Connection-state callbacks handed to the transport for one session.
#[derive(Clone)]
pub struct LinkEvents {
    session: SessionId,
    registry: Arc<LinkRegistry>,
}

impl LinkEvents {
    pub fn new(session: SessionId, registry: Arc<LinkRegistry>) -> Self {
        Self { session, registry }
    }

    /// Called by the transport once the link is established.
    ///
    /// A `false` return means the link must be torn down again.
    pub fn up(&self) -> bool {
        self.registry.link_up(self.session)
    }

    /// Called by the transport when the link is lost or torn down.
    pub fn down(&self) {
        self.registry.link_down(self.session);
    }
}

impl fmt::Debug for LinkEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkEvents")
            .field("session", &self.session)
            .finish()
    }
}
