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

//! Event callbacks and the periodic dispatch loop.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::bluetooth::discovery::DiscoveryManager;
use crate::bluetooth::protocol::MotionReading;
use crate::bluetooth::transport::Transport;
use crate::state::PendingEvents;

type Callback<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

/// A single registered callback. Registering replaces the previous one.
pub struct HandlerSlot<T> {
    callback: Mutex<Option<Callback<T>>>,
}

impl<T> HandlerSlot<T> {
    pub fn new() -> Self {
        Self {
            callback: Mutex::new(None),
        }
    }

    pub fn set<F>(&self, callback: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *self.callback.lock() = Some(Arc::new(callback));
    }

    pub fn clear(&self) {
        *self.callback.lock() = None;
    }

    /// Invoke the callback, if any. The slot is not locked during the call.
    pub fn call(&self, value: T) -> bool {
        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }
}

impl<T> Default for HandlerSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session callbacks.
#[derive(Default)]
pub struct EventHandlers {
    pub connection: HandlerSlot<bool>,
    pub battery: HandlerSlot<u8>,
    pub button: HandlerSlot<bool>,
    pub motion: HandlerSlot<MotionReading>,
}

impl EventHandlers {
    /// Deliver drained events in the fixed order
    /// connection, battery, button, motion.
    pub fn deliver(&self, events: PendingEvents) {
        if let Some(connected) = events.connection {
            self.connection.call(connected);
        }
        if let Some(level) = events.battery {
            self.battery.call(level);
        }
        if let Some(pressed) = events.button {
            self.button.call(pressed);
        }
        if let Some(reading) = events.motion {
            self.motion.call(reading);
        }
    }
}

/// Tick every tracked session at `period` until `shutdown` resolves.
pub async fn run_dispatch<T, S>(manager: &DiscoveryManager<T>, period: Duration, shutdown: S)
where
    T: Transport,
    S: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!("Dispatch loop started ({} ms period)", period.as_millis());
    loop {
        tokio::select! {
            _ = interval.tick() => {
                manager.tick();
            }
            _ = &mut shutdown => {
                debug!("Dispatch loop shutdown requested");
                break;
            }
        }
    }
    info!("Dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_register_replaces() {
        let slot = HandlerSlot::<u8>::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        slot.set(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = second.clone();
        slot.set(move |level| {
            s.store(level as usize, Ordering::SeqCst);
        });

        assert!(slot.call(42));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 42);

        slot.clear();
        assert!(!slot.call(1));
    }

    #[test]
    fn test_deliver_order() {
        let handlers = EventHandlers::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        handlers.connection.set(move |c| l.lock().push(format!("connection:{}", c)));
        let l = log.clone();
        handlers.battery.set(move |b| l.lock().push(format!("battery:{}", b)));
        let l = log.clone();
        handlers.button.set(move |b| l.lock().push(format!("button:{}", b)));
        let l = log.clone();
        handlers
            .motion
            .set(move |m| l.lock().push(format!("motion:{}", m.attitude)));

        handlers.deliver(PendingEvents {
            connection: Some(true),
            battery: Some(70),
            button: Some(false),
            motion: Some(MotionReading {
                attitude: 3,
                ..Default::default()
            }),
        });

        assert_eq!(
            *log.lock(),
            vec!["connection:true", "battery:70", "button:false", "motion:3"]
        );
    }
}
