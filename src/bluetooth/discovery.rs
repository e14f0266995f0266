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

//! Cube discovery and session tracking.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::session::PeerSession;
use super::transport::{PeerDescriptor, Transport};
use crate::config::{Config, TimingConfig};
use crate::state::LinkRegistry;

/// Scans for cubes and keeps one session per address.
///
/// Sessions are never evicted; a cube seen again is handed back as the
/// same session object.
pub struct DiscoveryManager<T: Transport> {
    transport: Arc<T>,
    registry: Arc<LinkRegistry>,
    timing: TimingConfig,
    default_scan_secs: u8,
    sessions: RwLock<HashMap<String, Arc<PeerSession<T>>>>,
}

impl<T: Transport> DiscoveryManager<T> {
    /// Create a new discovery manager.
    pub fn new(transport: Arc<T>, registry: Arc<LinkRegistry>, config: &Config) -> Self {
        Self {
            transport,
            registry,
            timing: config.timing.clone(),
            default_scan_secs: config.bluetooth.scan_duration_secs,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    /// Scan with the configured default duration.
    pub async fn scan_default(&self) -> Vec<Arc<PeerSession<T>>> {
        self.scan(self.default_scan_secs).await
    }

    /// Scan for `duration_secs` (at least 1) and return the cubes seen.
    ///
    /// Returns an empty list if the scan could not be started.
    pub async fn scan(&self, duration_secs: u8) -> Vec<Arc<PeerSession<T>>> {
        let duration_secs = duration_secs.max(1);
        info!("Scanning for cubes ({} s)...", duration_secs);

        let peers = match self
            .transport
            .scan(Duration::from_secs(duration_secs as u64))
            .await
        {
            Ok(peers) => peers,
            Err(e) => {
                error!("Scan failed: {}", e);
                return Vec::new();
            }
        };

        let mut found: Vec<Arc<PeerSession<T>>> = Vec::new();
        for peer in peers {
            if !peer.service_match {
                debug!("Ignoring {} ({}): no toio service", peer.address, peer.name);
                continue;
            }
            let session = self.session_for(peer.into());
            if !found.iter().any(|s| s.id() == session.id()) {
                found.push(session);
            }
        }

        info!(
            "Scan finished: {} cube(s) found, {} tracked",
            found.len(),
            self.sessions.read().len()
        );
        found
    }

    /// Existing session for the address, or a new one.
    fn session_for(&self, descriptor: PeerDescriptor) -> Arc<PeerSession<T>> {
        let mut sessions = self.sessions.write();
        sessions
            .entry(descriptor.address.clone())
            .or_insert_with(|| {
                info!("New cube: {} ({})", descriptor.name, descriptor.address);
                Arc::new(PeerSession::new(
                    descriptor,
                    self.transport.clone(),
                    self.registry.clone(),
                    self.timing.clone(),
                ))
            })
            .clone()
    }

    /// Session for `address`, if it has ever been discovered.
    pub fn get(&self, address: &str) -> Option<Arc<PeerSession<T>>> {
        self.sessions.read().get(address).cloned()
    }

    /// All sessions discovered so far.
    pub fn sessions(&self) -> Vec<Arc<PeerSession<T>>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Session currently owning the link.
    pub fn connected(&self) -> Option<Arc<PeerSession<T>>> {
        self.sessions
            .read()
            .values()
            .find(|s| s.is_connected())
            .cloned()
    }

    /// Tick every tracked session once.
    ///
    /// The host must call this periodically; no callback fires otherwise.
    pub fn tick(&self) {
        // Snapshot so callbacks may scan or look up sessions
        for session in self.sessions() {
            session.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::mock::MockTransport;

    fn manager(mock: &MockTransport) -> DiscoveryManager<MockTransport> {
        DiscoveryManager::new(Arc::new(mock.clone()), LinkRegistry::new(), &Config::default())
    }

    #[tokio::test]
    async fn test_filters_by_service() {
        let mock = MockTransport::new();
        mock.add_peer("AA:00:00:00:00:01", "toio Core Cube", true);
        mock.add_peer("BB:00:00:00:00:01", "Headphones", false);
        let manager = manager(&mock);

        let found = manager.scan(3).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address(), "AA:00:00:00:00:01");
        assert!(manager.get("BB:00:00:00:00:01").is_none());
    }

    #[tokio::test]
    async fn test_same_session_across_scans() {
        let mock = MockTransport::new();
        mock.add_peer("AA:00:00:00:00:01", "toio Core Cube", true);
        let manager = manager(&mock);

        let first = manager.scan(1).await;
        mock.clear_peers();
        mock.add_peer("AA:00:00:00:00:02", "toio Core Cube", true);
        mock.add_peer("AA:00:00:00:00:01", "toio Core Cube", true);
        let second = manager.scan(1).await;

        assert_eq!(second.len(), 2);
        assert!(Arc::ptr_eq(&first[0], &second[1]));
        assert_eq!(manager.sessions().len(), 2);

        mock.clear_peers();
        assert!(manager.scan(1).await.is_empty());
        assert_eq!(manager.sessions().len(), 2);
    }

    #[tokio::test]
    async fn test_scan_failure_is_empty() {
        let mock = MockTransport::new();
        mock.add_peer("AA:00:00:00:00:01", "toio Core Cube", true);
        mock.fail_scan(true);
        let manager = manager(&mock);

        assert!(manager.scan(0).await.is_empty());
        assert!(manager.sessions().is_empty());
    }
}
