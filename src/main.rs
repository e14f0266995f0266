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

//! toio driver demo host.
//!
//! Scans for cubes, connects to the first one found, logs its events and
//! keeps the dispatch loop running until Ctrl-C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toio_driver::bluetooth::session::defaults;
use toio_driver::bluetooth::{BluezTransport, DiscoveryManager};
use toio_driver::config::Config;
use toio_driver::events::run_dispatch;
use toio_driver::state::LinkRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("toio_driver=info".parse()?))
        .init();

    info!("Starting toio driver v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let transport = Arc::new(BluezTransport::new(&config.bluetooth).await?);
    let registry = LinkRegistry::new();
    let manager = DiscoveryManager::new(transport, registry, &config);

    let cubes = manager.scan_default().await;
    let Some(cube) = cubes.first().cloned() else {
        warn!("No toio Core Cube found");
        return Ok(());
    };
    info!("Using cube {} ({})", cube.name(), cube.address());

    cube.on_connection(|connected| {
        info!("Connection state: {}", if connected { "connected" } else { "disconnected" });
    });
    cube.on_battery(|level| info!("Battery: {}%", level));
    cube.on_button(|pressed| info!("Button {}", if pressed { "pressed" } else { "released" }));
    cube.on_motion(|motion| {
        info!(
            "Motion: flat={} clash={} double_tap={} attitude={}",
            motion.flat, motion.clash, motion.double_tap, motion.attitude
        );
    });

    if !cube.connect().await {
        error!("Could not connect to {}", cube.address());
        return Ok(());
    }

    let version = cube.protocol_version().await;
    if version.is_empty() {
        warn!("Protocol version unavailable");
    } else {
        info!("BLE protocol version: {}", version);
    }
    info!("Battery level: {}%", cube.battery_level().await);

    // Start from the cube's stock motion detection settings
    cube.set_flat_threshold(defaults::FLAT_THRESHOLD).await;
    cube.set_clash_threshold(defaults::CLASH_THRESHOLD).await;
    cube.set_double_tap_threshold(defaults::DOUBLE_TAP_THRESHOLD).await;

    cube.turn_on_led(0x00, 0xff, 0x00).await;
    cube.play_sound_effect(0, defaults::VOLUME).await;

    info!("Ready. Press Ctrl-C to quit.");
    run_dispatch(&manager, config.dispatch.tick_interval(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    })
    .await;

    cube.turn_off_led().await;
    cube.disconnect().await;
    // Deliver the final connection event
    manager.tick();

    info!("toio driver stopped");
    Ok(())
}
