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

//! Host-side driver for toio Core Cube robots.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use toio_driver::bluetooth::{BluezTransport, DiscoveryManager};
//! use toio_driver::config::Config;
//! use toio_driver::state::LinkRegistry;
//!
//! let config = Config::default();
//! let transport = Arc::new(BluezTransport::new(&config.bluetooth).await?);
//! let manager = DiscoveryManager::new(transport, LinkRegistry::new(), &config);
//!
//! for cube in manager.scan(3).await {
//!     cube.on_button(|pressed| println!("button: {}", pressed));
//!     if cube.connect().await {
//!         cube.turn_on_led(0, 255, 0).await;
//!     }
//! }
//! // Call periodically from the host loop
//! manager.tick();
//! # Ok(())
//! # }
//! ```

pub mod bluetooth;
pub mod config;
pub mod events;
pub mod state;
