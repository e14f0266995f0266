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


//! Bluetooth communication module.
//!
//! Discovers toio Core Cubes over BLE, manages the single active link and
//! translates commands and notifications to and from the cube's GATT
//! characteristics.

pub mod ble_constants;
pub mod bluez;
pub mod discovery;
pub mod mock;
pub mod protocol;
pub mod session;
pub mod transport;

pub use ble_constants::Endpoint;
pub use bluez::{BluezLink, BluezTransport};
pub use discovery::DiscoveryManager;
pub use protocol::{Direction, MotionReading, MotorSpeed, Threshold};
pub use session::PeerSession;
pub use transport::{DiscoveredPeer, NotifyHandler, PeerDescriptor, Transport};
