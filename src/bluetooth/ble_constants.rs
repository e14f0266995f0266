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

//! BLE service and characteristic UUIDs for the toio Core Cube.

use uuid::Uuid;

/// toio primary GATT service UUID (advertised, used for scan filtering).
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x10b20100_5b3b_4571_9508_cf3efcd7bbae);

/// Battery characteristic UUID.
/// Properties: Read, Notify
pub const BATTERY_UUID: Uuid = Uuid::from_u128(0x10b20108_5b3b_4571_9508_cf3efcd7bbae);

/// Light (LED) characteristic UUID.
/// Properties: Write, Write Without Response
pub const LIGHT_UUID: Uuid = Uuid::from_u128(0x10b20103_5b3b_4571_9508_cf3efcd7bbae);

/// Sound characteristic UUID.
/// Properties: Write, Write Without Response
pub const SOUND_UUID: Uuid = Uuid::from_u128(0x10b20104_5b3b_4571_9508_cf3efcd7bbae);

/// Button characteristic UUID.
/// Properties: Read, Notify
pub const BUTTON_UUID: Uuid = Uuid::from_u128(0x10b20107_5b3b_4571_9508_cf3efcd7bbae);

/// Motion sensor characteristic UUID.
/// Properties: Read, Notify
pub const MOTION_UUID: Uuid = Uuid::from_u128(0x10b20106_5b3b_4571_9508_cf3efcd7bbae);

/// Configuration characteristic UUID.
/// Properties: Read, Write, Notify
pub const CONFIGURATION_UUID: Uuid = Uuid::from_u128(0x10b201ff_5b3b_4571_9508_cf3efcd7bbae);

/// Motor characteristic UUID.
/// Properties: Write, Write Without Response
pub const MOTOR_UUID: Uuid = Uuid::from_u128(0x10b20102_5b3b_4571_9508_cf3efcd7bbae);

/// A characteristic of the toio service addressed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Battery,
    Light,
    Sound,
    Button,
    Motion,
    Configuration,
    Motor,
}

impl Endpoint {
    /// All endpoints, in the order they are resolved at connect time.
    pub const ALL: [Endpoint; 7] = [
        Endpoint::Battery,
        Endpoint::Light,
        Endpoint::Sound,
        Endpoint::Button,
        Endpoint::Motion,
        Endpoint::Configuration,
        Endpoint::Motor,
    ];

    /// Characteristic UUID backing this endpoint.
    pub fn uuid(&self) -> Uuid {
        match self {
            Endpoint::Battery => BATTERY_UUID,
            Endpoint::Light => LIGHT_UUID,
            Endpoint::Sound => SOUND_UUID,
            Endpoint::Button => BUTTON_UUID,
            Endpoint::Motion => MOTION_UUID,
            Endpoint::Configuration => CONFIGURATION_UUID,
            Endpoint::Motor => MOTOR_UUID,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Battery => "battery",
            Endpoint::Light => "light",
            Endpoint::Sound => "sound",
            Endpoint::Button => "button",
            Endpoint::Motion => "motion",
            Endpoint::Configuration => "configuration",
            Endpoint::Motor => "motor",
        }
    }
}

/// Timing constants.
pub mod timing {
    /// Default scan duration in seconds.
    pub const DEFAULT_SCAN_SECS: u8 = 3;

    /// Wait after a successful connect before returning (milliseconds).
    pub const CONNECT_SETTLE_MS: u64 = 1000;

    /// Wait between the version query write and the read-back (milliseconds).
    pub const VERSION_QUERY_MS: u64 = 2000;

    /// Default dispatch tick period (milliseconds).
    pub const DEFAULT_TICK_MS: u64 = 50;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            SERVICE_UUID.to_string().to_lowercase(),
            "10b20100-5b3b-4571-9508-cf3efcd7bbae"
        );
        assert_eq!(
            CONFIGURATION_UUID.to_string().to_lowercase(),
            "10b201ff-5b3b-4571-9508-cf3efcd7bbae"
        );
    }

    #[test]
    fn test_endpoint_order_and_uniqueness() {
        assert_eq!(Endpoint::ALL[0], Endpoint::Battery);
        assert_eq!(Endpoint::ALL[6], Endpoint::Motor);

        let uuids: std::collections::HashSet<Uuid> =
            Endpoint::ALL.iter().map(|e| e.uuid()).collect();
        assert_eq!(uuids.len(), 7);
        assert!(!uuids.contains(&SERVICE_UUID));
    }
}
