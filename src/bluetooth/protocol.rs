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

//! Binary command encoding and notification decoding.
//!
//! Every function here is pure: commands become fixed-length byte arrays and
//! notification payloads become typed readings. Malformed payloads decode to
//! `None` and are otherwise ignored.

/// Protocol version query written to the configuration endpoint.
pub const VERSION_QUERY: [u8; 2] = [0x01, 0x00];

/// First byte of a valid protocol version response.
pub const VERSION_RESPONSE: u8 = 0x81;

/// Sound stop command.
pub const SOUND_STOP: [u8; 1] = [0x01];

/// Default sound effect volume.
pub const DEFAULT_VOLUME: u8 = 0xff;

/// Button payload format marker.
const BUTTON_MARKER: u8 = 0x01;

/// Button state byte for "pressed".
const BUTTON_PRESSED: u8 = 0x80;

/// Top motor speed produced by `drive` at full throttle.
const DRIVE_MAX_SPEED: f64 = 115.0;

/// Motor rotation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Forward = 0x01,
    Reverse = 0x02,
}

impl Direction {
    /// `true` maps to forward, `false` to reverse.
    pub fn from_forward(forward: bool) -> Self {
        if forward {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }
}

/// Direction and speed for one motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorSpeed {
    pub direction: Direction,
    pub speed: u8,
}

impl MotorSpeed {
    pub fn new(direction: Direction, speed: u8) -> Self {
        Self { direction, speed }
    }
}

/// Motion sensor reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionReading {
    /// Cube is lying flat.
    pub flat: bool,
    /// A collision was detected.
    pub clash: bool,
    /// A double tap was detected.
    pub double_tap: bool,
    /// Attitude (which face is up).
    pub attitude: u8,
}

/// Motion detection thresholds configurable on the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Flat detection angle, degrees (1–45).
    Flat,
    /// Collision sensitivity (1–10).
    Clash,
    /// Double tap interval (1–7).
    DoubleTap,
}

impl Threshold {
    /// Configuration command code.
    pub fn code(&self) -> u8 {
        match self {
            Threshold::Flat => 0x05,
            Threshold::Clash => 0x06,
            Threshold::DoubleTap => 0x17,
        }
    }

    /// Accepted value range, inclusive.
    pub fn range(&self) -> (u8, u8) {
        match self {
            Threshold::Flat => (1, 45),
            Threshold::Clash => (1, 10),
            Threshold::DoubleTap => (1, 7),
        }
    }

    /// Value the cube uses when nothing is configured.
    pub const fn default_value(&self) -> u8 {
        match self {
            Threshold::Flat => 45,
            Threshold::Clash => 7,
            Threshold::DoubleTap => 5,
        }
    }

    pub fn clamp(&self, value: u8) -> u8 {
        let (min, max) = self.range();
        value.clamp(min, max)
    }
}

/// Motor command without duration: `[0x01, 0x01, dirL, speedL, 0x02, dirR, speedR]`.
pub fn encode_motor(left: MotorSpeed, right: MotorSpeed) -> [u8; 7] {
    [
        0x01,
        0x01,
        left.direction as u8,
        left.speed,
        0x02,
        right.direction as u8,
        right.speed,
    ]
}

/// Motor command with duration in 10 ms units (saturating at 2550 ms).
pub fn encode_timed_motor(left: MotorSpeed, right: MotorSpeed, duration_ms: u16) -> [u8; 8] {
    let duration = (duration_ms / 10).min(u8::MAX as u16) as u8;
    [
        0x02,
        0x01,
        left.direction as u8,
        left.speed,
        0x02,
        right.direction as u8,
        right.speed,
        duration,
    ]
}

/// Convert throttle/steering (each -100..=100) into per-motor speeds.
///
/// Negative steering slows the left motor, positive steering the right one.
pub fn drive_speeds(throttle: i8, steering: i8) -> (MotorSpeed, MotorSpeed) {
    let direction = if throttle < 0 {
        Direction::Reverse
    } else {
        Direction::Forward
    };
    let throttle = (throttle as i16).abs().min(100);
    let steering = (steering as i16).clamp(-100, 100);

    let speed = DRIVE_MAX_SPEED * throttle as f64 / 100.0;
    let attenuated = speed * (100 - steering.abs()) as f64 / 100.0;

    let (left, right) = match steering {
        s if s < 0 => (attenuated, speed),
        s if s > 0 => (speed, attenuated),
        _ => (speed, speed),
    };

    (
        MotorSpeed::new(direction, left as u8),
        MotorSpeed::new(direction, right as u8),
    )
}

/// Drive command for the given throttle and steering.
pub fn encode_drive(throttle: i8, steering: i8) -> [u8; 7] {
    let (left, right) = drive_speeds(throttle, steering);
    encode_motor(left, right)
}

/// LED on: `[0x03, 0x00, 0x01, 0x01, r, g, b]`.
pub fn encode_led(r: u8, g: u8, b: u8) -> [u8; 7] {
    // type, duration (0 = until changed), lamp count, lamp id, rgb
    [0x03, 0x00, 0x01, 0x01, r, g, b]
}

/// LED off is LED on with black.
pub fn encode_led_off() -> [u8; 7] {
    encode_led(0x00, 0x00, 0x00)
}

/// Sound effect: `[0x02, sound_id, volume]`.
pub fn encode_sound_effect(sound_id: u8, volume: u8) -> [u8; 3] {
    [0x02, sound_id, volume]
}

/// Threshold configuration with the value clamped into range.
pub fn encode_threshold(threshold: Threshold, value: u8) -> [u8; 3] {
    [threshold.code(), 0x00, threshold.clamp(value)]
}

/// Battery level notification (exactly 1 byte).
pub fn decode_battery(data: &[u8]) -> Option<u8> {
    match data {
        [level] => Some(*level),
        _ => None,
    }
}

/// Button notification (exactly 2 bytes, marker first). Returns pressed state.
pub fn decode_button(data: &[u8]) -> Option<bool> {
    match data {
        [BUTTON_MARKER, state] => Some(*state == BUTTON_PRESSED),
        _ => None,
    }
}

/// Motion notification (exactly 5 bytes).
pub fn decode_motion(data: &[u8]) -> Option<MotionReading> {
    match data {
        [_, flat, clash, double_tap, attitude] => Some(MotionReading {
            flat: *flat != 0,
            clash: *clash != 0,
            double_tap: *double_tap != 0,
            attitude: *attitude,
        }),
        _ => None,
    }
}

/// Protocol version response: `[0x81, _, version...]`.
///
/// Both conditions are required: at least 3 bytes and the response marker.
pub fn decode_version(data: &[u8]) -> Option<String> {
    if data.len() < 3 || data[0] != VERSION_RESPONSE {
        return None;
    }
    Some(String::from_utf8_lossy(&data[2..]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_length() {
        assert_eq!(decode_battery(&[80]), Some(80));
        assert_eq!(decode_battery(&[]), None);
        assert_eq!(decode_battery(&[80, 1]), None);
        for len in 2..16 {
            assert_eq!(decode_battery(&vec![0u8; len]), None);
        }
    }

    #[test]
    fn test_button() {
        assert_eq!(decode_button(&[0x01, 0x80]), Some(true));
        assert_eq!(decode_button(&[0x01, 0x00]), Some(false));
        assert_eq!(decode_button(&[0x01]), None);
        assert_eq!(decode_button(&[0x01, 0x80, 0x00]), None);
        for marker in (0u8..=255).filter(|m| *m != 0x01) {
            assert_eq!(decode_button(&[marker, 0x80]), None);
        }
    }

    #[test]
    fn test_motion() {
        assert_eq!(
            decode_motion(&[0x01, 1, 0, 1, 5]),
            Some(MotionReading {
                flat: true,
                clash: false,
                double_tap: true,
                attitude: 5,
            })
        );
        assert_eq!(decode_motion(&[0x01, 1, 0, 1]), None);
        assert_eq!(decode_motion(&[0x01, 1, 0, 1, 5, 0]), None);
    }

    #[test]
    fn test_thresholds_clamp() {
        assert_eq!(encode_threshold(Threshold::Flat, 100), [0x05, 0x00, 45]);
        assert_eq!(encode_threshold(Threshold::Flat, 0), [0x05, 0x00, 1]);
        assert_eq!(encode_threshold(Threshold::Clash, 11), [0x06, 0x00, 10]);
        assert_eq!(encode_threshold(Threshold::DoubleTap, 9), [0x17, 0x00, 7]);
        assert_eq!(encode_threshold(Threshold::DoubleTap, 5), [0x17, 0x00, 5]);
    }

    #[test]
    fn test_drive() {
        let (left, right) = drive_speeds(100, 0);
        assert_eq!(left, right);
        assert_eq!(left, MotorSpeed::new(Direction::Forward, 115));

        let (left, right) = drive_speeds(50, -100);
        assert_eq!(left.speed, 0);
        assert_eq!(right.speed, 57);

        let (left, right) = drive_speeds(-50, 0);
        assert_eq!(left.direction, Direction::Reverse);
        assert_eq!(right.direction, Direction::Reverse);
        assert_eq!(left.speed, 57);

        // i8::MIN must not overflow
        let (left, _) = drive_speeds(-128, 0);
        assert_eq!(left.speed, 115);

        assert_eq!(
            encode_drive(100, 50),
            [0x01, 0x01, 0x01, 115, 0x02, 0x01, 57]
        );
    }

    #[test]
    fn test_timed_motor() {
        let left = MotorSpeed::new(Direction::Forward, 30);
        let right = MotorSpeed::new(Direction::Reverse, 40);
        assert_eq!(
            encode_timed_motor(left, right, 1000),
            [0x02, 0x01, 0x01, 30, 0x02, 0x02, 40, 100]
        );
        assert_eq!(encode_timed_motor(left, right, 9)[7], 0);
        assert_eq!(encode_timed_motor(left, right, u16::MAX)[7], 255);
    }

    #[test]
    fn test_led_and_sound() {
        assert_eq!(encode_led(1, 2, 3), [0x03, 0x00, 0x01, 0x01, 1, 2, 3]);
        assert_eq!(encode_led_off(), [0x03, 0x00, 0x01, 0x01, 0, 0, 0]);
        assert_eq!(encode_sound_effect(4, DEFAULT_VOLUME), [0x02, 4, 0xff]);
    }

    #[test]
    fn test_version() {
        assert_eq!(
            decode_version(&[0x81, 0x00, b'2', b'.', b'1']),
            Some("2.1".to_string())
        );
        assert_eq!(decode_version(&[0x81, 0x00]), None);
        assert_eq!(decode_version(&[0x82, 0x00, b'2']), None);
        assert_eq!(decode_version(&[]), None);
    }
}
