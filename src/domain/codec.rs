//! Nuimo Payload Codec
//!
//! Bit-exact encoding of outgoing notification values and decoding of the
//! LED matrix write payload.

use crate::domain::error::CodecError;
use crate::domain::models::BatteryStatus;

/// Number of cells on the 9x11 LED matrix
pub const LED_CELL_COUNT: usize = 99;

/// Cells actually carried by the 11 packed bytes of a write
pub const LED_PACKED_CELL_COUNT: usize = 88;

/// Size of an LED matrix write payload
pub const LED_MATRIX_PAYLOAD_LEN: usize = 13;

const LED_PACKED_BYTES: usize = 11;
const BRIGHTNESS_INDEX: usize = 11;
const INTERVAL_INDEX: usize = 12;

/// Rotation notification units per full turn
pub const SINGLE_ROTATION_VALUE: i32 = 2800;

/// Wire format of a notification value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationFormat {
    /// One unsigned byte
    Uint8,
    /// Two bytes, signed little-endian
    Sint16,
}

/// A decoded LED matrix write
#[derive(Debug, Clone, PartialEq)]
pub struct LedMatrixCommand {
    pub cells: [bool; LED_CELL_COUNT],
    /// 0.0 - 1.0
    pub brightness: f32,
    pub display_interval_secs: f32,
}

impl LedMatrixCommand {
    pub fn new(cells: [bool; LED_CELL_COUNT], brightness: f32, display_interval_secs: f32) -> Self {
        Self {
            cells,
            brightness,
            display_interval_secs,
        }
    }

    pub fn lit_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }
}

/// Encode a notification value into its wire bytes.
///
/// Callers guarantee the value fits the format; out of range values are
/// truncated to the low bits.
pub fn encode_notification_value(value: i32, format: NotificationFormat) -> Vec<u8> {
    match format {
        NotificationFormat::Uint8 => vec![value as u8],
        NotificationFormat::Sint16 => (value as i16).to_le_bytes().to_vec(),
    }
}

/// Decode a 13-byte LED matrix write
///
/// # Payload Structure (13 bytes)
///
/// ```text
/// [0-10] : Matrix cells, 8 per byte, least significant bit first
/// [11]   : Brightness, 0-255 mapped to 0.0-1.0
/// [12]   : Display interval in tenths of a second
/// ```
///
/// Only 88 cells fit into the packed bytes; cells 88..99 are always off.
pub fn decode_led_matrix_write(payload: &[u8], offset: u16) -> Result<LedMatrixCommand, CodecError> {
    if payload.len() != LED_MATRIX_PAYLOAD_LEN {
        return Err(CodecError::InvalidLength { len: payload.len() });
    }
    if offset != 0 {
        return Err(CodecError::InvalidOffset { offset });
    }

    let mut cells = [false; LED_CELL_COUNT];
    for (i, byte) in payload[..LED_PACKED_BYTES].iter().enumerate() {
        for bit in 0..8 {
            cells[i * 8 + bit] = byte & (1 << bit) != 0;
        }
    }

    Ok(LedMatrixCommand {
        cells,
        brightness: payload[BRIGHTNESS_INDEX] as f32 / 255.0,
        display_interval_secs: payload[INTERVAL_INDEX] as f32 / 10.0,
    })
}

/// Pack a matrix command back into its 13-byte wire form
pub fn encode_led_matrix(command: &LedMatrixCommand) -> [u8; LED_MATRIX_PAYLOAD_LEN] {
    let mut payload = [0u8; LED_MATRIX_PAYLOAD_LEN];
    for (i, lit) in command.cells[..LED_PACKED_CELL_COUNT].iter().enumerate() {
        if *lit {
            payload[i / 8] |= 1 << (i % 8);
        }
    }
    payload[BRIGHTNESS_INDEX] = (command.brightness * 255.0).round().clamp(0.0, 255.0) as u8;
    payload[INTERVAL_INDEX] = (command.display_interval_secs * 10.0)
        .round()
        .clamp(0.0, 255.0) as u8;
    payload
}

/// Battery percentage for the Battery Level characteristic
pub fn battery_percent(status: Option<BatteryStatus>) -> u8 {
    match status {
        Some(BatteryStatus { level, scale }) if level >= 0 && scale > 0 => {
            let percent = level as i64 * 100 / scale as i64;
            percent.clamp(0, 100) as u8
        }
        _ => 0,
    }
}
