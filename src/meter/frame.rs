//! PZEM-004T response decoder.
//!
//! Two reply shapes are understood, told apart by their first byte:
//!
//! ```text
//! Extended (Modbus-RTU, 25 bytes)
//! ┌──────┬──────┬───────┬──────────────────────┬────────┬────────┐
//! │ 0xF8 │ 0x04 │ 0x14  │ register data (BE)   │ CRC lo │ CRC hi │
//! │ addr │ func │ bytes │ 20 bytes             │        │        │
//! └──────┴──────┴───────┴──────────────────────┴────────┴────────┘
//!
//! Legacy (7 bytes)
//! ┌──────┬───────────┬───────────┬───────────┐
//! │ 0xA0 │ V ÷10 (BE)│ I ÷100(BE)│ P ÷10 (BE)│
//! │ code │ 2 bytes   │ 2 bytes   │ 2 bytes   │
//! └──────┴───────────┴───────────┴───────────┘
//! ```
//!
//! | Variant  | Request                   | Response | Data                     |
//! |----------|---------------------------|----------|--------------------------|
//! | Extended | 10 regs from 0x0000 + CRC | 25 bytes | V, I, P, E, f, PF, alarm |
//! | Legacy   | `B0 C0 A8 01 01 00 01 5A` | 7 bytes  | V, I, P                  |
//!
//! Extended field offsets (into the full frame):
//!
//! | Field        | Bytes  | Scale      |
//! |--------------|--------|------------|
//! | voltage      | 3..5   | ÷10 → V    |
//! | current      | 5..7   | ÷1000 → A  |
//! | power        | 7..11  | ÷10 → W    |
//! | energy       | 11..15 | Wh         |
//! | frequency    | 15..17 | ÷10 → Hz   |
//! | power factor | 17..19 | ÷1000      |
//! | alarm        | 19..21 | 0 = none   |
//!
//! The legacy reply spends all six bytes after its reply code on data,
//! so it carries no checksum; only its length and reply code are checked.
//!
//! [`decode`] is pure.  Timestamp and energy delta are left at zero for
//! the link supervisor to fill in.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::events::{ElectricalSample, Timestamp};

/// Modbus general-broadcast address every PZEM answers on.
pub const DEVICE_ADDRESS: u8 = 0xF8;

/// Modbus "read input registers".
pub const FN_READ_INPUT_REGISTERS: u8 = 0x04;

/// Byte-count header byte of an extended reply.
pub const EXTENDED_BYTE_COUNT: u8 = 0x14;

/// First byte of a legacy reply.
pub const LEGACY_REPLY_CODE: u8 = 0xA0;

/// Fixed legacy query: command, 4-byte meter address C0.A8.01.01, payload.
pub const LEGACY_REQUEST: [u8; REQUEST_LEN] = [0xB0, 0xC0, 0xA8, 0x01, 0x01, 0x00, 0x01, 0x5A];

/// Every request is eight bytes.
pub const REQUEST_LEN: usize = 8;

/// Longest response of any variant.
pub const MAX_RESPONSE_LEN: usize = 25;

const CRC_LEN: usize = 2;

/// Which query the meter is asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// Short query: voltage, current and power.
    Legacy,
    /// Full query: all ten measurement registers.
    Extended,
}

impl ProtocolVariant {
    /// Full response length including header and checksum.
    pub const fn response_len(self) -> usize {
        match self {
            Self::Legacy => 7,
            Self::Extended => MAX_RESPONSE_LEN,
        }
    }

    /// The 8-byte request frame for this variant.
    pub fn request(self) -> [u8; REQUEST_LEN] {
        match self {
            Self::Legacy => LEGACY_REQUEST,
            Self::Extended => {
                // 10 input registers from 0x0000.
                let mut frame = [
                    DEVICE_ADDRESS,
                    FN_READ_INPUT_REGISTERS,
                    0x00,
                    0x00,
                    0x00,
                    0x0A,
                    0,
                    0,
                ];
                seal(&mut frame);
                frame
            }
        }
    }

    /// Pick the layout from the first header byte, falling back on the
    /// buffer length when that byte is missing or unrecognised.
    fn detect(frame: &[u8]) -> Option<Self> {
        let by_header = match frame.first() {
            Some(&DEVICE_ADDRESS) => Some(Self::Extended),
            Some(&LEGACY_REPLY_CODE) => Some(Self::Legacy),
            _ => None,
        };
        by_header.or(match frame.len() {
            n if n == Self::Extended.response_len() => Some(Self::Extended),
            n if n == Self::Legacy.response_len() => Some(Self::Legacy),
            _ => None,
        })
    }

    fn header_ok(self, frame: &[u8]) -> bool {
        match self {
            Self::Extended => {
                frame[0] == DEVICE_ADDRESS
                    && frame[1] == FN_READ_INPUT_REGISTERS
                    && frame[2] == EXTENDED_BYTE_COUNT
            }
            Self::Legacy => frame[0] == LEGACY_REPLY_CODE,
        }
    }
}

// ---------------------------------------------------------------------------
// CRC
// ---------------------------------------------------------------------------

/// Modbus CRC-16 (reflected poly 0xA001, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
        }
    }
    crc
}

/// Write the CRC of everything before the last two bytes into the last
/// two bytes (low byte first).
pub fn seal(frame: &mut [u8]) {
    if frame.len() < CRC_LEN {
        return;
    }
    let split = frame.len() - CRC_LEN;
    let crc = crc16(&frame[..split]);
    frame[split..].copy_from_slice(&crc.to_le_bytes());
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Validate and decode one meter response.
///
/// Checks run in order: length, header, checksum (extended replies only).
pub fn decode(frame: &[u8]) -> Result<ElectricalSample, DecodeError> {
    let Some(variant) = ProtocolVariant::detect(frame) else {
        return Err(DecodeError::Length { actual: frame.len() });
    };
    if frame.len() != variant.response_len() {
        return Err(DecodeError::Length { actual: frame.len() });
    }

    if !variant.header_ok(frame) {
        return Err(DecodeError::Header {
            address: frame[0],
            function: frame[1],
        });
    }

    match variant {
        ProtocolVariant::Extended => {
            let split = frame.len() - CRC_LEN;
            let expected = crc16(&frame[..split]);
            let actual = u16::from_le_bytes([frame[split], frame[split + 1]]);
            if expected != actual {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
            Ok(extended_fields(frame))
        }
        ProtocolVariant::Legacy => Ok(legacy_fields(frame)),
    }
}

fn be_u16(frame: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([frame[at], frame[at + 1]])
}

fn be_u32(frame: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
}

fn extended_fields(frame: &[u8]) -> ElectricalSample {
    let current_a = f64::from(be_u16(frame, 5)) / 1000.0;
    // Zero load still shows a few tenths of a watt of noise.
    let power_w = if current_a == 0.0 {
        0.0
    } else {
        f64::from(be_u32(frame, 7)) / 10.0
    };

    ElectricalSample {
        voltage_v: f64::from(be_u16(frame, 3)) / 10.0,
        current_a,
        power_w,
        energy_wh: be_u32(frame, 11),
        energy_delta_wh: 0,
        frequency_hz: f64::from(be_u16(frame, 15)) / 10.0,
        power_factor: f64::from(be_u16(frame, 17)) / 1000.0,
        alarm: be_u16(frame, 19) != 0,
        timestamp: Timestamp::ZERO,
    }
}

fn legacy_fields(frame: &[u8]) -> ElectricalSample {
    let current_a = f64::from(be_u16(frame, 3)) / 100.0;
    let power_w = if current_a == 0.0 {
        0.0
    } else {
        f64::from(be_u16(frame, 5)) / 10.0
    };

    ElectricalSample {
        voltage_v: f64::from(be_u16(frame, 1)) / 10.0,
        current_a,
        power_w,
        energy_wh: 0,
        energy_delta_wh: 0,
        frequency_hz: 0.0,
        power_factor: 0.0,
        alarm: false,
        timestamp: Timestamp::ZERO,
    }
}
