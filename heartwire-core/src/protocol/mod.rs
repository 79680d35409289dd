//! Wire-level constants and decoders for the Polar H10 notification formats.

mod error;
pub mod hr;
pub mod pmd;

pub use error::{ParseResult, ProtocolError};
pub use hr::HrRecord;
pub use pmd::{AccSample, EcgSample, FrameKind, PmdFrame};

use uuid::Uuid;

/// PMD control point. Written during the handshake to start streams.
pub const PMD_CONTROL: Uuid = Uuid::from_u128(0xfb005c81_02e7_f387_1cad_8acd2d8df0c8);

/// PMD data characteristic carrying ECG and ACC frames.
pub const PMD_DATA: Uuid = Uuid::from_u128(0xfb005c82_02e7_f387_1cad_8acd2d8df0c8);

/// Standard heart-rate measurement characteristic.
pub const HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// Start ECG streaming at 130 Hz.
pub const ECG_START_COMMAND: [u8; 10] = [
    0x02, 0x00, 0x00, 0x01, 0x82, 0x00, 0x01, 0x01, 0x0E, 0x00,
];

/// Start ACC streaming at 52 Hz with a ±8 g range.
pub const ACC_START_COMMAND: [u8; 14] = [
    0x02, 0x02, 0x00, 0x01, 0xC8, 0x00, 0x01, 0x01, 0x10, 0x00, 0x02, 0x01, 0x08, 0x00,
];

pub const ECG_SAMPLE_RATE_HZ: f64 = 130.0;
pub const ACC_SAMPLE_RATE_HZ: f64 = 52.0;

/// Type tag + 9 metadata bytes preceding the sample region of a PMD frame.
pub const PMD_HEADER_SIZE: usize = 10;
pub const ECG_SAMPLE_SIZE: usize = 3;
pub const ACC_SAMPLE_SIZE: usize = 6;

/// Which decoder a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyChannel {
    PmdData,
    HeartRate,
}

impl NotifyChannel {
    pub const ALL: [NotifyChannel; 2] = [NotifyChannel::PmdData, NotifyChannel::HeartRate];

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.uuid() == uuid)
    }

    pub fn uuid(self) -> Uuid {
        match self {
            NotifyChannel::PmdData => PMD_DATA,
            NotifyChannel::HeartRate => HEART_RATE_MEASUREMENT,
        }
    }
}

impl std::fmt::Display for NotifyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyChannel::PmdData => f.write_str("pmd-data"),
            NotifyChannel::HeartRate => f.write_str("heart-rate"),
        }
    }
}

/// A notification payload as delivered by the transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}

impl RawNotification {
    pub fn new(characteristic: Uuid, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            characteristic,
            payload: payload.into(),
        }
    }
}
