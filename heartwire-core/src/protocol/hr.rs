//! Standard heart-rate measurement records.
//!
//! record structure : flags(1) + heart rate(1 or 2) + rr intervals(2 each)

use super::{ParseResult, ProtocolError};

/// Heart rate is a little-endian u16 instead of a u8.
pub const FLAG_HR_U16: u8 = 0x01;
pub const FLAG_CONTACT_DETECTED: u8 = 0x02;
pub const FLAG_CONTACT_SUPPORTED: u8 = 0x04;
/// RR intervals follow the heart-rate value.
pub const FLAG_RR_PRESENT: u8 = 0x10;

/// RR intervals are transmitted in units of 1/1024 s.
pub const RR_UNITS_PER_SECOND: f32 = 1024.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrRecord {
    pub flags: u8,
    /// Beats per minute.
    pub heart_rate: u16,
    /// Raw RR intervals in 1/1024 s, in transmission order.
    pub rr_intervals: Vec<u16>,
}

impl HrRecord {
    pub fn parse(bytes: &[u8]) -> ParseResult<Self> {
        let Some(&flags) = bytes.first() else {
            return Err(ProtocolError::InsufficientData {
                needed: 1,
                available: 0,
            });
        };

        let hr_end = if flags & FLAG_HR_U16 != 0 { 3 } else { 2 };
        if bytes.len() < hr_end {
            return Err(ProtocolError::InsufficientData {
                needed: hr_end,
                available: bytes.len(),
            });
        }

        let heart_rate = if flags & FLAG_HR_U16 != 0 {
            u16::from_le_bytes([bytes[1], bytes[2]])
        } else {
            u16::from(bytes[1])
        };

        // A trailing odd byte is not a whole interval and is ignored.
        let rr_intervals = if flags & FLAG_RR_PRESENT != 0 {
            bytes[hr_end..]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            flags,
            heart_rate,
            rr_intervals,
        })
    }

    /// `None` when the strap does not report skin contact.
    pub fn sensor_contact(&self) -> Option<bool> {
        if self.flags & FLAG_CONTACT_SUPPORTED == 0 {
            return None;
        }
        Some(self.flags & FLAG_CONTACT_DETECTED != 0)
    }

    pub fn rr_intervals_ms(&self) -> impl ExactSizeIterator<Item = f32> + '_ {
        self.rr_intervals.iter().copied().map(rr_to_millis)
    }
}

pub fn rr_to_millis(raw: u16) -> f32 {
    f32::from(raw) / RR_UNITS_PER_SECOND * 1000.0
}
