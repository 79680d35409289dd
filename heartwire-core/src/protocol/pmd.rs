//! Polar Measurement Data (PMD) frames.
//!
//! frame structure : type(1) + timestamp(8) + frame type(1) + samples

use core::slice::ChunksExact;

use super::{ACC_SAMPLE_SIZE, ECG_SAMPLE_SIZE, PMD_HEADER_SIZE, ParseResult, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Ecg,
    Acc,
    Unknown(u8),
}

impl From<u8> for FrameKind {
    fn from(value: u8) -> Self {
        match value {
            0x00 => FrameKind::Ecg,
            0x01 => FrameKind::Acc,
            other => FrameKind::Unknown(other),
        }
    }
}

/// One ECG sample in microvolts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcgSample(pub i32);

impl EcgSample {
    /// Sign-extends a 24-bit little-endian integer.
    pub fn from_le_bytes(bytes: [u8; 3]) -> Self {
        EcgSample(i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8)
    }
}

/// One accelerometer sample in milli-g.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl AccSample {
    pub fn from_le_bytes(bytes: [u8; 6]) -> Self {
        Self {
            x: i16::from_le_bytes([bytes[0], bytes[1]]),
            y: i16::from_le_bytes([bytes[2], bytes[3]]),
            z: i16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }
}

/// A borrowed view over a PMD data notification.
#[derive(Debug, Clone, Copy)]
pub struct PmdFrame<'a> {
    pub kind: FrameKind,
    /// Sensor clock in nanoseconds. Not interpreted by the decoder.
    pub sensor_timestamp: u64,
    pub frame_type: u8,
    samples: &'a [u8],
}

impl<'a> PmdFrame<'a> {
    pub fn parse(bytes: &'a [u8]) -> ParseResult<Self> {
        if bytes.len() < PMD_HEADER_SIZE {
            return Err(ProtocolError::InsufficientData {
                needed: PMD_HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[1..9]);

        Ok(Self {
            kind: FrameKind::from(bytes[0]),
            sensor_timestamp: u64::from_le_bytes(timestamp),
            frame_type: bytes[9],
            samples: &bytes[PMD_HEADER_SIZE..],
        })
    }

    pub fn sample_region(&self) -> &'a [u8] {
        self.samples
    }

    /// Decodes the sample region according to the type tag. Trailing bytes
    /// that do not fill a whole sample are ignored.
    pub fn samples(&self) -> Samples<'a> {
        match self.kind {
            FrameKind::Ecg => Samples::Ecg(EcgSamples {
                chunks: self.samples.chunks_exact(ECG_SAMPLE_SIZE),
            }),
            FrameKind::Acc => Samples::Acc(AccSamples {
                chunks: self.samples.chunks_exact(ACC_SAMPLE_SIZE),
            }),
            FrameKind::Unknown(tag) => Samples::Unsupported(tag),
        }
    }
}

pub enum Samples<'a> {
    Ecg(EcgSamples<'a>),
    Acc(AccSamples<'a>),
    Unsupported(u8),
}

impl Samples<'_> {
    pub fn len(&self) -> usize {
        match self {
            Samples::Ecg(samples) => samples.len(),
            Samples::Acc(samples) => samples.len(),
            Samples::Unsupported(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct EcgSamples<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for EcgSamples<'_> {
    type Item = EcgSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks
            .next()
            .map(|c| EcgSample::from_le_bytes([c[0], c[1], c[2]]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for EcgSamples<'_> {}

pub struct AccSamples<'a> {
    chunks: ChunksExact<'a, u8>,
}

impl Iterator for AccSamples<'_> {
    type Item = AccSample;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks
            .next()
            .map(|c| AccSample::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5]]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for AccSamples<'_> {}
