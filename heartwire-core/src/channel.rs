use serde::{Deserialize, Serialize};

use crate::protocol::ECG_SAMPLE_RATE_HZ;

pub const CHANNEL_COUNT: usize = 6;

/// Logical output channels, in the order they appear in every vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Ecg,
    Hr,
    Rri,
    AccX,
    AccY,
    AccZ,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Ecg,
        Channel::Hr,
        Channel::Rri,
        Channel::AccX,
        Channel::AccY,
        Channel::AccZ,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn label(self) -> &'static str {
        match self {
            Channel::Ecg => "ECG",
            Channel::Hr => "HR",
            Channel::Rri => "RRI",
            Channel::AccX => "AccX",
            Channel::AccY => "AccY",
            Channel::AccZ => "AccZ",
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Channel::Ecg => "microvolts",
            Channel::Hr => "bpm",
            Channel::Rri => "ms",
            Channel::AccX | Channel::AccY | Channel::AccZ => "mG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub label: String,
    pub unit: String,
    /// Channel type tag. Mirrors the label.
    pub kind: String,
}

impl From<Channel> for ChannelInfo {
    fn from(channel: Channel) -> Self {
        Self {
            label: channel.label().to_owned(),
            unit: channel.unit().to_owned(),
            kind: channel.label().to_owned(),
        }
    }
}

/// Static description of the published stream.
///
/// `nominal_rate` matches the ECG rate, but the stream is event driven:
/// ECG samples, ACC samples, heart-rate records and RR intervals each emit
/// a vector, so consumers see roughly 130 + 52 + 1 + ~1 vectors per second
/// at irregular spacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub stream_type: String,
    pub nominal_rate: f64,
    pub channel_format: String,
    pub source_id: String,
    pub manufacturer: String,
    pub channels: Vec<ChannelInfo>,
}

impl StreamInfo {
    pub fn for_device(device_name: &str, source_id: &str) -> Self {
        Self {
            name: format!("{device_name}_POLAR"),
            stream_type: "Physio".to_owned(),
            nominal_rate: ECG_SAMPLE_RATE_HZ,
            channel_format: "float32".to_owned(),
            source_id: source_id.to_owned(),
            manufacturer: "Polar".to_owned(),
            channels: Channel::ALL.into_iter().map(ChannelInfo::from).collect(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
