use serde::{Deserialize, Serialize};

use crate::channel::{CHANNEL_COUNT, Channel};

/// The event that caused a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickSource {
    Ecg,
    Acc,
    HeartRate,
    RrInterval,
}

/// One assembled vector. Channels that have never been observed are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub timestamp: jiff::Timestamp,
    pub source: TickSource,
    pub values: [Option<f32>; CHANNEL_COUNT],
}

impl Tick {
    pub fn get(&self, channel: Channel) -> Option<f32> {
        self.values[channel.index()]
    }

    /// Replaces every unknown channel with `0.0`.
    pub fn resolve(&self) -> OutputVector {
        OutputVector(self.values.map(|v| v.unwrap_or(0.0)))
    }
}

/// Fully numeric vector in `[ECG, HR, RRI, AccX, AccY, AccZ]` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputVector(pub [f32; CHANNEL_COUNT]);

impl OutputVector {
    pub fn get(&self, channel: Channel) -> f32 {
        self.0[channel.index()]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}
