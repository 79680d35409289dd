use heartwire_core::{CHANNEL_COUNT, OutputVector, StreamInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Always the first message on a connection.
    StreamInfo(StreamInfo),
    Sample(Sample),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Microseconds since the Unix epoch.
    pub timestamp_us: i64,
    pub values: [f32; CHANNEL_COUNT],
}

impl Sample {
    pub fn new(timestamp: jiff::Timestamp, vector: OutputVector) -> Self {
        Self {
            timestamp_us: timestamp.as_microsecond(),
            values: vector.0,
        }
    }
}
