use std::sync::{Mutex, PoisonError};

use crate::channel::{CHANNEL_COUNT, Channel};
use crate::protocol::{AccSample, EcgSample};

/// Latest observed value per channel. `None` until the owning decoder has
/// written it; values are only ever overwritten, never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelState {
    last_ecg: Option<f32>,
    hr: Option<f32>,
    rri: Option<f32>,
    acc_x: Option<f32>,
    acc_y: Option<f32>,
    acc_z: Option<f32>,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_ecg(&self) -> Option<f32> {
        self.last_ecg
    }

    pub fn hr(&self) -> Option<f32> {
        self.hr
    }

    pub fn rri(&self) -> Option<f32> {
        self.rri
    }

    pub fn acc(&self) -> [Option<f32>; 3] {
        [self.acc_x, self.acc_y, self.acc_z]
    }

    /// A decoded 0 is a real reading and replaces the previous value.
    pub(crate) fn record_ecg(&mut self, sample: EcgSample) {
        // 24-bit integers are exact in f32.
        self.last_ecg = Some(sample.0 as f32);
    }

    pub(crate) fn record_acc(&mut self, sample: AccSample) {
        self.acc_x = Some(f32::from(sample.x));
        self.acc_y = Some(f32::from(sample.y));
        self.acc_z = Some(f32::from(sample.z));
    }

    pub(crate) fn record_heart_rate(&mut self, bpm: u16) {
        self.hr = Some(f32::from(bpm));
    }

    pub(crate) fn record_rr_interval(&mut self, millis: f32) {
        self.rri = Some(millis);
    }

    /// Current values in output channel order.
    pub fn values(&self) -> [Option<f32>; CHANNEL_COUNT] {
        let mut values = [None; CHANNEL_COUNT];
        values[Channel::Ecg.index()] = self.last_ecg;
        values[Channel::Hr.index()] = self.hr;
        values[Channel::Rri.index()] = self.rri;
        values[Channel::AccX.index()] = self.acc_x;
        values[Channel::AccY.index()] = self.acc_y;
        values[Channel::AccZ.index()] = self.acc_z;
        values
    }
}

/// Shared cache for one session. Every update runs as a single critical
/// section so concurrent decoders never observe a half-written state.
#[derive(Debug, Default)]
pub struct ChannelCache {
    state: Mutex<ChannelState>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        // The state is plain data, so a panic elsewhere cannot leave it invalid.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn snapshot(&self) -> ChannelState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
