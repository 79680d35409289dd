//! Decoding and channel synchronization for Polar H10 chest straps.
//!
//! Two notification streams arrive independently: PMD frames carrying ECG
//! (130 Hz) and accelerometer (52 Hz) samples, and standard heart-rate
//! records carrying HR and RR intervals. The [`Assembler`] keeps the latest
//! value of every channel and emits a full six-channel [`Tick`] for each
//! decoded sample or event.
//!
//! The output is oversampled. Every ECG sample, ACC sample, HR record and
//! RR interval produces its own tick, so the tick rate is the sum of those
//! cadences and ticks are not evenly spaced. [`StreamInfo::nominal_rate`]
//! only advertises the ECG rate.

pub mod assembler;
pub mod cache;
pub mod channel;
pub mod protocol;
pub mod tick;

pub use assembler::{Assembler, EmissionCounts, EmissionStats, Emitter, TickCollector};
pub use cache::{ChannelCache, ChannelState};
pub use channel::{CHANNEL_COUNT, Channel, ChannelInfo, StreamInfo};
pub use protocol::{NotifyChannel, ProtocolError, RawNotification};
pub use tick::{OutputVector, Tick, TickSource};
