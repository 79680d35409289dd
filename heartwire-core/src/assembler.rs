use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, trace};

use crate::cache::{ChannelCache, ChannelState};
use crate::protocol::pmd::Samples;
use crate::protocol::{HrRecord, NotifyChannel, PmdFrame, RawNotification};
use crate::tick::{Tick, TickSource};

/// Receives every assembled tick.
///
/// Called while the channel cache is locked, so implementations must return
/// promptly and must not block on I/O.
pub trait Emitter: Send + Sync {
    fn emit(&self, tick: Tick);
}

impl<E: Emitter + ?Sized> Emitter for Arc<E> {
    fn emit(&self, tick: Tick) {
        (**self).emit(tick)
    }
}

/// Keeps every tick in memory.
#[derive(Debug, Default)]
pub struct TickCollector {
    ticks: Mutex<Vec<Tick>>,
}

impl TickCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Tick> {
        std::mem::take(&mut *self.ticks.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.ticks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Emitter for TickCollector {
    fn emit(&self, tick: Tick) {
        self.ticks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tick);
    }
}

/// Running tick counters, broken down by the event that drove each tick.
#[derive(Debug, Default)]
pub struct EmissionStats {
    ecg: AtomicU64,
    acc: AtomicU64,
    heart_rate: AtomicU64,
    rr_interval: AtomicU64,
    malformed: AtomicU64,
    ignored: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmissionCounts {
    pub ecg: u64,
    pub acc: u64,
    pub heart_rate: u64,
    pub rr_interval: u64,
    /// Notifications dropped because they were too short to decode.
    pub malformed: u64,
    /// Notifications on unknown characteristics or with unknown frame tags.
    pub ignored: u64,
}

impl EmissionCounts {
    pub fn total_ticks(&self) -> u64 {
        self.ecg + self.acc + self.heart_rate + self.rr_interval
    }
}

impl EmissionStats {
    fn record(&self, source: TickSource) {
        let counter = match source {
            TickSource::Ecg => &self.ecg,
            TickSource::Acc => &self.acc,
            TickSource::HeartRate => &self.heart_rate,
            TickSource::RrInterval => &self.rr_interval,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> EmissionCounts {
        EmissionCounts {
            ecg: self.ecg.load(Ordering::Relaxed),
            acc: self.acc.load(Ordering::Relaxed),
            heart_rate: self.heart_rate.load(Ordering::Relaxed),
            rr_interval: self.rr_interval.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

/// Decodes notifications, updates the channel cache and emits one tick per
/// decoded sample or event.
pub struct Assembler<E> {
    cache: ChannelCache,
    emitter: E,
    stats: Arc<EmissionStats>,
}

impl<E: Emitter> Assembler<E> {
    pub fn new(emitter: E) -> Self {
        Self::with_stats(emitter, Arc::default())
    }

    pub fn with_stats(emitter: E, stats: Arc<EmissionStats>) -> Self {
        Self {
            cache: ChannelCache::new(),
            emitter,
            stats,
        }
    }

    /// Routes a notification to its decoder. Returns the number of ticks emitted.
    pub fn ingest(&self, notification: &RawNotification) -> usize {
        match NotifyChannel::from_uuid(notification.characteristic) {
            Some(NotifyChannel::PmdData) => self.ingest_pmd(&notification.payload),
            Some(NotifyChannel::HeartRate) => self.ingest_heart_rate(&notification.payload),
            None => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(
                    characteristic = %notification.characteristic,
                    "Ignoring notification from unexpected characteristic"
                );
                0
            }
        }
    }

    pub fn ingest_pmd(&self, payload: &[u8]) -> usize {
        let frame = match PmdFrame::parse(payload) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Dropping malformed PMD notification");
                return 0;
            }
        };

        trace!(
            kind = ?frame.kind,
            sensor_timestamp = frame.sensor_timestamp,
            sample_bytes = frame.sample_region().len(),
            "PMD frame"
        );

        match frame.samples() {
            Samples::Ecg(samples) => {
                let count = samples.len();
                for sample in samples {
                    self.tick(TickSource::Ecg, |state| state.record_ecg(sample));
                }
                count
            }
            Samples::Acc(samples) => {
                let count = samples.len();
                for sample in samples {
                    self.tick(TickSource::Acc, |state| state.record_acc(sample));
                }
                count
            }
            Samples::Unsupported(tag) => {
                self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                debug!(tag, "Ignoring PMD frame with unknown type tag");
                0
            }
        }
    }

    pub fn ingest_heart_rate(&self, payload: &[u8]) -> usize {
        let record = match HrRecord::parse(payload) {
            Ok(record) => record,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Dropping malformed heart-rate notification");
                return 0;
            }
        };

        trace!(
            heart_rate = record.heart_rate,
            rr_count = record.rr_intervals.len(),
            contact = ?record.sensor_contact(),
            "Heart-rate record"
        );

        self.tick(TickSource::HeartRate, |state| {
            state.record_heart_rate(record.heart_rate)
        });
        for millis in record.rr_intervals_ms() {
            self.tick(TickSource::RrInterval, |state| {
                state.record_rr_interval(millis)
            });
        }

        1 + record.rr_intervals.len()
    }

    fn tick(&self, source: TickSource, update: impl FnOnce(&mut ChannelState)) {
        self.cache.update(|state| {
            update(state);
            self.emitter.emit(Tick {
                timestamp: jiff::Timestamp::now(),
                source,
                values: state.values(),
            });
        });
        self.stats.record(source);
    }

    pub fn state(&self) -> ChannelState {
        self.cache.snapshot()
    }

    pub fn stats(&self) -> &Arc<EmissionStats> {
        &self.stats
    }

    pub fn emitter(&self) -> &E {
        &self.emitter
    }
}
