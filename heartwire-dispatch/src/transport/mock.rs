use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use heartwire_core::protocol::{
    ACC_SAMPLE_RATE_HZ, ECG_SAMPLE_RATE_HZ, HEART_RATE_MEASUREMENT, PMD_CONTROL, PMD_DATA,
};
use heartwire_core::{NotifyChannel, RawNotification};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DeviceInfo, Transport};

/// Features reported by the PMD control point: ECG and ACC supported.
const PMD_FEATURES: [u8; 2] = [0x0F, 0x05];

#[derive(Debug, thiserror::Error)]
pub enum MockTransportError {
    #[error("injected {0} failure")]
    Injected(MockFailure),
    #[error("not connected")]
    NotConnected,
    #[error("characteristic {0} is not provided by the mock device")]
    UnknownCharacteristic(Uuid),
}

/// Transport step that can be made to fail or to stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    Connect,
    Read,
    Write,
    Subscribe(NotifyChannel),
    Notifications,
}

impl fmt::Display for MockFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockFailure::Connect => f.write_str("connect"),
            MockFailure::Read => f.write_str("read"),
            MockFailure::Write => f.write_str("write"),
            MockFailure::Subscribe(channel) => write!(f, "subscribe {channel}"),
            MockFailure::Notifications => f.write_str("notifications"),
        }
    }
}

/// One call made against the transport, recorded whether or not it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Read(Uuid),
    Write(Uuid, Vec<u8>),
    Subscribe(Uuid),
    Unsubscribe(Uuid),
    Notifications,
    Disconnect,
}

/// Shared record of every call, readable after the transport has been
/// moved into a session.
#[derive(Debug, Clone, Default)]
pub struct MockJournal {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl MockJournal {
    fn record(&self, call: TransportCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Cadence of the synthetic strap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockSettings {
    pub ecg_frame: Duration,
    pub acc_frame: Duration,
    pub hr_interval: Duration,
}

impl MockSettings {
    pub fn from_millis(ecg_frame_ms: u64, acc_frame_ms: u64, hr_interval_ms: u64) -> Self {
        Self {
            ecg_frame: Duration::from_millis(ecg_frame_ms),
            acc_frame: Duration::from_millis(acc_frame_ms),
            hr_interval: Duration::from_millis(hr_interval_ms),
        }
    }
}

impl Default for MockSettings {
    fn default() -> Self {
        Self::from_millis(500, 250, 1000)
    }
}

enum Feed {
    Synthetic(MockSettings),
    Scripted {
        notifications: Vec<RawNotification>,
        hold_open: bool,
    },
}

/// In-process stand-in for a Polar H10.
pub struct MockTransport {
    device: DeviceInfo,
    feed: Feed,
    failures: HashSet<MockFailure>,
    stalls: HashSet<MockFailure>,
    journal: MockJournal,
    subscribed: Arc<Mutex<HashSet<Uuid>>>,
    connected: bool,
    streams: Vec<(CancellationToken, JoinHandle<()>)>,
}

impl MockTransport {
    /// A strap that streams synthetic ECG, accelerometer and heart-rate data.
    pub fn new(settings: MockSettings) -> Self {
        Self::with_feed(Feed::Synthetic(settings))
    }

    /// A strap that delivers exactly `notifications` (filtered to subscribed
    /// characteristics) and then drops the link.
    pub fn scripted(notifications: Vec<RawNotification>) -> Self {
        Self::with_feed(Feed::Scripted {
            notifications,
            hold_open: false,
        })
    }

    fn with_feed(feed: Feed) -> Self {
        Self {
            device: DeviceInfo {
                name: "Polar H10 0A1B2C3D".to_owned(),
                address: "A0:9E:1A:0A:1B:2C".to_owned(),
            },
            feed,
            failures: HashSet::new(),
            stalls: HashSet::new(),
            journal: MockJournal::default(),
            subscribed: Arc::default(),
            connected: false,
            streams: Vec::new(),
        }
    }

    /// Keep the notification stream open after a script runs out, so only
    /// cancellation ends the session.
    pub fn hold_open(mut self) -> Self {
        if let Feed::Scripted { hold_open, .. } = &mut self.feed {
            *hold_open = true;
        }
        self
    }

    pub fn fail_on(mut self, failure: MockFailure) -> Self {
        self.failures.insert(failure);
        self
    }

    /// Never complete `step`, as a strap that stops answering mid-setup.
    /// The call is still journaled.
    pub fn stall_on(mut self, step: MockFailure) -> Self {
        self.stalls.insert(step);
        self
    }

    pub fn journal(&self) -> MockJournal {
        self.journal.clone()
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    async fn stall(&mut self, step: MockFailure) {
        if self.stalls.contains(&step) {
            debug!(%step, "Mock strap stalled");
            std::future::pending::<()>().await;
        }
    }

    fn check(&self, failure: MockFailure) -> Result<(), MockTransportError> {
        if self.failures.contains(&failure) {
            return Err(MockTransportError::Injected(failure));
        }
        if failure != MockFailure::Connect && !self.connected {
            return Err(MockTransportError::NotConnected);
        }
        Ok(())
    }

    fn subscribed(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.subscribed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<DeviceInfo, Self::Error> {
        self.journal.record(TransportCall::Connect);
        self.stall(MockFailure::Connect).await;
        self.check(MockFailure::Connect)?;

        self.connected = true;
        info!(device = %self.device.name, "Mock strap connected");
        Ok(self.device.clone())
    }

    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>, Self::Error> {
        self.journal.record(TransportCall::Read(characteristic));
        self.stall(MockFailure::Read).await;
        self.check(MockFailure::Read)?;

        if characteristic != PMD_CONTROL {
            return Err(MockTransportError::UnknownCharacteristic(characteristic));
        }
        Ok(PMD_FEATURES.to_vec())
    }

    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<(), Self::Error> {
        self.journal
            .record(TransportCall::Write(characteristic, payload.to_vec()));
        self.stall(MockFailure::Write).await;
        self.check(MockFailure::Write)?;

        if characteristic != PMD_CONTROL {
            return Err(MockTransportError::UnknownCharacteristic(characteristic));
        }
        debug!(len = payload.len(), "Mock control write");
        Ok(())
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), Self::Error> {
        self.journal.record(TransportCall::Subscribe(characteristic));
        let channel = NotifyChannel::from_uuid(characteristic)
            .ok_or(MockTransportError::UnknownCharacteristic(characteristic))?;
        self.stall(MockFailure::Subscribe(channel)).await;
        self.check(MockFailure::Subscribe(channel))?;

        self.subscribed().insert(characteristic);
        Ok(())
    }

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<(), Self::Error> {
        self.journal
            .record(TransportCall::Unsubscribe(characteristic));
        if !self.connected {
            return Err(MockTransportError::NotConnected);
        }

        self.subscribed().remove(&characteristic);
        Ok(())
    }

    async fn notifications(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RawNotification>, Self::Error> {
        self.journal.record(TransportCall::Notifications);
        self.stall(MockFailure::Notifications).await;
        self.check(MockFailure::Notifications)?;

        let (tx, rx) = mpsc::channel(256);
        let token = cancel.child_token();
        let cancel = token.clone();
        let subscribed = Arc::clone(&self.subscribed);

        let handle = match &self.feed {
            Feed::Synthetic(settings) => {
                tokio::spawn(run_synthetic_strap(*settings, subscribed, tx, cancel))
            }
            Feed::Scripted {
                notifications,
                hold_open,
            } => tokio::spawn(run_script(
                notifications.clone(),
                *hold_open,
                subscribed,
                tx,
                cancel,
            )),
        };
        self.streams.push((token, handle));

        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.journal.record(TransportCall::Disconnect);

        for (token, task) in self.streams.drain(..) {
            token.cancel();
            let _ = task.await;
        }
        self.subscribed().clear();
        self.connected = false;
        info!(device = %self.device.name, "Mock strap disconnected");
        Ok(())
    }
}

async fn run_script(
    notifications: Vec<RawNotification>,
    hold_open: bool,
    subscribed: Arc<Mutex<HashSet<Uuid>>>,
    tx: mpsc::Sender<RawNotification>,
    cancel: CancellationToken,
) {
    for notification in notifications {
        let active = subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&notification.characteristic);
        if !active {
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = tx.send(notification) => if sent.is_err() { return },
        }
    }

    if hold_open {
        cancel.cancelled().await;
    }
}

async fn run_synthetic_strap(
    settings: MockSettings,
    subscribed: Arc<Mutex<HashSet<Uuid>>>,
    tx: mpsc::Sender<RawNotification>,
    cancel: CancellationToken,
) {
    let mut strap = SyntheticStrap::new();
    let mut ecg = tokio::time::interval(settings.ecg_frame);
    let mut acc = tokio::time::interval(settings.acc_frame);
    let mut hr = tokio::time::interval(settings.hr_interval);

    info!(
        ecg_frame_ms = settings.ecg_frame.as_millis() as u64,
        acc_frame_ms = settings.acc_frame.as_millis() as u64,
        hr_interval_ms = settings.hr_interval.as_millis() as u64,
        "Starting synthetic strap"
    );

    loop {
        let notification = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Synthetic strap shutting down");
                break;
            }
            _ = ecg.tick() => strap.ecg_frame(settings.ecg_frame),
            _ = acc.tick() => strap.acc_frame(settings.acc_frame),
            _ = hr.tick() => strap.heart_rate(),
        };

        let active = subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&notification.characteristic);
        if active && tx.send(notification).await.is_err() {
            info!("Channel closed, synthetic strap shutting down");
            break;
        }
    }
}

/// Produces plausible H10 payloads: a periodic R-peak on a noisy ECG
/// baseline, an upright accelerometer with jitter, and a drifting heart
/// rate with one RR interval per record.
struct SyntheticStrap {
    started: Instant,
    bpm: u8,
    ecg_index: u64,
}

impl SyntheticStrap {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            bpm: 62,
            ecg_index: 0,
        }
    }

    fn pmd_header(&self, tag: u8) -> Vec<u8> {
        let nanos = self.started.elapsed().as_nanos() as u64;
        let mut payload = Vec::with_capacity(256);
        payload.push(tag);
        payload.extend_from_slice(&nanos.to_le_bytes());
        payload.push(0x00);
        payload
    }

    fn samples_per(rate_hz: f64, window: Duration) -> usize {
        ((rate_hz * window.as_secs_f64()).round() as usize).max(1)
    }

    fn ecg_frame(&mut self, window: Duration) -> RawNotification {
        let mut rng = rand::rng();
        let mut payload = self.pmd_header(0x00);
        let beat_len = (ECG_SAMPLE_RATE_HZ * 60.0 / f64::from(self.bpm)) as u64;

        for _ in 0..Self::samples_per(ECG_SAMPLE_RATE_HZ, window) {
            let phase = self.ecg_index % beat_len.max(1);
            let wave: i32 = match phase {
                0 => 1200,
                1 => -300,
                p if p < beat_len / 3 => 150,
                _ => 0,
            };
            let value = wave + rng.random_range(-30..=30);
            payload.extend_from_slice(&value.to_le_bytes()[..3]);
            self.ecg_index += 1;
        }

        RawNotification::new(PMD_DATA, payload)
    }

    fn acc_frame(&mut self, window: Duration) -> RawNotification {
        let mut rng = rand::rng();
        let mut payload = self.pmd_header(0x01);

        for _ in 0..Self::samples_per(ACC_SAMPLE_RATE_HZ, window) {
            let x: i16 = rng.random_range(-40..=40);
            let y: i16 = rng.random_range(-40..=40);
            let z: i16 = 1000 + rng.random_range(-25..=25);
            for axis in [x, y, z] {
                payload.extend_from_slice(&axis.to_le_bytes());
            }
        }

        RawNotification::new(PMD_DATA, payload)
    }

    fn heart_rate(&mut self) -> RawNotification {
        let mut rng = rand::rng();
        self.bpm = (i16::from(self.bpm) + rng.random_range(-2..=2)).clamp(50, 90) as u8;
        let rr = (60.0 / f64::from(self.bpm) * 1024.0).round() as u16;

        let mut payload = vec![0x16, self.bpm];
        payload.extend_from_slice(&rr.to_le_bytes());
        RawNotification::new(HEART_RATE_MEASUREMENT, payload)
    }
}
