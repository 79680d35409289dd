pub mod memory;
pub mod outlet;
pub mod queue;

use std::sync::Arc;

use async_trait::async_trait;
use heartwire_core::{OutputVector, StreamInfo, Tick};
use heartwire_outlet::OutletError;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::session::SessionStatus;
use queue::TickQueue;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink has not been registered")]
    NotRegistered,
    #[error("sink is already registered")]
    AlreadyRegistered,
    #[error("outlet error: {0}")]
    Outlet(#[from] OutletError),
}

/// Destination for assembled vectors.
///
/// `register` is called once with the stream metadata before the first
/// `push_sample`.
#[async_trait]
pub trait Sink: Send + 'static {
    /// Error type specific to this sink implementation
    type Error: std::error::Error + Send + Sync + 'static;

    async fn register(&mut self, info: &StreamInfo) -> Result<(), Self::Error>;

    async fn push_sample(
        &mut self,
        timestamp: jiff::Timestamp,
        vector: OutputVector,
    ) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: u64,
    pub failed: u64,
}

/// Owns the sink for the lifetime of the process.
///
/// Waits until the session reports a connected device, registers the
/// stream metadata, then moves ticks from the queue to the sink until
/// `cancel` fires. Ticks still queued at that point are flushed.
#[instrument(name = "sink_drain", skip_all)]
pub async fn run_drain<S: Sink>(
    mut sink: S,
    queue: Arc<TickQueue>,
    mut status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
) -> Result<DrainReport, S::Error> {
    let mut report = DrainReport::default();

    let device = loop {
        let device = status.borrow_and_update().device.clone();
        if let Some(device) = device {
            break device;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(report),
            changed = status.changed() => {
                if changed.is_err() {
                    info!("Session ended before a device connected");
                    return Ok(report);
                }
            }
        }
    };

    let stream_info = StreamInfo::for_device(&device.name, &device.address);
    sink.register(&stream_info).await?;
    info!(
        stream = %stream_info.name,
        channels = stream_info.channel_count(),
        nominal_rate = stream_info.nominal_rate,
        "Sink registered"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            tick = queue.pop() => deliver(&mut sink, tick, &mut report).await,
        }
    }

    while let Some(tick) = queue.try_pop() {
        deliver(&mut sink, tick, &mut report).await;
    }

    info!(
        delivered = report.delivered,
        failed = report.failed,
        "Sink drain stopped"
    );
    Ok(report)
}

async fn deliver<S: Sink>(sink: &mut S, tick: Tick, report: &mut DrainReport) {
    // The only place an unknown channel becomes 0.
    let vector = tick.resolve();
    match sink.push_sample(tick.timestamp, vector).await {
        Ok(()) => report.delivered += 1,
        Err(e) => {
            report.failed += 1;
            warn!(error = %e, source = ?tick.source, "Failed to push sample");
        }
    }
}
