use std::sync::Arc;
use std::time::Instant;

use heartwire_core::{EmissionCounts, EmissionStats};
use serde::Serialize;
use tokio::sync::watch;

use crate::session::SessionStatus;
use crate::sink::queue::{QueueCounts, TickQueue};

/// Shared view of the running pipeline, served by the status endpoint.
#[derive(Clone)]
pub struct DispatchState {
    inner: Arc<Inner>,
}

struct Inner {
    session: watch::Receiver<SessionStatus>,
    emissions: Arc<EmissionStats>,
    queue: Arc<TickQueue>,
    startup_time: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub uptime_secs: u64,
    pub session: SessionStatus,
    pub emissions: EmissionCounts,
    pub queue: QueueCounts,
}

impl DispatchState {
    pub fn new(
        session: watch::Receiver<SessionStatus>,
        emissions: Arc<EmissionStats>,
        queue: Arc<TickQueue>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                emissions,
                queue,
                startup_time: Instant::now(),
            }),
        }
    }

    pub fn session(&self) -> SessionStatus {
        self.inner.session.borrow().clone()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.startup_time.elapsed().as_secs()
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            uptime_secs: self.uptime_secs(),
            session: self.session(),
            emissions: self.inner.emissions.counts(),
            queue: self.inner.queue.counts(),
        }
    }
}
