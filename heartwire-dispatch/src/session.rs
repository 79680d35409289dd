use std::sync::Arc;
use std::time::Duration;

use heartwire_core::protocol::{ACC_START_COMMAND, ECG_START_COMMAND, PMD_CONTROL};
use heartwire_core::{Assembler, EmissionStats, Emitter, NotifyChannel};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, field, info, instrument, warn};
use ulid::Ulid;

use crate::config::{PartialSubscriptionPolicy, SessionConfig};
use crate::transport::{DeviceInfo, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    StreamingActive,
    Stopping,
}

/// Published on every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: Ulid,
    pub state: SessionState,
    pub device: Option<DeviceInfo>,
    /// Streaming with only one of the two notification channels.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Connect,
    Handshake,
    Subscribe,
    Notifications,
}

/// How a session ended. Failures are reported here, never as a panic or an
/// error returned to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The stop signal was observed, during setup or while streaming.
    Stopped,
    /// The transport closed the notification stream.
    LinkLost,
    Failed { stage: SessionStage, reason: String },
}

impl SessionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionOutcome::Failed { .. })
    }
}

/// Outcome of subscribing every notification channel.
enum Subscription {
    Ready(Vec<NotifyChannel>),
    Failed(Vec<NotifyChannel>, String),
    Cancelled(Vec<NotifyChannel>),
}

/// One connection to one strap, from connect to disconnect.
pub struct Session<T, E> {
    id: Ulid,
    transport: T,
    config: SessionConfig,
    assembler: Assembler<E>,
    status: watch::Sender<SessionStatus>,
}

impl<T: Transport, E: Emitter + 'static> Session<T, E> {
    pub fn new(transport: T, config: SessionConfig, emitter: E) -> Self {
        let id = Ulid::new();
        let (status, _) = watch::channel(SessionStatus {
            session_id: id,
            state: SessionState::Disconnected,
            device: None,
            degraded: false,
        });

        Self {
            id,
            transport,
            config,
            assembler: Assembler::new(emitter),
            status,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn stats(&self) -> Arc<EmissionStats> {
        Arc::clone(self.assembler.stats())
    }

    fn set_state(&self, state: SessionState) {
        self.status.send_modify(|s| s.state = state);
        info!(?state, "Session state changed");
    }

    fn teardown_timeout(&self) -> Duration {
        self.config.teardown_timeout()
    }

    /// Drives the session until `cancel` fires, the link drops, or a setup
    /// step fails. Every setup step is raced against `cancel`. Always ends
    /// `Disconnected`.
    #[instrument(name = "session", skip_all, fields(session_id = %self.id, device = field::Empty))]
    pub async fn run(mut self, cancel: CancellationToken) -> SessionOutcome {
        self.set_state(SessionState::Connecting);
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.transport.connect() => Some(result),
        };
        let device = match connected {
            Some(Ok(device)) => device,
            Some(Err(e)) => {
                error!(error = %e, "Failed to connect");
                self.set_state(SessionState::Disconnected);
                return SessionOutcome::Failed {
                    stage: SessionStage::Connect,
                    reason: e.to_string(),
                };
            }
            None => {
                info!("Stop requested while connecting");
                return self.finish(&[], SessionOutcome::Stopped).await;
            }
        };
        Span::current().record("device", field::display(&device.name));
        self.status.send_modify(|s| s.device = Some(device.clone()));

        self.set_state(SessionState::Handshaking);
        let handshake = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.handshake() => Some(result),
        };
        match handshake {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                error!(error = %e, "Control handshake failed");
                let outcome = SessionOutcome::Failed {
                    stage: SessionStage::Handshake,
                    reason: e.to_string(),
                };
                return self.finish(&[], outcome).await;
            }
            None => {
                info!("Stop requested during handshake");
                return self.finish(&[], SessionOutcome::Stopped).await;
            }
        }

        let subscribed = match self.subscribe_all(&cancel).await {
            Subscription::Ready(subscribed) => subscribed,
            Subscription::Failed(subscribed, reason) => {
                let outcome = SessionOutcome::Failed {
                    stage: SessionStage::Subscribe,
                    reason,
                };
                return self.finish(&subscribed, outcome).await;
            }
            Subscription::Cancelled(subscribed) => {
                info!("Stop requested while subscribing");
                return self.finish(&subscribed, SessionOutcome::Stopped).await;
            }
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.transport.notifications(cancel.child_token()) => Some(result),
        };
        let mut notifications = match opened {
            Some(Ok(rx)) => rx,
            Some(Err(e)) => {
                error!(error = %e, "Failed to open notification stream");
                let outcome = SessionOutcome::Failed {
                    stage: SessionStage::Notifications,
                    reason: e.to_string(),
                };
                return self.finish(&subscribed, outcome).await;
            }
            None => {
                info!("Stop requested before streaming");
                return self.finish(&subscribed, SessionOutcome::Stopped).await;
            }
        };

        self.set_state(SessionState::StreamingActive);
        let outcome = loop {
            // Checked first so a stop that also closes the stream is not
            // mistaken for link loss.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stop requested");
                    break SessionOutcome::Stopped;
                }
                next = notifications.recv() => match next {
                    Some(notification) => {
                        self.assembler.ingest(&notification);
                    }
                    None => {
                        warn!("Notification stream closed by transport");
                        break SessionOutcome::LinkLost;
                    }
                }
            }
        };
        drop(notifications);

        self.set_state(SessionState::Stopping);
        self.teardown(&subscribed).await;
        self.set_state(SessionState::Disconnected);

        let counts = self.assembler.stats().counts();
        info!(
            ticks = counts.total_ticks(),
            ecg = counts.ecg,
            acc = counts.acc,
            heart_rate = counts.heart_rate,
            rr_interval = counts.rr_interval,
            malformed = counts.malformed,
            "Session ended"
        );
        outcome
    }

    async fn handshake(&mut self) -> Result<(), T::Error> {
        let features = self.transport.read(PMD_CONTROL).await?;
        debug!(?features, "PMD control point readable");

        self.transport.write(PMD_CONTROL, &ECG_START_COMMAND).await?;
        info!("ECG stream requested");
        self.transport.write(PMD_CONTROL, &ACC_START_COMMAND).await?;
        info!("ACC stream requested");
        Ok(())
    }

    /// Subscribes PMD data, then heart rate. Anything short of `Ready`
    /// carries whatever did subscribe so it can be torn down.
    async fn subscribe_all(&mut self, cancel: &CancellationToken) -> Subscription {
        let mut subscribed = Vec::with_capacity(NotifyChannel::ALL.len());
        let mut failures = Vec::new();

        for channel in NotifyChannel::ALL {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Subscription::Cancelled(subscribed),
                result = self.transport.subscribe(channel.uuid()) => result,
            };
            match result {
                Ok(()) => {
                    info!(%channel, "Subscribed");
                    subscribed.push(channel);
                }
                Err(e) => {
                    error!(%channel, error = %e, "Subscription failed");
                    failures.push(format!("{channel}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            return Subscription::Ready(subscribed);
        }
        let reason = failures.join("; ");
        if subscribed.is_empty() {
            return Subscription::Failed(subscribed, reason);
        }

        match self.config.on_partial_subscription {
            PartialSubscriptionPolicy::Abort => {
                error!(%reason, "Partial subscription, aborting session");
                Subscription::Failed(subscribed, reason)
            }
            PartialSubscriptionPolicy::Degraded => {
                warn!(%reason, "Partial subscription, streaming in degraded mode");
                self.status.send_modify(|s| s.degraded = true);
                Subscription::Ready(subscribed)
            }
        }
    }

    async fn finish(
        &mut self,
        subscribed: &[NotifyChannel],
        outcome: SessionOutcome,
    ) -> SessionOutcome {
        self.set_state(SessionState::Stopping);
        self.teardown(subscribed).await;
        self.set_state(SessionState::Disconnected);
        outcome
    }

    /// Unsubscribes every subscribed channel, then disconnects. Each step is
    /// bounded by the teardown timeout and failures are only logged.
    async fn teardown(&mut self, subscribed: &[NotifyChannel]) {
        let limit = self.teardown_timeout();

        for channel in subscribed {
            match tokio::time::timeout(limit, self.transport.unsubscribe(channel.uuid())).await {
                Ok(Ok(())) => debug!(%channel, "Unsubscribed"),
                Ok(Err(e)) => warn!(%channel, error = %e, "Failed to unsubscribe"),
                Err(_) => warn!(%channel, "Unsubscribe timed out"),
            }
        }

        match tokio::time::timeout(limit, self.transport.disconnect()).await {
            Ok(Ok(())) => info!("Disconnected"),
            Ok(Err(e)) => warn!(error = %e, "Failed to disconnect cleanly"),
            Err(_) => warn!("Disconnect timed out"),
        }
    }
}
