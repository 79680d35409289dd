use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::{Json, Router, routing::get};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::session::{Session, SessionOutcome};
use crate::sink::queue::TickQueue;
use crate::sink::{DrainReport, Sink, run_drain};
use crate::state::{DispatchState, StatusReport};
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to bind status server on {addr}: {source}")]
    HttpBind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("sink drain failed: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How a dispatcher run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub outcome: SessionOutcome,
    pub drain: DrainReport,
}

/// Runs one session against `transport`, draining its ticks into `sink`
/// and serving `/health` and `/status` until the session ends.
///
/// The session ends on `shutdown`, on link loss, on a setup failure, or
/// when the sink drain fails. In every case its teardown has completed
/// before this returns.
pub async fn run_dispatcher<T, S>(
    transport: T,
    sink: S,
    config: Config,
    shutdown: CancellationToken,
) -> Result<DispatchSummary, DispatchError>
where
    T: Transport,
    S: Sink,
{
    // Nothing touches the device until the status port is ours.
    let addr = config.server.http_addr;
    let http_listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DispatchError::HttpBind { addr, source })?;
    let http_addr = http_listener.local_addr().unwrap_or(addr);

    let cancel = shutdown.child_token();
    let drain_cancel = CancellationToken::new();

    let queue = Arc::new(TickQueue::new(config.outlet.queue_capacity));
    let session = Session::new(transport, config.session.clone(), Arc::clone(&queue));
    let state = DispatchState::new(session.status(), session.stats(), Arc::clone(&queue));
    info!(session_id = %session.id(), "Session created");

    let mut drain_handle = tokio::spawn(run_drain(
        sink,
        Arc::clone(&queue),
        session.status(),
        drain_cancel.clone(),
    ));
    let mut session_handle = tokio::spawn(session.run(cancel.clone()));
    let http_handle = tokio::spawn(serve_status(
        http_listener,
        http_addr,
        state,
        drain_cancel.clone(),
    ));

    let (outcome, drained) = tokio::select! {
        outcome = &mut session_handle => {
            let outcome = outcome?;
            drain_cancel.cancel();
            (outcome, drain_handle.await?)
        }
        drained = &mut drain_handle => {
            let drained = drained?;
            if let Err(e) = &drained {
                error!(error = %e, "Sink drain failed, stopping session");
            }
            cancel.cancel();
            let outcome = session_handle.await?;
            drain_cancel.cancel();
            (outcome, drained)
        }
    };
    let _ = http_handle.await;

    match &outcome {
        SessionOutcome::Stopped => info!("Session stopped"),
        SessionOutcome::LinkLost => warn!("Session ended, device link lost"),
        SessionOutcome::Failed { stage, reason } => error!(?stage, %reason, "Session failed"),
    }

    let drain = drained.map_err(|e| DispatchError::Sink(Box::new(e)))?;
    info!(
        delivered = drain.delivered,
        failed = drain.failed,
        "Sink drained"
    );
    Ok(DispatchSummary { outcome, drain })
}

async fn serve_status(
    listener: TcpListener,
    addr: SocketAddr,
    state: DispatchState,
    stop: CancellationToken,
) {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state);
    info!(http_addr = %addr, "HTTP server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await
    {
        error!(error = ?e, "HTTP server error");
    }
    info!("HTTP server shut down");
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn status_handler(State(state): State<DispatchState>) -> Json<StatusReport> {
    Json(state.report())
}
