use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use heartwire_core::StreamInfo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{OutletError, Sample, WireMessage, write_frame};

/// Publishes samples to every connected consumer.
///
/// Dropping the outlet closes the listener and every consumer connection.
pub struct Outlet {
    info: Arc<StreamInfo>,
    tx: broadcast::Sender<Sample>,
    local_addr: SocketAddr,
    consumers: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl Outlet {
    /// Binds the listener and starts accepting consumers. Each consumer
    /// buffers up to `consumer_buffer` samples before it starts losing the
    /// oldest ones.
    pub async fn bind(
        addr: SocketAddr,
        info: StreamInfo,
        consumer_buffer: usize,
    ) -> Result<Self, OutletError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, _) = broadcast::channel(consumer_buffer.max(1));

        let info = Arc::new(info);
        let consumers = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        info!(
            %local_addr,
            stream = %info.name,
            source_id = %info.source_id,
            "Outlet listening"
        );

        tokio::spawn(run_accept_loop(
            listener,
            Arc::clone(&info),
            tx.clone(),
            Arc::clone(&consumers),
            cancel.clone(),
        ));

        Ok(Self {
            info,
            tx,
            local_addr,
            consumers,
            cancel,
        })
    }

    /// Queues one sample for every consumer. Returns how many consumers
    /// it was queued for.
    pub fn push_sample(&self, sample: Sample) -> usize {
        self.tx.send(sample).unwrap_or(0)
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Outlet {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[instrument(name = "outlet_accept", skip_all, fields(stream = %info.name))]
async fn run_accept_loop(
    listener: TcpListener,
    info: Arc<StreamInfo>,
    tx: broadcast::Sender<Sample>,
    consumers: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Closing outlet listener");
                break;
            }
            client = listener.accept() => {
                match client {
                    Ok((stream, peer)) => {
                        // Subscribe before the stream info goes out so the
                        // consumer sees every sample pushed after it.
                        let rx = tx.subscribe();
                        let count = consumers.fetch_add(1, Ordering::Relaxed) + 1;
                        info!(%peer, consumers = count, "Consumer connected");

                        let info = Arc::clone(&info);
                        let consumers = Arc::clone(&consumers);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_consumer(stream, &info, rx, cancel).await {
                                debug!(%peer, error = %e, "Consumer connection ended with error");
                            }
                            let count = consumers.fetch_sub(1, Ordering::Relaxed) - 1;
                            info!(%peer, consumers = count, "Consumer disconnected");
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept consumer");
                        if is_transient_error(&e) {
                            sleep(Duration::from_millis(100)).await;
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn is_transient_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused | ConnectionAborted | ConnectionReset | OutOfMemory | Other
    )
}

async fn serve_consumer(
    mut stream: TcpStream,
    info: &StreamInfo,
    mut rx: broadcast::Receiver<Sample>,
    cancel: CancellationToken,
) -> Result<(), OutletError> {
    stream.set_nodelay(true)?;
    write_frame(&mut stream, &WireMessage::StreamInfo(info.clone())).await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            received = rx.recv() => match received {
                Ok(sample) => write_frame(&mut stream, &WireMessage::Sample(sample)).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Consumer fell behind, oldest samples dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }
}
