use std::net::SocketAddr;

use async_trait::async_trait;
use heartwire_core::{OutputVector, StreamInfo};
use heartwire_outlet::{Outlet, Sample};
use tracing::trace;

use super::{Sink, SinkError};
use crate::config::OutletConfig;

/// Publishes vectors through a TCP [`Outlet`]. The listener is bound on
/// registration, once the device identity is known.
pub struct OutletSink {
    addr: SocketAddr,
    consumer_buffer: usize,
    outlet: Option<Outlet>,
}

impl OutletSink {
    pub fn new(config: &OutletConfig) -> Self {
        Self {
            addr: config.addr,
            consumer_buffer: config.consumer_buffer,
            outlet: None,
        }
    }

    pub fn outlet(&self) -> Option<&Outlet> {
        self.outlet.as_ref()
    }
}

#[async_trait]
impl Sink for OutletSink {
    type Error = SinkError;

    async fn register(&mut self, info: &StreamInfo) -> Result<(), Self::Error> {
        if self.outlet.is_some() {
            return Err(SinkError::AlreadyRegistered);
        }
        let outlet = Outlet::bind(self.addr, info.clone(), self.consumer_buffer).await?;
        self.outlet = Some(outlet);
        Ok(())
    }

    async fn push_sample(
        &mut self,
        timestamp: jiff::Timestamp,
        vector: OutputVector,
    ) -> Result<(), Self::Error> {
        let outlet = self.outlet.as_ref().ok_or(SinkError::NotRegistered)?;
        let consumers = outlet.push_sample(Sample::new(timestamp, vector));
        trace!(consumers, "Sample pushed");
        Ok(())
    }
}
