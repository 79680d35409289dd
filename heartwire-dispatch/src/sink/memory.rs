use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use heartwire_core::{OutputVector, StreamInfo};

use super::{Sink, SinkError};

/// In-memory sink. Clones share the same storage, so tests keep a handle
/// while the drain owns the sink.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    info: Option<StreamInfo>,
    samples: Vec<(jiff::Timestamp, OutputVector)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn info(&self) -> Option<StreamInfo> {
        self.lock().info.clone()
    }

    pub fn vectors(&self) -> Vec<OutputVector> {
        self.lock().samples.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sink for MemorySink {
    type Error = SinkError;

    async fn register(&mut self, info: &StreamInfo) -> Result<(), Self::Error> {
        let mut inner = self.lock();
        if inner.info.is_some() {
            return Err(SinkError::AlreadyRegistered);
        }
        inner.info = Some(info.clone());
        Ok(())
    }

    async fn push_sample(
        &mut self,
        timestamp: jiff::Timestamp,
        vector: OutputVector,
    ) -> Result<(), Self::Error> {
        let mut inner = self.lock();
        if inner.info.is_none() {
            return Err(SinkError::NotRegistered);
        }
        inner.samples.push((timestamp, vector));
        Ok(())
    }
}
