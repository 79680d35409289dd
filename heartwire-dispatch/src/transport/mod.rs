#[cfg(feature = "ble")]
pub mod ble;
pub mod mock;

use async_trait::async_trait;
use heartwire_core::RawNotification;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity of the connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub address: String,
}

/// Link to a single chest strap.
///
/// Calls are made by one session in a fixed order: connect, read, write,
/// subscribe, notifications, then unsubscribe and disconnect on the way out.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Error type for this transport implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    async fn connect(&mut self) -> Result<DeviceInfo, Self::Error>;

    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>, Self::Error>;

    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<(), Self::Error>;

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), Self::Error>;

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<(), Self::Error>;

    /// Starts forwarding notifications from every subscribed characteristic,
    /// in arrival order. The channel closes when the link drops or `cancel`
    /// fires.
    async fn notifications(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RawNotification>, Self::Error>;

    async fn disconnect(&mut self) -> Result<(), Self::Error>;
}
