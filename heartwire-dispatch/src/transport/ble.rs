use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use heartwire_core::RawNotification;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DeviceInfo, Transport};

#[derive(Debug, thiserror::Error)]
pub enum BleTransportError {
    #[error("bluetooth error: {0}")]
    Btleplug(#[from] btleplug::Error),
    #[error("no bluetooth adapter found")]
    NoAdapter,
    #[error("no device matching {0:?} found")]
    DeviceNotFound(String),
    #[error("device does not expose characteristic {0}")]
    MissingCharacteristic(Uuid),
    #[error("not connected")]
    NotConnected,
}

#[derive(Debug, Clone)]
pub struct BleSettings {
    /// Substring of the advertised local name.
    pub name_pattern: String,
    /// Exact address, preferred over the name pattern when set.
    pub address: Option<String>,
    pub scan: Duration,
    /// How long disconnect waits for the notification forwarder to stop.
    pub teardown_timeout: Duration,
}

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Polar H10 over the host's first Bluetooth adapter.
pub struct BleTransport {
    settings: BleSettings,
    peripheral: Option<Peripheral>,
    /// Opened at connect so nothing sent between subscribe and
    /// `notifications` is lost.
    pending: Option<NotificationStream>,
    forwarder: Option<(CancellationToken, JoinHandle<()>)>,
}

impl BleTransport {
    pub fn new(settings: BleSettings) -> Self {
        Self {
            settings,
            peripheral: None,
            pending: None,
            forwarder: None,
        }
    }

    fn peripheral(&self) -> Result<&Peripheral, BleTransportError> {
        self.peripheral.as_ref().ok_or(BleTransportError::NotConnected)
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, BleTransportError> {
        self.peripheral()?
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(BleTransportError::MissingCharacteristic(uuid))
    }
}

async fn find_peripheral(
    central: &Adapter,
    settings: &BleSettings,
) -> Result<(Peripheral, String), BleTransportError> {
    for p in central.peripherals().await? {
        let Some(props) = p.properties().await? else {
            continue;
        };
        let address = p.address().to_string();
        let name = props.local_name.unwrap_or_default();

        let matched = match &settings.address {
            Some(wanted) => address.eq_ignore_ascii_case(wanted),
            None => name.contains(&settings.name_pattern),
        };
        if matched {
            return Ok((p, name));
        }
        debug!(%address, %name, "Skipping peripheral");
    }

    let target = settings
        .address
        .clone()
        .unwrap_or_else(|| settings.name_pattern.clone());
    Err(BleTransportError::DeviceNotFound(target))
}

/// Forwards peripheral notifications into a channel until `cancel` fires,
/// the stream ends, or the receiver is dropped.
fn spawn_forwarder<S>(
    mut stream: S,
    cancel: CancellationToken,
) -> (mpsc::Receiver<RawNotification>, JoinHandle<()>)
where
    S: Stream<Item = ValueNotification> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(256);
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(n) => {
                        if tx.send(RawNotification::new(n.uuid, n.value)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        info!("Peripheral notification stream ended");
                        break;
                    }
                }
            }
        }
    });
    (rx, handle)
}

#[async_trait]
impl Transport for BleTransport {
    type Error = BleTransportError;

    async fn connect(&mut self) -> Result<DeviceInfo, Self::Error> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleTransportError::NoAdapter)?;

        info!(
            pattern = %self.settings.name_pattern,
            address = ?self.settings.address,
            scan_secs = self.settings.scan.as_secs(),
            "Scanning for device"
        );
        central.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(self.settings.scan).await;
        let found = find_peripheral(&central, &self.settings).await;
        if let Err(e) = central.stop_scan().await {
            debug!(error = %e, "Failed to stop scan");
        }
        let (peripheral, name) = found?;

        peripheral.connect().await?;
        // Held as soon as the link is up so a cancelled connect is still torn down.
        self.peripheral = Some(peripheral.clone());
        peripheral.discover_services().await?;
        self.pending = Some(peripheral.notifications().await?);

        let device = DeviceInfo {
            name,
            address: peripheral.address().to_string(),
        };
        info!(device = %device.name, address = %device.address, "Connected");
        Ok(device)
    }

    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>, Self::Error> {
        let c = self.characteristic(characteristic)?;
        Ok(self.peripheral()?.read(&c).await?)
    }

    async fn write(&mut self, characteristic: Uuid, payload: &[u8]) -> Result<(), Self::Error> {
        let c = self.characteristic(characteristic)?;
        self.peripheral()?
            .write(&c, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), Self::Error> {
        let c = self.characteristic(characteristic)?;
        self.peripheral()?.subscribe(&c).await?;
        Ok(())
    }

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<(), Self::Error> {
        let c = self.characteristic(characteristic)?;
        self.peripheral()?.unsubscribe(&c).await?;
        Ok(())
    }

    async fn notifications(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<RawNotification>, Self::Error> {
        let stream = match self.pending.take() {
            Some(stream) => stream,
            None => self.peripheral()?.notifications().await?,
        };
        let token = cancel.child_token();
        let (rx, handle) = spawn_forwarder(stream, token.clone());
        self.forwarder = Some((token, handle));

        Ok(rx)
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.pending = None;
        if let Some((token, handle)) = self.forwarder.take() {
            token.cancel();
            let abort = handle.abort_handle();
            if tokio::time::timeout(self.settings.teardown_timeout, handle)
                .await
                .is_err()
            {
                warn!("Notification forwarder did not stop in time, aborting");
                abort.abort();
            }
        }

        if let Some(peripheral) = self.peripheral.take() {
            peripheral.disconnect().await?;
            info!("Disconnected");
        }
        Ok(())
    }
}
