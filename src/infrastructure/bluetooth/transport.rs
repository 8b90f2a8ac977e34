//! GATT transport
//!
//! [`GattTransport`] is the contract a platform BLE stack implements for one
//! connected peripheral. [`GattLink`] wraps it with the per-connection
//! single-writer queue and the operation timeout; every GATT operation the
//! engine issues goes through a link.

use crate::error::{SyncError, SyncResult, TransportError};
use crate::infrastructure::bluetooth::gatt::{GattEndpoint, GattFeature, GattSpec};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub type TransportResult<T> = Result<T, TransportError>;

/// A service and its characteristics as discovered on the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// Primitive GATT operations on one connected peripheral.
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Services discovered after connecting.
    fn services(&self) -> Vec<DiscoveredService>;

    /// Acknowledged write.
    async fn write(&self, service: Uuid, characteristic: Uuid, value: &[u8])
        -> TransportResult<()>;

    async fn read(&self, service: Uuid, characteristic: Uuid) -> TransportResult<Vec<u8>>;

    /// Enable notifications and return the value stream.
    async fn subscribe(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> TransportResult<mpsc::UnboundedReceiver<Vec<u8>>>;
}

/// Serialized, time-bounded access to one peripheral.
///
/// Clones share the same queue, so writes from the sync path, the keep-alive
/// timer and teardown never interleave on the air.
#[derive(Clone)]
pub struct GattLink {
    transport: Arc<dyn GattTransport>,
    queue: Arc<Mutex<()>>,
    timeout: Duration,
}

impl std::fmt::Debug for GattLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GattLink")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GattLink {
    pub fn new(transport: Arc<dyn GattTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            queue: Arc::new(Mutex::new(())),
            timeout,
        }
    }

    /// Look up a feature's endpoint in the vendor table and confirm the
    /// device exposes it.
    pub fn resolve(
        &self,
        vendor: &'static str,
        spec: &GattSpec,
        feature: GattFeature,
    ) -> SyncResult<GattEndpoint> {
        let endpoint = spec
            .endpoint(feature)
            .ok_or(SyncError::ConfigurationMissing { vendor, feature })?;
        self.ensure_present(endpoint)?;
        Ok(endpoint)
    }

    /// Fail with `NotFoundOnDevice` unless the discovered directory has the
    /// endpoint's service and characteristic.
    pub fn ensure_present(&self, endpoint: GattEndpoint) -> SyncResult<()> {
        let services = self.transport.services();
        let service = services
            .iter()
            .find(|s| s.uuid == endpoint.service)
            .ok_or(SyncError::NotFoundOnDevice {
                what: "service",
                uuid: endpoint.service,
            })?;
        if !service.characteristics.contains(&endpoint.characteristic) {
            return Err(SyncError::NotFoundOnDevice {
                what: "characteristic",
                uuid: endpoint.characteristic,
            });
        }
        Ok(())
    }

    pub async fn write(&self, endpoint: GattEndpoint, value: &[u8]) -> SyncResult<()> {
        let _turn = self.queue.lock().await;
        trace!("GATT write {} <- {:02X?}", endpoint.characteristic, value);

        let result = tokio::time::timeout(
            self.timeout,
            self.transport
                .write(endpoint.service, endpoint.characteristic, value),
        )
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(TransportError::Cancelled)) => Err(SyncError::Cancelled),
            Ok(Err(source)) => Err(SyncError::WriteFailure {
                characteristic: endpoint.characteristic,
                source,
            }),
            Err(_) => {
                warn!(
                    "Write to {} timed out after {:?}",
                    endpoint.characteristic, self.timeout
                );
                Err(SyncError::Timeout {
                    operation: "write",
                    characteristic: endpoint.characteristic,
                    after: self.timeout,
                })
            }
        }
    }

    pub async fn read(&self, endpoint: GattEndpoint) -> SyncResult<Vec<u8>> {
        let _turn = self.queue.lock().await;

        let result = tokio::time::timeout(
            self.timeout,
            self.transport.read(endpoint.service, endpoint.characteristic),
        )
        .await;

        match result {
            Ok(Ok(value)) => {
                trace!("GATT read {} -> {:02X?}", endpoint.characteristic, value);
                Ok(value)
            }
            Ok(Err(TransportError::Cancelled)) => Err(SyncError::Cancelled),
            Ok(Err(source)) => Err(SyncError::ReadFailure {
                characteristic: endpoint.characteristic,
                source,
            }),
            Err(_) => Err(SyncError::Timeout {
                operation: "read",
                characteristic: endpoint.characteristic,
                after: self.timeout,
            }),
        }
    }

    pub async fn subscribe(
        &self,
        endpoint: GattEndpoint,
    ) -> SyncResult<mpsc::UnboundedReceiver<Vec<u8>>> {
        let _turn = self.queue.lock().await;
        debug!("Subscribing to {}", endpoint.characteristic);

        let result = tokio::time::timeout(
            self.timeout,
            self.transport
                .subscribe(endpoint.service, endpoint.characteristic),
        )
        .await;

        match result {
            Ok(Ok(rx)) => Ok(rx),
            Ok(Err(TransportError::Cancelled)) => Err(SyncError::Cancelled),
            Ok(Err(source)) => Err(SyncError::SubscribeFailure {
                characteristic: endpoint.characteristic,
                source,
            }),
            Err(_) => Err(SyncError::Timeout {
                operation: "subscribe",
                characteristic: endpoint.characteristic,
                after: self.timeout,
            }),
        }
    }
}
