//! Camera Sync Service Module
//!
//! Vendor-agnostic entry point. Holds one [`ConnectionDelegate`] per connected
//! camera for the lifetime of the connection and routes every request to it.

use crate::domain::firmware::FirmwareCatalog;
use crate::domain::location::GpsLocation;
use crate::domain::models::{AppEvent, Camera, ConnectionStatus, MessageSeverity, StatusMessage};
use crate::domain::settings::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::infrastructure::bluetooth::{
    connection::{ConnectionDelegate, DelegateConfig},
    gatt::GattFeature,
    registry::VendorRegistry,
    scanner::Advertisement,
    session::SessionPhase,
    transport::{GattLink, GattTransport},
};
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

struct ActiveConnection {
    camera: Camera,
    link: GattLink,
    delegate: Arc<dyn ConnectionDelegate>,
}

/// Outcome of comparing a camera's firmware with the published catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareCheck {
    pub current: String,
    pub latest: Option<String>,
    pub update_available: Option<bool>,
}

/// Main service coordinating connected cameras
pub struct CameraSyncService {
    registry: Arc<VendorRegistry>,
    config: DelegateConfig,
    connections: Mutex<HashMap<String, ActiveConnection>>,
    event_sender: Option<mpsc::UnboundedSender<AppEvent>>,
}

impl CameraSyncService {
    pub fn new(registry: Arc<VendorRegistry>, config: DelegateConfig) -> Self {
        Self {
            registry,
            config,
            connections: Mutex::new(HashMap::new()),
            event_sender: None,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> anyhow::Result<Self> {
        Ok(Self::new(
            Arc::new(VendorRegistry::default()),
            DelegateConfig::from_settings(settings)?,
        ))
    }

    pub fn with_event_sender(mut self, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    pub fn registry(&self) -> &Arc<VendorRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DelegateConfig {
        &self.config
    }

    fn send_event(&self, event: AppEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }

    fn send_log(&self, message: String, severity: MessageSeverity) {
        self.send_event(AppEvent::LogMessage(StatusMessage { message, severity }));
    }

    fn send_status(&self, camera: &Camera, status: ConnectionStatus) {
        self.send_event(AppEvent::ConnectionStatus {
            camera_id: camera.id.clone(),
            status,
        });
    }

    /// Build a camera record from an advertisement, if any vendor claims it.
    pub fn camera_from_advertisement(&self, adv: &Advertisement) -> Option<Camera> {
        let vendor =
            self.registry
                .identify(adv.name.as_deref(), &adv.service_uuids, &adv.manufacturer_data)?;
        Some(
            Camera::new(adv.address.clone(), adv.name.clone(), vendor)
                .with_metadata(vendor.parse_metadata(&adv.manufacturer_data)),
        )
    }

    /// Register a freshly connected camera and create its delegate.
    ///
    /// A camera that is already registered is torn down first.
    pub async fn on_connected(
        &self,
        camera: Camera,
        transport: Arc<dyn GattTransport>,
    ) -> SyncResult<()> {
        if !self.registry.vendors().contains(&camera.vendor) {
            warn!(
                "{} is a {} camera, which this registry does not handle",
                camera.display_name(),
                camera.vendor
            );
            return Err(SyncError::UnsupportedDevice);
        }

        self.send_status(&camera, ConnectionStatus::Connecting);

        let previous = self.connections.lock().await.remove(&camera.id);
        if let Some(previous) = previous {
            warn!("{} reconnected, closing previous session", camera.display_name());
            previous.delegate.on_disconnecting(&previous.link).await;
        }

        let link = GattLink::new(transport, self.config.write_timeout);
        let delegate = camera.vendor.create_connection_delegate(self.config.clone());

        if let Err(e) = delegate.on_connected(&link).await {
            error!("Connect hook failed for {}: {}", camera.display_name(), e);
            self.send_status(&camera, ConnectionStatus::Error);
            return Err(e);
        }

        info!("Connected to {} camera {}", camera.vendor, camera.display_name());
        self.send_log(
            format!("Connected to {}", camera.display_name()),
            MessageSeverity::Success,
        );
        self.send_status(&camera, ConnectionStatus::Connected);

        self.connections.lock().await.insert(
            camera.id.clone(),
            ActiveConnection {
                camera,
                link,
                delegate,
            },
        );
        Ok(())
    }

    /// Link and delegate for a connected camera. The map lock is released
    /// before any GATT traffic.
    async fn active(&self, camera: &Camera) -> SyncResult<(GattLink, Arc<dyn ConnectionDelegate>)> {
        self.connections
            .lock()
            .await
            .get(&camera.id)
            .map(|c| (c.link.clone(), c.delegate.clone()))
            .ok_or_else(|| SyncError::NotConnected(camera.id.clone()))
    }

    fn report_failure(&self, camera: &Camera, what: &str, e: &SyncError) {
        warn!("{} sync to {} failed: {}", what, camera.display_name(), e);
        let severity = if e.is_compatibility_error() {
            MessageSeverity::Error
        } else {
            MessageSeverity::Warning
        };
        self.send_log(
            format!("{} sync to {} failed: {}", what, camera.display_name(), e),
            severity,
        );
    }

    pub async fn sync_location(&self, camera: &Camera, location: &GpsLocation) -> SyncResult<()> {
        let (link, delegate) = self.active(camera).await?;
        match delegate.sync_location(&link, location).await {
            Ok(()) => {
                self.send_event(AppEvent::LocationSynced {
                    camera_id: camera.id.clone(),
                    latitude: location.latitude,
                    longitude: location.longitude,
                });
                Ok(())
            }
            Err(e) => {
                self.report_failure(camera, "Location", &e);
                Err(e)
            }
        }
    }

    pub async fn sync_date_time(&self, camera: &Camera, date_time: &DateTime<Tz>) -> SyncResult<()> {
        let (link, delegate) = self.active(camera).await?;
        match delegate.sync_date_time(&link, date_time).await {
            Ok(()) => {
                self.send_event(AppEvent::DateTimeSynced {
                    camera_id: camera.id.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.report_failure(camera, "Date/time", &e);
                Err(e)
            }
        }
    }

    /// Sync the clock's current time in the configured zone.
    pub async fn sync_current_time(&self, camera: &Camera) -> SyncResult<()> {
        let now = self.config.clock.now().with_timezone(&self.config.time_zone);
        self.sync_date_time(camera, &now).await
    }

    pub async fn set_geo_tagging(&self, camera: &Camera, enabled: bool) -> SyncResult<()> {
        let (link, delegate) = self.active(camera).await?;
        delegate.set_geo_tagging(&link, enabled).await
    }

    pub async fn read_geo_tagging(&self, camera: &Camera) -> SyncResult<bool> {
        let (link, delegate) = self.active(camera).await?;
        delegate.read_geo_tagging(&link).await
    }

    pub async fn read_device_string(&self, camera: &Camera, feature: GattFeature) -> SyncResult<String> {
        let (link, delegate) = self.active(camera).await?;
        delegate.read_device_string(&link, feature).await
    }

    pub async fn pair(&self, camera: &Camera) -> SyncResult<()> {
        let (link, delegate) = self.active(camera).await?;
        delegate.pair(&link).await
    }

    pub async fn trigger_shutter(&self, camera: &Camera) -> SyncResult<()> {
        let (link, delegate) = self.active(camera).await?;
        delegate.trigger_shutter(&link).await?;
        self.send_log(
            format!("Shutter released on {}", camera.display_name()),
            MessageSeverity::Info,
        );
        Ok(())
    }

    /// Read the firmware revision and compare it with the catalog entry for
    /// the camera's advertised model name.
    pub async fn check_firmware(
        &self,
        camera: &Camera,
        catalog: &FirmwareCatalog,
    ) -> SyncResult<FirmwareCheck> {
        let current = self
            .read_device_string(camera, GattFeature::FirmwareVersion)
            .await?;
        let model = camera.name.as_deref().unwrap_or_default();
        let latest = catalog.latest_for(model).map(str::to_string);
        let update_available = catalog.is_update_available(model, &current);

        if update_available == Some(true) {
            info!(
                "Firmware update available for {}: {} -> {:?}",
                camera.display_name(),
                current,
                latest
            );
        }
        Ok(FirmwareCheck {
            current,
            latest,
            update_available,
        })
    }

    pub async fn session_phase(&self, camera: &Camera) -> Option<SessionPhase> {
        self.connections
            .lock()
            .await
            .get(&camera.id)
            .map(|c| c.delegate.phase())
    }

    pub async fn is_connected(&self, camera: &Camera) -> bool {
        self.connections.lock().await.contains_key(&camera.id)
    }

    pub async fn connected_cameras(&self) -> Vec<Camera> {
        self.connections
            .lock()
            .await
            .values()
            .map(|c| c.camera.clone())
            .collect()
    }

    /// Tear down the camera's session and drop its delegate. Unknown cameras
    /// are ignored.
    pub async fn on_disconnecting(&self, camera: &Camera) {
        let Some(connection) = self.connections.lock().await.remove(&camera.id) else {
            return;
        };

        connection.delegate.on_disconnecting(&connection.link).await;

        info!("Disconnected from {}", camera.display_name());
        self.send_log(
            format!("Disconnected from {}", camera.display_name()),
            MessageSeverity::Info,
        );
        self.send_status(camera, ConnectionStatus::Disconnected);
    }

    /// Disconnect every camera.
    pub async fn shutdown(&self) {
        for camera in self.connected_cameras().await {
            self.on_disconnecting(&camera).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::gatt::FIRMWARE_REVISION_CHAR;
    use crate::infrastructure::bluetooth::protocol::{ricoh, sony};
    use crate::infrastructure::bluetooth::simulated::SimulatedPeripheral;
    use crate::infrastructure::bluetooth::vendor::Vendor;
    use chrono::{TimeZone, Utc};

    fn service() -> (CameraSyncService, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = CameraSyncService::new(
            Arc::new(VendorRegistry::default()),
            DelegateConfig::default(),
        )
        .with_event_sender(tx);
        (service, rx)
    }

    fn fix() -> GpsLocation {
        let timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        GpsLocation::new(51.5007, -0.1246, 20.0, 4.0, timestamp)
    }

    #[tokio::test]
    async fn test_unknown_camera_is_not_connected() {
        let (service, _rx) = service();
        let camera = Camera::new("AA:AA:AA:AA:AA:AA", None, Vendor::Ricoh);
        let err = service.sync_location(&camera, &fix()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected(id) if id == camera.id));

        // Disconnecting an unknown camera is a no-op
        service.on_disconnecting(&camera).await;
    }

    #[tokio::test]
    async fn test_unregistered_vendor_is_rejected() {
        let service = CameraSyncService::new(
            Arc::new(VendorRegistry::new(vec![Vendor::Ricoh])),
            DelegateConfig::default(),
        );
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&sony::GATT_SPEC));
        let camera = Camera::new("D8:3A:DD:00:11:22", Some("ILCE-7M4".into()), Vendor::Sony);

        let err = service.on_connected(camera.clone(), peripheral.clone()).await.unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedDevice));
        assert!(err.is_compatibility_error());
        assert!(!service.is_connected(&camera).await);
        assert!(peripheral.ops().is_empty());
    }

    #[tokio::test]
    async fn test_delegate_held_for_connection_lifetime() {
        let (service, _rx) = service();
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&sony::GATT_SPEC));
        let camera = Camera::new("D8:3A:DD:00:11:22", Some("ILCE-7M4".into()), Vendor::Sony);

        service.on_connected(camera.clone(), peripheral.clone()).await.unwrap();
        service.sync_location(&camera, &fix()).await.unwrap();
        service.sync_location(&camera, &fix()).await.unwrap();

        // Session state survived between calls: one enable
        assert_eq!(peripheral.writes_to(sony::LOCATION_LOCK_CHAR_UUID).len(), 1);
        assert_eq!(service.session_phase(&camera).await, Some(SessionPhase::Enabled));

        service.on_disconnecting(&camera).await;
        assert!(!service.is_connected(&camera).await);
        assert_eq!(service.session_phase(&camera).await, None);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let (service, mut rx) = service();
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&ricoh::GATT_SPEC));
        let camera = Camera::new("00:11:22:33:44:55", Some("GR IIIx".into()), Vendor::Ricoh);

        service.on_connected(camera.clone(), peripheral).await.unwrap();
        service.sync_location(&camera, &fix()).await.unwrap();
        service.on_disconnecting(&camera).await;

        let mut statuses = Vec::new();
        let mut synced = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::ConnectionStatus { status, .. } => statuses.push(status),
                AppEvent::LocationSynced { latitude, .. } => synced = latitude == 51.5007,
                _ => {}
            }
        }
        assert_eq!(
            statuses,
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected
            ]
        );
        assert!(synced);
    }

    #[tokio::test]
    async fn test_firmware_check() {
        let (service, _rx) = service();
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&ricoh::GATT_SPEC));
        peripheral.set_value(FIRMWARE_REVISION_CHAR, b"1.50".to_vec());
        let camera = Camera::new("00:11:22:33:44:55", Some("RICOH GR IIIx".into()), Vendor::Ricoh);
        service.on_connected(camera.clone(), peripheral).await.unwrap();

        let catalog = FirmwareCatalog::from_json(
            r#"{"last_updated": "2025-01-15T08:00:00Z", "cameras": {"GR IIIx": "1.60"}}"#,
        )
        .unwrap();
        let check = service.check_firmware(&camera, &catalog).await.unwrap();
        assert_eq!(check.current, "1.50");
        assert_eq!(check.latest.as_deref(), Some("1.60"));
        assert_eq!(check.update_available, Some(true));
    }
}
