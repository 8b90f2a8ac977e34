//! Connection delegates
//!
//! A [`ConnectionDelegate`] drives one connection's vendor-specific sequence:
//! enable on first use, encode and write syncs, tear down on disconnect. The
//! shape is the same for every vendor; only what happens inside each phase
//! differs. [`GattDelegate`] covers vendors with no session requirements.

use crate::domain::clock::{Clock, SystemClock};
use crate::domain::location::GpsLocation;
use crate::domain::settings::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::infrastructure::bluetooth::gatt::{GattEndpoint, GattFeature};
use crate::infrastructure::bluetooth::protocol::SHUTTER_SEQUENCE;
use crate::infrastructure::bluetooth::session::{PhaseTracker, SessionPhase};
use crate::infrastructure::bluetooth::transport::GattLink;
use crate::infrastructure::bluetooth::vendor::Vendor;
use anyhow::Context;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Timing and zone parameters for one connection.
#[derive(Clone)]
pub struct DelegateConfig {
    /// Bound on every GATT write/read/subscribe
    pub write_timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub keep_alive_period: Duration,
    pub time_zone: Tz,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DelegateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateConfig")
            .field("write_timeout", &self.write_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("keep_alive_period", &self.keep_alive_period)
            .field("time_zone", &self.time_zone)
            .finish_non_exhaustive()
    }
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            keep_alive_period: Duration::from_secs(30),
            time_zone: chrono_tz::UTC,
            clock: Arc::new(SystemClock),
        }
    }
}

impl DelegateConfig {
    pub fn from_settings(settings: &SyncSettings) -> anyhow::Result<Self> {
        let time_zone: Tz = settings
            .time_zone
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Unknown time zone {:?}", settings.time_zone))?;

        Ok(Self {
            write_timeout: Duration::from_secs(settings.write_timeout_secs),
            max_attempts: settings.max_sync_attempts.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            keep_alive_period: Duration::from_secs(settings.keep_alive_period_secs),
            time_zone,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Vendor-specific connection lifecycle.
#[async_trait]
pub trait ConnectionDelegate: Send + Sync {
    fn vendor(&self) -> Vendor;

    fn phase(&self) -> SessionPhase;

    async fn on_connected(&self, link: &GattLink) -> SyncResult<()>;

    async fn sync_location(&self, link: &GattLink, location: &GpsLocation) -> SyncResult<()>;

    async fn sync_date_time(&self, link: &GattLink, date_time: &DateTime<Tz>) -> SyncResult<()>;

    /// Teardown. Never fails; problems are logged.
    async fn on_disconnecting(&self, link: &GattLink);

    async fn set_geo_tagging(&self, link: &GattLink, enabled: bool) -> SyncResult<()> {
        let vendor = self.vendor();
        let endpoint = resolve(link, vendor, GattFeature::GeoTagging)?;
        let payload = vendor.codec().encode_geo_tagging_enabled(enabled)?;
        link.write(endpoint, &payload).await?;
        info!("{} geotagging {}", vendor, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    async fn read_geo_tagging(&self, link: &GattLink) -> SyncResult<bool> {
        let vendor = self.vendor();
        let endpoint = resolve(link, vendor, GattFeature::GeoTagging)?;
        let value = link.read(endpoint).await?;
        Ok(vendor.codec().decode_geo_tagging_enabled(&value)?)
    }

    /// Read a UTF-8 string characteristic such as the firmware revision.
    async fn read_device_string(&self, link: &GattLink, feature: GattFeature) -> SyncResult<String> {
        let endpoint = resolve(link, self.vendor(), feature)?;
        let value = link.read(endpoint).await?;
        Ok(String::from_utf8_lossy(&value)
            .trim_end_matches('\0')
            .trim()
            .to_string())
    }

    /// Write the vendor's pairing bootstrap payload.
    async fn pair(&self, link: &GattLink) -> SyncResult<()> {
        let vendor = self.vendor();
        let endpoint = resolve(link, vendor, GattFeature::Pairing)?;
        let payload = vendor
            .codec()
            .pairing_init_payload()
            .ok_or(SyncError::ConfigurationMissing {
                vendor: vendor.display_name(),
                feature: GattFeature::Pairing,
            })?;
        link.write(endpoint, &payload).await?;
        info!("{} pairing payload written", vendor);
        Ok(())
    }

    /// Half-press, full-press and release through the remote characteristic.
    async fn trigger_shutter(&self, link: &GattLink) -> SyncResult<()> {
        let vendor = self.vendor();
        let endpoint = resolve(link, vendor, GattFeature::RemoteControl)?;
        for command in SHUTTER_SEQUENCE {
            let payload = vendor.codec().encode_remote_command(*command)?;
            debug!("Remote command {:?}", command);
            link.write(endpoint, &payload).await?;
        }
        Ok(())
    }
}

/// Resolve a feature through the vendor table and the discovered directory.
pub fn resolve(link: &GattLink, vendor: Vendor, feature: GattFeature) -> SyncResult<GattEndpoint> {
    link.resolve(vendor.display_name(), vendor.gatt_spec(), feature)
}

/// Resolves once `cancel` flips to true. Pends forever if the sender is gone.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Write with a bounded number of attempts.
///
/// Each attempt is bounded by the link timeout. Timeouts and transport
/// failures consume an attempt; cancellation returns immediately.
pub async fn write_with_retry(
    link: &GattLink,
    endpoint: GattEndpoint,
    payload: &[u8],
    max_attempts: u32,
    retry_delay: Duration,
    mut cancel: watch::Receiver<bool>,
) -> SyncResult<()> {
    let max_attempts = max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        let result = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => Err(SyncError::Cancelled),
            result = link.write(endpoint, payload) => result,
        };

        match result {
            Ok(()) => {
                if attempt > 1 {
                    info!("Write to {} succeeded on attempt {}", endpoint.characteristic, attempt);
                }
                return Ok(());
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!(
                    "Write to {} failed (attempt {}/{}): {}",
                    endpoint.characteristic, attempt, max_attempts, e
                );
                last_error = Some(e);
                if attempt < max_attempts {
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => return Err(SyncError::Cancelled),
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }
    }

    Err(SyncError::SyncExhausted {
        attempts: max_attempts,
        last: Box::new(last_error.unwrap_or(SyncError::Cancelled)),
    })
}

/// Delegate for vendors with no session setup: every phase but syncing is a
/// no-op and each sync is a single acknowledged write.
pub struct GattDelegate {
    vendor: Vendor,
    config: DelegateConfig,
    phase: PhaseTracker,
}

impl GattDelegate {
    pub fn new(vendor: Vendor, config: DelegateConfig) -> Self {
        Self {
            vendor,
            config,
            phase: PhaseTracker::default(),
        }
    }

    async fn write(&self, link: &GattLink, feature: GattFeature, payload: Vec<u8>) -> SyncResult<()> {
        let endpoint = resolve(link, self.vendor, feature)?;
        self.phase.enable_trivially();
        let _syncing = self.phase.begin_sync();
        link.write(endpoint, &payload).await
    }
}

#[async_trait]
impl ConnectionDelegate for GattDelegate {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    async fn on_connected(&self, _link: &GattLink) -> SyncResult<()> {
        self.phase.set(SessionPhase::Connected);
        Ok(())
    }

    async fn sync_location(&self, link: &GattLink, location: &GpsLocation) -> SyncResult<()> {
        let payload = self
            .vendor
            .codec()
            .encode_location(location, self.config.time_zone);
        self.write(link, GattFeature::Location, payload).await
    }

    async fn sync_date_time(&self, link: &GattLink, date_time: &DateTime<Tz>) -> SyncResult<()> {
        let payload = self.vendor.codec().encode_date_time(date_time);
        self.write(link, GattFeature::DateTime, payload).await
    }

    async fn on_disconnecting(&self, _link: &GattLink) {
        self.phase.set(SessionPhase::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::{ricoh, sony};
    use crate::infrastructure::bluetooth::simulated::{Fault, GattOp, SimulatedPeripheral};
    use chrono::{TimeZone, Utc};

    fn ricoh_link() -> (Arc<SimulatedPeripheral>, GattLink) {
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&ricoh::GATT_SPEC));
        let link = GattLink::new(peripheral.clone(), Duration::from_secs(30));
        (peripheral, link)
    }

    fn fix() -> GpsLocation {
        let timestamp = Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap();
        GpsLocation::new(48.8584, 2.2945, 35.0, 3.0, timestamp)
    }

    #[tokio::test]
    async fn test_default_delegate_writes_encoded_location() {
        let (peripheral, link) = ricoh_link();
        let delegate = GattDelegate::new(Vendor::Ricoh, DelegateConfig::default());
        delegate.on_connected(&link).await.unwrap();
        assert_eq!(delegate.phase(), SessionPhase::Connected);

        delegate.sync_location(&link, &fix()).await.unwrap();

        let writes = peripheral.writes_to(ricoh::LOCATION_CHAR_UUID);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), ricoh::LOCATION_LEN);
        assert_eq!(delegate.phase(), SessionPhase::Enabled);

        delegate.on_disconnecting(&link).await;
        assert_eq!(delegate.phase(), SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn test_missing_configuration_fails_fast() {
        let (peripheral, link) = ricoh_link();
        let delegate = GattDelegate::new(Vendor::Ricoh, DelegateConfig::default());

        let err = delegate.trigger_shutter(&link).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::ConfigurationMissing {
                feature: GattFeature::RemoteControl,
                ..
            }
        ));
        assert!(err.is_compatibility_error());
        assert!(peripheral.ops().is_empty());
    }

    #[tokio::test]
    async fn test_characteristic_absent_on_device() {
        let (peripheral, link) = ricoh_link();
        peripheral.remove_characteristic(ricoh::DATE_TIME_CHAR_UUID);
        let delegate = GattDelegate::new(Vendor::Ricoh, DelegateConfig::default());

        let now = chrono_tz::UTC.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = delegate.sync_date_time(&link, &now).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::NotFoundOnDevice { uuid, .. } if uuid == ricoh::DATE_TIME_CHAR_UUID
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_delegate_does_not_retry() {
        let (peripheral, link) = ricoh_link();
        peripheral.fail_writes(ricoh::LOCATION_CHAR_UUID, Fault::Hang, None);
        let delegate = GattDelegate::new(Vendor::Ricoh, DelegateConfig::default());

        let err = delegate.sync_location(&link, &fix()).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { .. }));
        assert_eq!(peripheral.writes_to(ricoh::LOCATION_CHAR_UUID).len(), 1);
    }

    #[tokio::test]
    async fn test_geo_tagging_round_trip_through_device() {
        let (peripheral, link) = ricoh_link();
        let delegate = GattDelegate::new(Vendor::Ricoh, DelegateConfig::default());

        delegate.set_geo_tagging(&link, true).await.unwrap();
        assert_eq!(peripheral.value(ricoh::GEO_TAGGING_CHAR_UUID), Some(vec![1]));
        assert!(delegate.read_geo_tagging(&link).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_device_string_trims_padding() {
        let (peripheral, link) = ricoh_link();
        peripheral.set_value(
            crate::infrastructure::bluetooth::gatt::FIRMWARE_REVISION_CHAR,
            b"1.60\0\0".to_vec(),
        );
        let delegate = GattDelegate::new(Vendor::Ricoh, DelegateConfig::default());
        let version = delegate
            .read_device_string(&link, GattFeature::FirmwareVersion)
            .await
            .unwrap();
        assert_eq!(version, "1.60");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_after_bound() {
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&sony::GATT_SPEC));
        let link = GattLink::new(peripheral.clone(), Duration::from_secs(30));
        let endpoint = GattEndpoint::new(sony::LOCATION_SERVICE_UUID, sony::LOCATION_CHAR_UUID);
        peripheral.fail_writes(endpoint.characteristic, Fault::Hang, None);
        let (_tx, rx) = watch::channel(false);

        let err = write_with_retry(&link, endpoint, &[0xAA], 3, Duration::from_millis(500), rx)
            .await
            .unwrap_err();

        match err {
            SyncError::SyncExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, SyncError::Timeout { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(peripheral.writes_to(endpoint.characteristic).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_transient_failure() {
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&sony::GATT_SPEC));
        let link = GattLink::new(peripheral.clone(), Duration::from_secs(30));
        let endpoint = GattEndpoint::new(sony::LOCATION_SERVICE_UUID, sony::LOCATION_CHAR_UUID);
        peripheral.fail_writes(endpoint.characteristic, Fault::Fail, Some(2));
        let (_tx, rx) = watch::channel(false);

        write_with_retry(&link, endpoint, &[0xAA], 3, Duration::from_millis(500), rx)
            .await
            .unwrap();
        assert_eq!(peripheral.writes_to(endpoint.characteristic).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_does_not_consume_retries() {
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&sony::GATT_SPEC));
        let link = GattLink::new(peripheral.clone(), Duration::from_secs(30));
        let endpoint = GattEndpoint::new(sony::LOCATION_SERVICE_UUID, sony::LOCATION_CHAR_UUID);
        peripheral.fail_writes(endpoint.characteristic, Fault::Cancel, None);
        let (_tx, rx) = watch::channel(false);

        let err = write_with_retry(&link, endpoint, &[0xAA], 3, Duration::from_millis(500), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(peripheral.ops(), vec![GattOp::Write {
            characteristic: endpoint.characteristic,
            value: vec![0xAA],
        }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_signal_interrupts_in_flight_write() {
        let peripheral = Arc::new(SimulatedPeripheral::from_spec(&sony::GATT_SPEC));
        let link = GattLink::new(peripheral.clone(), Duration::from_secs(30));
        let endpoint = GattEndpoint::new(sony::LOCATION_SERVICE_UUID, sony::LOCATION_CHAR_UUID);
        peripheral.fail_writes(endpoint.characteristic, Fault::Hang, None);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            write_with_retry(&link, endpoint, &[0xAA], 3, Duration::from_millis(500), rx).await
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send_replace(true);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(peripheral.writes_to(endpoint.characteristic).len(), 1);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SyncSettings {
            time_zone: "Asia/Tokyo".to_string(),
            ..SyncSettings::default()
        };
        let config = DelegateConfig::from_settings(&settings).unwrap();
        assert_eq!(config.time_zone, chrono_tz::Asia::Tokyo);
        assert_eq!(config.write_timeout, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 3);

        let bad = SyncSettings {
            time_zone: "Mars/Olympus".to_string(),
            ..SyncSettings::default()
        };
        assert!(DelegateConfig::from_settings(&bad).is_err());
    }
}
