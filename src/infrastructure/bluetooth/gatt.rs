//! GATT descriptors
//!
//! Declarative per-vendor tables of service/characteristic identifiers. A
//! `None` entry means the vendor does not support the feature; anything that
//! needs it fails with [`SyncError::ConfigurationMissing`](crate::error::SyncError).

use std::fmt;
use uuid::Uuid;

/// Bluetooth SIG base UUID: `0000xxxx-0000-1000-8000-00805f9b34fb`.
const SIG_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Expand a 16-bit assigned number into a full UUID.
pub const fn uuid16(short: u16) -> Uuid {
    Uuid::from_u128(SIG_BASE_UUID | ((short as u128) << 96))
}

/// Generic Access service and Device Name characteristic.
pub const GAP_SERVICE: Uuid = uuid16(0x1800);
pub const DEVICE_NAME_CHAR: Uuid = uuid16(0x2A00);

/// Device Information service characteristics.
pub const DEVICE_INFO_SERVICE: Uuid = uuid16(0x180A);
pub const FIRMWARE_REVISION_CHAR: Uuid = uuid16(0x2A26);
pub const HARDWARE_REVISION_CHAR: Uuid = uuid16(0x2A27);

/// A characteristic addressed through its owning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattEndpoint {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl GattEndpoint {
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

/// Features a vendor may expose through GATT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GattFeature {
    Location,
    DateTime,
    GeoTagging,
    DeviceName,
    FirmwareVersion,
    HardwareRevision,
    Pairing,
    RemoteControl,
    LocationStatus,
    LocationLock,
    LocationEnable,
    TimeCorrection,
    AreaAdjustment,
    LocationConfig,
}

impl GattFeature {
    pub const ALL: [GattFeature; 14] = [
        GattFeature::Location,
        GattFeature::DateTime,
        GattFeature::GeoTagging,
        GattFeature::DeviceName,
        GattFeature::FirmwareVersion,
        GattFeature::HardwareRevision,
        GattFeature::Pairing,
        GattFeature::RemoteControl,
        GattFeature::LocationStatus,
        GattFeature::LocationLock,
        GattFeature::LocationEnable,
        GattFeature::TimeCorrection,
        GattFeature::AreaAdjustment,
        GattFeature::LocationConfig,
    ];
}

impl fmt::Display for GattFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Location => "location",
            Self::DateTime => "date/time",
            Self::GeoTagging => "geotagging",
            Self::DeviceName => "device name",
            Self::FirmwareVersion => "firmware version",
            Self::HardwareRevision => "hardware revision",
            Self::Pairing => "pairing",
            Self::RemoteControl => "remote control",
            Self::LocationStatus => "location status",
            Self::LocationLock => "location lock",
            Self::LocationEnable => "location enable",
            Self::TimeCorrection => "time correction",
            Self::AreaAdjustment => "area adjustment",
            Self::LocationConfig => "location config",
        };
        f.write_str(name)
    }
}

/// Per-vendor characteristic table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattSpec {
    pub location: Option<GattEndpoint>,
    pub date_time: Option<GattEndpoint>,
    pub geo_tagging: Option<GattEndpoint>,
    pub device_name: Option<GattEndpoint>,
    pub firmware_version: Option<GattEndpoint>,
    pub hardware_revision: Option<GattEndpoint>,
    pub pairing: Option<GattEndpoint>,
    pub remote_control: Option<GattEndpoint>,
    /// Notification channel reporting location-transfer status
    pub location_status: Option<GattEndpoint>,
    pub location_lock: Option<GattEndpoint>,
    pub location_enable: Option<GattEndpoint>,
    pub time_correction: Option<GattEndpoint>,
    pub area_adjustment: Option<GattEndpoint>,
    /// Config blob whose byte 4 bit 1 selects the location packet size
    pub location_config: Option<GattEndpoint>,
}

impl GattSpec {
    /// Table with every feature absent.
    pub const EMPTY: GattSpec = GattSpec {
        location: None,
        date_time: None,
        geo_tagging: None,
        device_name: None,
        firmware_version: None,
        hardware_revision: None,
        pairing: None,
        remote_control: None,
        location_status: None,
        location_lock: None,
        location_enable: None,
        time_correction: None,
        area_adjustment: None,
        location_config: None,
    };

    pub fn endpoint(&self, feature: GattFeature) -> Option<GattEndpoint> {
        match feature {
            GattFeature::Location => self.location,
            GattFeature::DateTime => self.date_time,
            GattFeature::GeoTagging => self.geo_tagging,
            GattFeature::DeviceName => self.device_name,
            GattFeature::FirmwareVersion => self.firmware_version,
            GattFeature::HardwareRevision => self.hardware_revision,
            GattFeature::Pairing => self.pairing,
            GattFeature::RemoteControl => self.remote_control,
            GattFeature::LocationStatus => self.location_status,
            GattFeature::LocationLock => self.location_lock,
            GattFeature::LocationEnable => self.location_enable,
            GattFeature::TimeCorrection => self.time_correction,
            GattFeature::AreaAdjustment => self.area_adjustment,
            GattFeature::LocationConfig => self.location_config,
        }
    }

    /// Every endpoint the table defines.
    pub fn endpoints(&self) -> impl Iterator<Item = GattEndpoint> + '_ {
        GattFeature::ALL
            .into_iter()
            .filter_map(move |feature| self.endpoint(feature))
    }

    pub fn supports(&self, feature: GattFeature) -> bool {
        self.endpoint(feature).is_some()
    }

    /// Whether the vendor requires the lock/enable handshake before syncing.
    pub fn has_location_lock(&self) -> bool {
        self.location_lock.is_some() && self.location_enable.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid16_expansion() {
        assert_eq!(
            uuid16(0x2A26).to_string(),
            "00002a26-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_empty_spec_supports_nothing() {
        assert!(!GattSpec::EMPTY.supports(GattFeature::Location));
        assert!(!GattSpec::EMPTY.has_location_lock());
    }
}
