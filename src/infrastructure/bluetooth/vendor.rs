//! Supported camera vendors
//!
//! A closed set: each variant carries its GATT table, codec, capability flags
//! and advertisement signature as associated data.

use crate::domain::models::VendorMetadata;
use crate::infrastructure::bluetooth::connection::{
    ConnectionDelegate, DelegateConfig, GattDelegate,
};
use crate::infrastructure::bluetooth::gatt::GattSpec;
use crate::infrastructure::bluetooth::protocol::ricoh::{self, RicohCodec};
use crate::infrastructure::bluetooth::protocol::sony::{self, SonyCodec};
use crate::infrastructure::bluetooth::protocol::ProtocolCodec;
use crate::infrastructure::bluetooth::sony_delegate::SonyConnectionDelegate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

static RICOH_CODEC: RicohCodec = RicohCodec;
static SONY_CODEC: SonyCodec = SonyCodec::DEFAULT;

/// What a vendor can keep in sync over BLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCapabilities {
    pub location: bool,
    pub date_time: bool,
    pub time_zone: bool,
    pub geo_tagging_toggle: bool,
}

/// Remote-control features offered over BLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCapabilities {
    pub shutter: bool,
    pub half_press_focus: bool,
    pub live_view: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCapabilities {
    pub sync: SyncCapabilities,
    pub remote: RemoteCapabilities,
    /// Connecting over Wi-Fi unlocks more than BLE alone offers
    pub wifi_elevates_capabilities: bool,
    pub requires_pairing_init: bool,
}

/// Manufacturer-specific advertisement signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufacturerSignature {
    pub company_id: u16,
    /// Little-endian u16 at the start of the manufacturer payload
    pub device_type: u16,
}

impl ManufacturerSignature {
    pub fn matches(&self, manufacturer_data: &HashMap<u16, Vec<u8>>) -> bool {
        manufacturer_data
            .get(&self.company_id)
            .and_then(|data| data.get(0..2))
            .map(|field| u16::from_le_bytes([field[0], field[1]]) == self.device_type)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Ricoh,
    Sony,
}

impl Vendor {
    /// Default registration order. Sony goes first so its service UUID wins
    /// over the looser Ricoh name prefixes.
    pub const ALL: [Vendor; 2] = [Vendor::Sony, Vendor::Ricoh];

    /// Stable lookup key.
    pub const fn id(&self) -> &'static str {
        match self {
            Vendor::Ricoh => "ricoh",
            Vendor::Sony => "sony",
        }
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            Vendor::Ricoh => "Ricoh",
            Vendor::Sony => "Sony",
        }
    }

    pub fn gatt_spec(&self) -> &'static GattSpec {
        match self {
            Vendor::Ricoh => &ricoh::GATT_SPEC,
            Vendor::Sony => &sony::GATT_SPEC,
        }
    }

    /// Codec with default settings. Sessions may swap in a probed variant.
    pub fn codec(&self) -> &'static dyn ProtocolCodec {
        match self {
            Vendor::Ricoh => &RICOH_CODEC,
            Vendor::Sony => &SONY_CODEC,
        }
    }

    pub fn capabilities(&self) -> VendorCapabilities {
        match self {
            Vendor::Ricoh => VendorCapabilities {
                sync: SyncCapabilities {
                    location: true,
                    date_time: true,
                    time_zone: false,
                    geo_tagging_toggle: true,
                },
                remote: RemoteCapabilities {
                    shutter: false,
                    half_press_focus: false,
                    live_view: false,
                },
                wifi_elevates_capabilities: true,
                requires_pairing_init: false,
            },
            Vendor::Sony => VendorCapabilities {
                sync: SyncCapabilities {
                    location: true,
                    date_time: true,
                    time_zone: true,
                    geo_tagging_toggle: false,
                },
                remote: RemoteCapabilities {
                    shutter: true,
                    half_press_focus: true,
                    live_view: false,
                },
                wifi_elevates_capabilities: true,
                requires_pairing_init: true,
            },
        }
    }

    pub fn scan_service_uuids(&self) -> &'static [Uuid] {
        match self {
            Vendor::Ricoh => ricoh::SCAN_SERVICE_UUIDS,
            Vendor::Sony => sony::SCAN_SERVICE_UUIDS,
        }
    }

    pub fn scan_name_prefixes(&self) -> &'static [&'static str] {
        match self {
            Vendor::Ricoh => ricoh::NAME_PREFIXES,
            Vendor::Sony => sony::NAME_PREFIXES,
        }
    }

    pub fn manufacturer_signature(&self) -> ManufacturerSignature {
        match self {
            Vendor::Ricoh => ManufacturerSignature {
                company_id: ricoh::COMPANY_ID,
                device_type: ricoh::CAMERA_DEVICE_TYPE,
            },
            Vendor::Sony => ManufacturerSignature {
                company_id: sony::COMPANY_ID,
                device_type: sony::CAMERA_DEVICE_TYPE,
            },
        }
    }

    /// Any one of advertised service, manufacturer signature, or name prefix
    /// (case-insensitive) is enough.
    pub fn recognizes(
        &self,
        device_name: Option<&str>,
        service_uuids: &[Uuid],
        manufacturer_data: &HashMap<u16, Vec<u8>>,
    ) -> bool {
        let by_service = service_uuids
            .iter()
            .any(|uuid| self.scan_service_uuids().contains(uuid));
        if by_service {
            return true;
        }

        if self.manufacturer_signature().matches(manufacturer_data) {
            return true;
        }

        device_name
            .map(|name| {
                let name = name.trim().to_uppercase();
                self.scan_name_prefixes()
                    .iter()
                    .any(|prefix| has_name_prefix(&name, &prefix.to_uppercase()))
            })
            .unwrap_or(false)
    }

    /// Vendor-specific fields parsed from the advertisement.
    pub fn parse_metadata(&self, manufacturer_data: &HashMap<u16, Vec<u8>>) -> VendorMetadata {
        let mut metadata = VendorMetadata::new();
        let signature = self.manufacturer_signature();
        let Some(data) = manufacturer_data.get(&signature.company_id) else {
            return metadata;
        };

        if let Some(field) = data.get(0..2) {
            metadata.insert(
                "device_type".to_string(),
                serde_json::json!(u16::from_le_bytes([field[0], field[1]])),
            );
        }
        if let Vendor::Sony = self {
            if let Some(version) = sony::parse_protocol_version(data) {
                metadata.insert("protocol_version".to_string(), serde_json::json!(version));
            }
        }
        metadata
    }

    /// One delegate per connection; it owns that connection's session state.
    pub fn create_connection_delegate(&self, config: DelegateConfig) -> Arc<dyn ConnectionDelegate> {
        match self {
            Vendor::Ricoh => Arc::new(GattDelegate::new(*self, config)),
            Vendor::Sony => Arc::new(SonyConnectionDelegate::new(config)),
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A prefix ending in a letter or digit must end a word in `name`, so "GR"
/// matches "GR IIIx" and "GR_0A1B" but not "Greg's A7".
fn has_name_prefix(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    let open_ended = prefix
        .chars()
        .last()
        .map_or(true, |c| !c.is_alphanumeric());
    open_ended || rest.chars().next().map_or(true, |c| !c.is_alphanumeric())
}
