use crate::infrastructure::bluetooth::vendor::Vendor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open per-vendor facts parsed from the advertisement (e.g. `protocol_version`).
pub type VendorMetadata = BTreeMap<String, serde_json::Value>;

/// A camera as discovered from its advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    pub name: Option<String>,
    /// MAC-style address, also the connection key
    pub address: String,
    pub vendor: Vendor,
    #[serde(default)]
    pub metadata: VendorMetadata,
}

impl Camera {
    pub fn new(address: impl Into<String>, name: Option<String>, vendor: Vendor) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            name,
            address,
            vendor,
            metadata: VendorMetadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: VendorMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Name if advertised, address otherwise.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    CameraFound(Camera),
    ConnectionStatus {
        camera_id: String,
        status: ConnectionStatus,
    },
    LocationSynced {
        camera_id: String,
        latitude: f64,
        longitude: f64,
    },
    DateTimeSynced {
        camera_id: String,
    },
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
