//! BLE Scanner Module
//!
//! Turns raw advertisements from the platform scanner into vendor-tagged
//! [`Camera`] records.

use crate::domain::models::{AppEvent, Camera, MessageSeverity, StatusMessage};
use crate::infrastructure::bluetooth::registry::VendorRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// One advertisement as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
    pub service_uuids: Vec<Uuid>,
    /// Company identifier -> payload
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub rssi: Option<i16>,
}

/// Combined platform scan filter across every registered vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub service_uuids: Vec<Uuid>,
    pub name_prefixes: Vec<String>,
}

impl ScanFilter {
    pub fn from_registry(registry: &VendorRegistry) -> Self {
        Self {
            service_uuids: registry.all_scan_filter_service_ids(),
            name_prefixes: registry.all_scan_filter_name_prefixes(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service_uuids.is_empty() && self.name_prefixes.is_empty()
    }
}

/// BLE Scanner for discovering supported cameras
pub struct BleScanner {
    registry: Arc<VendorRegistry>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    seen: HashSet<String>,
    scanning: bool,
}

impl BleScanner {
    pub fn new(registry: Arc<VendorRegistry>, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            registry,
            event_sender,
            seen: HashSet::new(),
            scanning: false,
        }
    }

    /// Start a scan session and return the filter the platform should apply.
    pub fn start(&mut self) -> ScanFilter {
        self.seen.clear();
        self.scanning = true;

        let filter = ScanFilter::from_registry(&self.registry);
        info!(
            "Starting BLE scan ({} service UUIDs, {} name prefixes)",
            filter.service_uuids.len(),
            filter.name_prefixes.len()
        );
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: "Scanning for cameras...".to_string(),
            severity: MessageSeverity::Info,
        }));
        filter
    }

    /// Identify an advertisement. Each address is reported once per scan.
    pub fn handle_advertisement(&mut self, adv: &Advertisement) -> Option<Camera> {
        if !self.scanning {
            return None;
        }

        let vendor =
            self.registry
                .identify(adv.name.as_deref(), &adv.service_uuids, &adv.manufacturer_data)?;

        if !self.seen.insert(adv.address.clone()) {
            return None;
        }

        let camera = Camera::new(adv.address.clone(), adv.name.clone(), vendor)
            .with_metadata(vendor.parse_metadata(&adv.manufacturer_data));
        debug!(
            "Found {} camera {} (rssi {:?})",
            vendor,
            camera.display_name(),
            adv.rssi
        );

        let _ = self.event_sender.send(AppEvent::CameraFound(camera.clone()));
        Some(camera)
    }

    /// Stop scanning
    pub fn stop(&mut self) {
        if self.scanning {
            info!("Stopping BLE scan...");
            let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
                message: "Scan stopped.".to_string(),
                severity: MessageSeverity::Info,
            }));
            self.scanning = false;
        }
    }

    /// Check if currently scanning
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }
}
