//! Vendor registry
//!
//! Vendors are evaluated in registration order and the first match wins. Two
//! vendors recognising the same device is not resolved by scoring: the earlier
//! registration shadows the later one.

use crate::infrastructure::bluetooth::vendor::Vendor;
use std::collections::HashMap;
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorRegistry {
    vendors: Vec<Vendor>,
}

impl Default for VendorRegistry {
    fn default() -> Self {
        Self::new(Vendor::ALL.to_vec())
    }
}

impl VendorRegistry {
    pub fn new(vendors: Vec<Vendor>) -> Self {
        Self { vendors }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn vendors(&self) -> &[Vendor] {
        &self.vendors
    }

    pub fn identify(
        &self,
        device_name: Option<&str>,
        service_uuids: &[Uuid],
        manufacturer_data: &HashMap<u16, Vec<u8>>,
    ) -> Option<Vendor> {
        let found = self
            .vendors
            .iter()
            .copied()
            .find(|vendor| vendor.recognizes(device_name, service_uuids, manufacturer_data));

        match found {
            Some(vendor) => debug!("Identified {:?} as {}", device_name, vendor),
            None => trace!("No vendor recognises {:?}", device_name),
        }
        found
    }

    pub fn by_id(&self, vendor_id: &str) -> Option<Vendor> {
        self.vendors
            .iter()
            .copied()
            .find(|vendor| vendor.id().eq_ignore_ascii_case(vendor_id))
    }

    /// Union of every vendor's scan service UUIDs, first occurrence kept.
    pub fn all_scan_filter_service_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for uuid in self.vendors.iter().flat_map(|v| v.scan_service_uuids()) {
            if !ids.contains(uuid) {
                ids.push(*uuid);
            }
        }
        ids
    }

    /// Union of every vendor's name prefixes, first occurrence kept.
    pub fn all_scan_filter_name_prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = Vec::new();
        for prefix in self.vendors.iter().flat_map(|v| v.scan_name_prefixes()) {
            if !prefixes.iter().any(|p| p.eq_ignore_ascii_case(prefix)) {
                prefixes.push(prefix.to_string());
            }
        }
        prefixes
    }
}
