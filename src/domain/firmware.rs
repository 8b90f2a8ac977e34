//! Published firmware versions
//!
//! The catalog is the JSON document produced by the vendor download-page
//! scraper: `{"last_updated": "...", "cameras": {"GR IIIx": "1.60", ...}}`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareCatalog {
    pub last_updated: DateTime<Utc>,
    /// Normalized model name -> latest version
    pub cameras: BTreeMap<String, String>,
}

impl FirmwareCatalog {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let raw: FirmwareCatalog =
            serde_json::from_str(json).context("Invalid firmware catalog")?;
        let cameras = raw
            .cameras
            .into_iter()
            .map(|(model, version)| (normalize_model_name(&model), version.trim().to_string()))
            .collect();
        Ok(Self {
            last_updated: raw.last_updated,
            cameras,
        })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&contents)
    }

    pub fn latest_for(&self, model: &str) -> Option<&str> {
        self.cameras
            .get(&normalize_model_name(model))
            .map(String::as_str)
    }

    /// `None` when the model is not in the catalog or either version has no
    /// numeric component.
    pub fn is_update_available(&self, model: &str, current: &str) -> Option<bool> {
        let latest = self.latest_for(model)?;
        compare_versions(latest, current).map(|o| o == Ordering::Greater)
    }
}

/// Collapse whitespace and drop the `RICOH ` brand prefix.
pub fn normalize_model_name(model: &str) -> String {
    let collapsed = model.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("ricoh ") => collapsed[6..].to_string(),
        _ => collapsed,
    }
}

/// Dotted-numeric components, ignoring any leading label such as `Ver.`.
fn version_components(version: &str) -> Option<Vec<u32>> {
    let start = version.find(|c: char| c.is_ascii_digit())?;
    let numeric: String = version[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

/// Compare dotted versions numerically; missing trailing parts count as zero.
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = version_components(a)?;
    let b = version_components(b)?;
    let len = a.len().max(b.len());
    let part = |v: &[u32], i: usize| v.get(i).copied().unwrap_or(0);
    Some(
        (0..len)
            .map(|i| part(&a, i).cmp(&part(&b, i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal),
    )
}
