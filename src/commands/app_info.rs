use crate::error::{Result, SyncError};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Version of this tool
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

fn value_to_string<E: serde::de::Error>(value: Value) -> std::result::Result<String, E> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(E::custom("expected string or number")),
    }
}

/// Custom deserializer that accepts both strings and numbers, converting to string
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    value_to_string(Value::deserialize(deserializer)?)
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => value_to_string(other).map(Some),
    }
}

/// Release manifest published next to the texture pack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub version: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub release_url: Option<String>,
    /// Total size of the texture pack (e.g., "8.5 GB" or just "22.5")
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub total_size: Option<String>,
    /// Scratch space the installer needs while staging
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub temp_size: Option<String>,
    /// Minimum required version of this tool
    #[serde(deserialize_with = "string_or_number")]
    pub min_downloader_app_version: String,
    #[serde(default)]
    pub downloader_app_url: Option<String>,
    /// Directories fetched as a whole by the installer
    #[serde(default)]
    pub download_complete: Vec<String>,
    /// Directories whose immediate children are fetched as separate groups
    #[serde(default)]
    pub download_subdirectories: Vec<String>,
}

impl Manifest {
    /// Whether `app_version` meets the manifest's minimum
    pub fn is_compatible(&self, app_version: &str) -> bool {
        compare_versions(app_version, &self.min_downloader_app_version) != Ordering::Less
    }
}

/// Fetch the manifest JSON
pub async fn fetch_manifest(url: &str) -> Result<Manifest> {
    let client = Client::new();
    let response = client
        .get(url)
        .header("User-Agent", "NCAA-NEXT-Textures-Sync")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(SyncError::Status {
            status: response.status().as_u16(),
            url: url.to_string(),
            body: response.text().await.unwrap_or_default(),
        });
    }

    response
        .json::<Manifest>()
        .await
        .map_err(|e| SyncError::parse("installer data", e))
}

/// Compare dotted numeric versions; missing components count as 0
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    let parse_version = |v: &str| -> Vec<u32> {
        v.trim()
            .split('.')
            .filter_map(|s| s.parse::<u32>().ok())
            .collect()
    };

    let v1_parts = parse_version(v1);
    let v2_parts = parse_version(v2);

    let max_len = v1_parts.len().max(v2_parts.len());
    (0..max_len)
        .map(|i| {
            let p1 = v1_parts.get(i).copied().unwrap_or(0);
            let p2 = v2_parts.get(i).copied().unwrap_or(0);
            p1.cmp(&p2)
        })
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_compare_numerically() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "2"), Ordering::Equal);
        assert_eq!(compare_versions("1.2.3", "1.3"), Ordering::Less);
    }

    #[test]
    fn manifest_accepts_numbers_for_versions_and_sizes() {
        let json = r#"{
            "version": 3.1,
            "release_date": "2025-08-01",
            "total_size": 22.5,
            "min_downloader_app_version": 2,
            "download_complete": ["textures/SLUS-21214/replacements/ui"],
            "download_subdirectories": ["textures/SLUS-21214/replacements/teams"]
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.version.as_deref(), Some("3.1"));
        assert_eq!(manifest.total_size.as_deref(), Some("22.5"));
        assert_eq!(manifest.temp_size, None);
        assert!(manifest.is_compatible("2.0.0"));
        assert!(!manifest.is_compatible("1.9"));
        assert_eq!(manifest.download_subdirectories.len(), 1);
    }
}
