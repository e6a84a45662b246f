//! ConfigStore - Deployment Configuration
//!
//! ## Responsibilities
//!
//! - Load the per-site zone file once at startup: per-camera trigger and
//!   display polygons plus detection tuning
//! - Validate polygons before any camera task starts
//! - Fetch the camera roster for this host from the backend directory
//!
//! Configuration is an explicit value passed to components at construction;
//! nothing here is read through ambient global state.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};
use crate::geometry::Polygon;
use crate::zone_detector::DetectorConfig;

/// Zone polygons for one camera.
///
/// The trigger zone is what containment is tested against; the display zone
/// is the boundary drawn on annotated frames. They are configured
/// independently because the visual boundary usually extends past the fence
/// line the alarm fires on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraZones {
    pub trigger_zone: Polygon,
    pub display_zone: Polygon,
}

/// Whole-site configuration loaded from the zone file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Detection tuning shared by all cameras.
    pub detector: DetectorConfig,
    /// Consecutive clear frames required to leave alarm state.
    pub clear_frame_threshold: u32,
    /// Evidence queue capacity.
    pub queue_capacity: usize,
    /// Per-camera zones, keyed by camera id.
    pub cameras: HashMap<String, CameraZones>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            clear_frame_threshold: 7,
            queue_capacity: 64,
            cameras: HashMap::new(),
        }
    }
}

impl SiteConfig {
    pub fn zones_for(&self, camera_id: &str) -> Option<&CameraZones> {
        self.cameras.get(camera_id)
    }
}

/// Load and validate the zone file.
pub async fn load_site_config(path: impl AsRef<Path>) -> Result<SiteConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| Error::Config(format!("cannot read zone file {}: {e}", path.display())))?;

    let config: SiteConfig = serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid zone file {}: {e}", path.display())))?;

    for (camera_id, zones) in &config.cameras {
        if zones.trigger_zone.len() < 3 || zones.display_zone.len() < 3 {
            return Err(Error::Config(format!(
                "camera {camera_id}: polygons need at least 3 vertices"
            )));
        }
    }

    Ok(config)
}

#[derive(Debug, Deserialize)]
struct RosterCamera {
    camera_id: String,
}

#[derive(Debug, Deserialize)]
struct RosterData {
    cameras: Vec<RosterCamera>,
}

#[derive(Debug, Deserialize)]
struct RosterResponse {
    data: RosterData,
}

fn parse_roster(body: &str) -> Result<Vec<String>> {
    let parsed: RosterResponse = serde_json::from_str(body)?;
    Ok(parsed.data.cameras.into_iter().map(|c| c.camera_id).collect())
}

/// Startup-only client for the backend camera directory.
pub struct RosterClient {
    client: reqwest::Client,
    base_url: String,
}

impl RosterClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    /// Active camera ids assigned to this host.
    pub async fn camera_ids(&self, host: &str) -> Result<Vec<String>> {
        let url = format!("{}/camera/{}", self.base_url, host);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Config(format!(
                "roster fetch returned {}",
                resp.status()
            )));
        }
        let body = resp.text().await?;
        parse_roster(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roster_payload() {
        let body = r#"{"data":{"cameras":[{"camera_id":"camera-1"},{"camera_id":"camera-2"}]}}"#;
        let ids = parse_roster(body).unwrap();
        assert_eq!(ids, vec!["camera-1", "camera-2"]);
    }

    #[test]
    fn test_parse_roster_rejects_malformed() {
        assert!(parse_roster(r#"{"cameras":[]}"#).is_err());
    }

    #[tokio::test]
    async fn test_load_site_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");

        let mut config = SiteConfig::default();
        config.cameras.insert(
            "camera-1".to_string(),
            CameraZones {
                trigger_zone: vec![[3, 484], [849, 73], [880, 202], [114, 718]],
                display_zone: vec![[866, 4], [888, 206], [153, 717], [5, 716]],
            },
        );
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap())
            .await
            .unwrap();

        let loaded = load_site_config(&path).await.unwrap();
        assert_eq!(loaded.clear_frame_threshold, 7);
        assert_eq!(loaded.cameras.len(), 1);
        assert_eq!(
            loaded.zones_for("camera-1").unwrap().trigger_zone[1],
            [849, 73]
        );
    }

    #[tokio::test]
    async fn test_load_site_config_rejects_degenerate_polygon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        let raw = r#"{
            "cameras": {
                "camera-1": {
                    "trigger_zone": [[0, 0], [10, 10]],
                    "display_zone": [[0, 0], [10, 0], [10, 10]]
                }
            }
        }"#;
        fs::write(&path, raw).await.unwrap();

        let err = load_site_config(&path).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_zone_file_is_config_error() {
        let err = load_site_config("/nonexistent/zones.json").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
