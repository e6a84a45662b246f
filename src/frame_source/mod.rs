//! Frame Source - Latest-Frame Acquisition
//!
//! ## Responsibilities
//!
//! - Per-camera background fetch task pulling the newest JPEG from the
//!   stream manager at a configured cadence
//! - Decode + resize to the working resolution off the detection path
//! - Publish frames through a watch channel so each detection loop runs at
//!   the cadence frames actually arrive
//!
//! A failed fetch keeps the previous frame in place; consumers simply see no
//! new frame and skip that cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::{imageops, RgbImage};
use tokio::sync::watch;

use crate::error::{Error, Result};

/// One decoded frame plus its capture time.
#[derive(Clone)]
pub struct SourcedFrame {
    pub frame: Arc<RgbImage>,
    pub captured_at: DateTime<Utc>,
}

/// Frame acquisition tuning.
#[derive(Debug, Clone)]
pub struct FrameSourceConfig {
    /// Stream manager base URL.
    pub stream_base: String,
    /// Per-camera refresh cadence.
    pub refresh_interval: Duration,
    /// Working resolution frames are normalized to.
    pub working_size: (u32, u32),
}

/// FrameSource instance shared by all cameras.
#[derive(Clone)]
pub struct FrameSource {
    client: reqwest::Client,
    config: FrameSourceConfig,
}

impl FrameSource {
    pub fn new(config: FrameSourceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn lastframe_url(&self, camera_id: &str) -> String {
        format!(
            "{}/stream-manage/lastframe/{}",
            self.config.stream_base, camera_id
        )
    }

    /// Spawn the fetch loop for one camera and hand back its frame channel.
    pub fn subscribe(
        &self,
        camera_id: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> watch::Receiver<Option<SourcedFrame>> {
        let (tx, rx) = watch::channel(None);
        let source = self.clone();
        let camera_id = camera_id.to_string();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(source.config.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => break,
                }

                match source.fetch(&camera_id).await {
                    Ok(frame) => {
                        let _ = tx.send(Some(SourcedFrame {
                            frame: Arc::new(frame),
                            captured_at: Utc::now(),
                        }));
                    }
                    Err(e) => {
                        // Keep the previous frame; the consumer skips this cycle.
                        tracing::trace!(camera_id = %camera_id, error = %e, "Frame fetch failed");
                    }
                }
            }
            tracing::info!(camera_id = %camera_id, "Frame fetch loop stopped");
        });

        rx
    }

    async fn fetch(&self, camera_id: &str) -> Result<RgbImage> {
        let url = self.lastframe_url(camera_id);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Acquisition(format!(
                "lastframe fetch for {} returned {}",
                camera_id,
                resp.status()
            )));
        }
        let bytes = resp.bytes().await?;
        decode_frame(&bytes, self.config.working_size)
    }
}

/// Decode an image payload and normalize it to the working resolution.
fn decode_frame(bytes: &[u8], (w, h): (u32, u32)) -> Result<RgbImage> {
    let decoded = image::load_from_memory(bytes)?.to_rgb8();
    if decoded.width() == w && decoded.height() == h {
        Ok(decoded)
    } else {
        Ok(imageops::resize(&decoded, w, h, imageops::FilterType::Triangle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;

    #[test]
    fn test_lastframe_url_layout() {
        let source = FrameSource::new(FrameSourceConfig {
            stream_base: "http://10.0.0.5:8005".to_string(),
            refresh_interval: Duration::from_millis(100),
            working_size: (1280, 720),
        });
        assert_eq!(
            source.lastframe_url("camera-1"),
            "http://10.0.0.5:8005/stream-manage/lastframe/camera-1"
        );
    }

    #[test]
    fn test_decode_frame_normalizes_resolution() {
        let img = RgbImage::new(64, 48);
        let mut bytes = Vec::new();
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, 80))
            .unwrap();

        let decoded = decode_frame(&bytes, (32, 24)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(decode_frame(b"not an image", (32, 24)).is_err());
    }
}
