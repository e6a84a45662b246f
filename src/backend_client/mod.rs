//! BackendClient - Outbound Notification Adapter
//!
//! ## Responsibilities
//!
//! - POST event metadata for persisted evidence (short timeout, no retry)
//! - Best-effort live frame push for the preview stream
//! - No-op variant selected at construction when no backend is configured

use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Serialize;

use crate::error::{Error, Result};

/// JPEG quality for the live preview push.
const STREAM_JPEG_QUALITY: u8 = 70;

/// Event notification payload.
#[derive(Debug, Clone, Serialize)]
pub struct EventMessage {
    pub camera_id: String,
    pub module_id: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_uri: Option<String>,
    #[serde(rename = "msgType")]
    pub msg_type: i32,
    /// Host serving the video artifact; only set for video events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
}

/// HTTP-backed sink.
pub struct HttpEventSink {
    client: reqwest::Client,
    event_url: String,
    stream_base: String,
    module_id: String,
}

impl HttpEventSink {
    pub fn new(event_url: String, stream_base: String, module_id: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            event_url,
            stream_base,
            module_id,
        }
    }

    fn stream_url(&self, camera_id: &str) -> String {
        format!(
            "{}/stream-manage/output/{}-{}",
            self.stream_base, self.module_id, camera_id
        )
    }

    async fn post_event(&self, url: &str, message: &EventMessage) -> Result<()> {
        let resp = self.client.post(url).json(message).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Dispatch(format!(
                "event post rejected: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Capability handle for outbound notifications; `Noop` keeps the pipeline
/// running in deployments without a backend.
pub enum EventSink {
    Http(HttpEventSink),
    Noop,
}

impl EventSink {
    /// POST image-event metadata. Failures are the caller's to log and drop.
    pub async fn post_image_event(&self, message: &EventMessage) -> Result<()> {
        match self {
            EventSink::Http(sink) => sink.post_event(&sink.event_url, message).await,
            EventSink::Noop => Ok(()),
        }
    }

    /// POST video-event metadata to the video endpoint.
    pub async fn post_video_event(&self, message: &EventMessage) -> Result<()> {
        match self {
            EventSink::Http(sink) => {
                let url = format!("{}/video", sink.event_url);
                sink.post_event(&url, message).await
            }
            EventSink::Noop => Ok(()),
        }
    }

    /// Push one preview frame, fire-and-forget: failures are swallowed after
    /// logging, and the 1 s timeout abandons slow peers.
    pub async fn post_frame(&self, camera_id: &str, frame: &RgbImage) {
        let EventSink::Http(sink) = self else {
            return;
        };

        let mut bytes = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut bytes, STREAM_JPEG_QUALITY);
        if let Err(e) = frame.write_with_encoder(encoder) {
            tracing::warn!(camera_id = %camera_id, error = %e, "Frame encode failed");
            return;
        }

        let url = sink.stream_url(camera_id);
        let result = sink
            .client
            .post(&url)
            .timeout(Duration::from_secs(1))
            .body(bytes)
            .send()
            .await;

        if let Err(e) = result {
            tracing::debug!(camera_id = %camera_id, error = %e, "Frame push failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_message_serialization() {
        let msg = EventMessage {
            camera_id: "camera-1".to_string(),
            module_id: "motion-detections".to_string(),
            timestamp: 1700000000,
            image_uri: Some("/public/images/m/c/x.jpg".to_string()),
            video_uri: None,
            msg_type: 2,
            dns: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["msgType"], 2);
        assert_eq!(json["timestamp"], 1700000000);
        assert!(json.get("video_uri").is_none());
        assert!(json.get("dns").is_none());
    }

    #[test]
    fn test_stream_url_layout() {
        let sink = HttpEventSink::new(
            "http://backend:8080/event".to_string(),
            "http://10.0.0.5:8005".to_string(),
            "motion-detections".to_string(),
        );
        assert_eq!(
            sink.stream_url("camera-3"),
            "http://10.0.0.5:8005/stream-manage/output/motion-detections-camera-3"
        );
    }

    #[tokio::test]
    async fn test_noop_sink_accepts_everything() {
        let sink = EventSink::Noop;
        let msg = EventMessage {
            camera_id: "c".to_string(),
            module_id: "m".to_string(),
            timestamp: 0,
            image_uri: None,
            video_uri: None,
            msg_type: 2,
            dns: None,
        };
        assert!(sink.post_image_event(&msg).await.is_ok());
        assert!(sink.post_video_event(&msg).await.is_ok());
        sink.post_frame("c", &RgbImage::new(2, 2)).await;
    }
}
