//! MediaStore - Evidence Artifact Persistence
//!
//! ## Responsibilities
//!
//! - Deterministic artifact identities: `{module_id}_{camera_id}_{unix_secs}`
//!   with a `_org` suffix for the raw variant
//! - JPEG stills under per-module/per-camera directories, created on first use
//! - MP4 clips muxed from frame sequences via an external ffmpeg process
//! - Public URI derivation for backend notifications

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tokio::fs;
use tokio::process::Command;

use crate::error::{Error, Result};

/// JPEG quality for persisted evidence stills.
const EVIDENCE_JPEG_QUALITY: u8 = 80;

/// Identity shared by every artifact of one evidence event.
#[derive(Debug, Clone)]
pub struct ArtifactId {
    pub module_id: String,
    pub camera_id: String,
    pub timestamp_secs: i64,
}

impl ArtifactId {
    pub fn new(module_id: &str, camera_id: &str, timestamp_secs: i64) -> Self {
        Self {
            module_id: module_id.to_string(),
            camera_id: camera_id.to_string(),
            timestamp_secs,
        }
    }

    /// `{module_id}_{camera_id}_{timestamp}`
    pub fn stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.module_id, self.camera_id, self.timestamp_secs
        )
    }
}

/// Persisted image pair.
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Annotated (log) variant URI.
    pub log_uri: String,
    /// Raw (org) variant URI.
    pub org_uri: String,
}

/// Persisted clip pair.
#[derive(Debug, Clone)]
pub struct StoredClip {
    pub log_uri: String,
    pub org_uri: String,
}

/// Filesystem-backed media store.
pub struct FsMediaStore {
    images_root: PathBuf,
    videos_root: PathBuf,
    temp_dir: PathBuf,
    ffmpeg_timeout: Duration,
}

impl FsMediaStore {
    pub fn new(media_root: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        let media_root = media_root.into();
        Self {
            images_root: media_root.join("images"),
            videos_root: media_root.join("videos"),
            temp_dir: temp_dir.into(),
            ffmpeg_timeout: Duration::from_secs(30),
        }
    }

    /// Persist the annotated + raw stills for an image event.
    pub async fn store_image(
        &self,
        id: &ArtifactId,
        log_frame: &RgbImage,
        org_frame: &RgbImage,
    ) -> Result<StoredImage> {
        let dir = self.images_root.join(&id.module_id).join(&id.camera_id);
        fs::create_dir_all(&dir).await?;

        let stem = id.stem();
        let log_name = format!("{stem}.jpg");
        let org_name = format!("{stem}_org.jpg");

        let log_bytes = encode_jpeg(log_frame)?;
        let org_bytes = encode_jpeg(org_frame)?;
        fs::write(dir.join(&log_name), log_bytes).await?;
        fs::write(dir.join(&org_name), org_bytes).await?;

        Ok(StoredImage {
            log_uri: public_uri("images", id, &log_name),
            org_uri: public_uri("images", id, &org_name),
        })
    }

    /// Persist the annotated + raw clips for a video event.
    pub async fn store_clip(
        &self,
        id: &ArtifactId,
        log_frames: &[Arc<RgbImage>],
        org_frames: &[Arc<RgbImage>],
        fps: u32,
    ) -> Result<StoredClip> {
        if log_frames.is_empty() {
            return Err(Error::Dispatch("empty clip".to_string()));
        }

        let dir = self.videos_root.join(&id.module_id).join(&id.camera_id);
        fs::create_dir_all(&dir).await?;

        let stem = id.stem();
        let log_name = format!("{stem}.mp4");
        let org_name = format!("{stem}_org.mp4");

        self.mux_clip(&stem, "log", log_frames, fps, &dir.join(&log_name))
            .await?;
        self.mux_clip(&stem, "org", org_frames, fps, &dir.join(&org_name))
            .await?;

        Ok(StoredClip {
            log_uri: public_uri("videos", id, &log_name),
            org_uri: public_uri("videos", id, &org_name),
        })
    }

    /// Dump frames to a scratch directory and hand them to ffmpeg.
    async fn mux_clip(
        &self,
        stem: &str,
        variant: &str,
        frames: &[Arc<RgbImage>],
        fps: u32,
        out_path: &Path,
    ) -> Result<()> {
        let scratch = self.temp_dir.join(format!("{stem}_{variant}"));
        fs::create_dir_all(&scratch).await?;

        for (i, frame) in frames.iter().enumerate() {
            let bytes = encode_jpeg(frame)?;
            fs::write(scratch.join(format!("frame_{i:05}.jpg")), bytes).await?;
        }

        let pattern = scratch.join("frame_%05d.jpg");
        let framerate = fps.max(1).to_string();

        // kill_on_drop so a timed-out mux does not leak the process
        let child = Command::new("ffmpeg")
            .args([
                "-y",
                "-framerate",
                &framerate,
                "-i",
                pattern.to_string_lossy().as_ref(),
                "-loglevel",
                "error",
            ])
            .arg(out_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Dispatch(format!("ffmpeg spawn failed: {e}")))?;

        let output = tokio::time::timeout(self.ffmpeg_timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Dispatch("ffmpeg mux timed out".to_string()))??;

        let _ = fs::remove_dir_all(&scratch).await;

        if !output.status.success() {
            return Err(Error::Dispatch(format!(
                "ffmpeg mux failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(())
    }
}

fn public_uri(kind: &str, id: &ArtifactId, filename: &str) -> String {
    format!(
        "/public/{}/{}/{}/{}",
        kind, id.module_id, id.camera_id, filename
    )
}

fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, EVIDENCE_JPEG_QUALITY);
    frame.write_with_encoder(encoder)?;
    Ok(buf)
}
