//! Attached media: download, sniff, first-frame extraction and upload.

use std::{io::Cursor, path::Path, process::Stdio, sync::Arc};

use anyhow::{Context as _, bail};
use image::{DynamicImage, ImageFormat};
use plugin_core::{ChatApi, Media};
use thiserror::Error;
use tokio::{io::AsyncWriteExt as _, process::Command};
use tracing::debug;
use uuid::Uuid;

use crate::{config::MediaSettings, extract::MediaReference, storage::ObjectStore};

const SNIFF_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Webm,
    Unknown,
}

impl MediaFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Webm => "webm",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif | Self::Webm | Self::Unknown => "application/octet-stream",
        }
    }

    const fn is_motion(self) -> bool {
        matches!(self, Self::Gif | Self::Webm)
    }
}

/// Identify the container from its leading magic bytes.
#[must_use]
pub fn sniff(bytes: &[u8]) -> MediaFormat {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        MediaFormat::Jpeg
    } else if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        MediaFormat::Png
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        MediaFormat::Gif
    } else if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        MediaFormat::Webp
    } else if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        MediaFormat::Webm
    } else {
        MediaFormat::Unknown
    }
}

/// Per-item failure. The message stays in the batch with a placeholder text.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("download failed: {0}")]
    Download(String),
    #[error("media is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("first frame extraction failed: {0}")]
    FrameExtraction(String),
    #[error("unsupported media format: {0}")]
    Unsupported(&'static str),
    #[error("object storage not configured")]
    StorageUnavailable,
    #[error("upload failed: {0}")]
    Upload(String),
}

impl MediaError {
    /// Text rendered in place of the media.
    #[must_use]
    pub fn placeholder(&self) -> String {
        match self {
            Self::Download(_) => "*Media processing failed*".to_owned(),
            Self::TooLarge { .. } => "*Media file too large*".to_owned(),
            Self::FrameExtraction(_) => "*Failed to extract first frame*".to_owned(),
            Self::Unsupported(fmt) => format!("*Unsupported media format: {fmt}*"),
            Self::StorageUnavailable => "*Object storage not configured*".to_owned(),
            Self::Upload(_) => "*Upload failed*".to_owned(),
        }
    }
}

/// Decode the first frame of any format the `image` crate reads and
/// re-encode it as JPEG.
///
/// # Errors
///
/// Returns the decoder or encoder error.
pub fn extract_first_frame(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let frame = image::load_from_memory(bytes)?;
    let rgb = DynamicImage::ImageRgb8(frame.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

async fn ffmpeg_first_frame(ffmpeg: &Path, data: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let mut child = Command::new(ffmpeg)
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            "pipe:0",
            "-frames:v",
            "1",
            "-f",
            "image2",
            "-c:v",
            "mjpeg",
            "pipe:1",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning {}", ffmpeg.display()))?;

    let mut stdin = child.stdin.take().context("ffmpeg stdin unavailable")?;
    let feeder = tokio::spawn(async move {
        // ffmpeg closes the pipe once it has its frame; a broken pipe is fine.
        let _ = stdin.write_all(&data).await;
    });

    let output = child
        .wait_with_output()
        .await
        .context("waiting for ffmpeg")?;
    let _ = feeder.await;

    if !output.status.success() || output.stdout.is_empty() {
        bail!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output.stdout)
}

/// Turns one attachment into a publicly reachable image.
pub struct MediaPipeline<'a> {
    pub chat: &'a dyn ChatApi,
    pub store: Option<&'a dyn ObjectStore>,
    pub settings: &'a MediaSettings,
}

impl core::fmt::Debug for MediaPipeline<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MediaPipeline")
            .field("has_store", &self.store.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MediaPipeline<'_> {
    /// # Errors
    ///
    /// Every failure maps to a [`MediaError`] whose placeholder replaces the
    /// message text.
    pub async fn process(&self, media: &Media) -> Result<MediaReference, MediaError> {
        let store = self.store.ok_or(MediaError::StorageUnavailable)?;

        let bytes = self
            .chat
            .download(media.handle())
            .await
            .map_err(|e| MediaError::Download(format!("{e:#}")))?;
        if bytes.len() > self.settings.max_file_size {
            return Err(MediaError::TooLarge {
                size: bytes.len(),
                limit: self.settings.max_file_size,
            });
        }

        let format = sniff(&bytes);
        let (data, key, content_type) = if format.is_motion() || media.is_animation() {
            let frame = self.first_frame(bytes).await?;
            (
                frame,
                format!("frame_{}.jpg", Uuid::new_v4()),
                MediaFormat::Jpeg.content_type(),
            )
        } else {
            if !self.settings.supports(format.extension()) {
                return Err(MediaError::Unsupported(format.extension()));
            }
            (
                bytes,
                format!("media_{}.{}", Uuid::new_v4(), format.extension()),
                format.content_type(),
            )
        };

        store
            .put(&key, &data, content_type)
            .await
            .map_err(|e| MediaError::Upload(format!("{e:#}")))?;
        debug!(key = %key, bytes = data.len(), format = format.extension(), "Uploaded quote media");

        Ok(MediaReference {
            url: store.public_url(&key),
            key,
            kind: "image".to_owned(),
        })
    }

    async fn first_frame(&self, bytes: Vec<u8>) -> Result<Vec<u8>, MediaError> {
        let data: Arc<[u8]> = bytes.into();
        let input = Arc::clone(&data);
        let decoded = tokio::task::spawn_blocking(move || extract_first_frame(&input))
            .await
            .map_err(|e| MediaError::FrameExtraction(e.to_string()))?;

        match decoded {
            Ok(jpeg) => Ok(jpeg),
            Err(err) => {
                let Some(ffmpeg) = self.settings.ffmpeg_path.as_deref() else {
                    return Err(MediaError::FrameExtraction(err.to_string()));
                };
                debug!(error = %err, "Image decoder gave up, falling back to ffmpeg");
                ffmpeg_first_frame(ffmpeg, data.to_vec())
                    .await
                    .map_err(|e| MediaError::FrameExtraction(format!("{e:#}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 4, Rgba([200, 30, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn sniffs_known_magic() {
        let mut webp = b"RIFF\0\0\0\0WEBPVP8 ".to_vec();
        webp.extend_from_slice(&[0; 16]);
        assert_eq!(sniff(&webp), MediaFormat::Webp);
        assert_eq!(sniff(&[0x1A, 0x45, 0xDF, 0xA3, 0x01, 0x00]), MediaFormat::Webm);
        assert_eq!(sniff(b"GIF89a...."), MediaFormat::Gif);
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), MediaFormat::Jpeg);
        assert_eq!(sniff(&encoded(ImageFormat::Png)), MediaFormat::Png);
    }

    #[test]
    fn junk_and_short_input_are_unknown() {
        assert_eq!(sniff(b"hello world, not an image"), MediaFormat::Unknown);
        assert_eq!(sniff(b"RIFF"), MediaFormat::Unknown);
        assert_eq!(sniff(&[]), MediaFormat::Unknown);
    }

    #[test]
    fn gif_first_frame_becomes_jpeg() {
        let gif = encoded(ImageFormat::Gif);
        assert_eq!(sniff(&gif), MediaFormat::Gif);
        let jpeg = extract_first_frame(&gif).unwrap();
        assert_eq!(sniff(&jpeg), MediaFormat::Jpeg);
    }

    #[test]
    fn rgb_input_is_accepted() {
        let img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        assert!(extract_first_frame(&out.into_inner()).is_ok());
    }

    #[test]
    fn undecodable_frames_error() {
        assert!(extract_first_frame(&[0x1A, 0x45, 0xDF, 0xA3, 0, 0, 0]).is_err());
    }

    #[test]
    fn placeholders_are_fixed_strings() {
        assert_eq!(
            MediaError::TooLarge { size: 2, limit: 1 }.placeholder(),
            "*Media file too large*"
        );
        assert_eq!(
            MediaError::Unsupported("gif").placeholder(),
            "*Unsupported media format: gif*"
        );
        assert_eq!(MediaError::Upload("x".to_owned()).placeholder(), "*Upload failed*");
    }
}
