//! Playlist cover images
//!
//! Uploads arrive base64 encoded in any common raster format. They are
//! converted to an RGB JPEG small enough for the provider's cover endpoint
//! and parked on disk until the export task that owns them finishes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use moody_common::{Emotion, Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest edge of the stored cover
pub const COVER_MAX_EDGE: u32 = 640;

/// Provider limit on the base64 cover payload is 256 KiB
pub const MAX_COVER_JPEG_BYTES: usize = 190 * 1024;

/// Raw upload size accepted before decoding
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const JPEG_QUALITIES: [u8; 4] = [85, 70, 55, 40];

/// Decode a base64 upload (optionally a `data:` URL) into raw bytes
pub fn decode_upload(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::InvalidInput(format!("Cover image is not valid base64: {}", e)))?;

    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(Error::InvalidInput("Cover image is too large".to_string()));
    }
    match infer::get(&bytes) {
        Some(kind) if kind.mime_type().starts_with("image/") => Ok(bytes),
        _ => Err(Error::InvalidInput("Cover image must be an image file".to_string())),
    }
}

/// Convert any supported image to an RGB JPEG within the cover limits
pub fn convert_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidInput(format!("Unreadable cover image: {}", e)))?;
    let rgb = decoded.thumbnail(COVER_MAX_EDGE, COVER_MAX_EDGE).to_rgb8();

    let mut encoded = Vec::new();
    for quality in JPEG_QUALITIES {
        encoded.clear();
        JpegEncoder::new_with_quality(&mut encoded, quality)
            .encode_image(&rgb)
            .map_err(|e| Error::Internal(format!("JPEG encoding failed: {}", e)))?;
        if encoded.len() <= MAX_COVER_JPEG_BYTES {
            debug!(quality, bytes = encoded.len(), "Cover image encoded");
            return Ok(encoded);
        }
    }

    Err(Error::InvalidInput(
        "Cover image is too detailed to fit the Spotify size limit".to_string(),
    ))
}

/// Where the cover for (user, emotion, playlist) is parked
pub fn cover_path(dir: &Path, user_id: Uuid, emotion: Emotion, playlist_name: &str) -> PathBuf {
    let safe_name: String = playlist_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{}_{}_{}.jpg", user_id, emotion.code(), safe_name))
}

/// Decode, convert and persist an upload; returns the stored path
pub async fn save_cover(
    dir: &Path,
    user_id: Uuid,
    emotion: Emotion,
    playlist_name: &str,
    encoded: &str,
) -> Result<PathBuf> {
    let raw = decode_upload(encoded)?;
    let jpeg = tokio::task::spawn_blocking(move || convert_to_jpeg(&raw))
        .await
        .map_err(|e| Error::Internal(format!("Cover conversion task failed: {}", e)))??;

    tokio::fs::create_dir_all(dir).await?;
    let path = cover_path(dir, user_id, emotion, playlist_name);
    tokio::fs::write(&path, &jpeg).await?;
    debug!(path = %path.display(), bytes = jpeg.len(), "Cover image stored");
    Ok(path)
}

pub async fn load_cover(path: &Path) -> Result<Vec<u8>> {
    Ok(tokio::fs::read(path).await?)
}

/// Best-effort removal; a file already gone is fine
pub async fn remove_cover(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Cover image removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cover image"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 200])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_png_upload_becomes_bounded_jpeg() {
        let encoded = STANDARD.encode(png_bytes(1200, 800));
        let raw = decode_upload(&format!("data:image/png;base64,{}", encoded)).unwrap();
        let jpeg = convert_to_jpeg(&raw).unwrap();

        assert_eq!(infer::get(&jpeg).unwrap().mime_type(), "image/jpeg");
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 640);
        assert!(jpeg.len() <= MAX_COVER_JPEG_BYTES);
    }

    #[test]
    fn test_non_image_upload_rejected() {
        let encoded = STANDARD.encode(b"just some text, not a picture");
        assert!(matches!(decode_upload(&encoded), Err(Error::InvalidInput(_))));
        assert!(matches!(decode_upload("%%%"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_cover_path_sanitizes_name() {
        let user = Uuid::nil();
        let path = cover_path(Path::new("/tmp/covers"), user, Emotion::Happy, "my happy/../x");
        assert_eq!(
            path,
            PathBuf::from("/tmp/covers/00000000-0000-0000-0000-000000000000_HPY_my_happy____x.jpg")
        );
    }

    #[tokio::test]
    async fn test_save_and_remove_cover() {
        let dir = tempfile::tempdir().unwrap();
        let encoded = STANDARD.encode(png_bytes(64, 64));
        let path = save_cover(dir.path(), Uuid::new_v4(), Emotion::Calm, "calm", &encoded)
            .await
            .unwrap();

        assert!(!load_cover(&path).await.unwrap().is_empty());
        remove_cover(&path).await;
        assert!(!path.exists());
        remove_cover(&path).await;
    }
}
