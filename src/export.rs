use std::fs;
use std::io::Write;
use std::path::Path;

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Error, Result};

/// JPEG quality factor used for every export.
pub const EXPORT_QUALITY: f32 = 0.8;

/// Encodes `image` as JPEG and writes it to `destination`, replacing any
/// existing file. Each call stages into its own temp file in the destination
/// directory and renames it into place, so readers and concurrent savers
/// never observe a partial image.
pub fn save(image: &RgbaImage, destination: &Path) -> Result<()> {
    let io_error = |source: std::io::Error| Error::Io {
        path: destination.to_path_buf(),
        source,
    };

    let rgb: RgbImage = image.convert();
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, jpeg_quality())
        .encode_image(&rgb)
        .map_err(|source| Error::Encode {
            path: destination.to_path_buf(),
            source,
        })?;

    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_error)?;

    let mut staging = NamedTempFile::new_in(parent).map_err(io_error)?;
    staging.write_all(&encoded).map_err(io_error)?;
    // a failed persist drops the temp file, which removes it
    staging
        .persist(destination)
        .map_err(|err| io_error(err.error))?;

    info!(
        path = %destination.display(),
        bytes = encoded.len(),
        width = rgb.width(),
        height = rgb.height(),
        "exported filtered image"
    );
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn jpeg_quality() -> u8 {
    (EXPORT_QUALITY * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::{Arc, Barrier};

    #[test]
    fn quality_factor_maps_to_eighty() {
        assert_eq!(jpeg_quality(), 80);
    }

    fn directory_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn save_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("FilteredImage.jpg");
        std::fs::write(&dest, b"stale").unwrap();

        let img = RgbaImage::from_pixel(8, 6, Rgba([200, 100, 50, 255]));
        save(&img, &dest).unwrap();

        let reloaded = image::open(&dest).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (8, 6));
        assert_eq!(directory_entries(dir.path()), vec!["FilteredImage.jpg"]);
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/out/FilteredImage.jpg");
        save(&RgbaImage::new(2, 2), &dest).unwrap();
        assert!(dest.exists());
    }

    #[test]
    fn unwritable_destination_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory occupies the destination, so the rename must fail
        let dest = dir.path().join("FilteredImage.jpg");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep"), b"x").unwrap();
        let err = save(&RgbaImage::new(2, 2), &dest).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{err:?}");
        assert_eq!(directory_entries(dir.path()), vec!["FilteredImage.jpg"]);
    }

    #[test]
    fn concurrent_saves_to_one_destination_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Arc::new(dir.path().join("FilteredImage.jpg"));
        let writers = 8;

        for round in 0..25u8 {
            let barrier = Arc::new(Barrier::new(writers));
            let handles: Vec<_> = (0..writers)
                .map(|i| {
                    let barrier = Arc::clone(&barrier);
                    let dest = Arc::clone(&dest);
                    std::thread::spawn(move || {
                        let shade = round.wrapping_mul(8).wrapping_add(i as u8 * 20);
                        let img = RgbaImage::from_pixel(16, 12, Rgba([shade, 90, 200, 255]));
                        barrier.wait();
                        save(&img, &dest)
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }
            let reloaded = image::open(dest.as_path()).unwrap();
            assert_eq!((reloaded.width(), reloaded.height()), (16, 12));
        }
        assert_eq!(directory_entries(dir.path()), vec!["FilteredImage.jpg"]);
    }
}
