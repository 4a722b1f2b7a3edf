//! Decoding of bundled photographs into immutable RGBA8 sources.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageError, ImageReader, RgbaImage, imageops};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::processing::fit::ImageExtent;
use crate::processing::saturation::{FilterInput, RasterSource};

/// The bundled test photographs, addressed by logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PhotoAsset {
    #[default]
    WorkPlay,
    Tropical,
}

impl PhotoAsset {
    pub const fn file_stem(self) -> &'static str {
        match self {
            PhotoAsset::WorkPlay => "WorkPlay",
            PhotoAsset::Tropical => "TestImage",
        }
    }

    pub const fn extension(self) -> &'static str {
        "jpg"
    }
}

/// Resolves logical asset names inside a fixed directory.
#[derive(Debug, Clone)]
pub struct AssetCatalog {
    root: PathBuf,
}

impl AssetCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolution never fails here; a missing file surfaces as
    /// [`Error::Decode`] once the path is loaded.
    pub fn resolve(&self, asset: PhotoAsset) -> PathBuf {
        self.root
            .join(asset.file_stem())
            .with_extension(asset.extension())
    }
}

/// Decoded pixels plus their natural extent. Never mutated after decode.
#[derive(Debug, Clone)]
pub struct SourceImage {
    path: PathBuf,
    pixels: Arc<RgbaImage>,
}

impl SourceImage {
    pub fn from_rgba(path: impl Into<PathBuf>, pixels: RgbaImage) -> Self {
        Self {
            path: path.into(),
            pixels: Arc::new(pixels),
        }
    }

    /// Neutral grey stand-in shown when a source cannot be decoded.
    pub fn placeholder() -> Self {
        Self::from_rgba(
            "placeholder",
            RgbaImage::from_pixel(2, 2, image::Rgba([128, 128, 128, 255])),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

impl FilterInput for SourceImage {
    fn extent(&self) -> ImageExtent {
        ImageExtent::new(self.pixels.width(), self.pixels.height())
    }
}

impl RasterSource for SourceImage {
    fn raster(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Decodes `path` into a [`SourceImage`].
pub fn load_source_image(path: &Path) -> Result<SourceImage> {
    let pixels = decode_rgba8_apply_exif(path)?;
    debug!(
        path = %path.display(),
        width = pixels.width(),
        height = pixels.height(),
        "decoded source image"
    );
    Ok(SourceImage::from_rgba(path, pixels))
}

fn decode_error(path: &Path, source: ImageError) -> Error {
    Error::Decode {
        path: path.to_path_buf(),
        source,
    }
}

// Decodes to RGBA8 and normalizes EXIF orientation when the container carries one.
fn decode_rgba8_apply_exif(path: &Path) -> Result<RgbaImage> {
    let img = ImageReader::open(path)
        .map_err(|err| decode_error(path, ImageError::IoError(err)))?
        .with_guessed_format()
        .map_err(|err| decode_error(path, ImageError::IoError(err)))?
        .decode()
        .map_err(|err| decode_error(path, err))?;

    let orientation = read_orientation(path).unwrap_or(1);
    Ok(apply_orientation(img.to_rgba8(), orientation))
}

fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    debug!(orientation = value, path = %path.display(), "exif orientation");
    u16::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    // 2x1 JPEG tagged with EXIF orientation 6 (rotate 90 CW).
    const ROTATED_JPEG: &str = concat!(
        "/9j/4AAQSkZJRgABAQAAAQABAAD/4QAiRXhpZgAATU0AKgAAAAgAAQESAAMAAAABAAYAAAAAAAD/2wBDAAgGBgcGBQgHBwcJCQgKDBQNDAsLDBkSEw8UHRofHh0aHBwgJC4nICIsIxwcKDcpLDAxNDQ0Hyc5PTgyPC4zNDL/",
        "2wBDAQkJCQwLDBgNDRgyIRwhMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjIyMjL/wAARCAABAAIDASIAAhEBAxEB/8QAHwAAAQUBAQEBAQEAAAAAAAAAAAECAwQFBgcICQoL/8QAtRAAAgEDAwIEAwUFBAQAAAF9AQIDAAQRBRIhMUEGE1FhByJxFDKBkaEII0KxwRVS0fAkM2JyggkKFhcYGRolJicoKSo0NTY3ODk6Q0RFRkdISUpTVFVWV1hZWmNkZWZnaGlqc3R1dnd4eXqDhIWGh4iJipKTlJWWl5iZmqKjpKWmp6ipqrKztLW2t7i5usLDxMXGx8jJytLT1NXW19jZ2uHi4+Tl5ufo6erx8vP09fb3+Pn6/8QAHwEAAwEBAQEBAQEBAQAAAAAAAAECAwQFBgcICQoL/8QAtREAAgECBAQDBAcFBAQAAQJ3AAECAxEEBSExBhJBUQdhcRMiMoEIFEKRobHBCSMzUvAVYnLRChYkNOEl8RcYGRomJygpKjU2Nzg5OkNERUZHSElKU1RVVldYWVpjZGVmZ2hpanN0dXZ3eHl6goOEhYaHiImKkpOUlZaXmJmaoqOkpaanqKmqsrO0tba3uLm6wsPExcbHyMnK0tPU1dbX2Nna4uPk5ebn6Onq8vP09fb3+Pn6/9oADAMBAAIRAxEAPwDi6KKK+ZP3E//Z"
    );

    #[test]
    fn decode_applies_exif_rotation() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(ROTATED_JPEG)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotated.jpg");
        std::fs::write(&path, &bytes).unwrap();
        let source = load_source_image(&path).unwrap();
        assert_eq!(source.extent(), ImageExtent::new(1, 2));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = AssetCatalog::new(dir.path());
        let err = load_source_image(&catalog.resolve(PhotoAsset::Tropical)).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }), "{err:?}");
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("WorkPlay.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        assert!(matches!(
            load_source_image(&path),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn catalog_maps_logical_names_to_files() {
        let catalog = AssetCatalog::new("/bundle");
        assert_eq!(
            catalog.resolve(PhotoAsset::WorkPlay),
            PathBuf::from("/bundle/WorkPlay.jpg")
        );
        assert_eq!(
            catalog.resolve(PhotoAsset::Tropical),
            PathBuf::from("/bundle/TestImage.jpg")
        );
    }

    #[test]
    fn orientation_four_flips_rows() {
        let mut img = RgbaImage::new(1, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        let flipped = apply_orientation(img, 4);
        assert_eq!(flipped.get_pixel(0, 1).0, [255, 0, 0, 255]);
    }
}
