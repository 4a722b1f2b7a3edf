use std::path::{Path, PathBuf};

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::events::PreviewMode;
use crate::gpu::texture::TextureOrigin;
use crate::processing::saturation::{MAX_SATURATION, MIN_SATURATION};
use crate::source::{AssetCatalog, PhotoAsset};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SaturationConfig {
    /// Value loaded into the filter at startup.
    pub initial: f32,
    /// Increment applied by one arrow key press.
    pub step: f32,
}

impl Default for SaturationConfig {
    fn default() -> Self {
        Self {
            initial: 1.0,
            step: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Target directory; the user's documents directory when unset.
    pub directory: Option<PathBuf>,
    pub file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_name: "FilteredImage.jpg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub title: String,
    /// Letterbox color as 8-bit sRGB.
    pub clear_color: [u8; 3],
    /// Swap-chain depth handed to the surface configuration.
    pub max_frame_latency: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "Saturation Viewer".to_string(),
            clear_color: [0, 0, 0],
            max_frame_latency: 2,
        }
    }
}

impl ViewerConfig {
    pub fn clear_color(&self) -> wgpu::Color {
        let [r, g, b] = self.clear_color.map(|c| f64::from(c) / 255.0);
        wgpu::Color { r, g, b, a: 1.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Directory holding the bundled photographs.
    pub asset_dir: PathBuf,
    /// Which bundled photograph to show.
    pub asset: PhotoAsset,
    /// Explicit image path; takes precedence over `asset`.
    pub source_path: Option<PathBuf>,
    /// Row order of the uploaded texture.
    pub texture_origin: TextureOrigin,
    /// Preview path active at startup.
    pub initial_mode: PreviewMode,
    pub saturation: SaturationConfig,
    pub export: ExportConfig,
    pub viewer: ViewerConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("assets"),
            asset: PhotoAsset::default(),
            source_path: None,
            texture_origin: TextureOrigin::default(),
            initial_mode: PreviewMode::default(),
            saturation: SaturationConfig::default(),
            export: ExportConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            (MIN_SATURATION..=MAX_SATURATION).contains(&self.saturation.initial),
            "saturation.initial must lie within [{MIN_SATURATION}, {MAX_SATURATION}]"
        );
        ensure!(
            self.saturation.step > 0.0 && self.saturation.step <= MAX_SATURATION,
            "saturation.step must be positive and at most {MAX_SATURATION}"
        );
        ensure!(
            !self.export.file_name.trim().is_empty(),
            "export.file-name must not be empty"
        );
        ensure!(
            Path::new(&self.export.file_name).file_name().is_some()
                && Path::new(&self.export.file_name).components().count() == 1,
            "export.file-name must be a bare file name"
        );
        ensure!(
            self.viewer.max_frame_latency > 0,
            "viewer.max-frame-latency must be greater than zero"
        );
        if let Some(path) = &self.source_path {
            ensure!(
                !path.as_os_str().is_empty(),
                "source-path must not be empty"
            );
        }
        Ok(self)
    }

    /// The image both preview paths read from.
    pub fn source_path(&self) -> PathBuf {
        match &self.source_path {
            Some(path) => path.clone(),
            None => AssetCatalog::new(&self.asset_dir).resolve(self.asset),
        }
    }

    pub fn export_path(&self) -> PathBuf {
        let dir = self
            .export
            .directory
            .clone()
            .or_else(dirs::document_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        dir.join(&self.export.file_name)
    }
}
