use std::borrow::Cow;
use std::path::Path;

use image::{RgbaImage, imageops};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::processing::fit::ImageExtent;
use crate::processing::saturation::FilterInput;
use crate::source::load_source_image;

/// Row order expected by the destination coordinate convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TextureOrigin {
    /// Rows uploaded as decoded.
    #[default]
    TopLeft,
    /// Rows reversed before upload, for backends with a bottom-left origin.
    FlippedVertically,
}

/// Device-resident copy of a source image. Read-only after upload.
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    origin: TextureOrigin,
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuTexture")
            .field("extent", &self.extent())
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl GpuTexture {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &RgbaImage,
        origin: TextureOrigin,
        label: &str,
    ) -> Self {
        let max_dim = device.limits().max_texture_dimension_2d;
        let prepared = prepare_for_upload(image, origin, max_dim);
        let (width, height) = prepared.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            texture.as_image_copy(),
            prepared.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            origin,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

}

impl FilterInput for GpuTexture {
    fn extent(&self) -> ImageExtent {
        ImageExtent::new(self.texture.width(), self.texture.height())
    }
}

/// Uploads decoded stills with a fixed row-order convention.
#[derive(Debug, Clone, Copy)]
pub struct TextureSource {
    origin: TextureOrigin,
}

impl TextureSource {
    pub fn new(origin: TextureOrigin) -> Self {
        Self { origin }
    }

    /// Decodes `path` and uploads it. Missing or undecodable files yield
    /// [`crate::Error::Decode`].
    pub fn load(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
    ) -> Result<GpuTexture> {
        let source = load_source_image(path)?;
        let texture = self.upload(device, queue, source.pixels(), "source");
        info!(
            path = %path.display(),
            width = texture.extent().width,
            height = texture.extent().height,
            origin = ?self.origin,
            "source texture loaded"
        );
        Ok(texture)
    }

    pub fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &RgbaImage,
        label: &str,
    ) -> GpuTexture {
        let texture = GpuTexture::upload(device, queue, image, self.origin, label);
        if texture.extent() != ImageExtent::from(image.dimensions()) {
            info!(
                label,
                from = ?image.dimensions(),
                to = ?(texture.extent().width, texture.extent().height),
                "downscaled to fit device texture limit"
            );
        }
        debug!(
            label,
            width = texture.extent().width,
            height = texture.extent().height,
            origin = ?self.origin,
            "texture uploaded"
        );
        texture
    }
}

/// Orients and, if needed, shrinks `image` so it fits in a `max_dim` texture.
pub fn prepare_for_upload(
    image: &RgbaImage,
    origin: TextureOrigin,
    max_dim: u32,
) -> Cow<'_, RgbaImage> {
    let max_dim = max_dim.max(1);
    let (w, h) = image.dimensions();
    let mut out = Cow::Borrowed(image);
    if w > max_dim || h > max_dim {
        let (nw, nh) = shrink_to(w, h, max_dim);
        out = Cow::Owned(imageops::resize(image, nw, nh, imageops::Triangle));
    }
    if origin == TextureOrigin::FlippedVertically {
        out = Cow::Owned(imageops::flip_vertical(out.as_ref()));
    }
    out
}

#[allow(clippy::cast_precision_loss)]
fn shrink_to(w: u32, h: u32, max_dim: u32) -> (u32, u32) {
    let scale = (max_dim as f32 / w.max(1) as f32).min(max_dim as f32 / h.max(1) as f32);
    let nw = (w as f32 * scale).round().clamp(1.0, max_dim as f32);
    let nh = (h as f32 * scale).round().clamp(1.0, max_dim as f32);
    (nw as u32, nh as u32)
}
