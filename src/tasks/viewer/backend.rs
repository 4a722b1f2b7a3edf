use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbaImage;
use tracing::{debug, error, info, warn};
use wgpu::SurfaceError;
use winit::window::Window;

use crate::config::ViewerConfig;
use crate::error::Error;
use crate::gpu::pipeline::{FrameUniforms, SaturationPipeline};
use crate::gpu::texture::{GpuTexture, TextureSource};
use crate::processing::fit::ImageExtent;

use super::frame::{Drawable, FramePlan, PresentationBackend, TextureSlot};

/// Swap-chain image acquired for one frame.
pub(super) struct SurfaceFrame {
    frame: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

impl Drawable for SurfaceFrame {
    fn size(&self) -> ImageExtent {
        ImageExtent::new(self.frame.texture.width(), self.frame.texture.height())
    }

    fn present(self) {
        self.frame.present();
    }
}

struct BoundTexture {
    texture: GpuTexture,
    bind_group: wgpu::BindGroup,
}

impl BoundTexture {
    fn new(device: &wgpu::Device, pipeline: &SaturationPipeline, texture: GpuTexture) -> Self {
        let bind_group = pipeline.bind(device, &texture);
        Self {
            texture,
            bind_group,
        }
    }
}

/// Outcome of a failed swap-chain acquire.
#[derive(Debug)]
struct AcquireFailure {
    error: Error,
    reconfigure: bool,
}

impl From<SurfaceError> for AcquireFailure {
    fn from(err: SurfaceError) -> Self {
        match err {
            SurfaceError::Outdated | SurfaceError::Lost | SurfaceError::Other => Self {
                error: Error::SurfaceUnavailable,
                reconfigure: true,
            },
            SurfaceError::Timeout => Self {
                error: Error::SurfaceUnavailable,
                reconfigure: false,
            },
            SurfaceError::OutOfMemory => Self {
                error: Error::Render(anyhow::Error::new(err)),
                reconfigure: false,
            },
        }
    }
}

/// wgpu surface plus the textures the frame loop draws from.
pub(super) struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: SaturationPipeline,
    textures: TextureSource,
    live: BoundTexture,
    snapshot: Option<BoundTexture>,
    clear: wgpu::Color,
    fatal: bool,
}

impl WgpuBackend {
    pub(super) fn new(
        window: Arc<Window>,
        source_path: &Path,
        textures: TextureSource,
        viewer: &ViewerConfig,
    ) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: viewer.max_frame_latency,
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "viewer surface configured",
        );

        let pipeline = SaturationPipeline::new(&device, format);
        if pipeline.encodes_srgb() {
            warn!(format = ?format, "no sRGB surface format; encoding sRGB in the shader");
        }
        let texture = textures
            .load(&device, &queue, source_path)
            .context("failed to load source texture")?;
        let live = BoundTexture::new(&device, &pipeline, texture);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            textures,
            live,
            snapshot: None,
            clear: viewer.clear_color(),
            fatal: false,
        })
    }

    pub(super) fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        debug!(
            width = self.config.width,
            height = self.config.height,
            "viewer surface resized",
        );
    }

    /// Replaces the still shown while the render loop is paused.
    pub(super) fn set_snapshot(&mut self, image: &RgbaImage) {
        let texture = self
            .textures
            .upload(&self.device, &self.queue, image, "snapshot");
        self.snapshot = Some(BoundTexture::new(&self.device, &self.pipeline, texture));
    }

    pub(super) fn clear_snapshot(&mut self) {
        self.snapshot = None;
    }

    pub(super) fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Set once the device can no longer produce frames.
    pub(super) fn is_fatal(&self) -> bool {
        self.fatal
    }

    fn bound(&self, slot: TextureSlot) -> Option<&BoundTexture> {
        match slot {
            TextureSlot::Live => Some(&self.live),
            TextureSlot::Snapshot => self.snapshot.as_ref(),
        }
    }
}

impl PresentationBackend for WgpuBackend {
    type Drawable = SurfaceFrame;
    type Texture = GpuTexture;

    fn next_drawable(&mut self) -> Option<SurfaceFrame> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                let failure = AcquireFailure::from(err.clone());
                if failure.reconfigure {
                    self.surface.configure(&self.device, &self.config);
                }
                match &failure.error {
                    Error::Render(cause) => {
                        error!(error = %cause, "viewer surface unusable");
                        self.fatal = true;
                    }
                    other => warn!(
                        error = %other,
                        cause = %err,
                        reconfigured = failure.reconfigure,
                        "frame skipped"
                    ),
                }
                return None;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Some(SurfaceFrame { frame, view })
    }

    fn texture(&self, slot: TextureSlot) -> Option<&GpuTexture> {
        self.bound(slot).map(|bound| &bound.texture)
    }

    fn commit(&mut self, drawable: &SurfaceFrame, plan: &FramePlan) -> crate::Result<()> {
        let bound = self.bound(plan.slot).ok_or(Error::InvalidInput)?;
        let uniforms = FrameUniforms::new(&plan.image, plan.viewport);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer-encoder"),
            });
        self.pipeline.encode(
            &self.queue,
            &mut encoder,
            &drawable.view,
            &bound.bind_group,
            &uniforms,
            self.clear,
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_and_outdated_surfaces_are_reconfigured() {
        for err in [SurfaceError::Outdated, SurfaceError::Lost, SurfaceError::Other] {
            let failure = AcquireFailure::from(err);
            assert!(matches!(failure.error, Error::SurfaceUnavailable));
            assert!(failure.reconfigure);
        }
    }

    #[test]
    fn timeout_skips_the_frame_only() {
        let failure = AcquireFailure::from(SurfaceError::Timeout);
        assert!(matches!(failure.error, Error::SurfaceUnavailable));
        assert!(!failure.reconfigure);
    }

    #[test]
    fn out_of_memory_is_a_render_error() {
        let failure = AcquireFailure::from(SurfaceError::OutOfMemory);
        assert!(matches!(failure.error, Error::Render(_)), "{failure:?}");
        assert!(!failure.reconfigure);
    }
}
