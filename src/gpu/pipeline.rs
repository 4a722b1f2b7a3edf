//! Render pipeline that draws one texture through the saturation shader.

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::processing::fit::ImageExtent;
use crate::processing::saturation::PositionedImage;

use super::texture::GpuTexture;

/// Uniform block shared with `shaders/saturation.wgsl` (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub rect: [f32; 4],
    pub saturation: f32,
    /// Non-zero when the fragment shader must sRGB-encode its output itself.
    pub encode_srgb: f32,
    pub pad: [f32; 2],
}

impl FrameUniforms {
    pub fn new(image: &PositionedImage, viewport: ImageExtent) -> Self {
        Self {
            rect: image.transform.ndc_rect(image.extent, viewport),
            saturation: image.params.saturation(),
            encode_srgb: 0.0,
            pad: [0.0; 2],
        }
    }

    pub fn with_srgb_encode(self, encode: bool) -> Self {
        Self {
            encode_srgb: if encode { 1.0 } else { 0.0 },
            ..self
        }
    }
}

/// Whether writes to `format` need a manual linear to sRGB conversion.
/// `*Srgb` targets encode in hardware and float targets are linear.
pub fn shader_encodes_srgb(format: wgpu::TextureFormat) -> bool {
    !format.is_srgb()
        && !matches!(
            format,
            wgpu::TextureFormat::Rgba16Float | wgpu::TextureFormat::Rgba32Float
        )
}

pub struct SaturationPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniforms: wgpu::Buffer,
    encode_srgb: bool,
}

impl SaturationPipeline {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("saturation-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/saturation.wgsl").into()),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("saturation-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("saturation-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("saturation-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("saturation-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame-uniforms"),
            contents: bytemuck::bytes_of(&FrameUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            pipeline,
            bind_layout,
            sampler,
            uniforms,
            encode_srgb: shader_encodes_srgb(format),
        }
    }

    pub fn encodes_srgb(&self) -> bool {
        self.encode_srgb
    }

    /// Bind group for `texture`; built once per texture, not per frame.
    pub fn bind(&self, device: &wgpu::Device, texture: &GpuTexture) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("saturation-bind-group"),
            layout: &self.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(texture.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniforms.as_entire_binding(),
                },
            ],
        })
    }

    /// Records a clear plus one textured quad into `target`.
    pub fn encode(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        bind_group: &wgpu::BindGroup,
        uniforms: &FrameUniforms,
        clear: wgpu::Color,
    ) {
        let uniforms = uniforms.with_srgb_encode(self.encode_srgb);
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("saturation-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, bind_group, &[]);
        rpass.draw(0..4, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::fit::FitTransform;
    use crate::processing::saturation::SaturationParams;

    #[test]
    fn uniforms_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 32);
    }

    #[test]
    fn uniforms_carry_rect_and_saturation() {
        let extent = ImageExtent::new(1024, 768);
        let viewport = ImageExtent::new(512, 512);
        let positioned = PositionedImage {
            extent,
            params: SaturationParams::new(0.5),
            transform: FitTransform::compute(extent, viewport),
        };
        let u = FrameUniforms::new(&positioned, viewport);
        assert_eq!(u.saturation, 0.5);
        assert!((u.rect[0] + 1.0).abs() < 1e-4);
        assert!((u.rect[2] - 1.0).abs() < 1e-4);
        assert!(u.rect[1] < 1.0 && u.rect[3] > -1.0);
        assert_eq!(u.encode_srgb, 0.0);
        assert_eq!(u.with_srgb_encode(true).encode_srgb, 1.0);
        assert_eq!(u.with_srgb_encode(true).saturation, 0.5);
    }

    #[test]
    fn only_linear_unorm_targets_need_shader_encode() {
        use wgpu::TextureFormat as F;
        assert!(!shader_encodes_srgb(F::Bgra8UnormSrgb));
        assert!(!shader_encodes_srgb(F::Rgba8UnormSrgb));
        assert!(shader_encodes_srgb(F::Bgra8Unorm));
        assert!(shader_encodes_srgb(F::Rgba8Unorm));
        assert!(shader_encodes_srgb(F::Rgb10a2Unorm));
        assert!(!shader_encodes_srgb(F::Rgba16Float));
    }
}
