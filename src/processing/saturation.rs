//! Saturation filter: typed parameters, lazy filtered values and the CPU kernel.
//!
//! The same math runs in `gpu/shaders/saturation.wgsl` for the live path.

use std::sync::OnceLock;

use image::{Rgba, RgbaImage};

use crate::error::{Error, Result};
use crate::processing::fit::{FitTransform, ImageExtent};

pub const MIN_SATURATION: f32 = 0.0;
pub const MAX_SATURATION: f32 = 2.0;
pub const DEFAULT_SATURATION: f32 = 1.0;

/// Rec. 709 luma weights applied in linear light.
pub const LUMA_WEIGHTS: [f32; 3] = [0.2125, 0.7154, 0.0721];

/// Parameters of the saturation filter. Always within the accepted domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaturationParams {
    saturation: f32,
}

impl SaturationParams {
    /// Clamps into `[MIN_SATURATION, MAX_SATURATION]`; NaN falls back to the default.
    pub fn new(saturation: f32) -> Self {
        let saturation = if saturation.is_nan() {
            DEFAULT_SATURATION
        } else {
            saturation.clamp(MIN_SATURATION, MAX_SATURATION)
        };
        Self { saturation }
    }

    pub const fn saturation(&self) -> f32 {
        self.saturation
    }

    pub fn is_identity(&self) -> bool {
        self.saturation == DEFAULT_SATURATION
    }
}

impl Default for SaturationParams {
    fn default() -> Self {
        Self {
            saturation: DEFAULT_SATURATION,
        }
    }
}

/// Anything the filter can take as input.
pub trait FilterInput {
    fn extent(&self) -> ImageExtent;
}

/// Inputs whose pixels are CPU-resident and can be rasterized directly.
pub trait RasterSource: FilterInput {
    fn raster(&self) -> &RgbaImage;
}

impl FilterInput for RgbaImage {
    fn extent(&self) -> ImageExtent {
        ImageExtent::new(self.width(), self.height())
    }
}

impl RasterSource for RgbaImage {
    fn raster(&self) -> &RgbaImage {
        self
    }
}

/// The filter engine. Stateless; the parameter travels with every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaturationFilter;

impl SaturationFilter {
    /// Binds `params` to `input` without touching any pixels.
    pub fn apply<'a, I>(&self, input: &'a I, params: SaturationParams) -> Result<FilteredImage<'a, I>>
    where
        I: FilterInput + ?Sized,
    {
        if input.extent().is_empty() {
            return Err(Error::InvalidInput);
        }
        Ok(FilteredImage { input, params })
    }
}

/// Lazily evaluated filter output. Nothing is computed until a caller
/// rasterizes it or a renderer encodes it.
#[derive(Debug)]
pub struct FilteredImage<'a, I: ?Sized> {
    input: &'a I,
    params: SaturationParams,
}

impl<'a, I: FilterInput + ?Sized> FilteredImage<'a, I> {
    /// A color filter never changes geometry.
    pub fn extent(&self) -> ImageExtent {
        self.input.extent()
    }

    pub fn params(&self) -> SaturationParams {
        self.params
    }

    pub fn transformed(self, transform: FitTransform) -> PositionedImage {
        PositionedImage {
            extent: self.extent(),
            params: self.params,
            transform,
        }
    }
}

impl<I: RasterSource + ?Sized> FilteredImage<'_, I> {
    /// Evaluates the filter into a new bitmap.
    pub fn rasterize(&self) -> RgbaImage {
        let source = self.input.raster();
        if self.params.is_identity() {
            return source.clone();
        }
        let saturation = self.params.saturation();
        let table = srgb_decode_table();
        let mut out = RgbaImage::new(source.width(), source.height());
        for (dst, src) in out.pixels_mut().zip(source.pixels()) {
            *dst = saturate_pixel(*src, saturation, table);
        }
        out
    }
}

/// A filtered image placed in drawable space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedImage {
    pub extent: ImageExtent,
    pub params: SaturationParams,
    pub transform: FitTransform,
}

fn saturate_pixel(pixel: Rgba<u8>, saturation: f32, table: &[f32; 256]) -> Rgba<u8> {
    let [r, g, b, a] = pixel.0;
    let lin = [table[r as usize], table[g as usize], table[b as usize]];
    let luma = lin[0] * LUMA_WEIGHTS[0] + lin[1] * LUMA_WEIGHTS[1] + lin[2] * LUMA_WEIGHTS[2];
    let mixed = lin.map(|c| (luma + (c - luma) * saturation).clamp(0.0, 1.0));
    let [r, g, b] = mixed.map(linear_to_srgb_u8);
    Rgba([r, g, b, a])
}

fn srgb_decode_table() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let c = i as f32 / 255.0;
            *slot = if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    })
}

fn linear_to_srgb_u8(c: f32) -> u8 {
    let encoded = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (encoded.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
