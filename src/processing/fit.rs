//! Geometry for placing a filtered image inside a drawable.

/// Pixel extent of an image or surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageExtent {
    pub width: u32,
    pub height: u32,
}

impl ImageExtent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for ImageExtent {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Which scaling policy [`FitTransform::compute`] picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// Whole image visible, may letterbox.
    Fit,
    /// Image covers the viewport, may overflow.
    Fill,
}

/// Destination rectangle in drawable pixels (top-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DestRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Uniform scale plus centering offsets, recomputed every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub mode: FitMode,
}

impl FitTransform {
    /// Computes the transform that places `image` inside `viewport`.
    ///
    /// The policy is asymmetric on purpose: when the vertical ratio wins the
    /// smaller ratio is used (fit); otherwise, ties included, the larger one
    /// (fill). Offsets never go negative, so an overflowing image is anchored
    /// at the origin rather than centered.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(image: ImageExtent, viewport: ImageExtent) -> Self {
        let iw = image.width.max(1) as f32;
        let ih = image.height.max(1) as f32;
        let vw = viewport.width as f32;
        let vh = viewport.height as f32;

        let sx = vw / iw;
        let sy = vh / ih;
        let (scale, mode) = if sy > sx {
            (sx.min(sy), FitMode::Fit)
        } else {
            (sx.max(sy), FitMode::Fill)
        };

        let scaled_w = iw * scale;
        let scaled_h = ih * scale;
        Self {
            scale,
            offset_x: ((vw - scaled_w) / 2.0).max(0.0),
            offset_y: ((vh - scaled_h) / 2.0).max(0.0),
            mode,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn scaled_size(&self, image: ImageExtent) -> (f32, f32) {
        (
            image.width as f32 * self.scale,
            image.height as f32 * self.scale,
        )
    }

    pub fn dest_rect(&self, image: ImageExtent) -> DestRect {
        let (width, height) = self.scaled_size(image);
        DestRect {
            x: self.offset_x,
            y: self.offset_y,
            width,
            height,
        }
    }

    /// Destination rectangle in normalized device coordinates as
    /// `[left, top, right, bottom]`, with +y pointing up.
    #[allow(clippy::cast_precision_loss)]
    pub fn ndc_rect(&self, image: ImageExtent, viewport: ImageExtent) -> [f32; 4] {
        let rect = self.dest_rect(image);
        let vw = viewport.width.max(1) as f32;
        let vh = viewport.height.max(1) as f32;
        [
            rect.x / vw * 2.0 - 1.0,
            1.0 - rect.y / vh * 2.0,
            (rect.x + rect.width) / vw * 2.0 - 1.0,
            1.0 - (rect.y + rect.height) / vh * 2.0,
        ]
    }
}
