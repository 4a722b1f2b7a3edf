//! Per-frame render loop, independent of the GPU backend.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::processing::filter_state::FilterState;
use crate::processing::fit::{FitTransform, ImageExtent};
use crate::processing::saturation::{FilterInput, PositionedImage, SaturationFilter, SaturationParams};

/// Destination surface handed out by the presentation layer for one frame.
pub trait Drawable {
    fn size(&self) -> ImageExtent;
    fn present(self);
}

/// Which texture a frame draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureSlot {
    /// The source texture uploaded at startup.
    Live,
    /// The most recent on-demand result.
    Snapshot,
}

/// Everything a backend needs to draw one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    pub slot: TextureSlot,
    pub viewport: ImageExtent,
    pub image: PositionedImage,
}

pub trait PresentationBackend {
    type Drawable: Drawable;
    type Texture: FilterInput;

    /// Next free drawable, or `None` when none is available this tick.
    fn next_drawable(&mut self) -> Option<Self::Drawable>;

    fn texture(&self, slot: TextureSlot) -> Option<&Self::Texture>;

    /// Encodes `plan` into `drawable` and submits the command buffer.
    fn commit(&mut self, drawable: &Self::Drawable, plan: &FramePlan) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Paused,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoDrawable,
    InvalidInput,
    Backend,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    Paused,
    Skipped(SkipReason),
    Rendered(FramePlan),
}

pub struct FrameRenderer {
    state: RenderState,
    filter: SaturationFilter,
    filter_state: Arc<FilterState>,
    rendered: u64,
    skipped: u64,
}

impl FrameRenderer {
    pub fn new(filter_state: Arc<FilterState>, state: RenderState) -> Self {
        Self {
            state,
            filter: SaturationFilter,
            filter_state,
            rendered: 0,
            skipped: 0,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn pause(&mut self) {
        if self.state != RenderState::Paused {
            debug!(rendered = self.rendered, skipped = self.skipped, "render loop paused");
            self.state = RenderState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state != RenderState::Running {
            debug!("render loop running");
            self.state = RenderState::Running;
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.rendered
    }

    pub fn frames_skipped(&self) -> u64 {
        self.skipped
    }

    /// One display-refresh tick. Never fails: problems cost this frame only.
    pub fn tick<B: PresentationBackend>(&mut self, backend: &mut B) -> FrameOutcome {
        if self.state == RenderState::Paused {
            return FrameOutcome::Paused;
        }
        let params = self.filter_state.snapshot();
        self.render(backend, TextureSlot::Live, params)
    }

    /// Draws an already-filtered still once, whatever the loop state.
    pub fn present_still<B: PresentationBackend>(
        &mut self,
        backend: &mut B,
        slot: TextureSlot,
    ) -> FrameOutcome {
        self.render(backend, slot, SaturationParams::default())
    }

    fn render<B: PresentationBackend>(
        &mut self,
        backend: &mut B,
        slot: TextureSlot,
        params: SaturationParams,
    ) -> FrameOutcome {
        let Some(drawable) = backend.next_drawable() else {
            trace!("no drawable this tick");
            return self.skip(SkipReason::NoDrawable);
        };
        let viewport = drawable.size();

        let plan = {
            let Some(texture) = backend.texture(slot) else {
                debug!(?slot, "no texture bound; skipping frame");
                return self.skip(SkipReason::InvalidInput);
            };
            let filtered = match self.filter.apply(texture, params) {
                Ok(filtered) => filtered,
                Err(err) => {
                    debug!(error = %err, ?slot, "filter rejected input; skipping frame");
                    return self.skip(SkipReason::InvalidInput);
                }
            };
            let transform = FitTransform::compute(filtered.extent(), viewport);
            FramePlan {
                slot,
                viewport,
                image: filtered.transformed(transform),
            }
        };

        if let Err(err) = backend.commit(&drawable, &plan) {
            warn!(error = %err, "frame submission failed; skipping frame");
            return self.skip(SkipReason::Backend);
        }
        drawable.present();
        self.rendered += 1;
        FrameOutcome::Rendered(plan)
    }

    fn skip(&mut self, reason: SkipReason) -> FrameOutcome {
        self.skipped += 1;
        FrameOutcome::Skipped(reason)
    }
}
