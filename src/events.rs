use std::path::PathBuf;

use image::RgbaImage;
use serde::Deserialize;

use crate::error::Error;
use crate::processing::saturation::SaturationParams;

/// Which preview path is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PreviewMode {
    /// Continuous GPU preview driven by the display refresh.
    #[default]
    Live,
    /// Static preview evaluated off the render loop.
    Snapshot,
}

impl PreviewMode {
    pub fn toggled(self) -> Self {
        match self {
            PreviewMode::Live => PreviewMode::Snapshot,
            PreviewMode::Snapshot => PreviewMode::Live,
        }
    }
}

/// User-level controls, from the keyboard or an external signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerCommand {
    SetSaturation(f32),
    AdjustSaturation(f32),
    ResetSaturation,
    SetMode(PreviewMode),
    ToggleMode,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotRequest {
    pub seq: u64,
    pub params: SaturationParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub seq: u64,
    pub params: SaturationParams,
    pub destination: PathBuf,
}

/// Work for the background processor.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorJob {
    Snapshot(SnapshotRequest),
    Export(ExportRequest),
}

impl ProcessorJob {
    pub fn seq(&self) -> u64 {
        match self {
            ProcessorJob::Snapshot(req) => req.seq,
            ProcessorJob::Export(req) => req.seq,
        }
    }
}

/// Results handed back to the UI thread.
#[derive(Debug)]
pub enum ProcessorEvent {
    SnapshotReady { seq: u64, image: RgbaImage },
    SnapshotFailed { seq: u64, error: Error },
    ExportFinished {
        seq: u64,
        destination: PathBuf,
        result: Result<(), Error>,
    },
}
