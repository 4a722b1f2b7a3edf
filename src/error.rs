use std::path::PathBuf;

use thiserror::Error;

/// Library error type for the filter/render pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The source image is missing, unreadable, or in an unsupported format.
    #[error("failed to decode image {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The filter was handed an absent or empty image.
    #[error("filter input is absent or has an empty extent")]
    InvalidInput,

    /// No drawable could be acquired for this tick.
    #[error("no drawable surface available")]
    SurfaceUnavailable,

    /// Writing an exported image failed.
    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding an exported image failed.
    #[error("failed to encode image for {}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Rendering/display error from the GPU backend.
    #[error("render error: {0}")]
    Render(anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
