pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod gpu;
pub mod processing;
pub mod source;
pub mod tasks {
    pub mod snapshot;
    pub mod viewer;
}

pub use error::{Error, Result};
