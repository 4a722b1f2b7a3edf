pub mod pipeline;
pub mod texture;
