pub mod filter_state;
pub mod fit;
pub mod saturation;
