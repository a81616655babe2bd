//! Built-in reference providers

pub mod breakout;
pub mod ma_cross;

pub use breakout::BreakoutProvider;
pub use ma_cross::MaCrossProvider;
