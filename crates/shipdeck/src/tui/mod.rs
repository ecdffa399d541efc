pub mod progress;
pub mod styles;

pub use progress::*;
pub use styles::*;
