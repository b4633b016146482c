mod heap;
mod display;

pub use heap::*;
pub use display::ValueDisplay;
