pub mod blocks;
pub mod head;
pub mod tfilm;

pub use tfilm::*;
