/// Utility helpers
pub mod random;

pub use random::{fill_random, random_suffix};
