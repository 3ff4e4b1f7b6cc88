pub mod engine;
pub mod indicators;
pub mod phase;

#[cfg(test)]
mod indicators_tests;

pub use engine::*;
pub use indicators::*;
pub use phase::*;
