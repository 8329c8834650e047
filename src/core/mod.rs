pub mod types;
pub mod utils;
pub mod verdict;

#[cfg(test)]
pub(crate) mod fixtures;

pub use types::*;
pub use verdict::Verdict;
