pub mod runner;
pub mod types;

#[cfg(test)]
mod tests;

pub use runner::BatchRunner;
pub use types::*;
