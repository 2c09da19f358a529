pub mod analyzer;
mod citations;
mod consistency;
pub mod types;
mod visibility;


pub use analyzer::BatchAnalyzer;
pub use types::*;
