//! CLI-specific functionality for the visibility probe binary
//!
//! Argument parsing lives here; the binary's orchestration is in `main.rs`.

pub mod args;

pub use args::{Args, ProviderArg};
