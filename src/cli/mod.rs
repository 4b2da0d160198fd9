//! Command-line interface module.

mod args;
pub mod classify;
pub mod manifest;
pub mod serve;

pub use args::{Cli, Commands};
