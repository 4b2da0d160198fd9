//! Rekindle - a hot-update engine for browser UI development.
//!
//! Tracks the module dependency graph, classifies file changes into
//! self-updates, boundary updates, or full reloads, coalesces change
//! bursts, and fans the outcome out to connected clients over a JSON
//! protocol. A fast-refresh store preserves component signal state across
//! module swaps.
//!
//! [`engine::HmrEngine`] is the entry point; the `rekindle` binary wires
//! it to a file watcher and a WebSocket endpoint.

pub mod cli;
pub mod config;
pub mod engine;
pub mod graph;
pub mod logger;
pub mod refresh;
pub mod reload;
pub mod utils;
pub mod watch;
