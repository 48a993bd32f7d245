//! testdeck web API
//!
//! HTTP + WebSocket surface over the runner pipeline.

pub mod server;
