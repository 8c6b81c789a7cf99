//! Chromium driver for the replay engine, over the DevTools protocol.

pub mod backend;
pub mod cdp;
pub mod inject;

pub use backend::HeadlessBackend;
