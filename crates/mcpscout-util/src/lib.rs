//! Shared utilities for mcpscout.
//!
//! This crate provides common utilities used across the mcpscout workspace:
//! - Logging setup with tracing
//! - Home directory and user tool path helpers
//! - RAII-based timing for probe measurement

pub mod log;
pub mod path;
pub mod timing;

pub use timing::TimingGuard;
