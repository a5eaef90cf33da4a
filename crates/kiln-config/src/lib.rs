//! Configuration types and loaders for Kiln.
//!
//! This crate owns the on-disk configuration schema and the plugin
//! compatibility rules so the runtime crates share a single source of truth.

pub mod compat;
pub mod shell;

pub use compat::check_host_api;
pub use shell::{ClockConfig, LoggingConfig, ShellConfig};
