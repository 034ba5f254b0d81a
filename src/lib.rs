//! lazypool - Lazy, concurrency-safe lifecycle management for backend connections

pub mod cli;
pub mod config;
pub mod core;
pub mod pool;

pub use config::{BackendConfig, Config};
pub use core::Core;
