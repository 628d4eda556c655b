//! docindex Common Library
//!
//! Shared code for the docindex crates including:
//! - Document and chunk data model
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{IndexError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension when none is configured
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
