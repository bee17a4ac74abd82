/// Core Module for liteorm
///
/// Shared infrastructure every feature module builds on: the error taxonomy,
/// stored values and scalar conversions, the engine provider interface, and
/// the pooled connection layer.

pub mod db;
pub mod error;
pub mod provider;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{OrmError, Result};
pub use value::{Affinity, Scalar, Value};
