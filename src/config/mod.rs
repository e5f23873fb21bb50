//! Configuration
//!
//! Grading limits, config-file loading, and startup validation.

pub mod loader;
pub mod types;
pub mod validator;

pub use loader::GraderConfig;
pub use types::{GradeError, GradeLimits, Result};
