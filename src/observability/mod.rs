//! Observability
//!
//! Structured audit events for every grading request.

pub mod audit;
