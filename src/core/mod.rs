//! Process-isolated grading core.
//!
//! The supervisor owns the process model: one forked child per submission,
//! a wall-clock deadline enforced from the parent, and a one-shot result
//! channel. Everything that runs inside the child lives in [`runner`] and
//! [`limits`].

pub mod channel;
pub mod limits;
pub mod runner;
pub mod supervisor;
pub mod types;

pub use supervisor::{grade, launch};
pub use types::{KillReport, LaunchOutcome};
