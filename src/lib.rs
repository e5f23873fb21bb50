//! gradebox: a process-isolated grader for untrusted function submissions
//!
//! Submissions are written in a small Python subset. Each one is vetted
//! statically, executed in a freshly forked child under OS resource limits,
//! and scored against a problem's hidden test cases.
//!
//! # Architecture
//!
//! ## Submission Language ([`lang`])
//! - [`lang::lexer`]: Indentation-aware tokenizer
//! - [`lang::parser`]: Recursive-descent parser producing [`lang::ast`]
//!
//! ## Static Vettor ([`vet`])
//! - Rejects imports, dunder attribute access and denied names
//! - Type-state [`vet::Submission`] so only vetted code can execute
//!
//! ## Runtime ([`runtime`])
//! - [`runtime::interp`]: Tree-walking interpreter with recursion and size guards
//! - [`runtime::builtins`]: The only built-ins visible to submissions
//! - [`runtime::methods`]: `str`/`list`/`dict`/`set`/`tuple` methods
//!
//! ## Grading Core ([`core`](crate::core))
//! - [`core::supervisor`](crate::core::supervisor): Fork, wall-clock deadline, SIGTERM/SIGKILL escalation
//! - [`core::runner`](crate::core::runner): Vet, execute and score inside the child
//! - [`core::limits`](crate::core::limits): rlimits, parent-death signal, descriptor hygiene
//! - [`core::channel`](crate::core::channel): One-shot length-prefixed result pipe
//!
//! ## Results ([`verdict`])
//! - [`verdict::GradeResult`]: Terminal `ok`/`error`/`tle` status
//! - [`verdict::Scorer`]: Per-test scoring with any-of expectations
//!
//! ## Problems, Configuration, Observability
//! - [`problem`]: Read-only problem bank
//! - [`config`]: Grading limits, config file loading, validation
//! - [`observability::audit`]: Structured grading events
//!
//! # Design Principles
//!
//! 1. **Vet before execute** - Nothing runs until the whole tree is checked
//! 2. **One process per submission** - No pooling, no reuse
//! 3. **Exactly one result** - Every request ends in `ok`, `error` or `tle`
//! 4. **Types prevent errors** - Illegal states are unrepresentable

// Submission language front end
pub mod lang;

// Static checks
pub mod vet;

// Interpreter and safe namespace
pub mod runtime;

// Process-isolated grading core
pub mod core;

// Results and scoring
pub mod verdict;

// Problem bank
pub mod problem;

// Observability
pub mod observability;

// Configuration
pub mod config;

// CLI entrypoint wiring for the gradebox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::{GradeError, GradeLimits, Result};
pub use crate::core::{grade, launch, LaunchOutcome};
pub use problem::{Problem, ProblemBank, TestCase};
pub use verdict::{GradeResult, Summary, TestOutcome};
pub use vet::{vet_source, SecurityError, VetPolicy};
