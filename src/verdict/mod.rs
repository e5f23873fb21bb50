//! Grading results and per-test scoring.
//!
//! A [`GradeResult`] is the single terminal value produced for every
//! submission. [`Scorer`] builds the `ok` variant one test at a time.

pub mod result;
pub mod scorer;

pub use result::{GradeResult, Summary, TestOutcome, NO_RESULT_MESSAGE, TLE_MESSAGE};
pub use scorer::{score, Expected, Scorer};
