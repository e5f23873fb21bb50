/// Core types shared by the grading engine
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Infrastructure errors raised by the grading engine.
///
/// Problems caused by the submission itself never surface here; they are
/// folded into a [`crate::verdict::GradeResult`].
#[derive(Error, Debug)]
pub enum GradeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Result channel error: {0}")]
    Channel(String),

    #[error("Unknown problem: {0}")]
    Problem(String),
}

impl From<nix::errno::Errno> for GradeError {
    fn from(err: nix::errno::Errno) -> Self {
        GradeError::Process(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GradeError>;

/// Resource ceilings applied to one grading request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeLimits {
    /// Wall-clock seconds enforced by the parent.
    pub time_limit: f64,
    /// Address space the submission may add on top of the child's footprint.
    pub mem_limit_mb: u64,
    /// `RLIMIT_CPU` seconds enforced by the kernel inside the child.
    pub cpu_limit_secs: u64,
    pub max_recursion_depth: usize,
    pub max_source_bytes: usize,
    /// Delay between SIGTERM and SIGKILL on timeout.
    pub kill_grace_ms: u64,
    /// How long to wait for the result frame after the child exits.
    pub result_grace_ms: u64,
}

impl Default for GradeLimits {
    fn default() -> Self {
        Self {
            time_limit: 2.0,
            mem_limit_mb: 128,
            cpu_limit_secs: 3,
            max_recursion_depth: 400,
            max_source_bytes: 64 * 1024,
            kill_grace_ms: 100,
            result_grace_ms: 500,
        }
    }
}

impl GradeLimits {
    /// Wall-clock deadline. Non-finite or negative limits collapse to zero.
    pub fn wall_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit).unwrap_or(Duration::ZERO)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn result_grace(&self) -> Duration {
        Duration::from_millis(self.result_grace_ms)
    }

    pub fn mem_limit_bytes(&self) -> u64 {
        self.mem_limit_mb.saturating_mul(1024 * 1024)
    }

    /// Applies the per-request overrides callers are allowed to set.
    pub fn with_overrides(mut self, time_limit: Option<f64>, mem_limit_mb: Option<u64>) -> Self {
        if let Some(time_limit) = time_limit {
            self.time_limit = time_limit;
        }
        if let Some(mem_limit_mb) = mem_limit_mb {
            self.mem_limit_mb = mem_limit_mb;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let limits = GradeLimits::default();
        assert_eq!(limits.wall_time(), Duration::from_secs(2));
        assert_eq!(limits.mem_limit_bytes(), 128 * 1024 * 1024);
        assert_eq!(limits.cpu_limit_secs, 3);
        assert_eq!(limits.kill_grace(), Duration::from_millis(100));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let limits: GradeLimits = serde_json::from_str(r#"{"time_limit": 0.5}"#).unwrap();
        assert_eq!(limits.wall_time(), Duration::from_millis(500));
        assert_eq!(limits.mem_limit_mb, 128);
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let limits = GradeLimits::default().with_overrides(None, Some(64));
        assert_eq!(limits.time_limit, 2.0);
        assert_eq!(limits.mem_limit_mb, 64);
    }

    #[test]
    fn negative_wall_time_is_zero() {
        let limits = GradeLimits::default().with_overrides(Some(-1.0), None);
        assert_eq!(limits.wall_time(), Duration::ZERO);
    }
}
