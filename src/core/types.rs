use crate::verdict::GradeResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Signal escalation report for the timeout path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KillReport {
    pub term_sent: bool,
    pub kill_sent: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

/// Everything the supervisor learned about one child.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchOutcome {
    pub child_pid: i32,
    pub result: GradeResult,
    /// Exit status when the child exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal when it did not.
    pub term_signal: Option<i32>,
    pub wall_time: Duration,
    pub timed_out: bool,
    pub kill_report: Option<KillReport>,
}

impl LaunchOutcome {
    /// Human-readable exit description for logs.
    pub fn describe_exit(&self) -> String {
        describe_exit(self.exit_code, self.term_signal)
    }
}

pub fn describe_exit(exit_code: Option<i32>, term_signal: Option<i32>) -> String {
    match (exit_code, term_signal) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(signal)) => format!("signal {}", signal),
        (None, None) => "unknown exit".to_string(),
    }
}
