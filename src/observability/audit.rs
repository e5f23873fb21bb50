/// Grading audit trail
/// Structured, one-JSON-object-per-line events for every grading request.
///
/// - Correlation: a per-request `uuid` v4 plus problem id and child pid
/// - Event types: receipt, rejection, completion, limit violations, kills
/// - Sink: the `log` facade at target `gradebox::audit`, optionally mirrored
///   to an append-only file
use crate::config::types::{GradeError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "gradebox::audit";

/// Audit event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Types of grading events we track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeEventType {
    SubmissionReceived,
    SubmissionRejected,
    GradingCompleted,
    WallTimeLimitViolation,
    ForcedKill,
    NoResultReturned,
    LaunchFailed,
}

impl GradeEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> Severity {
        match self {
            GradeEventType::SubmissionReceived => Severity::Low,
            GradeEventType::GradingCompleted => Severity::Low,
            GradeEventType::SubmissionRejected => Severity::Medium,
            GradeEventType::WallTimeLimitViolation => Severity::Medium,
            GradeEventType::ForcedKill => Severity::High,
            GradeEventType::NoResultReturned => Severity::High,
            GradeEventType::LaunchFailed => Severity::Critical,
        }
    }
}

/// Correlation identifiers for one grading request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub request_id: Uuid,
    pub problem_id: String,
    pub child_pid: Option<i32>,
}

impl Correlation {
    pub fn new(problem_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            problem_id: problem_id.into(),
            child_pid: None,
        }
    }

    /// Set child PID after fork
    pub fn with_child_pid(mut self, pid: i32) -> Self {
        self.child_pid = Some(pid);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeEvent {
    pub event_type: GradeEventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub correlation: Correlation,
}

impl GradeEvent {
    /// Create a new event with default severity
    pub fn new(event_type: GradeEventType, correlation: &Correlation, details: String) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: Utc::now(),
            details,
            correlation: correlation.clone(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Single-line JSON rendering with an RFC 3339 timestamp
    pub fn to_json_line(&self) -> String {
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "event_type": self.event_type,
            "severity": self.severity,
            "details": self.details,
            "request_id": self.correlation.request_id.to_string(),
            "problem_id": self.correlation.problem_id,
            "child_pid": self.correlation.child_pid,
            "process_id": std::process::id(),
        })
        .to_string()
    }
}

/// Append-only mirror of the audit stream
pub struct AuditLogger {
    audit_file: Mutex<File>,
    audit_path: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_path: &Path) -> Result<Self> {
        if let Some(parent) = audit_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GradeError::Config(format!("Failed to create audit log directory: {}", e))
                })?;
            }
        }

        let audit_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(audit_path)
            .map_err(|e| GradeError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            audit_file: Mutex::new(audit_file),
            audit_path: audit_path.to_path_buf(),
        })
    }

    pub fn write_line(&self, line: &str) {
        match self.audit_file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    error!("Failed to write audit log {}: {}", self.audit_path.display(), e);
                }
            }
            Err(_) => error!("Audit log mutex poisoned"),
        }
    }

    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }
}

static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Mirror audit events to `path`. Only the first call takes effect.
pub fn init_audit_log(path: &Path) -> Result<()> {
    let logger = AuditLogger::new(path)?;
    if AUDIT_LOGGER.set(logger).is_err() {
        warn!("Audit log already initialized; ignoring {}", path.display());
    }
    Ok(())
}

/// Emit one event to the log facade and the file mirror, if any
pub fn log_grade_event(event: GradeEvent) {
    let line = event.to_json_line();
    match event.severity {
        Severity::Critical | Severity::High => error!(target: AUDIT_TARGET, "{}", line),
        Severity::Medium => warn!(target: AUDIT_TARGET, "{}", line),
        Severity::Low => info!(target: AUDIT_TARGET, "{}", line),
    }
    if let Some(logger) = AUDIT_LOGGER.get() {
        logger.write_line(&line);
    }
}

pub fn submission_received(correlation: &Correlation, code_bytes: usize) {
    log_grade_event(GradeEvent::new(
        GradeEventType::SubmissionReceived,
        correlation,
        format!("Submission received: {} bytes", code_bytes),
    ));
}

pub fn submission_rejected(correlation: &Correlation, reason: &str) {
    log_grade_event(GradeEvent::new(
        GradeEventType::SubmissionRejected,
        correlation,
        format!("Submission rejected: {}", reason),
    ));
}

pub fn grading_completed(correlation: &Correlation, status: &str, details: String) {
    log_grade_event(GradeEvent::new(
        GradeEventType::GradingCompleted,
        correlation,
        format!("Grading completed: status={} {}", status, details),
    ));
}

pub fn wall_time_limit_violation(correlation: &Correlation, used_ms: u64, limit_ms: u64) {
    log_grade_event(GradeEvent::new(
        GradeEventType::WallTimeLimitViolation,
        correlation,
        format!(
            "Wall time limit violated: used={} ms, limit={} ms",
            used_ms, limit_ms
        ),
    ));
}

pub fn forced_kill(correlation: &Correlation, reason: String) {
    log_grade_event(GradeEvent::new(
        GradeEventType::ForcedKill,
        correlation,
        format!("Forced kill: {}", reason),
    ));
}

pub fn no_result_returned(correlation: &Correlation, exit: String) {
    log_grade_event(GradeEvent::new(
        GradeEventType::NoResultReturned,
        correlation,
        format!("Child exited without a result: {}", exit),
    ));
}

pub fn launch_failed(correlation: &Correlation, error: &GradeError) {
    log_grade_event(GradeEvent::new(
        GradeEventType::LaunchFailed,
        correlation,
        format!("Failed to start grader: {}", error),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_creation() {
        let correlation = Correlation::new("two_sum");
        assert_eq!(correlation.problem_id, "two_sum");
        assert!(correlation.child_pid.is_none());
        assert_ne!(correlation.request_id, Correlation::new("two_sum").request_id);
    }

    #[test]
    fn test_correlation_with_pid() {
        let correlation = Correlation::new("two_sum").with_child_pid(1234);
        assert_eq!(correlation.child_pid, Some(1234));
    }

    #[test]
    fn test_event_type_severity() {
        assert_eq!(GradeEventType::SubmissionReceived.default_severity(), Severity::Low);
        assert_eq!(GradeEventType::ForcedKill.default_severity(), Severity::High);
        assert_eq!(GradeEventType::LaunchFailed.default_severity(), Severity::Critical);
    }

    #[test]
    fn test_json_line_shape() {
        let correlation = Correlation::new("fibonacci").with_child_pid(42);
        let event = GradeEvent::new(
            GradeEventType::WallTimeLimitViolation,
            &correlation,
            "too slow".to_string(),
        );
        let line = event.to_json_line();
        assert!(!line.contains('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event_type"], "WallTimeLimitViolation");
        assert_eq!(parsed["severity"], "medium");
        assert_eq!(parsed["problem_id"], "fibonacci");
        assert_eq!(parsed["child_pid"], 42);
        assert_eq!(parsed["request_id"], correlation.request_id.to_string());
        assert!(DateTime::parse_from_rfc3339(parsed["timestamp"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_audit_logger_appends_lines() {
        let path = std::env::temp_dir().join(format!("gradebox-audit-{}.log", Uuid::new_v4()));
        let logger = AuditLogger::new(&path).unwrap();
        logger.write_line("{\"a\":1}");
        logger.write_line("{\"a\":2}");

        let contents = std::fs::read_to_string(logger.audit_path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let _ = std::fs::remove_file(path);
    }
}
