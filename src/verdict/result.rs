use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

pub const TLE_MESSAGE: &str = "Time Limit Exceeded";
pub const NO_RESULT_MESSAGE: &str = "No result returned";

/// Terminal status of one grading request.
///
/// Serializes to the wire shape callers consume:
/// `{"status":"ok","tests":[...],"elapsed":0.0123,"summary":{...}}`,
/// `{"status":"error","error":"..."}` or
/// `{"status":"tle","error":"Time Limit Exceeded"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GradeResult {
    Ok {
        tests: Vec<TestOutcome>,
        elapsed: f64,
        summary: Summary,
    },
    Error {
        error: String,
    },
    Tle {
        error: String,
    },
}

impl GradeResult {
    pub fn error(message: impl Into<String>) -> Self {
        GradeResult::Error {
            error: message.into(),
        }
    }

    pub fn tle() -> Self {
        GradeResult::Tle {
            error: TLE_MESSAGE.to_string(),
        }
    }

    /// The child exited (or was killed by the OS) without reporting.
    pub fn no_result() -> Self {
        Self::error(NO_RESULT_MESSAGE)
    }

    pub fn status(&self) -> &'static str {
        match self {
            GradeResult::Ok { .. } => "ok",
            GradeResult::Error { .. } => "error",
            GradeResult::Tle { .. } => "tle",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            GradeResult::Ok { .. } => None,
            GradeResult::Error { error } | GradeResult::Tle { error } => Some(error),
        }
    }

    pub fn summary(&self) -> Option<Summary> {
        match self {
            GradeResult::Ok { summary, .. } => Some(*summary),
            _ => None,
        }
    }

    /// `ok` with every test passing.
    pub fn all_passed(&self) -> bool {
        self.summary()
            .map_or(false, |summary| summary.passed == summary.total)
    }
}

/// Result of running one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// 1-based position in the problem's test list.
    pub index: usize,
    pub args: Vec<Json>,
    pub kwargs: Map<String, Json>,
    pub expected: Json,
    pub ok: bool,
    pub got: Option<Json>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_to_wire_shapes() {
        assert_eq!(
            serde_json::to_value(GradeResult::tle()).unwrap(),
            json!({"status": "tle", "error": "Time Limit Exceeded"})
        );
        assert_eq!(
            serde_json::to_value(GradeResult::no_result()).unwrap(),
            json!({"status": "error", "error": "No result returned"})
        );

        let ok = GradeResult::Ok {
            tests: vec![TestOutcome {
                index: 1,
                args: vec![json!(1)],
                kwargs: Map::new(),
                expected: json!(2),
                ok: false,
                got: None,
                error: Some("ERROR: ValueError: bad".to_string()),
            }],
            elapsed: 0.0012,
            summary: Summary { total: 1, passed: 0 },
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({
                "status": "ok",
                "tests": [{
                    "index": 1, "args": [1], "kwargs": {}, "expected": 2,
                    "ok": false, "got": null, "error": "ERROR: ValueError: bad"
                }],
                "elapsed": 0.0012,
                "summary": {"total": 1, "passed": 0}
            })
        );
    }

    #[test]
    fn deserializes_what_it_serializes() {
        let text = r#"{"status":"error","error":"Import statements are not allowed"}"#;
        let parsed: GradeResult = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.status(), "error");
        assert_eq!(parsed.error_message(), Some("Import statements are not allowed"));
        assert!(!parsed.all_passed());
    }
}
