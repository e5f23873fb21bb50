// Limit validation
// Runs once at startup; errors are fatal before any grading happens.

use crate::config::types::{GradeError, GradeLimits, Result};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Turns collected errors into a single [`GradeError::Config`].
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.valid {
            Ok(self.warnings)
        } else {
            Err(GradeError::Config(format!(
                "Invalid grading limits:\n{}",
                self.errors.join("\n")
            )))
        }
    }
}

/// Validate resource limits
pub fn validate_limits(limits: &GradeLimits) -> ValidationResult {
    let mut result = ValidationResult::new();

    if !limits.time_limit.is_finite() || limits.time_limit <= 0.0 {
        result.add_error(format!(
            "time_limit must be a positive number of seconds (got {})",
            limits.time_limit
        ));
    }

    if limits.mem_limit_mb == 0 {
        result.add_error("mem_limit_mb cannot be zero".to_string());
    } else if limits.mem_limit_mb < 16 {
        result.add_warning(format!(
            "mem_limit_mb {} is very low (< 16MB), most submissions will fail",
            limits.mem_limit_mb
        ));
    }

    if limits.cpu_limit_secs == 0 {
        result.add_error("cpu_limit_secs cannot be zero".to_string());
    }

    if limits.max_recursion_depth == 0 {
        result.add_error("max_recursion_depth cannot be zero".to_string());
    }

    if limits.max_source_bytes == 0 {
        result.add_error("max_source_bytes cannot be zero".to_string());
    }

    // The two clocks are independent; only flag wildly mismatched values.
    if limits.cpu_limit_secs > 0
        && limits.time_limit.is_finite()
        && limits.time_limit > limits.cpu_limit_secs as f64 * 10.0
    {
        result.add_warning(format!(
            "time_limit ({}s) is more than 10x cpu_limit_secs ({}s)",
            limits.time_limit, limits.cpu_limit_secs
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_limits() {
        let result = validate_limits(&GradeLimits::default());
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_zero_time_limit() {
        let limits = GradeLimits {
            time_limit: 0.0,
            ..GradeLimits::default()
        };
        let result = validate_limits(&limits);
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("time_limit")));
    }

    #[test]
    fn test_zero_memory_and_cpu() {
        let limits = GradeLimits {
            mem_limit_mb: 0,
            cpu_limit_secs: 0,
            max_recursion_depth: 0,
            ..GradeLimits::default()
        };
        let result = validate_limits(&limits);
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors.iter().any(|e| e.contains("mem_limit_mb cannot be zero")));
        assert!(result.errors.iter().any(|e| e.contains("cpu_limit_secs cannot be zero")));
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let limits = GradeLimits {
            mem_limit_mb: 8,
            time_limit: 60.0,
            ..GradeLimits::default()
        };
        let result = validate_limits(&limits);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 2);
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_into_result_reports_all_errors() {
        let limits = GradeLimits {
            time_limit: f64::NAN,
            mem_limit_mb: 0,
            ..GradeLimits::default()
        };
        let err = validate_limits(&limits).into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("time_limit"));
        assert!(text.contains("mem_limit_mb"));
    }
}
