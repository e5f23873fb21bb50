//! Grading steps executed inside the forked child.
//!
//! [`run_submission`] is a plain function: it vets, executes and scores one
//! submission in the current process. Process isolation and resource
//! limits are layered on by [`crate::core::supervisor`].

use std::thread;
use std::time::Instant;

use thiserror::Error;

use crate::config::types::GradeLimits;
use crate::problem::Problem;
use crate::runtime::{Fault, Interpreter, Value};
use crate::verdict::{GradeResult, Scorer};
use crate::vet::{vet_source, SecurityError, VetPolicy};

/// Stack reserved for the interpreter thread. Recursion in the submission
/// recurses natively, bounded by `max_recursion_depth`.
pub const RUNNER_STACK_BYTES: usize = 256 * 1024 * 1024;

/// Child exit codes, read back by the supervisor.
pub const EXIT_GRADED: i32 = 0;
pub const EXIT_REJECTED: i32 = 2;
pub const EXIT_FAILED: i32 = 3;
pub const EXIT_CHANNEL: i32 = 4;

/// Reasons a submission could not be graded at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("Function '{0}' is not defined")]
    Definition(String),

    /// Raised while executing the module body.
    #[error("ERROR: {0}")]
    Fault(Fault),

    /// A resource ceiling was hit, either at module level or inside a test.
    #[error("ERROR: {0}")]
    Exhausted(Fault),
}

impl RunnerError {
    fn from_fault(fault: Fault) -> Self {
        match fault {
            Fault::Raised { .. } => RunnerError::Fault(fault),
            Fault::Exhausted(_) => RunnerError::Exhausted(fault),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunnerError::Security(_) => EXIT_REJECTED,
            _ => EXIT_FAILED,
        }
    }

    pub fn into_result(self) -> GradeResult {
        GradeResult::error(self.to_string())
    }
}

/// Outcome of a single test call.
pub type TestRun = Result<Value, Fault>;

/// Vet, execute and score one submission in this process.
pub fn run_submission(
    problem: &Problem,
    code: &str,
    limits: &GradeLimits,
) -> Result<GradeResult, RunnerError> {
    let started = Instant::now();

    let policy = VetPolicy::default().with_max_source_bytes(limits.max_source_bytes);
    let module = vet_source(code, &policy)?;

    let mut interp = Interpreter::new(limits);
    interp.exec_module(&module).map_err(RunnerError::from_fault)?;

    let function = interp
        .global(&problem.function_name)
        .ok_or_else(|| RunnerError::Definition(problem.function_name.clone()))?;

    let mut scorer = Scorer::new();
    for case in &problem.tests {
        let args = case.args.iter().map(Value::from_json).collect();
        let kwargs = case
            .kwargs
            .iter()
            .map(|(name, value)| (name.clone(), Value::from_json(value)))
            .collect();

        let run: TestRun = interp.call(&function, args, kwargs);
        match run {
            Ok(value) => scorer.record(case, Ok(value)),
            Err(fault @ Fault::Raised { .. }) => scorer.record(case, Err(format!("ERROR: {fault}"))),
            Err(fault) => return Err(RunnerError::Exhausted(fault)),
        }
    }

    Ok(scorer.finish(started.elapsed()))
}

/// Like [`run_submission`], but never fails: errors become `status: error`.
/// Returns the result and the exit code the child should report.
pub fn grade_in_process(problem: &Problem, code: &str, limits: &GradeLimits) -> (GradeResult, i32) {
    match run_submission(problem, code, limits) {
        Ok(result) => (result, EXIT_GRADED),
        Err(err) => {
            let exit_code = err.exit_code();
            (err.into_result(), exit_code)
        }
    }
}

/// Run `f` on a thread with [`RUNNER_STACK_BYTES`] of stack and wait for it.
///
/// A panic on that thread is reported as `Err` with its message.
pub fn on_runner_stack<F, T>(f: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = thread::Builder::new()
        .name("gradebox-runner".to_string())
        .stack_size(RUNNER_STACK_BYTES)
        .spawn(f)
        .map_err(|e| format!("failed to spawn runner thread: {e}"))?;

    handle.join().map_err(|panic| {
        panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "runner thread panicked".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemBank;
    use serde_json::json;

    fn two_sum() -> Problem {
        ProblemBank::builtin().get("two_sum").unwrap().clone()
    }

    fn run(problem: Problem, code: &'static str) -> Result<GradeResult, RunnerError> {
        on_runner_stack(move || run_submission(&problem, code, &GradeLimits::default())).unwrap()
    }

    #[test]
    fn test_correct_two_sum_passes_everything() {
        let code = "def two_sum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        if target - n in seen:\n            return [seen[target - n], i]\n        seen[n] = i\n";
        let result = run(two_sum(), code).unwrap();
        assert_eq!(result.status(), "ok");
        assert!(result.all_passed());
    }

    #[test]
    fn test_security_error_short_circuits() {
        let err = run(two_sum(), "import os\ndef two_sum(a, b):\n    return []\n").unwrap_err();
        assert_eq!(err.to_string(), "Import statements are not allowed");
        assert_eq!(err.exit_code(), EXIT_REJECTED);
    }

    #[test]
    fn test_missing_function_is_definition_error() {
        let err = run(two_sum(), "def other():\n    pass\n").unwrap_err();
        assert_eq!(err, RunnerError::Definition("two_sum".to_string()));
        assert_eq!(err.to_string(), "Function 'two_sum' is not defined");
    }

    #[test]
    fn test_module_level_raise_is_top_level_error() {
        let err = run(two_sum(), "x = 1 // 0\n").unwrap_err();
        assert_eq!(
            err.into_result(),
            GradeResult::error("ERROR: ZeroDivisionError: integer division or modulo by zero")
        );
    }

    #[test]
    fn test_raise_in_one_test_is_isolated() {
        let mut problem = two_sum();
        problem.tests = serde_json::from_value(json!([
            {"args": [1], "expected": 1},
            {"args": [2], "expected": 2},
            {"args": [3], "expected": 3}
        ]))
        .unwrap();
        let code = "def two_sum(n):\n    if n == 2:\n        raise ValueError('bad input')\n    return n\n";
        let GradeResult::Ok { tests, summary, .. } = run(problem, code).unwrap() else {
            panic!("expected ok result");
        };
        assert_eq!(tests.len(), 3);
        assert!(tests[0].ok && tests[2].ok);
        assert!(!tests[1].ok);
        assert_eq!(tests[1].error.as_deref(), Some("ERROR: ValueError: bad input"));
        assert_eq!(summary.passed, 2);
    }

    #[test]
    fn test_kwargs_are_passed_by_name() {
        let mut problem = two_sum();
        problem.tests = serde_json::from_value(json!([
            {"args": [[1, 2]], "kwargs": {"target": 3}, "expected": [[0, 1]]}
        ]))
        .unwrap();
        let code = "def two_sum(nums, target=0):\n    return [0, 1] if nums[0] + nums[1] == target else []\n";
        assert!(run(problem, code).unwrap().all_passed());
    }

    #[test]
    fn test_memory_exhaustion_aborts_grading() {
        let code = "def two_sum(nums, target):\n    return [0] * (10 ** 12)\n";
        let err = run(two_sum(), code).unwrap_err();
        assert!(matches!(err, RunnerError::Exhausted(_)));
        assert!(err.to_string().starts_with("ERROR: MemoryError"));
    }

    #[test]
    fn test_panic_on_runner_stack_is_reported() {
        let err = on_runner_stack::<_, ()>(|| panic!("boom")).unwrap_err();
        assert_eq!(err, "boom");
    }
}
