//! Integration tests for the grading core
//!
//! Every test here forks a real child through the public API and checks the
//! terminal result the caller sees.

use gradebox::verdict::{NO_RESULT_MESSAGE, TLE_MESSAGE};
use gradebox::{grade, launch, GradeLimits, GradeResult, Problem, ProblemBank};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde_json::json;
use std::time::{Duration, Instant};

fn builtin(id: &str) -> Problem {
    ProblemBank::builtin().get(id).unwrap().clone()
}

fn custom(function_name: &str, tests: serde_json::Value) -> Problem {
    serde_json::from_value(json!({
        "id": "custom",
        "title": "Custom",
        "function_name": function_name,
        "tests": tests,
    }))
    .unwrap()
}

fn error_of(result: &GradeResult) -> &str {
    match result {
        GradeResult::Error { error } => error,
        other => panic!("expected error result, got {:?}", other),
    }
}

#[test]
fn test_import_is_rejected_before_any_test_runs() {
    let problem = builtin("two_sum");
    for code in [
        "import os\ndef two_sum(nums, target):\n    return [0, 1]\n",
        "def two_sum(nums, target):\n    from os import path\n    return [0, 1]\n",
    ] {
        let result = grade(&problem, code, &GradeLimits::default());
        assert_eq!(result, GradeResult::error("Import statements are not allowed"));
        assert!(result.summary().is_none());
    }
}

#[test]
fn test_dunder_attribute_is_rejected() {
    let code = "def two_sum(nums, target):\n    return nums.__class__\n";
    let result = grade(&builtin("two_sum"), code, &GradeLimits::default());
    assert_eq!(error_of(&result), "Access to dunder attributes is not allowed");
}

#[test]
fn test_denied_name_is_rejected() {
    let code = "def two_sum(nums, target):\n    return eval('[0, 1]')\n";
    let result = grade(&builtin("two_sum"), code, &GradeLimits::default());
    assert_eq!(error_of(&result), "Usage of 'eval' is not allowed");
}

#[test]
fn test_syntax_error_reports_line() {
    let code = "def two_sum(nums, target):\n    return [0, 1\n\nx = 1\n";
    let result = grade(&builtin("two_sum"), code, &GradeLimits::default());
    let error = error_of(&result);
    assert!(error.starts_with("SyntaxError: "), "{}", error);
    assert!(error.contains("(line "), "{}", error);
}

#[test]
fn test_correct_two_sum_passes() {
    let code = "\
def two_sum(nums, target):
    seen = {}
    for i, n in enumerate(nums):
        if target - n in seen:
            return [seen[target - n], i]
        seen[n] = i
    return []
";
    let result = grade(&builtin("two_sum"), code, &GradeLimits::default());
    let GradeResult::Ok { tests, summary, elapsed } = result else {
        panic!("expected ok result");
    };
    assert_eq!((summary.total, summary.passed), (3, 3));
    assert_eq!(tests[0].got, Some(json!([0, 1])));
    assert!(elapsed >= 0.0);
}

#[test]
fn test_reversed_pair_order_still_passes() {
    let code = "\
def two_sum(nums, target):
    for j in range(len(nums) - 1, -1, -1):
        for i in range(j):
            if nums[i] + nums[j] == target:
                return [j, i]
";
    let result = grade(&builtin("two_sum"), code, &GradeLimits::default());
    let GradeResult::Ok { tests, summary, .. } = result else {
        panic!("expected ok result");
    };
    assert_eq!(tests[0].got, Some(json!([1, 0])));
    assert_eq!(summary.passed, 3);
}

#[test]
fn test_single_scenario_from_problem_statement() {
    let problem = custom(
        "two_sum",
        json!([{"args": [[2, 7, 11, 15], 9], "expected": [[0, 1], [1, 0]]}]),
    );
    let code = "def two_sum(nums, target):\n    return [1, 0]\n";
    let result = grade(&problem, code, &GradeLimits::default());
    assert_eq!(result.summary().map(|s| (s.total, s.passed)), Some((1, 1)));
}

#[test]
fn test_raise_on_second_of_three_tests() {
    let problem = custom(
        "f",
        json!([
            {"args": [1], "expected": 2},
            {"args": [2], "expected": 4},
            {"args": [3], "expected": 7}
        ]),
    );
    let code = "\
def f(n):
    if n == 2:
        return {}['missing']
    return n * 2
";
    let GradeResult::Ok { tests, summary, .. } = grade(&problem, code, &GradeLimits::default())
    else {
        panic!("expected ok result");
    };
    assert_eq!(tests.len(), 3);
    assert_eq!(tests.iter().map(|t| t.index).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(tests[0].ok);
    assert!(!tests[1].ok);
    assert_eq!(tests[1].got, None);
    assert_eq!(tests[1].error.as_deref(), Some("ERROR: KeyError: 'missing'"));
    // Scored independently: 6 != 7.
    assert!(!tests[2].ok);
    assert_eq!(tests[2].got, Some(json!(6)));
    assert_eq!(summary.passed, 1);
}

#[test]
fn test_infinite_loop_times_out_and_child_is_gone() {
    let limits = GradeLimits::default().with_overrides(Some(0.5), None);
    let code = "def fib(n):\n    while True:\n        n += 1\n";

    let started = Instant::now();
    let outcome = launch(&builtin("fibonacci"), code, &limits).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.result, GradeResult::tle());
    assert_eq!(outcome.result.error_message(), Some(TLE_MESSAGE));
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    assert_eq!(kill(Pid::from_raw(outcome.child_pid), None), Err(Errno::ESRCH));
}

#[test]
fn test_memory_blowup_is_an_error_not_a_hang() {
    let problem = builtin("fibonacci");
    for code in [
        "def fib(n):\n    return len([0] * (10 ** 10))\n",
        "def fib(n):\n    s = 'x'\n    while True:\n        s = s + s\n",
    ] {
        let result = grade(&problem, code, &GradeLimits::default());
        let error = error_of(&result);
        assert!(
            error.starts_with("ERROR: MemoryError") || error == NO_RESULT_MESSAGE,
            "{}",
            error
        );
    }
}

#[test]
fn test_missing_function_is_reported() {
    let code = "def fibonacci(n):\n    return n\n";
    let result = grade(&builtin("fibonacci"), code, &GradeLimits::default());
    assert_eq!(error_of(&result), "Function 'fib' is not defined");
}

#[test]
fn test_stock_templates_pass() {
    for problem in ["fibonacci", "is_palindrome"] {
        let problem = builtin(problem);
        let result = grade(&problem, &problem.template_code, &GradeLimits::default());
        assert!(result.all_passed(), "{}: {:?}", problem.id, result);
    }
}

#[test]
fn test_deep_recursion_fails_only_that_test() {
    let problem = custom(
        "depth",
        json!([
            {"args": [10], "expected": 10},
            {"args": [100000], "expected": 100000}
        ]),
    );
    let code = "def depth(n):\n    return 0 if n == 0 else 1 + depth(n - 1)\n";
    let GradeResult::Ok { tests, .. } = grade(&problem, code, &GradeLimits::default()) else {
        panic!("expected ok result");
    };
    assert!(tests[0].ok);
    assert_eq!(
        tests[1].error.as_deref(),
        Some("ERROR: RecursionError: maximum recursion depth exceeded")
    );
}

#[test]
fn test_deeply_nested_return_value_is_delivered() {
    let problem = custom("nest", json!([{"args": [130], "expected": 0}]));
    let code = "\
def nest(n):
    x = []
    for _ in range(n):
        x = [x]
    return x
";
    let GradeResult::Ok { tests, summary, .. } = grade(&problem, code, &GradeLimits::default())
    else {
        panic!("expected ok result");
    };
    assert_eq!((summary.total, summary.passed), (1, 0));
    assert!(tests[0].got.as_ref().is_some_and(|got| got.is_array()));
}

#[test]
fn test_kwargs_reach_the_function() {
    let problem = custom(
        "scale",
        json!([{"args": [3], "kwargs": {"factor": 4}, "expected": 12}]),
    );
    let code = "def scale(x, factor=1):\n    return x * factor\n";
    assert!(grade(&problem, code, &GradeLimits::default()).all_passed());
}

#[test]
fn test_concurrent_requests_are_independent() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let problem = builtin("fibonacci");
                let code = if i % 2 == 0 {
                    problem.template_code.clone()
                } else {
                    "def fib(n):\n    return -1\n".to_string()
                };
                (i, grade(&problem, &code, &GradeLimits::default()))
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.join().unwrap();
        assert_eq!(result.status(), "ok");
        assert_eq!(result.all_passed(), i % 2 == 0);
    }
}

#[test]
fn test_result_serializes_to_wire_shape() {
    let problem = builtin("fibonacci");
    let result = grade(&problem, &problem.template_code, &GradeLimits::default());
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["status"], "ok");
    assert_eq!(value["summary"], json!({"total": 4, "passed": 4}));
    let first = &value["tests"][0];
    for field in ["index", "args", "kwargs", "expected", "ok", "got", "error"] {
        assert!(first.get(field).is_some(), "missing {}", field);
    }
    assert_eq!(first["error"], serde_json::Value::Null);
}
