use std::time::Duration;

use serde_json::Value as Json;

use super::result::{GradeResult, Summary, TestOutcome};
use crate::problem::TestCase;
use crate::runtime::Value;

/// How a test's `expected` field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expected<'a> {
    /// A JSON array lists every acceptable answer.
    AnyOf(&'a [Json]),
    /// Anything else must be matched by value equality.
    Exact(&'a Json),
}

impl<'a> Expected<'a> {
    pub fn classify(expected: &'a Json) -> Self {
        match expected {
            Json::Array(options) => Expected::AnyOf(options),
            other => Expected::Exact(other),
        }
    }

    pub fn matches(&self, got: &Value) -> bool {
        match self {
            Expected::AnyOf(options) => options
                .iter()
                .any(|option| got.py_eq(&Value::from_json(option))),
            Expected::Exact(value) => got.py_eq(&Value::from_json(value)),
        }
    }
}

/// Whether `got` satisfies the test's `expected` field.
pub fn score(got: &Value, expected: &Json) -> bool {
    Expected::classify(expected).matches(got)
}

/// Accumulates test outcomes in declared order.
#[derive(Debug, Default)]
pub struct Scorer {
    outcomes: Vec<TestOutcome>,
}

impl Scorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a test run: the returned value, or the rendered error.
    pub fn record(&mut self, case: &TestCase, run: Result<Value, String>) {
        let index = self.outcomes.len() + 1;
        let (ok, got, error) = match run {
            Ok(value) => (score(&value, &case.expected), Some(value.to_json()), None),
            Err(message) => (false, None, Some(message)),
        };
        self.outcomes.push(TestOutcome {
            index,
            args: case.args.clone(),
            kwargs: case.kwargs.clone(),
            expected: case.expected.clone(),
            ok,
            got,
            error,
        });
    }

    pub fn summary(&self) -> Summary {
        Summary {
            total: self.outcomes.len(),
            passed: self.outcomes.iter().filter(|o| o.ok).count(),
        }
    }

    pub fn finish(self, elapsed: Duration) -> GradeResult {
        let summary = self.summary();
        GradeResult::Ok {
            tests: self.outcomes,
            elapsed: round_secs(elapsed),
            summary,
        }
    }
}

/// Seconds rounded to four decimal places.
pub fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(args: Json, expected: Json) -> TestCase {
        serde_json::from_value(json!({"args": args, "expected": expected})).unwrap()
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn array_expected_means_any_of() {
        let expected = json!([[0, 1], [1, 0]]);
        assert!(score(&ints(&[0, 1]), &expected));
        assert!(score(&ints(&[1, 0]), &expected));
        assert!(!score(&ints(&[0, 0]), &expected));
        // A bare list answer against a wrapped expectation does not match.
        assert!(!score(&ints(&[0, 1]), &json!([0, 1])));
    }

    #[test]
    fn scalar_expected_uses_python_equality() {
        assert!(score(&Value::Int(1), &json!(1.0)));
        assert!(score(&Value::Bool(true), &json!(true)));
        assert!(score(&Value::Bool(true), &json!(1)));
        assert!(!score(&Value::str("1"), &json!(1)));
        assert!(score(&Value::None, &json!(null)));
    }

    #[test]
    fn scorer_counts_and_orders_outcomes() {
        let mut scorer = Scorer::new();
        scorer.record(&case(json!([0]), json!(0)), Ok(Value::Int(0)));
        scorer.record(&case(json!([1]), json!(1)), Err("ERROR: ValueError: bad".into()));
        scorer.record(&case(json!([2]), json!(1)), Ok(Value::Int(1)));
        assert_eq!(scorer.summary(), Summary { total: 3, passed: 2 });

        let GradeResult::Ok { tests, elapsed, .. } = scorer.finish(Duration::from_micros(123_456))
        else {
            panic!("expected ok result");
        };
        assert_eq!(elapsed, 0.1235);
        assert_eq!(tests.iter().map(|t| t.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(tests[1].got, None);
        assert_eq!(tests[1].error.as_deref(), Some("ERROR: ValueError: bad"));
        assert_eq!(tests[2].got, Some(json!(1)));
    }
}
