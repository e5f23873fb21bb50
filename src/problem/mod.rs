//! Problem bank
//!
//! Read-only registry of problems keyed by id. The grading core only ever
//! borrows a [`Problem`]; storing and editing problems is somebody else's job.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use crate::config::types::{GradeError, Result};

/// One hidden test: call arguments and the acceptable answer(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub args: Vec<Json>,
    #[serde(default)]
    pub kwargs: Map<String, Json>,
    /// A JSON array lists every acceptable answer.
    pub expected: Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub function_name: String,
    #[serde(default)]
    pub function_signature: String,
    #[serde(default)]
    pub template_code: String,
    pub tests: Vec<TestCase>,
}

impl Problem {
    pub fn summary(&self) -> ProblemSummary {
        ProblemSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            function_name: self.function_name.clone(),
            function_signature: self.function_signature.clone(),
            template_code: self.template_code.clone(),
        }
    }
}

/// Public projection of a [`Problem`]; never carries the tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub function_name: String,
    pub function_signature: String,
    pub template_code: String,
}

#[derive(Debug, Clone)]
pub struct ProblemBank {
    problems: BTreeMap<String, Problem>,
}

impl ProblemBank {
    pub fn from_problems(problems: Vec<Problem>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for problem in problems {
            if map.contains_key(&problem.id) {
                return Err(GradeError::Config(format!(
                    "duplicate problem id '{}'",
                    problem.id
                )));
            }
            map.insert(problem.id.clone(), problem);
        }
        Ok(Self { problems: map })
    }

    /// Stock problems shipped with the binary.
    pub fn builtin() -> Self {
        let problems = builtin_problems()
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        Self { problems }
    }

    /// Reads a JSON array of problems.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GradeError::Config(format!("Failed to read problems file {}: {}", path.display(), e))
        })?;
        let problems: Vec<Problem> = serde_json::from_str(&content)
            .map_err(|e| GradeError::Config(format!("Failed to parse problems JSON: {}", e)))?;
        log::debug!("loaded {} problems from {}", problems.len(), path.display());
        Self::from_problems(problems)
    }

    pub fn get(&self, id: &str) -> Option<&Problem> {
        self.problems.get(id)
    }

    /// Like [`ProblemBank::get`], reporting a missing id as [`GradeError::Problem`].
    pub fn require(&self, id: &str) -> Result<&Problem> {
        self.get(id)
            .ok_or_else(|| GradeError::Problem(id.to_string()))
    }

    /// Summaries sorted by id.
    pub fn list(&self) -> Vec<ProblemSummary> {
        self.problems.values().map(Problem::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

fn case(args: Json, expected: Json) -> TestCase {
    let args = match args {
        Json::Array(items) => items,
        other => vec![other],
    };
    TestCase {
        args,
        kwargs: Map::new(),
        expected,
    }
}

fn builtin_problems() -> Vec<Problem> {
    vec![
        Problem {
            id: "two_sum".to_string(),
            title: "Two Sum (Easy)".to_string(),
            description: "Return the indices of the two numbers in nums that add up to \
                          target. Exactly one answer exists and an element may not be used \
                          twice; either order of the pair is accepted."
                .to_string(),
            function_name: "two_sum".to_string(),
            function_signature: "def two_sum(nums, target):".to_string(),
            template_code: "def two_sum(nums, target):\n    # write your code here\n    return []\n"
                .to_string(),
            tests: vec![
                case(json!([[2, 7, 11, 15], 9]), json!([[0, 1], [1, 0]])),
                case(json!([[3, 2, 4], 6]), json!([[1, 2], [2, 1]])),
                case(json!([[3, 3], 6]), json!([[0, 1], [1, 0]])),
            ],
        },
        Problem {
            id: "fibonacci".to_string(),
            title: "Fibonacci N (Easy)".to_string(),
            description: "Return the n-th Fibonacci number, with fib(0) = 0 and fib(1) = 1."
                .to_string(),
            function_name: "fib".to_string(),
            function_signature: "def fib(n):".to_string(),
            template_code: "def fib(n):\n    a, b = 0, 1\n    for _ in range(n):\n        a, b = b, a + b\n    return a\n"
                .to_string(),
            tests: vec![
                case(json!([0]), json!(0)),
                case(json!([1]), json!(1)),
                case(json!([7]), json!(13)),
                case(json!([10]), json!(55)),
            ],
        },
        Problem {
            id: "is_palindrome".to_string(),
            title: "Is Palindrome (String)".to_string(),
            description: "Return True when s reads the same forwards and backwards, \
                          ignoring case and any character that is not a letter or digit."
                .to_string(),
            function_name: "is_palindrome".to_string(),
            function_signature: "def is_palindrome(s):".to_string(),
            template_code: "def is_palindrome(s):\n    t = ''.join(ch.lower() for ch in s if ch.isalnum())\n    return t == t[::-1]\n"
                .to_string(),
            tests: vec![
                case(json!(["A man, a plan, a canal: Panama"]), json!(true)),
                case(json!(["race a car"]), json!(false)),
                case(json!([""]), json!(true)),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_bank_lists_sorted_summaries() {
        let bank = ProblemBank::builtin();
        let ids: Vec<String> = bank.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["fibonacci", "is_palindrome", "two_sum"]);
        assert_eq!(bank.get("fibonacci").unwrap().function_name, "fib");
    }

    #[test]
    fn summary_omits_tests() {
        let bank = ProblemBank::builtin();
        let summary = serde_json::to_value(bank.list()).unwrap();
        assert!(summary[0].get("tests").is_none());
        assert_eq!(summary[2]["function_signature"], "def two_sum(nums, target):");
    }

    #[test]
    fn test_case_defaults_args_and_kwargs() {
        let case: TestCase = serde_json::from_str(r#"{"expected": 3}"#).unwrap();
        assert!(case.args.is_empty());
        assert!(case.kwargs.is_empty());
        assert_eq!(case.expected, json!(3));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let problem = ProblemBank::builtin().get("two_sum").unwrap().clone();
        let err = ProblemBank::from_problems(vec![problem.clone(), problem]).unwrap_err();
        assert!(matches!(err, GradeError::Config(_)));
        assert!(err.to_string().contains("duplicate problem id 'two_sum'"));
    }

    #[test]
    fn unknown_problem_is_reported() {
        let err = ProblemBank::builtin().require("nope").unwrap_err();
        assert!(matches!(err, GradeError::Problem(ref id) if id == "nope"));
    }
}
