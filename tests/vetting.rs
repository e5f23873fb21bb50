//! Integration tests for the static vettor
//!
//! Vetting never executes anything, so these run in-process.

use gradebox::{vet_source, ProblemBank, VetPolicy};

fn reason(code: &str) -> Option<String> {
    vet_source(code, &VetPolicy::default())
        .err()
        .map(|e| e.reason)
}

#[test]
fn test_stock_templates_are_clean() {
    for summary in ProblemBank::builtin().list() {
        assert_eq!(reason(&summary.template_code), None, "{}", summary.id);
    }
}

#[test]
fn test_violations_hidden_in_nested_positions() {
    let cases = [
        (
            "def f(x=open):\n    return x\n",
            "Usage of 'open' is not allowed",
        ),
        (
            "f = lambda: [y for y in __import__('os').listdir()]\n",
            "Usage of '__import__' is not allowed",
        ),
        (
            "def f():\n    try:\n        pass\n    except Exception:\n        import sys\n",
            "Import statements are not allowed",
        ),
        (
            "def f(d):\n    return {k: v.__dict__ for k, v in d.items()}\n",
            "Access to dunder attributes is not allowed",
        ),
        (
            "def f(s):\n    return s.format(**{'a': exec})\n",
            "Usage of 'exec' is not allowed",
        ),
    ];
    for (code, expected) in cases {
        assert_eq!(reason(code).as_deref(), Some(expected), "{}", code);
    }
}

#[test]
fn test_lookalike_names_are_allowed() {
    let code = "\
def f(obj):
    evaluate = 1
    obj.open = 2
    return obj.eval, evaluate, '__import__'
";
    assert_eq!(reason(code), None);
}

#[test]
fn test_source_limit_is_configurable() {
    let policy = VetPolicy::default().with_max_source_bytes(16);
    let err = vet_source("def f():\n    return 12345\n", &policy).unwrap_err();
    assert_eq!(err.reason, "Submission exceeds 16 bytes");
}
