//! Exception kinds and the fault type threaded through evaluation.

use std::fmt;

use thiserror::Error;

/// Exception classes known to the interpreter.
///
/// Only a subset is bound as names in the builtin namespace; the rest can
/// be raised by the runtime and caught through a bound ancestor
/// (`except Exception:` catches a `NameError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    Exception,
    ArithmeticError,
    AssertionError,
    AttributeError,
    IndexError,
    KeyError,
    LookupError,
    NameError,
    NotImplementedError,
    OverflowError,
    RecursionError,
    RuntimeError,
    StopIteration,
    TypeError,
    UnboundLocalError,
    ValueError,
    ZeroDivisionError,
}

impl ExcKind {
    pub fn name(self) -> &'static str {
        match self {
            ExcKind::Exception => "Exception",
            ExcKind::ArithmeticError => "ArithmeticError",
            ExcKind::AssertionError => "AssertionError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::IndexError => "IndexError",
            ExcKind::KeyError => "KeyError",
            ExcKind::LookupError => "LookupError",
            ExcKind::NameError => "NameError",
            ExcKind::NotImplementedError => "NotImplementedError",
            ExcKind::OverflowError => "OverflowError",
            ExcKind::RecursionError => "RecursionError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::StopIteration => "StopIteration",
            ExcKind::TypeError => "TypeError",
            ExcKind::UnboundLocalError => "UnboundLocalError",
            ExcKind::ValueError => "ValueError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
        }
    }

    pub fn parent(self) -> Option<ExcKind> {
        match self {
            ExcKind::Exception => None,
            ExcKind::OverflowError | ExcKind::ZeroDivisionError => Some(ExcKind::ArithmeticError),
            ExcKind::IndexError | ExcKind::KeyError => Some(ExcKind::LookupError),
            ExcKind::RecursionError | ExcKind::NotImplementedError => Some(ExcKind::RuntimeError),
            ExcKind::UnboundLocalError => Some(ExcKind::NameError),
            _ => Some(ExcKind::Exception),
        }
    }

    /// `issubclass(self, other)`.
    pub fn is_subclass_of(self, other: ExcKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

impl fmt::Display for ExcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why evaluation stopped abnormally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    /// A language-level exception. Catchable, and scoped to one test call.
    #[error("{kind}: {message}")]
    Raised { kind: ExcKind, message: String },
    /// A resource ceiling was hit. Never catchable; aborts grading.
    #[error("{0}")]
    Exhausted(String),
}

pub type FaultResult<T> = std::result::Result<T, Fault>;

impl Fault {
    pub fn raised(kind: ExcKind, message: impl Into<String>) -> Self {
        Fault::Raised {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raised(ExcKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raised(ExcKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::raised(ExcKind::IndexError, message)
    }

    pub fn overflow() -> Self {
        Self::raised(ExcKind::OverflowError, "integer overflow")
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::raised(ExcKind::ZeroDivisionError, message)
    }

    pub fn memory(requested: usize, limit: usize) -> Self {
        Fault::Exhausted(format!(
            "MemoryError: cannot allocate {requested} items (limit {limit})"
        ))
    }

    pub fn kind(&self) -> Option<ExcKind> {
        match self {
            Fault::Raised { kind, .. } => Some(*kind),
            Fault::Exhausted(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_follows_python() {
        assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::ArithmeticError));
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::LookupError));
        assert!(ExcKind::RecursionError.is_subclass_of(ExcKind::Exception));
        assert!(!ExcKind::ValueError.is_subclass_of(ExcKind::LookupError));
    }

    #[test]
    fn raised_display_matches_error_strings() {
        let fault = Fault::value_error("bad input");
        assert_eq!(fault.to_string(), "ValueError: bad input");
        assert_eq!(
            Fault::memory(10, 5).to_string(),
            "MemoryError: cannot allocate 10 items (limit 5)"
        );
    }
}
