//! Tree-walking interpreter for vetted submissions.
//!
//! The interpreter only ever sees names from the module being executed and
//! the fixed builtin table in [`builtins`]. There is no host I/O surface:
//! `print` lands in an [`OutputSink`] owned by the interpreter.

pub mod builtins;
pub mod dict;
pub mod fault;
pub mod format;
pub mod interp;
pub mod methods;
pub mod ops;
pub mod value;

pub use fault::{ExcKind, Fault, FaultResult};
pub use interp::Interpreter;
pub use value::Value;

use crate::config::GradeLimits;

/// Approximate bytes per container slot used to turn a memory budget into
/// an element cap.
const BYTES_PER_SLOT: u64 = 32;

/// Guards applied while evaluating submission code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub max_recursion_depth: usize,
    pub max_container_len: usize,
    pub max_str_bytes: usize,
    pub max_output_bytes: usize,
}

impl RuntimeLimits {
    pub fn from_grade_limits(limits: &GradeLimits) -> Self {
        let budget = limits.mem_limit_mb.saturating_mul(1024 * 1024);
        Self {
            max_recursion_depth: limits.max_recursion_depth,
            max_container_len: usize::try_from(budget / BYTES_PER_SLOT).unwrap_or(usize::MAX),
            max_str_bytes: usize::try_from(budget / 2).unwrap_or(usize::MAX),
            max_output_bytes: 64 * 1024,
        }
    }

    /// Fails before a container of `len` elements is materialized.
    pub fn check_len(&self, len: usize) -> FaultResult<()> {
        if len > self.max_container_len {
            return Err(Fault::memory(len, self.max_container_len));
        }
        Ok(())
    }

    pub fn check_str(&self, bytes: usize) -> FaultResult<()> {
        if bytes > self.max_str_bytes {
            return Err(Fault::memory(bytes, self.max_str_bytes));
        }
        Ok(())
    }
}

/// Bounded capture of `print` output. Writes past the limit are dropped.
#[derive(Debug, Default)]
pub struct OutputSink {
    buffer: String,
    limit: usize,
    truncated: bool,
}

impl OutputSink {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit,
            truncated: false,
        }
    }

    pub fn write(&mut self, text: &str) {
        if self.truncated {
            return;
        }
        let room = self.limit.saturating_sub(self.buffer.len());
        if text.len() <= room {
            self.buffer.push_str(text);
            return;
        }
        let mut cut = room;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buffer.push_str(&text[..cut]);
        self.truncated = true;
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_scale_with_memory_budget() {
        let limits = RuntimeLimits::from_grade_limits(&GradeLimits::default());
        assert_eq!(limits.max_recursion_depth, 400);
        assert_eq!(limits.max_container_len, 128 * 1024 * 1024 / 32);
        assert!(limits.check_len(10).is_ok());
        assert!(matches!(
            limits.check_str(usize::MAX),
            Err(Fault::Exhausted(_))
        ));
    }

    #[test]
    fn output_sink_truncates_on_char_boundary() {
        let mut sink = OutputSink::new(5);
        sink.write("abc");
        sink.write("déf");
        assert_eq!(sink.contents(), "abcd");
        assert!(sink.is_truncated());
        sink.write("x");
        assert_eq!(sink.contents(), "abcd");
    }
}
