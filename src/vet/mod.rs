//! Static vetting of submitted source.
//!
//! Vetting parses the submission and walks the whole tree before anything
//! runs. A submission that passes comes back as a [`VettedModule`], the only
//! form the interpreter accepts:
//!
//! ```compile_fail
//! use gradebox::lang::parse_module;
//! use gradebox::runtime::Interpreter;
//! use gradebox::config::GradeLimits;
//!
//! let module = parse_module("def f():\n    return 1\n").unwrap();
//! let mut interp = Interpreter::new(&GradeLimits::default());
//! // A parsed but unvetted module cannot be executed.
//! interp.exec_module(&module).unwrap();
//! ```

use std::marker::PhantomData;

use thiserror::Error;

use crate::lang::ast::{Expr, Keyword, Module, Params, Stmt, StmtKind};
use crate::lang::parse_module;

/// Bare names that must never appear in a submission.
pub const DENIED_NAMES: &[&str] = &["__import__", "eval", "exec", "open"];

pub const DEFAULT_MAX_SOURCE_BYTES: usize = 64 * 1024;

/// Submission violates the static policy. `reason` reaches the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SecurityError {
    pub reason: String,
}

impl SecurityError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VetPolicy {
    pub denied_names: &'static [&'static str],
    pub max_source_bytes: usize,
}

impl Default for VetPolicy {
    fn default() -> Self {
        Self {
            denied_names: DENIED_NAMES,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl VetPolicy {
    pub fn with_max_source_bytes(mut self, max_source_bytes: usize) -> Self {
        self.max_source_bytes = max_source_bytes;
        self
    }
}

/// Type-state marker: parsed, not yet checked.
#[derive(Debug)]
pub struct Parsed;

/// Type-state marker: every node passed the policy.
#[derive(Debug)]
pub struct Vetted;

/// A parsed submission tagged with how far it got through vetting.
#[derive(Debug)]
pub struct Submission<S> {
    module: Module,
    _state: PhantomData<S>,
}

/// The only submission form that can be executed.
pub type VettedModule = Submission<Vetted>;

impl Submission<Parsed> {
    pub fn parse(code: &str, policy: &VetPolicy) -> Result<Self, SecurityError> {
        if code.len() > policy.max_source_bytes {
            return Err(SecurityError::new(format!(
                "Submission exceeds {} bytes",
                policy.max_source_bytes
            )));
        }
        let module = parse_module(code).map_err(|err| SecurityError::new(format!("SyntaxError: {err}")))?;
        Ok(Self {
            module,
            _state: PhantomData,
        })
    }

    /// Consumes the parsed submission; only success yields a [`VettedModule`].
    pub fn vet(self, policy: &VetPolicy) -> Result<VettedModule, SecurityError> {
        Walker { policy }.block(&self.module.body)?;
        Ok(Submission {
            module: self.module,
            _state: PhantomData,
        })
    }
}

impl Submission<Vetted> {
    pub fn module(&self) -> &Module {
        &self.module
    }
}

/// Parse and vet in one step.
pub fn vet_source(code: &str, policy: &VetPolicy) -> Result<VettedModule, SecurityError> {
    Submission::parse(code, policy)?.vet(policy)
}

struct Walker<'a> {
    policy: &'a VetPolicy,
}

impl Walker<'_> {
    fn block(&self, body: &[Stmt]) -> Result<(), SecurityError> {
        body.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&self, stmt: &Stmt) -> Result<(), SecurityError> {
        match &stmt.kind {
            StmtKind::Import(_) | StmtKind::ImportFrom { .. } => {
                Err(SecurityError::new("Import statements are not allowed"))
            }
            StmtKind::Expr(expr) | StmtKind::Return(Some(expr)) | StmtKind::Raise(Some(expr)) => {
                self.expr(expr)
            }
            StmtKind::Assign { targets, value } => {
                self.exprs(targets)?;
                self.expr(value)
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.expr(target)?;
                self.expr(value)
            }
            StmtKind::FunctionDef(def) => {
                self.params(&def.params)?;
                self.block(&def.body)
            }
            StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
                self.expr(test)?;
                self.block(body)?;
                self.block(orelse)
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.expr(target)?;
                self.expr(iter)?;
                self.block(body)?;
                self.block(orelse)
            }
            StmtKind::Delete(targets) => self.exprs(targets),
            StmtKind::Assert { test, msg } => {
                self.expr(test)?;
                msg.iter().try_for_each(|m| self.expr(m))
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.block(body)?;
                for handler in handlers {
                    if let Some(kind) = &handler.kind {
                        self.expr(kind)?;
                    }
                    self.block(&handler.body)?;
                }
                self.block(orelse)?;
                self.block(finalbody)
            }
            StmtKind::Return(None)
            | StmtKind::Raise(None)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Global(_)
            | StmtKind::Nonlocal(_) => Ok(()),
        }
    }

    fn params(&self, params: &Params) -> Result<(), SecurityError> {
        params.defaults().try_for_each(|default| self.expr(default))
    }

    fn exprs(&self, exprs: &[Expr]) -> Result<(), SecurityError> {
        exprs.iter().try_for_each(|expr| self.expr(expr))
    }

    fn keywords(&self, keywords: &[Keyword]) -> Result<(), SecurityError> {
        keywords.iter().try_for_each(|kw| self.expr(&kw.value))
    }

    fn expr(&self, expr: &Expr) -> Result<(), SecurityError> {
        match expr {
            Expr::Name(name) => {
                if self.policy.denied_names.contains(&name.as_str()) {
                    return Err(SecurityError::new(format!(
                        "Usage of '{name}' is not allowed"
                    )));
                }
                Ok(())
            }
            Expr::Attribute { value, attr } => {
                if attr.starts_with("__") {
                    return Err(SecurityError::new(
                        "Access to dunder attributes is not allowed",
                    ));
                }
                self.expr(value)
            }
            Expr::Constant(_) => Ok(()),
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => self.exprs(items),
            Expr::Dict(pairs) => pairs.iter().try_for_each(|(key, value)| {
                self.expr(key)?;
                self.expr(value)
            }),
            Expr::Starred(inner) => self.expr(inner),
            Expr::BinOp { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::BoolOp { values, .. } => self.exprs(values),
            Expr::Compare {
                left, comparators, ..
            } => {
                self.expr(left)?;
                self.exprs(comparators)
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(test)?;
                self.expr(body)?;
                self.expr(orelse)
            }
            Expr::Lambda(def) => {
                self.params(&def.params)?;
                self.block(&def.body)
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func)?;
                self.exprs(args)?;
                self.keywords(keywords)
            }
            Expr::Subscript { value, index } => {
                self.expr(value)?;
                self.expr(index)
            }
            Expr::Slice { lower, upper, step } => [lower, upper, step]
                .into_iter()
                .flatten()
                .try_for_each(|part| self.expr(part)),
            Expr::Comprehension {
                element,
                value,
                generators,
                ..
            } => {
                self.expr(element)?;
                if let Some(value) = value {
                    self.expr(value)?;
                }
                for generator in generators {
                    self.expr(&generator.target)?;
                    self.expr(&generator.iter)?;
                    self.exprs(&generator.conditions)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(code: &str) -> String {
        match vet_source(code, &VetPolicy::default()) {
            Ok(_) => panic!("expected rejection for {code:?}"),
            Err(err) => err.reason,
        }
    }

    #[test]
    fn accepts_plain_function() {
        let vetted = vet_source(
            "def two_sum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        if target - n in seen:\n            return [seen[target - n], i]\n        seen[n] = i\n",
            &VetPolicy::default(),
        )
        .expect("vet");
        assert_eq!(vetted.module().body.len(), 1);
    }

    #[test]
    fn rejects_imports_anywhere() {
        assert_eq!(reason("import os\n"), "Import statements are not allowed");
        assert_eq!(
            reason("def f():\n    if True:\n        from os import path\n"),
            "Import statements are not allowed"
        );
    }

    #[test]
    fn rejects_dunder_attributes() {
        assert_eq!(
            reason("x = ().__class__\n"),
            "Access to dunder attributes is not allowed"
        );
        assert_eq!(
            reason("f = lambda: [c for c in [1] if c.__init__]\n"),
            "Access to dunder attributes is not allowed"
        );
    }

    #[test]
    fn rejects_denied_names_in_any_position() {
        assert_eq!(reason("eval('1')\n"), "Usage of 'eval' is not allowed");
        assert_eq!(reason("def f(x=open):\n    pass\n"), "Usage of 'open' is not allowed");
        assert_eq!(reason("exec = 3\n"), "Usage of 'exec' is not allowed");
        assert_eq!(
            reason("g = {k: __import__ for k in []}\n"),
            "Usage of '__import__' is not allowed"
        );
    }

    #[test]
    fn denied_names_only_match_bare_names() {
        assert!(vet_source("x = 'eval'\ny = {'open': 1}\n", &VetPolicy::default()).is_ok());
    }

    #[test]
    fn syntax_errors_carry_line_numbers() {
        assert_eq!(reason("x = 1\ny = (\n"), "SyntaxError: '(' was never closed (line 2)");
        assert_eq!(reason("def f(:\n"), "SyntaxError: expected a name, found ':' (line 1)");
    }

    #[test]
    fn enforces_source_size() {
        let policy = VetPolicy::default().with_max_source_bytes(8);
        let err = vet_source("x = 123456789\n", &policy).err().expect("too large");
        assert_eq!(err.reason, "Submission exceeds 8 bytes");
    }
}
