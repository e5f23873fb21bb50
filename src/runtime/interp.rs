//! Statement execution and expression evaluation.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::builtins;
use super::dict::{Dict, Set};
use super::fault::{ExcKind, Fault, FaultResult};
use super::methods;
use super::ops;
use super::value::{ExceptionObj, Function, IterSource, Value, ValueIter};
use super::{OutputSink, RuntimeLimits};
use crate::config::GradeLimits;
use crate::lang::ast::{
    BinOp, BoolOp, CmpOp, ComprehensionKind, Expr, FunctionDef, Generator, Stmt, StmtKind,
    UnaryOp,
};
use crate::vet::VettedModule;

/// One lexical scope. Function scopes carry their [`ScopeInfo`]; the module
/// scope and comprehension scopes do not.
pub struct Env {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Env>>,
    scope: Option<Rc<ScopeInfo>>,
}

impl Env {
    fn module() -> Rc<Env> {
        Rc::new(Env {
            vars: RefCell::new(HashMap::new()),
            parent: None,
            scope: None,
        })
    }

    fn child(parent: &Rc<Env>, scope: Option<Rc<ScopeInfo>>) -> Rc<Env> {
        Rc::new(Env {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
            scope,
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    fn is_function_scope(&self) -> bool {
        self.scope.is_some()
    }
}

/// Names a function binds locally, and the names it declares `global` or
/// `nonlocal`. Computed once per `def` execution.
#[derive(Debug, Default)]
pub struct ScopeInfo {
    locals: HashSet<String>,
    globals: HashSet<String>,
    nonlocals: HashSet<String>,
}

impl ScopeInfo {
    pub fn analyze(def: &FunctionDef) -> ScopeInfo {
        let mut info = ScopeInfo::default();
        for name in def.params.names() {
            info.locals.insert(name.to_string());
        }
        info.collect_block(&def.body);
        for name in info.globals.iter().chain(info.nonlocals.iter()) {
            info.locals.remove(name);
        }
        info
    }

    fn collect_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Assign { targets, .. } => targets.iter().for_each(|t| self.collect_target(t)),
                StmtKind::AugAssign { target, .. } => self.collect_target(target),
                StmtKind::Delete(targets) => targets.iter().for_each(|t| self.collect_target(t)),
                StmtKind::FunctionDef(def) => {
                    self.locals.insert(def.name.clone());
                }
                StmtKind::For {
                    target,
                    body,
                    orelse,
                    ..
                } => {
                    self.collect_target(target);
                    self.collect_block(body);
                    self.collect_block(orelse);
                }
                StmtKind::If { body, orelse, .. } | StmtKind::While { body, orelse, .. } => {
                    self.collect_block(body);
                    self.collect_block(orelse);
                }
                StmtKind::Try {
                    body,
                    handlers,
                    orelse,
                    finalbody,
                } => {
                    self.collect_block(body);
                    for handler in handlers {
                        if let Some(name) = &handler.name {
                            self.locals.insert(name.clone());
                        }
                        self.collect_block(&handler.body);
                    }
                    self.collect_block(orelse);
                    self.collect_block(finalbody);
                }
                StmtKind::Global(names) => self.globals.extend(names.iter().cloned()),
                StmtKind::Nonlocal(names) => self.nonlocals.extend(names.iter().cloned()),
                _ => {}
            }
        }
    }

    fn collect_target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => {
                self.locals.insert(name.clone());
            }
            Expr::Tuple(items) | Expr::List(items) => {
                items.iter().for_each(|item| self.collect_target(item))
            }
            Expr::Starred(inner) => self.collect_target(inner),
            _ => {}
        }
    }
}

/// How a statement finished.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Subscript operand: a plain key or resolved slice bounds.
enum Index {
    Item(Value),
    Slice(Option<i64>, Option<i64>, Option<i64>),
}

enum Collector {
    Items(Vec<Value>),
    Pairs(Dict),
}

pub struct Interpreter {
    globals: Rc<Env>,
    limits: RuntimeLimits,
    depth: usize,
    output: OutputSink,
    /// Exceptions currently being handled, innermost last (for bare `raise`).
    handling: Vec<Rc<ExceptionObj>>,
}

impl Interpreter {
    pub fn new(limits: &GradeLimits) -> Self {
        Self::with_limits(RuntimeLimits::from_grade_limits(limits))
    }

    pub fn with_limits(limits: RuntimeLimits) -> Self {
        let output = OutputSink::new(limits.max_output_bytes);
        Self {
            globals: Env::module(),
            limits,
            depth: 0,
            output,
            handling: Vec::new(),
        }
    }

    pub fn limits(&self) -> &RuntimeLimits {
        &self.limits
    }

    pub fn output(&self) -> &OutputSink {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputSink {
        &mut self.output
    }

    /// Runs a vetted module's top level, binding its definitions as globals.
    pub fn exec_module(&mut self, module: &VettedModule) -> FaultResult<()> {
        let globals = self.globals.clone();
        self.exec_block(&module.module().body, &globals)?;
        Ok(())
    }

    /// A module-level binding, ignoring builtins.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub fn call(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> FaultResult<Value> {
        match callee {
            Value::Function(func) => self.call_function(func, args, kwargs),
            Value::Builtin(builtin) => builtin.call(self, args, kwargs),
            Value::BoundMethod(method) => {
                methods::call_method(self, &method.receiver, &method.name, args, kwargs)
            }
            Value::ExceptionType(kind) => {
                if !kwargs.is_empty() {
                    return Err(Fault::type_error(format!(
                        "{kind}() takes no keyword arguments"
                    )));
                }
                Ok(Value::exception(*kind, exception_message(*kind, &args)))
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        func: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> FaultResult<Value> {
        if self.depth >= self.limits.max_recursion_depth {
            return Err(Fault::raised(
                ExcKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let env = Env::child(&func.closure, Some(func.scope.clone()));
        bind_arguments(func, args, kwargs, &env)?;

        self.depth += 1;
        let flow = self.exec_block(&func.def.body, &env);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>, env: &Rc<Env>) -> FaultResult<Value> {
        let mut defaults = Vec::with_capacity(def.params.positional.len());
        for param in &def.params.positional {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, env)?),
                None => None,
            });
        }
        let mut kw_defaults = Vec::with_capacity(def.params.kwonly.len());
        for param in &def.params.kwonly {
            kw_defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, env)?),
                None => None,
            });
        }
        Ok(Value::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            kw_defaults,
            closure: env.clone(),
            scope: Rc::new(ScopeInfo::analyze(def)),
        })))
    }

    // ------------------------------------------------------------------
    // Iteration helpers shared with builtins and methods
    // ------------------------------------------------------------------

    pub fn iterate(&self, value: &Value) -> FaultResult<ValueIter> {
        let items: Vec<Value> = match value {
            Value::Str(s) => {
                self.limits.check_len(s.chars().count())?;
                s.chars().map(|c| Value::str(c.to_string())).collect()
            }
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.to_vec(),
            Value::Dict(dict) => dict.borrow().keys(),
            Value::Set(set) => set.borrow().values(),
            Value::Range(range) => return Ok(ValueIter::Owned(IterSource::from_range(*range))),
            Value::Iterator(source) => return Ok(ValueIter::Shared(source.clone())),
            other => {
                return Err(Fault::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        };
        Ok(ValueIter::Owned(IterSource::Items(items.into_iter())))
    }

    /// Materializes an iterable, failing before it outgrows the container cap.
    pub fn collect(&self, value: &Value) -> FaultResult<Vec<Value>> {
        if let Value::Range(range) = value {
            self.limits.check_len(range.len())?;
        }
        let mut out = Vec::new();
        for item in self.iterate(value)? {
            if out.len() >= self.limits.max_container_len {
                return Err(Fault::memory(out.len() + 1, self.limits.max_container_len));
            }
            out.push(item);
        }
        Ok(out)
    }

    /// Stable sort by `key(item)` using `<`, as `sorted` and `list.sort` do.
    pub fn sort_values(
        &mut self,
        items: Vec<Value>,
        key: Option<&Value>,
        reverse: bool,
    ) -> FaultResult<Vec<Value>> {
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let sort_key = match key {
                Some(func) if !matches!(func, Value::None) => {
                    self.call(func, vec![item.clone()], Vec::new())?
                }
                _ => item.clone(),
            };
            keyed.push((sort_key, item));
        }

        let mut error = None;
        keyed.sort_by(|(a, _), (b, _)| {
            let (x, y) = if reverse { (b, a) } else { (a, b) };
            match x.py_cmp(y, "<") {
                Ok(Some(ordering)) => ordering,
                Ok(None) => Ordering::Equal,
                Err(fault) => {
                    error.get_or_insert(fault);
                    Ordering::Equal
                }
            }
        });
        if let Some(fault) = error {
            return Err(fault);
        }
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt], env: &Rc<Env>) -> FaultResult<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Rc<Env>) -> FaultResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, env)?;
                for target in targets {
                    self.assign(target, value.clone(), env)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.exec_aug_assign(target, *op, value, env)?,
            StmtKind::FunctionDef(def) => {
                let func = self.make_function(def, env)?;
                self.store_name(env, &def.name, func)?;
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If { test, body, orelse } => {
                return if self.eval(test, env)?.is_truthy() {
                    self.exec_block(body, env)
                } else {
                    self.exec_block(orelse, env)
                };
            }
            StmtKind::While { test, body, orelse } => loop {
                if !self.eval(test, env)?.is_truthy() {
                    return self.exec_block(orelse, env);
                }
                match self.exec_block(body, env)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Continue | Flow::Normal => {}
                }
            },
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, env)?;
                for item in self.iterate(&iterable)? {
                    self.assign(target, item, env)?;
                    match self.exec_block(body, env)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                return self.exec_block(orelse, env);
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass | StmtKind::Global(_) | StmtKind::Nonlocal(_) => {}
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, env)?;
                }
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, env)?.is_truthy() {
                    let message = match msg {
                        Some(expr) => self.eval(expr, env)?.to_str(),
                        None => String::new(),
                    };
                    return Err(Fault::raised(ExcKind::AssertionError, message));
                }
            }
            StmtKind::Raise(exc) => return Err(self.raise(exc.as_ref(), env)?),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let outcome = match self.exec_block(body, env) {
                    Err(Fault::Raised { kind, message }) => {
                        self.handle_exception(handlers, kind, message, env)
                    }
                    Ok(Flow::Normal) => self.exec_block(orelse, env),
                    other => other,
                };
                if finalbody.is_empty() || matches!(outcome, Err(Fault::Exhausted(_))) {
                    return outcome;
                }
                return match self.exec_block(finalbody, env)? {
                    Flow::Normal => outcome,
                    flow => Ok(flow),
                };
            }
            StmtKind::Import(_) | StmtKind::ImportFrom { .. } => {
                return Err(Fault::raised(
                    ExcKind::RuntimeError,
                    "Import statements are not allowed",
                ))
            }
        }
        Ok(Flow::Normal)
    }

    fn raise(&mut self, exc: Option<&Expr>, env: &Rc<Env>) -> FaultResult<Fault> {
        let Some(expr) = exc else {
            return Ok(match self.handling.last() {
                Some(active) => active.to_fault(),
                None => Fault::raised(ExcKind::RuntimeError, "No active exception to reraise"),
            });
        };
        Ok(match self.eval(expr, env)? {
            Value::Exception(obj) => obj.to_fault(),
            Value::ExceptionType(kind) => Fault::raised(kind, ""),
            _ => Fault::type_error("exceptions must derive from BaseException"),
        })
    }

    fn handle_exception(
        &mut self,
        handlers: &[crate::lang::ast::ExceptHandler],
        kind: ExcKind,
        message: String,
        env: &Rc<Env>,
    ) -> FaultResult<Flow> {
        for handler in handlers {
            let matched = match &handler.kind {
                None => true,
                Some(expr) => {
                    let class = self.eval(expr, env)?;
                    exception_class_matches(&class, kind)?
                }
            };
            if !matched {
                continue;
            }
            let obj = Rc::new(ExceptionObj { kind, message });
            if let Some(name) = &handler.name {
                self.store_name(env, name, Value::Exception(obj.clone()))?;
            }
            self.handling.push(obj);
            let result = self.exec_block(&handler.body, env);
            self.handling.pop();
            if let Some(name) = &handler.name {
                let _ = self.delete_name(env, name);
            }
            return result;
        }
        Err(Fault::Raised { kind, message })
    }

    fn exec_aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr, env: &Rc<Env>) -> FaultResult<()> {
        match target {
            Expr::Name(name) => {
                let current = self.lookup(env, name)?;
                let rhs = self.eval(value, env)?;
                let result = self.augmented(op, current, rhs)?;
                self.store_name(env, name, result)
            }
            Expr::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval(container, env)?;
                let index = self.eval_index(index, env)?;
                let current = self.get_item(&container, &index)?;
                let rhs = self.eval(value, env)?;
                let result = self.augmented(op, current, rhs)?;
                self.set_item(&container, index, result)
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval(object, env)?;
                Err(read_only_attribute(&object, attr))
            }
            _ => Err(Fault::type_error("illegal expression for augmented assignment")),
        }
    }

    fn augmented(&mut self, op: BinOp, current: Value, rhs: Value) -> FaultResult<Value> {
        if let Some(value) = ops::inplace_op(op, &current, || self.collect(&rhs), &rhs, &self.limits)? {
            return Ok(value);
        }
        ops::binary_op(op, &current, &rhs, &self.limits)
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    fn lookup(&self, env: &Rc<Env>, name: &str) -> FaultResult<Value> {
        let mut current = env;
        loop {
            if let Some(scope) = &current.scope {
                if scope.globals.contains(name) {
                    return self.lookup_global(name);
                }
            }
            if let Some(value) = current.get(name) {
                return Ok(value);
            }
            if let Some(scope) = &current.scope {
                if scope.locals.contains(name) {
                    return Err(Fault::raised(
                        ExcKind::UnboundLocalError,
                        format!("cannot access local variable '{name}' where it is not associated with a value"),
                    ));
                }
            }
            match &current.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        builtins::lookup(name).ok_or_else(|| not_defined(name))
    }

    fn lookup_global(&self, name: &str) -> FaultResult<Value> {
        self.globals
            .get(name)
            .or_else(|| builtins::lookup(name))
            .ok_or_else(|| not_defined(name))
    }

    fn store_name(&self, env: &Rc<Env>, name: &str, value: Value) -> FaultResult<()> {
        if let Some(scope) = &env.scope {
            if scope.globals.contains(name) {
                self.globals.set(name, value);
                return Ok(());
            }
            if scope.nonlocals.contains(name) {
                let target = nonlocal_target(env, name)?;
                target.set(name, value);
                return Ok(());
            }
        }
        env.set(name, value);
        Ok(())
    }

    fn delete_name(&self, env: &Rc<Env>, name: &str) -> FaultResult<()> {
        let target = match &env.scope {
            Some(scope) if scope.globals.contains(name) => self.globals.clone(),
            Some(scope) if scope.nonlocals.contains(name) => nonlocal_target(env, name)?,
            _ => env.clone(),
        };
        let removed = target.vars.borrow_mut().remove(name);
        removed.map(|_| ()).ok_or_else(|| not_defined(name))
    }

    // ------------------------------------------------------------------
    // Targets
    // ------------------------------------------------------------------

    fn assign(&mut self, target: &Expr, value: Value, env: &Rc<Env>) -> FaultResult<()> {
        match target {
            Expr::Name(name) => self.store_name(env, name, value),
            Expr::Tuple(targets) | Expr::List(targets) => self.unpack(targets, value, env),
            Expr::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval(container, env)?;
                let index = self.eval_index(index, env)?;
                self.set_item(&container, index, value)
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval(object, env)?;
                Err(read_only_attribute(&object, attr))
            }
            _ => Err(Fault::type_error("cannot assign to expression")),
        }
    }

    fn unpack(&mut self, targets: &[Expr], value: Value, env: &Rc<Env>) -> FaultResult<()> {
        let items = self.collect(&value)?;
        let star = targets.iter().position(|t| matches!(t, Expr::Starred(_)));
        match star {
            None => {
                if items.len() != targets.len() {
                    return Err(if items.len() > targets.len() {
                        Fault::value_error(format!(
                            "too many values to unpack (expected {})",
                            targets.len()
                        ))
                    } else {
                        Fault::value_error(format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        ))
                    });
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, env)?;
                }
            }
            Some(star) => {
                let after = targets.len() - star - 1;
                if items.len() < targets.len() - 1 {
                    return Err(Fault::value_error(format!(
                        "not enough values to unpack (expected at least {}, got {})",
                        targets.len() - 1,
                        items.len()
                    )));
                }
                let mut items = items;
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(star);
                for (target, item) in targets[..star].iter().zip(items) {
                    self.assign(target, item, env)?;
                }
                if let Expr::Starred(inner) = &targets[star] {
                    self.assign(inner, Value::list(middle), env)?;
                }
                for (target, item) in targets[star + 1..].iter().zip(tail) {
                    self.assign(target, item, env)?;
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, target: &Expr, env: &Rc<Env>) -> FaultResult<()> {
        match target {
            Expr::Name(name) => self.delete_name(env, name),
            Expr::Tuple(targets) | Expr::List(targets) => {
                targets.iter().try_for_each(|t| self.delete(t, env))
            }
            Expr::Subscript { value, index } => {
                let container = self.eval(value, env)?;
                let index = self.eval_index(index, env)?;
                self.del_item(&container, index)
            }
            Expr::Attribute { value, attr } => {
                let object = self.eval(value, env)?;
                Err(read_only_attribute(&object, attr))
            }
            _ => Err(Fault::type_error("cannot delete expression")),
        }
    }

    // ------------------------------------------------------------------
    // Subscripts
    // ------------------------------------------------------------------

    fn eval_index(&mut self, expr: &Expr, env: &Rc<Env>) -> FaultResult<Index> {
        let Expr::Slice { lower, upper, step } = expr else {
            return Ok(Index::Item(self.eval(expr, env)?));
        };
        let mut bound = |part: &Option<Box<Expr>>| -> FaultResult<Option<i64>> {
            let Some(expr) = part else { return Ok(None) };
            match self.eval(expr, env)? {
                Value::None => Ok(None),
                value => value.as_index().map(Some).ok_or_else(|| {
                    Fault::type_error("slice indices must be integers or None or have an __index__ method")
                }),
            }
        };
        Ok(Index::Slice(bound(lower)?, bound(upper)?, bound(step)?))
    }

    fn get_item(&self, container: &Value, index: &Index) -> FaultResult<Value> {
        match (container, index) {
            (Value::List(items), Index::Item(i)) => {
                let items = items.borrow();
                let pos = sequence_index(i, items.len(), "list")?;
                Ok(items[pos].clone())
            }
            (Value::Tuple(items), Index::Item(i)) => {
                let pos = sequence_index(i, items.len(), "tuple")?;
                Ok(items[pos].clone())
            }
            (Value::Str(s), Index::Item(i)) => {
                let len = s.chars().count();
                let pos = sequence_index(i, len, "string")?;
                Ok(s.chars().nth(pos).map(|c| Value::str(c.to_string())).unwrap_or(Value::None))
            }
            (Value::Range(range), Index::Item(i)) => {
                let pos = sequence_index(i, range.len(), "range object")?;
                range.get(pos).map(Value::Int).ok_or_else(Fault::overflow)
            }
            (Value::List(items), Index::Slice(lo, hi, step)) => {
                let items = items.borrow();
                let picked = slice_positions(items.len(), *lo, *hi, *step)?;
                Ok(Value::list(picked.into_iter().map(|p| items[p].clone()).collect()))
            }
            (Value::Tuple(items), Index::Slice(lo, hi, step)) => {
                let picked = slice_positions(items.len(), *lo, *hi, *step)?;
                Ok(Value::tuple(picked.into_iter().map(|p| items[p].clone()).collect()))
            }
            (Value::Str(s), Index::Slice(lo, hi, step)) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_positions(chars.len(), *lo, *hi, *step)?;
                Ok(Value::str(picked.into_iter().map(|p| chars[p]).collect::<String>()))
            }
            (Value::Range(range), Index::Slice(lo, hi, step)) => {
                let picked = slice_positions(range.len(), *lo, *hi, *step)?;
                Ok(Value::list(
                    picked.into_iter().filter_map(|p| range.get(p)).map(Value::Int).collect(),
                ))
            }
            (Value::Dict(dict), Index::Item(key)) => dict
                .borrow()
                .get(key)?
                .ok_or_else(|| Fault::raised(ExcKind::KeyError, key.repr())),
            (Value::Dict(_), Index::Slice(..)) => Err(Fault::type_error("unhashable type: 'slice'")),
            (other, _) => Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn set_item(&self, container: &Value, index: Index, value: Value) -> FaultResult<()> {
        match (container, index) {
            (Value::List(items), Index::Item(i)) => {
                let len = items.borrow().len();
                let pos = sequence_index(&i, len, "list assignment")?;
                items.borrow_mut()[pos] = value;
                Ok(())
            }
            (Value::List(items), Index::Slice(lo, hi, step)) => {
                let replacement = self.collect(&value)?;
                let len = items.borrow().len();
                if step.unwrap_or(1) == 1 {
                    let positions = slice_positions(len, lo, hi, None)?;
                    let start = match positions.first() {
                        Some(first) => *first,
                        None => clamp_start(len, lo),
                    };
                    let end = start + positions.len();
                    self.limits.check_len(len - positions.len() + replacement.len())?;
                    items.borrow_mut().splice(start..end, replacement);
                    return Ok(());
                }
                let positions = slice_positions(len, lo, hi, step)?;
                if positions.len() != replacement.len() {
                    return Err(Fault::value_error(format!(
                        "attempt to assign sequence of size {} to extended slice of size {}",
                        replacement.len(),
                        positions.len()
                    )));
                }
                let mut items = items.borrow_mut();
                for (pos, item) in positions.into_iter().zip(replacement) {
                    items[pos] = item;
                }
                Ok(())
            }
            (Value::Dict(dict), Index::Item(key)) => {
                let mut dict = dict.borrow_mut();
                if dict.len() >= self.limits.max_container_len {
                    return Err(Fault::memory(dict.len() + 1, self.limits.max_container_len));
                }
                dict.insert(key, value)
            }
            (other, _) => Err(Fault::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn del_item(&self, container: &Value, index: Index) -> FaultResult<()> {
        match (container, index) {
            (Value::List(items), Index::Item(i)) => {
                let len = items.borrow().len();
                let pos = sequence_index(&i, len, "list assignment")?;
                items.borrow_mut().remove(pos);
                Ok(())
            }
            (Value::List(items), Index::Slice(lo, hi, step)) => {
                let len = items.borrow().len();
                let doomed: HashSet<usize> = slice_positions(len, lo, hi, step)?.into_iter().collect();
                let mut position = 0;
                items.borrow_mut().retain(|_| {
                    let keep = !doomed.contains(&position);
                    position += 1;
                    keep
                });
                Ok(())
            }
            (Value::Dict(dict), Index::Item(key)) => {
                let removed = dict.borrow_mut().remove(&key)?;
                removed
                    .map(|_| ())
                    .ok_or_else(|| Fault::raised(ExcKind::KeyError, key.repr()))
            }
            (other, _) => Err(Fault::type_error(format!(
                "'{}' object does not support item deletion",
                other.type_name()
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn eval(&mut self, expr: &Expr, env: &Rc<Env>) -> FaultResult<Value> {
        match expr {
            Expr::Name(name) => self.lookup(env, name),
            Expr::Constant(constant) => Ok(constant_value(constant)),
            Expr::List(items) => Ok(Value::list(self.eval_items(items, env)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_items(items, env)?)),
            Expr::Set(items) => {
                let items = self.eval_items(items, env)?;
                Ok(Value::set(Set::from_values(items)?))
            }
            Expr::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = self.eval(key, env)?;
                    let value = self.eval(value, env)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            Expr::Starred(_) => Err(Fault::type_error("can't use starred expression here")),
            Expr::BinOp { left, op, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                ops::binary_op(*op, &left, &right, &self.limits)
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.eval(operand, env)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                    _ => ops::unary_op(*op, &operand),
                }
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval(value, env)?;
                    let truthy = last.is_truthy();
                    match op {
                        BoolOp::And if !truthy => return Ok(last),
                        BoolOp::Or if truthy => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
            Expr::Compare {
                left,
                ops: cmp_ops,
                comparators,
            } => {
                let mut left = self.eval(left, env)?;
                for (op, right) in cmp_ops.iter().zip(comparators) {
                    let right = self.eval(right, env)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval(body, env)
                } else {
                    self.eval(orelse, env)
                }
            }
            Expr::Lambda(def) => self.make_function(def, env),
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                let callee = self.eval(func, env)?;
                let positional = self.eval_items(args, env)?;
                let mut kwargs: Vec<(String, Value)> = Vec::with_capacity(keywords.len());
                for keyword in keywords {
                    let value = self.eval(&keyword.value, env)?;
                    match &keyword.name {
                        Some(name) => kwargs.push((name.clone(), value)),
                        None => expand_kwargs(&value, &mut kwargs)?,
                    }
                }
                self.call(&callee, positional, kwargs)
            }
            Expr::Attribute { value, attr } => {
                let object = self.eval(value, env)?;
                methods::get_attribute(&object, attr)
            }
            Expr::Subscript { value, index } => {
                let container = self.eval(value, env)?;
                let index = self.eval_index(index, env)?;
                self.get_item(&container, &index)
            }
            Expr::Slice { .. } => Err(Fault::type_error("slice expressions are only valid in subscripts")),
            Expr::Comprehension {
                kind,
                element,
                value,
                generators,
            } => self.eval_comprehension(*kind, element, value.as_deref(), generators, env),
        }
    }

    /// Evaluates display or argument items, splicing `*iterable`.
    fn eval_items(&mut self, items: &[Expr], env: &Rc<Env>) -> FaultResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Expr::Starred(inner) => {
                    let iterable = self.eval(inner, env)?;
                    let spread = self.collect(&iterable)?;
                    self.limits.check_len(out.len() + spread.len())?;
                    out.extend(spread);
                }
                other => out.push(self.eval(other, env)?),
            }
        }
        Ok(out)
    }

    fn eval_comprehension(
        &mut self,
        kind: ComprehensionKind,
        element: &Expr,
        value: Option<&Expr>,
        generators: &[Generator],
        env: &Rc<Env>,
    ) -> FaultResult<Value> {
        let scope = Env::child(env, None);
        let mut collector = match kind {
            ComprehensionKind::Dict => Collector::Pairs(Dict::new()),
            _ => Collector::Items(Vec::new()),
        };
        self.comprehend(generators, element, value, &scope, &mut collector)?;
        Ok(match (kind, collector) {
            (_, Collector::Pairs(dict)) => Value::dict(dict),
            (ComprehensionKind::List, Collector::Items(items)) => Value::list(items),
            (ComprehensionKind::Set, Collector::Items(items)) => Value::set(Set::from_values(items)?),
            (_, Collector::Items(items)) => Value::iterator(items),
        })
    }

    fn comprehend(
        &mut self,
        generators: &[Generator],
        element: &Expr,
        value: Option<&Expr>,
        env: &Rc<Env>,
        out: &mut Collector,
    ) -> FaultResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            match out {
                Collector::Items(items) => {
                    self.limits.check_len(items.len() + 1)?;
                    items.push(self.eval(element, env)?);
                }
                Collector::Pairs(dict) => {
                    self.limits.check_len(dict.len() + 1)?;
                    let key = self.eval(element, env)?;
                    let value = match value {
                        Some(expr) => self.eval(expr, env)?,
                        None => Value::None,
                    };
                    dict.insert(key, value)?;
                }
            }
            return Ok(());
        };

        let iterable = self.eval(&first.iter, env)?;
        for item in self.iterate(&iterable)? {
            self.assign(&first.target, item, env)?;
            let mut keep = true;
            for condition in &first.conditions {
                if !self.eval(condition, env)?.is_truthy() {
                    keep = false;
                    break;
                }
            }
            if keep {
                self.comprehend(rest, element, value, env, out)?;
            }
        }
        Ok(())
    }
}

fn bind_arguments(
    func: &Function,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    env: &Rc<Env>,
) -> FaultResult<()> {
    let params = &func.def.params;
    let name = &func.def.name;
    let count = params.positional.len();

    let mut slots: Vec<Option<Value>> = vec![None; count];
    let mut args = args.into_iter();
    for (slot, value) in slots.iter_mut().zip(args.by_ref()) {
        *slot = Some(value);
    }
    let extra: Vec<Value> = args.collect();
    if !extra.is_empty() && params.varargs.is_none() {
        let required = func.defaults.iter().filter(|d| d.is_none()).count();
        let expected = if required == count {
            format!("{count} positional argument{}", plural(count))
        } else {
            format!("from {required} to {count} positional arguments")
        };
        let given = count + extra.len();
        return Err(Fault::type_error(format!(
            "{name}() takes {expected} but {given} {} given",
            if given == 1 { "was" } else { "were" }
        )));
    }

    let mut kw_slots: Vec<Option<Value>> = vec![None; params.kwonly.len()];
    let mut varkw = Dict::new();
    for (key, value) in kwargs {
        if let Some(i) = params.positional.iter().position(|p| p.name == key) {
            if slots[i].is_some() {
                return Err(Fault::type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            slots[i] = Some(value);
        } else if let Some(i) = params.kwonly.iter().position(|p| p.name == key) {
            kw_slots[i] = Some(value);
        } else if params.varkw.is_some() {
            varkw.insert(Value::str(key), value)?;
        } else {
            return Err(Fault::type_error(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        }
    }

    let mut missing = Vec::new();
    for ((param, slot), default) in params.positional.iter().zip(slots).zip(&func.defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => env.set(&param.name, value),
            None => missing.push(param.name.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(missing_arguments(name, "positional", &missing));
    }

    for ((param, slot), default) in params.kwonly.iter().zip(kw_slots).zip(&func.kw_defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => env.set(&param.name, value),
            None => missing.push(param.name.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(missing_arguments(name, "keyword-only", &missing));
    }

    if let Some(varargs) = &params.varargs {
        env.set(varargs, Value::tuple(extra));
    }
    if let Some(varkw_name) = &params.varkw {
        env.set(varkw_name, Value::dict(varkw));
    }
    Ok(())
}

fn missing_arguments(name: &str, kind: &str, missing: &[&str]) -> Fault {
    let quoted: Vec<String> = missing.iter().map(|m| format!("'{m}'")).collect();
    let list = match quoted.len() {
        1 => quoted[0].clone(),
        2 => format!("{} and {}", quoted[0], quoted[1]),
        n => format!("{}, and {}", quoted[..n - 1].join(", "), quoted[n - 1]),
    };
    Fault::type_error(format!(
        "{name}() missing {} required {kind} argument{}: {list}",
        missing.len(),
        plural(missing.len())
    ))
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn expand_kwargs(mapping: &Value, kwargs: &mut Vec<(String, Value)>) -> FaultResult<()> {
    let Value::Dict(dict) = mapping else {
        return Err(Fault::type_error(format!(
            "argument after ** must be a mapping, not {}",
            mapping.type_name()
        )));
    };
    for (key, value) in dict.borrow().items() {
        let Value::Str(key) = key else {
            return Err(Fault::type_error("keywords must be strings"));
        };
        if kwargs.iter().any(|(existing, _)| existing.as_str() == key.as_ref()) {
            return Err(Fault::type_error(format!(
                "got multiple values for keyword argument '{key}'"
            )));
        }
        kwargs.push((key.to_string(), value));
    }
    Ok(())
}

fn nonlocal_target(env: &Rc<Env>, name: &str) -> FaultResult<Rc<Env>> {
    let mut current = env.parent.as_ref();
    while let Some(candidate) = current {
        if candidate.is_function_scope() {
            let binds = candidate.vars.borrow().contains_key(name)
                || candidate
                    .scope
                    .as_ref()
                    .map_or(false, |scope| scope.locals.contains(name));
            if binds {
                return Ok(candidate.clone());
            }
        }
        current = candidate.parent.as_ref();
    }
    Err(Fault::raised(
        ExcKind::NameError,
        format!("no binding for nonlocal '{name}' found"),
    ))
}

fn not_defined(name: &str) -> Fault {
    Fault::raised(ExcKind::NameError, format!("name '{name}' is not defined"))
}

fn read_only_attribute(object: &Value, attr: &str) -> Fault {
    if methods::has_method(object, attr) {
        Fault::raised(
            ExcKind::AttributeError,
            format!("'{}' object attribute '{attr}' is read-only", object.type_name()),
        )
    } else {
        Fault::raised(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{attr}'", object.type_name()),
        )
    }
}

fn constant_value(constant: &crate::lang::ast::Constant) -> Value {
    use crate::lang::ast::Constant;
    match constant {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::str(s.as_str()),
    }
}

/// `str(Kind(*args))`.
pub fn exception_message(kind: ExcKind, args: &[Value]) -> String {
    match args {
        [] => String::new(),
        [single] if kind == ExcKind::KeyError => single.repr(),
        [single] => single.to_str(),
        many => Value::tuple(many.to_vec()).repr(),
    }
}

fn exception_class_matches(class: &Value, raised: ExcKind) -> FaultResult<bool> {
    match class {
        Value::ExceptionType(kind) => Ok(raised.is_subclass_of(*kind)),
        Value::Tuple(items) => {
            for item in items.iter() {
                if exception_class_matches(item, raised)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(Fault::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> FaultResult<bool> {
    let symbol = op.symbol();
    Ok(match op {
        CmpOp::Eq => left.py_eq(right),
        CmpOp::NotEq => !left.py_eq(right),
        CmpOp::Lt => left.py_cmp(right, symbol)? == Some(Ordering::Less),
        CmpOp::LtE => matches!(left.py_cmp(right, symbol)?, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => left.py_cmp(right, symbol)? == Some(Ordering::Greater),
        CmpOp::GtE => matches!(
            left.py_cmp(right, symbol)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CmpOp::In => ops::contains(right, left)?,
        CmpOp::NotIn => !ops::contains(right, left)?,
        CmpOp::Is => left.is_identical(right),
        CmpOp::IsNot => !left.is_identical(right),
    })
}

/// Resolves an integer subscript against a sequence of `len` items.
fn sequence_index(index: &Value, len: usize, what: &str) -> FaultResult<usize> {
    let Some(i) = index.as_index() else {
        return Err(Fault::type_error(format!(
            "{} indices must be integers or slices, not {}",
            what.split(' ').next().unwrap_or(what),
            index.type_name()
        )));
    };
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if i < 0 { i + len_i } else { i };
    if resolved < 0 || resolved >= len_i {
        return Err(Fault::index_error(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

fn clamp_start(len: usize, lower: Option<i64>) -> usize {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let start = match lower {
        None => 0,
        Some(i) if i < 0 => (i + len_i).max(0),
        Some(i) => i.min(len_i),
    };
    start as usize
}

/// Positions selected by `[lower:upper:step]` on a sequence of `len` items.
pub fn slice_positions(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> FaultResult<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Fault::value_error("slice step cannot be zero"));
    }
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |value: i64, low: i64, high: i64| {
        let value = if value < 0 { value.saturating_add(len) } else { value };
        value.clamp(low, high)
    };
    let (start, stop) = if step > 0 {
        (
            lower.map_or(0, |v| clamp(v, 0, len)),
            upper.map_or(len, |v| clamp(v, 0, len)),
        )
    } else {
        (
            lower.map_or(len - 1, |v| clamp(v, -1, len - 1)),
            upper.map_or(-1, |v| clamp(v, -1, len - 1)),
        )
    };
    let mut positions = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        positions.push(i as usize);
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vet::{vet_source, VetPolicy};

    fn run(source: &str) -> Interpreter {
        let module = vet_source(source, &VetPolicy::default()).expect("vet");
        let mut interp = Interpreter::new(&GradeLimits::default());
        interp.exec_module(&module).expect("exec");
        interp
    }

    fn global(source: &str, name: &str) -> Value {
        run(source).global(name).expect("global bound")
    }

    fn call(source: &str, func: &str, args: Vec<Value>) -> FaultResult<Value> {
        let mut interp = run(source);
        let callee = interp.global(func).expect("function bound");
        interp.call(&callee, args, Vec::new())
    }

    /// Deep recursion needs more stack than the default test thread has.
    fn on_big_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        std::thread::Builder::new()
            .stack_size(256 * 1024 * 1024)
            .spawn(f)
            .expect("spawn")
            .join()
            .expect("join")
    }

    #[test]
    fn two_sum_with_dict() {
        let source = "def two_sum(nums, target):\n    seen = {}\n    for i, x in enumerate(nums):\n        need = target - x\n        if need in seen:\n            return [seen[need], i]\n        seen[x] = i\n    return []\n";
        let nums = Value::list(vec![Value::Int(2), Value::Int(7), Value::Int(11), Value::Int(15)]);
        let got = call(source, "two_sum", vec![nums, Value::Int(9)]).unwrap();
        assert_eq!(got.repr(), "[0, 1]");
    }

    #[test]
    fn closures_and_nonlocal() {
        let source = "def counter():\n    n = 0\n    def bump():\n        nonlocal n\n        n += 1\n        return n\n    return bump\nc = counter()\nc()\nresult = c()\n";
        assert_eq!(global(source, "result").repr(), "2");
    }

    #[test]
    fn global_declaration_rebinds_module_name() {
        let source = "total = 1\ndef add(x):\n    global total\n    total += x\nadd(4)\n";
        assert_eq!(global(source, "total").repr(), "5");
    }

    #[test]
    fn unbound_local_is_reported() {
        let source = "count = 0\ndef f():\n    count += 1\n";
        let err = call(source, "f", vec![]).unwrap_err();
        assert_eq!(err.kind(), Some(ExcKind::UnboundLocalError));
    }

    #[test]
    fn try_except_finally_flow() {
        let source = "log = []\ndef f(x):\n    try:\n        log.append('try')\n        return 10 // x\n    except ZeroDivisionError as e:\n        log.append(str(e))\n        return -1\n    finally:\n        log.append('finally')\nr = [f(2), f(0)]\n";
        let interp = run(source);
        assert_eq!(interp.global("r").unwrap().repr(), "[5, -1]");
        assert_eq!(
            interp.global("log").unwrap().repr(),
            "['try', 'finally', 'try', 'integer division or modulo by zero', 'finally']"
        );
    }

    #[test]
    fn raise_and_reraise() {
        let source = "def f():\n    try:\n        raise ValueError('bad', 1)\n    except (KeyError, ValueError):\n        raise\n";
        let err = call(source, "f", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: ('bad', 1)");
    }

    #[test]
    fn key_error_message_uses_repr() {
        let err = call("def f():\n    return {}['missing']\n", "f", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'missing'");
    }

    #[test]
    fn argument_binding_errors() {
        let source = "def f(a, b, c=3):\n    return a + b + c\n";
        let mut interp = run(source);
        let f = interp.global("f").unwrap();
        let err = interp.call(&f, vec![Value::Int(1)], vec![]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: f() missing 1 required positional argument: 'b'");
        let err = interp
            .call(&f, vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)], vec![])
            .unwrap_err();
        assert_eq!(err.to_string(), "TypeError: f() takes from 2 to 3 positional arguments but 4 were given");
        let err = interp
            .call(&f, vec![Value::Int(1)], vec![("d".to_string(), Value::Int(1))])
            .unwrap_err();
        assert_eq!(err.to_string(), "TypeError: f() got an unexpected keyword argument 'd'");
        let ok = interp
            .call(&f, vec![Value::Int(1)], vec![("b".to_string(), Value::Int(2))])
            .unwrap();
        assert_eq!(ok.repr(), "6");
    }

    #[test]
    fn varargs_and_kwargs() {
        let source = "def f(*args, **kw):\n    return [len(args), sorted(kw)]\nr = f(1, 2, *[3], **{'x': 1, 'y': 2})\n";
        assert_eq!(global(source, "r").repr(), "[3, ['x', 'y']]");
    }

    #[test]
    fn comprehensions_and_unpacking() {
        let source = "pairs = {k: v * 2 for k, v in [('a', 1), ('b', 2)] if v}\nsquares = [x * x for x in range(5) if x % 2 == 0]\nfirst, *rest = [1, 2, 3]\nuniq = {c for c in 'hello'}\n";
        let interp = run(source);
        assert_eq!(interp.global("pairs").unwrap().repr(), "{'a': 2, 'b': 4}");
        assert_eq!(interp.global("squares").unwrap().repr(), "[0, 4, 16]");
        assert_eq!(interp.global("rest").unwrap().repr(), "[2, 3]");
        assert_eq!(interp.global("uniq").unwrap().repr(), "{'h', 'e', 'l', 'o'}");
    }

    #[test]
    fn slicing() {
        let source = "s = 'abcdef'\na = s[::-1]\nb = s[1:4]\nc = [0, 1, 2, 3, 4][-2:]\nl = [1, 2, 3, 4]\nl[1:3] = ['x']\ndel l[0]\n";
        let interp = run(source);
        assert_eq!(interp.global("a").unwrap().repr(), "'fedcba'");
        assert_eq!(interp.global("b").unwrap().repr(), "'bcd'");
        assert_eq!(interp.global("c").unwrap().repr(), "[3, 4]");
        assert_eq!(interp.global("l").unwrap().repr(), "['x', 4]");
    }

    #[test]
    fn list_augmented_add_mutates_in_place() {
        let source = "a = [1]\nb = a\na += (2, 3)\n";
        assert_eq!(global(source, "b").repr(), "[1, 2, 3]");
    }

    #[test]
    fn while_else_and_break() {
        let source = "i = 0\nfound = None\nwhile i < 10:\n    if i * i > 20:\n        found = i\n        break\n    i += 1\nelse:\n    found = -1\n";
        assert_eq!(global(source, "found").repr(), "5");
    }

    #[test]
    fn recursion_limit_raises_recursion_error() {
        let err = on_big_stack(|| {
            call("def f(n):\n    return f(n + 1)\n", "f", vec![Value::Int(0)]).unwrap_err()
        });
        assert_eq!(
            err.to_string(),
            "RecursionError: maximum recursion depth exceeded"
        );
    }

    #[test]
    fn recursion_within_limit_succeeds() {
        let got = on_big_stack(|| {
            call(
                "def fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\n",
                "fact",
                vec![Value::Int(20)],
            )
            .unwrap()
            .repr()
        });
        assert_eq!(got, "2432902008176640000");
    }

    #[test]
    fn unbound_builtins_are_name_errors() {
        let err = call("def f():\n    return globals()\n", "f", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "NameError: name 'globals' is not defined");
    }

    #[test]
    fn oversized_containers_are_exhaustion_not_exceptions() {
        let source = "def f():\n    try:\n        x = [0] * (10 ** 12)\n    except Exception:\n        return 'caught'\n";
        let err = call(source, "f", vec![]).unwrap_err();
        assert!(matches!(err, Fault::Exhausted(ref m) if m.starts_with("MemoryError")));
    }

    #[test]
    fn slice_positions_match_python() {
        assert_eq!(slice_positions(5, None, None, Some(-1)).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_positions(5, Some(-100), Some(100), None).unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(slice_positions(5, Some(3), Some(1), None).unwrap(), Vec::<usize>::new());
        assert!(slice_positions(5, None, None, Some(0)).is_err());
    }
}
