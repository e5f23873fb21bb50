//! Recursive-descent parser producing [`Module`] trees.
//!
//! Precedence follows Python 3, lowest first: `lambda`, conditional
//! expression, `or`, `and`, `not`, comparisons, `|`, `^`, `&`, shifts,
//! additive, multiplicative, unary, `**`, then primaries with trailers.

use std::rc::Rc;

use super::ast::{
    BinOp, BoolOp, CmpOp, ComprehensionKind, Constant, ExceptHandler, Expr, FunctionDef,
    Generator, Keyword, Module, Param, Params, Stmt, StmtKind, UnaryOp,
};
use super::lexer::{tokenize, Token, TokenKind};
use super::{ParseError, ParseResult};

/// Parse a complete source file.
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> ParseResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            self.error(format!("expected '{op}'"))
        }
    }

    fn check_kw(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(k) if *k == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.check_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> ParseResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            self.error(format!("expected '{kw}'"))
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.error(format!("expected a name, found {}", self.peek().describe())),
        }
    }

    fn check_newline(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndOfFile)
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError::new(message, self.line()))
    }

    fn invalid_syntax<T>(&self) -> ParseResult<T> {
        self.error("invalid syntax")
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_module(mut self) -> ParseResult<Module> {
        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.pos += 1;
                }
                TokenKind::Indent => return self.error("unexpected indent"),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(Module { body })
    }

    fn parse_statement(&mut self) -> ParseResult<Vec<Stmt>> {
        let line = self.line();
        let kind = match &self.peek().kind {
            TokenKind::Keyword("def") => self.parse_def()?,
            TokenKind::Keyword("if") => self.parse_if()?,
            TokenKind::Keyword("while") => self.parse_while()?,
            TokenKind::Keyword("for") => self.parse_for()?,
            TokenKind::Keyword("try") => self.parse_try()?,
            TokenKind::Keyword("class") => {
                return self.error("class definitions are not supported")
            }
            TokenKind::Keyword("with") => return self.error("with statements are not supported"),
            TokenKind::Keyword("async") => {
                return self.error("async definitions are not supported")
            }
            TokenKind::Op("@") => return self.error("decorators are not supported"),
            TokenKind::Dedent => return self.error("unindent does not match any outer indentation level"),
            TokenKind::Indent => return self.error("unexpected indent"),
            _ => return self.parse_simple_line(),
        };
        Ok(vec![Stmt { kind, line }])
    }

    fn parse_simple_line(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            let line = self.line();
            let kind = self.parse_small_statement()?;
            stmts.push(Stmt { kind, line });
            if self.eat_op(";") {
                if self.check_newline() {
                    break;
                }
                continue;
            }
            break;
        }
        match self.peek().kind {
            TokenKind::Newline => {
                self.pos += 1;
                Ok(stmts)
            }
            TokenKind::EndOfFile => Ok(stmts),
            _ => self.invalid_syntax(),
        }
    }

    fn parse_block(&mut self, header: &str, header_line: usize) -> ParseResult<Vec<Stmt>> {
        self.expect_op(":")?;
        if !matches!(self.peek().kind, TokenKind::Newline) {
            return self.parse_simple_line();
        }
        self.pos += 1;
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return self.error(format!(
                "expected an indented block after '{header}' statement on line {header_line}"
            ));
        }
        self.pos += 1;

        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Dedent => {
                    self.pos += 1;
                    break;
                }
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.pos += 1;
                }
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_small_statement(&mut self) -> ParseResult<StmtKind> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Keyword("pass") => {
                self.pos += 1;
                Ok(StmtKind::Pass)
            }
            TokenKind::Keyword("break") => {
                self.pos += 1;
                Ok(StmtKind::Break)
            }
            TokenKind::Keyword("continue") => {
                self.pos += 1;
                Ok(StmtKind::Continue)
            }
            TokenKind::Keyword("return") => {
                self.pos += 1;
                if self.check_newline() || self.check_op(";") {
                    Ok(StmtKind::Return(None))
                } else {
                    Ok(StmtKind::Return(Some(self.parse_testlist_star()?)))
                }
            }
            TokenKind::Keyword("global") => {
                self.pos += 1;
                Ok(StmtKind::Global(self.parse_name_list()?))
            }
            TokenKind::Keyword("nonlocal") => {
                self.pos += 1;
                Ok(StmtKind::Nonlocal(self.parse_name_list()?))
            }
            TokenKind::Keyword("del") => {
                self.pos += 1;
                let target = self.parse_exprlist()?;
                let targets = match target {
                    Expr::Tuple(items) => items,
                    other => vec![other],
                };
                for target in &targets {
                    self.validate_target(target, "delete")?;
                }
                Ok(StmtKind::Delete(targets))
            }
            TokenKind::Keyword("assert") => {
                self.pos += 1;
                let test = self.parse_test()?;
                let msg = if self.eat_op(",") {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                Ok(StmtKind::Assert { test, msg })
            }
            TokenKind::Keyword("raise") => {
                self.pos += 1;
                if self.check_newline() || self.check_op(";") {
                    return Ok(StmtKind::Raise(None));
                }
                let exc = self.parse_test()?;
                if self.eat_kw("from") {
                    // The cause is evaluated for side effects only.
                    self.parse_test()?;
                }
                Ok(StmtKind::Raise(Some(exc)))
            }
            TokenKind::Keyword("import") => {
                self.pos += 1;
                let mut modules = Vec::new();
                loop {
                    modules.push(self.parse_dotted_name()?);
                    if self.eat_kw("as") {
                        self.expect_name()?;
                    }
                    if !self.eat_op(",") {
                        break;
                    }
                }
                Ok(StmtKind::Import(modules))
            }
            TokenKind::Keyword("from") => {
                self.pos += 1;
                let mut module = String::new();
                while self.check_op(".") || self.check_op("...") {
                    if let TokenKind::Op(dots) = self.advance().kind {
                        module.push_str(dots);
                    }
                }
                if !self.check_kw("import") {
                    module.push_str(&self.parse_dotted_name()?);
                }
                self.expect_kw("import")?;
                let mut names = Vec::new();
                if self.eat_op("*") {
                    names.push("*".to_string());
                } else {
                    let parenthesized = self.eat_op("(");
                    loop {
                        names.push(self.expect_name()?);
                        if self.eat_kw("as") {
                            self.expect_name()?;
                        }
                        if !self.eat_op(",") {
                            break;
                        }
                        if parenthesized && self.check_op(")") {
                            break;
                        }
                    }
                    if parenthesized {
                        self.expect_op(")")?;
                    }
                }
                Ok(StmtKind::ImportFrom { module, names })
            }
            TokenKind::Keyword("yield") => self.error("generators are not supported"),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_name_list(&mut self) -> ParseResult<Vec<String>> {
        let mut names = vec![self.expect_name()?];
        while self.eat_op(",") {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn parse_dotted_name(&mut self) -> ParseResult<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_expression_statement(&mut self) -> ParseResult<StmtKind> {
        let first = self.parse_testlist_star()?;

        if let TokenKind::Op(op) = self.peek().kind {
            if let Some(bin_op) = augmented_op(op) {
                self.pos += 1;
                if !matches!(
                    first,
                    Expr::Name(_) | Expr::Subscript { .. } | Expr::Attribute { .. }
                ) {
                    return self.error("illegal expression for augmented assignment");
                }
                let value = self.parse_testlist()?;
                return Ok(StmtKind::AugAssign {
                    target: first,
                    op: bin_op,
                    value,
                });
            }
        }

        if self.eat_op(":") {
            // Annotated assignment; the annotation is discarded unevaluated.
            self.validate_target(&first, "assign")?;
            self.parse_test()?;
            if self.eat_op("=") {
                let value = self.parse_testlist_star()?;
                return Ok(StmtKind::Assign {
                    targets: vec![first],
                    value,
                });
            }
            return Ok(StmtKind::Pass);
        }

        if !self.check_op("=") {
            if let Expr::Starred(_) = first {
                return self.error("can't use starred expression here");
            }
            return Ok(StmtKind::Expr(first));
        }

        let mut targets = vec![first];
        let mut value;
        loop {
            self.expect_op("=")?;
            value = self.parse_testlist_star()?;
            if !self.check_op("=") {
                break;
            }
            targets.push(value);
        }
        for target in &targets {
            self.validate_target(target, "assign")?;
        }
        Ok(StmtKind::Assign { targets, value })
    }

    fn validate_target(&self, target: &Expr, verb: &str) -> ParseResult<()> {
        match target {
            Expr::Name(_) | Expr::Subscript { .. } | Expr::Attribute { .. } => Ok(()),
            Expr::Tuple(items) | Expr::List(items) => {
                let starred = items
                    .iter()
                    .filter(|item| matches!(item, Expr::Starred(_)))
                    .count();
                if starred > 1 {
                    return self.error("multiple starred expressions in assignment");
                }
                items
                    .iter()
                    .try_for_each(|item| self.validate_target(item, verb))
            }
            Expr::Starred(inner) if verb == "assign" => self.validate_target(inner, verb),
            Expr::Constant(_) => self.error(format!("cannot {verb} to literal")),
            Expr::Call { .. } => self.error(format!("cannot {verb} to function call")),
            _ => self.error(format!("cannot {verb} to expression")),
        }
    }

    fn parse_def(&mut self) -> ParseResult<StmtKind> {
        let line = self.line();
        self.expect_kw("def")?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let params = self.parse_params(")", true)?;
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.parse_test()?;
        }
        let body = self.parse_block("def", line)?;
        Ok(StmtKind::FunctionDef(Rc::new(FunctionDef { name, params, body })))
    }

    /// Parameter list up to (not including) `closer`. Annotations are only
    /// legal in `def` headers.
    fn parse_params(&mut self, closer: &str, annotations: bool) -> ParseResult<Params> {
        let mut params = Params::default();
        let mut seen_star = false;
        let mut seen_default = false;

        while !self.check_op(closer) {
            if self.eat_op("**") {
                let name = self.expect_name()?;
                if annotations && self.eat_op(":") {
                    self.parse_test()?;
                }
                params.varkw = Some(name);
                self.eat_op(",");
                if !self.check_op(closer) {
                    return self.error("arguments cannot follow var-keyword argument");
                }
                break;
            }

            if self.eat_op("*") {
                if seen_star {
                    return self.error("* argument may appear only once");
                }
                seen_star = true;
                if let TokenKind::Name(_) = self.peek().kind {
                    let name = self.expect_name()?;
                    if annotations && self.eat_op(":") {
                        self.parse_test()?;
                    }
                    params.varargs = Some(name);
                }
            } else if self.eat_op("/") {
                // Positional-only marker; binding treats these positionally anyway.
            } else {
                let name = self.expect_name()?;
                if annotations && self.eat_op(":") {
                    self.parse_test()?;
                }
                let default = if self.eat_op("=") {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                if params.names().any(|existing| existing == name) {
                    return self.error(format!(
                        "duplicate argument '{name}' in function definition"
                    ));
                }
                let param = Param { name, default };
                if seen_star {
                    params.kwonly.push(param);
                } else {
                    if param.default.is_some() {
                        seen_default = true;
                    } else if seen_default {
                        return self.error("non-default argument follows default argument");
                    }
                    params.positional.push(param);
                }
            }

            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        let line = self.line();
        self.expect_kw("if")?;
        let test = self.parse_test()?;
        let body = self.parse_block("if", line)?;
        let orelse = self.parse_else_chain()?;
        Ok(StmtKind::If { test, body, orelse })
    }

    fn parse_else_chain(&mut self) -> ParseResult<Vec<Stmt>> {
        let line = self.line();
        if self.eat_kw("elif") {
            let test = self.parse_test()?;
            let body = self.parse_block("elif", line)?;
            let orelse = self.parse_else_chain()?;
            return Ok(vec![Stmt {
                kind: StmtKind::If { test, body, orelse },
                line,
            }]);
        }
        if self.eat_kw("else") {
            return self.parse_block("else", line);
        }
        Ok(Vec::new())
    }

    fn parse_optional_else(&mut self) -> ParseResult<Vec<Stmt>> {
        let line = self.line();
        if self.eat_kw("else") {
            self.parse_block("else", line)
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_while(&mut self) -> ParseResult<StmtKind> {
        let line = self.line();
        self.expect_kw("while")?;
        let test = self.parse_test()?;
        let body = self.parse_block("while", line)?;
        let orelse = self.parse_optional_else()?;
        Ok(StmtKind::While { test, body, orelse })
    }

    fn parse_for(&mut self) -> ParseResult<StmtKind> {
        let line = self.line();
        self.expect_kw("for")?;
        let target = self.parse_exprlist()?;
        self.validate_target(&target, "assign")?;
        self.expect_kw("in")?;
        let iter = self.parse_testlist()?;
        let body = self.parse_block("for", line)?;
        let orelse = self.parse_optional_else()?;
        Ok(StmtKind::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn parse_try(&mut self) -> ParseResult<StmtKind> {
        let line = self.line();
        self.expect_kw("try")?;
        let body = self.parse_block("try", line)?;

        let mut handlers = Vec::new();
        while self.check_kw("except") {
            let handler_line = self.line();
            self.pos += 1;
            let (kind, name) = if self.check_op(":") {
                (None, None)
            } else {
                let kind = self.parse_test()?;
                let name = if self.eat_kw("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let body = self.parse_block("except", handler_line)?;
            handlers.push(ExceptHandler { kind, name, body });
        }

        let orelse = if handlers.is_empty() {
            Vec::new()
        } else {
            self.parse_optional_else()?
        };

        let finally_line = self.line();
        let finalbody = if self.eat_kw("finally") {
            self.parse_block("finally", finally_line)?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return self.error("expected 'except' or 'finally' block");
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Comma-separated tests; more than one item (or a trailing comma) makes a tuple.
    fn parse_testlist(&mut self) -> ParseResult<Expr> {
        self.parse_sequence(Self::parse_test, false)
    }

    /// Like [`parse_testlist`] but items may be `*starred`.
    fn parse_testlist_star(&mut self) -> ParseResult<Expr> {
        self.parse_sequence(Self::parse_test, true)
    }

    /// Assignment target lists in `for` and `del`, parsed below comparisons
    /// so `in` is left for the caller.
    fn parse_exprlist(&mut self) -> ParseResult<Expr> {
        self.parse_sequence(Self::parse_bitor, true)
    }

    fn parse_sequence(
        &mut self,
        item: fn(&mut Self) -> ParseResult<Expr>,
        allow_star: bool,
    ) -> ParseResult<Expr> {
        let parse_item = |parser: &mut Self| -> ParseResult<Expr> {
            if allow_star && parser.eat_op("*") {
                Ok(Expr::Starred(Box::new(parser.parse_bitor()?)))
            } else {
                item(parser)
            }
        };

        let first = parse_item(self)?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_sequence_end() {
                break;
            }
            items.push(parse_item(self)?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_sequence_end(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Newline | TokenKind::EndOfFile => true,
            TokenKind::Op(op) => matches!(*op, "=" | ")" | "]" | "}" | ";" | ":") || augmented_op(op).is_some(),
            TokenKind::Keyword(kw) => *kw == "in",
            _ => false,
        }
    }

    fn parse_test(&mut self) -> ParseResult<Expr> {
        if self.check_kw("lambda") {
            return self.parse_lambda();
        }
        let body = self.parse_or()?;
        if self.check_op(":=") {
            return self.error("assignment expressions are not supported");
        }
        if self.eat_kw("if") {
            let test = self.parse_or()?;
            self.expect_kw("else")?;
            let orelse = self.parse_test()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        self.expect_kw("lambda")?;
        let params = self.parse_params(":", false)?;
        self.expect_op(":")?;
        let body = self.parse_test()?;
        Ok(Expr::Lambda(Rc::new(FunctionDef {
            name: "<lambda>".to_string(),
            params,
            body: vec![Stmt {
                kind: StmtKind::Return(Some(body)),
                line,
            }],
        })))
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let first = self.parse_and()?;
        if !self.check_kw("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw("or") {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let first = self.parse_not()?;
        if !self.check_kw("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw("and") {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.eat_kw("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.parse_cmp_op() {
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
                comparators,
            })
        }
    }

    fn parse_cmp_op(&mut self) -> Option<CmpOp> {
        let op = match &self.peek().kind {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Keyword("in") => CmpOp::In,
            TokenKind::Keyword("not") => {
                let next_is_in = matches!(
                    self.peek_nth(1).map(|t| &t.kind),
                    Some(TokenKind::Keyword("in"))
                );
                if !next_is_in {
                    return None;
                }
                self.pos += 1;
                CmpOp::NotIn
            }
            TokenKind::Keyword("is") => {
                let next_is_not = matches!(
                    self.peek_nth(1).map(|t| &t.kind),
                    Some(TokenKind::Keyword("not"))
                );
                if next_is_not {
                    self.pos += 1;
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> ParseResult<Expr>,
        ops: &[(&str, BinOp)],
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (symbol, op) in ops {
                if self.eat_op(symbol) {
                    let right = next(self)?;
                    left = Expr::BinOp {
                        left: Box::new(left),
                        op: *op,
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_bitor(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_bitxor, &[("|", BinOp::BitOr)])
    }

    fn parse_bitxor(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_bitand, &[("^", BinOp::BitXor)])
    }

    fn parse_bitand(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_shift, &[("&", BinOp::BitAnd)])
    }

    fn parse_shift(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(
            Self::parse_arith,
            &[("<<", BinOp::LShift), (">>", BinOp::RShift)],
        )
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        self.parse_binary_level(Self::parse_term, &[("+", BinOp::Add), ("-", BinOp::Sub)])
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        if self.check_op("@") {
            return self.error("matrix multiplication is not supported");
        }
        self.parse_binary_level(
            Self::parse_factor,
            &[
                ("*", BinOp::Mul),
                ("//", BinOp::FloorDiv),
                ("/", BinOp::Div),
                ("%", BinOp::Mod),
            ],
        )
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let op = if self.eat_op("-") {
            Some(UnaryOp::Neg)
        } else if self.eat_op("+") {
            Some(UnaryOp::Pos)
        } else if self.eat_op("~") {
            Some(UnaryOp::Invert)
        } else {
            None
        };
        match op {
            Some(op) => {
                let operand = self.parse_factor()?;
                Ok(Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        if self.check_kw("await") {
            return self.error("await is not supported");
        }
        let base = self.parse_primary()?;
        if self.eat_op("**") {
            let exponent = self.parse_factor()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat_op("(") {
                let (args, keywords) = self.parse_call_args()?;
                self.expect_op(")")?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    keywords,
                };
            } else if self.eat_op("[") {
                let index = self.parse_subscript()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_call_args(&mut self) -> ParseResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();

        while !self.check_op(")") {
            if self.eat_op("**") {
                keywords.push(Keyword {
                    name: None,
                    value: self.parse_test()?,
                });
            } else if self.eat_op("*") {
                args.push(Expr::Starred(Box::new(self.parse_test()?)));
            } else if let (TokenKind::Name(name), Some(TokenKind::Op("="))) = (
                &self.peek().kind,
                self.peek_nth(1).map(|t| &t.kind),
            ) {
                let name = name.clone();
                self.pos += 2;
                if keywords.iter().any(|k| k.name.as_deref() == Some(name.as_str())) {
                    return self.error(format!("keyword argument repeated: {name}"));
                }
                keywords.push(Keyword {
                    name: Some(name),
                    value: self.parse_test()?,
                });
            } else {
                let value = self.parse_test()?;
                if self.check_kw("for") {
                    let generators = self.parse_generators()?;
                    args.push(Expr::Comprehension {
                        kind: ComprehensionKind::Generator,
                        element: Box::new(value),
                        value: None,
                        generators,
                    });
                } else {
                    if !keywords.is_empty() {
                        return self.error("positional argument follows keyword argument");
                    }
                    args.push(value);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_subscript(&mut self) -> ParseResult<Expr> {
        let first = self.parse_slice_item()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_slice_item(&mut self) -> ParseResult<Expr> {
        let lower = if self.check_op(":") {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.check_op(":") {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(":")?;
        let upper = if self.check_op(":") || self.check_op("]") || self.check_op(",") {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat_op(":") {
            if self.check_op("]") || self.check_op(",") {
                None
            } else {
                Some(Box::new(self.parse_test()?))
            }
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn parse_generators(&mut self) -> ParseResult<Vec<Generator>> {
        let mut generators = Vec::new();
        while self.eat_kw("for") {
            let target = self.parse_exprlist()?;
            self.validate_target(&target, "assign")?;
            self.expect_kw("in")?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.eat_kw("if") {
                conditions.push(self.parse_or_no_cond()?);
            }
            generators.push(Generator {
                target,
                iter,
                conditions,
            });
        }
        Ok(generators)
    }

    /// Comprehension conditions: no bare conditional expression, lambda allowed.
    fn parse_or_no_cond(&mut self) -> ParseResult<Expr> {
        if self.check_kw("lambda") {
            return self.parse_lambda();
        }
        self.parse_or()
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Name(name) => Ok(Expr::Name(name)),
            TokenKind::Int(value) => Ok(Expr::Constant(Constant::Int(value))),
            TokenKind::Float(value) => Ok(Expr::Constant(Constant::Float(value))),
            TokenKind::Str(value) => Ok(Expr::Constant(Constant::Str(value))),
            TokenKind::Keyword("True") => Ok(Expr::Constant(Constant::Bool(true))),
            TokenKind::Keyword("False") => Ok(Expr::Constant(Constant::Bool(false))),
            TokenKind::Keyword("None") => Ok(Expr::Constant(Constant::None)),
            TokenKind::Op("(") => self.parse_paren_atom(),
            TokenKind::Op("[") => self.parse_list_atom(),
            TokenKind::Op("{") => self.parse_brace_atom(),
            TokenKind::Op("...") => Err(ParseError::new("Ellipsis is not supported", token.line)),
            TokenKind::Keyword("yield") => {
                Err(ParseError::new("generators are not supported", token.line))
            }
            _ => Err(ParseError::new(
                format!("invalid syntax: unexpected {}", token.describe()),
                token.line,
            )),
        }
    }

    fn parse_star_or_test(&mut self) -> ParseResult<Expr> {
        if self.eat_op("*") {
            Ok(Expr::Starred(Box::new(self.parse_bitor()?)))
        } else {
            self.parse_test()
        }
    }

    fn parse_paren_atom(&mut self) -> ParseResult<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.parse_star_or_test()?;
        if self.check_kw("for") {
            let generators = self.parse_generators()?;
            self.expect_op(")")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Generator,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        if self.eat_op(")") {
            if let Expr::Starred(_) = first {
                return self.error("can't use starred expression here");
            }
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op(")") {
                break;
            }
            items.push(self.parse_star_or_test()?);
        }
        self.expect_op(")")?;
        Ok(Expr::Tuple(items))
    }

    fn parse_list_atom(&mut self) -> ParseResult<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.parse_star_or_test()?;
        if self.check_kw("for") {
            let generators = self.parse_generators()?;
            self.expect_op("]")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::List,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            items.push(self.parse_star_or_test()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn parse_brace_atom(&mut self) -> ParseResult<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        if self.check_op("**") {
            return self.error("dict unpacking in displays is not supported");
        }
        let first = self.parse_star_or_test()?;

        if self.eat_op(":") {
            let first_value = self.parse_test()?;
            if self.check_kw("for") {
                let generators = self.parse_generators()?;
                self.expect_op("}")?;
                return Ok(Expr::Comprehension {
                    kind: ComprehensionKind::Dict,
                    element: Box::new(first),
                    value: Some(Box::new(first_value)),
                    generators,
                });
            }
            let mut pairs = vec![(first, first_value)];
            while self.eat_op(",") {
                if self.check_op("}") {
                    break;
                }
                let key = self.parse_test()?;
                self.expect_op(":")?;
                let value = self.parse_test()?;
                pairs.push((key, value));
            }
            self.expect_op("}")?;
            return Ok(Expr::Dict(pairs));
        }

        if self.check_kw("for") {
            let generators = self.parse_generators()?;
            self.expect_op("}")?;
            return Ok(Expr::Comprehension {
                kind: ComprehensionKind::Set,
                element: Box::new(first),
                value: None,
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            items.push(self.parse_star_or_test()?);
        }
        self.expect_op("}")?;
        Ok(Expr::Set(items))
    }
}

fn augmented_op(op: &str) -> Option<BinOp> {
    let bin_op = match op {
        "+=" => BinOp::Add,
        "-=" => BinOp::Sub,
        "*=" => BinOp::Mul,
        "/=" => BinOp::Div,
        "//=" => BinOp::FloorDiv,
        "%=" => BinOp::Mod,
        "**=" => BinOp::Pow,
        "<<=" => BinOp::LShift,
        ">>=" => BinOp::RShift,
        "&=" => BinOp::BitAnd,
        "|=" => BinOp::BitOr,
        "^=" => BinOp::BitXor,
        _ => return None,
    };
    Some(bin_op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        parse_module(source).expect("parse")
    }

    #[test]
    fn parses_function_with_defaults_and_varargs() {
        let module = parse("def f(a, b=2, *rest, key=None, **extra):\n    return a\n");
        let StmtKind::FunctionDef(def) = &module.body[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name, "f");
        assert_eq!(def.params.positional.len(), 2);
        assert_eq!(def.params.varargs.as_deref(), Some("rest"));
        assert_eq!(def.params.kwonly.len(), 1);
        assert_eq!(def.params.varkw.as_deref(), Some("extra"));
    }

    #[test]
    fn parses_tuple_assignment_without_parens() {
        let module = parse("a, b = b, a + b\n");
        let StmtKind::Assign { targets, value } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(targets[0], Expr::Tuple(ref items) if items.len() == 2));
        assert!(matches!(value, Expr::Tuple(ref items) if items.len() == 2));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let module = parse("x = -2 ** 2\n");
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value, Expr::UnaryOp { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn parses_chained_comparison_and_not_in() {
        let module = parse("ok = 0 <= i < n and x not in seen\n");
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("expected assignment");
        };
        let Expr::BoolOp { values, .. } = value else {
            panic!("expected bool op");
        };
        assert!(matches!(&values[0], Expr::Compare { ops, .. } if ops.len() == 2));
        assert!(matches!(&values[1], Expr::Compare { ops, .. } if ops == &vec![CmpOp::NotIn]));
    }

    #[test]
    fn parses_generator_argument_and_slices() {
        let module = parse("t = ''.join(c.lower() for c in s if c.isalnum())\nr = t[::-1]\n");
        assert_eq!(module.body.len(), 2);
        let StmtKind::Assign { value, .. } = &module.body[1].kind else {
            panic!("expected assignment");
        };
        let Expr::Subscript { index, .. } = value else {
            panic!("expected subscript");
        };
        assert!(matches!(**index, Expr::Slice { lower: None, upper: None, step: Some(_) }));
    }

    #[test]
    fn parses_if_elif_else_chain() {
        let module = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        let StmtKind::If { orelse, .. } = &module.body[0].kind else {
            panic!("expected if");
        };
        assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn parses_try_except_finally() {
        let module = parse(
            "try:\n    x = 1\nexcept ValueError as e:\n    x = 2\nexcept:\n    pass\nfinally:\n    y = 3\n",
        );
        let StmtKind::Try { handlers, finalbody, .. } = &module.body[0].kind else {
            panic!("expected try");
        };
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].name.as_deref(), Some("e"));
        assert_eq!(finalbody.len(), 1);
    }

    #[test]
    fn parses_imports_as_statements() {
        let module = parse("import os.path as p\nfrom sys import (argv, path)\n");
        assert!(matches!(&module.body[0].kind, StmtKind::Import(m) if m == &vec!["os.path".to_string()]));
        assert!(matches!(&module.body[1].kind, StmtKind::ImportFrom { module, names } if module == "sys" && names.len() == 2));
    }

    #[test]
    fn parses_dict_set_and_comprehensions() {
        let module = parse("d = {k: v for k, v in pairs}\ns = {1, 2}\ne = {}\nl = [x * x for x in range(3) if x]\n");
        assert!(matches!(
            &module.body[0].kind,
            StmtKind::Assign { value: Expr::Comprehension { kind: ComprehensionKind::Dict, .. }, .. }
        ));
        assert!(matches!(&module.body[1].kind, StmtKind::Assign { value: Expr::Set(_), .. }));
        assert!(matches!(&module.body[2].kind, StmtKind::Assign { value: Expr::Dict(_), .. }));
    }

    #[test]
    fn accepts_annotations() {
        let module = parse("def f(x: int, y: list = None) -> int:\n    total: int = x\n    return total\n");
        assert_eq!(module.body.len(), 1);
    }

    #[test]
    fn reports_missing_colon_with_line() {
        let err = parse_module("x = 1\nif x\n    y = 2\n").unwrap_err();
        assert_eq!(err.message, "expected ':'");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn reports_missing_indented_block() {
        let err = parse_module("def f():\nreturn 1\n").unwrap_err();
        assert!(err.message.starts_with("expected an indented block after 'def'"));
    }

    #[test]
    fn rejects_assignment_to_literal_and_unsupported_constructs() {
        assert_eq!(parse_module("1 = x\n").unwrap_err().message, "cannot assign to literal");
        assert!(parse_module("class A:\n    pass\n").unwrap_err().message.contains("class"));
        assert!(parse_module("with f() as g:\n    pass\n").is_err());
    }

    #[test]
    fn single_line_suites_and_semicolons() {
        let module = parse("if x: y = 1; z = 2\n");
        let StmtKind::If { body, .. } = &module.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(body.len(), 2);
    }
}
