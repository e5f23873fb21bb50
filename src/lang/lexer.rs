//! Indentation-aware tokenizer.

use super::{ParseError, ParseResult};

pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Longest operators first so greedy matching picks `**=` over `**` over `*`.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "**", "//", ">>", "<<", "<=", ">=", "==", "!=", "->",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", ":=", "+", "-", "*", "/", "%", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=", "@",
];

const TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Keyword(&'static str),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    EndOfFile,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

impl Token {
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Name(name) => format!("name '{name}'"),
            TokenKind::Keyword(kw) => format!("keyword '{kw}'"),
            TokenKind::Int(_) | TokenKind::Float(_) => "number".to_string(),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Op(op) => format!("'{op}'"),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::EndOfFile => "end of input".to_string(),
        }
    }
}

pub fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    indents: Vec<usize>,
    /// Open brackets with the line they were opened on.
    brackets: Vec<(char, usize)>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            indents: vec![0],
            brackets: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, line: usize) {
        self.tokens.push(Token { kind, line });
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError::new(message, self.line))
    }

    fn run(mut self) -> ParseResult<Vec<Token>> {
        let mut at_line_start = true;

        while self.pos < self.chars.len() {
            if at_line_start && self.brackets.is_empty() {
                if self.handle_indentation()? {
                    continue;
                }
                at_line_start = false;
            }

            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\x0c' => self.pos += 1,
                '\r' => self.pos += 1,
                '#' => self.skip_comment(),
                '\n' => {
                    self.pos += 1;
                    if self.brackets.is_empty() {
                        self.push(TokenKind::Newline, self.line);
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                '\\' => {
                    if self.peek_at(1) == Some('\n') {
                        self.pos += 2;
                        self.line += 1;
                    } else if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') {
                        self.pos += 3;
                        self.line += 1;
                    } else {
                        return self.error("unexpected character after line continuation character");
                    }
                }
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek_at(1).map_or(false, |d| d.is_ascii_digit()) => {
                    self.lex_number()?
                }
                '"' | '\'' => self.lex_string(false)?,
                c if is_ident_start(c) => self.lex_name_or_prefixed_string()?,
                _ => self.lex_operator()?,
            }
        }

        if let Some((open, line)) = self.brackets.last() {
            return Err(ParseError::new(format!("'{open}' was never closed"), *line));
        }

        let last_line = self.line;
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Dedent)
        ) {
            self.push(TokenKind::Newline, last_line);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, last_line);
        }
        self.push(TokenKind::EndOfFile, last_line);
        Ok(self.tokens)
    }

    /// Measures leading whitespace of a logical line. Returns true when the
    /// line is blank or comment-only and was consumed entirely.
    fn handle_indentation(&mut self) -> ParseResult<bool> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(true),
            Some('#') => {
                self.skip_comment();
                self.consume_line_end();
                return Ok(true);
            }
            Some('\n') | Some('\r') => {
                self.consume_line_end();
                return Ok(true);
            }
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, self.line);
        } else if width < current {
            while self.indents.last().map_or(false, |&top| top > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent, self.line);
            }
            if self.indents.last().copied() != Some(width) {
                return self.error(
                    "unindent does not match any outer indentation level",
                );
            }
        }
        Ok(false)
    }

    fn consume_line_end(&mut self) {
        if self.peek() == Some('\r') {
            self.pos += 1;
        }
        if self.peek() == Some('\n') {
            self.pos += 1;
            self.line += 1;
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn lex_name_or_prefixed_string(&mut self) -> ParseResult<()> {
        let start = self.pos;
        while self.peek().map_or(false, is_ident_continue) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(), Some('"') | Some('\'')) && word.len() <= 2 {
            let lower = word.to_ascii_lowercase();
            match lower.as_str() {
                "r" => return self.lex_string(true),
                "u" => return self.lex_string(false),
                "f" | "rf" | "fr" => return self.error("f-strings are not supported"),
                "b" | "rb" | "br" => return self.error("bytes literals are not supported"),
                _ => {}
            }
        }

        let line = self.line;
        match KEYWORDS.iter().find(|kw| **kw == word) {
            Some(kw) => self.push(TokenKind::Keyword(*kw), line),
            None => self.push(TokenKind::Name(word), line),
        }
        Ok(())
    }

    fn lex_number(&mut self) -> ParseResult<()> {
        let line = self.line;
        let start = self.pos;

        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let digits_start = self.pos;
                while self.peek().map_or(false, |c| c.is_digit(radix) || c == '_') {
                    self.pos += 1;
                }
                let digits: String = self.chars[digits_start..self.pos]
                    .iter()
                    .filter(|c| **c != '_')
                    .collect();
                if digits.is_empty() {
                    return self.error("invalid number literal");
                }
                let value = i64::from_str_radix(&digits, radix)
                    .map_err(|_| ParseError::new("integer literal is too large", line))?;
                self.push(TokenKind::Int(value), line);
                return Ok(());
            }
        }

        let mut is_float = false;
        while self.peek().map_or(false, |c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
        if self.peek() == Some('.') && !matches!(self.peek_at(1), Some('.')) {
            is_float = true;
            self.pos += 1;
            while self.peek().map_or(false, |c| c.is_ascii_digit() || c == '_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign_offset = if matches!(self.peek_at(1), Some('+') | Some('-')) { 2 } else { 1 };
            if self.peek_at(sign_offset).map_or(false, |c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += sign_offset;
                while self.peek().map_or(false, |c| c.is_ascii_digit() || c == '_') {
                    self.pos += 1;
                }
            }
        }
        if matches!(self.peek(), Some('j') | Some('J')) {
            return self.error("complex literals are not supported");
        }
        if self.peek().map_or(false, is_ident_start) {
            return self.error("invalid decimal literal");
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::new("invalid float literal", line))?;
            self.push(TokenKind::Float(value), line);
        } else {
            if text.len() > 1 && text.starts_with('0') && text.chars().any(|c| c != '0') {
                return self.error(
                    "leading zeros in decimal integer literals are not permitted",
                );
            }
            let value: i64 = text
                .parse()
                .map_err(|_| ParseError::new("integer literal is too large", line))?;
            self.push(TokenKind::Int(value), line);
        }
        Ok(())
    }

    fn lex_string(&mut self, raw: bool) -> ParseResult<()> {
        let line = self.line;
        let Some(quote) = self.peek() else {
            return self.error("unterminated string literal");
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                let message = if triple {
                    "unterminated triple-quoted string literal"
                } else {
                    "unterminated string literal"
                };
                return Err(ParseError::new(message, line));
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
                value.push(c);
                self.pos += 1;
                continue;
            }

            if c == '\n' {
                if !triple {
                    return Err(ParseError::new("unterminated string literal", line));
                }
                self.line += 1;
                value.push(c);
                self.pos += 1;
                continue;
            }

            if c == '\\' {
                let Some(next) = self.peek_at(1) else {
                    self.pos += 1;
                    continue;
                };
                if raw {
                    value.push('\\');
                    value.push(next);
                    if next == '\n' {
                        self.line += 1;
                    }
                    self.pos += 2;
                    continue;
                }
                self.pos += 2;
                match next {
                    '\n' => self.line += 1,
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    'a' => value.push('\x07'),
                    'b' => value.push('\x08'),
                    'f' => value.push('\x0c'),
                    'v' => value.push('\x0b'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    'x' => value.push(self.lex_hex_escape(2, line)?),
                    'u' => value.push(self.lex_hex_escape(4, line)?),
                    'U' => value.push(self.lex_hex_escape(8, line)?),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
                continue;
            }

            value.push(c);
            self.pos += 1;
        }

        // Adjacent literals concatenate at the token level.
        if let Some(Token {
            kind: TokenKind::Str(previous),
            ..
        }) = self.tokens.last_mut()
        {
            previous.push_str(&value);
        } else {
            self.push(TokenKind::Str(value), line);
        }
        Ok(())
    }

    fn lex_hex_escape(&mut self, digits: usize, line: usize) -> ParseResult<char> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(ParseError::new("truncated escape sequence", line));
        }
        let text: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&text, 16)
            .map_err(|_| ParseError::new("truncated escape sequence", line))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| ParseError::new("invalid escape sequence", line))
    }

    fn lex_operator(&mut self) -> ParseResult<()> {
        let line = self.line;
        for op in OPERATORS {
            let len = op.chars().count();
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, expected)| self.peek_at(i) == Some(expected));
            if !matches {
                continue;
            }
            self.pos += len;
            match *op {
                "(" | "[" | "{" => {
                    let open = op.chars().next().unwrap_or('(');
                    self.brackets.push((open, line));
                }
                ")" | "]" | "}" => {
                    let close = op.chars().next().unwrap_or(')');
                    let expected_open = match close {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match self.brackets.pop() {
                        Some((open, _)) if open == expected_open => {}
                        Some((open, _)) => {
                            return self.error(format!(
                                "closing parenthesis '{close}' does not match opening parenthesis '{open}'"
                            ))
                        }
                        None => return self.error(format!("unmatched '{close}'")),
                    }
                }
                _ => {}
            }
            self.push(TokenKind::Op(op), line);
            return Ok(());
        }

        let c = self.peek().unwrap_or('?');
        self.error(format!("invalid character '{c}' (U+{:04X})", c as u32))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn emits_indent_and_dedent_around_blocks() {
        let tokens = kinds("def f():\n    return 1\nx = 2\n");
        assert!(tokens.contains(&TokenKind::Indent));
        assert!(tokens.contains(&TokenKind::Dedent));
        assert_eq!(tokens.last(), Some(&TokenKind::EndOfFile));
    }

    #[test]
    fn joins_lines_inside_brackets() {
        let tokens = kinds("x = [1,\n     2]\n");
        let newlines = tokens.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let tokens = kinds("x = 1\n\n    # comment\ny = 2\n");
        assert!(!tokens.contains(&TokenKind::Indent));
    }

    #[test]
    fn lexes_numbers() {
        let tokens = kinds("a = 0x1f + 1_000 + 2.5e3 + .5\n");
        assert!(tokens.contains(&TokenKind::Int(31)));
        assert!(tokens.contains(&TokenKind::Int(1000)));
        assert!(tokens.contains(&TokenKind::Float(2500.0)));
        assert!(tokens.contains(&TokenKind::Float(0.5)));
    }

    #[test]
    fn lexes_strings_with_escapes_and_concatenation() {
        let tokens = kinds("s = 'a\\n' \"b\"\n");
        assert!(tokens.contains(&TokenKind::Str("a\nb".to_string())));
        let tokens = kinds("s = r'a\\n'\n");
        assert!(tokens.contains(&TokenKind::Str("a\\n".to_string())));
        let tokens = kinds("s = '''x\ny'''\n");
        assert!(tokens.contains(&TokenKind::Str("x\ny".to_string())));
    }

    #[test]
    fn reports_bad_dedent() {
        let err = tokenize("if x:\n        y = 1\n    z = 2\n").unwrap_err();
        assert!(err.message.contains("unindent does not match"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn reports_unclosed_bracket_with_opening_line() {
        let err = tokenize("x = (1,\n2\n").unwrap_err();
        assert_eq!(err.message, "'(' was never closed");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn reports_unterminated_string() {
        let err = tokenize("x = 'abc\n").unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
    }

    #[test]
    fn rejects_f_strings() {
        let err = tokenize("x = f'{y}'\n").unwrap_err();
        assert!(err.message.contains("f-strings"));
    }

    #[test]
    fn keywords_are_not_names() {
        let tokens = kinds("import os\n");
        assert_eq!(tokens[0], TokenKind::Keyword("import"));
        assert_eq!(tokens[1], TokenKind::Name("os".to_string()));
    }
}
