use super::{Result, ScriptError};

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Numeric literal
    Number(f64),
    /// String literal with escapes resolved
    Str(String),
    /// Template literal; each interpolation is lexed separately and ends
    /// with an [`Tok::Eof`] token
    Template {
        /// Literal chunks, one more than `exprs`
        quasis: Vec<String>,
        /// Tokens of each `${}` interpolation
        exprs: Vec<Vec<Token>>,
    },
    /// Identifier or keyword
    Ident(String),
    /// Operator or punctuation
    Punct(&'static str),
    /// End of input
    Eof,
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Kind and payload
    pub tok: Tok,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Whether a line break separates this token from the previous one
    pub newline_before: bool,
}

const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=",
    "/=", "%=", "{", "}", "(", ")", "[", "]", ";", ",", ".", ":", "?", "+", "-", "*", "/", "%",
    "<", ">", "=", "!",
];

/// Split `source` into tokens, ending with [`Tok::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.tok == Tok::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
    line: usize,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current() {
            self.index += 1;
            if ch == b'\n' {
                self.line += 1;
                self.line_start = self.index;
            }
        }
    }

    fn column(&self) -> usize {
        self.index - self.line_start + 1
    }

    /// Skip whitespace and comments; returns whether a line break was crossed.
    fn skip_trivia(&mut self) -> Result<bool> {
        let mut newline = false;
        loop {
            match (self.current(), self.peek(1)) {
                (Some(b'\n'), _) => {
                    newline = true;
                    self.advance();
                }
                (Some(ch), _) if ch.is_ascii_whitespace() => self.advance(),
                (Some(b'/'), Some(b'/')) => {
                    while let Some(ch) = self.current() {
                        if ch == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let (line, column) = (self.line, self.column());
                    self.advance();
                    self.advance();
                    loop {
                        match (self.current(), self.peek(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(ch), _) => {
                                newline |= ch == b'\n';
                                self.advance();
                            }
                            (None, _) => {
                                return Err(error_at(line, column, "unterminated comment"));
                            }
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        let newline_before = self.skip_trivia()?;
        let (line, column) = (self.line, self.column());
        let tok = match self.current() {
            None => Tok::Eof,
            Some(b'"') | Some(b'\'') => self.lex_string()?,
            Some(b'`') => self.lex_template()?,
            Some(ch) if ch.is_ascii_digit() => self.lex_number()?,
            Some(b'.') if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number()?,
            Some(ch) if is_ident_start(ch) => self.lex_ident(),
            Some(_) => self.lex_punct()?,
        };
        Ok(Token {
            tok,
            line,
            column,
            newline_before,
        })
    }

    fn lex_ident(&mut self) -> Tok {
        let start = self.index;
        while self.current().is_some_and(is_ident_part) {
            self.advance();
        }
        Tok::Ident(self.src[start..self.index].to_string())
    }

    fn lex_number(&mut self) -> Result<Tok> {
        let start = self.index;
        if self.current() == Some(b'0') && matches!(self.peek(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            let digits_start = self.index;
            while self.current().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let digits = &self.src[digits_start..self.index];
            let value = u64::from_str_radix(digits, 16)
                .map_err(|_| self.error("invalid hexadecimal literal"))?;
            return self.finish_number(value as f64);
        }

        while self.current().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.current() == Some(b'.') {
            self.advance();
            while self.current().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.current(), Some(b'e') | Some(b'E')) {
            let exponent_digit = match self.peek(1) {
                Some(b'+') | Some(b'-') => self.peek(2),
                other => other,
            };
            if exponent_digit.is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
                if matches!(self.current(), Some(b'+') | Some(b'-')) {
                    self.advance();
                }
                while self.current().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = &self.src[start..self.index];
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error("invalid number literal"))?;
        self.finish_number(value)
    }

    fn finish_number(&self, value: f64) -> Result<Tok> {
        if self.current().is_some_and(is_ident_start) {
            return Err(self.error("identifier starts immediately after numeric literal"));
        }
        Ok(Tok::Number(value))
    }

    fn lex_string(&mut self) -> Result<Tok> {
        let (line, column) = (self.line, self.column());
        let quote = self.current();
        self.advance();
        let mut buf = String::new();
        loop {
            match self.current() {
                None | Some(b'\n') => {
                    return Err(error_at(line, column, "unterminated string literal"));
                }
                Some(ch) if Some(ch) == quote => {
                    self.advance();
                    return Ok(Tok::Str(buf));
                }
                Some(b'\\') => {
                    self.advance();
                    self.lex_escape(&mut buf)?;
                }
                Some(_) => self.push_char(&mut buf),
            }
        }
    }

    fn lex_template(&mut self) -> Result<Tok> {
        let (line, column) = (self.line, self.column());
        self.advance(); // consume '`'
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut buf = String::new();
        loop {
            match (self.current(), self.peek(1)) {
                (None, _) => return Err(error_at(line, column, "unterminated template literal")),
                (Some(b'`'), _) => {
                    self.advance();
                    quasis.push(buf);
                    return Ok(Tok::Template { quasis, exprs });
                }
                (Some(b'\\'), _) => {
                    self.advance();
                    self.lex_escape(&mut buf)?;
                }
                (Some(b'$'), Some(b'{')) => {
                    self.advance();
                    self.advance();
                    quasis.push(std::mem::take(&mut buf));
                    exprs.push(self.lex_interpolation(line, column)?);
                }
                (Some(_), _) => self.push_char(&mut buf),
            }
        }
    }

    fn lex_interpolation(&mut self, line: usize, column: usize) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let newline_before = self.skip_trivia()?;
            if self.current() == Some(b'}') && depth == 0 {
                let (end_line, end_column) = (self.line, self.column());
                self.advance();
                tokens.push(Token {
                    tok: Tok::Eof,
                    line: end_line,
                    column: end_column,
                    newline_before,
                });
                return Ok(tokens);
            }
            let token = self.next_token()?;
            match token.tok {
                Tok::Punct("{") => depth += 1,
                Tok::Punct("}") => depth = depth.saturating_sub(1),
                Tok::Eof => {
                    return Err(error_at(line, column, "unterminated template literal"));
                }
                _ => {}
            }
            tokens.push(token);
        }
    }

    fn lex_escape(&mut self, buf: &mut String) -> Result<()> {
        let escaped = self
            .current()
            .ok_or_else(|| self.error("incomplete escape"))?;
        self.advance();
        let value = match escaped {
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'v' => '\u{b}',
            b'0' => '\0',
            b'\n' => return Ok(()),
            b'x' => self.lex_hex_escape(2)?,
            b'u' => self.lex_hex_escape(4)?,
            b'\\' | b'\'' | b'"' | b'`' | b'$' => escaped as char,
            _ => {
                // Unknown escapes stand for the character itself.
                self.index -= 1;
                self.push_char(buf);
                return Ok(());
            }
        };
        buf.push(value);
        Ok(())
    }

    fn lex_hex_escape(&mut self, digits: usize) -> Result<char> {
        let start = self.index;
        for _ in 0..digits {
            if !self.current().is_some_and(|c| c.is_ascii_hexdigit()) {
                return Err(self.error("invalid escape sequence"));
            }
            self.advance();
        }
        u32::from_str_radix(&self.src[start..self.index], 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid escape sequence"))
    }

    fn push_char(&mut self, buf: &mut String) {
        if let Some(ch) = self.src[self.index..].chars().next() {
            buf.push(ch);
            for _ in 0..ch.len_utf8() {
                self.advance();
            }
        }
    }

    fn lex_punct(&mut self) -> Result<Tok> {
        let rest = &self.bytes[self.index..];
        for punct in PUNCTUATORS {
            if rest.starts_with(punct.as_bytes()) {
                // `a?.5:1` is a conditional, not optional chaining
                if *punct == "?." && rest.get(2).is_some_and(|c| c.is_ascii_digit()) {
                    continue;
                }
                for _ in 0..punct.len() {
                    self.advance();
                }
                return Ok(Tok::Punct(punct));
            }
        }
        let ch = self.src[self.index..].chars().next().unwrap_or('?');
        Err(self.error(&format!("unexpected character '{ch}'")))
    }

    fn error(&self, message: &str) -> ScriptError {
        error_at(self.line, self.column(), message)
    }
}

fn error_at(line: usize, column: usize, message: &str) -> ScriptError {
    ScriptError::Syntax {
        line,
        column,
        message: message.to_string(),
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$'
}

fn is_ident_part(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
