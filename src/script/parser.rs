use super::ast::{
    AssignOp, BinaryOp, DeclKind, Expr, Function, LogicalOp, Program, Stmt, UnaryOp, UpdateOp,
};
use super::lexer::{Tok, Token, tokenize};
use super::{Result, ScriptError};

const MAX_NESTING: usize = 128;

/// Words that cannot name a variable or function.
const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "default", "delete", "do", "else",
    "false", "finally", "for", "function", "if", "in", "instanceof", "let", "new", "null",
    "return", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void",
    "while", "yield",
];

/// Parse script source text into a [`Program`].
pub fn parse_program(source: &str) -> Result<Program> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut body = Vec::new();
    let mut functions = Vec::new();
    while !parser.at_eof() {
        if parser.at_keyword("function") {
            functions.push(parser.parse_function()?);
        } else {
            body.push(parser.parse_statement()?);
        }
    }
    Ok(Program { body, functions })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    function_depth: usize,
    loop_depth: usize,
    nesting: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            function_depth: 0,
            loop_depth: 0,
            nesting: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_tok(&self) -> &Tok {
        self.peek().map(|t| &t.tok).unwrap_or(&Tok::Eof)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_tok(), Tok::Eof)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek_tok().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_punct(&self, punct: &str) -> bool {
        matches!(self.peek_tok(), Tok::Punct(p) if *p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{punct}'")))
        }
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek_tok(), Tok::Ident(w) if w == word)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn newline_before(&self) -> bool {
        self.peek().is_some_and(|t| t.newline_before)
    }

    /// A binding name: any identifier that is not reserved.
    fn expect_binding(&mut self) -> Result<String> {
        match self.peek_tok() {
            Tok::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    /// A property name after `.`: reserved words are allowed.
    fn expect_property(&mut self) -> Result<String> {
        match self.advance() {
            Tok::Ident(name) => Ok(name),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("expected property name"))
            }
        }
    }

    /// Statement terminator: `;`, or implied before `}`, end of input or a line break.
    fn consume_semicolon(&mut self) -> Result<()> {
        if self.eat_punct(";") || self.at_punct("}") || self.at_eof() || self.newline_before() {
            return Ok(());
        }
        Err(self.unexpected("expected ';'"))
    }

    fn enter(&mut self) -> Result<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    // Statements

    fn parse_function(&mut self) -> Result<Function> {
        self.advance(); // consume 'function'
        let name = self.expect_binding()?;
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.eat_punct(")") {
            params.push(self.expect_binding()?);
            if !self.at_punct(")") {
                self.expect_punct(",")?;
            }
        }

        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block_body();
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;

        Ok(Function {
            name,
            params,
            body: body?,
        })
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("expected '}'"));
            }
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        self.enter()?;
        let stmt = self.parse_statement_inner();
        self.leave();
        stmt
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt> {
        if self.at_punct("{") {
            return self.parse_block_body().map(Stmt::Block);
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }

        let keyword = match self.peek_tok() {
            Tok::Ident(word) => word.clone(),
            _ => String::new(),
        };
        match keyword.as_str() {
            "var" | "let" | "const" => {
                let stmt = self.parse_declaration()?;
                self.consume_semicolon()?;
                Ok(stmt)
            }
            "function" => Err(self.error("function declarations are only allowed at the top level")),
            "if" => self.parse_if(),
            "while" => self.parse_while(),
            "for" => self.parse_for(),
            "return" => self.parse_return(),
            "break" | "continue" => {
                if self.loop_depth == 0 {
                    return Err(self.error(&format!("'{keyword}' outside of a loop")));
                }
                self.advance();
                self.consume_semicolon()?;
                Ok(if keyword == "break" {
                    Stmt::Break
                } else {
                    Stmt::Continue
                })
            }
            "throw" => {
                self.advance();
                if self.newline_before() {
                    return Err(self.error("line break after 'throw'"));
                }
                let value = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(value))
            }
            "try" => self.parse_try(),
            "class" | "switch" | "do" | "delete" | "void" | "this" | "yield" => {
                Err(self.error(&format!("'{keyword}' is not supported")))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_declaration(&mut self) -> Result<Stmt> {
        let kind = match self.advance() {
            Tok::Ident(word) if word == "const" => DeclKind::Const,
            Tok::Ident(word) if word == "let" => DeclKind::Let,
            _ => DeclKind::Var,
        };
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_binding()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else if kind == DeclKind::Const {
                return Err(self.unexpected("missing initializer in const declaration"));
            } else {
                None
            };
            declarations.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Declare { kind, declarations })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.advance();
        let test = self.parse_parenthesized()?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.eat_keyword("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then,
            otherwise,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.advance();
        let test = self.parse_parenthesized()?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(Stmt::While { test, body })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.advance();
        self.expect_punct("(")?;

        if let Some(kind) = self.for_of_binding() {
            let name = self.expect_binding()?;
            self.advance(); // consume 'of'
            let iterable = self.parse_expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.parse_loop_body()?);
            return Ok(Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
            });
        }

        let init = if self.at_punct(";") {
            None
        } else if self.at_keyword("var") || self.at_keyword("let") || self.at_keyword("const") {
            Some(Box::new(self.parse_declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.parse_expression()?)))
        };
        self.expect_punct(";")?;
        let test = if self.at_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.at_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_loop_body()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    /// Detect `let x of` at the head of a `for`; consumes only the keyword.
    fn for_of_binding(&mut self) -> Option<DeclKind> {
        let kind = match self.peek_tok() {
            Tok::Ident(word) if word == "const" => DeclKind::Const,
            Tok::Ident(word) if word == "let" => DeclKind::Let,
            Tok::Ident(word) if word == "var" => DeclKind::Var,
            _ => return None,
        };
        let is_of = matches!(
            (self.tokens.get(self.pos + 1), self.tokens.get(self.pos + 2)),
            (Some(Token { tok: Tok::Ident(_), .. }), Some(Token { tok: Tok::Ident(of), .. }))
                if of == "of"
        );
        if is_of {
            self.advance();
            Some(kind)
        } else {
            None
        }
    }

    fn parse_loop_body(&mut self) -> Result<Stmt> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        body
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        if self.function_depth == 0 {
            return Err(self.error("'return' outside of a function"));
        }
        self.advance();
        if self.eat_punct(";") {
            return Ok(Stmt::Return(None));
        }
        if self.at_punct("}") || self.at_eof() || self.newline_before() {
            return Ok(Stmt::Return(None));
        }
        let value = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::Return(Some(value)))
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        self.advance();
        let body = self.parse_block_body()?;
        if !self.eat_keyword("catch") {
            return Err(self.unexpected("expected 'catch'"));
        }
        let param = if self.eat_punct("(") {
            let name = self.expect_binding()?;
            self.expect_punct(")")?;
            Some(name)
        } else {
            None
        };
        let handler = self.parse_block_body()?;
        if self.at_keyword("finally") {
            return Err(self.error("'finally' is not supported"));
        }
        Ok(Stmt::Try {
            body,
            param,
            handler,
        })
    }

    fn parse_parenthesized(&mut self) -> Result<Expr> {
        self.expect_punct("(")?;
        let expr = self.parse_expression()?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    // Expressions

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.parse_assignment_inner();
        self.leave();
        expr
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr> {
        let target = self.parse_conditional()?;
        let op = match self.peek_tok() {
            Tok::Punct("=") => AssignOp(None),
            Tok::Punct("+=") => AssignOp(Some(BinaryOp::Add)),
            Tok::Punct("-=") => AssignOp(Some(BinaryOp::Sub)),
            Tok::Punct("*=") => AssignOp(Some(BinaryOp::Mul)),
            Tok::Punct("/=") => AssignOp(Some(BinaryOp::Div)),
            Tok::Punct("%=") => AssignOp(Some(BinaryOp::Rem)),
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(self.error("invalid assignment target"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let test = self.parse_binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((precedence, op)) = binary_operator(self.peek_tok()) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence + 1)?;
            left = match op {
                Operator::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Operator::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.parse_unary_inner();
        self.leave();
        expr
    }

    fn parse_unary_inner(&mut self) -> Result<Expr> {
        let op = match self.peek_tok() {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Ident(word) if word == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        let update = match self.peek_tok() {
            Tok::Punct("++") => Some(UpdateOp::Increment),
            Tok::Punct("--") => Some(UpdateOp::Decrement),
            _ => None,
        };
        if let Some(op) = update {
            self.advance();
            let target = self.parse_unary()?;
            if !target.is_assignable() {
                return Err(self.error("invalid update target"));
            }
            return Ok(Expr::Update {
                op,
                prefix: true,
                target: Box::new(target),
            });
        }

        if self.eat_keyword("new") {
            let expr = self.parse_call_member()?;
            if !matches!(expr, Expr::Call { .. }) {
                return Err(self.error("'new' requires an argument list"));
            }
            return Ok(expr);
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let expr = self.parse_call_member()?;
        if self.newline_before() {
            return Ok(expr);
        }
        let op = match self.peek_tok() {
            Tok::Punct("++") => UpdateOp::Increment,
            Tok::Punct("--") => UpdateOp::Decrement,
            _ => return Ok(expr),
        };
        if !expr.is_assignable() {
            return Err(self.error("invalid update target"));
        }
        self.advance();
        Ok(Expr::Update {
            op,
            prefix: false,
            target: Box::new(expr),
        })
    }

    fn parse_call_member(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let property = self.expect_property()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                if self.eat_punct("(") {
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                    };
                } else if self.eat_punct("[") {
                    let index = self.parse_expression()?;
                    self.expect_punct("]")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                    };
                } else {
                    let property = self.expect_property()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                    };
                }
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                };
            } else if self.eat_punct("(") {
                let args = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after the opening `(`.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            args.push(self.parse_assignment()?);
            if !self.at_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Tok::Number(num) => Ok(Expr::Number(num)),
            Tok::Str(text) => Ok(Expr::Str(text)),
            Tok::Template { quasis, exprs } => {
                let exprs = exprs
                    .into_iter()
                    .map(parse_interpolation)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::Template { quasis, exprs })
            }
            Tok::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "function" => Err(self.previous_error("function expressions are not supported")),
                reserved if RESERVED.contains(&reserved) => {
                    Err(self.previous_error(&format!("unexpected keyword '{reserved}'")))
                }
                _ => Ok(Expr::Ident(word)),
            },
            Tok::Punct("(") => {
                let expr = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.parse_assignment()?);
                    if !self.at_punct("]") {
                        self.expect_punct(",")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            Tok::Punct("{") => self.parse_object(),
            Tok::Eof => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("expected expression"))
            }
            Tok::Punct(_) => Err(self.previous_error("expected expression")),
        }
    }

    /// Object literal after the opening `{`.
    fn parse_object(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        while !self.eat_punct("}") {
            let (key, shorthand) = match self.advance() {
                Tok::Ident(name) => (name, true),
                Tok::Str(text) => (text, false),
                Tok::Number(num) => (super::value::format_number(num), false),
                _ => return Err(self.previous_error("expected property name")),
            };
            let value = if self.eat_punct(":") {
                self.parse_assignment()?
            } else if shorthand && (self.at_punct(",") || self.at_punct("}")) {
                Expr::Ident(key.clone())
            } else {
                return Err(self.unexpected("expected ':'"));
            };
            entries.push((key, value));
            if !self.at_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(entries))
    }

    fn error(&self, message: &str) -> ScriptError {
        let (line, column) = self.position(self.pos);
        ScriptError::Syntax {
            line,
            column,
            message: message.to_string(),
        }
    }

    /// Error positioned at the token just consumed.
    fn previous_error(&self, message: &str) -> ScriptError {
        let (line, column) = self.position(self.pos.saturating_sub(1));
        ScriptError::Syntax {
            line,
            column,
            message: message.to_string(),
        }
    }

    fn unexpected(&self, message: &str) -> ScriptError {
        let found = match self.peek_tok() {
            Tok::Eof => "end of input".to_string(),
            Tok::Ident(word) => format!("'{word}'"),
            Tok::Punct(p) => format!("'{p}'"),
            Tok::Number(_) => "number".to_string(),
            Tok::Str(_) | Tok::Template { .. } => "string".to_string(),
        };
        self.error(&format!("{message}, found {found}"))
    }

    fn position(&self, index: usize) -> (usize, usize) {
        self.tokens
            .get(index)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }
}

fn parse_interpolation(tokens: Vec<Token>) -> Result<Expr> {
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    if !parser.at_eof() {
        return Err(parser.unexpected("expected '}'"));
    }
    Ok(expr)
}

enum Operator {
    Logical(LogicalOp),
    Binary(BinaryOp),
}

fn binary_operator(tok: &Tok) -> Option<(u8, Operator)> {
    let Tok::Punct(punct) = tok else {
        return None;
    };
    let entry = match *punct {
        "||" => (1, Operator::Logical(LogicalOp::Or)),
        "??" => (1, Operator::Logical(LogicalOp::Nullish)),
        "&&" => (2, Operator::Logical(LogicalOp::And)),
        "==" => (3, Operator::Binary(BinaryOp::Eq)),
        "!=" => (3, Operator::Binary(BinaryOp::NotEq)),
        "===" => (3, Operator::Binary(BinaryOp::StrictEq)),
        "!==" => (3, Operator::Binary(BinaryOp::StrictNotEq)),
        "<" => (4, Operator::Binary(BinaryOp::Lt)),
        ">" => (4, Operator::Binary(BinaryOp::Gt)),
        "<=" => (4, Operator::Binary(BinaryOp::Le)),
        ">=" => (4, Operator::Binary(BinaryOp::Ge)),
        "+" => (5, Operator::Binary(BinaryOp::Add)),
        "-" => (5, Operator::Binary(BinaryOp::Sub)),
        "*" => (6, Operator::Binary(BinaryOp::Mul)),
        "/" => (6, Operator::Binary(BinaryOp::Div)),
        "%" => (6, Operator::Binary(BinaryOp::Rem)),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        let program = parse_program(source).expect("parse");
        match program.body.into_iter().next() {
            Some(Stmt::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn hoists_top_level_functions() {
        let program = parse_program("log(1)\nfunction process(d) { return d }").expect("parse");
        assert_eq!(program.body.len(), 1);
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.function("process").map(|f| f.params.len()), Some(1));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        match expr("1 + 2 * 3") {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. })),
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        match expr("a = b = 1") {
            Expr::Assign { value, .. } => assert!(matches!(*value, Expr::Assign { .. })),
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn optional_chain_and_call() {
        match expr("d.body?.items?.[0]") {
            Expr::Index { optional: true, object, .. } => {
                assert!(matches!(*object, Expr::Member { optional: true, .. }))
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn semicolons_are_optional_at_line_ends() {
        let program = parse_program("let a = 1\nlet b = 2\na++\n").expect("parse");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn missing_separator_on_one_line_is_rejected() {
        assert!(matches!(
            parse_program("let a = 1 let b = 2"),
            Err(ScriptError::Syntax { .. })
        ));
    }

    #[test]
    fn rejects_invalid_targets_and_misplaced_statements() {
        assert!(parse_program("1 = 2").is_err());
        assert!(parse_program("return 1").is_err());
        assert!(parse_program("break").is_err());
        assert!(parse_program("function f() { function g() {} }").is_err());
        assert!(parse_program("const x").is_err());
    }

    #[test]
    fn for_of_and_classic_for() {
        let program = parse_program(
            "for (const x of [1, 2]) { log(x) }\nfor (let i = 0; i < 3; i++) { continue }",
        )
        .expect("parse");
        assert!(matches!(program.body[0], Stmt::ForOf { kind: DeclKind::Const, .. }));
        assert!(matches!(program.body[1], Stmt::For { .. }));
    }

    #[test]
    fn object_literals_with_shorthand_and_keyword_keys() {
        match expr("({a, 'b c': 1, default: 2})") {
            Expr::Object(entries) => {
                let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b c", "default"]);
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn template_interpolations_become_expressions() {
        match expr("`got ${d.cmd}!`") {
            Expr::Template { quasis, exprs } => {
                assert_eq!(quasis, vec!["got ".to_string(), "!".to_string()]);
                assert!(matches!(exprs[0], Expr::Member { .. }));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let source = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
        assert!(matches!(
            parse_program(&source),
            Err(ScriptError::Syntax { .. })
        ));
    }
}
