/// A parsed script: top-level statements plus the functions it declares.
#[derive(Debug, Clone)]
pub struct Program {
    /// Statements run once per invocation, in order
    pub body: Vec<Stmt>,
    /// Top-level function declarations, hoisted
    pub functions: Vec<Function>,
}

impl Program {
    /// Look up a declared function
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().rev().find(|f| f.name == name)
    }
}

/// A named function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Declared name
    pub name: String,
    /// Parameter names
    pub params: Vec<String>,
    /// Body statements
    pub body: Vec<Stmt>,
}

/// Binding kind for declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
}

/// Statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Expression evaluated for its effect
    Expr(Expr),
    /// `let a = 1, b`
    Declare {
        /// Binding kind
        kind: DeclKind,
        /// Names and optional initialisers
        declarations: Vec<(String, Option<Expr>)>,
    },
    /// `if (test) then else otherwise`
    If {
        /// Condition
        test: Expr,
        /// Taken branch
        then: Box<Stmt>,
        /// `else` branch
        otherwise: Option<Box<Stmt>>,
    },
    /// `while (test) body`
    While {
        /// Condition
        test: Expr,
        /// Loop body
        body: Box<Stmt>,
    },
    /// `for (init; test; update) body`
    For {
        /// Initialiser
        init: Option<Box<Stmt>>,
        /// Condition; absent means forever
        test: Option<Expr>,
        /// Step expression
        update: Option<Expr>,
        /// Loop body
        body: Box<Stmt>,
    },
    /// `for (const name of iterable) body`
    ForOf {
        /// Binding kind of the loop variable
        kind: DeclKind,
        /// Loop variable
        name: String,
        /// Array or string iterated over
        iterable: Expr,
        /// Loop body
        body: Box<Stmt>,
    },
    /// `return value`
    Return(Option<Expr>),
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `throw value`
    Throw(Expr),
    /// `try { body } catch (param) { handler }`
    Try {
        /// Protected block
        body: Vec<Stmt>,
        /// Name bound to the caught value
        param: Option<String>,
        /// Handler block
        handler: Vec<Stmt>,
    },
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// `;`
    Empty,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
    /// `+`
    Plus,
    /// `typeof`
    TypeOf,
}

/// `++` and `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNotEq,
}

/// Short-circuiting operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

/// Assignment operators; `None` is plain `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignOp(pub Option<BinaryOp>);

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number literal
    Number(f64),
    /// String literal
    Str(String),
    /// Template literal: `quasis.len() == exprs.len() + 1`
    Template {
        /// Literal chunks
        quasis: Vec<String>,
        /// Interpolated expressions
        exprs: Vec<Expr>,
    },
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// `[a, b]`
    Array(Vec<Expr>),
    /// `{a: 1}`
    Object(Vec<(String, Expr)>),
    /// Variable reference
    Ident(String),
    /// `object.property` / `object?.property`
    Member {
        /// Receiver
        object: Box<Expr>,
        /// Property name
        property: String,
        /// `?.`
        optional: bool,
    },
    /// `object[index]` / `object?.[index]`
    Index {
        /// Receiver
        object: Box<Expr>,
        /// Key expression
        index: Box<Expr>,
        /// `?.`
        optional: bool,
    },
    /// `callee(args)` / `callee?.(args)`
    Call {
        /// Function expression
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Expr>,
        /// `?.`
        optional: bool,
    },
    /// `!x`, `-x`, `+x`, `typeof x`
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// `++x`, `x--`
    Update {
        /// Operator
        op: UpdateOp,
        /// Prefix form returns the new value
        prefix: bool,
        /// Assignable target
        target: Box<Expr>,
    },
    /// Arithmetic, comparison, equality
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `&&`, `||`, `??`
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `test ? consequent : alternate`
    Conditional {
        /// Condition
        test: Box<Expr>,
        /// Value when truthy
        consequent: Box<Expr>,
        /// Value when falsy
        alternate: Box<Expr>,
    },
    /// `target op= value`
    Assign {
        /// Operator
        op: AssignOp,
        /// Assignable target
        target: Box<Expr>,
        /// Right-hand side
        value: Box<Expr>,
    },
}

impl Expr {
    /// Whether the expression can appear on the left of `=`
    pub fn is_assignable(&self) -> bool {
        match self {
            Expr::Ident(_) => true,
            Expr::Member { optional, object, .. } | Expr::Index { optional, object, .. } => {
                !optional && object.is_assignable()
            }
            _ => false,
        }
    }
}
