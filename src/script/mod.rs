//! Automation script language
//!
//! Scripts are written in a small JavaScript-like language and interpreted by
//! a tree-walking evaluator. A script has no ambient capabilities: the only
//! way out is the [`ScriptHost`] it is invoked with, which provides `log` and
//! `notify`. Each invocation is bounded by a step budget and a call-depth
//! limit, so a runaway script fails instead of stalling its caller.
//!
//! ```text
//! function process(data) {
//!   if (data.cmd === 'ping') log(`got ${data.cmd}`);
//! }
//! ```

/// Abstract syntax tree.
pub mod ast;
mod builtins;
/// Tree-walking evaluator.
pub mod eval;
/// Tokenizer.
pub mod lexer;
/// Recursive-descent parser.
pub mod parser;
/// Runtime values.
pub mod value;

pub use ast::Program;
pub use parser::parse_program;
pub use value::Value;

use thiserror::Error;

/// Default number of evaluation steps per invocation
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Default maximum call depth
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default bytes a single invocation may build
pub const DEFAULT_MEMORY_LIMIT: usize = 64 << 20;

/// Name of the entry point called with each payload
pub const ENTRY_POINT: &str = "process";

/// Convenience result alias for script operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors surfaced while compiling or running a script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// The source did not parse.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
        /// What went wrong
        message: String,
    },

    /// An undeclared name was read or assigned.
    #[error("ReferenceError: {0}")]
    Reference(String),

    /// An operation was applied to a value of the wrong kind.
    #[error("TypeError: {0}")]
    Type(String),

    /// A value grew past a size or nesting bound.
    #[error("RangeError: {0}")]
    Range(String),

    /// The script threw a value that nothing caught.
    #[error("Uncaught {0}")]
    Thrown(String),

    /// The invocation ran out of evaluation steps.
    #[error("step limit of {0} exceeded")]
    StepLimit(usize),

    /// Calls nested deeper than allowed.
    #[error("call depth limit of {0} exceeded")]
    DepthLimit(usize),

    /// The invocation built more data than allowed.
    #[error("memory limit of {0} bytes exceeded")]
    MemoryLimit(usize),
}

impl ScriptError {
    /// Whether a `try`/`catch` inside the script may intercept this error
    pub fn is_catchable(&self) -> bool {
        matches!(
            self,
            ScriptError::Reference(_)
                | ScriptError::Type(_)
                | ScriptError::Range(_)
                | ScriptError::Thrown(_)
        )
    }
}

/// The capabilities a running script may use.
pub trait ScriptHost {
    /// `log(message, level)`
    fn log(&mut self, message: &str, level: &str);

    /// `notify(message, level)`
    fn notify(&mut self, message: &str, level: &str);
}

/// Bounds applied to a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Evaluation steps allowed
    pub step_limit: usize,
    /// Nested user function calls allowed
    pub max_depth: usize,
    /// Bytes of strings, arrays and objects the invocation may build
    pub memory_limit: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
            max_depth: DEFAULT_MAX_DEPTH,
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }
}

impl Limits {
    /// Default depth with the given step budget
    pub fn with_steps(step_limit: usize) -> Self {
        Self {
            step_limit,
            ..Self::default()
        }
    }
}

/// A parsed script, ready to be invoked any number of times.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    program: Program,
}

/// Parse `source` into a [`CompiledScript`].
pub fn compile(source: &str) -> Result<CompiledScript> {
    let program = parse_program(source)?;
    Ok(CompiledScript { program })
}

impl CompiledScript {
    /// Whether the script declares `process`
    pub fn has_entry_point(&self) -> bool {
        self.program.function(ENTRY_POINT).is_some()
    }

    /// The parsed program
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Run the top-level statements, then `process(payload)` if declared.
    ///
    /// Returns what `process` returned, converted to JSON (`null` when it
    /// returned nothing or is not declared).
    pub fn invoke(
        &self,
        payload: &serde_json::Value,
        host: &mut dyn ScriptHost,
        limits: Limits,
    ) -> Result<serde_json::Value> {
        let mut interpreter = eval::Interpreter::new(&self.program, host, limits);
        interpreter.run_top_level()?;
        if !self.has_entry_point() {
            return Ok(serde_json::Value::Null);
        }
        let result = interpreter.call_function(ENTRY_POINT, vec![Value::from_json(payload)])?;
        Ok(result.to_json())
    }
}
