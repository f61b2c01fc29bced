use std::collections::{BTreeMap, HashMap};
use std::mem;

use super::ast::{BinaryOp, DeclKind, Expr, LogicalOp, Program, Stmt, UnaryOp, UpdateOp};
use super::builtins;
use super::value::{
    Builtin, MAX_ARRAY_LEN, MAX_STRING_LEN, MAX_VALUE_DEPTH, Value, format_number,
};
use super::{Limits, Result, ScriptError, ScriptHost};

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Non-local exit while evaluating.
enum Unwind {
    /// A value thrown by the script
    Throw(Value),
    /// A runtime error; only some are catchable
    Error(ScriptError),
}

impl From<ScriptError> for Unwind {
    fn from(err: ScriptError) -> Self {
        Unwind::Error(err)
    }
}

impl Unwind {
    fn into_error(self) -> ScriptError {
        match self {
            Unwind::Throw(value) => ScriptError::Thrown(describe_thrown(&value)),
            Unwind::Error(err) => err,
        }
    }
}

type Exec<T> = std::result::Result<T, Unwind>;

struct Binding {
    value: Value,
    constant: bool,
}

type Scope = HashMap<String, Binding>;

/// Evaluates one invocation of a [`Program`] against a host.
///
/// Top-level bindings live in the global scope; a function call sees its own
/// frame plus the outermost global scope.
pub struct Interpreter<'p, 'h> {
    program: &'p Program,
    host: &'h mut dyn ScriptHost,
    limits: Limits,
    steps: usize,
    allocated: usize,
    globals: Vec<Scope>,
    frames: Vec<Vec<Scope>>,
}

impl<'p, 'h> Interpreter<'p, 'h> {
    /// Fresh interpreter with empty globals
    pub fn new(program: &'p Program, host: &'h mut dyn ScriptHost, limits: Limits) -> Self {
        Self {
            program,
            host,
            limits,
            steps: 0,
            allocated: 0,
            globals: vec![Scope::new()],
            frames: Vec::new(),
        }
    }

    /// Steps consumed so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Run the program's top-level statements
    pub fn run_top_level(&mut self) -> Result<()> {
        let program = self.program;
        self.exec_stmts(&program.body)
            .map(|_| ())
            .map_err(Unwind::into_error)
    }

    /// Call a declared function by name
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.call_user(name, args).map_err(Unwind::into_error)
    }

    fn tick(&mut self) -> Exec<()> {
        self.steps += 1;
        if self.steps > self.limits.step_limit {
            return Err(ScriptError::StepLimit(self.limits.step_limit).into());
        }
        Ok(())
    }

    /// Count `bytes` against the invocation's memory budget.
    fn charge(&mut self, bytes: usize) -> Exec<()> {
        self.allocated = self.allocated.saturating_add(bytes);
        if self.allocated > self.limits.memory_limit {
            return Err(ScriptError::MemoryLimit(self.limits.memory_limit).into());
        }
        Ok(())
    }

    /// Account for a value the script built or stored `nesting` levels
    /// below a variable.
    fn admit(&mut self, value: &Value, nesting: usize) -> Exec<()> {
        let footprint = value.footprint();
        if nesting + footprint.depth > MAX_VALUE_DEPTH {
            return Err(range_error(format!(
                "values cannot nest deeper than {MAX_VALUE_DEPTH} levels"
            )));
        }
        self.charge(footprint.bytes)
    }

    fn combine(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Exec<Value> {
        let value = binary(op, left, right)?;
        if let Value::String(text) = &value {
            self.charge(text.len())?;
        }
        Ok(value)
    }

    // Scopes

    fn scopes_mut(&mut self) -> &mut Vec<Scope> {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.globals,
        }
    }

    fn in_scope<T>(&mut self, run: impl FnOnce(&mut Self) -> Exec<T>) -> Exec<T> {
        self.scopes_mut().push(Scope::new());
        let result = run(self);
        self.scopes_mut().pop();
        result
    }

    fn declare(&mut self, name: &str, value: Value, constant: bool) {
        let scopes = self.scopes_mut();
        if scopes.is_empty() {
            scopes.push(Scope::new());
        }
        if let Some(scope) = scopes.last_mut() {
            scope.insert(name.to_string(), Binding { value, constant });
        }
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        match self.frames.last() {
            Some(frame) => frame
                .iter()
                .rev()
                .find_map(|scope| scope.get(name))
                .or_else(|| self.globals.first().and_then(|scope| scope.get(name))),
            None => self.globals.iter().rev().find_map(|scope| scope.get(name)),
        }
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Binding> {
        if let Some(frame) = self.frames.last_mut() {
            if let Some(scope) = frame.iter_mut().rev().find(|scope| scope.contains_key(name)) {
                return scope.get_mut(name);
            }
            return self.globals.first_mut().and_then(|scope| scope.get_mut(name));
        }
        self.globals
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }

    fn is_defined(&self, name: &str) -> bool {
        self.lookup(name).is_some()
            || self.program.function(name).is_some()
            || global_builtin(name).is_some()
    }

    fn read_name(&self, name: &str) -> Exec<Value> {
        if let Some(binding) = self.lookup(name) {
            return Ok(binding.value.clone());
        }
        if self.program.function(name).is_some() {
            return Ok(Value::Function(name.to_string()));
        }
        global_builtin(name).ok_or_else(|| reference_error(format!("{name} is not defined")))
    }

    // Statements

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> Exec<Flow> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Exec<Flow> {
        self.in_scope(|this| this.exec_stmts(stmts))
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Exec<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Declare { kind, declarations } => {
                for (name, init) in declarations {
                    let value = match init {
                        Some(expr) => self.eval(expr)?,
                        None => Value::Undefined,
                    };
                    self.declare(name, value, *kind == DeclKind::Const);
                }
                Ok(Flow::Normal)
            }
            Stmt::If {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.exec_stmt(then)
                } else if let Some(otherwise) = otherwise {
                    self.exec_stmt(otherwise)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { test, body } => {
                while self.eval(test)?.is_truthy() {
                    match self.exec_stmt(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.in_scope(|this| {
                if let Some(init) = init {
                    this.exec_stmt(init)?;
                }
                loop {
                    match test {
                        Some(test) => {
                            if !this.eval(test)?.is_truthy() {
                                break;
                            }
                        }
                        None => this.tick()?,
                    }
                    match this.exec_stmt(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        this.eval(update)?;
                    }
                }
                Ok(Flow::Normal)
            }),
            Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
            } => {
                let items = match self.eval(iterable)? {
                    Value::Array(items) => items,
                    Value::String(text) => {
                        self.charge(text.len().saturating_mul(mem::size_of::<Value>()))?;
                        text.chars()
                            .map(|ch| Value::String(ch.to_string()))
                            .collect()
                    }
                    _ => {
                        return Err(type_error(format!("{} is not iterable", describe(iterable))));
                    }
                };
                for item in items {
                    let flow = self.in_scope(|this| {
                        this.declare(name, item, *kind == DeclKind::Const);
                        this.exec_stmt(body)
                    })?;
                    match flow {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Throw(expr) => Err(Unwind::Throw(self.eval(expr)?)),
            Stmt::Try {
                body,
                param,
                handler,
            } => {
                let caught = match self.exec_block(body) {
                    Err(Unwind::Throw(value)) => value,
                    Err(Unwind::Error(err)) if err.is_catchable() => error_value(&err),
                    other => return other,
                };
                self.in_scope(|this| {
                    if let Some(param) = param {
                        this.declare(param, caught, false);
                    }
                    this.exec_stmts(handler)
                })
            }
            Stmt::Block(stmts) => self.exec_block(stmts),
            Stmt::Empty => Ok(Flow::Normal),
        }
    }

    // Expressions

    fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        self.tick()?;
        match expr {
            Expr::Number(num) => Ok(Value::Number(*num)),
            Expr::Str(text) => Ok(Value::String(text.clone())),
            Expr::Template { quasis, exprs } => {
                let mut text = String::new();
                for (index, quasi) in quasis.iter().enumerate() {
                    push_bounded(&mut text, quasi)?;
                    if let Some(expr) = exprs.get(index) {
                        push_bounded(&mut text, &self.eval(expr)?.to_js_string())?;
                    }
                }
                self.charge(text.len())?;
                Ok(Value::String(text))
            }
            Expr::Bool(flag) => Ok(Value::Bool(*flag)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Array(items) => {
                let value = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Exec<Vec<_>>>()
                    .map(Value::Array)?;
                self.admit(&value, 0)?;
                Ok(value)
            }
            Expr::Object(entries) => {
                let mut map = BTreeMap::new();
                for (key, expr) in entries {
                    let value = self.eval(expr)?;
                    map.insert(key.clone(), value);
                }
                let value = Value::Object(map);
                self.admit(&value, 0)?;
                Ok(value)
            }
            Expr::Ident(name) => self.read_name(name),
            Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => {
                Ok(self.eval_chain(expr)?.unwrap_or(Value::Undefined))
            }
            Expr::Unary { op, operand } => self.eval_unary(*op, operand),
            Expr::Update { op, prefix, target } => {
                let old = self.eval(target)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.assign(target, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.combine(*op, &left, &right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let short_circuits = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign { op, target, value } => {
                let value = match op.0 {
                    None => self.eval(value)?,
                    Some(op) => {
                        let current = self.eval(target)?;
                        let rhs = self.eval(value)?;
                        self.combine(op, &current, &rhs)?
                    }
                };
                self.assign(target, value.clone())?;
                Ok(value)
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> Exec<Value> {
        if op == UnaryOp::TypeOf {
            if let Expr::Ident(name) = operand {
                if !self.is_defined(name) {
                    return Ok(Value::String("undefined".to_string()));
                }
            }
        }
        let value = self.eval(operand)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.is_truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::TypeOf => Value::String(value.type_of().to_string()),
        })
    }

    /// Evaluate a member/index/call chain; `None` means an optional link
    /// short-circuited the rest of the chain.
    fn eval_chain(&mut self, expr: &Expr) -> Exec<Option<Value>> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                get_property(&target, property).map(Some)
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let Some(target) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = property_key(&self.eval(index)?);
                get_property(&target, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => self.eval_call(callee, args, *optional),
            other => self.eval(other).map(Some),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], optional: bool) -> Exec<Option<Value>> {
        let function = match callee {
            Expr::Member {
                object,
                property,
                optional: link_optional,
            } => {
                let Some(receiver) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *link_optional && receiver.is_nullish() {
                    return Ok(None);
                }
                if builtins::is_method(&receiver, property) {
                    let args = self.eval_args(args)?;
                    let value = builtins::call_method(&receiver, property, &args)?;
                    self.admit(&value, 0)?;
                    return Ok(Some(value));
                }
                get_property(&receiver, property)?
            }
            Expr::Index {
                object,
                index,
                optional: link_optional,
            } => {
                let Some(receiver) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *link_optional && receiver.is_nullish() {
                    return Ok(None);
                }
                let key = property_key(&self.eval(index)?);
                if builtins::is_method(&receiver, &key) {
                    let args = self.eval_args(args)?;
                    let value = builtins::call_method(&receiver, &key, &args)?;
                    self.admit(&value, 0)?;
                    return Ok(Some(value));
                }
                get_property(&receiver, &key)?
            }
            other => match self.eval_chain(other)? {
                Some(function) => function,
                None => return Ok(None),
            },
        };

        if optional && function.is_nullish() {
            return Ok(None);
        }
        let args = self.eval_args(args)?;
        match function {
            Value::Function(name) => {
                for arg in &args {
                    self.admit(arg, 0)?;
                }
                self.call_user(&name, args).map(Some)
            }
            Value::Builtin(builtin) => {
                let value = self.call_builtin(builtin, args)?;
                self.admit(&value, 0)?;
                Ok(Some(value))
            }
            _ => Err(type_error(format!("{} is not a function", describe(callee)))),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Exec<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn call_user(&mut self, name: &str, args: Vec<Value>) -> Exec<Value> {
        let program = self.program;
        let Some(function) = program.function(name) else {
            return Err(reference_error(format!("{name} is not defined")));
        };
        if self.frames.len() >= self.limits.max_depth {
            return Err(ScriptError::DepthLimit(self.limits.max_depth).into());
        }

        let mut scope = Scope::new();
        let mut args = args.into_iter();
        for param in &function.params {
            let value = args.next().unwrap_or(Value::Undefined);
            scope.insert(
                param.clone(),
                Binding {
                    value,
                    constant: false,
                },
            );
        }

        self.frames.push(vec![scope]);
        let result = self.exec_stmts(&function.body);
        self.frames.pop();

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn call_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> Exec<Value> {
        let first = args.first().cloned().unwrap_or(Value::Undefined);
        match builtin {
            Builtin::Log | Builtin::Notify => {
                let message = args.first().map(Value::to_js_string).unwrap_or_default();
                let level = match args.get(1) {
                    Some(Value::String(level)) => level.as_str(),
                    _ => "info",
                };
                if builtin == Builtin::Log {
                    self.host.log(&message, level);
                } else {
                    self.host.notify(&message, level);
                }
                Ok(Value::Undefined)
            }
            Builtin::JsonStringify => {
                if first.is_unserializable() {
                    return Ok(Value::Undefined);
                }
                let json = first.to_json();
                let text = if args.get(2).is_some_and(Value::is_truthy) {
                    serde_json::to_string_pretty(&json)
                } else {
                    serde_json::to_string(&json)
                };
                text.map(Value::String)
                    .map_err(|err| type_error(err.to_string()))
            }
            Builtin::JsonParse => {
                match serde_json::from_str::<serde_json::Value>(&first.to_js_string()) {
                    Ok(json) => Ok(Value::from_json(&json)),
                    Err(err) => Err(Unwind::Throw(error_object("SyntaxError", &err.to_string()))),
                }
            }
            Builtin::ObjectKeys => match first {
                Value::Object(map) => Ok(Value::Array(map.into_keys().map(Value::String).collect())),
                Value::Array(items) => Ok(index_keys(items.len())),
                Value::String(text) => Ok(index_keys(text.chars().count())),
                Value::Undefined | Value::Null => Err(type_error(
                    "Cannot convert undefined or null to object".to_string(),
                )),
                _ => Ok(Value::Array(Vec::new())),
            },
            Builtin::ToString => Ok(Value::String(
                args.first().map(Value::to_js_string).unwrap_or_default(),
            )),
            Builtin::ToNumber => Ok(Value::Number(args.first().map_or(0.0, Value::to_number))),
            Builtin::Error => Ok(error_object(
                "Error",
                &args.first().map(Value::to_js_string).unwrap_or_default(),
            )),
        }
    }

    // Assignment

    fn assign(&mut self, target: &Expr, value: Value) -> Exec<()> {
        let (root, path) = self.place(target)?;
        if !path.is_empty() {
            self.admit(&value, path.len())?;
        }
        let Some(binding) = self.lookup_mut(&root) else {
            return Err(reference_error(format!("{root} is not defined")));
        };

        let Some((last, parents)) = path.split_last() else {
            if binding.constant {
                return Err(type_error(format!(
                    "Assignment to constant variable '{root}'"
                )));
            }
            binding.value = value;
            return Ok(());
        };

        let mut slot = &mut binding.value;
        for (depth, key) in parents.iter().enumerate() {
            slot = match child_mut(slot, key) {
                Some(child) => child,
                None => {
                    let next = &path[depth + 1];
                    return Err(type_error(format!(
                        "Cannot set properties of undefined (setting '{next}')"
                    )));
                }
            };
        }
        let grown = set_child(slot, last, value)?;
        self.charge(grown.saturating_mul(mem::size_of::<Value>()))
    }

    /// Resolve an assignment target to its root variable and property path.
    fn place(&mut self, expr: &Expr) -> Exec<(String, Vec<String>)> {
        match expr {
            Expr::Ident(name) => Ok((name.clone(), Vec::new())),
            Expr::Member {
                object, property, ..
            } => {
                let (root, mut path) = self.place(object)?;
                path.push(property.clone());
                Ok((root, path))
            }
            Expr::Index { object, index, .. } => {
                let (root, mut path) = self.place(object)?;
                let key = property_key(&self.eval(index)?);
                path.push(key);
                Ok((root, path))
            }
            _ => Err(type_error("invalid assignment target".to_string())),
        }
    }
}

fn namespace(entries: &[(&str, Builtin)]) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(key, builtin)| (key.to_string(), Value::Builtin(*builtin)))
            .collect(),
    )
}

fn global_builtin(name: &str) -> Option<Value> {
    let value = match name {
        "log" => Value::Builtin(Builtin::Log),
        "notify" => Value::Builtin(Builtin::Notify),
        "String" => Value::Builtin(Builtin::ToString),
        "Number" => Value::Builtin(Builtin::ToNumber),
        "Error" => Value::Builtin(Builtin::Error),
        "JSON" => namespace(&[
            ("stringify", Builtin::JsonStringify),
            ("parse", Builtin::JsonParse),
        ]),
        "Object" => namespace(&[("keys", Builtin::ObjectKeys)]),
        "NaN" => Value::Number(f64::NAN),
        "Infinity" => Value::Number(f64::INFINITY),
        _ => return None,
    };
    Some(value)
}

fn get_property(target: &Value, key: &str) -> Exec<Value> {
    let value = match target {
        Value::Undefined | Value::Null => {
            return Err(type_error(format!(
                "Cannot read properties of {target} (reading '{key}')"
            )));
        }
        Value::String(text) => match key {
            "length" => Value::Number(text.chars().count() as f64),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|index| text.chars().nth(index))
                .map_or(Value::Undefined, |ch| Value::String(ch.to_string())),
        },
        Value::Array(items) => match key {
            "length" => Value::Number(items.len() as f64),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .cloned()
                .unwrap_or(Value::Undefined),
        },
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    };
    Ok(value)
}

fn child_mut<'v>(slot: &'v mut Value, key: &str) -> Option<&'v mut Value> {
    match slot {
        Value::Object(map) => map.get_mut(key),
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(move |index| items.get_mut(index)),
        _ => None,
    }
}

/// Store `value` under `key`; returns how many array slots were added.
fn set_child(slot: &mut Value, key: &str, value: Value) -> Exec<usize> {
    if slot.is_nullish() {
        return Err(type_error(format!(
            "Cannot set properties of {slot} (setting '{key}')"
        )));
    }
    match slot {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(0)
        }
        Value::Array(items) => {
            let Ok(index) = key.parse::<usize>() else {
                return Err(type_error(format!("Cannot set property '{key}' of an array")));
            };
            if index >= MAX_ARRAY_LEN {
                return Err(range_error(format!("array index {index} out of range")));
            }
            let grown = (index + 1).saturating_sub(items.len());
            if grown > 0 {
                items.resize(index + 1, Value::Undefined);
            }
            items[index] = value;
            Ok(grown)
        }
        other => Err(type_error(format!(
            "Cannot create property '{key}' on {}",
            other.type_of()
        ))),
    }
}

fn property_key(value: &Value) -> String {
    match value {
        Value::Number(num) => format_number(*num),
        Value::String(text) => text.clone(),
        other => other.to_js_string(),
    }
}

fn index_keys(len: usize) -> Value {
    Value::Array((0..len).map(|i| Value::String(i.to_string())).collect())
}

fn push_bounded(text: &mut String, piece: &str) -> Exec<()> {
    if text.len().saturating_add(piece.len()) > MAX_STRING_LEN {
        return Err(range_error(format!(
            "strings cannot exceed {MAX_STRING_LEN} bytes"
        )));
    }
    text.push_str(piece);
    Ok(())
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Exec<Value> {
    let value = match op {
        BinaryOp::Add => {
            let concatenates = |value: &Value| {
                !matches!(
                    value,
                    Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
                )
            };
            if concatenates(left) || concatenates(right) {
                let mut text = left.to_js_string();
                push_bounded(&mut text, &right.to_js_string())?;
                Value::String(text)
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            Value::Bool(compare(op, left, right))
        }
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
    };
    Ok(value)
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Gt => a > b,
            BinaryOp::Le => a <= b,
            _ => a >= b,
        };
    }
    let (a, b) = (left.to_number(), right.to_number());
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Gt => a > b,
        BinaryOp::Le => a <= b,
        _ => a >= b,
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{property}", describe(object)),
        Expr::Index { object, .. } => format!("{}[...]", describe(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

fn error_object(name: &str, message: &str) -> Value {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), Value::String(name.to_string()));
    map.insert("message".to_string(), Value::String(message.to_string()));
    Value::Object(map)
}

/// The value a `catch` clause sees for a runtime error.
fn error_value(err: &ScriptError) -> Value {
    match err {
        ScriptError::Reference(message) => error_object("ReferenceError", message),
        ScriptError::Type(message) => error_object("TypeError", message),
        ScriptError::Range(message) => error_object("RangeError", message),
        ScriptError::Thrown(message) => Value::String(message.clone()),
        other => error_object("Error", &other.to_string()),
    }
}

fn describe_thrown(value: &Value) -> String {
    if let Value::Object(map) = value {
        if let Some(Value::String(message)) = map.get("message") {
            return match map.get("name") {
                Some(Value::String(name)) => format!("{name}: {message}"),
                _ => message.clone(),
            };
        }
    }
    value.to_js_string()
}

fn type_error(message: String) -> Unwind {
    Unwind::Error(ScriptError::Type(message))
}

fn reference_error(message: String) -> Unwind {
    Unwind::Error(ScriptError::Reference(message))
}

fn range_error(message: String) -> Unwind {
    Unwind::Error(ScriptError::Range(message))
}
