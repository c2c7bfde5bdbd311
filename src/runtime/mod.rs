//! The tree-walking evaluator.
//!
//! [`Interpreter`] owns the global scope (built-in classes and functions), the
//! module scope that top-level code runs in, and the current scope pointer.
//! Statements report control flow through [`FlowControl`]; errors and script
//! exceptions travel as [`CorvidError`].

mod definitions;
mod expressions;
mod members;
mod modules;
mod statements;

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::debug;

use crate::{
    ast::Module,
    class::{Class, ClassRef, ClassSpec},
    config::InterpreterConfig,
    diagnostics::{fail, CorvidError, Diagnostic, ErrorKind, Result, SourceSpan, Thrown},
    foreign::ForeignClass,
    function::{Body, CallArgs, Function, Invocation},
    parser,
    scope::{Scope, ScopeKind, ScopeRef, Variable},
    stdlib::{self, builtins, error_object},
    value::{Object, ObjectRef, Payload, Value},
};

const RED_ZONE: usize = 100 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Grows the native stack before descending into another AST node or a
/// nested value.
pub(crate) fn ensure_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

pub(crate) enum FlowControl {
    Next,
    NextValue(Value),
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    globals: ScopeRef,
    scope: ScopeRef,
    config: InterpreterConfig,
    modules: HashMap<PathBuf, ClassRef>,
    loading: HashSet<PathBuf>,
    dir_stack: Vec<PathBuf>,
    depth: usize,
    /// Containers being printed or compared, outermost first.
    walking: Vec<ObjectRef>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let globals = Scope::module(None);
        stdlib::install_globals(&globals);
        let scope = Scope::module(Some(Rc::clone(&globals)));
        Self {
            globals,
            scope,
            config,
            modules: HashMap::new(),
            loading: HashSet::new(),
            dir_stack: Vec::new(),
            depth: 0,
            walking: Vec::new(),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Parses and runs `source` in the interpreter's module scope. Returns the
    /// value of the last expression statement, or of a top-level `return`.
    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        let result = match parser::parse_module(source) {
            Ok(module) => self.eval_module(&module),
            Err(diag) => Err(diag.into()),
        };
        result.map_err(|err| self.annotate(err))
    }

    /// Names the configured module on diagnostics that escape top-level code.
    fn annotate(&self, err: CorvidError) -> CorvidError {
        match (err, &self.config.module_name) {
            (CorvidError::Diagnostic(diag), Some(name)) if self.dir_stack.len() <= 1 => {
                diag.with_note(format!("in module `{name}`")).into()
            }
            (err, _) => err,
        }
    }

    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)?;
        let dir = path
            .canonicalize()?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.dir_stack.push(dir);
        let result = self.eval_source(&source);
        self.dir_stack.pop();
        result
    }

    pub fn eval_module(&mut self, module: &Module) -> Result<Value> {
        let mut last_value: Option<Value> = None;
        for stmt in &module.items {
            match self.execute_statement(stmt)? {
                FlowControl::Next => {}
                FlowControl::NextValue(value) => last_value = Some(value),
                FlowControl::Return(value) => return Ok(value),
                FlowControl::Break | FlowControl::Continue => {
                    return Err(CorvidError::runtime(
                        ErrorKind::InvalidOperation,
                        "`break` or `continue` outside a loop",
                    )
                    .at(stmt.span));
                }
            }
        }
        Ok(last_value.unwrap_or_else(Value::null))
    }

    /// Calls a function or constructs a class bound at module level.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let callee = self.get_variable(name)?;
        self.call_value(&callee, CallArgs::positional(args), SourceSpan::default())
    }

    /// Makes a host class constructible from scripts under its own name.
    pub fn register_foreign_class(&mut self, foreign: Rc<dyn ForeignClass>) -> ClassRef {
        let name = foreign.name().to_string();
        let class = Class::new(
            ClassSpec {
                name: name.clone(),
                supers: vec![Rc::clone(&builtins().object)],
                foreign: Some(foreign),
                ..ClassSpec::default()
            },
            Some(Rc::clone(&self.globals)),
        );
        class.flatten();
        self.globals
            .borrow_mut()
            .define_class(&name, Rc::clone(&class));
        debug!(class = %name, "registered foreign class");
        class
    }

    /// Runs `f` with `scope` as the current scope, restoring the previous one
    /// afterwards, including on error.
    pub(crate) fn in_scope<T>(
        &mut self,
        scope: ScopeRef,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let previous = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = previous;
        result
    }

    pub fn call_value(&mut self, callee: &Value, args: CallArgs, span: SourceSpan) -> Result<Value> {
        match callee {
            Value::FunctionSet(set) => {
                let resolved = set.resolve(args)?;
                self.invoke(&resolved.function, set.receiver.clone(), resolved.args, span)
            }
            Value::Class(class) => self.construct(class, args, span),
            other => fail(
                ErrorKind::TypeMismatch,
                format!("a value of type `{}` is not callable", other.type_name()),
            ),
        }
    }

    /// Invokes one resolved overload with already-bound arguments.
    pub fn invoke(
        &mut self,
        function: &Rc<Function>,
        receiver: Option<Value>,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Value> {
        let owner = function.owner();
        if !Scope::can_access(&self.scope, function.accessibility, owner.as_ref()) {
            let owner_name = owner.map(|class| class.name.clone()).unwrap_or_default();
            return fail(
                ErrorKind::AccessDenied,
                format!(
                    "`{}` is {} in `{owner_name}`",
                    function.name, function.accessibility
                ),
            );
        }
        if let Some(owner) = &owner {
            if !function.is_static && receiver.is_none() {
                return fail(
                    ErrorKind::InvalidOperation,
                    format!(
                        "`{}.{}` needs an instance",
                        owner.name, function.name
                    ),
                );
            }
        }
        if self.depth >= self.config.max_call_depth {
            return Err(Diagnostic::runtime(
                ErrorKind::StackOverflow,
                format!(
                    "call depth exceeded {} while calling `{}`",
                    self.config.max_call_depth, function.name
                ),
            )
            .with_span(span)
            .into());
        }

        self.depth += 1;
        let result = match &function.body {
            Body::Native(callback) => callback(
                self,
                Invocation {
                    receiver,
                    args,
                    span,
                },
            ),
            Body::Script { body, closure } => {
                let bound = match &receiver {
                    Some(Value::Object(object)) if owner.is_some() && !function.is_static => {
                        object.scope().map(|scope| (Rc::clone(object), Rc::clone(scope)))
                    }
                    _ => None,
                };
                let (receiver, parent) = match bound {
                    Some((object, scope)) => (Some(object), scope),
                    None => (None, Rc::clone(closure)),
                };
                let frame = Scope::new(
                    ScopeKind::Function {
                        closure: Rc::clone(closure),
                        receiver,
                    },
                    Some(parent),
                );
                {
                    let mut frame = frame.borrow_mut();
                    for (param, value) in function.params.iter().zip(args) {
                        frame.set_variable(&param.name, Variable::slot(value));
                    }
                }
                self.in_scope(frame, |this| this.run_body(body))
            }
        };
        self.depth -= 1;
        result
    }

    fn run_body(&mut self, body: &[crate::ast::Stmt]) -> Result<Value> {
        for stmt in body {
            match self.execute_statement(stmt)? {
                FlowControl::Next | FlowControl::NextValue(_) => {}
                FlowControl::Return(value) => return Ok(value),
                FlowControl::Break | FlowControl::Continue => {
                    return Err(CorvidError::runtime(
                        ErrorKind::InvalidOperation,
                        "loop control flow cannot escape a function",
                    )
                    .at(stmt.span));
                }
            }
        }
        Ok(Value::null())
    }

    /// `Class(args)`: allocation, field initializers, then the constructor.
    pub fn construct(&mut self, class: &ClassRef, args: CallArgs, span: SourceSpan) -> Result<Value> {
        if class.is_static {
            return fail(
                ErrorKind::InvalidOperation,
                format!("cannot instantiate static class `{}`", class.name),
            );
        }
        if let Some(foreign) = &class.foreign {
            let mut values = args.positional;
            values.extend(args.named.into_iter().map(|(_, value)| value));
            let payload = foreign.create(self, values)?;
            return Ok(Value::Object(Object::new(
                Rc::clone(class),
                Payload::Foreign(payload),
            )));
        }
        if class.has_native_construct() {
            let Some(set) = class.function(&class.name) else {
                return fail(
                    ErrorKind::InvalidOperation,
                    format!("`{}` has no constructor", class.name),
                );
            };
            let resolved = set.resolve(args)?;
            return self.invoke(&resolved.function, None, resolved.args, span);
        }

        let object = Value::Object(self.instantiate(class)?);
        match class.constructor() {
            Some(set) => {
                let resolved = set.resolve(args)?;
                self.invoke(&resolved.function, Some(object.clone()), resolved.args, span)?;
            }
            None if !args.is_empty() => {
                return fail(
                    ErrorKind::NoMatchingOverload,
                    format!("`{}` has no constructor taking arguments", class.name),
                );
            }
            None => {}
        }
        Ok(object)
    }

    /// Allocates an instance and runs its field initializers, ancestors
    /// first, without calling a constructor.
    pub fn instantiate(&mut self, class: &ClassRef) -> Result<ObjectRef> {
        let object = Object::instance(Rc::clone(class), Payload::None);
        let Some(object_scope) = object.scope().map(Rc::clone) else {
            return Ok(object);
        };
        for field in class.instance_fields() {
            let owner = field.owner.upgrade().unwrap_or_else(|| Rc::clone(class));
            let value = match &field.initializer {
                Some(expr) => {
                    let frame = Scope::new(
                        ScopeKind::Function {
                            closure: Rc::clone(&owner.scope),
                            receiver: Some(Rc::clone(&object)),
                        },
                        Some(Rc::clone(&object_scope)),
                    );
                    self.in_scope(frame, |this| this.evaluate(expr))?
                }
                None => Value::null(),
            };
            object_scope.borrow_mut().set_variable(
                &field.name,
                Variable {
                    is_const: field.is_const,
                    accessibility: field.accessibility,
                    owner: Some(Rc::downgrade(&owner)),
                    ..Variable::slot(value)
                },
            );
        }
        Ok(object)
    }

    /// Text of a value as `print` and string concatenation see it. Script
    /// objects go through their `ToString` member.
    pub fn stringify(&mut self, value: &Value) -> Result<String> {
        if let Value::Object(object) = value {
            if let Some(items) = value.list_items() {
                let text = self.guard_cycle(object, |this| {
                    let mut parts = Vec::with_capacity(items.len());
                    for item in &items {
                        parts.push(this.stringify(item)?);
                    }
                    Ok(format!("[{}]", parts.join(", ")))
                })?;
                return Ok(text.unwrap_or_else(|| "[...]".to_string()));
            }
            if let Some(entries) = value.dict_entries() {
                let text = self.guard_cycle(object, |this| {
                    let mut parts = Vec::with_capacity(entries.len());
                    for (key, item) in &entries {
                        let key = this.stringify(&key.to_value())?;
                        parts.push(format!("{key}: {}", this.stringify(item)?));
                    }
                    Ok(format!("{{{}}}", parts.join(", ")))
                })?;
                return Ok(text.unwrap_or_else(|| "{...}".to_string()));
            }
            if object.class.builtin.is_none() && object.scope().is_some() {
                let method = self.get_member(value, "ToString", SourceSpan::default())?;
                let text = self.call_value(&method, CallArgs::default(), SourceSpan::default())?;
                return Ok(match text.as_str() {
                    Some(text) => text.to_string(),
                    None => text.to_string(),
                });
            }
        }
        Ok(value.to_string())
    }

    /// Runs `f` over a container unless the container is already being walked
    /// further up, in which case it returns `None`.
    pub(crate) fn guard_cycle<R>(
        &mut self,
        object: &ObjectRef,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<Option<R>> {
        if self.walking.iter().any(|seen| Rc::ptr_eq(seen, object)) {
            return Ok(None);
        }
        self.walking.push(Rc::clone(object));
        let result = ensure_stack(|| f(self));
        self.walking.pop();
        result.map(Some)
    }

    /// The default text of a value, ignoring any script `ToString`.
    pub fn display(&mut self, value: &Value) -> Result<String> {
        match value {
            Value::Object(object) if object.class.builtin.is_none() => Ok(value.to_string()),
            _ => self.stringify(value),
        }
    }

    /// Wraps a thrown value as an error, stamping its `Line` field if unset.
    pub(crate) fn throw_value(&mut self, value: Value, span: SourceSpan) -> CorvidError {
        let mut message = String::new();
        if let Some(object) = value.as_object() {
            if object.field("Line").and_then(|line| line.as_int()) == Some(0) {
                object.set_field("Line", Value::int(span.line as i64));
            }
            if let Some(text) = object.field("Message") {
                message = text.to_string();
            }
        } else {
            message = value.to_string();
        }
        let class_name = value.type_name();
        debug!(class = %class_name, line = span.line, %message, "exception thrown");
        CorvidError::Thrown(Box::new(Thrown {
            value,
            class_name,
            message,
            span: Some(span),
        }))
    }

    /// The value a `catch` clause binds for `err`, or `None` for fatal
    /// errors that scripts cannot catch.
    pub(crate) fn caught_value(&mut self, err: &CorvidError) -> Result<Option<Value>> {
        match err {
            CorvidError::Thrown(thrown) => Ok(Some(thrown.value.clone())),
            CorvidError::Diagnostic(diag) => match diag.error_kind() {
                Some(kind) if !kind.is_fatal() => {
                    let line = diag.span.map(|span| span.line);
                    error_object(self, kind, &diag.message, line).map(Some)
                }
                _ => Ok(None),
            },
            CorvidError::Io(_) => Ok(None),
        }
    }
}
