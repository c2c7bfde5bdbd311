//! Built-in classes and global functions.
//!
//! The classes live in a per-thread registry so that `Value::int` and friends
//! can find their class without an interpreter at hand. The registry is built
//! in two steps: the class objects first, then their members, because member
//! definitions themselves need the classes (for typed parameters and for
//! default values).

mod collections;
mod exceptions;
mod primitives;

use std::{cell::OnceCell, io::Write, rc::Rc};

use crate::{
    class::{BuiltinKind, Class, ClassRef, ClassSpec},
    diagnostics::{fail, ErrorKind, Result},
    function::{Function, FunctionSet, Invocation, Parameter},
    runtime::Interpreter,
    scope::{ScopeRef, Storage, Variable},
    value::{Object, ObjectRef, Payload, Value},
};

pub(crate) use collections::list_index;
pub(crate) use exceptions::error_object;

pub struct BuiltinClasses {
    pub object: ClassRef,
    pub null: ClassRef,
    pub int: ClassRef,
    pub float: ClassRef,
    pub decimal: ClassRef,
    pub bool: ClassRef,
    pub str: ClassRef,
    pub list: ClassRef,
    pub dict: ClassRef,
    pub range: ClassRef,
    pub enumerator: ClassRef,
    pub function: ClassRef,
    pub type_: ClassRef,
    pub exception: ClassRef,
    pub errors: Vec<(ErrorKind, ClassRef)>,
    pub json5: ClassRef,
    pub null_value: Value,
    pub true_value: Value,
    pub false_value: Value,
}

thread_local! {
    static BUILTINS: OnceCell<Rc<BuiltinClasses>> = const { OnceCell::new() };
}

/// The built-in classes of the current thread.
pub fn builtins() -> Rc<BuiltinClasses> {
    BUILTINS.with(|cell| {
        if let Some(classes) = cell.get() {
            return Rc::clone(classes);
        }
        let classes = Rc::new(BuiltinClasses::create());
        let _ = cell.set(Rc::clone(&classes));
        classes.populate();
        classes
    })
}

fn builtin_class(
    name: &str,
    kind: Option<BuiltinKind>,
    supers: Vec<ClassRef>,
    is_static: bool,
) -> ClassRef {
    Class::new(
        ClassSpec {
            name: name.to_string(),
            supers,
            is_static,
            builtin: kind,
            ..ClassSpec::default()
        },
        None,
    )
}

impl BuiltinClasses {
    fn create() -> Self {
        let object = builtin_class("object", Some(BuiltinKind::Object), Vec::new(), false);
        let derived = |name: &str, kind: BuiltinKind, is_static: bool| {
            builtin_class(name, Some(kind), vec![Rc::clone(&object)], is_static)
        };
        let null = derived("null", BuiltinKind::Null, true);
        let int = derived("int", BuiltinKind::Int, false);
        let float = derived("float", BuiltinKind::Float, false);
        let decimal = derived("decimal", BuiltinKind::Decimal, false);
        let bool = derived("bool", BuiltinKind::Bool, false);
        let str = derived("str", BuiltinKind::Str, false);
        let list = derived("list", BuiltinKind::List, false);
        let dict = derived("dict", BuiltinKind::Dict, false);
        let range = derived("range", BuiltinKind::Range, false);
        let enumerator = derived("enumerator", BuiltinKind::Enumerator, true);
        let function = derived("function", BuiltinKind::Function, true);
        let type_ = derived("type", BuiltinKind::Type, true);
        let exception = builtin_class("Exception", None, vec![Rc::clone(&object)], false);
        let errors = ErrorKind::CATCHABLE
            .iter()
            .map(|kind| {
                let class = builtin_class(
                    kind.exception_class(),
                    None,
                    vec![Rc::clone(&exception)],
                    false,
                );
                (*kind, class)
            })
            .collect();
        let json5 = builtin_class("Json5", None, Vec::new(), true);

        let null_value = Value::Object(Object::new(Rc::clone(&null), Payload::Null));
        let true_value = Value::Object(Object::new(Rc::clone(&bool), Payload::Bool(true)));
        let false_value = Value::Object(Object::new(Rc::clone(&bool), Payload::Bool(false)));

        Self {
            object,
            null,
            int,
            float,
            decimal,
            bool,
            str,
            list,
            dict,
            range,
            enumerator,
            function,
            type_,
            exception,
            errors,
            json5,
            null_value,
            true_value,
            false_value,
        }
    }

    fn populate(&self) {
        primitives::populate(self);
        collections::populate(self);
        exceptions::populate(self);
        crate::operators::install(self);
        crate::json5::install(self);
        // Parents are flattened before their children.
        for class in self.classes().into_iter().skip(1) {
            class.flatten();
        }
    }

    /// Every global built-in class, parents before children.
    pub fn classes(&self) -> Vec<ClassRef> {
        let mut classes = vec![
            Rc::clone(&self.object),
            Rc::clone(&self.null),
            Rc::clone(&self.int),
            Rc::clone(&self.float),
            Rc::clone(&self.decimal),
            Rc::clone(&self.bool),
            Rc::clone(&self.str),
            Rc::clone(&self.list),
            Rc::clone(&self.dict),
            Rc::clone(&self.range),
            Rc::clone(&self.enumerator),
            Rc::clone(&self.function),
            Rc::clone(&self.type_),
            Rc::clone(&self.exception),
        ];
        classes.extend(self.errors.iter().map(|(_, class)| Rc::clone(class)));
        classes.push(Rc::clone(&self.json5));
        classes
    }

    pub fn error_class(&self, kind: ErrorKind) -> ClassRef {
        self.errors
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, class)| Rc::clone(class))
            .unwrap_or_else(|| Rc::clone(&self.exception))
    }
}

/// Binds the built-in classes and global functions into `scope`.
pub fn install_globals(scope: &ScopeRef) {
    let builtins = builtins();
    let mut scope = scope.borrow_mut();
    for class in builtins.classes() {
        scope.define_class(&class.name.clone(), class);
    }
    scope.define_function(Rc::new(Function::native(
        "print",
        vec![Parameter::variadic("values")],
        |interpreter, invocation| write_values(interpreter, &invocation, false),
    )));
    scope.define_function(Rc::new(Function::native(
        "println",
        vec![Parameter::variadic("values")],
        |interpreter, invocation| write_values(interpreter, &invocation, true),
    )));
    scope.define_function(Rc::new(Function::native(
        "typeof",
        vec![Parameter::any("value")],
        |_, invocation| Ok(Value::Class(invocation.arg(0)?.class())),
    )));
    scope.define_function(Rc::new(Function::native(
        "len",
        vec![Parameter::any("value")],
        |_, invocation| length_of(invocation.arg(0)?).map(Value::int),
    )));
}

fn write_values(interpreter: &mut Interpreter, invocation: &Invocation, newline: bool) -> Result<Value> {
    let values = invocation.arg(0)?.list_items().unwrap_or_default();
    let mut parts = Vec::with_capacity(values.len());
    for value in &values {
        parts.push(interpreter.stringify(value)?);
    }
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", parts.join(" "))?;
    if newline {
        writeln!(stdout)?;
    }
    stdout.flush()?;
    Ok(Value::null())
}

pub(crate) fn length_of(value: &Value) -> Result<i64> {
    let length = value.with_payload(|payload| match payload {
        Payload::Str(text) => Some(text.chars().count()),
        Payload::List(items) => Some(items.len()),
        Payload::Dict(entries) => Some(entries.len()),
        Payload::Range(range) => Some(range.len()),
        _ => None,
    });
    match length.flatten() {
        Some(length) => Ok(length as i64),
        None => fail(
            ErrorKind::TypeMismatch,
            format!("`{}` has no length", value.type_name()),
        ),
    }
}

fn owned(class: &ClassRef, mut function: Function, is_static: bool) -> Rc<Function> {
    function.owner = Some(Rc::downgrade(class));
    function.is_static = is_static;
    Rc::new(function)
}

/// Defines an instance method implemented in Rust.
pub(crate) fn method<F>(class: &ClassRef, name: &str, params: Vec<Parameter>, callback: F)
where
    F: Fn(&mut Interpreter, Invocation) -> Result<Value> + 'static,
{
    let function = owned(class, Function::native(name, params, callback), false);
    class.scope.borrow_mut().define_function(function);
}

pub(crate) fn static_method<F>(class: &ClassRef, name: &str, params: Vec<Parameter>, callback: F)
where
    F: Fn(&mut Interpreter, Invocation) -> Result<Value> + 'static,
{
    let function = owned(class, Function::native(name, params, callback), true);
    class.scope.borrow_mut().define_function(function);
}

/// Defines the conversion constructor of a built-in class, e.g. `int("4")`.
pub(crate) fn constructor<F>(class: &ClassRef, params: Vec<Parameter>, callback: F)
where
    F: Fn(&mut Interpreter, Invocation) -> Result<Value> + 'static,
{
    static_method(class, &class.name.clone(), params, callback);
    class.set_native_construct();
}

/// Defines a read-only instance property.
pub(crate) fn property<F>(class: &ClassRef, name: &str, getter: F)
where
    F: Fn(&mut Interpreter, Invocation) -> Result<Value> + 'static,
{
    let get = owned(class, Function::native(name, Vec::new(), getter), false);
    let mut set = FunctionSet::new(name);
    set.add(get);
    class.scope.borrow_mut().set_variable(
        name,
        Variable {
            storage: Storage::Accessor {
                get: Some(set),
                set: None,
            },
            owner: Some(Rc::downgrade(class)),
            ..Variable::slot(Value::null())
        },
    );
}

pub(crate) fn receiver_object(invocation: &Invocation) -> Result<ObjectRef> {
    match invocation.receiver()? {
        Value::Object(object) => Ok(Rc::clone(object)),
        other => fail(
            ErrorKind::TypeMismatch,
            format!("expected an instance, found {}", other.type_name()),
        ),
    }
}
