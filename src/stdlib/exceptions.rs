use std::rc::Rc;

use super::{receiver_object, BuiltinClasses};
use crate::{
    ast::{Expr, ExprKind, Literal},
    class::{ClassRef, FieldInit},
    diagnostics::{ErrorKind, Result},
    function::{Function, Parameter},
    runtime::Interpreter,
    scope::Accessibility,
    value::Value,
};

pub(super) fn populate(b: &BuiltinClasses) {
    let exception = &b.exception;
    field(exception, "Message", Literal::String(String::new()));
    field(exception, "Line", Literal::Int(0));
    constructor(exception, &b.str);
    for (_, class) in &b.errors {
        constructor(class, &b.str);
    }

    let mut to_string = Function::native("ToString", Vec::new(), |interpreter, invocation| {
        let object = receiver_object(&invocation)?;
        let message = match object.field("Message") {
            Some(message) => interpreter.stringify(&message)?,
            None => String::new(),
        };
        Ok(Value::string(format!("{}: {message}", object.class.name)))
    });
    to_string.owner = Some(Rc::downgrade(exception));
    exception.scope.borrow_mut().define_function(Rc::new(to_string));
}

fn field(class: &ClassRef, name: &str, literal: Literal) {
    class.add_field(FieldInit {
        name: name.to_string(),
        initializer: Some(Expr {
            kind: ExprKind::Literal(literal),
            span: Default::default(),
        }),
        is_const: false,
        accessibility: Accessibility::Public,
        owner: Rc::downgrade(class),
    });
}

/// `Name(message = "")`: stores the message on the new instance.
fn constructor(class: &ClassRef, str_class: &ClassRef) {
    let mut function = Function::native(
        class.name.clone(),
        vec![Parameter::typed("message", &[str_class]).with_default(Value::string(""))],
        |_, invocation| {
            let object = receiver_object(&invocation)?;
            object.set_field("Message", invocation.arg(0)?.clone());
            Ok(Value::null())
        },
    );
    function.owner = Some(Rc::downgrade(class));
    class.scope.borrow_mut().define_function(Rc::new(function));
}

/// Builds the exception object scripts see when they catch a runtime error.
pub(crate) fn error_object(
    interpreter: &mut Interpreter,
    kind: ErrorKind,
    message: &str,
    line: Option<usize>,
) -> Result<Value> {
    let class = super::builtins().error_class(kind);
    let object = interpreter.instantiate(&class)?;
    object.set_field("Message", Value::string(message));
    object.set_field("Line", Value::int(line.unwrap_or(0) as i64));
    Ok(Value::Object(object))
}
