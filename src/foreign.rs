//! Host-defined classes. A [`ForeignClass`] registered with
//! [`Interpreter::register_foreign_class`] becomes a global class whose
//! instances carry a [`ForeignObject`] payload; member reads, writes and
//! method calls on those instances are forwarded to it.

use std::rc::Rc;

use crate::{
    diagnostics::{fail, ErrorKind, Result},
    function::{Function, FunctionSet, Parameter},
    runtime::Interpreter,
    value::Value,
};

pub trait ForeignClass {
    fn name(&self) -> &str;

    /// Called when a script constructs the class.
    fn create(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Rc<dyn ForeignObject>>;
}

pub trait ForeignObject {
    fn type_name(&self) -> &str;

    /// Reads a property. `None` means the object has no such property.
    fn get_member(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Writes a property. Returns `Ok(false)` if the property is unknown.
    fn set_member(&self, _name: &str, _value: Value) -> Result<bool> {
        Ok(false)
    }

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn invoke(&self, _interpreter: &mut Interpreter, name: &str, _args: Vec<Value>) -> Result<Value> {
        fail(
            ErrorKind::UndefinedName,
            format!("`{}` has no method `{name}`", self.type_name()),
        )
    }
}

/// Wraps a foreign method as a callable overload set accepting any arguments.
pub(crate) fn method_set(object: Rc<dyn ForeignObject>, name: &str) -> FunctionSet {
    let method = name.to_string();
    FunctionSet::single(Function::native(
        name,
        vec![Parameter::variadic("args")],
        move |interpreter, invocation| {
            let args = invocation
                .args
                .first()
                .and_then(Value::list_items)
                .unwrap_or_default();
            object.invoke(interpreter, &method, args)
        },
    ))
}
