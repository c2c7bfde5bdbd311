//! Name and member resolution: unqualified names, `target.member`,
//! `super.member` and the read/write paths of slot and accessor variables.

use std::rc::Rc;

use super::Interpreter;
use crate::{
    class::ClassRef,
    diagnostics::{fail, CorvidError, ErrorKind, Result, SourceSpan},
    foreign,
    function::CallArgs,
    scope::{Binding, Scope, ScopeKind, ScopeRef, Storage, Variable},
    stdlib::builtins,
    value::Value,
};

impl Interpreter {
    fn check_access(&self, name: &str, variable: &Variable) -> Result<()> {
        let owner = variable.owner();
        if Scope::can_access(&self.scope, variable.accessibility, owner.as_ref()) {
            return Ok(());
        }
        let owner_name = owner.map(|class| class.name.clone()).unwrap_or_default();
        fail(
            ErrorKind::AccessDenied,
            format!("`{name}` is {} in `{owner_name}`", variable.accessibility),
        )
    }

    fn current_receiver(&self) -> Option<Value> {
        Scope::current_object(&self.scope).map(Value::Object)
    }

    fn read_variable(&mut self, name: &str, variable: &Variable, receiver: Option<Value>) -> Result<Value> {
        match &variable.storage {
            Storage::Slot(value) => Ok(value.clone()),
            Storage::Accessor { get: Some(getter), .. } => {
                let getter = getter.bind(receiver);
                let value = Value::function(getter);
                self.call_value(&value, CallArgs::default(), SourceSpan::default())
            }
            Storage::Accessor { get: None, .. } => fail(
                ErrorKind::InvalidOperation,
                format!("property `{name}` is write-only"),
            ),
        }
    }

    fn write_variable(
        &mut self,
        scope: &ScopeRef,
        name: &str,
        variable: &Variable,
        value: Value,
        receiver: Option<Value>,
    ) -> Result<()> {
        if variable.is_const {
            return fail(
                ErrorKind::InvalidOperation,
                format!("cannot assign to constant `{name}`"),
            );
        }
        match &variable.storage {
            Storage::Slot(_) => {
                scope.borrow_mut().assign_slot(name, value);
                Ok(())
            }
            Storage::Accessor { set: Some(setter), .. } => {
                let setter = Value::function(setter.bind(receiver));
                self.call_value(&setter, CallArgs::positional(vec![value]), SourceSpan::default())?;
                Ok(())
            }
            Storage::Accessor { set: None, .. } => fail(
                ErrorKind::InvalidOperation,
                format!("property `{name}` is read-only"),
            ),
        }
    }

    /// Resolves an unqualified name from the current scope.
    pub(crate) fn get_variable(&mut self, name: &str) -> Result<Value> {
        let Some(found) = Scope::lookup(&self.scope, name) else {
            return fail(ErrorKind::UndefinedName, format!("`{name}` is not defined"));
        };
        match found.binding {
            Binding::Class(class) => Ok(Value::Class(class)),
            Binding::Functions(set) => {
                let class = match found.scope.borrow().kind() {
                    ScopeKind::Class(class) => class.upgrade(),
                    _ => None,
                };
                match class {
                    // Inside a class body its own name means the class, not the constructor.
                    Some(class) if class.name == name => Ok(Value::Class(class)),
                    Some(_) => Ok(Value::function(set.bind(self.current_receiver()))),
                    None => Ok(Value::function(set)),
                }
            }
            Binding::Variable(variable) => {
                self.check_access(name, &variable)?;
                let receiver = self.current_receiver();
                self.read_variable(name, &variable, receiver)
            }
        }
    }

    pub(crate) fn assign_variable(&mut self, name: &str, value: Value) -> Result<()> {
        let Some(found) = Scope::lookup(&self.scope, name) else {
            return fail(ErrorKind::UndefinedName, format!("`{name}` is not defined"));
        };
        match found.binding {
            Binding::Class(_) => fail(
                ErrorKind::InvalidOperation,
                format!("cannot assign to class `{name}`"),
            ),
            Binding::Functions(_) => fail(
                ErrorKind::InvalidOperation,
                format!("cannot assign to function `{name}`"),
            ),
            Binding::Variable(variable) => {
                self.check_access(name, &variable)?;
                let receiver = self.current_receiver();
                self.write_variable(&found.scope, name, &variable, value, receiver)
            }
        }
    }

    /// Looks `name` up among the members of a class scope, binding
    /// functions and accessors to `receiver`.
    fn class_member(
        &mut self,
        class: &ClassRef,
        name: &str,
        receiver: Option<Value>,
    ) -> Result<Option<Value>> {
        let binding = class.scope.borrow().local(name);
        match binding {
            None => Ok(None),
            Some(Binding::Class(nested)) => {
                if !Scope::can_access(&self.scope, nested.accessibility, Some(class)) {
                    return fail(
                        ErrorKind::AccessDenied,
                        format!("class `{name}` is {} in `{}`", nested.accessibility, class.name),
                    );
                }
                Ok(Some(Value::Class(nested)))
            }
            Some(Binding::Functions(set)) => Ok(Some(Value::function(set.bind(receiver)))),
            Some(Binding::Variable(variable)) => {
                self.check_access(name, &variable)?;
                self.read_variable(name, &variable, receiver).map(Some)
            }
        }
    }

    /// `target.name`
    pub fn get_member(&mut self, target: &Value, name: &str, span: SourceSpan) -> Result<Value> {
        let found = match target {
            Value::Class(class) => match self.class_member(class, name, None)? {
                Some(value) => Some(value),
                None => self.class_member(&builtins().type_, name, Some(target.clone()))?,
            },
            Value::FunctionSet(_) => {
                self.class_member(&builtins().function, name, Some(target.clone()))?
            }
            Value::Object(object) => {
                let field = object
                    .scope()
                    .and_then(|scope| scope.borrow().variable(name).cloned());
                match field {
                    Some(variable) => {
                        self.check_access(name, &variable)?;
                        Some(self.read_variable(name, &variable, Some(target.clone()))?)
                    }
                    None => match self.class_member(&object.class, name, Some(target.clone()))? {
                        Some(value) => Some(value),
                        None => target.foreign().and_then(|payload| {
                            payload.get_member(name).or_else(|| {
                                payload.has_method(name).then(|| {
                                    Value::function(foreign::method_set(Rc::clone(&payload), name))
                                })
                            })
                        }),
                    },
                }
            }
        };
        match found {
            Some(value) => Ok(value),
            None => Err(CorvidError::runtime(
                ErrorKind::UndefinedName,
                format!("`{}` has no member `{name}`", describe(target)),
            )
            .at(span)),
        }
    }

    /// `target.name = value`
    pub fn set_member(&mut self, target: &Value, name: &str, value: Value, span: SourceSpan) -> Result<()> {
        let result = match target {
            Value::Object(object) => {
                let field = object.scope().and_then(|scope| {
                    let variable = scope.borrow().variable(name).cloned()?;
                    Some((Rc::clone(scope), variable))
                });
                if let Some((scope, variable)) = field {
                    self.check_access(name, &variable)?;
                    return self.write_variable(&scope, name, &variable, value, Some(target.clone()));
                }
                let member = object.class.scope.borrow().variable(name).cloned();
                if let Some(variable) = member {
                    self.check_access(name, &variable)?;
                    let scope = Rc::clone(&object.class.scope);
                    return self.write_variable(&scope, name, &variable, value, Some(target.clone()));
                }
                match target.foreign() {
                    Some(payload) => payload.set_member(name, value)?,
                    None => false,
                }
            }
            Value::Class(class) => {
                let member = class.scope.borrow().variable(name).cloned();
                match member {
                    Some(variable) => {
                        self.check_access(name, &variable)?;
                        let scope = Rc::clone(&class.scope);
                        return self.write_variable(&scope, name, &variable, value, None);
                    }
                    None => false,
                }
            }
            Value::FunctionSet(_) => false,
        };
        if result {
            return Ok(());
        }
        Err(CorvidError::runtime(
            ErrorKind::UndefinedName,
            format!("`{}` has no member `{name}`", describe(target)),
        )
        .at(span))
    }

    /// `super.name` from inside a class body: resolved against the flattened
    /// ancestors of the innermost enclosing class.
    pub(crate) fn get_super_member(&mut self, name: &str) -> Result<Value> {
        let Some(class) = Scope::lexical_classes(&self.scope).into_iter().next() else {
            return fail(ErrorKind::InvalidOperation, "`super` used outside a class");
        };
        let Some(synthetic) = class.synthetic_super() else {
            return fail(
                ErrorKind::UndefinedName,
                format!("`{}` has no super class", class.name),
            );
        };
        let receiver = self.current_receiver();
        match self.class_member(&synthetic, name, receiver)? {
            Some(value) => Ok(value),
            None => fail(
                ErrorKind::UndefinedName,
                format!("no super class of `{}` defines `{name}`", class.name),
            ),
        }
    }

    /// Calls a zero-argument member such as `MoveNext` on `target`.
    pub(crate) fn call_member(&mut self, target: &Value, name: &str, span: SourceSpan) -> Result<Value> {
        let member = self.get_member(target, name, span)?;
        self.call_value(&member, CallArgs::default(), span)
    }
}

fn describe(target: &Value) -> String {
    match target {
        Value::Class(class) => class.name.clone(),
        Value::FunctionSet(set) => format!("fn {}", set.name),
        Value::Object(object) => object.class.name.clone(),
    }
}
