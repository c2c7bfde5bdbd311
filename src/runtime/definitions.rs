//! Function, class and enum definitions.

use std::rc::Rc;

use tracing::debug;

use super::Interpreter;
use crate::{
    ast::{ClassDecl, EnumDecl, FunctionDecl, Stmt, StmtKind, TypeExpr},
    class::{Class, ClassRef, ClassSpec, FieldInit},
    diagnostics::{fail, ErrorKind, Result},
    function::{Body, Function, FunctionSet, Parameter},
    scope::{Binding, Scope, ScopeRef, Storage, Variable},
    stdlib::builtins,
    value::Value,
};

impl Interpreter {
    /// Resolves a class name visible from the current scope.
    pub(crate) fn resolve_class(&self, name: &str) -> Result<ClassRef> {
        if name == "null" {
            return Ok(Rc::clone(&builtins().null));
        }
        match Scope::lookup(&self.scope, name).map(|found| found.binding) {
            Some(Binding::Class(class)) => Ok(class),
            Some(_) => fail(
                ErrorKind::TypeMismatch,
                format!("`{name}` is not a class"),
            ),
            None => fail(ErrorKind::UndefinedName, format!("unknown type `{name}`")),
        }
    }

    pub(crate) fn resolve_type(&self, annotation: &TypeExpr) -> Result<Vec<ClassRef>> {
        annotation
            .names
            .iter()
            .map(|name| self.resolve_class(name))
            .collect()
    }

    /// Builds a script function. Parameter types and defaults are evaluated
    /// once, in the defining scope.
    pub(crate) fn build_function(
        &mut self,
        decl: &FunctionDecl,
        owner: Option<&ClassRef>,
        closure: ScopeRef,
    ) -> Result<Function> {
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let accepted = match &param.annotation {
                Some(annotation) => Some(
                    self.resolve_type(annotation)
                        .map_err(|err| err.at(param.span))?,
                ),
                None => None,
            };
            let default = match &param.default {
                Some(expr) => Some(self.evaluate(expr)?),
                None => None,
            };
            params.push(Parameter {
                name: param.name.clone(),
                accepted,
                default,
                variadic: param.variadic,
            });
        }
        Ok(Function {
            name: decl.name.clone(),
            params,
            is_static: decl.modifiers.is_static,
            accessibility: decl.modifiers.accessibility.unwrap_or_default(),
            owner: owner.map(Rc::downgrade),
            body: Body::Script {
                body: Rc::clone(&decl.body),
                closure,
            },
            span: decl.span,
        })
    }

    pub(crate) fn define_function(&mut self, decl: &FunctionDecl) -> Result<()> {
        let function = self.build_function(decl, None, Rc::clone(&self.scope))?;
        self.scope.borrow_mut().define_function(Rc::new(function));
        Ok(())
    }

    /// An anonymous `fn (...) { ... }` capturing the current scope.
    pub(crate) fn lambda(&mut self, decl: &FunctionDecl) -> Result<Value> {
        let function = self.build_function(decl, None, Rc::clone(&self.scope))?;
        Ok(Value::function(FunctionSet::single(function)))
    }

    pub(crate) fn define_class(&mut self, decl: &ClassDecl) -> Result<ClassRef> {
        let is_static = decl.modifiers.is_static;
        let mut supers = Vec::with_capacity(decl.supers.len());
        for name in &decl.supers {
            let parent = self.resolve_class(name)?;
            if parent.is_static && !is_static {
                return fail(
                    ErrorKind::InvalidOperation,
                    format!("`{}` cannot inherit from static class `{name}`", decl.name),
                );
            }
            supers.push(parent);
        }
        if supers.is_empty() && !is_static {
            supers.push(Rc::clone(&builtins().object));
        }

        let class = Class::new(
            ClassSpec {
                name: decl.name.clone(),
                supers,
                is_static,
                accessibility: decl.modifiers.accessibility.unwrap_or_default(),
                ..ClassSpec::default()
            },
            Some(Rc::clone(&self.scope)),
        );
        self.scope
            .borrow_mut()
            .define_class(&decl.name, Rc::clone(&class));

        let class_scope = Rc::clone(&class.scope);
        self.in_scope(class_scope, |this| {
            for stmt in &decl.body {
                this.define_member(&class, stmt)
                    .map_err(|err| err.at(stmt.span))?;
            }
            Ok(())
        })?;
        class.flatten();
        debug!(
            class = %decl.name,
            is_static,
            fields = class.instance_fields().len(),
            "defined class"
        );
        Ok(class)
    }

    /// Evaluates one declaration of a class body with the class scope current.
    fn define_member(&mut self, class: &ClassRef, stmt: &Stmt) -> Result<()> {
        let owner = Some(Rc::downgrade(class));
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                is_const,
                initializer,
                modifiers,
                ..
            } => {
                let accessibility = modifiers.accessibility.unwrap_or_default();
                if modifiers.is_static || *is_const || class.is_static {
                    let value = match initializer {
                        Some(expr) => self.evaluate(expr)?,
                        None => Value::null(),
                    };
                    self.scope.borrow_mut().define_variable(
                        name,
                        Variable {
                            storage: Storage::Slot(value),
                            is_const: *is_const,
                            is_static: true,
                            accessibility,
                            owner,
                        },
                    )
                } else {
                    if class.instance_fields().iter().any(|field| &field.name == name) {
                        return fail(
                            ErrorKind::DuplicateDefinition,
                            format!("`{}` already declares a field `{name}`", class.name),
                        );
                    }
                    class.add_field(FieldInit {
                        name: name.clone(),
                        initializer: initializer.clone(),
                        is_const: false,
                        accessibility,
                        owner: Rc::downgrade(class),
                    });
                    Ok(())
                }
            }
            StmtKind::Property {
                name,
                getter,
                setter,
                modifiers,
            } => {
                let is_static = modifiers.is_static || class.is_static;
                let accessor = |body: &Rc<[Stmt]>, params: Vec<Parameter>| {
                    FunctionSet::single(Function {
                        name: name.clone(),
                        params,
                        is_static,
                        accessibility: modifiers.accessibility.unwrap_or_default(),
                        owner: Some(Rc::downgrade(class)),
                        body: Body::Script {
                            body: Rc::clone(body),
                            closure: Rc::clone(&class.scope),
                        },
                        span: stmt.span,
                    })
                };
                let get = getter.as_ref().map(|body| accessor(body, Vec::new()));
                let set = setter
                    .as_ref()
                    .map(|body| accessor(body, vec![Parameter::any("value")]));
                self.scope.borrow_mut().define_variable(
                    name,
                    Variable {
                        storage: Storage::Accessor { get, set },
                        is_const: false,
                        is_static,
                        accessibility: modifiers.accessibility.unwrap_or_default(),
                        owner,
                    },
                )
            }
            StmtKind::Function(decl) => {
                let mut function =
                    self.build_function(decl, Some(class), Rc::clone(&class.scope))?;
                if class.is_static {
                    function.is_static = true;
                }
                class.scope.borrow_mut().define_function(Rc::new(function));
                Ok(())
            }
            StmtKind::Class(decl) => self.define_class(decl).map(|_| ()),
            StmtKind::Enum(decl) => self.define_enum(decl).map(|_| ()),
            _ => fail(
                ErrorKind::InvalidOperation,
                format!("unexpected statement in the body of class `{}`", class.name),
            ),
        }
    }

    /// `enum Color { Red, Green = 5 }`: a static class of constant ints.
    /// Unvalued members continue from the previous value.
    pub(crate) fn define_enum(&mut self, decl: &EnumDecl) -> Result<ClassRef> {
        let class = Class::new(
            ClassSpec {
                name: decl.name.clone(),
                is_static: true,
                accessibility: decl.modifiers.accessibility.unwrap_or_default(),
                ..ClassSpec::default()
            },
            Some(Rc::clone(&self.scope)),
        );
        let mut next = 0i64;
        for (name, value) in &decl.variants {
            let number = match value {
                Some(expr) => self
                    .evaluate(expr)?
                    .expect_int()
                    .map_err(|err| err.at(expr.span))?,
                None => next,
            };
            next = number.wrapping_add(1);
            class.scope.borrow_mut().define_variable(
                name,
                Variable {
                    is_static: true,
                    owner: Some(Rc::downgrade(&class)),
                    ..Variable::constant(Value::int(number))
                },
            )?;
        }
        self.scope
            .borrow_mut()
            .define_class(&decl.name, Rc::clone(&class));
        debug!(name = %decl.name, members = decl.variants.len(), "defined enum");
        Ok(class)
    }
}
