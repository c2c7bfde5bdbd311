use std::rc::Rc;

use super::{ensure_stack, FlowControl, Interpreter};
use crate::{
    ast::{CatchClause, Expr, Stmt, StmtKind, SwitchCase, TypeExpr},
    diagnostics::{fail, ErrorKind, Result, SourceSpan},
    function::CallArgs,
    scope::{Scope, Variable},
    value::{Payload, Value},
};

impl Interpreter {
    pub(crate) fn execute_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        ensure_stack(|| self.execute_kind(stmt)).map_err(|err| err.at(stmt.span))
    }

    fn execute_kind(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        match &stmt.kind {
            StmtKind::VarDecl {
                name,
                is_const,
                annotation,
                initializer,
                modifiers,
            } => {
                let value = match initializer {
                    Some(expr) => {
                        let value = self.evaluate(expr)?;
                        if let Some(annotation) = annotation {
                            self.check_annotation(name, annotation, &value)?;
                        }
                        value
                    }
                    None => Value::null(),
                };
                let variable = Variable {
                    is_const: *is_const,
                    accessibility: modifiers.accessibility.unwrap_or_default(),
                    ..Variable::slot(value)
                };
                self.scope.borrow_mut().define_variable(name, variable)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Function(decl) => {
                self.define_function(decl)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Class(decl) => {
                self.define_class(decl)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Enum(decl) => {
                self.define_enum(decl)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Property { name, .. } => fail(
                ErrorKind::InvalidOperation,
                format!("property `{name}` declared outside a class"),
            ),
            StmtKind::Import { path, form } => {
                self.import(path, form)?;
                Ok(FlowControl::Next)
            }
            StmtKind::Expr(expr) => {
                let value = self.evaluate(expr)?;
                Ok(FlowControl::NextValue(value))
            }
            StmtKind::Block(statements) => self.execute_block(statements),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.condition(condition)? {
                    self.execute_block(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_block(branch)
                } else {
                    Ok(FlowControl::Next)
                }
            }
            StmtKind::While { condition, body } => {
                while self.condition(condition)? {
                    match self.execute_block(body)? {
                        FlowControl::Next | FlowControl::NextValue(_) | FlowControl::Continue => {}
                        FlowControl::Break => break,
                        FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let iterable_value = self.evaluate(iterable)?;
                let enumerator = self.enumerator_of(&iterable_value, iterable.span)?;
                while self.move_next(&enumerator, iterable.span)? {
                    let item = self.current(&enumerator, iterable.span)?;
                    let child = Scope::block(&self.scope);
                    child.borrow_mut().set_variable(binding, Variable::slot(item));
                    match self.in_scope(child, |this| this.execute_statements(body))? {
                        FlowControl::Next | FlowControl::NextValue(_) | FlowControl::Continue => {}
                        FlowControl::Break => break,
                        FlowControl::Return(value) => return Ok(FlowControl::Return(value)),
                    }
                }
                Ok(FlowControl::Next)
            }
            StmtKind::Switch {
                subject,
                cases,
                default,
            } => {
                let subject = self.evaluate(subject)?;
                let branch = match self.matching_case(&subject, cases)? {
                    Some(case) => Some(&case.body),
                    None => default.as_ref(),
                };
                match branch {
                    Some(body) => match self.execute_block(body)? {
                        FlowControl::Break => Ok(FlowControl::Next),
                        other => Ok(other),
                    },
                    None => Ok(FlowControl::Next),
                }
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => self.execute_try(body, catches, finally.as_deref()),
            StmtKind::Throw(expr) => {
                let value = self.evaluate(expr)?;
                Err(self.throw_value(value, stmt.span))
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::null(),
                };
                Ok(FlowControl::Return(value))
            }
            StmtKind::Break => Ok(FlowControl::Break),
            StmtKind::Continue => Ok(FlowControl::Continue),
        }
    }

    /// Runs `statements` in a fresh block scope.
    pub(crate) fn execute_block(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let child = Scope::block(&self.scope);
        self.in_scope(child, |this| this.execute_statements(statements))
    }

    /// Runs `statements` in the current scope, stopping at the first
    /// non-sequential flow.
    fn execute_statements(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let mut last_value: Option<Value> = None;
        for stmt in statements {
            match self.execute_statement(stmt)? {
                FlowControl::Next => {}
                FlowControl::NextValue(value) => last_value = Some(value),
                other => return Ok(other),
            }
        }
        Ok(match last_value {
            Some(value) => FlowControl::NextValue(value),
            None => FlowControl::Next,
        })
    }

    fn condition(&mut self, expr: &Expr) -> Result<bool> {
        Ok(self.evaluate(expr)?.is_truthy())
    }

    /// `var x: T = value` accepts exactly the listed classes.
    fn check_annotation(&mut self, name: &str, annotation: &TypeExpr, value: &Value) -> Result<()> {
        let accepted = self.resolve_type(annotation)?;
        let class = value.class();
        if accepted.iter().any(|candidate| Rc::ptr_eq(candidate, &class)) {
            return Ok(());
        }
        fail(
            ErrorKind::TypeMismatch,
            format!(
                "cannot initialize `{name}: {}` with a value of type `{}`",
                annotation.names.join("|"),
                class.name
            ),
        )
    }

    fn matching_case<'a>(
        &mut self,
        subject: &Value,
        cases: &'a [SwitchCase],
    ) -> Result<Option<&'a SwitchCase>> {
        for case in cases {
            for expr in &case.values {
                let candidate = self.evaluate(expr)?;
                if self.values_equal(subject, &candidate)? {
                    return Ok(Some(case));
                }
            }
        }
        Ok(None)
    }

    fn enumerator_of(&mut self, iterable: &Value, span: SourceSpan) -> Result<Value> {
        let method = match self.get_member(iterable, "GetEnumerator", span) {
            Err(err) if err.kind() == Some(ErrorKind::UndefinedName) => {
                return fail(
                    ErrorKind::NotEnumerable,
                    format!("a value of type `{}` is not enumerable", iterable.type_name()),
                );
            }
            other => other?,
        };
        self.call_value(&method, CallArgs::default(), span)
    }

    fn move_next(&mut self, enumerator: &Value, span: SourceSpan) -> Result<bool> {
        if let Some(object) = enumerator.as_object() {
            if let Payload::Enumerator(state) = &mut *object.payload_mut() {
                return Ok(state.move_next());
            }
        }
        Ok(self.call_member(enumerator, "MoveNext", span)?.is_truthy())
    }

    fn current(&mut self, enumerator: &Value, span: SourceSpan) -> Result<Value> {
        if let Some(object) = enumerator.as_object() {
            if let Payload::Enumerator(state) = &*object.payload() {
                return Ok(state.current().unwrap_or_else(Value::null));
            }
        }
        self.get_member(enumerator, "Current", span)
    }

    /// `finally` runs once whichever way the body and handler finish; its own
    /// `return`, `break`, `continue` or error replaces the pending outcome.
    /// Fatal errors skip both handlers and `finally`.
    fn execute_try(
        &mut self,
        body: &[Stmt],
        catches: &[CatchClause],
        finally: Option<&[Stmt]>,
    ) -> Result<FlowControl> {
        let outcome = match self.execute_block(body) {
            Err(err) => match self.caught_value(&err)? {
                Some(thrown) => match self.matching_catch(&thrown, catches)? {
                    Some(clause) => self.run_catch(clause, thrown),
                    None => Err(err),
                },
                None => return Err(err),
            },
            ok => ok,
        };
        if let Err(err) = &outcome {
            if err.kind().is_some_and(|kind| kind.is_fatal()) {
                return outcome;
            }
        }
        let Some(finally) = finally else {
            return outcome;
        };
        match self.execute_block(finally)? {
            FlowControl::Next | FlowControl::NextValue(_) => outcome,
            superseding => Ok(superseding),
        }
    }

    fn matching_catch<'a>(
        &mut self,
        thrown: &Value,
        catches: &'a [CatchClause],
    ) -> Result<Option<&'a CatchClause>> {
        let class = thrown.class();
        for clause in catches {
            let Some(annotation) = &clause.class else {
                return Ok(Some(clause));
            };
            let accepted = self
                .resolve_type(annotation)
                .map_err(|err| err.at(clause.span))?;
            if accepted.iter().any(|candidate| class.is_subclass_of(candidate)) {
                return Ok(Some(clause));
            }
        }
        Ok(None)
    }

    fn run_catch(&mut self, clause: &CatchClause, thrown: Value) -> Result<FlowControl> {
        let child = Scope::block(&self.scope);
        if let Some(binding) = &clause.binding {
            child.borrow_mut().set_variable(binding, Variable::slot(thrown));
        }
        self.in_scope(child, |this| this.execute_statements(&clause.body))
    }
}
