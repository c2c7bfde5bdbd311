use indexmap::IndexMap;

use super::{ensure_stack, Interpreter};
use crate::{
    ast::{Argument, BinaryOp, Expr, ExprKind, InterpolationPart, Literal},
    class::Operator,
    diagnostics::{fail, ErrorKind, Result, SourceSpan},
    function::CallArgs,
    scope::Scope,
    value::{RangeValue, Value, ValueKey},
};

/// An assignable location, resolved once so compound assignment evaluates
/// its target and index expressions a single time.
enum Reference {
    Variable(String),
    Member { target: Value, name: String },
    Index { target: Value, index: Value },
}

impl Interpreter {
    pub(crate) fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        ensure_stack(|| self.evaluate_kind(expr)).map_err(|err| err.at(expr.span))
    }

    fn evaluate_kind(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Interpolated(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        InterpolationPart::Text(chunk) => text.push_str(chunk),
                        InterpolationPart::Expr(inner) => {
                            let value = self.evaluate(inner)?;
                            text.push_str(&self.stringify(&value)?);
                        }
                    }
                }
                Ok(Value::string(text))
            }
            ExprKind::Variable(name) => self.get_variable(name),
            ExprKind::This => match Scope::current_object(&self.scope) {
                Some(object) => Ok(Value::Object(object)),
                None => fail(ErrorKind::InvalidOperation, "`this` used outside an instance"),
            },
            ExprKind::Super(name) => self.get_super_member(name),
            ExprKind::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                if let (BinaryOp::And | BinaryOp::Or, Some(flag)) = (op, left.as_bool()) {
                    if (*op == BinaryOp::And) != flag {
                        return Ok(Value::bool(flag));
                    }
                }
                let right = self.evaluate(right)?;
                self.binary_op(Operator::from_binary(*op), &left, &right, expr.span)
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.evaluate(operand)?;
                self.unary_op(Operator::from_unary(*op), &value, expr.span)
            }
            ExprKind::Assign { target, op, value } => {
                let reference = self.reference(target)?;
                let value = match op {
                    Some(op) => {
                        let current = self.read_reference(&reference, target.span)?;
                        let operand = self.evaluate(value)?;
                        self.binary_op(Operator::from_binary(*op), &current, &operand, expr.span)?
                    }
                    None => self.evaluate(value)?,
                };
                self.write_reference(reference, value.clone(), target.span)?;
                Ok(value)
            }
            ExprKind::Call { callee, args } => {
                let callee = self.evaluate(callee)?;
                let args = self.call_args(args)?;
                self.call_value(&callee, args, expr.span)
            }
            ExprKind::ListLiteral(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::DictLiteral(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.evaluate(key)?;
                    let value = self.evaluate(value)?;
                    map.insert(ValueKey::from_value(&key), value);
                }
                Ok(Value::dict(map))
            }
            ExprKind::Range { start, end } => {
                let start = self.evaluate(start)?;
                let end = self.evaluate(end)?;
                match (start.as_int(), end.as_int()) {
                    (Some(start), Some(end)) => Ok(Value::range(RangeValue::new(start, end, 1))),
                    _ => fail(
                        ErrorKind::TypeMismatch,
                        format!(
                            "range bounds must be int, found `{}` and `{}`",
                            start.type_name(),
                            end.type_name()
                        ),
                    ),
                }
            }
            ExprKind::Group(inner) => self.evaluate(inner),
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                self.apply_operator(Operator::Index, &target, &[index], expr.span)
            }
            ExprKind::Member { target, name } => {
                let target = self.evaluate(target)?;
                self.get_member(&target, name, expr.span)
            }
            ExprKind::Lambda(decl) => self.lambda(decl),
        }
    }

    fn call_args(&mut self, args: &[Argument]) -> Result<CallArgs> {
        let mut call_args = CallArgs::default();
        for arg in args {
            let value = self.evaluate(&arg.value)?;
            match &arg.name {
                Some(name) => call_args.named.push((name.clone(), value)),
                None => call_args.positional.push(value),
            }
        }
        Ok(call_args)
    }

    fn reference(&mut self, target: &Expr) -> Result<Reference> {
        match &target.kind {
            ExprKind::Variable(name) => Ok(Reference::Variable(name.clone())),
            ExprKind::Member { target, name } => Ok(Reference::Member {
                target: self.evaluate(target)?,
                name: name.clone(),
            }),
            ExprKind::Index { target, index } => Ok(Reference::Index {
                target: self.evaluate(target)?,
                index: self.evaluate(index)?,
            }),
            ExprKind::Group(inner) => self.reference(inner),
            ExprKind::Super(_) => fail(
                ErrorKind::InvalidOperation,
                "cannot assign through `super`",
            ),
            _ => fail(ErrorKind::InvalidOperation, "invalid assignment target"),
        }
    }

    fn read_reference(&mut self, reference: &Reference, span: SourceSpan) -> Result<Value> {
        match reference {
            Reference::Variable(name) => self.get_variable(name),
            Reference::Member { target, name } => self.get_member(target, name, span),
            Reference::Index { target, index } => {
                self.apply_operator(Operator::Index, target, std::slice::from_ref(index), span)
            }
        }
    }

    fn write_reference(&mut self, reference: Reference, value: Value, span: SourceSpan) -> Result<()> {
        match reference {
            Reference::Variable(name) => self.assign_variable(&name, value),
            Reference::Member { target, name } => self.set_member(&target, &name, value, span),
            Reference::Index { target, index } => self
                .apply_operator(Operator::IndexSet, &target, &[index, value], span)
                .map(|_| ()),
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(n) => Value::int(*n),
        Literal::Float(n) => Value::float(*n),
        Literal::Decimal(n) => Value::decimal(*n),
        Literal::Bool(flag) => Value::bool(*flag),
        Literal::String(text) => Value::string(text),
        Literal::Null => Value::null(),
    }
}
