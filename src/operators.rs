//! Operator dispatch and the native operator tables of the built-in classes.
//!
//! A binary or unary operator first looks for a script function named after
//! the operator symbol in the left operand's class, then falls back to the
//! class's native table. Numeric operators promote along
//! int → float → decimal; decimals never narrow implicitly.

use std::{cmp::Ordering, rc::Rc};

use rust_decimal::Decimal;

use crate::{
    class::Operator,
    diagnostics::{fail, CorvidError, ErrorKind, Result, SourceSpan},
    function::CallArgs,
    runtime::Interpreter,
    stdlib::{list_index, BuiltinClasses},
    value::{Payload, Value, ValueKey},
};

/// Upper bound on the length produced by `*` repetition.
const MAX_REPEAT_LEN: usize = 1 << 24;

impl Interpreter {
    pub fn binary_op(&mut self, op: Operator, left: &Value, right: &Value, span: SourceSpan) -> Result<Value> {
        self.apply_operator(op, left, std::slice::from_ref(right), span)
    }

    pub fn unary_op(&mut self, op: Operator, operand: &Value, span: SourceSpan) -> Result<Value> {
        self.apply_operator(op, operand, &[], span)
    }

    /// Runs `op` with `left` as the receiving operand and `rest` as the others.
    pub(crate) fn apply_operator(
        &mut self,
        op: Operator,
        left: &Value,
        rest: &[Value],
        span: SourceSpan,
    ) -> Result<Value> {
        if matches!(op, Operator::Eq | Operator::Ne) {
            if let Some(right) = rest.first() {
                if left.is_null() || right.is_null() {
                    let same = left.ptr_eq(right);
                    return Ok(Value::bool(if op == Operator::Eq { same } else { !same }));
                }
            }
        }

        let class = left.class();
        if let Some(result) = self.script_operator(op.symbol(), left, rest, span)? {
            return Ok(result);
        }
        if op == Operator::Ne {
            if let Some(result) = self.script_operator(Operator::Eq.symbol(), left, rest, span)? {
                return Ok(Value::bool(!result.is_truthy()));
            }
        }
        if op == Operator::Add {
            if let Some(right) = rest.first() {
                if left.as_str().is_some() || right.as_str().is_some() {
                    let text = self.stringify(left)? + &self.stringify(right)?;
                    return Ok(Value::string(text));
                }
            }
        }
        if let Some(native) = class.operator(op) {
            return native(self, left, rest);
        }
        fail(
            ErrorKind::OperatorNotImplemented,
            format!(
                "operator `{}` is not implemented for `{}`",
                op.symbol(),
                class.name
            ),
        )
    }

    fn script_operator(
        &mut self,
        symbol: &str,
        left: &Value,
        rest: &[Value],
        span: SourceSpan,
    ) -> Result<Option<Value>> {
        let class = left.class();
        let Some(set) = class.function(symbol) else {
            return Ok(None);
        };
        let set = set.with_operand_count(rest.len());
        if set.overloads.is_empty() {
            return Ok(None);
        }
        let resolved = set.resolve(CallArgs::positional(rest.to_vec()))?;
        let result = self.invoke(&resolved.function, Some(left.clone()), resolved.args, span)?;
        Ok(Some(result))
    }

    /// Script-level `==`: dispatches through the left operand's class.
    pub fn values_equal(&mut self, left: &Value, right: &Value) -> Result<bool> {
        let result = self.binary_op(Operator::Eq, left, right, SourceSpan::default())?;
        Ok(result.is_truthy())
    }

    /// Orders two values through their `<` and `>` operators.
    /// Floats order totally, so NaN sorts after every other float.
    pub fn compare(&mut self, left: &Value, right: &Value) -> Result<Ordering> {
        if let (Some(Number::Float(a)), Some(Number::Float(b))) = (Number::of(left), Number::of(right)) {
            return Ok(a.total_cmp(&b));
        }
        let span = SourceSpan::default();
        if self.binary_op(Operator::Lt, left, right, span)?.is_truthy() {
            return Ok(Ordering::Less);
        }
        if self.binary_op(Operator::Gt, left, right, span)?.is_truthy() {
            return Ok(Ordering::Greater);
        }
        Ok(Ordering::Equal)
    }
}

fn operand(rest: &[Value]) -> Result<&Value> {
    match rest.first() {
        Some(value) => Ok(value),
        None => fail(ErrorKind::InvalidOperation, "operator expects an operand"),
    }
}

fn operands(rest: &[Value]) -> Result<(&Value, &Value)> {
    match rest {
        [first, second, ..] => Ok((first, second)),
        _ => fail(ErrorKind::InvalidOperation, "operator expects two operands"),
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
    Decimal(Decimal),
}

impl Number {
    fn of(value: &Value) -> Option<Number> {
        value
            .with_payload(|payload| match payload {
                Payload::Int(n) => Some(Number::Int(*n)),
                Payload::Float(n) => Some(Number::Float(*n)),
                Payload::Decimal(n) => Some(Number::Decimal(*n)),
                _ => None,
            })
            .flatten()
    }

    fn rank(self) -> u8 {
        match self {
            Number::Int(_) => 0,
            Number::Float(_) => 1,
            Number::Decimal(_) => 2,
        }
    }

    fn to_rank(self, rank: u8) -> Result<Number> {
        Ok(match (self, rank) {
            (Number::Int(n), 1) => Number::Float(n as f64),
            (Number::Int(n), 2) => Number::Decimal(Decimal::from(n)),
            (Number::Float(n), 2) => match Decimal::try_from(n) {
                Ok(n) => Number::Decimal(n),
                Err(_) => {
                    return fail(
                        ErrorKind::InvalidOperation,
                        format!("float {n} cannot be represented as a decimal"),
                    )
                }
            },
            (number, _) => number,
        })
    }
}

/// Brings both operands to the wider of their two kinds.
fn promote(left: &Value, right: &Value) -> Result<Option<(Number, Number)>> {
    let (Some(a), Some(b)) = (Number::of(left), Number::of(right)) else {
        return Ok(None);
    };
    let rank = a.rank().max(b.rank());
    Ok(Some((a.to_rank(rank)?, b.to_rank(rank)?)))
}

fn overflow(op: Operator) -> CorvidError {
    CorvidError::runtime(
        ErrorKind::InvalidOperation,
        format!("arithmetic overflow in `{}`", op.symbol()),
    )
}

fn arithmetic(op: Operator, left: &Value, right: &Value) -> Result<Value> {
    let Some(pair) = promote(left, right)? else {
        return fail(
            ErrorKind::TypeMismatch,
            format!(
                "cannot apply `{}` to {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ),
        );
    };
    let by_zero = match pair.1 {
        Number::Int(n) => n == 0,
        Number::Float(n) => n == 0.0,
        Number::Decimal(n) => n.is_zero(),
    };
    if by_zero && matches!(op, Operator::Div | Operator::Mod) {
        return fail(
            ErrorKind::DivisionOrModuloByZero,
            format!("`{}` by zero", op.symbol()),
        );
    }
    match pair {
        (Number::Int(a), Number::Int(b)) => {
            let result = match op {
                Operator::Add => a.checked_add(b),
                Operator::Sub => a.checked_sub(b),
                Operator::Mul => a.checked_mul(b),
                Operator::Div => a.checked_div(b),
                Operator::Mod => a.checked_rem(b),
                _ => None,
            };
            result.map(Value::int).ok_or_else(|| overflow(op))
        }
        (Number::Float(a), Number::Float(b)) => Ok(Value::float(match op {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
            Operator::Div => a / b,
            _ => a % b,
        })),
        (Number::Decimal(a), Number::Decimal(b)) => {
            let result = match op {
                Operator::Add => a.checked_add(b),
                Operator::Sub => a.checked_sub(b),
                Operator::Mul => a.checked_mul(b),
                Operator::Div => a.checked_div(b),
                Operator::Mod => a.checked_rem(b),
                _ => None,
            };
            result.map(Value::decimal).ok_or_else(|| overflow(op))
        }
        _ => fail(ErrorKind::TypeMismatch, "mismatched numeric operands"),
    }
}

fn numeric_order(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    let Some(pair) = promote(left, right)? else {
        return fail(
            ErrorKind::TypeMismatch,
            format!("cannot compare {} with {}", left.type_name(), right.type_name()),
        );
    };
    Ok(match pair {
        (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
        (Number::Float(a), Number::Float(b)) => a.partial_cmp(&b),
        (Number::Decimal(a), Number::Decimal(b)) => Some(a.cmp(&b)),
        _ => None,
    })
}

fn numeric_equal(left: &Value, right: &Value) -> Result<bool> {
    if Number::of(right).is_none() {
        return Ok(false);
    }
    Ok(numeric_order(left, right)? == Some(Ordering::Equal))
}

fn negate(value: &Value) -> Result<Value> {
    match Number::of(value) {
        Some(Number::Int(n)) => n.checked_neg().map(Value::int).ok_or_else(|| overflow(Operator::Neg)),
        Some(Number::Float(n)) => Ok(Value::float(-n)),
        Some(Number::Decimal(n)) => Ok(Value::decimal(-n)),
        None => fail(
            ErrorKind::TypeMismatch,
            format!("cannot negate {}", value.type_name()),
        ),
    }
}

fn ordering(op: Operator, order: Option<Ordering>) -> Value {
    let result = match order {
        None => false,
        Some(order) => match op {
            Operator::Lt => order == Ordering::Less,
            Operator::Le => order != Ordering::Greater,
            Operator::Gt => order == Ordering::Greater,
            _ => order != Ordering::Less,
        },
    };
    Value::bool(result)
}

fn text_order(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    let left = left.expect_str()?;
    match right.as_str() {
        Some(right) => Ok(Some(left.cmp(&right))),
        None => fail(
            ErrorKind::TypeMismatch,
            format!("cannot compare str with {}", right.type_name()),
        ),
    }
}

fn repeat_count(value: &Value, unit: usize) -> Result<usize> {
    let count = value.expect_int()?;
    if count < 0 {
        return fail(
            ErrorKind::InvalidOperation,
            format!("cannot repeat a negative number of times ({count})"),
        );
    }
    let count = count as usize;
    if unit.saturating_mul(count) > MAX_REPEAT_LEN {
        return fail(ErrorKind::InvalidOperation, "repetition result is too large");
    }
    Ok(count)
}

fn bool_operand(value: &Value) -> Result<bool> {
    match value.as_bool() {
        Some(b) => Ok(b),
        None => fail(
            ErrorKind::TypeMismatch,
            format!("expected bool, found {}", value.type_name()),
        ),
    }
}

fn list_get(target: &Value, index: &Value) -> Result<Value> {
    let index = index.expect_int()?;
    let Some(object) = target.as_object() else {
        return fail(ErrorKind::TypeMismatch, "expected list");
    };
    match &*object.payload() {
        Payload::List(items) => Ok(items[list_index(items.len(), index)?].clone()),
        _ => fail(ErrorKind::TypeMismatch, "expected list"),
    }
}

fn list_set(target: &Value, index: &Value, value: &Value) -> Result<Value> {
    let index = index.expect_int()?;
    let Some(object) = target.as_object() else {
        return fail(ErrorKind::TypeMismatch, "expected list");
    };
    match &mut *object.payload_mut() {
        Payload::List(items) => {
            let at = list_index(items.len(), index)?;
            items[at] = value.clone();
            Ok(value.clone())
        }
        _ => fail(ErrorKind::TypeMismatch, "expected list"),
    }
}

fn dict_get(interpreter: &mut Interpreter, target: &Value, key: &Value) -> Result<Value> {
    let found = target
        .with_payload(|payload| match payload {
            Payload::Dict(entries) => entries.get(&ValueKey::from_value(key)).cloned(),
            _ => None,
        })
        .flatten();
    match found {
        Some(value) => Ok(value),
        None => fail(
            ErrorKind::KeyNotFound,
            format!("key `{}` not found", interpreter.stringify(key)?),
        ),
    }
}

fn dict_set(target: &Value, key: &Value, value: &Value) -> Result<Value> {
    let Some(object) = target.as_object() else {
        return fail(ErrorKind::TypeMismatch, "expected dict");
    };
    match &mut *object.payload_mut() {
        Payload::Dict(entries) => {
            entries.insert(ValueKey::from_value(key), value.clone());
            Ok(value.clone())
        }
        _ => fail(ErrorKind::TypeMismatch, "expected dict"),
    }
}

fn lists_equal(interpreter: &mut Interpreter, left: &Value, right: &Value) -> Result<bool> {
    let (Some(items), Some(others)) = (left.list_items(), right.list_items()) else {
        return Ok(false);
    };
    if items.len() != others.len() {
        return Ok(false);
    }
    let Some(object) = left.as_object() else {
        return Ok(false);
    };
    let equal = interpreter.guard_cycle(object, |interpreter| {
        for (a, b) in items.iter().zip(&others) {
            if !interpreter.values_equal(a, b)? {
                return Ok(false);
            }
        }
        Ok(true)
    })?;
    Ok(equal.unwrap_or_else(|| left.ptr_eq(right)))
}

fn dicts_equal(interpreter: &mut Interpreter, left: &Value, right: &Value) -> Result<bool> {
    let (Some(entries), Some(others)) = (left.dict_entries(), right.dict_entries()) else {
        return Ok(false);
    };
    if entries.len() != others.len() {
        return Ok(false);
    }
    let Some(object) = left.as_object() else {
        return Ok(false);
    };
    let equal = interpreter.guard_cycle(object, |interpreter| {
        for (key, value) in &entries {
            let Some((_, other)) = others.iter().find(|(candidate, _)| candidate == key) else {
                return Ok(false);
            };
            if !interpreter.values_equal(value, other)? {
                return Ok(false);
            }
        }
        Ok(true)
    })?;
    Ok(equal.unwrap_or_else(|| left.ptr_eq(right)))
}

/// Fills the native operator tables. Runs before flattening so subclasses of
/// built-ins inherit them.
pub(crate) fn install(b: &BuiltinClasses) {
    b.object
        .set_operator(Operator::Eq, |_, l, r| Ok(Value::bool(l.ptr_eq(operand(r)?))));
    b.object
        .set_operator(Operator::Ne, |_, l, r| Ok(Value::bool(!l.ptr_eq(operand(r)?))));

    for class in [&b.int, &b.float, &b.decimal] {
        class.set_operator(Operator::Add, |_, l, r| arithmetic(Operator::Add, l, operand(r)?));
        class.set_operator(Operator::Sub, |_, l, r| arithmetic(Operator::Sub, l, operand(r)?));
        class.set_operator(Operator::Mul, |_, l, r| arithmetic(Operator::Mul, l, operand(r)?));
        class.set_operator(Operator::Div, |_, l, r| arithmetic(Operator::Div, l, operand(r)?));
        class.set_operator(Operator::Mod, |_, l, r| arithmetic(Operator::Mod, l, operand(r)?));
        class.set_operator(Operator::Lt, |_, l, r| {
            Ok(ordering(Operator::Lt, numeric_order(l, operand(r)?)?))
        });
        class.set_operator(Operator::Le, |_, l, r| {
            Ok(ordering(Operator::Le, numeric_order(l, operand(r)?)?))
        });
        class.set_operator(Operator::Gt, |_, l, r| {
            Ok(ordering(Operator::Gt, numeric_order(l, operand(r)?)?))
        });
        class.set_operator(Operator::Ge, |_, l, r| {
            Ok(ordering(Operator::Ge, numeric_order(l, operand(r)?)?))
        });
        class.set_operator(Operator::Eq, |_, l, r| Ok(Value::bool(numeric_equal(l, operand(r)?)?)));
        class.set_operator(Operator::Ne, |_, l, r| Ok(Value::bool(!numeric_equal(l, operand(r)?)?)));
        class.set_operator(Operator::Neg, |_, l, _| negate(l));
        class.set_operator(Operator::Pos, |_, l, _| Ok(l.clone()));
    }

    b.bool.set_operator(Operator::Not, |_, l, _| Ok(Value::bool(!bool_operand(l)?)));
    b.bool.set_operator(Operator::And, |_, l, r| {
        Ok(Value::bool(bool_operand(l)? && bool_operand(operand(r)?)?))
    });
    b.bool.set_operator(Operator::Or, |_, l, r| {
        Ok(Value::bool(bool_operand(l)? || bool_operand(operand(r)?)?))
    });
    b.bool.set_operator(Operator::Eq, |_, l, r| Ok(Value::bool(l.as_bool() == operand(r)?.as_bool())));
    b.bool.set_operator(Operator::Ne, |_, l, r| Ok(Value::bool(l.as_bool() != operand(r)?.as_bool())));
    b.null.set_operator(Operator::Not, |_, _, _| Ok(Value::bool(true)));

    b.str.set_operator(Operator::Eq, |_, l, r| Ok(Value::bool(l.as_str() == operand(r)?.as_str())));
    b.str.set_operator(Operator::Ne, |_, l, r| Ok(Value::bool(l.as_str() != operand(r)?.as_str())));
    b.str.set_operator(Operator::Lt, |_, l, r| Ok(ordering(Operator::Lt, text_order(l, operand(r)?)?)));
    b.str.set_operator(Operator::Le, |_, l, r| Ok(ordering(Operator::Le, text_order(l, operand(r)?)?)));
    b.str.set_operator(Operator::Gt, |_, l, r| Ok(ordering(Operator::Gt, text_order(l, operand(r)?)?)));
    b.str.set_operator(Operator::Ge, |_, l, r| Ok(ordering(Operator::Ge, text_order(l, operand(r)?)?)));
    b.str.set_operator(Operator::Mul, |_, l, r| {
        let text = l.expect_str()?;
        let count = repeat_count(operand(r)?, text.len())?;
        Ok(Value::string(text.repeat(count)))
    });
    b.str.set_operator(Operator::Index, |_, l, r| {
        let text = l.expect_str()?;
        let index = operand(r)?.expect_int()?;
        let chars: Vec<char> = text.chars().collect();
        let at = list_index(chars.len(), index)?;
        Ok(Value::string(chars[at].to_string()))
    });

    b.list.set_operator(Operator::Add, |_, l, r| {
        let right = operand(r)?;
        match (l.list_items(), right.list_items()) {
            (Some(mut items), Some(more)) => {
                items.extend(more);
                Ok(Value::list(items))
            }
            _ => fail(
                ErrorKind::TypeMismatch,
                format!("cannot add {} to list", right.type_name()),
            ),
        }
    });
    b.list.set_operator(Operator::Mul, |_, l, r| {
        let items = l.list_items().unwrap_or_default();
        let count = repeat_count(operand(r)?, items.len())?;
        let mut repeated = Vec::with_capacity(items.len() * count);
        for _ in 0..count {
            repeated.extend(items.iter().cloned());
        }
        Ok(Value::list(repeated))
    });
    b.list.set_operator(Operator::Eq, |interpreter, l, r| {
        Ok(Value::bool(lists_equal(interpreter, l, operand(r)?)?))
    });
    b.list.set_operator(Operator::Ne, |interpreter, l, r| {
        Ok(Value::bool(!lists_equal(interpreter, l, operand(r)?)?))
    });
    b.list.set_operator(Operator::Index, |_, l, r| list_get(l, operand(r)?));
    b.list.set_operator(Operator::IndexSet, |_, l, r| {
        let (index, value) = operands(r)?;
        list_set(l, index, value)
    });

    b.dict.set_operator(Operator::Eq, |interpreter, l, r| {
        Ok(Value::bool(dicts_equal(interpreter, l, operand(r)?)?))
    });
    b.dict.set_operator(Operator::Ne, |interpreter, l, r| {
        Ok(Value::bool(!dicts_equal(interpreter, l, operand(r)?)?))
    });
    b.dict.set_operator(Operator::Index, |interpreter, l, r| dict_get(interpreter, l, operand(r)?));
    b.dict.set_operator(Operator::IndexSet, |_, l, r| {
        let (key, value) = operands(r)?;
        dict_set(l, key, value)
    });

    b.range.set_operator(Operator::Eq, |_, l, r| Ok(Value::bool(l.as_range() == operand(r)?.as_range())));
    b.range.set_operator(Operator::Ne, |_, l, r| Ok(Value::bool(l.as_range() != operand(r)?.as_range())));

    b.function.set_operator(Operator::Eq, |_, l, r| Ok(Value::bool(same_function(l, operand(r)?))));
    b.function.set_operator(Operator::Ne, |_, l, r| Ok(Value::bool(!same_function(l, operand(r)?))));
}

/// Member access builds a fresh bound set each time, so sets compare by
/// their overloads.
fn same_function(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::FunctionSet(a), Value::FunctionSet(b)) => {
            Rc::ptr_eq(a, b)
                || (a.name == b.name
                    && a.overloads.len() == b.overloads.len()
                    && a.overloads.iter().zip(&b.overloads).all(|(x, y)| Rc::ptr_eq(x, y)))
        }
        _ => false,
    }
}
