use std::{rc::Rc, str::FromStr};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};

use super::{constructor, method, property, static_method, BuiltinClasses};
use crate::{
    class::ClassRef,
    diagnostics::{fail, ErrorKind, Result},
    enumerator::StrEnumerator,
    function::{Invocation, Parameter},
    scope::Variable,
    value::Value,
};

pub(super) fn populate(b: &BuiltinClasses) {
    object(b);
    int(b);
    float(b);
    decimal(b);
    boolean(b);
    string(b);
    reflection(b);
}

fn object(b: &BuiltinClasses) {
    method(&b.object, "ToString", Vec::new(), |interpreter, invocation| {
        let receiver = invocation.receiver()?;
        Ok(Value::string(interpreter.display(receiver)?))
    });
    method(
        &b.object,
        "Equals",
        vec![Parameter::any("other")],
        |interpreter, invocation| {
            let equal = interpreter.values_equal(invocation.receiver()?, invocation.arg(0)?)?;
            Ok(Value::bool(equal))
        },
    );
    method(&b.object, "GetType", Vec::new(), |_, invocation| {
        Ok(Value::Class(invocation.receiver()?.class()))
    });
}

fn conversion_error<T>(value: &Value, target: &str) -> Result<T> {
    fail(
        ErrorKind::TypeMismatch,
        format!("cannot convert {} `{value}` to {target}", value.type_name()),
    )
}

fn to_int(value: &Value) -> Result<i64> {
    if let Some(n) = value.as_int() {
        return Ok(n);
    }
    if let Some(b) = value.as_bool() {
        return Ok(i64::from(b));
    }
    if let Some(n) = value.as_float() {
        if n.is_finite() && n.abs() < i64::MAX as f64 {
            return Ok(n.trunc() as i64);
        }
        return conversion_error(value, "int");
    }
    if let Some(n) = value.as_decimal() {
        return match n.trunc().to_i64() {
            Some(n) => Ok(n),
            None => conversion_error(value, "int"),
        };
    }
    if let Some(text) = value.as_str() {
        return match text.trim().parse() {
            Ok(n) => Ok(n),
            Err(_) => conversion_error(value, "int"),
        };
    }
    conversion_error(value, "int")
}

pub(crate) fn to_float(value: &Value) -> Result<f64> {
    if let Some(text) = value.as_str() {
        return match text.trim().parse() {
            Ok(n) => Ok(n),
            Err(_) => conversion_error(value, "float"),
        };
    }
    match value.to_f64() {
        Some(n) => Ok(n),
        None => conversion_error(value, "float"),
    }
}

pub(crate) fn to_decimal(value: &Value) -> Result<Decimal> {
    if let Some(n) = value.as_int() {
        return Ok(Decimal::from(n));
    }
    if let Some(n) = value.as_decimal() {
        return Ok(n);
    }
    if let Some(n) = value.as_float() {
        return match Decimal::try_from(n) {
            Ok(n) => Ok(n),
            Err(_) => conversion_error(value, "decimal"),
        };
    }
    if let Some(text) = value.as_str() {
        return match Decimal::from_str(text.trim()) {
            Ok(n) => Ok(n),
            Err(_) => conversion_error(value, "decimal"),
        };
    }
    conversion_error(value, "decimal")
}

fn receiver_float(invocation: &Invocation) -> Result<f64> {
    to_float(invocation.receiver()?)
}

fn int(b: &BuiltinClasses) {
    constructor(
        &b.int,
        vec![Parameter::any("value").with_default(Value::int(0))],
        |_, invocation| Ok(Value::int(to_int(invocation.arg(0)?)?)),
    );
    static_method(
        &b.int,
        "Parse",
        vec![Parameter::typed("text", &[&b.str])],
        |_, invocation| Ok(Value::int(to_int(invocation.arg(0)?)?)),
    );
    method(&b.int, "Abs", Vec::new(), |_, invocation| {
        match invocation.receiver()?.expect_int()?.checked_abs() {
            Some(n) => Ok(Value::int(n)),
            None => fail(ErrorKind::InvalidOperation, "integer overflow in Abs"),
        }
    });
    let max = Value::int(i64::MAX);
    let min = Value::int(i64::MIN);
    let mut scope = b.int.scope.borrow_mut();
    scope.set_variable("MaxValue", static_constant(&b.int, max));
    scope.set_variable("MinValue", static_constant(&b.int, min));
}

fn static_constant(class: &ClassRef, value: Value) -> Variable {
    Variable {
        is_static: true,
        owner: Some(Rc::downgrade(class)),
        ..Variable::constant(value)
    }
}

fn float(b: &BuiltinClasses) {
    constructor(
        &b.float,
        vec![Parameter::any("value").with_default(Value::float(0.0))],
        |_, invocation| Ok(Value::float(to_float(invocation.arg(0)?)?)),
    );
    static_method(
        &b.float,
        "Parse",
        vec![Parameter::typed("text", &[&b.str])],
        |_, invocation| Ok(Value::float(to_float(invocation.arg(0)?)?)),
    );
    method(&b.float, "Floor", Vec::new(), |_, invocation| {
        Ok(Value::float(receiver_float(&invocation)?.floor()))
    });
    method(&b.float, "Ceiling", Vec::new(), |_, invocation| {
        Ok(Value::float(receiver_float(&invocation)?.ceil()))
    });
    method(&b.float, "Round", Vec::new(), |_, invocation| {
        Ok(Value::float(receiver_float(&invocation)?.round()))
    });
    method(&b.float, "Abs", Vec::new(), |_, invocation| {
        Ok(Value::float(receiver_float(&invocation)?.abs()))
    });
    method(&b.float, "Sqrt", Vec::new(), |_, invocation| {
        Ok(Value::float(receiver_float(&invocation)?.sqrt()))
    });
    method(&b.float, "IsNaN", Vec::new(), |_, invocation| {
        Ok(Value::bool(receiver_float(&invocation)?.is_nan()))
    });
}

fn decimal(b: &BuiltinClasses) {
    constructor(
        &b.decimal,
        vec![Parameter::any("value").with_default(Value::int(0))],
        |_, invocation| Ok(Value::decimal(to_decimal(invocation.arg(0)?)?)),
    );
    method(
        &b.decimal,
        "Round",
        vec![Parameter::typed("digits", &[&b.int]).with_default(Value::int(0))],
        |_, invocation| {
            let value = to_decimal(invocation.receiver()?)?;
            let digits = invocation.arg(0)?.expect_int()?;
            let digits = u32::try_from(digits).unwrap_or(0);
            Ok(Value::decimal(value.round_dp_with_strategy(
                digits,
                RoundingStrategy::MidpointAwayFromZero,
            )))
        },
    );
    method(&b.decimal, "Abs", Vec::new(), |_, invocation| {
        Ok(Value::decimal(to_decimal(invocation.receiver()?)?.abs()))
    });
}

fn boolean(b: &BuiltinClasses) {
    constructor(
        &b.bool,
        vec![Parameter::any("value").with_default(Value::bool(false))],
        |_, invocation| Ok(Value::bool(invocation.arg(0)?.is_truthy())),
    );
}

fn receiver_str(invocation: &Invocation) -> Result<Rc<str>> {
    invocation.receiver()?.expect_str()
}

fn string(b: &BuiltinClasses) {
    let str_class = &b.str;
    constructor(
        str_class,
        vec![Parameter::any("value").with_default(Value::string(""))],
        |interpreter, invocation| Ok(Value::string(interpreter.stringify(invocation.arg(0)?)?)),
    );
    property(str_class, "Length", |_, invocation| {
        Ok(Value::int(receiver_str(&invocation)?.chars().count() as i64))
    });
    method(str_class, "ToUpper", Vec::new(), |_, invocation| {
        Ok(Value::string(receiver_str(&invocation)?.to_uppercase()))
    });
    method(str_class, "ToLower", Vec::new(), |_, invocation| {
        Ok(Value::string(receiver_str(&invocation)?.to_lowercase()))
    });
    method(str_class, "Trim", Vec::new(), |_, invocation| {
        Ok(Value::string(receiver_str(&invocation)?.trim()))
    });
    method(
        str_class,
        "Split",
        vec![Parameter::typed("separator", &[str_class])],
        |_, invocation| {
            let text = receiver_str(&invocation)?;
            let separator = invocation.arg(0)?.expect_str()?;
            let parts = if separator.is_empty() {
                text.chars().map(|ch| Value::string(ch.to_string())).collect()
            } else {
                text.split(&*separator).map(Value::string).collect()
            };
            Ok(Value::list(parts))
        },
    );
    method(
        str_class,
        "Contains",
        vec![Parameter::typed("needle", &[str_class])],
        |_, invocation| {
            let needle = invocation.arg(0)?.expect_str()?;
            Ok(Value::bool(receiver_str(&invocation)?.contains(&*needle)))
        },
    );
    method(
        str_class,
        "StartsWith",
        vec![Parameter::typed("prefix", &[str_class])],
        |_, invocation| {
            let prefix = invocation.arg(0)?.expect_str()?;
            Ok(Value::bool(receiver_str(&invocation)?.starts_with(&*prefix)))
        },
    );
    method(
        str_class,
        "EndsWith",
        vec![Parameter::typed("suffix", &[str_class])],
        |_, invocation| {
            let suffix = invocation.arg(0)?.expect_str()?;
            Ok(Value::bool(receiver_str(&invocation)?.ends_with(&*suffix)))
        },
    );
    method(
        str_class,
        "Replace",
        vec![
            Parameter::typed("from", &[str_class]),
            Parameter::typed("to", &[str_class]),
        ],
        |_, invocation| {
            let from = invocation.arg(0)?.expect_str()?;
            let to = invocation.arg(1)?.expect_str()?;
            if from.is_empty() {
                return fail(ErrorKind::InvalidOperation, "cannot replace an empty string");
            }
            Ok(Value::string(receiver_str(&invocation)?.replace(&*from, &to)))
        },
    );
    method(
        str_class,
        "Substring",
        vec![
            Parameter::typed("start", &[&b.int]),
            Parameter::typed("length", &[&b.int]).with_default(Value::int(-1)),
        ],
        |_, invocation| {
            let chars: Vec<char> = receiver_str(&invocation)?.chars().collect();
            let start = invocation.arg(0)?.expect_int()?;
            let length = invocation.arg(1)?.expect_int()?;
            let len = chars.len() as i64;
            if start < 0 || start > len {
                return fail(
                    ErrorKind::IndexOutOfRange,
                    format!("substring start {start} is outside 0..{len}"),
                );
            }
            let end = if length < 0 {
                Some(len)
            } else {
                start.checked_add(length).filter(|end| *end <= len)
            };
            let Some(end) = end else {
                return fail(
                    ErrorKind::IndexOutOfRange,
                    format!("substring of length {length} from {start} is past length {len}"),
                );
            };
            let slice: String = chars[start as usize..end as usize].iter().collect();
            Ok(Value::string(slice))
        },
    );
    method(
        str_class,
        "IndexOf",
        vec![Parameter::typed("needle", &[str_class])],
        |_, invocation| {
            let text = receiver_str(&invocation)?;
            let needle = invocation.arg(0)?.expect_str()?;
            let index = text
                .find(&*needle)
                .map(|byte| text[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::int(index))
        },
    );
    method(str_class, "GetEnumerator", Vec::new(), |_, invocation| {
        let text = receiver_str(&invocation)?;
        Ok(Value::enumerator(Box::new(StrEnumerator::new(&text))))
    });
}

fn reflection(b: &BuiltinClasses) {
    property(&b.type_, "Name", |_, invocation| {
        let class = invocation.receiver()?.expect_class()?;
        Ok(Value::string(&class.name))
    });
    property(&b.function, "Name", |_, invocation| match invocation.receiver()? {
        Value::FunctionSet(set) => Ok(Value::string(&set.name)),
        other => fail(
            ErrorKind::TypeMismatch,
            format!("expected a function, found {}", other.type_name()),
        ),
    });
    method(&b.type_, "IsSubclassOf", vec![Parameter::any("other")], |_, invocation| {
        let class = invocation.receiver()?.expect_class()?;
        let other = invocation.arg(0)?.expect_class()?;
        Ok(Value::bool(class.is_subclass_of(&other)))
    });
}
