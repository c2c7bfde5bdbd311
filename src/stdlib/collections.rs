use std::cmp::Ordering;

use indexmap::IndexMap;

use super::{constructor, method, property, receiver_object, BuiltinClasses};
use crate::{
    diagnostics::{fail, ErrorKind, Result},
    enumerator::{DictEnumerator, ListEnumerator, RangeEnumerator},
    function::{Invocation, Parameter},
    runtime::Interpreter,
    value::{Payload, RangeValue, Value, ValueKey},
};

pub(super) fn populate(b: &BuiltinClasses) {
    list(b);
    dict(b);
    range(b);
    enumerator(b);
}

fn with_list<R>(
    invocation: &Invocation,
    f: impl FnOnce(&mut Vec<Value>) -> Result<R>,
) -> Result<R> {
    let object = receiver_object(invocation)?;
    let mut payload = object.payload_mut();
    match &mut *payload {
        Payload::List(items) => f(items),
        _ => fail(
            ErrorKind::TypeMismatch,
            format!("expected list, found {}", object.class.name),
        ),
    }
}

fn with_dict<R>(
    invocation: &Invocation,
    f: impl FnOnce(&mut IndexMap<ValueKey, Value>) -> Result<R>,
) -> Result<R> {
    let object = receiver_object(invocation)?;
    let mut payload = object.payload_mut();
    match &mut *payload {
        Payload::Dict(entries) => f(entries),
        _ => fail(
            ErrorKind::TypeMismatch,
            format!("expected dict, found {}", object.class.name),
        ),
    }
}

fn snapshot(invocation: &Invocation) -> Result<Vec<Value>> {
    with_list(invocation, |items| Ok(items.clone()))
}

/// Position of the first element equal to `needle`. Equality may run script
/// code, so it is evaluated against a snapshot.
fn position(
    interpreter: &mut Interpreter,
    items: &[Value],
    needle: &Value,
) -> Result<Option<usize>> {
    for (index, item) in items.iter().enumerate() {
        if interpreter.values_equal(item, needle)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

/// Stable merge sort over script comparisons. Tolerates inconsistent
/// orderings and stops at the first failed comparison.
fn merge_sort(interpreter: &mut Interpreter, mut items: Vec<Value>) -> Result<Vec<Value>> {
    if items.len() < 2 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(interpreter, items)?;
    let right = merge_sort(interpreter, right)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        let next = if interpreter.compare(a, b)? == Ordering::Greater {
            right.next()
        } else {
            left.next()
        };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

pub(crate) fn list_index(len: usize, index: i64) -> Result<usize> {
    if index < 0 || index as usize >= len {
        return fail(
            ErrorKind::IndexOutOfRange,
            format!("index {index} is out of range for a list of length {len}"),
        );
    }
    Ok(index as usize)
}

fn list(b: &BuiltinClasses) {
    let class = &b.list;
    constructor(class, vec![Parameter::variadic("items")], |_, invocation| {
        Ok(Value::list(invocation.arg(0)?.list_items().unwrap_or_default()))
    });
    property(class, "Count", |_, invocation| {
        with_list(&invocation, |items| Ok(Value::int(items.len() as i64)))
    });
    method(class, "Add", vec![Parameter::any("item")], |_, invocation| {
        let item = invocation.arg(0)?.clone();
        with_list(&invocation, |items| {
            items.push(item);
            Ok(Value::null())
        })
    });
    method(
        class,
        "Insert",
        vec![Parameter::typed("index", &[&b.int]), Parameter::any("item")],
        |_, invocation| {
            let index = invocation.arg(0)?.expect_int()?;
            let item = invocation.arg(1)?.clone();
            with_list(&invocation, |items| {
                let at = list_index(items.len() + 1, index)?;
                items.insert(at, item);
                Ok(Value::null())
            })
        },
    );
    method(
        class,
        "RemoveAt",
        vec![Parameter::typed("index", &[&b.int])],
        |_, invocation| {
            let index = invocation.arg(0)?.expect_int()?;
            with_list(&invocation, |items| {
                let at = list_index(items.len(), index)?;
                Ok(items.remove(at))
            })
        },
    );
    method(
        class,
        "Remove",
        vec![Parameter::any("item")],
        |interpreter, invocation| {
            let items = snapshot(&invocation)?;
            match position(interpreter, &items, invocation.arg(0)?)? {
                Some(index) => with_list(&invocation, |items| {
                    if index < items.len() {
                        items.remove(index);
                    }
                    Ok(Value::bool(true))
                }),
                None => Ok(Value::bool(false)),
            }
        },
    );
    method(
        class,
        "Contains",
        vec![Parameter::any("item")],
        |interpreter, invocation| {
            let items = snapshot(&invocation)?;
            let found = position(interpreter, &items, invocation.arg(0)?)?;
            Ok(Value::bool(found.is_some()))
        },
    );
    method(
        class,
        "IndexOf",
        vec![Parameter::any("item")],
        |interpreter, invocation| {
            let items = snapshot(&invocation)?;
            let found = position(interpreter, &items, invocation.arg(0)?)?;
            Ok(Value::int(found.map_or(-1, |index| index as i64)))
        },
    );
    method(class, "Clear", Vec::new(), |_, invocation| {
        with_list(&invocation, |items| {
            items.clear();
            Ok(Value::null())
        })
    });
    method(class, "Copy", Vec::new(), |_, invocation| {
        Ok(Value::list(snapshot(&invocation)?))
    });
    method(class, "Reverse", Vec::new(), |_, invocation| {
        with_list(&invocation, |items| {
            items.reverse();
            Ok(Value::null())
        })
    });
    method(class, "Sort", Vec::new(), |interpreter, invocation| {
        let items = merge_sort(interpreter, snapshot(&invocation)?)?;
        with_list(&invocation, |target| {
            *target = items;
            Ok(Value::null())
        })
    });
    method(
        class,
        "Join",
        vec![Parameter::typed("separator", &[&b.str]).with_default(Value::string(""))],
        |interpreter, invocation| {
            let separator = invocation.arg(0)?.expect_str()?;
            let mut parts = Vec::new();
            for item in snapshot(&invocation)? {
                parts.push(interpreter.stringify(&item)?);
            }
            Ok(Value::string(parts.join(&separator)))
        },
    );
    method(class, "GetEnumerator", Vec::new(), |_, invocation| {
        let object = receiver_object(&invocation)?;
        Ok(Value::enumerator(Box::new(ListEnumerator::new(object))))
    });
}

fn dict(b: &BuiltinClasses) {
    let class = &b.dict;
    constructor(class, Vec::new(), |_, _| Ok(Value::dict(IndexMap::new())));
    property(class, "Count", |_, invocation| {
        with_dict(&invocation, |entries| Ok(Value::int(entries.len() as i64)))
    });
    property(class, "Keys", |_, invocation| {
        with_dict(&invocation, |entries| {
            Ok(Value::list(entries.keys().map(ValueKey::to_value).collect()))
        })
    });
    property(class, "Values", |_, invocation| {
        with_dict(&invocation, |entries| {
            Ok(Value::list(entries.values().cloned().collect()))
        })
    });
    method(class, "ContainsKey", vec![Parameter::any("key")], |_, invocation| {
        let key = ValueKey::from_value(invocation.arg(0)?);
        with_dict(&invocation, |entries| Ok(Value::bool(entries.contains_key(&key))))
    });
    method(class, "Remove", vec![Parameter::any("key")], |_, invocation| {
        let key = ValueKey::from_value(invocation.arg(0)?);
        with_dict(&invocation, |entries| {
            Ok(Value::bool(entries.shift_remove(&key).is_some()))
        })
    });
    method(
        class,
        "Get",
        vec![
            Parameter::any("key"),
            Parameter::any("default").with_default(Value::null()),
        ],
        |_, invocation| {
            let key = ValueKey::from_value(invocation.arg(0)?);
            let fallback = invocation.arg(1)?.clone();
            with_dict(&invocation, |entries| {
                Ok(entries.get(&key).cloned().unwrap_or(fallback))
            })
        },
    );
    method(class, "Clear", Vec::new(), |_, invocation| {
        with_dict(&invocation, |entries| {
            entries.clear();
            Ok(Value::null())
        })
    });
    method(class, "Copy", Vec::new(), |_, invocation| {
        with_dict(&invocation, |entries| Ok(Value::dict(entries.clone())))
    });
    method(class, "GetEnumerator", Vec::new(), |_, invocation| {
        let entries = with_dict(&invocation, |entries| {
            Ok(entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect())
        })?;
        Ok(Value::enumerator(Box::new(DictEnumerator::new(entries))))
    });
}

fn receiver_range(invocation: &Invocation) -> Result<RangeValue> {
    let receiver = invocation.receiver()?;
    match receiver.as_range() {
        Some(range) => Ok(range),
        None => fail(
            ErrorKind::TypeMismatch,
            format!("expected range, found {}", receiver.type_name()),
        ),
    }
}

fn range(b: &BuiltinClasses) {
    let class = &b.range;
    constructor(
        class,
        vec![
            Parameter::typed("start", &[&b.int]),
            Parameter::typed("end", &[&b.int]),
            Parameter::typed("step", &[&b.int]).with_default(Value::int(1)),
        ],
        |_, invocation| {
            let start = invocation.arg(0)?.expect_int()?;
            let end = invocation.arg(1)?.expect_int()?;
            let step = invocation.arg(2)?.expect_int()?;
            if step == 0 {
                return fail(ErrorKind::InvalidOperation, "range step cannot be zero");
            }
            Ok(Value::range(RangeValue::new(start, end, step)))
        },
    );
    property(class, "Start", |_, invocation| {
        Ok(Value::int(receiver_range(&invocation)?.start))
    });
    property(class, "End", |_, invocation| {
        Ok(Value::int(receiver_range(&invocation)?.end))
    });
    property(class, "Step", |_, invocation| {
        Ok(Value::int(receiver_range(&invocation)?.step))
    });
    property(class, "Count", |_, invocation| {
        Ok(Value::int(receiver_range(&invocation)?.len() as i64))
    });
    method(class, "Contains", vec![Parameter::any("value")], |_, invocation| {
        let range = receiver_range(&invocation)?;
        let found = invocation.arg(0)?.as_int().is_some_and(|n| range.contains(n));
        Ok(Value::bool(found))
    });
    method(class, "GetEnumerator", Vec::new(), |_, invocation| {
        let range = receiver_range(&invocation)?;
        Ok(Value::enumerator(Box::new(RangeEnumerator::new(range))))
    });
}

fn with_enumerator<R>(
    invocation: &Invocation,
    f: impl FnOnce(&mut dyn crate::enumerator::Enumerator) -> R,
) -> Result<R> {
    let object = receiver_object(invocation)?;
    let mut payload = object.payload_mut();
    match &mut *payload {
        Payload::Enumerator(state) => Ok(f(state.as_mut())),
        _ => fail(
            ErrorKind::TypeMismatch,
            format!("expected enumerator, found {}", object.class.name),
        ),
    }
}

fn enumerator(b: &BuiltinClasses) {
    let class = &b.enumerator;
    property(class, "Current", |_, invocation| {
        with_enumerator(&invocation, |state| state.current().unwrap_or_else(Value::null))
    });
    method(class, "MoveNext", Vec::new(), |_, invocation| {
        with_enumerator(&invocation, |state| Value::bool(state.move_next()))
    });
    method(class, "Reset", Vec::new(), |_, invocation| {
        with_enumerator(&invocation, |state| {
            state.reset();
            Value::null()
        })
    });
    method(class, "GetEnumerator", Vec::new(), |_, invocation| {
        Ok(invocation.receiver()?.clone())
    });
}
