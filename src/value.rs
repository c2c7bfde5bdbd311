use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use rust_decimal::{prelude::ToPrimitive, Decimal};

use crate::{
    class::ClassRef,
    diagnostics::{fail, ErrorKind, Result},
    enumerator::Enumerator,
    foreign::ForeignObject,
    function::FunctionSet,
    runtime::ensure_stack,
    scope::{Scope, ScopeKind, ScopeRef, Storage, Variable},
    stdlib::builtins,
};

thread_local! {
    /// Containers currently being formatted by `Display`.
    static FORMATTING: RefCell<Vec<*const Object>> = const { RefCell::new(Vec::new()) };
}

pub type ObjectRef = Rc<Object>;
pub type FunctionSetRef = Rc<FunctionSet>;

/// Every runtime value is a shared reference to an object, a class, or an
/// overload set.
#[derive(Clone)]
pub enum Value {
    Object(ObjectRef),
    FunctionSet(FunctionSetRef),
    Class(ClassRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn new(start: i64, end: i64, step: i64) -> Self {
        Self { start, end, step }
    }

    /// Values in `start..end`, end exclusive, moving by `step`.
    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let RangeValue { start, end, step } = *self;
        let mut next = Some(start);
        std::iter::from_fn(move || {
            let current = next?;
            let in_range = if step > 0 { current < end } else { current > end };
            if !in_range || step == 0 {
                next = None;
                return None;
            }
            next = current.checked_add(step);
            Some(current)
        })
    }

    pub fn len(&self) -> usize {
        if self.step == 0 {
            return 0;
        }
        let span = if self.step > 0 {
            self.end.saturating_sub(self.start)
        } else {
            self.start.saturating_sub(self.end)
        };
        if span <= 0 {
            return 0;
        }
        let step = self.step.unsigned_abs();
        ((span as u64).div_ceil(step)) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, value: i64) -> bool {
        if self.step == 0 {
            return false;
        }
        let in_bounds = if self.step > 0 {
            value >= self.start && value < self.end
        } else {
            value <= self.start && value > self.end
        };
        in_bounds && (i128::from(value) - i128::from(self.start)) % i128::from(self.step) == 0
    }
}

pub enum Payload {
    /// Script objects keep their state in their scope.
    None,
    Null,
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Bool(bool),
    Str(Rc<str>),
    List(Vec<Value>),
    Dict(IndexMap<ValueKey, Value>),
    Range(RangeValue),
    Enumerator(Box<dyn Enumerator>),
    Foreign(Rc<dyn ForeignObject>),
}

pub struct Object {
    pub class: ClassRef,
    scope: Option<ScopeRef>,
    payload: RefCell<Payload>,
}

impl Object {
    /// A built-in value: no member scope, state lives in the payload.
    pub fn new(class: ClassRef, payload: Payload) -> ObjectRef {
        Rc::new(Self {
            class,
            scope: None,
            payload: RefCell::new(payload),
        })
    }

    /// A script instance with its own field scope chained to the class scope.
    pub fn instance(class: ClassRef, payload: Payload) -> ObjectRef {
        Rc::new_cyclic(|weak: &Weak<Object>| Self {
            scope: Some(Scope::new(
                ScopeKind::Object(weak.clone()),
                Some(Rc::clone(&class.scope)),
            )),
            class,
            payload: RefCell::new(payload),
        })
    }

    pub fn scope(&self) -> Option<&ScopeRef> {
        self.scope.as_ref()
    }

    pub fn payload(&self) -> Ref<'_, Payload> {
        self.payload.borrow()
    }

    pub fn payload_mut(&self) -> RefMut<'_, Payload> {
        self.payload.borrow_mut()
    }

    /// Reads a plain field of a script instance.
    pub fn field(&self, name: &str) -> Option<Value> {
        let scope = self.scope.as_ref()?.borrow();
        match scope.variable(name) {
            Some(Variable {
                storage: Storage::Slot(value),
                ..
            }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Overwrites a plain field; returns false if there is no such field.
    pub fn set_field(&self, name: &str, value: Value) -> bool {
        match &self.scope {
            Some(scope) => scope.borrow_mut().assign_slot(name, value),
            None => false,
        }
    }
}

impl Value {
    pub fn null() -> Self {
        builtins().null_value.clone()
    }

    pub fn bool(value: bool) -> Self {
        let builtins = builtins();
        if value {
            builtins.true_value.clone()
        } else {
            builtins.false_value.clone()
        }
    }

    pub fn int(value: i64) -> Self {
        Self::builtin(|b| &b.int, Payload::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::builtin(|b| &b.float, Payload::Float(value))
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::builtin(|b| &b.decimal, Payload::Decimal(value))
    }

    pub fn string(value: impl AsRef<str>) -> Self {
        Self::builtin(|b| &b.str, Payload::Str(Rc::from(value.as_ref())))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Self::builtin(|b| &b.list, Payload::List(values))
    }

    pub fn dict(entries: IndexMap<ValueKey, Value>) -> Self {
        Self::builtin(|b| &b.dict, Payload::Dict(entries))
    }

    pub fn range(range: RangeValue) -> Self {
        Self::builtin(|b| &b.range, Payload::Range(range))
    }

    pub fn enumerator(state: Box<dyn Enumerator>) -> Self {
        Self::builtin(|b| &b.enumerator, Payload::Enumerator(state))
    }

    pub fn function(set: FunctionSet) -> Self {
        Value::FunctionSet(Rc::new(set))
    }

    fn builtin(
        class: impl FnOnce(&crate::stdlib::BuiltinClasses) -> &ClassRef,
        payload: Payload,
    ) -> Self {
        let builtins = builtins();
        Value::Object(Object::new(Rc::clone(class(&builtins)), payload))
    }

    pub fn is_null(&self) -> bool {
        self.with_payload(|payload| matches!(payload, Payload::Null))
            .unwrap_or(false)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::FunctionSet(_))
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Value::Class(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The runtime class: `function` for overload sets, `type` for classes.
    pub fn class(&self) -> ClassRef {
        match self {
            Value::Object(object) => Rc::clone(&object.class),
            Value::FunctionSet(_) => Rc::clone(&builtins().function),
            Value::Class(_) => Rc::clone(&builtins().type_),
        }
    }

    pub fn type_name(&self) -> String {
        self.class().name.clone()
    }

    pub fn with_payload<R>(&self, f: impl FnOnce(&Payload) -> R) -> Option<R> {
        match self {
            Value::Object(object) => Some(f(&object.payload())),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.with_payload(|payload| match payload {
            Payload::Int(n) => Some(*n),
            _ => None,
        })
        .flatten()
    }

    pub fn as_float(&self) -> Option<f64> {
        self.with_payload(|payload| match payload {
            Payload::Float(n) => Some(*n),
            _ => None,
        })
        .flatten()
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        self.with_payload(|payload| match payload {
            Payload::Decimal(n) => Some(*n),
            _ => None,
        })
        .flatten()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.with_payload(|payload| match payload {
            Payload::Bool(b) => Some(*b),
            _ => None,
        })
        .flatten()
    }

    pub fn as_str(&self) -> Option<Rc<str>> {
        self.with_payload(|payload| match payload {
            Payload::Str(text) => Some(Rc::clone(text)),
            _ => None,
        })
        .flatten()
    }

    pub fn as_range(&self) -> Option<RangeValue> {
        self.with_payload(|payload| match payload {
            Payload::Range(range) => Some(*range),
            _ => None,
        })
        .flatten()
    }

    pub fn list_items(&self) -> Option<Vec<Value>> {
        self.with_payload(|payload| match payload {
            Payload::List(items) => Some(items.clone()),
            _ => None,
        })
        .flatten()
    }

    pub fn dict_entries(&self) -> Option<Vec<(ValueKey, Value)>> {
        self.with_payload(|payload| match payload {
            Payload::Dict(entries) => Some(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            _ => None,
        })
        .flatten()
    }

    pub fn foreign(&self) -> Option<Rc<dyn ForeignObject>> {
        self.with_payload(|payload| match payload {
            Payload::Foreign(object) => Some(Rc::clone(object)),
            _ => None,
        })
        .flatten()
    }

    pub fn expect_int(&self) -> Result<i64> {
        match self.as_int() {
            Some(n) => Ok(n),
            None => fail(
                ErrorKind::TypeMismatch,
                format!("expected int, found {}", self.type_name()),
            ),
        }
    }

    pub fn expect_str(&self) -> Result<Rc<str>> {
        match self.as_str() {
            Some(text) => Ok(text),
            None => fail(
                ErrorKind::TypeMismatch,
                format!("expected str, found {}", self.type_name()),
            ),
        }
    }

    pub fn expect_class(&self) -> Result<ClassRef> {
        match self {
            Value::Class(class) => Ok(Rc::clone(class)),
            _ => fail(
                ErrorKind::TypeMismatch,
                format!("expected a class, found {}", self.type_name()),
            ),
        }
    }

    /// Numeric view used for conversions; decimals are rounded to `f64`.
    pub fn to_f64(&self) -> Option<f64> {
        self.with_payload(|payload| match payload {
            Payload::Int(n) => Some(*n as f64),
            Payload::Float(n) => Some(*n),
            Payload::Decimal(n) => n.to_f64(),
            _ => None,
        })
        .flatten()
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Object(object) => match &*object.payload() {
                Payload::Null => false,
                Payload::Bool(b) => *b,
                Payload::Int(n) => *n != 0,
                Payload::Float(n) => *n != 0.0,
                Payload::Decimal(n) => !n.is_zero(),
                Payload::Str(text) => !text.is_empty(),
                Payload::List(items) => !items.is_empty(),
                Payload::Dict(entries) => !entries.is_empty(),
                Payload::Range(range) => !range.is_empty(),
                Payload::None | Payload::Enumerator(_) | Payload::Foreign(_) => true,
            },
            Value::FunctionSet(_) | Value::Class(_) => true,
        }
    }

    /// Address used for identity comparisons and identity-keyed maps.
    pub fn identity(&self) -> usize {
        match self {
            Value::Object(object) => Rc::as_ptr(object) as *const () as usize,
            Value::FunctionSet(set) => Rc::as_ptr(set) as *const () as usize,
            Value::Class(class) => Rc::as_ptr(class) as *const () as usize,
        }
    }

    pub fn ptr_eq(&self, other: &Value) -> bool {
        self.identity() == other.identity()
    }
}

/// Formats a float so that integral values keep a trailing `.0`.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Formats a list or dict, writing `placeholder` when the container already
/// encloses itself.
fn format_nested(
    f: &mut fmt::Formatter<'_>,
    object: &Object,
    placeholder: &str,
    body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    let ptr = object as *const Object;
    if FORMATTING.with(|stack| stack.borrow().contains(&ptr)) {
        return f.write_str(placeholder);
    }
    FORMATTING.with(|stack| stack.borrow_mut().push(ptr));
    let result = ensure_stack(|| body(f));
    FORMATTING.with(|stack| stack.borrow_mut().pop());
    result
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::FunctionSet(set) => write!(f, "<fn {}>", set.name),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Object(object) => match &*object.payload() {
                Payload::None => write!(f, "<{} object>", object.class.name),
                Payload::Null => write!(f, "null"),
                Payload::Int(n) => write!(f, "{n}"),
                Payload::Float(n) => write!(f, "{}", format_float(*n)),
                Payload::Decimal(n) => write!(f, "{n}"),
                Payload::Bool(b) => write!(f, "{b}"),
                Payload::Str(text) => write!(f, "{text}"),
                Payload::List(items) => format_nested(f, object, "[...]", |f| {
                    write!(f, "[")?;
                    for (idx, value) in items.iter().enumerate() {
                        if idx > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{value}")?;
                    }
                    write!(f, "]")
                }),
                Payload::Dict(entries) => format_nested(f, object, "{...}", |f| {
                    write!(f, "{{")?;
                    for (idx, (key, value)) in entries.iter().enumerate() {
                        if idx > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}: {value}", key.to_value())?;
                    }
                    write!(f, "}}")
                }),
                Payload::Range(range) => {
                    write!(f, "{}..{}", range.start, range.end)?;
                    if range.step != 1 {
                        write!(f, " step {}", range.step)?;
                    }
                    Ok(())
                }
                Payload::Enumerator(_) => write!(f, "<enumerator>"),
                Payload::Foreign(foreign) => write!(f, "<{} object>", foreign.type_name()),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(object) => match &*object.payload() {
                Payload::Str(text) => write!(f, "{text:?}"),
                Payload::List(items) => format_nested(f, object, "[...]", |f| {
                    f.debug_list().entries(items.iter()).finish()
                }),
                Payload::Dict(entries) => format_nested(f, object, "{...}", |f| {
                    f.debug_map()
                        .entries(entries.iter().map(|(key, value)| (key.to_value(), value)))
                        .finish()
                }),
                _ => write!(f, "{self}"),
            },
            _ => write!(f, "{self}"),
        }
    }
}

/// Dictionary key: primitives hash by value, everything else by identity.
#[derive(Clone)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Decimal(Decimal),
    Str(Rc<str>),
    Identity(Value),
}

impl ValueKey {
    pub fn from_value(value: &Value) -> Self {
        let primitive = value.with_payload(|payload| match payload {
            Payload::Null => Some(ValueKey::Null),
            Payload::Bool(b) => Some(ValueKey::Bool(*b)),
            Payload::Int(n) => Some(ValueKey::Int(*n)),
            Payload::Float(n) => Some(ValueKey::Float(n.to_bits())),
            Payload::Decimal(n) => Some(ValueKey::Decimal(n.normalize())),
            Payload::Str(text) => Some(ValueKey::Str(Rc::clone(text))),
            _ => None,
        });
        primitive
            .flatten()
            .unwrap_or_else(|| ValueKey::Identity(value.clone()))
    }

    pub fn to_value(&self) -> Value {
        match self {
            ValueKey::Null => Value::null(),
            ValueKey::Bool(b) => Value::bool(*b),
            ValueKey::Int(n) => Value::int(*n),
            ValueKey::Float(bits) => Value::float(f64::from_bits(*bits)),
            ValueKey::Decimal(n) => Value::decimal(*n),
            ValueKey::Str(text) => Value::string(text),
            ValueKey::Identity(value) => value.clone(),
        }
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueKey::Null, ValueKey::Null) => true,
            (ValueKey::Bool(a), ValueKey::Bool(b)) => a == b,
            (ValueKey::Int(a), ValueKey::Int(b)) => a == b,
            (ValueKey::Float(a), ValueKey::Float(b)) => a == b,
            (ValueKey::Decimal(a), ValueKey::Decimal(b)) => a == b,
            (ValueKey::Str(a), ValueKey::Str(b)) => a == b,
            (ValueKey::Identity(a), ValueKey::Identity(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ValueKey::Null => {}
            ValueKey::Bool(b) => b.hash(state),
            ValueKey::Int(n) => n.hash(state),
            ValueKey::Float(bits) => bits.hash(state),
            ValueKey::Decimal(n) => n.hash(state),
            ValueKey::Str(text) => text.hash(state),
            ValueKey::Identity(value) => value.identity().hash(state),
        }
    }
}

impl fmt::Debug for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_exclude_their_end() {
        let range = RangeValue::new(1, 5, 1);
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(range.len(), 4);
        assert!(range.contains(4));
        assert!(!range.contains(5));
        let down = RangeValue::new(5, 0, -2);
        assert_eq!(down.iter().collect::<Vec<_>>(), vec![5, 3, 1]);
        assert_eq!(down.len(), 3);
    }

    #[test]
    fn containment_spans_the_whole_int_domain() {
        let wide = RangeValue::new(i64::MIN, i64::MAX, 1);
        assert!(wide.contains(5));
        assert!(wide.contains(i64::MIN));
        assert!(!wide.contains(i64::MAX));
        let strided = RangeValue::new(i64::MAX, i64::MIN, -3);
        assert!(strided.contains(i64::MAX - 3));
        assert!(!strided.contains(i64::MAX - 1));
    }

    #[test]
    fn primitive_keys_hash_by_value() {
        let mut entries = IndexMap::new();
        entries.insert(ValueKey::from_value(&Value::string("a")), Value::int(1));
        assert!(entries.contains_key(&ValueKey::from_value(&Value::string("a"))));
        let list = Value::list(Vec::new());
        entries.insert(ValueKey::from_value(&list), Value::int(2));
        assert!(!entries.contains_key(&ValueKey::from_value(&Value::list(Vec::new()))));
        assert!(entries.contains_key(&ValueKey::from_value(&list)));
    }

    #[test]
    fn display_matches_script_syntax() {
        assert_eq!(Value::float(3.0).to_string(), "3.0");
        assert_eq!(
            Value::list(vec![Value::int(1), Value::string("b")]).to_string(),
            "[1, b]"
        );
        assert_eq!(Value::null().to_string(), "null");
        assert!(!Value::null().is_truthy());
    }
}
