use std::{
    fmt,
    rc::{Rc, Weak},
};

use tracing::trace;

use crate::{
    ast::Stmt,
    class::{Class, ClassRef},
    diagnostics::{fail, ErrorKind, Result, SourceSpan},
    runtime::Interpreter,
    scope::{Accessibility, ScopeRef},
    stdlib::builtins,
    value::Value,
};

/// One declared parameter. `accepted: None` means any class is accepted.
#[derive(Clone)]
pub struct Parameter {
    pub name: String,
    pub accepted: Option<Vec<ClassRef>>,
    pub default: Option<Value>,
    pub variadic: bool,
}

impl Parameter {
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepted: None,
            default: None,
            variadic: false,
        }
    }

    pub fn typed(name: impl Into<String>, classes: &[&ClassRef]) -> Self {
        Self {
            accepted: Some(classes.iter().map(|class| Rc::clone(class)).collect()),
            ..Self::any(name)
        }
    }

    pub fn variadic(name: impl Into<String>) -> Self {
        Self {
            variadic: true,
            ..Self::any(name)
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn accepts(&self, value: &Value) -> bool {
        match &self.accepted {
            None => true,
            Some(classes) => {
                let class = value.class();
                classes.iter().any(|accepted| Rc::ptr_eq(accepted, &class))
            }
        }
    }

    /// Converts `value` along int→float, int→decimal and float→decimal when
    /// that makes it acceptable.
    fn widen(&self, value: &Value) -> Option<Value> {
        let classes = self.accepted.as_ref()?;
        let builtins = builtins();
        let wants = |target: &ClassRef| classes.iter().any(|class| Rc::ptr_eq(class, target));
        if let Some(n) = value.as_int() {
            if wants(&builtins.float) {
                return Some(Value::float(n as f64));
            }
            if wants(&builtins.decimal) {
                return Some(Value::decimal(n.into()));
            }
        }
        if let Some(n) = value.as_float() {
            if wants(&builtins.decimal) {
                return rust_decimal::Decimal::try_from(n).ok().map(Value::decimal);
            }
        }
        None
    }

    fn describe(&self) -> String {
        let mut text = String::new();
        if self.variadic {
            text.push_str("...");
        }
        text.push_str(&self.name);
        if let Some(classes) = &self.accepted {
            let names: Vec<&str> = classes.iter().map(|class| class.name.as_str()).collect();
            text.push_str(": ");
            text.push_str(&names.join("|"));
        }
        if let Some(default) = &self.default {
            text.push_str(&format!(" = {default}"));
        }
        text
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, Invocation) -> Result<Value>>;

#[derive(Clone)]
pub enum Body {
    Script { body: Rc<[Stmt]>, closure: ScopeRef },
    Native(NativeFn),
}

pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    pub is_static: bool,
    pub accessibility: Accessibility,
    pub owner: Option<Weak<Class>>,
    pub body: Body,
    pub span: SourceSpan,
}

impl Function {
    pub fn native<F>(name: impl Into<String>, params: Vec<Parameter>, callback: F) -> Self
    where
        F: Fn(&mut Interpreter, Invocation) -> Result<Value> + 'static,
    {
        Self {
            name: name.into(),
            params,
            is_static: false,
            accessibility: Accessibility::Public,
            owner: None,
            body: Body::Native(Rc::new(callback)),
            span: SourceSpan::default(),
        }
    }

    pub fn owner(&self) -> Option<ClassRef> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    /// Constructors are the functions named after their declaring class.
    pub fn is_constructor(&self) -> bool {
        self.owner().is_some_and(|owner| owner.name == self.name)
    }

    pub fn is_variadic(&self) -> bool {
        self.params.last().is_some_and(|param| param.variadic)
    }

    /// Two overloads have the same shape when their parameter lists accept
    /// the same classes in the same positions.
    pub fn same_shape(&self, other: &Function) -> bool {
        self.params.len() == other.params.len()
            && self.params.iter().zip(&other.params).all(|(a, b)| {
                a.variadic == b.variadic
                    && match (&a.accepted, &b.accepted) {
                        (None, None) => true,
                        (Some(left), Some(right)) => {
                            left.len() == right.len()
                                && left
                                    .iter()
                                    .all(|class| right.iter().any(|other| Rc::ptr_eq(class, other)))
                        }
                        _ => false,
                    }
            })
    }

    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(Parameter::describe).collect();
        format!("{}({})", self.name, params.join(", "))
    }

    fn untyped_count(&self) -> usize {
        self.params
            .iter()
            .filter(|param| param.accepted.is_none())
            .count()
    }

    /// Binds `args` to the parameter list, or `None` when this overload
    /// cannot take them. With `widen` set, numeric arguments may be widened
    /// to satisfy a typed parameter.
    fn bind(&self, args: &CallArgs, widen: bool) -> Option<Vec<Value>> {
        let fixed = if self.is_variadic() {
            self.params.len() - 1
        } else {
            self.params.len()
        };
        let mut slots: Vec<Option<Value>> = vec![None; fixed];

        for (name, value) in &args.named {
            let index = self.params[..fixed]
                .iter()
                .position(|param| &param.name == name)?;
            if slots[index].is_some() {
                return None;
            }
            slots[index] = Some(self.check(&self.params[index], value, widen)?);
        }

        let mut extra = Vec::new();
        let mut positional = args.positional.iter();
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            match positional.next() {
                Some(value) => *slot = Some(self.check(&self.params[index], value, widen)?),
                None => break,
            }
        }
        for value in positional {
            if !self.is_variadic() {
                return None;
            }
            extra.push(self.check(&self.params[fixed], value, widen)?);
        }

        let mut bound = Vec::with_capacity(self.params.len());
        for (param, slot) in self.params.iter().zip(slots) {
            match slot.or_else(|| param.default.clone()) {
                Some(value) => bound.push(value),
                None => return None,
            }
        }
        if self.is_variadic() {
            bound.push(Value::list(extra));
        }
        Some(bound)
    }

    fn check(&self, param: &Parameter, value: &Value, widen: bool) -> Option<Value> {
        if param.accepts(value) {
            Some(value.clone())
        } else if widen {
            param.widen(value)
        } else {
            None
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.signature())
    }
}

/// Arguments at a call site, before overload resolution.
#[derive(Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .positional
            .iter()
            .map(|value| value.class().name.clone())
            .collect();
        parts.extend(
            self.named
                .iter()
                .map(|(name, value)| format!("{name}: {}", value.class().name)),
        );
        parts.join(", ")
    }
}

pub struct Resolved {
    pub function: Rc<Function>,
    pub args: Vec<Value>,
}

/// What a native callback receives: the bound receiver, if any, and one
/// argument per declared parameter.
pub struct Invocation {
    pub receiver: Option<Value>,
    pub args: Vec<Value>,
    pub span: SourceSpan,
}

impl Invocation {
    pub fn arg(&self, index: usize) -> Result<&Value> {
        match self.args.get(index) {
            Some(value) => Ok(value),
            None => fail(
                ErrorKind::InvalidOperation,
                format!("missing argument {index}"),
            ),
        }
    }

    pub fn receiver(&self) -> Result<&Value> {
        match &self.receiver {
            Some(value) => Ok(value),
            None => fail(ErrorKind::InvalidOperation, "method requires a receiver"),
        }
    }
}

/// A named overload group, optionally bound to a receiver.
#[derive(Clone)]
pub struct FunctionSet {
    pub name: String,
    pub overloads: Vec<Rc<Function>>,
    pub receiver: Option<Value>,
}

impl FunctionSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
            receiver: None,
        }
    }

    pub fn single(function: Function) -> Self {
        let mut set = Self::new(function.name.clone());
        set.overloads.push(Rc::new(function));
        set
    }

    pub fn bind(&self, receiver: Option<Value>) -> Self {
        Self {
            receiver,
            ..self.clone()
        }
    }

    pub fn add(&mut self, function: Rc<Function>) {
        match self
            .overloads
            .iter()
            .position(|existing| existing.same_shape(&function))
        {
            Some(index) => self.overloads[index] = function,
            None => self.overloads.push(function),
        }
    }

    /// The overloads usable with `count` operands: zero-parameter ones for
    /// unary operators, the rest otherwise.
    pub fn with_operand_count(&self, count: usize) -> Self {
        let overloads = self
            .overloads
            .iter()
            .filter(|function| (count == 0) == function.params.is_empty())
            .cloned()
            .collect();
        Self {
            overloads,
            ..self.clone()
        }
    }

    /// Picks the overload that best matches `args`: the one with the fewest
    /// untyped parameters, first declared on ties. Exact classes are tried
    /// before numeric widening.
    pub fn resolve(&self, args: CallArgs) -> Result<Resolved> {
        for widen in [false, true] {
            let mut best: Option<(usize, &Rc<Function>, Vec<Value>)> = None;
            for function in &self.overloads {
                let Some(bound) = function.bind(&args, widen) else {
                    continue;
                };
                let score = function.untyped_count();
                if best.as_ref().map_or(true, |(current, _, _)| score < *current) {
                    best = Some((score, function, bound));
                }
            }
            if let Some((score, function, args)) = best {
                trace!(
                    function = %function.signature(),
                    untyped = score,
                    widened = widen,
                    "resolved overload"
                );
                return Ok(Resolved {
                    function: Rc::clone(function),
                    args,
                });
            }
        }
        let candidates: Vec<String> = self.overloads.iter().map(|f| f.signature()).collect();
        fail(
            ErrorKind::NoMatchingOverload,
            format!(
                "no overload of `{}` accepts ({}); candidates: {}",
                self.name,
                args.describe(),
                candidates.join(", ")
            ),
        )
    }
}

impl fmt::Debug for FunctionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSet")
            .field("name", &self.name)
            .field("overloads", &self.overloads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(name: &str, params: Vec<Parameter>, tag: i64) -> Function {
        Function::native(name, params, move |_, _| Ok(Value::int(tag)))
    }

    fn picked(set: &FunctionSet, args: Vec<Value>) -> String {
        set.resolve(CallArgs::positional(args))
            .map(|resolved| resolved.function.signature())
            .unwrap_or_else(|err| format!("error: {err}"))
    }

    #[test]
    fn exact_class_beats_untyped() {
        let b = builtins();
        let mut set = FunctionSet::new("f");
        set.add(Rc::new(native("f", vec![Parameter::any("x")], 0)));
        set.add(Rc::new(native("f", vec![Parameter::typed("x", &[&b.int])], 1)));
        set.add(Rc::new(native("f", vec![Parameter::typed("x", &[&b.float])], 2)));
        assert_eq!(picked(&set, vec![Value::int(1)]), "f(x: int)");
        assert_eq!(picked(&set, vec![Value::float(1.0)]), "f(x: float)");
        assert_eq!(picked(&set, vec![Value::decimal(1.into())]), "f(x)");
    }

    #[test]
    fn widening_applies_only_without_exact_match() {
        let b = builtins();
        let set = FunctionSet::single(native("g", vec![Parameter::typed("x", &[&b.float])], 0));
        let resolved = set
            .resolve(CallArgs::positional(vec![Value::int(3)]))
            .expect("widened");
        assert_eq!(resolved.args[0].as_float(), Some(3.0));
    }

    #[test]
    fn named_and_variadic_binding() {
        let set = FunctionSet::single(native(
            "h",
            vec![
                Parameter::any("a"),
                Parameter::any("b").with_default(Value::int(2)),
                Parameter::variadic("rest"),
            ],
            0,
        ));
        let resolved = set
            .resolve(CallArgs {
                positional: vec![Value::int(1)],
                named: vec![("b".into(), Value::int(5))],
            })
            .expect("resolved");
        assert_eq!(resolved.args[1].as_int(), Some(5));
        let resolved = set
            .resolve(CallArgs::positional(vec![
                Value::int(1),
                Value::int(2),
                Value::int(3),
                Value::int(4),
            ]))
            .expect("resolved");
        assert_eq!(resolved.args[2].list_items().map(|items| items.len()), Some(2));
    }

    #[test]
    fn reports_candidates_on_failure() {
        let set = FunctionSet::single(native("k", vec![Parameter::any("a")], 0));
        let err = set.resolve(CallArgs::default()).err().expect("no match");
        assert_eq!(err.kind(), Some(ErrorKind::NoMatchingOverload));
        assert!(err.to_string().contains("k(a)"));
    }
}
