use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use tracing::debug;

use crate::{
    ast::{BinaryOp, Expr, UnaryOp},
    diagnostics::Result,
    foreign::ForeignClass,
    function::FunctionSet,
    runtime::Interpreter,
    scope::{Accessibility, Scope, ScopeKind, ScopeRef, Storage, Variable},
    value::Value,
};

pub type ClassRef = Rc<Class>;

/// Native representation shared by all instances of a built-in class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Object,
    Null,
    Int,
    Float,
    Decimal,
    Bool,
    Str,
    List,
    Dict,
    Range,
    Enumerator,
    Function,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Neg,
    Pos,
    Index,
    IndexSet,
}

impl Operator {
    /// The function name a script class defines to overload this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add | Operator::Pos => "+",
            Operator::Sub | Operator::Neg => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Not => "!",
            Operator::Index => "[]",
            Operator::IndexSet => "[]=",
        }
    }

    pub fn from_binary(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => Operator::Add,
            BinaryOp::Sub => Operator::Sub,
            BinaryOp::Mul => Operator::Mul,
            BinaryOp::Div => Operator::Div,
            BinaryOp::Mod => Operator::Mod,
            BinaryOp::Equal => Operator::Eq,
            BinaryOp::NotEqual => Operator::Ne,
            BinaryOp::Less => Operator::Lt,
            BinaryOp::LessEqual => Operator::Le,
            BinaryOp::Greater => Operator::Gt,
            BinaryOp::GreaterEqual => Operator::Ge,
            BinaryOp::And => Operator::And,
            BinaryOp::Or => Operator::Or,
        }
    }

    pub fn from_unary(op: UnaryOp) -> Self {
        match op {
            UnaryOp::Negate => Operator::Neg,
            UnaryOp::Plus => Operator::Pos,
            UnaryOp::Not => Operator::Not,
        }
    }
}

/// Host implementation of an operator: receives the left operand and the
/// remaining operands.
pub type NativeOperator = fn(&mut Interpreter, &Value, &[Value]) -> Result<Value>;

/// A non-static field declaration, evaluated once per new instance.
#[derive(Clone)]
pub struct FieldInit {
    pub name: String,
    pub initializer: Option<Expr>,
    pub is_const: bool,
    pub accessibility: Accessibility,
    pub owner: Weak<Class>,
}

#[derive(Default)]
pub struct ClassSpec {
    pub name: String,
    pub supers: Vec<ClassRef>,
    pub is_static: bool,
    pub accessibility: Accessibility,
    pub builtin: Option<BuiltinKind>,
    pub foreign: Option<Rc<dyn ForeignClass>>,
}

pub struct Class {
    pub name: String,
    pub scope: ScopeRef,
    pub supers: Vec<ClassRef>,
    pub is_static: bool,
    pub accessibility: Accessibility,
    pub builtin: Option<BuiltinKind>,
    pub foreign: Option<Rc<dyn ForeignClass>>,
    synthetic_super: RefCell<Option<ClassRef>>,
    instance_fields: RefCell<Vec<FieldInit>>,
    operators: RefCell<HashMap<Operator, NativeOperator>>,
    native_construct: Cell<bool>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    /// Incoming members override, unless they come from an ancestor of the
    /// class that declared the existing member.
    Replace,
    /// Existing members win; constructors are not inherited.
    Keep,
}

impl Class {
    pub fn new(spec: ClassSpec, parent: Option<ScopeRef>) -> ClassRef {
        Rc::new_cyclic(|weak: &Weak<Class>| Class {
            name: spec.name,
            scope: Scope::new(ScopeKind::Class(weak.clone()), parent),
            supers: spec.supers,
            is_static: spec.is_static,
            accessibility: spec.accessibility,
            builtin: spec.builtin,
            foreign: spec.foreign,
            synthetic_super: RefCell::new(None),
            instance_fields: RefCell::new(Vec::new()),
            operators: RefCell::new(HashMap::new()),
            native_construct: Cell::new(false),
        })
    }

    /// True when `self` is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &ClassRef) -> bool {
        std::ptr::eq(self, Rc::as_ptr(other))
            || self.supers.iter().any(|parent| parent.is_subclass_of(other))
    }

    pub fn synthetic_super(&self) -> Option<ClassRef> {
        self.synthetic_super.borrow().clone()
    }

    pub fn instance_fields(&self) -> Vec<FieldInit> {
        self.instance_fields.borrow().clone()
    }

    pub fn add_field(&self, field: FieldInit) {
        self.instance_fields.borrow_mut().push(field);
    }

    pub fn operator(&self, op: Operator) -> Option<NativeOperator> {
        self.operators.borrow().get(&op).copied()
    }

    pub fn set_operator(&self, op: Operator, implementation: NativeOperator) {
        self.operators.borrow_mut().insert(op, implementation);
    }

    pub fn set_native_construct(&self) {
        self.native_construct.set(true);
    }

    /// Built-in classes such as `int` construct through a static function
    /// named after the class instead of allocating a script object.
    pub fn has_native_construct(&self) -> bool {
        self.native_construct.get()
    }

    /// Looks `name` up among this class's own (already flattened) functions.
    pub fn function(&self, name: &str) -> Option<FunctionSet> {
        self.scope.borrow().function(name).cloned()
    }

    pub fn constructor(&self) -> Option<FunctionSet> {
        let mut set = self.function(&self.name)?;
        set.overloads.retain(|function| function.is_constructor());
        (!set.overloads.is_empty()).then_some(set)
    }

    /// Merges inherited members into this class. Runs once, after the class
    /// body has been evaluated.
    pub fn flatten(self: &ClassRef) {
        if self.supers.is_empty() {
            return;
        }
        let synthetic = Class::new(
            ClassSpec {
                name: format!("{}.super", self.name),
                is_static: true,
                accessibility: Accessibility::Private,
                ..ClassSpec::default()
            },
            self.scope.borrow().parent(),
        );
        for parent in &self.supers {
            if let Some(grand) = parent.synthetic_super() {
                merge_scope(&synthetic.scope, &grand.scope, MergeMode::Replace);
            }
            merge_scope(&synthetic.scope, &parent.scope, MergeMode::Replace);
        }
        merge_scope(&self.scope, &synthetic.scope, MergeMode::Keep);

        let mut fields: Vec<FieldInit> = Vec::new();
        for parent in &self.supers {
            for field in parent.instance_fields() {
                let duplicate = fields
                    .iter()
                    .any(|seen| seen.name == field.name && Weak::ptr_eq(&seen.owner, &field.owner));
                if !duplicate {
                    fields.push(field);
                }
            }
        }
        fields.extend(self.instance_fields());
        *self.instance_fields.borrow_mut() = fields;

        let mut operators = HashMap::new();
        for parent in &self.supers {
            operators.extend(parent.operators.borrow().iter().map(|(op, f)| (*op, *f)));
        }
        operators.extend(self.operators.borrow().iter().map(|(op, f)| (*op, *f)));
        *self.operators.borrow_mut() = operators;

        *self.synthetic_super.borrow_mut() = Some(synthetic);
        debug!(
            class = %self.name,
            supers = ?self.supers.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "flattened class"
        );
    }
}

fn incoming_wins(existing: Option<ClassRef>, incoming: Option<ClassRef>) -> bool {
    match (existing, incoming) {
        (Some(existing), Some(incoming)) => !existing.is_subclass_of(&incoming),
        _ => true,
    }
}

fn merge_scope(target: &ScopeRef, source: &ScopeRef, mode: MergeMode) {
    let source = source.borrow();
    let mut target = target.borrow_mut();

    for (name, class) in source.classes() {
        if mode == MergeMode::Replace || target.class(name).is_none() {
            target.define_class(name, Rc::clone(class));
        }
    }

    for (name, incoming) in source.functions() {
        for function in &incoming.overloads {
            if mode == MergeMode::Keep && function.is_constructor() {
                continue;
            }
            if target.function(name).is_none() {
                target.define_function_set(FunctionSet::new(name.clone()));
            }
            let Some(set) = target.function_mut(name) else {
                continue;
            };
            match set
                .overloads
                .iter()
                .position(|existing| existing.same_shape(function))
            {
                Some(index) => {
                    if mode == MergeMode::Replace
                        && incoming_wins(set.overloads[index].owner(), function.owner())
                    {
                        set.overloads[index] = Rc::clone(function);
                    }
                }
                None => set.overloads.push(Rc::clone(function)),
            }
        }
    }

    for (name, variable) in source.variables() {
        let replace = match target.variable(name) {
            None => true,
            Some(existing) => {
                mode == MergeMode::Replace && incoming_wins(existing.owner(), variable.owner())
            }
        };
        if replace {
            target.set_variable(name, variable.clone());
        }
    }
}

/// Builds the static class that represents an imported module or an enum
/// from the members of `source`.
pub fn static_class_from_scope(name: &str, source: &ScopeRef, parent: Option<ScopeRef>) -> ClassRef {
    let class = Class::new(
        ClassSpec {
            name: name.to_string(),
            is_static: true,
            ..ClassSpec::default()
        },
        parent,
    );
    {
        let source = source.borrow();
        let mut target = class.scope.borrow_mut();
        for (member, nested) in source.classes() {
            if nested.accessibility != Accessibility::Private {
                target.define_class(member, Rc::clone(nested));
            }
        }
        for (_, set) in source.functions() {
            let mut exported = set.clone();
            exported
                .overloads
                .retain(|function| function.accessibility != Accessibility::Private);
            if !exported.overloads.is_empty() {
                target.define_function_set(exported);
            }
        }
        for (member, variable) in source.variables() {
            if variable.accessibility != Accessibility::Private {
                let mut variable = variable.clone();
                variable.is_static = true;
                target.set_variable(member, variable);
            }
        }
    }
    class
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field(
                "supers",
                &self.supers.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .field("is_static", &self.is_static)
            .finish()
    }
}

/// Whether a variable of the class scope is a read-write property or field
/// that serializers should see.
pub fn is_settable(variable: &Variable) -> bool {
    match &variable.storage {
        Storage::Slot(_) => !variable.is_const,
        Storage::Accessor { get, set } => get.is_some() && set.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;

    fn class(name: &str, supers: Vec<ClassRef>) -> ClassRef {
        Class::new(
            ClassSpec {
                name: name.into(),
                supers,
                ..ClassSpec::default()
            },
            None,
        )
    }

    fn method(class: &ClassRef, name: &str, tag: i64) {
        let mut function = Function::native(name, Vec::new(), move |_, _| Ok(Value::int(tag)));
        function.owner = Some(Rc::downgrade(class));
        class.scope.borrow_mut().define_function(Rc::new(function));
    }

    fn owner_of(class: &ClassRef, name: &str) -> String {
        let set = class.function(name).expect("member present");
        set.overloads[0].owner().expect("owner").name.clone()
    }

    #[test]
    fn diamond_keeps_the_override() {
        let a = class("A", Vec::new());
        method(&a, "Shared", 1);
        method(&a, "Speak", 1);
        let b = class("B", vec![Rc::clone(&a)]);
        b.flatten();
        let c = class("C", vec![Rc::clone(&a)]);
        method(&c, "Speak", 3);
        c.flatten();

        let d = class("D", vec![Rc::clone(&b), Rc::clone(&c)]);
        d.flatten();
        assert_eq!(owner_of(&d, "Shared"), "A");
        assert_eq!(owner_of(&d, "Speak"), "C");

        let e = class("E", vec![Rc::clone(&c), Rc::clone(&b)]);
        e.flatten();
        assert_eq!(owner_of(&e, "Speak"), "C");
    }

    #[test]
    fn own_members_win_and_constructors_stay_put() {
        let base = class("Base", Vec::new());
        method(&base, "Base", 0);
        method(&base, "Name", 1);
        let derived = class("Derived", vec![Rc::clone(&base)]);
        method(&derived, "Name", 2);
        derived.flatten();
        assert_eq!(owner_of(&derived, "Name"), "Derived");
        assert!(derived.function("Base").is_none());
        let synthetic = derived.synthetic_super().expect("synthetic super");
        assert!(synthetic.function("Base").is_some());
        assert!(derived.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&derived));
    }
}
