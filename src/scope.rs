use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use indexmap::IndexMap;

use crate::{
    class::{Class, ClassRef},
    diagnostics::{fail, ErrorKind, Result},
    function::{Function, FunctionSet},
    value::{Object, ObjectRef, Value},
};

pub type ScopeRef = Rc<RefCell<Scope>>;

/// Member visibility, ordered from most to least visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Accessibility {
    #[default]
    Public,
    Internal,
    Protected,
    Private,
}

impl fmt::Display for Accessibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Accessibility::Public => "public",
            Accessibility::Internal => "internal",
            Accessibility::Protected => "protected",
            Accessibility::Private => "private",
        };
        f.write_str(text)
    }
}

pub enum ScopeKind {
    Module,
    Block,
    /// A call frame. `closure` is the scope the function was defined in; it is
    /// the lexical parent even when the runtime parent is an object scope.
    /// Method frames hold their receiver so closures created inside keep it
    /// alive.
    Function {
        closure: ScopeRef,
        receiver: Option<ObjectRef>,
    },
    Class(Weak<Class>),
    Object(Weak<Object>),
}

#[derive(Clone)]
pub enum Storage {
    Slot(Value),
    Accessor {
        get: Option<FunctionSet>,
        set: Option<FunctionSet>,
    },
}

#[derive(Clone)]
pub struct Variable {
    pub storage: Storage,
    pub is_const: bool,
    pub is_static: bool,
    pub accessibility: Accessibility,
    pub owner: Option<Weak<Class>>,
}

impl Variable {
    pub fn slot(value: Value) -> Self {
        Self {
            storage: Storage::Slot(value),
            is_const: false,
            is_static: false,
            accessibility: Accessibility::Public,
            owner: None,
        }
    }

    pub fn constant(value: Value) -> Self {
        Self {
            is_const: true,
            ..Self::slot(value)
        }
    }

    pub fn owner(&self) -> Option<ClassRef> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }
}

/// What a name resolves to inside one scope.
#[derive(Clone)]
pub enum Binding {
    Class(ClassRef),
    Functions(FunctionSet),
    Variable(Variable),
}

pub struct Lookup {
    pub binding: Binding,
    pub scope: ScopeRef,
}

pub struct Scope {
    parent: Option<ScopeRef>,
    kind: ScopeKind,
    variables: IndexMap<String, Variable>,
    functions: IndexMap<String, FunctionSet>,
    classes: IndexMap<String, ClassRef>,
}

impl Scope {
    pub fn new(kind: ScopeKind, parent: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            parent,
            kind,
            variables: IndexMap::new(),
            functions: IndexMap::new(),
            classes: IndexMap::new(),
        }))
    }

    pub fn module(parent: Option<ScopeRef>) -> ScopeRef {
        Self::new(ScopeKind::Module, parent)
    }

    pub fn block(parent: &ScopeRef) -> ScopeRef {
        Self::new(ScopeKind::Block, Some(Rc::clone(parent)))
    }

    pub fn parent(&self) -> Option<ScopeRef> {
        self.parent.clone()
    }

    pub fn kind(&self) -> &ScopeKind {
        &self.kind
    }

    /// Declares a variable; redeclaring a name in the same scope fails.
    pub fn define_variable(&mut self, name: &str, variable: Variable) -> Result<()> {
        if self.variables.contains_key(name) {
            return fail(
                ErrorKind::DuplicateDefinition,
                format!("`{name}` is already defined in this scope"),
            );
        }
        self.variables.insert(name.to_string(), variable);
        Ok(())
    }

    /// Inserts or overwrites a variable without the duplicate check.
    pub fn set_variable(&mut self, name: &str, variable: Variable) {
        self.variables.insert(name.to_string(), variable);
    }

    /// Replaces the value of an existing slot. Returns false if `name` is not
    /// a slot variable of this scope.
    pub fn assign_slot(&mut self, name: &str, value: Value) -> bool {
        match self.variables.get_mut(name) {
            Some(Variable {
                storage: Storage::Slot(slot),
                ..
            }) => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    /// Adds an overload to the set named after the function; an overload of
    /// the same shape is replaced.
    pub fn define_function(&mut self, function: Rc<Function>) {
        self.functions
            .entry(function.name.clone())
            .or_insert_with(|| FunctionSet::new(function.name.clone()))
            .add(function);
    }

    pub fn define_function_set(&mut self, set: FunctionSet) {
        self.functions.insert(set.name.clone(), set);
    }

    pub fn define_class(&mut self, name: &str, class: ClassRef) {
        self.classes.insert(name.to_string(), class);
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSet> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut FunctionSet> {
        self.functions.get_mut(name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassRef> {
        self.classes.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.variables.iter()
    }

    pub fn functions(&self) -> impl Iterator<Item = (&String, &FunctionSet)> {
        self.functions.iter()
    }

    pub fn classes(&self) -> impl Iterator<Item = (&String, &ClassRef)> {
        self.classes.iter()
    }

    /// Resolves `name` in this scope only: class, then function, then variable.
    pub fn local(&self, name: &str) -> Option<Binding> {
        if let Some(class) = self.classes.get(name) {
            return Some(Binding::Class(Rc::clone(class)));
        }
        if let Some(set) = self.functions.get(name) {
            return Some(Binding::Functions(set.clone()));
        }
        self.variables
            .get(name)
            .map(|variable| Binding::Variable(variable.clone()))
    }

    /// Walks the parent chain, then the defining scopes of any call frames on
    /// it.
    pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Lookup> {
        let mut closures = Vec::new();
        let mut current = Some(Rc::clone(scope));
        while let Some(candidate) = current {
            let (found, parent) = {
                let inner = candidate.borrow();
                if let ScopeKind::Function { closure, .. } = &inner.kind {
                    let same_as_parent = inner
                        .parent
                        .as_ref()
                        .is_some_and(|parent| Rc::ptr_eq(parent, closure));
                    if !same_as_parent {
                        closures.push(Rc::clone(closure));
                    }
                }
                (inner.local(name), inner.parent.clone())
            };
            if let Some(binding) = found {
                return Some(Lookup {
                    binding,
                    scope: candidate,
                });
            }
            current = parent;
        }
        closures
            .iter()
            .find_map(|closure| Scope::lookup(closure, name))
    }

    fn lexical_parent(&self) -> Option<ScopeRef> {
        match &self.kind {
            ScopeKind::Function { closure, .. } => Some(Rc::clone(closure)),
            _ => self.parent.clone(),
        }
    }

    /// Whether `ancestor` encloses `scope` lexically.
    pub fn contains_scope(scope: &ScopeRef, ancestor: &ScopeRef) -> bool {
        let mut current = Some(Rc::clone(scope));
        while let Some(candidate) = current {
            if Rc::ptr_eq(&candidate, ancestor) {
                return true;
            }
            current = candidate.borrow().lexical_parent();
        }
        false
    }

    /// Classes whose bodies lexically enclose `scope`, innermost first.
    pub fn lexical_classes(scope: &ScopeRef) -> Vec<ClassRef> {
        let mut classes = Vec::new();
        let mut current = Some(Rc::clone(scope));
        while let Some(candidate) = current {
            let inner = candidate.borrow();
            if let ScopeKind::Class(class) = &inner.kind {
                if let Some(class) = class.upgrade() {
                    classes.push(class);
                }
            }
            current = inner.lexical_parent();
        }
        classes
    }

    /// The instance whose members are visible from `scope`, if any.
    pub fn current_object(scope: &ScopeRef) -> Option<ObjectRef> {
        let mut current = Some(Rc::clone(scope));
        while let Some(candidate) = current {
            let inner = candidate.borrow();
            match &inner.kind {
                ScopeKind::Function {
                    receiver: Some(object),
                    ..
                } => return Some(Rc::clone(object)),
                ScopeKind::Object(object) => return object.upgrade(),
                _ => {}
            }
            current = inner.parent.clone();
        }
        None
    }

    /// Checks whether code running in `site` may touch a member declared by
    /// `owner` with the given accessibility.
    pub fn can_access(site: &ScopeRef, accessibility: Accessibility, owner: Option<&ClassRef>) -> bool {
        let Some(owner) = owner else {
            return true;
        };
        match accessibility {
            Accessibility::Public | Accessibility::Internal => true,
            Accessibility::Private => Scope::contains_scope(site, &owner.scope),
            Accessibility::Protected => Scope::lexical_classes(site)
                .iter()
                .any(|class| class.is_subclass_of(owner)),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            ScopeKind::Module => "module",
            ScopeKind::Block => "block",
            ScopeKind::Function { .. } => "function",
            ScopeKind::Class(_) => "class",
            ScopeKind::Object(_) => "object",
        };
        f.debug_struct("Scope")
            .field("kind", &kind)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaring_a_variable_fails() {
        let scope = Scope::module(None);
        let mut inner = scope.borrow_mut();
        inner
            .define_variable("x", Variable::slot(Value::int(1)))
            .expect("first definition");
        let err = inner
            .define_variable("x", Variable::slot(Value::int(2)))
            .expect_err("duplicate");
        assert_eq!(err.kind(), Some(ErrorKind::DuplicateDefinition));
    }

    #[test]
    fn lookup_walks_parents() {
        let outer = Scope::module(None);
        outer
            .borrow_mut()
            .define_variable("x", Variable::slot(Value::int(7)))
            .expect("define");
        let inner = Scope::block(&Scope::block(&outer));
        let found = Scope::lookup(&inner, "x").expect("found");
        assert!(Rc::ptr_eq(&found.scope, &outer));
        assert!(Scope::lookup(&inner, "y").is_none());
    }

    #[test]
    fn call_frames_fall_back_to_their_closure() {
        let defining = Scope::module(None);
        defining
            .borrow_mut()
            .define_variable("helper", Variable::slot(Value::int(1)))
            .expect("define");
        let unrelated = Scope::module(None);
        let frame = Scope::new(
            ScopeKind::Function {
                closure: Rc::clone(&defining),
                receiver: None,
            },
            Some(unrelated),
        );
        assert!(Scope::lookup(&frame, "helper").is_some());
        assert!(Scope::contains_scope(&frame, &defining));
    }
}
