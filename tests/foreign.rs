use std::{cell::Cell, rc::Rc};

use corvid::{
    diagnostics::{fail, ErrorKind, Result},
    runtime::Interpreter,
    value::Value,
    ForeignClass, ForeignObject,
};

struct TallyClass;

impl ForeignClass for TallyClass {
    fn name(&self) -> &str {
        "Tally"
    }

    fn create(&self, _interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Rc<dyn ForeignObject>> {
        let start = match args.first() {
            Some(value) => value.expect_int()?,
            None => 0,
        };
        Ok(Rc::new(Tally {
            count: Cell::new(start),
        }))
    }
}

struct Tally {
    count: Cell<i64>,
}

impl ForeignObject for Tally {
    fn type_name(&self) -> &str {
        "Tally"
    }

    fn get_member(&self, name: &str) -> Option<Value> {
        (name == "Count").then(|| Value::int(self.count.get()))
    }

    fn set_member(&self, name: &str, value: Value) -> Result<bool> {
        if name != "Count" {
            return Ok(false);
        }
        self.count.set(value.expect_int()?);
        Ok(true)
    }

    fn has_method(&self, name: &str) -> bool {
        name == "Add"
    }

    fn invoke(&self, _interpreter: &mut Interpreter, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "Add" => {
                let by = match args.first() {
                    Some(value) => value.expect_int()?,
                    None => 1,
                };
                self.count.set(self.count.get() + by);
                Ok(Value::int(self.count.get()))
            }
            other => fail(ErrorKind::UndefinedName, format!("no method `{other}`")),
        }
    }
}

fn interpreter() -> Interpreter {
    let mut interpreter = Interpreter::new();
    interpreter.register_foreign_class(Rc::new(TallyClass));
    interpreter
}

fn expect_int(value: &Value) -> i64 {
    match value.as_int() {
        Some(n) => n,
        None => panic!("expected int, found {}", value.type_name()),
    }
}

#[test]
fn scripts_construct_and_call_foreign_objects() {
    let value = interpreter()
        .eval_source("var t = Tally(5)\nt.Add()\nt.Add(3)\nt.Count")
        .expect("evaluation should succeed");
    assert_eq!(expect_int(&value), 9);
}

#[test]
fn foreign_properties_are_writable() {
    let value = interpreter()
        .eval_source("var t = Tally()\nt.Count = 40\nt.Add(2)")
        .expect("evaluation should succeed");
    assert_eq!(expect_int(&value), 42);
}

#[test]
fn foreign_objects_report_their_class() {
    let value = interpreter()
        .eval_source("typeof(Tally()).Name")
        .expect("evaluation should succeed");
    assert_eq!(value.as_str().as_deref(), Some("Tally"));
}

#[test]
fn unknown_foreign_members_are_undefined() {
    let err = interpreter()
        .eval_source("Tally().Missing")
        .expect_err("lookup should fail");
    assert_eq!(err.kind(), Some(ErrorKind::UndefinedName));

    let err = interpreter()
        .eval_source("var t = Tally()\nt.Label = \"x\"")
        .expect_err("assignment should fail");
    assert_eq!(err.kind(), Some(ErrorKind::UndefinedName));
}

#[test]
fn foreign_objects_are_not_serializable() {
    let err = interpreter()
        .eval_source("Json5.Serialize(Tally())")
        .expect_err("serialization should fail");
    assert_eq!(err.kind(), Some(ErrorKind::TypeMismatch));
}

#[test]
fn host_calls_script_functions_by_name() {
    let mut interpreter = interpreter();
    interpreter
        .eval_source("fn Double(x: int) { return x * 2 }")
        .expect("definition should succeed");
    let value = interpreter
        .call("Double", vec![Value::int(21)])
        .expect("call should succeed");
    assert_eq!(expect_int(&value), 42);

    let tally = interpreter
        .call("Tally", vec![Value::int(7)])
        .expect("construction should succeed");
    assert_eq!(tally.type_name(), "Tally");
}
