use corvid::{
    diagnostics::{CorvidError, ErrorKind},
    runtime::Interpreter,
    value::Value,
};

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn eval_error(source: &str) -> CorvidError {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

fn expect_int(value: &Value) -> i64 {
    match value.as_int() {
        Some(n) => n,
        None => panic!("expected int, found {}", value.type_name()),
    }
}

fn expect_str(value: &Value) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => panic!("expected str, found {}", value.type_name()),
    }
}

const PICK: &str = r#"
    fn Pick(x: int) { return "int" }
    fn Pick(x: float) { return "float" }
    fn Pick(x) { return "any" }
"#;

#[test]
fn int_argument_selects_int_overload() {
    let value = eval(&format!("{PICK}\nPick(1)"));
    assert_eq!(expect_str(&value), "int");
}

#[test]
fn float_argument_selects_float_overload() {
    let value = eval(&format!("{PICK}\nPick(1.5)"));
    assert_eq!(expect_str(&value), "float");
}

#[test]
fn decimal_argument_falls_back_to_untyped_overload() {
    let value = eval(&format!("{PICK}\nPick(2.0d)"));
    assert_eq!(expect_str(&value), "any");
}

#[test]
fn fewest_untyped_parameters_wins() {
    let source = r#"
        fn M(a: int, b) { return "first" }
        fn M(a, b: int) { return "second" }
        fn M(a: int, b: int) { return "both" }
    "#;
    assert_eq!(expect_str(&eval(&format!("{source}\nM(1, 2)"))), "both");
    assert_eq!(expect_str(&eval(&format!("{source}\nM(1, \"x\")"))), "first");
    assert_eq!(expect_str(&eval(&format!("{source}\nM(\"x\", 1)"))), "second");
}

#[test]
fn numeric_arguments_widen_when_nothing_matches_exactly() {
    let value = eval(
        r#"
        fn Half(x: float) { return x / 2 }
        Half(3)
        "#,
    );
    assert_eq!(value.as_float(), Some(1.5));

    let value = eval(
        r#"
        fn Kind(x: decimal) { return typeof(x).Name }
        Kind(1) + "," + Kind(0.5)
        "#,
    );
    assert_eq!(expect_str(&value), "decimal,decimal");
}

#[test]
fn exact_match_is_preferred_over_widening() {
    let value = eval(
        r#"
        fn Show(x: float) { return "float" }
        fn Show(x: int) { return "int" }
        Show(3)
        "#,
    );
    assert_eq!(expect_str(&value), "int");
}

#[test]
fn named_arguments_bind_by_name() {
    let value = eval(
        r#"
        fn Greet(name, greeting = "Hello") { return greeting + ", " + name }
        [Greet("Ada"), Greet("Ada", greeting: "Hi"), Greet(greeting: "Yo", name: "Bob")].Join("|")
        "#,
    );
    assert_eq!(expect_str(&value), "Hello, Ada|Hi, Ada|Yo, Bob");
}

#[test]
fn unknown_named_argument_matches_nothing() {
    let err = eval_error(
        r#"
        fn Greet(name) { return name }
        Greet("Ada", mood: "sunny")
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::NoMatchingOverload));
}

#[test]
fn variadic_parameter_collects_extra_arguments() {
    let value = eval(
        r#"
        fn Sum(first, ...rest) {
            var total = first
            for x in rest { total += x }
            return total
        }
        [Sum(1), Sum(1, 2, 3)]
        "#,
    );
    let items: Vec<i64> = value
        .list_items()
        .expect("list result")
        .iter()
        .map(expect_int)
        .collect();
    assert_eq!(items, vec![1, 6]);
}

#[test]
fn union_annotations_accept_each_listed_class() {
    let value = eval(
        r#"
        fn Describe(x: int|null = null) {
            if x == null { return "nothing" }
            return "number " + x
        }
        Describe() + "/" + Describe(4)
        "#,
    );
    assert_eq!(expect_str(&value), "nothing/number 4");

    let err = eval_error(
        r#"
        fn Describe(x: int|null = null) { return x }
        Describe("four")
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::NoMatchingOverload));
}

#[test]
fn wrong_arity_reports_no_matching_overload() {
    let err = eval_error(
        r#"
        fn Pair(a, b) { return a }
        Pair(1)
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::NoMatchingOverload));
    match err {
        CorvidError::Diagnostic(diag) => assert!(
            diag.message.contains("Pair"),
            "message should name the function: {}",
            diag.message
        ),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn method_overloads_dispatch_on_argument_class() {
    let value = eval(
        r#"
        class Printer {
            fn Show(x: int) { return "int " + x }
            fn Show(x: str) { return "str " + x }
        }
        var p = Printer()
        p.Show(1) + ", " + p.Show("a")
        "#,
    );
    assert_eq!(expect_str(&value), "int 1, str a");
}

#[test]
fn overloads_defined_later_extend_the_set() {
    let value = eval(
        r#"
        fn Area(side: int) { return side * side }
        var square = Area(3)
        fn Area(w: int, h: int) { return w * h }
        square + Area(2, 5)
        "#,
    );
    assert_eq!(expect_int(&value), 19);
}

#[test]
fn defaults_are_evaluated_once_at_definition() {
    let value = eval(
        r#"
        var base = 10
        fn Offset(x = base) { return x }
        base = 20
        Offset()
        "#,
    );
    assert_eq!(expect_int(&value), 10);
}
