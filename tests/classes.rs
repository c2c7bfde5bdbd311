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

fn expect_bool(value: &Value) -> bool {
    match value.as_bool() {
        Some(flag) => flag,
        None => panic!("expected bool, found {}", value.type_name()),
    }
}

const DIAMOND: &str = r#"
    class A {
        fn Who() { return "A" }
        fn Base() { return "base" }
    }
    class B : A { }
    class C : A {
        fn Who() { return "C" }
    }
    class D : B, C { }
"#;

#[test]
fn diamond_reaches_shared_ancestor_members() {
    let value = eval(&format!("{DIAMOND}\nD().Base()"));
    assert_eq!(expect_str(&value), "base");
}

#[test]
fn diamond_prefers_override_from_later_super() {
    let value = eval(&format!("{DIAMOND}\nD().Who()"));
    assert_eq!(expect_str(&value), "C");
}

#[test]
fn diamond_keeps_override_from_earlier_super() {
    let value = eval(
        r#"
        class A { fn Who() { return "A" } }
        class B : A { fn Who() { return "B" } }
        class C : A { }
        class D : B, C { }
        D().Who()
        "#,
    );
    assert_eq!(expect_str(&value), "B");
}

#[test]
fn diamond_instances_get_one_copy_of_shared_fields() {
    let value = eval(
        r#"
        class A { var hits = 0 }
        class B : A { fn HitB() { hits += 1 } }
        class C : A { fn HitC() { hits += 10 } }
        class D : B, C { }
        var d = D()
        d.HitB()
        d.HitC()
        d.hits
        "#,
    );
    assert_eq!(expect_int(&value), 11);
}

#[test]
fn subclass_is_recognised_by_its_type() {
    let value = eval(
        r#"
        class Animal { }
        class Dog : Animal { }
        Dog().GetType().IsSubclassOf(Animal)
        "#,
    );
    assert!(expect_bool(&value));
}

const ACCOUNT: &str = r#"
    class Account {
        private var balance = 0
        fn Deposit(amount) { balance += amount; return balance }
        private fn Audit() { return "audited " + balance }
        fn Report() { return Audit() }
    }
    var account = Account()
    account.Deposit(5)
"#;

#[test]
fn private_members_are_visible_inside_the_class() {
    let value = eval(&format!("{ACCOUNT}\naccount.Report()"));
    assert_eq!(expect_str(&value), "audited 5");
}

#[test]
fn private_field_is_denied_outside_the_class() {
    let err = eval_error(&format!("{ACCOUNT}\naccount.balance"));
    assert_eq!(err.kind(), Some(ErrorKind::AccessDenied));
    let err = eval_error(&format!("{ACCOUNT}\naccount.balance = 100"));
    assert_eq!(err.kind(), Some(ErrorKind::AccessDenied));
}

#[test]
fn private_method_is_denied_outside_the_class() {
    let err = eval_error(&format!("{ACCOUNT}\naccount.Audit()"));
    assert_eq!(err.kind(), Some(ErrorKind::AccessDenied));
}

#[test]
fn private_members_are_hidden_from_subclasses() {
    let err = eval_error(
        r#"
        class Base { private var secret = 1 }
        class Derived : Base { fn Peek() { return secret } }
        Derived().Peek()
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::AccessDenied));
}

#[test]
fn protected_members_are_visible_to_subclasses() {
    let value = eval(
        r#"
        class Base { protected var secret = 7 }
        class Derived : Base { fn Peek() { return secret } }
        Derived().Peek()
        "#,
    );
    assert_eq!(expect_int(&value), 7);
    let err = eval_error(
        r#"
        class Base { protected var secret = 7 }
        Base().secret
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::AccessDenied));
}

#[test]
fn properties_run_their_accessors() {
    let value = eval(
        r#"
        class Temperature {
            private var celsius = 0
            var Fahrenheit {
                get { return celsius * 9 / 5 + 32 }
                set { celsius = (value - 32) * 5 / 9 }
            }
            fn Celsius() { return celsius }
        }
        var t = Temperature()
        t.Fahrenheit = 212
        [t.Fahrenheit, t.Celsius()]
        "#,
    );
    let items: Vec<i64> = value
        .list_items()
        .expect("list result")
        .iter()
        .map(expect_int)
        .collect();
    assert_eq!(items, vec![212, 100]);
}

#[test]
fn read_only_property_rejects_assignment() {
    let err = eval_error(
        r#"
        class Badge {
            var Label { get { return "guest" } }
        }
        var badge = Badge()
        badge.Label = "admin"
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

#[test]
fn super_reaches_overridden_members_and_constructors() {
    let value = eval(
        r#"
        class Animal {
            var name = ""
            fn Animal(n) { name = n }
            fn Speak() { return name + " makes a sound" }
        }
        class Dog : Animal {
            fn Dog(n) { super.Animal(n) }
            fn Speak() { return super.Speak() + " (woof)" }
        }
        Dog("Rex").Speak()
        "#,
    );
    assert_eq!(expect_str(&value), "Rex makes a sound (woof)");
}

#[test]
fn constructors_are_not_inherited() {
    let err = eval_error(
        r#"
        class A { fn A(x) { } }
        class B : A { }
        B(1)
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::NoMatchingOverload));
}

#[test]
fn static_classes_cannot_be_instantiated() {
    let value = eval(
        r#"
        static class MathUtil {
            fn Square(x) { return x * x }
        }
        MathUtil.Square(4)
        "#,
    );
    assert_eq!(expect_int(&value), 16);

    let err = eval_error("static class MathUtil { }\nMathUtil()");
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

#[test]
fn static_classes_cannot_be_inherited_by_instance_classes() {
    let err = eval_error("static class Util { }\nclass Thing : Util { }");
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

#[test]
fn static_fields_are_shared_between_instances() {
    let value = eval(
        r#"
        class Tally {
            static var created = 0
            fn Tally() { created += 1 }
        }
        Tally()
        Tally()
        Tally.created
        "#,
    );
    assert_eq!(expect_int(&value), 2);
}

#[test]
fn instance_methods_need_a_receiver() {
    let err = eval_error(
        r#"
        class Counter { var n = 0; fn Inc() { n += 1 } }
        Counter.Inc()
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

const VEC2: &str = r#"
    class Vec2 {
        var x = 0
        var y = 0
        fn Vec2(a, b) { x = a; y = b }
        fn +(other) { return Vec2(x + other.x, y + other.y) }
        fn -() { return Vec2(-x, -y) }
        fn ==(other) { return x == other.x && y == other.y }
        fn [](i) {
            if i == 0 { return x }
            return y
        }
        fn []=(i, v) {
            if i == 0 { x = v } else { y = v }
        }
    }
"#;

#[test]
fn script_operators_dispatch_on_the_left_operand() {
    let value = eval(&format!(
        "{VEC2}\nvar v = Vec2(1, 2) + Vec2(3, 4)\nvar n = -v\nn[1] = 100\n[v.x, v.y, n[0], n.y]"
    ));
    let items: Vec<i64> = value
        .list_items()
        .expect("list result")
        .iter()
        .map(expect_int)
        .collect();
    assert_eq!(items, vec![4, 6, -4, 100]);
}

#[test]
fn script_equality_operator_is_used() {
    let value = eval(&format!("{VEC2}\nVec2(4, 6) == Vec2(4, 6)"));
    assert!(expect_bool(&value));
}

#[test]
fn missing_operator_is_reported() {
    let err = eval_error(&format!("{VEC2}\nVec2(1, 2) * 3"));
    assert_eq!(err.kind(), Some(ErrorKind::OperatorNotImplemented));
}

#[test]
fn objects_compare_by_identity_by_default() {
    let value = eval(
        r#"
        class Token { }
        var a = Token()
        var b = a
        [a == b, a == Token(), a.Equals(b)]
        "#,
    );
    let flags: Vec<bool> = value
        .list_items()
        .expect("list result")
        .iter()
        .map(expect_bool)
        .collect();
    assert_eq!(flags, vec![true, false, true]);
}

#[test]
fn to_string_override_drives_interpolation() {
    let value = eval(
        r#"
        class Point {
            var x = 1
            var y = 2
            fn ToString() { return $"({x}, {y})" }
        }
        $"p = {Point()}"
        "#,
    );
    assert_eq!(expect_str(&value), "p = (1, 2)");
}

#[test]
fn duplicate_field_declarations_are_rejected() {
    let err = eval_error("class Twice { var a = 1\nvar a = 2 }");
    assert_eq!(err.kind(), Some(ErrorKind::DuplicateDefinition));
}

#[test]
fn closures_keep_their_instance_alive() {
    let value = eval(
        r#"
        class Doubler {
            var x = 21
            fn Twice() { return x * 2 }
            fn Get() { return fn () { return Twice() } }
            fn Me() { return fn () { return this } }
        }
        var direct = Doubler().Get()()
        var later = Doubler().Me()
        direct + later().x
        "#,
    );
    assert_eq!(expect_int(&value), 63);
}
