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

fn expect_str(value: &Value) -> String {
    match value.as_str() {
        Some(text) => text.to_string(),
        None => panic!("expected str, found {}", value.type_name()),
    }
}

#[test]
fn serializes_collections_compactly() {
    let value = eval(r#"Json5.Serialize({"a": 1, "b": [true, null, 1.5, "x\"y"]})"#);
    assert_eq!(
        expect_str(&value),
        r#"{"a":1,"b":[true,null,1.5,"x\"y"]}"#
    );
}

#[test]
fn parses_json5_syntax() {
    let value = eval(
        r#"
        var doc = Json5.Parse("// config\n{name: 'corvid', tags: ['a', 'b',], mask: 0xff,}")
        doc["name"] + ":" + doc["tags"].Count + ":" + doc["mask"]
        "#,
    );
    assert_eq!(expect_str(&value), "corvid:2:255");
}

#[test]
fn round_trips_acyclic_values() {
    let value = eval(
        r#"
        var original = {"name": "corvid", "sizes": [1, 2.5, -3], "nested": {"ok": true, "none": null}}
        var text = Json5.Serialize(original)
        Json5.Serialize(Json5.Parse(text)) == text
        "#,
    );
    assert_eq!(value.as_bool(), Some(true));
}

#[test]
fn serializes_public_fields_and_settable_properties() {
    let value = eval(
        r#"
        class Person {
            var Name = "Ada"
            var Age = 36
            private var secret = "hidden"
            private var nick = "ace"
            static var Population = 8
            var Nick {
                get { return nick }
                set { nick = value }
            }
            var Shout { get { return Name.ToUpper() } }
        }
        Json5.Serialize(Person())
        "#,
    );
    assert_eq!(
        expect_str(&value),
        r#"{"Name":"Ada","Age":36,"Nick":"ace"}"#
    );
}

#[test]
fn shared_references_are_not_cycles() {
    let value = eval(
        r#"
        var shared = [1]
        Json5.Serialize([shared, shared])
        "#,
    );
    assert_eq!(expect_str(&value), "[[1],[1]]");
}

#[test]
fn circular_references_are_rejected() {
    let err = eval_error(
        r#"
        var loop = []
        loop.Add(loop)
        Json5.Serialize(loop)
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

#[test]
fn non_string_dict_keys_are_rejected() {
    let err = eval_error(r#"Json5.Serialize({1: "a"})"#);
    assert_eq!(err.kind(), Some(ErrorKind::TypeMismatch));
}

#[test]
fn deeply_nested_input_is_rejected() {
    let err = eval_error(r#"Json5.Parse("[" * 200000 + "]" * 200000)"#);
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

#[test]
fn functions_cannot_be_serialized() {
    let err = eval_error("fn F() { }\nJson5.Serialize([F])");
    assert_eq!(err.kind(), Some(ErrorKind::TypeMismatch));
}

const ACCOUNT: &str = r#"
    class Account {
        var Owner = ""
        var Balance = 0.0d
        var Rate = 0.0
        var Count = 0
    }
"#;

#[test]
fn deserialize_widens_numbers_to_the_field_kind() {
    let value = eval(&format!(
        r#"{ACCOUNT}
        var account = Json5.Deserialize("{{Owner: 'ada', Balance: 10, Rate: 2, Count: 3, Extra: true}}", Account)
        [account.Owner, typeof(account.Balance).Name, typeof(account.Rate).Name, typeof(account.Count).Name].Join(",")
        "#
    ));
    assert_eq!(expect_str(&value), "ada,decimal,float,int");
}

#[test]
fn deserialize_keeps_decimal_precision() {
    let value = eval(&format!(
        r#"{ACCOUNT}
        var account = Json5.Deserialize("{{Balance: 0.1}}", Account)
        str(account.Balance + 0.2d)
        "#
    ));
    assert_eq!(expect_str(&value), "0.3");
}

#[test]
fn deserialize_fills_nested_objects() {
    let value = eval(
        r#"
        class Address { var City = "" }
        class Person {
            var Name = ""
            var Home = Address()
        }
        var p = Json5.Deserialize("{Name: 'Ada', Home: {City: 'London'}}", Person)
        p.Name + "@" + p.Home.City + ":" + typeof(p.Home).Name
        "#,
    );
    assert_eq!(expect_str(&value), "Ada@London:Address");
}

#[test]
fn deserialize_sets_properties_through_setters() {
    let value = eval(
        r#"
        class Tagged {
            private var tag = ""
            var Tag {
                get { return tag }
                set { tag = value.ToUpper() }
            }
        }
        Json5.Deserialize("{Tag: 'beta'}", Tagged).Tag
        "#,
    );
    assert_eq!(expect_str(&value), "BETA");
}

#[test]
fn deserialize_rejects_static_classes() {
    let err = eval_error(
        r#"
        static class Settings { var Level = 1 }
        Json5.Deserialize("{Level: 2}", Settings)
        "#,
    );
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

#[test]
fn malformed_input_reports_a_position() {
    let err = eval_error(r#"Json5.Parse("{a: [1, 2}")"#);
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
    assert!(err.to_string().contains("JSON5"), "{err}");
}
