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

const APP_ERROR: &str = r#"
    class AppError : Exception {
        fn AppError(message) { super.Exception(message) }
    }
"#;

#[test]
fn error_from_catch_propagates_after_finally_runs_once() {
    let value = eval(
        r#"
        var log = []
        fn Run() {
            try {
                throw Exception("first")
            } catch (e) {
                log.Add("catch " + e.Message)
                throw Exception("second")
            } finally {
                log.Add("finally")
            }
        }
        var outcome = ""
        try { Run() } catch (e) { outcome = e.Message }
        log.Add(outcome)
        log.Join(",")
        "#,
    );
    assert_eq!(expect_str(&value), "catch first,finally,second");
}

#[test]
fn catch_clause_matches_subclasses() {
    let value = eval(&format!(
        r#"{APP_ERROR}
        var seen = ""
        try {{
            throw AppError("bad input")
        }} catch (e: TypeMismatchError) {{
            seen = "type"
        }} catch (e: Exception) {{
            seen = e.GetType().Name + ": " + e.Message
        }}
        seen
        "#
    ));
    assert_eq!(expect_str(&value), "AppError: bad input");
}

#[test]
fn untyped_catch_matches_anything() {
    let value = eval(
        r#"
        var caught = 0
        try { throw 42 } catch (e) { caught = e }
        caught
        "#,
    );
    assert_eq!(expect_int(&value), 42);
}

#[test]
fn runtime_errors_are_catchable_by_class() {
    let value = eval(
        r#"
        var report = ""
        try {
            var x = 1 / 0
        } catch (e: DivideByZeroError) {
            report = e.GetType().Name + "@" + e.Line
        }
        report
        "#,
    );
    assert_eq!(expect_str(&value), "DivideByZeroError@4");
}

#[test]
fn runtime_errors_derive_from_exception() {
    let value = eval(
        r#"
        fn Bad() { return [1][3] }
        var text = ""
        try { Bad() } catch (e: Exception) { text = e.ToString() }
        text.StartsWith("IndexOutOfRangeError: ")
        "#,
    );
    assert_eq!(value.as_bool(), Some(true));
}

#[test]
fn thrown_exceptions_record_their_line() {
    let value = eval(
        "var line = 0\ntry {\n    throw Exception(\"x\")\n} catch (e) { line = e.Line }\nline",
    );
    assert_eq!(expect_int(&value), 3);
}

#[test]
fn exception_to_string_names_the_class() {
    let value = eval(r#"Exception("boom").ToString()"#);
    assert_eq!(expect_str(&value), "Exception: boom");
}

#[test]
fn unmatched_catch_still_runs_finally() {
    let value = eval(
        r#"
        var log = []
        try {
            try {
                throw Exception("x")
            } catch (e: KeyNotFoundError) {
                log.Add("wrong")
            } finally {
                log.Add("inner")
            }
        } catch (e) {
            log.Add("outer")
        }
        log.Join(",")
        "#,
    );
    assert_eq!(expect_str(&value), "inner,outer");
}

#[test]
fn finally_return_supersedes_body_return() {
    let value = eval(
        r#"
        fn Pick() {
            try { return 1 } finally { return 2 }
        }
        Pick()
        "#,
    );
    assert_eq!(expect_int(&value), 2);
}

#[test]
fn finally_return_swallows_pending_error() {
    let value = eval(
        r#"
        fn Quiet() {
            try { throw Exception("lost") } finally { return "quiet" }
        }
        Quiet()
        "#,
    );
    assert_eq!(expect_str(&value), "quiet");
}

#[test]
fn finally_runs_when_breaking_out_of_a_loop() {
    let value = eval(
        r#"
        var count = 0
        for i in 0..3 {
            try { break } finally { count += 1 }
        }
        count
        "#,
    );
    assert_eq!(expect_int(&value), 1);
}

#[test]
fn uncaught_throw_reaches_the_host() {
    let err = eval_error(&format!("{APP_ERROR}\nthrow AppError(\"escaped\")"));
    assert_eq!(err.kind(), Some(ErrorKind::UserThrown));
    match err {
        CorvidError::Thrown(thrown) => {
            assert_eq!(thrown.class_name, "AppError");
            assert_eq!(thrown.message, "escaped");
            assert!(thrown.span.is_some());
        }
        other => panic!("expected thrown exception, found {other}"),
    }
}

#[test]
fn uncaught_runtime_error_keeps_its_kind() {
    let err = eval_error("try { missing() } catch (e: KeyNotFoundError) { }");
    assert_eq!(err.kind(), Some(ErrorKind::UndefinedName));
}

#[test]
fn exception_objects_can_be_rethrown() {
    let value = eval(
        r#"
        var message = ""
        try {
            try { throw Exception("again") } catch (e) { throw e }
        } catch (e) {
            message = e.Message
        }
        message
        "#,
    );
    assert_eq!(expect_str(&value), "again");
}
