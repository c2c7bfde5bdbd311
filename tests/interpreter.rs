use corvid::{
    diagnostics::{CorvidError, ErrorKind},
    runtime::Interpreter,
    value::Value,
    InterpreterConfig,
};
use rust_decimal::Decimal;

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

fn expect_ints(value: &Value) -> Vec<i64> {
    let items = value
        .list_items()
        .unwrap_or_else(|| panic!("expected list, found {}", value.type_name()));
    items.iter().map(expect_int).collect()
}

#[test]
fn evaluates_basic_arithmetic() {
    let value = eval("return 2 + 3 * 4;");
    assert_eq!(expect_int(&value), 14);
}

#[test]
fn last_expression_is_the_result() {
    let value = eval("var x = 4\nx * 10");
    assert_eq!(expect_int(&value), 40);
}

#[test]
fn int_plus_float_promotes_to_float() {
    let value = eval("1 + 2.0");
    assert_eq!(value.type_name(), "float");
    assert_eq!(value.as_float(), Some(3.0));
}

#[test]
fn int_plus_decimal_promotes_to_decimal() {
    let value = eval("1 + 2.0d");
    assert_eq!(value.type_name(), "decimal");
    assert_eq!(value.as_decimal(), Some(Decimal::from(3)));
}

#[test]
fn float_plus_decimal_promotes_to_decimal() {
    let value = eval("0.5 + 1.25d");
    assert_eq!(value.as_decimal(), Some(Decimal::new(175, 2)));
}

#[test]
fn integer_division_truncates() {
    assert_eq!(expect_int(&eval("7 / 2")), 3);
    assert_eq!(expect_int(&eval("7 % 3")), 1);
}

#[test]
fn repeats_strings_and_lists() {
    assert_eq!(expect_str(&eval(r#""a" * 3"#)), "aaa");
    assert_eq!(expect_ints(&eval("[1, 2] * 2")), vec![1, 2, 1, 2]);
}

#[test]
fn string_concatenation_coerces_operands() {
    let value = eval(r#""n = " + 4 + ", f = " + 1.0"#);
    assert_eq!(expect_str(&value), "n = 4, f = 1.0");
}

#[test]
fn interpolated_strings_format_expressions() {
    let value = eval(
        r#"
        var name = "corvid"
        var items = [1, 2]
        $"{name} has {len(items) + 1} feathers: {items}"
        "#,
    );
    assert_eq!(expect_str(&value), "corvid has 3 feathers: [1, 2]");
}

#[test]
fn division_by_zero_is_reported() {
    let err = eval_error("1 / 0");
    assert_eq!(err.kind(), Some(ErrorKind::DivisionOrModuloByZero));
    let err = eval_error("5 % 0");
    assert_eq!(err.kind(), Some(ErrorKind::DivisionOrModuloByZero));
}

#[test]
fn mismatched_operands_are_rejected() {
    let err = eval_error(r#"[1] - "x""#);
    assert!(matches!(
        err.kind(),
        Some(ErrorKind::OperatorNotImplemented | ErrorKind::TypeMismatch)
    ));
}

#[test]
fn counter_instances_keep_their_own_state() {
    let value = eval(
        r#"
        class Counter {
            var n = 0;
            fn Inc() { n = n + 1; return n; }
        }
        var first = Counter()
        first.Inc()
        first.Inc()
        var third = first.Inc()
        var second = Counter()
        return [third, second.n, second.Inc()]
        "#,
    );
    assert_eq!(expect_ints(&value), vec![3, 0, 1]);
}

#[test]
fn while_loop_honours_break_and_continue() {
    let value = eval(
        r#"
        var i = 0
        var total = 0
        while true {
            i += 1
            if i % 2 == 0 { continue }
            if i > 9 { break }
            total += i
        }
        return total
        "#,
    );
    assert_eq!(expect_int(&value), 1 + 3 + 5 + 7 + 9);
}

#[test]
fn for_loop_over_range_is_end_exclusive() {
    let value = eval(
        r#"
        var total = 0
        for i in 0..5 { total += i }
        total
        "#,
    );
    assert_eq!(expect_int(&value), 10);
}

#[test]
fn for_loop_over_dict_yields_pairs() {
    let value = eval(
        r#"
        var ages = {"ada": 36, "alan": 41}
        var keys = ""
        var total = 0
        for (var pair in ages) {
            keys += pair[0]
            total += pair[1]
        }
        return keys + ":" + total
        "#,
    );
    assert_eq!(expect_str(&value), "adaalan:77");
}

#[test]
fn errors_inside_get_enumerator_are_not_masked() {
    let value = eval(
        r#"
        class Bag {
            fn GetEnumerator() { return missing_helper() }
        }
        var outcome = ""
        try {
            for item in Bag() { }
        } catch (e: NotEnumerableError) {
            outcome = "not enumerable"
        } catch (e: UndefinedNameError) {
            outcome = "undefined"
        }
        outcome
        "#,
    );
    assert_eq!(expect_str(&value), "undefined");
}

#[test]
fn for_loop_over_string_yields_characters() {
    let value = eval(
        r#"
        var out = []
        for c in "abc" { out.Add(c.ToUpper()) }
        out.Join("-")
        "#,
    );
    assert_eq!(expect_str(&value), "A-B-C");
}

#[test]
fn for_loop_requires_an_enumerable() {
    let err = eval_error("for x in 42 { }");
    assert_eq!(err.kind(), Some(ErrorKind::NotEnumerable));
}

#[test]
fn script_enumerators_drive_for_loops() {
    let value = eval(
        r#"
        class Countdown {
            var n = 0
            fn Countdown(start) { n = start + 1 }
            fn GetEnumerator() { return this }
            fn MoveNext() { n -= 1; return n > 0 }
            var Current { get { return n } }
        }
        var seen = []
        for x in Countdown(3) { seen.Add(x) }
        seen
        "#,
    );
    assert_eq!(expect_ints(&value), vec![3, 2, 1]);
}

#[test]
fn switch_matches_any_listed_value() {
    let value = eval(
        r#"
        fn Classify(x) {
            var label = ""
            switch x {
                case 1, 2 { label = "low" }
                case 3 { label = "three"; break; }
                default { label = "high" }
            }
            return label
        }
        [Classify(2), Classify(3), Classify(9)].Join(",")
        "#,
    );
    assert_eq!(expect_str(&value), "low,three,high");
}

#[test]
fn enums_number_members_in_order() {
    let value = eval(
        r#"
        enum Color { Red, Green = 5, Blue }
        [Color.Red, Color.Green, Color.Blue]
        "#,
    );
    assert_eq!(expect_ints(&value), vec![0, 5, 6]);
}

#[test]
fn enum_members_are_constant() {
    let err = eval_error("enum Color { Red }\nColor.Red = 4");
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

#[test]
fn lambdas_capture_their_scope() {
    let value = eval(
        r#"
        fn MakeCounter() {
            var n = 0
            return fn () { n += 1; return n }
        }
        var a = MakeCounter()
        var b = MakeCounter()
        a()
        a()
        [a(), b()]
        "#,
    );
    assert_eq!(expect_ints(&value), vec![3, 1]);
}

#[test]
fn recursion_computes_fibonacci() {
    let value = eval(
        r#"
        fn Fib(n) {
            if n < 2 { return n }
            return Fib(n - 1) + Fib(n - 2)
        }
        Fib(15)
        "#,
    );
    assert_eq!(expect_int(&value), 610);
}

#[test]
fn deep_recursion_runs_on_the_default_config() {
    let value = eval(
        r#"
        fn Depth(n) {
            if n == 0 { return 0 }
            return Depth(n - 1) + 1
        }
        Depth(10000)
        "#,
    );
    assert_eq!(expect_int(&value), 10000);
}

#[test]
fn runaway_recursion_is_fatal() {
    let mut interpreter =
        Interpreter::with_config(InterpreterConfig::new().with_max_call_depth(64));
    let err = interpreter
        .eval_source(
            r#"
            fn Down(n) { return Down(n + 1) }
            try { Down(0) } catch { 0 }
            "#,
        )
        .expect_err("recursion should overflow");
    assert_eq!(err.kind(), Some(ErrorKind::StackOverflow));
}

#[test]
fn lists_support_mutation_and_aliasing() {
    let value = eval(
        r#"
        var xs = [3, 1, 2]
        var alias = xs
        alias.Add(0)
        xs.Sort()
        xs[0] = 10
        xs.Insert(1, 7)
        xs.RemoveAt(2)
        return [alias.Count, alias[0], alias[1], alias.IndexOf(3)]
        "#,
    );
    assert_eq!(expect_ints(&value), vec![4, 10, 7, 3]);
}

#[test]
fn sorting_floats_with_nan_does_not_abort() {
    let value = eval(
        r#"
        var nan = Json5.Parse("[NaN]")[0]
        var xs = []
        var i = 0
        while i < 60 {
            xs.Add(float(i % 7) - 3.0)
            if i % 5 == 0 { xs.Add(nan) }
            i += 1
        }
        xs.Sort()
        var last = xs[xs.Count - 1]
        [xs.Count, int(xs[0]), int(xs[59]), last != last]
        "#,
    );
    let items = value.list_items().expect("list result");
    assert_eq!(expect_int(&items[0]), 72);
    assert_eq!(expect_int(&items[1]), -3);
    assert_eq!(expect_int(&items[2]), 3);
    assert_eq!(items[3].as_bool(), Some(true));
}

#[test]
fn sorting_with_an_inconsistent_comparison_terminates() {
    let value = eval(
        r#"
        class Liar {
            var n = 0
            fn Liar(v) { n = v }
            fn <(o) { return true }
            fn >(o) { return true }
        }
        var xs = []
        var i = 0
        while i < 40 {
            xs.Add(Liar(i))
            i += 1
        }
        xs.Sort()
        xs.Count
        "#,
    );
    assert_eq!(expect_int(&value), 40);
}

#[test]
fn sort_propagates_comparison_errors() {
    let err = eval_error("var xs = [1, \"a\", 2]\nxs.Sort()");
    assert_eq!(err.kind(), Some(ErrorKind::TypeMismatch));
}

#[test]
fn self_containing_lists_print_and_compare() {
    let value = eval(
        r#"
        var a = [1]
        a.Add(a)
        var b = [1]
        b.Add(b)
        var d = {"self": null}
        d["self"] = d
        [str(a), str(d), a == b, a == a]
        "#,
    );
    let items = value.list_items().expect("list result");
    assert_eq!(expect_str(&items[0]), "[1, [...]]");
    assert_eq!(expect_str(&items[1]), "{self: {...}}");
    assert_eq!(items[2].as_bool(), Some(false));
    assert_eq!(items[3].as_bool(), Some(true));
}

#[test]
fn deeply_nested_lists_compare_without_aborting() {
    let value = eval(
        r#"
        var a = []
        var b = []
        var i = 0
        while i < 3000 {
            a = [a]
            b = [b]
            i += 1
        }
        [a == b, len(str(a))]
        "#,
    );
    let items = value.list_items().expect("list result");
    assert_eq!(items[0].as_bool(), Some(true));
    assert_eq!(expect_int(&items[1]), 6002);
}

#[test]
fn list_index_out_of_range() {
    let err = eval_error("[1, 2][5]");
    assert_eq!(err.kind(), Some(ErrorKind::IndexOutOfRange));
}

#[test]
fn dict_lookup_and_missing_keys() {
    let value = eval(
        r#"
        var d = {"a": 1, "b": 2}
        d["c"] = 3
        d.Remove("a")
        [d.Count, d["c"], d.Get("zzz", 9), len(d.Keys)]
        "#,
    );
    assert_eq!(expect_ints(&value), vec![2, 3, 9, 2]);

    let err = eval_error("var d = {\"a\": 1}\nd[\"b\"]");
    assert_eq!(err.kind(), Some(ErrorKind::KeyNotFound));
}

#[test]
fn string_members() {
    let value = eval(
        r#"
        var s = "  Hello, World  ".Trim()
        [s.ToLower(), s.Substring(7), s.Replace("World", "Corvid"), s.Split(", ")[1]].Join("|")
        "#,
    );
    assert_eq!(
        expect_str(&value),
        "hello, world|World|Hello, Corvid|World"
    );
    assert_eq!(expect_int(&eval(r#""hello".Length"#)), 5);
}

#[test]
fn substring_past_the_end_is_out_of_range() {
    assert_eq!(expect_str(&eval(r#""abc".Substring(1, 2)"#)), "bc");
    let err = eval_error(r#""abc".Substring(1, 9223372036854775807)"#);
    assert_eq!(err.kind(), Some(ErrorKind::IndexOutOfRange));
    let err = eval_error(r#""abc".Substring(2, 5)"#);
    assert_eq!(err.kind(), Some(ErrorKind::IndexOutOfRange));
}

#[test]
fn range_contains_across_the_int_domain() {
    let value = eval(
        "var r = range(-9223372036854775807 - 1, 9223372036854775807)\n[r.Contains(5), r.Contains(9223372036854775807)]",
    );
    let items = value.list_items().expect("list result");
    assert_eq!(items[0].as_bool(), Some(true));
    assert_eq!(items[1].as_bool(), Some(false));
}

#[test]
fn conversions_through_constructors() {
    let value = eval(r#"[int("42"), int(3.9), len(str(120))]"#);
    assert_eq!(expect_ints(&value), vec![42, 3, 3]);
    let err = eval_error(r#"int("forty")"#);
    assert_eq!(err.kind(), Some(ErrorKind::TypeMismatch));
}

#[test]
fn typeof_returns_the_class() {
    let value = eval("typeof(1.5).Name + \"/\" + typeof([]).Name");
    assert_eq!(expect_str(&value), "float/list");
}

#[test]
fn constants_cannot_be_reassigned() {
    let err = eval_error("const limit = 3\nlimit = 4");
    assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
}

#[test]
fn redeclaring_a_variable_in_one_scope_fails() {
    let err = eval_error("var a = 1\nvar a = 2");
    assert_eq!(err.kind(), Some(ErrorKind::DuplicateDefinition));
}

#[test]
fn shadowing_in_a_block_is_allowed() {
    let value = eval("var a = 1\nif true { var a = 2 }\na");
    assert_eq!(expect_int(&value), 1);
}

#[test]
fn undefined_names_report_their_line() {
    let err = eval_error("var a = 1\n\nmissing + a");
    assert_eq!(err.kind(), Some(ErrorKind::UndefinedName));
    assert_eq!(err.line(), Some(3));
}

#[test]
fn annotated_variables_check_their_initializer() {
    assert_eq!(expect_int(&eval("var n: int = 4\nn")), 4);
    let err = eval_error(r#"var n: int = "four""#);
    assert_eq!(err.kind(), Some(ErrorKind::TypeMismatch));
}

#[test]
fn logical_operators_short_circuit() {
    let value = eval(
        r#"
        var calls = 0
        fn Touch() { calls += 1; return true }
        var a = false && Touch()
        var b = true || Touch()
        calls
        "#,
    );
    assert_eq!(expect_int(&value), 0);
}

#[test]
fn parse_errors_are_diagnostics() {
    let err = eval_error("var = 3");
    assert!(matches!(err, CorvidError::Diagnostic(_)));
    assert_eq!(err.kind(), None);
}

#[test]
fn positional_after_named_argument_is_a_parse_error() {
    let err = eval_error("fn F(a, b) { return a }\nF(a: 1, 2)");
    assert!(matches!(err, CorvidError::Diagnostic(_)));
    assert_eq!(err.kind(), None);
}

#[test]
fn host_can_classify_values() {
    assert!(eval("null").is_null());
    assert!(eval("1").is_object());
    assert!(!eval("1").is_null());
    assert!(eval("typeof(1)").is_class());
    assert!(eval("fn F() { }\nF").is_function());
}
