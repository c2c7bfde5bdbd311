//! JSON5 reading and writing behind the static `Json5` class.
//!
//! The reader accepts the JSON5 extensions scripts are likely to meet:
//! comments, trailing commas, unquoted keys, single-quoted strings, hex
//! integers, `Infinity`/`NaN` and explicit `+` signs, nested at most
//! [`MAX_NESTING`] deep. The writer emits plain JSON plus the non-finite float
//! literals, and rejects cyclic data and dicts with non-string keys.

use std::rc::Rc;

use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::{
    class::{is_settable, ClassRef},
    diagnostics::{fail, CorvidError, ErrorKind, Result, SourceSpan},
    function::Parameter,
    runtime::{ensure_stack, Interpreter},
    scope::{Accessibility, Storage},
    stdlib::{static_method, BuiltinClasses},
    value::{format_float, ObjectRef, Payload, Value, ValueKey},
};

/// A parsed JSON5 document, before it becomes script values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Json {
    Null,
    Bool(bool),
    Int(i64),
    /// Keeps the source text so decimal targets see every digit.
    Float { value: f64, text: String },
    String(String),
    Array(Vec<Json>),
    Object(Vec<(String, Json)>),
}

/// Deepest array/object nesting the reader accepts.
pub const MAX_NESTING: usize = 512;

pub(crate) fn parse(source: &str) -> Result<Json> {
    let mut reader = Reader {
        src: source,
        pos: 0,
        depth: 0,
    };
    reader.skip_trivia()?;
    let value = reader.parse_value()?;
    reader.skip_trivia()?;
    if reader.pos != source.len() {
        return Err(reader.error("unexpected trailing characters"));
    }
    Ok(value)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn parse_value(&mut self) -> Result<Json> {
        match self.peek() {
            Some(open @ ('{' | '[')) => {
                if self.depth == MAX_NESTING {
                    return Err(self.error(format!("nesting deeper than {MAX_NESTING} levels")));
                }
                self.depth += 1;
                let nested = ensure_stack(|| {
                    if open == '{' {
                        self.parse_object()
                    } else {
                        self.parse_array()
                    }
                });
                self.depth -= 1;
                nested
            }
            Some(quote @ ('"' | '\'')) => Ok(Json::String(self.parse_string(quote)?)),
            Some('0'..='9' | '-' | '+' | '.' | 'I' | 'N') => self.parse_number(),
            Some(c) if is_identifier_start(c) => {
                let word = self.identifier();
                match word {
                    "null" => Ok(Json::Null),
                    "true" => Ok(Json::Bool(true)),
                    "false" => Ok(Json::Bool(false)),
                    _ => Err(self.error(format!("unexpected identifier `{word}`"))),
                }
            }
            Some(c) => Err(self.error(format!("unexpected character `{c}`"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_object(&mut self) -> Result<Json> {
        self.expect('{')?;
        let mut entries = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.eat('}') {
                return Ok(Json::Object(entries));
            }
            let key = match self.peek() {
                Some(quote @ ('"' | '\'')) => self.parse_string(quote)?,
                Some(c) if is_identifier_start(c) => self.identifier().to_string(),
                _ => return Err(self.error("expected an object key")),
            };
            self.skip_trivia()?;
            self.expect(':')?;
            self.skip_trivia()?;
            let value = self.parse_value()?;
            entries.push((key, value));
            self.skip_trivia()?;
            if !self.eat(',') {
                self.skip_trivia()?;
                self.expect('}')?;
                return Ok(Json::Object(entries));
            }
        }
    }

    fn parse_array(&mut self) -> Result<Json> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.eat(']') {
                return Ok(Json::Array(items));
            }
            items.push(self.parse_value()?);
            self.skip_trivia()?;
            if !self.eat(',') {
                self.skip_trivia()?;
                self.expect(']')?;
                return Ok(Json::Array(items));
            }
        }
    }

    fn parse_number(&mut self) -> Result<Json> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.pos += 1;
                true
            }
            Some('+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        let sign = if negative { -1.0 } else { 1.0 };

        if self.starts_with("Infinity") {
            self.pos += "Infinity".len();
            return Ok(self.float(sign * f64::INFINITY, start));
        }
        if self.starts_with("NaN") {
            self.pos += "NaN".len();
            return Ok(self.float(f64::NAN, start));
        }
        if self.starts_with("0x") || self.starts_with("0X") {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.src[digits_start..self.pos];
            let magnitude = i64::from_str_radix(digits, 16)
                .map_err(|_| self.error(format!("invalid hex literal `0x{digits}`")))?;
            return Ok(Json::Int(if negative { -magnitude } else { magnitude }));
        }

        let digits_start = self.pos;
        let mut is_float = false;
        self.digits();
        if self.eat('.') {
            is_float = true;
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            if self.digits() == 0 {
                return Err(self.error("missing exponent digits"));
            }
        }
        let unsigned = &self.src[digits_start..self.pos];
        if unsigned.is_empty() || unsigned == "." {
            return Err(self.error("invalid number"));
        }
        let text = if negative {
            format!("-{unsigned}")
        } else {
            unsigned.to_string()
        };
        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Json::Int(n));
            }
        }
        match text.parse::<f64>() {
            Ok(value) => Ok(Json::Float { value, text }),
            Err(_) => Err(self.error(format!("invalid number `{text}`"))),
        }
    }

    fn float(&self, value: f64, start: usize) -> Json {
        Json::Float {
            value,
            text: self.src[start..self.pos].to_string(),
        }
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn parse_string(&mut self, quote: char) -> Result<String> {
        self.expect(quote)?;
        let mut text = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string"));
            };
            match c {
                c if c == quote => return Ok(text),
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(self.error("unterminated escape"));
                    };
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        'b' => text.push('\u{8}'),
                        'f' => text.push('\u{c}'),
                        'v' => text.push('\u{b}'),
                        '0' => text.push('\0'),
                        'u' => text.push(self.unicode_escape()?),
                        // Line continuation.
                        '\n' => {}
                        '\r' => {
                            self.eat('\n');
                        }
                        other => text.push(other),
                    }
                }
                '\n' | '\r' => return Err(self.error("newline in string")),
                other => text.push(other),
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char> {
        let code = self.hex4()?;
        if (0xD800..0xDC00).contains(&code) && self.starts_with("\\u") {
            self.pos += 2;
            let low = self.hex4()?;
            let combined = 0x10000 + ((code - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
            return char::from_u32(combined).ok_or_else(|| self.error("invalid surrogate pair"));
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode escape"))
    }

    fn hex4(&mut self) -> Result<u32> {
        let digits = self
            .src
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| self.error("truncated unicode escape"))?;
        let code = u32::from_str_radix(digits, 16)
            .map_err(|_| self.error(format!("invalid unicode escape `{digits}`")))?;
        self.pos += 4;
        Ok(code)
    }

    fn identifier(&mut self) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_part) {
            self.bump();
        }
        &src[start..self.pos]
    }

    /// Skips whitespace, `//` line comments and `/* */` block comments.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.starts_with("//") => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                Some('/') if self.starts_with("/*") => {
                    let Some(end) = self.src[self.pos + 2..].find("*/") else {
                        return Err(self.error("unterminated block comment"));
                    };
                    self.pos += end + 4;
                }
                _ => return Ok(()),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{expected}`")))
        }
    }

    fn starts_with(&self, token: &str) -> bool {
        self.src[self.pos..].starts_with(token)
    }

    fn error(&self, message: impl Into<String>) -> CorvidError {
        let consumed = &self.src[..self.pos];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.len() - consumed.rfind('\n').map_or(0, |idx| idx + 1) + 1;
        CorvidError::runtime(
            ErrorKind::InvalidOperation,
            format!("JSON5 error at {line}:{column}: {}", message.into()),
        )
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

impl Json {
    /// Plain conversion: objects become dicts keyed by string.
    pub(crate) fn into_value(self) -> Value {
        match self {
            Json::Null => Value::null(),
            Json::Bool(flag) => Value::bool(flag),
            Json::Int(n) => Value::int(n),
            Json::Float { value, .. } => Value::float(value),
            Json::String(text) => Value::string(text),
            Json::Array(items) => Value::list(items.into_iter().map(Json::into_value).collect()),
            Json::Object(entries) => {
                let map: IndexMap<ValueKey, Value> = entries
                    .into_iter()
                    .map(|(key, value)| (ValueKey::Str(Rc::from(key)), value.into_value()))
                    .collect();
                Value::dict(map)
            }
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Json::Int(n) => Some(Decimal::from(*n)),
            Json::Float { text, .. } => text
                .parse::<Decimal>()
                .ok()
                .or_else(|| Decimal::from_scientific(text).ok()),
            _ => None,
        }
    }
}

/// Serializes `value` to JSON5 text.
pub fn serialize(interpreter: &mut Interpreter, value: &Value) -> Result<String> {
    let mut out = String::new();
    let mut path = Vec::new();
    write_value(interpreter, value, &mut out, &mut path)?;
    Ok(out)
}

fn write_value(
    interpreter: &mut Interpreter,
    value: &Value,
    out: &mut String,
    path: &mut Vec<usize>,
) -> Result<()> {
    let object = match value {
        Value::Object(object) => object,
        other => {
            return fail(
                ErrorKind::TypeMismatch,
                format!("cannot serialize a value of type `{}`", other.type_name()),
            );
        }
    };
    let scalar = match &*object.payload() {
        Payload::Null => Some("null".to_string()),
        Payload::Bool(flag) => Some(flag.to_string()),
        Payload::Int(n) => Some(n.to_string()),
        Payload::Float(n) => Some(float_text(*n)),
        Payload::Decimal(n) => Some(n.to_string()),
        Payload::Str(text) => Some(quote(text)),
        Payload::Range(range) => Some(format!(
            "[{}]",
            range.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",")
        )),
        Payload::Enumerator(_) | Payload::Foreign(_) => {
            return fail(
                ErrorKind::TypeMismatch,
                format!("cannot serialize a value of type `{}`", object.class.name),
            );
        }
        Payload::List(_) | Payload::Dict(_) | Payload::None => None,
    };
    if let Some(text) = scalar {
        out.push_str(&text);
        return Ok(());
    }

    let identity = value.identity();
    if path.contains(&identity) {
        return fail(
            ErrorKind::InvalidOperation,
            format!("cannot serialize a circular reference through `{}`", object.class.name),
        );
    }
    path.push(identity);
    let result = ensure_stack(|| write_compound(interpreter, value, object, out, path));
    path.pop();
    result
}

fn write_compound(
    interpreter: &mut Interpreter,
    value: &Value,
    object: &ObjectRef,
    out: &mut String,
    path: &mut Vec<usize>,
) -> Result<()> {
    if let Some(items) = value.list_items() {
        out.push('[');
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            write_value(interpreter, item, out, path)?;
        }
        out.push(']');
        return Ok(());
    }
    let members = match value.dict_entries() {
        Some(entries) => {
            let mut members = Vec::with_capacity(entries.len());
            for (key, item) in entries {
                let ValueKey::Str(text) = &key else {
                    return fail(
                        ErrorKind::TypeMismatch,
                        format!("cannot serialize dict key `{}`; keys must be str", key.to_value()),
                    );
                };
                members.push((text.to_string(), item));
            }
            members
        }
        None => serializable_members(interpreter, value, object)?,
    };
    out.push('{');
    for (idx, (key, item)) in members.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&quote(key));
        out.push(':');
        write_value(interpreter, item, out, path)?;
    }
    out.push('}');
    Ok(())
}

/// Public fields of a script instance, then its public read-write properties.
fn serializable_members(
    interpreter: &mut Interpreter,
    value: &Value,
    object: &ObjectRef,
) -> Result<Vec<(String, Value)>> {
    let mut members = Vec::new();
    if let Some(scope) = object.scope() {
        for (name, variable) in scope.borrow().variables() {
            if let (Storage::Slot(field), Accessibility::Public) =
                (&variable.storage, variable.accessibility)
            {
                members.push((name.clone(), field.clone()));
            }
        }
    }
    for name in property_names(&object.class) {
        let current = interpreter.get_member(value, &name, SourceSpan::default())?;
        members.push((name, current));
    }
    Ok(members)
}

fn property_names(class: &ClassRef) -> Vec<String> {
    class
        .scope
        .borrow()
        .variables()
        .filter(|(_, variable)| {
            matches!(variable.storage, Storage::Accessor { .. })
                && !variable.is_static
                && variable.accessibility == Accessibility::Public
                && is_settable(variable)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

fn float_text(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else {
        format_float(value)
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if (c as u32) < 0x20 => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Builds an instance of `class` from a parsed object. Field initializers
/// run first; each key then overwrites the public field or property of that
/// name, widening numbers to the kind the field already holds.
pub(crate) fn deserialize(interpreter: &mut Interpreter, json: Json, class: &ClassRef) -> Result<Value> {
    let Json::Object(entries) = json else {
        return fail(
            ErrorKind::TypeMismatch,
            format!("`{}` can only be read from a JSON5 object", class.name),
        );
    };
    let object = interpreter.instantiate(class)?;
    let target = Value::Object(Rc::clone(&object));
    let properties = property_names(class);
    for (key, json) in entries {
        let is_field = object.scope().is_some_and(|scope| {
            scope
                .borrow()
                .variable(&key)
                .is_some_and(|variable| variable.accessibility == Accessibility::Public)
        });
        if is_field {
            let current = object.field(&key).unwrap_or_else(Value::null);
            let value = convert(interpreter, json, &current)?;
            object.set_field(&key, value);
        } else if properties.contains(&key) {
            let current = interpreter.get_member(&target, &key, SourceSpan::default())?;
            let value = convert(interpreter, json, &current)?;
            interpreter.set_member(&target, &key, value, SourceSpan::default())?;
        }
    }
    Ok(target)
}

fn convert(interpreter: &mut Interpreter, json: Json, current: &Value) -> Result<Value> {
    let builtins = crate::stdlib::builtins();
    let class = current.class();
    if Rc::ptr_eq(&class, &builtins.decimal) {
        if let Some(n) = json.as_decimal() {
            return Ok(Value::decimal(n));
        }
    }
    if Rc::ptr_eq(&class, &builtins.float) {
        if let Json::Int(n) = json {
            return Ok(Value::float(n as f64));
        }
    }
    if let Json::Object(_) = &json {
        if let Some(object) = current.as_object() {
            if object.scope().is_some() && object.class.builtin.is_none() {
                let nested = Rc::clone(&object.class);
                return deserialize(interpreter, json, &nested);
            }
        }
    }
    Ok(json.into_value())
}

pub(crate) fn install(b: &BuiltinClasses) {
    static_method(
        &b.json5,
        "Serialize",
        vec![Parameter::any("value")],
        |interpreter, invocation| {
            let value = invocation.arg(0)?.clone();
            serialize(interpreter, &value).map(Value::string)
        },
    );
    static_method(
        &b.json5,
        "Parse",
        vec![Parameter::typed("text", &[&b.str])],
        |_, invocation| {
            let text = invocation.arg(0)?.expect_str()?;
            parse(&text).map(Json::into_value)
        },
    );
    static_method(
        &b.json5,
        "Deserialize",
        vec![
            Parameter::typed("text", &[&b.str]),
            Parameter::typed("type", &[&b.type_]),
        ],
        |interpreter, invocation| {
            let text = invocation.arg(0)?.expect_str()?;
            let class = invocation.arg(1)?.expect_class()?;
            if class.is_static || class.builtin.is_some() || class.foreign.is_some() {
                return fail(
                    ErrorKind::InvalidOperation,
                    format!("cannot deserialize into `{}`", class.name),
                );
            }
            let json = parse(&text)?;
            deserialize(interpreter, json, &class)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_json5_extensions() {
        let json = parse(
            "// settings\n{ name: 'corvid', /* inline */ hex: 0x1F, ratio: +.5, list: [1, 2,], }",
        )
        .expect("parsed");
        let Json::Object(entries) = json else {
            panic!("expected an object");
        };
        assert_eq!(entries[0], ("name".into(), Json::String("corvid".into())));
        assert_eq!(entries[1], ("hex".into(), Json::Int(31)));
        assert!(matches!(&entries[2].1, Json::Float { value, .. } if *value == 0.5));
        assert_eq!(entries[3].1, Json::Array(vec![Json::Int(1), Json::Int(2)]));
    }

    #[test]
    fn reads_non_finite_numbers() {
        assert!(matches!(
            parse("-Infinity"),
            Ok(Json::Float { value, .. }) if value == f64::NEG_INFINITY
        ));
        assert!(matches!(parse("NaN"), Ok(Json::Float { value, .. }) if value.is_nan()));
    }

    #[test]
    fn keeps_decimal_digits() {
        let json = parse("12.345678901234567890").expect("parsed");
        assert_eq!(
            json.as_decimal().map(|d| d.to_string()),
            Some("12.345678901234567890".to_string())
        );
    }

    #[test]
    fn reports_position_of_errors() {
        let err = parse("{\n  a: }").expect_err("invalid");
        assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
        assert!(err.to_string().contains("2:"), "{err}");
    }

    #[test]
    fn limits_nesting_depth() {
        let deepest = "[".repeat(MAX_NESTING) + &"]".repeat(MAX_NESTING);
        assert!(parse(&deepest).is_ok());
        let too_deep = "{a:".repeat(MAX_NESTING + 1) + "1" + &"}".repeat(MAX_NESTING + 1);
        let err = parse(&too_deep).expect_err("too deep");
        assert_eq!(err.kind(), Some(ErrorKind::InvalidOperation));
        assert!(err.to_string().contains("nesting"), "{err}");
    }

    #[test]
    fn quotes_control_characters() {
        assert_eq!(quote("a\"b\n"), "\"a\\\"b\\n\"");
    }
}
