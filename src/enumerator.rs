use crate::value::{ObjectRef, Payload, RangeValue, Value, ValueKey};

/// The enumerator capability behind `for` loops: `Current`, `MoveNext` and
/// `Reset`. A fresh enumerator is positioned before the first element.
pub trait Enumerator {
    fn current(&self) -> Option<Value>;
    fn move_next(&mut self) -> bool;
    fn reset(&mut self);
}

/// Walks a live list, so elements appended during iteration are visited.
pub struct ListEnumerator {
    list: ObjectRef,
    position: Option<usize>,
}

impl ListEnumerator {
    pub fn new(list: ObjectRef) -> Self {
        Self {
            list,
            position: None,
        }
    }

    fn len(&self) -> usize {
        match &*self.list.payload() {
            Payload::List(items) => items.len(),
            _ => 0,
        }
    }
}

impl Enumerator for ListEnumerator {
    fn current(&self) -> Option<Value> {
        let index = self.position?;
        match &*self.list.payload() {
            Payload::List(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    fn move_next(&mut self) -> bool {
        let next = self.position.map_or(0, |index| index + 1);
        if next < self.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.len());
            false
        }
    }

    fn reset(&mut self) {
        self.position = None;
    }
}

/// Yields `[key, value]` pairs from a snapshot of the dictionary.
pub struct DictEnumerator {
    entries: Vec<(ValueKey, Value)>,
    position: Option<usize>,
}

impl DictEnumerator {
    pub fn new(entries: Vec<(ValueKey, Value)>) -> Self {
        Self {
            entries,
            position: None,
        }
    }
}

impl Enumerator for DictEnumerator {
    fn current(&self) -> Option<Value> {
        let (key, value) = self.entries.get(self.position?)?;
        Some(Value::list(vec![key.to_value(), value.clone()]))
    }

    fn move_next(&mut self) -> bool {
        let next = self.position.map_or(0, |index| index + 1);
        self.position = Some(next.min(self.entries.len()));
        next < self.entries.len()
    }

    fn reset(&mut self) {
        self.position = None;
    }
}

pub struct StrEnumerator {
    chars: Vec<char>,
    position: Option<usize>,
}

impl StrEnumerator {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            position: None,
        }
    }
}

impl Enumerator for StrEnumerator {
    fn current(&self) -> Option<Value> {
        let ch = self.chars.get(self.position?)?;
        Some(Value::string(ch.to_string()))
    }

    fn move_next(&mut self) -> bool {
        let next = self.position.map_or(0, |index| index + 1);
        self.position = Some(next.min(self.chars.len()));
        next < self.chars.len()
    }

    fn reset(&mut self) {
        self.position = None;
    }
}

pub struct RangeEnumerator {
    range: RangeValue,
    current: Option<i64>,
    done: bool,
}

impl RangeEnumerator {
    pub fn new(range: RangeValue) -> Self {
        Self {
            range,
            current: None,
            done: false,
        }
    }
}

impl Enumerator for RangeEnumerator {
    fn current(&self) -> Option<Value> {
        if self.done {
            return None;
        }
        self.current.map(Value::int)
    }

    fn move_next(&mut self) -> bool {
        if self.done {
            return false;
        }
        let next = match self.current {
            None => Some(self.range.start),
            Some(current) => current.checked_add(self.range.step),
        };
        match next {
            Some(value) if self.range.contains(value) => {
                self.current = Some(value);
                true
            }
            _ => {
                self.done = true;
                false
            }
        }
    }

    fn reset(&mut self) {
        self.current = None;
        self.done = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut enumerator: impl Enumerator) -> Vec<String> {
        let mut seen = Vec::new();
        while enumerator.move_next() {
            seen.push(enumerator.current().expect("current").to_string());
        }
        assert!(enumerator.current().is_none());
        seen
    }

    #[test]
    fn range_enumerator_counts_up() {
        assert_eq!(drain(RangeEnumerator::new(RangeValue::new(0, 3, 1))), ["0", "1", "2"]);
    }

    #[test]
    fn list_enumerator_resets() {
        let list = Value::list(vec![Value::int(1), Value::int(2)]);
        let object = list.as_object().expect("object").clone();
        let mut enumerator = ListEnumerator::new(object);
        assert!(enumerator.move_next());
        assert!(enumerator.move_next());
        assert!(!enumerator.move_next());
        enumerator.reset();
        assert!(enumerator.move_next());
        assert_eq!(enumerator.current().and_then(|v| v.as_int()), Some(1));
    }

    #[test]
    fn str_enumerator_yields_chars() {
        assert_eq!(drain(StrEnumerator::new("ab")), ["a", "b"]);
    }
}
