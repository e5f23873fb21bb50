//! Insertion-ordered hash containers backing `dict` and `set`.

use std::collections::HashMap;
use std::rc::Rc;

use super::fault::{Fault, FaultResult};
use super::value::Value;

/// Hashable projection of a [`Value`]. Numerically equal keys collapse
/// (`1`, `1.0` and `True` address the same slot).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Range(i64, i64, i64),
    Kind(&'static str),
    Ptr(usize),
}

impl HashKey {
    pub fn from_value(value: &Value) -> FaultResult<HashKey> {
        Ok(match value {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(i64::from(*b)),
            Value::Int(i) => HashKey::Int(*i),
            Value::Float(f) => float_key(*f),
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(HashKey::from_value)
                    .collect::<FaultResult<Vec<_>>>()?,
            ),
            Value::Range(r) => HashKey::Range(r.start, r.stop, r.step),
            Value::ExceptionType(kind) => HashKey::Kind(kind.name()),
            Value::Builtin(b) => HashKey::Kind(b.name),
            Value::Function(f) => HashKey::Ptr(Rc::as_ptr(f) as *const u8 as usize),
            Value::Exception(e) => HashKey::Ptr(Rc::as_ptr(e) as *const u8 as usize),
            Value::BoundMethod(m) => HashKey::Ptr(Rc::as_ptr(m) as *const u8 as usize),
            Value::Iterator(it) => HashKey::Ptr(Rc::as_ptr(it) as *const u8 as usize),
            Value::List(_) | Value::Dict(_) | Value::Set(_) => {
                return Err(Fault::type_error(format!(
                    "unhashable type: '{}'",
                    value.type_name()
                )))
            }
        })
    }
}

fn float_key(f: f64) -> HashKey {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        HashKey::Int(f as i64)
    } else {
        HashKey::Float(f.to_bits())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dict {
    index: HashMap<HashKey, usize>,
    entries: Vec<Option<(Value, Value)>>,
    len: usize,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &Value) -> FaultResult<Option<Value>> {
        let hashed = HashKey::from_value(key)?;
        Ok(self
            .index
            .get(&hashed)
            .and_then(|&slot| self.entries[slot].as_ref())
            .map(|(_, value)| value.clone()))
    }

    pub fn contains(&self, key: &Value) -> FaultResult<bool> {
        Ok(self.index.contains_key(&HashKey::from_value(key)?))
    }

    /// Inserts or overwrites. An existing equal key keeps its original object.
    pub fn insert(&mut self, key: Value, value: Value) -> FaultResult<()> {
        let hashed = HashKey::from_value(&key)?;
        match self.index.get(&hashed) {
            Some(&slot) => {
                if let Some(entry) = self.entries[slot].as_mut() {
                    entry.1 = value;
                }
            }
            None => {
                self.index.insert(hashed, self.entries.len());
                self.entries.push(Some((key, value)));
                self.len += 1;
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> FaultResult<Option<Value>> {
        let hashed = HashKey::from_value(key)?;
        let Some(slot) = self.index.remove(&hashed) else {
            return Ok(None);
        };
        let removed = self.entries[slot].take().map(|(_, value)| value);
        self.len -= 1;
        self.compact();
        Ok(removed)
    }

    /// Removes the most recently inserted entry.
    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        let slot = self.entries.iter().rposition(Option::is_some)?;
        let (key, value) = self.entries[slot].take()?;
        if let Ok(hashed) = HashKey::from_value(&key) {
            self.index.remove(&hashed);
        }
        self.len -= 1;
        self.compact();
        Some((key, value))
    }

    /// Removes the oldest entry.
    pub fn pop_first(&mut self) -> Option<(Value, Value)> {
        let slot = self.entries.iter().position(Option::is_some)?;
        let (key, value) = self.entries[slot].take()?;
        if let Ok(hashed) = HashKey::from_value(&key) {
            self.index.remove(&hashed);
        }
        self.len -= 1;
        self.compact();
        Some((key, value))
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
        self.len = 0;
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Value, &Value)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.as_ref().map(|(k, v)| (k, v)))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn compact(&mut self) {
        if self.entries.len() <= 2 * self.len + 8 {
            return;
        }
        let live: Vec<(Value, Value)> = self.entries.drain(..).flatten().collect();
        self.index.clear();
        for (slot, (key, value)) in live.into_iter().enumerate() {
            if let Ok(hashed) = HashKey::from_value(&key) {
                self.index.insert(hashed, slot);
            }
            self.entries.push(Some((key, value)));
        }
    }
}

/// A `dict` whose values are unused.
#[derive(Debug, Clone, Default)]
pub struct Set {
    inner: Dict,
}

impl Set {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> FaultResult<Self> {
        let mut set = Set::new();
        for value in values {
            set.add(value)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn add(&mut self, value: Value) -> FaultResult<()> {
        if !self.inner.contains(&value)? {
            self.inner.insert(value, Value::None)?;
        }
        Ok(())
    }

    pub fn contains(&self, value: &Value) -> FaultResult<bool> {
        self.inner.contains(value)
    }

    pub fn remove(&mut self, value: &Value) -> FaultResult<bool> {
        Ok(self.inner.remove(value)?.is_some())
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.inner.pop_first().map(|(key, _)| key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.inner.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> Vec<Value> {
        self.inner.keys()
    }

    pub fn is_subset(&self, other: &Set) -> FaultResult<bool> {
        for value in self.iter() {
            if !other.contains(value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn union(&self, other: &Set) -> FaultResult<Set> {
        let mut out = self.clone();
        for value in other.iter() {
            out.add(value.clone())?;
        }
        Ok(out)
    }

    pub fn intersection(&self, other: &Set) -> FaultResult<Set> {
        let mut out = Set::new();
        for value in self.iter() {
            if other.contains(value)? {
                out.add(value.clone())?;
            }
        }
        Ok(out)
    }

    pub fn difference(&self, other: &Set) -> FaultResult<Set> {
        let mut out = Set::new();
        for value in self.iter() {
            if !other.contains(value)? {
                out.add(value.clone())?;
            }
        }
        Ok(out)
    }

    pub fn symmetric_difference(&self, other: &Set) -> FaultResult<Set> {
        let mut out = self.difference(other)?;
        for value in other.iter() {
            if !self.contains(value)? {
                out.add(value.clone())?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_keys_collapse() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::str("int")).unwrap();
        dict.insert(Value::Float(1.0), Value::str("float")).unwrap();
        dict.insert(Value::Bool(true), Value::str("bool")).unwrap();
        assert_eq!(dict.len(), 1);
        let (key, value) = dict.iter().next().unwrap();
        assert!(matches!(key, Value::Int(1)));
        assert_eq!(value.to_str(), "bool");
    }

    #[test]
    fn preserves_insertion_order_across_removals() {
        let mut dict = Dict::new();
        for i in 0..20 {
            dict.insert(Value::Int(i), Value::Int(i * i)).unwrap();
        }
        for i in 0..15 {
            dict.remove(&Value::Int(i)).unwrap();
        }
        dict.insert(Value::Int(0), Value::None).unwrap();
        let keys: Vec<String> = dict.keys().iter().map(Value::repr).collect();
        assert_eq!(keys, ["15", "16", "17", "18", "19", "0"]);
        assert!(dict.get(&Value::Int(17)).unwrap().is_some());
    }

    #[test]
    fn lists_are_unhashable() {
        let err = HashKey::from_value(&Value::list(vec![])).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unhashable type: 'list'");
    }

    #[test]
    fn set_algebra() {
        let a = Set::from_values((1..=3).map(Value::Int)).unwrap();
        let b = Set::from_values((2..=4).map(Value::Int)).unwrap();
        assert_eq!(a.union(&b).unwrap().len(), 4);
        assert_eq!(a.intersection(&b).unwrap().len(), 2);
        assert_eq!(a.difference(&b).unwrap().len(), 1);
        assert_eq!(a.symmetric_difference(&b).unwrap().len(), 2);
        assert!(!a.is_subset(&b).unwrap());
    }
}
