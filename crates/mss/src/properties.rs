//! Property maps with insertion-order and specificity metadata.

use crate::color::Color;
use crate::value::{Stop, Value};
use std::collections::HashMap;

/// Source position of a declaration, including the per-compile insertion
/// index used as the specificity tiebreaker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub index: u32,
}

/// Rule specificity. Compared lexicographically: layer beats class beats
/// filter count; the declaration index preserves source order between
/// otherwise equal rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    pub layer: u16,
    pub class: u16,
    pub filters: u16,
    pub index: u32,
}

/// Property key: the name plus an optional instance qualifier
/// (`a/line-width` has instance `a`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub name: String,
    pub instance: String,
}

impl Key {
    pub fn new(name: &str) -> Key {
        Key { name: name.to_string(), instance: String::new() }
    }

    pub fn instanced(name: &str, instance: &str) -> Key {
        Key { name: name.to_string(), instance: instance.to_string() }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Attr {
    pub value: Value,
    pub pos: Pos,
    pub specificity: Specificity,
}

/// Mapping from property keys to values plus cascade metadata.
///
/// `default_instance` scopes the plain getters while the emitter walks
/// the prefixes of a rule one instance at a time.
#[derive(Clone, Debug, Default)]
pub struct Properties {
    values: HashMap<Key, Attr>,
    default_instance: String,
}

/// Earliest declaration index for a (prefix, instance) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PrefixPos {
    prefix: String,
    instance: String,
    index: u32,
}

/// A symbolizer prefix occurrence: the prefix name and the instance it
/// was declared under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prefix {
    pub name: String,
    pub instance: String,
}

impl Properties {
    pub fn new() -> Properties {
        Properties::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Set a value, assigning the next free declaration index. Intended
    /// for building property sets outside the parser (tests, tools).
    pub fn set(&mut self, name: &str, value: Value) {
        self.set_instance(name, "", value);
    }

    pub fn set_instance(&mut self, name: &str, instance: &str, value: Value) {
        let index = self.values.values().map(|a| a.pos.index + 1).max().unwrap_or(0);
        self.set_pos(
            Key::instanced(name, instance),
            value,
            Pos { line: 0, column: 0, index },
        );
    }

    pub(crate) fn set_pos(&mut self, key: Key, value: Value, pos: Pos) {
        self.values.insert(
            key,
            Attr {
                value,
                pos,
                specificity: Specificity { index: pos.index, ..Specificity::default() },
            },
        );
    }

    /// Rewrite the specificity of a property, keeping its original index.
    pub(crate) fn set_specificity(&mut self, key: &Key, specificity: Specificity) {
        if let Some(attr) = self.values.get_mut(key) {
            let index = attr.specificity.index;
            attr.specificity = Specificity { index, ..specificity };
        }
    }

    /// Adopt properties from `other` that are missing here or carry a
    /// higher specificity than the local entry.
    pub(crate) fn update_missing(&mut self, other: &Properties) {
        for (key, attr) in &other.values {
            match self.values.get(key) {
                Some(existing) if existing.specificity >= attr.specificity => {}
                _ => {
                    self.values.insert(key.clone(), attr.clone());
                }
            }
        }
    }

    pub(crate) fn keys(&self) -> Vec<Key> {
        self.values.keys().cloned().collect()
    }

    /// Scope the plain getters to `instance`.
    pub fn set_default_instance(&mut self, instance: &str) {
        self.default_instance = instance.to_string();
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(&Key::instanced(name, &self.default_instance))
            .map(|a| &a.value)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Strings and URL literals; file-valued properties accept either.
    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::Str(s) => Some(s.clone()),
            Value::Url(u) => Some(u.clone()),
            _ => None,
        }
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_color(&self, name: &str) -> Option<Color> {
        match self.get(name)? {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn get_float_list(&self, name: &str) -> Option<Vec<f64>> {
        match self.get(name)? {
            Value::List(items) => items.iter().map(Value::as_num).collect(),
            _ => None,
        }
    }

    /// A single string is accepted as a one-element list.
    pub fn get_string_list(&self, name: &str) -> Option<Vec<String>> {
        match self.get(name)? {
            Value::Str(s) => Some(vec![s.clone()]),
            Value::List(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// Field expressions: a mix of attribute references and literal
    /// strings. A single string is treated as one field reference.
    pub fn get_field_list(&self, name: &str) -> Option<Vec<Value>> {
        match self.get(name)? {
            Value::Str(s) => Some(vec![Value::Field(s.clone())]),
            Value::Field(f) => Some(vec![Value::Field(f.clone())]),
            Value::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    pub fn get_stop_list(&self, name: &str) -> Option<Vec<Stop>> {
        match self.get(name)? {
            Value::Stop(s) => Some(vec![*s]),
            Value::List(items) => items
                .iter()
                .map(|v| match v {
                    Value::Stop(s) => Some(*s),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    /// All (key, value) pairs ordered by declaration index.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        let mut entries: Vec<(&Key, &Attr)> = self.values.iter().collect();
        entries.sort_by(|(ka, aa), (kb, ab)| {
            aa.specificity
                .index
                .cmp(&ab.specificity.index)
                .then_with(|| ka.name.cmp(&kb.name))
                .then_with(|| ka.instance.cmp(&kb.instance))
        });
        entries
            .into_iter()
            .map(|(k, a)| (k.clone(), a.value.clone()))
            .collect()
    }

    fn min_prefix_pos(&self, prefix: &str) -> Vec<PrefixPos> {
        let mut instance_index: HashMap<&str, u32> = HashMap::new();
        for (key, attr) in &self.values {
            if key.name.starts_with(prefix) {
                let entry = instance_index.entry(key.instance.as_str()).or_insert(u32::MAX);
                if attr.specificity.index < *entry {
                    *entry = attr.specificity.index;
                }
            }
        }
        instance_index
            .into_iter()
            .map(|(instance, index)| PrefixPos {
                prefix: prefix.to_string(),
                instance: instance.to_string(),
                index,
            })
            .collect()
    }

    /// The (prefix, instance) pairs present in this property set, ordered
    /// by their earliest declaration. Ties prefer the longer prefix, so
    /// `line-pattern-` sorts before `line-` when both match the same
    /// property.
    pub fn sorted_prefixes(&self, prefixes: &[&str]) -> Vec<Prefix> {
        let mut positions: Vec<PrefixPos> = Vec::new();
        for prefix in prefixes {
            positions.extend(self.min_prefix_pos(prefix));
        }
        positions.sort_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then(b.prefix.len().cmp(&a.prefix.len()))
                .then(a.instance.cmp(&b.instance))
        });
        positions
            .into_iter()
            .map(|p| Prefix { name: p.prefix, instance: p.instance })
            .collect()
    }
}

/// A copy of `a` with `b`'s properties filled into the gaps.
pub(crate) fn combine_properties(a: &Properties, b: &Properties) -> Properties {
    let mut out = a.clone();
    out.update_missing(b);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_instance_scopes_getters() {
        let mut p = Properties::new();
        p.set_instance("line-width", "a", Value::Num(1.0));
        p.set_instance("line-width", "b", Value::Num(2.0));
        p.set("line-width", Value::Num(3.0));

        assert_eq!(p.get_float("line-width"), Some(3.0));
        p.set_default_instance("a");
        assert_eq!(p.get_float("line-width"), Some(1.0));
        p.set_default_instance("b");
        assert_eq!(p.get_float("line-width"), Some(2.0));
    }

    #[test]
    fn update_missing_respects_specificity() {
        let mut low = Properties::new();
        low.set("line-width", Value::Num(1.0));
        low.set_specificity(
            &Key::new("line-width"),
            Specificity { layer: 1, ..Specificity::default() },
        );

        let mut high = Properties::new();
        high.set("line-width", Value::Num(4.0));
        high.set("line-cap", Value::Str("round".into()));
        high.set_specificity(
            &Key::new("line-width"),
            Specificity { layer: 1, class: 1, ..Specificity::default() },
        );

        low.update_missing(&high);
        assert_eq!(low.get_float("line-width"), Some(4.0));
        assert_eq!(low.get_string("line-cap"), Some("round".to_string()));

        // the other direction must not overwrite
        let mut high2 = high.clone();
        let mut low2 = Properties::new();
        low2.set("line-width", Value::Num(1.0));
        high2.update_missing(&low2);
        assert_eq!(high2.get_float("line-width"), Some(4.0));
    }

    #[test]
    fn sorted_prefixes_by_first_index_then_length() {
        let mut p = Properties::new();
        p.set("text-size", Value::Num(10.0));
        p.set("line-pattern-file", Value::Str("x.png".into()));
        p.set("polygon-fill", Value::Str("red".into()));

        let prefixes = p.sorted_prefixes(&["line-", "polygon-", "text-", "line-pattern-"]);
        let names: Vec<&str> = prefixes.iter().map(|p| p.name.as_str()).collect();
        // line-pattern-file matches both "line-" and "line-pattern-" at the
        // same index; the longer prefix must come first.
        assert_eq!(names, vec!["text-", "line-pattern-", "line-", "polygon-"]);
    }

    #[test]
    fn prefixes_track_instances_separately() {
        let mut p = Properties::new();
        p.set_instance("line-width", "a", Value::Num(1.0));
        p.set_instance("line-width", "b", Value::Num(2.0));
        let prefixes = p.sorted_prefixes(&["line-"]);
        assert_eq!(prefixes.len(), 2);
        assert_eq!(prefixes[0].instance, "a");
        assert_eq!(prefixes[1].instance, "b");
    }

    #[test]
    fn typed_getters() {
        let mut p = Properties::new();
        p.set("widths", Value::List(vec![Value::Num(4.0), Value::Num(2.0)]));
        p.set("names", Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]));
        p.set("label", Value::Str("[name]".into()));
        p.set("file", Value::Url("img/fill.png".into()));
        assert_eq!(p.get_string("file"), Some("img/fill.png".to_string()));
        assert_eq!(p.get_float_list("widths"), Some(vec![4.0, 2.0]));
        assert_eq!(p.get_string_list("names"), Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(p.get_field_list("label"), Some(vec![Value::Field("[name]".into())]));
        assert_eq!(p.get_float_list("names"), None);
    }
}
