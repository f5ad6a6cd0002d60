// ABOUTME: VariableBag - per-event mapping of named capture groups to captured text
// ABOUTME: The only channel through which handlers receive parsed arguments

use std::collections::HashMap;

/// Named capture results for one dispatched event.
///
/// Built fresh per match and owned by the task handling that event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableBag {
    values: HashMap<String, String>,
}

impl VariableBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any earlier value under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Value for `name`, or the empty string when absent
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// True when `name` was captured with non-empty text
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.values
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_overwrites() {
        let mut bag = VariableBag::new();
        bag.insert("key", "first");
        bag.insert("key", "second");
        assert_eq!(bag.get("key"), Some("second"));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_is_set() {
        let bag: VariableBag = [("a", "x"), ("b", "")].into_iter().collect();
        assert!(bag.is_set("a"));
        assert!(!bag.is_set("b"));
        assert!(!bag.is_set("c"));
        assert_eq!(bag.get_or_empty("c"), "");
    }
}
