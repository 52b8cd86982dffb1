//! Named value transforms applied with `{{ value | name:arg }}`.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// A filter receives the piped value and its evaluated arguments.
pub type Filter = Rc<dyn Fn(&Value, &[Value]) -> Value>;

#[derive(Clone, Default)]
pub struct Filters {
    map: HashMap<String, Filter>,
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.map.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `upper`, `lower`, `trim`, `json` and `default:<fallback>`.
    pub fn builtin() -> Self {
        let mut filters = Self::new();
        filters.insert("upper", |v, _| Value::String(v.to_display().to_uppercase()));
        filters.insert("lower", |v, _| Value::String(v.to_display().to_lowercase()));
        filters.insert("trim", |v, _| Value::String(v.to_display().trim().to_string()));
        filters.insert("json", |v, _| Value::String(v.to_json().to_string()));
        filters.insert("default", |v, args| {
            if v.truthy() {
                v.clone()
            } else {
                args.first().cloned().unwrap_or_default()
            }
        });
        filters
    }

    /// Register (or replace) a filter.
    pub fn insert(&mut self, name: &str, filter: impl Fn(&Value, &[Value]) -> Value + 'static) {
        self.map.insert(name.to_string(), Rc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let filters = Filters::builtin();
        let upper = filters.get("upper").unwrap();
        assert_eq!(upper(&Value::from("abc"), &[]), Value::from("ABC"));

        let default = filters.get("default").unwrap();
        assert_eq!(default(&Value::Null, &[Value::from("n/a")]), Value::from("n/a"));
        assert_eq!(default(&Value::from("x"), &[Value::from("n/a")]), Value::from("x"));
    }

    #[test]
    fn test_insert_replaces() {
        let mut filters = Filters::builtin();
        filters.insert("upper", |_, _| Value::from("custom"));
        let upper = filters.get("upper").unwrap();
        assert_eq!(upper(&Value::from("abc"), &[]), Value::from("custom"));
        assert!(!filters.contains("missing"));
    }
}
