//! Ordered (pattern, handler) lists for components and directives.
//!
//! Lookup walks entries in registration order and returns the first match.
//! A miss is not an error: callers fall back to plain interpolation.

use std::fmt;
use std::rc::Rc;

/// Name pattern: an exact (case-insensitive) name or a predicate.
#[derive(Clone)]
pub enum Pattern {
    Exact(String),
    Predicate(Rc<dyn Fn(&str) -> bool>),
}

impl Pattern {
    pub fn exact(name: impl Into<String>) -> Self {
        Pattern::Exact(name.into().to_lowercase())
    }

    pub fn predicate(f: impl Fn(&str) -> bool + 'static) -> Self {
        Pattern::Predicate(Rc::new(f))
    }

    /// Names reaching the registry are lowercase (html5ever lowercases tag
    /// and attribute names), so exact patterns are stored lowercase too.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Exact(exact) => exact.eq_ignore_ascii_case(name),
            Pattern::Predicate(f) => f(name),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(name) => write!(f, "Exact({:?})", name),
            Pattern::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for Pattern {
    fn from(name: &str) -> Self {
        Pattern::exact(name)
    }
}

impl From<String> for Pattern {
    fn from(name: String) -> Self {
        Pattern::exact(name)
    }
}

/// Append-only matcher list.
pub struct Registry<H> {
    entries: Vec<(Pattern, H)>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H> fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(pattern, _)| pattern))
            .finish()
    }
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pattern: impl Into<Pattern>, handler: H) {
        self.entries.push((pattern.into(), handler));
    }

    /// First handler whose pattern accepts `name`.
    pub fn resolve(&self, name: &str) -> Option<&H> {
        self.entries
            .iter()
            .find(|(pattern, _)| pattern.matches(name))
            .map(|(_, handler)| handler)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
