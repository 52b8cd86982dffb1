//! Reactive key→value store read by views and bindings.
//!
//! `Scope` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Subscribers are stored as `Weak` callbacks and pruned lazily during
//! notification; the [`Subscription`] guard keeps the callback alive.
//!
//! # Invariants
//!
//! 1. `set` with a value equal to the stored one is a no-op (no notification).
//! 2. Subscribers are notified in registration order.
//! 3. Callbacks run outside any interior borrow, so they may read or write
//!    the scope.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::scheduler::Scheduler;
use crate::value::Value;

type Callback = dyn Fn();

struct Subscriber {
    paths: Vec<String>,
    callback: Weak<Callback>,
}

struct ScopeInner {
    data: RefCell<BTreeMap<String, Value>>,
    subscribers: RefCell<Vec<Subscriber>>,
    scheduler: Scheduler,
    version: Cell<u64>,
}

/// Guard returned by [`Scope::on_change`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _callback: Rc<Callback>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscription")
    }
}

/// Cheap-clone handle to a reactive data store.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("data", &self.inner.data.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

/// `true` when a change to `changed` can affect a reader of `path`.
pub fn paths_overlap(path: &str, changed: &str) -> bool {
    fn is_prefix(prefix: &str, of: &str) -> bool {
        of.len() > prefix.len() && of.starts_with(prefix) && of.as_bytes()[prefix.len()] == b'.'
    }
    path == changed || is_prefix(changed, path) || is_prefix(path, changed)
}

impl Scope {
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                data: RefCell::new(BTreeMap::new()),
                subscribers: RefCell::new(Vec::new()),
                scheduler: scheduler.clone(),
                version: Cell::new(0),
            }),
        }
    }

    /// Seed a scope from a JSON object. Non-object values yield an empty scope.
    pub fn from_json(scheduler: &Scheduler, json: serde_json::Value) -> Self {
        let scope = Self::new(scheduler);
        if let Value::Map(map) = Value::from(json) {
            *scope.inner.data.borrow_mut() = map;
        }
        scope
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Number of effective mutations so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a dotted path. Missing paths read as `Null`.
    pub fn get(&self, path: &str) -> Value {
        let data = self.inner.data.borrow();
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let Some(root) = data.get(head) else {
            return Value::Null;
        };
        match rest {
            Some(rest) => root.lookup(rest).cloned().unwrap_or_default(),
            None => root.clone(),
        }
    }

    pub fn get_many<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Vec<Value> {
        paths.into_iter().map(|path| self.get(path)).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.data.borrow().keys().cloned().collect()
    }

    /// Write `value` under `key` (dotted keys write into nested maps) and
    /// notify overlapping subscribers if the stored value changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let changed = {
            let mut data = self.inner.data.borrow_mut();
            write_path(&mut data, key, value)
        };
        if !changed {
            return;
        }
        self.inner.version.set(self.inner.version.get() + 1);
        self.notify(key);
    }

    /// Subscribe to changes of any of `paths`.
    pub fn on_change<S: AsRef<str>>(
        &self,
        paths: impl IntoIterator<Item = S>,
        callback: impl Fn() + 'static,
    ) -> Subscription {
        let callback: Rc<Callback> = Rc::new(callback);
        self.inner.subscribers.borrow_mut().push(Subscriber {
            paths: paths.into_iter().map(|p| p.as_ref().to_string()).collect(),
            callback: Rc::downgrade(&callback),
        });
        Subscription {
            _callback: callback,
        }
    }

    /// Live subscriber count (dead entries are pruned first).
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        subscribers.retain(|s| s.callback.strong_count() > 0);
        subscribers.len()
    }

    fn notify(&self, changed: &str) {
        let callbacks: Vec<Rc<Callback>> = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            subscribers.retain(|s| s.callback.strong_count() > 0);
            subscribers
                .iter()
                .filter(|s| s.paths.iter().any(|p| paths_overlap(p, changed)))
                .filter_map(|s| s.callback.upgrade())
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }
}

fn write_path(data: &mut BTreeMap<String, Value>, key: &str, value: Value) -> bool {
    let (head, rest) = match key.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (key, None),
    };
    match rest {
        None => {
            if data.get(head) == Some(&value) {
                return false;
            }
            data.insert(head.to_string(), value);
            true
        }
        Some(rest) => {
            let slot = data
                .entry(head.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            write_into(slot, rest, value)
        }
    }
}

/// Walk `path` below `slot` the way `Value::lookup` reads it: numeric
/// segments index lists, anything else goes through maps. Scalars on the
/// way are replaced by maps.
fn write_into(slot: &mut Value, path: &str, value: Value) -> bool {
    let (segment, rest) = match path.split_once('.') {
        Some((segment, rest)) => (segment, Some(rest)),
        None => (path, None),
    };

    if let (Value::List(items), Ok(index)) = (&mut *slot, segment.parse::<usize>()) {
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        let target = &mut items[index];
        return match rest {
            Some(rest) => write_into(target, rest, value),
            None if *target == value => false,
            None => {
                *target = value;
                true
            }
        };
    }

    if !matches!(slot, Value::Map(_)) {
        *slot = Value::Map(BTreeMap::new());
    }
    match slot {
        Value::Map(map) => write_path(map, path, value),
        _ => false,
    }
}
