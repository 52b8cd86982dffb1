//! Views: one root element bound to one scope.
//!
//! The first [`View::bind`] walks the root once and records a plan of
//! sites: interpolated text nodes, interpolated attributes, directive
//! attributes and component placeholders. Every bind after that replays
//! the plan, so unbinding and rebinding never re-walks the tree.
//!
//! Tree mutations are never applied during bind. Each render schedules a
//! write on the scope's scheduler, guarded by the binding's liveness token,
//! and becomes visible at the next flush.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::Handle;
use tracing::{debug, trace, warn};

use crate::binding::Binding;
use crate::compiler::{CompileEvent, Compiler};
use crate::component::{self, ComponentInstance};
use crate::directive::Directive;
use crate::dom;
use crate::error::{Error, Result};
use crate::scheduler::LiveToken;
use crate::scope::Scope;
use crate::value::Value;
use crate::walk::TreeWalk;

pub type Method = Rc<dyn Fn(&View, &[Value])>;

type Listener = Rc<dyn Fn(&[Value])>;

/// Name to callable table, fixed when the view is built.
#[derive(Clone, Default)]
pub struct Methods {
    table: HashMap<String, Method>,
}

impl fmt::Debug for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.table.keys().collect();
        names.sort();
        f.debug_struct("Methods").field("names", &names).finish()
    }
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, method: impl Fn(&View, &[Value]) + 'static) -> Self {
        self.insert(name, method);
        self
    }

    pub fn insert(&mut self, name: &str, method: impl Fn(&View, &[Value]) + 'static) {
        self.table.insert(name.to_string(), Rc::new(method));
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Never bound, or unbound before ever being mounted.
    Created,
    Bound,
    Mounted,
    /// Detached after a mount. Bindings may still be live.
    Unmounted,
    Destroyed,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SITES
// ═══════════════════════════════════════════════════════════════════════════════

enum Site {
    /// The slot holds whatever currently occupies the text node's position:
    /// the text node itself or an element rendered in its place.
    Text {
        slot: Rc<RefCell<Handle>>,
        source: String,
    },
    Attribute {
        element: Handle,
        name: String,
        source: String,
        boolean: bool,
    },
    Directive {
        element: Handle,
        name: String,
        value: String,
        handler: Rc<dyn Directive>,
    },
    Component(Rc<ComponentInstance>),
}

fn render_text(slot: &RefCell<Handle>, value: Value) {
    let current = slot.borrow().clone();
    let next = match value {
        Value::Element(element) => element,
        other => {
            let text = other.to_display();
            if dom::is_text(&current) {
                dom::set_text(&current, &text);
                return;
            }
            dom::create_text(&text)
        }
    };
    if dom::replace_node(&current, &next) {
        *slot.borrow_mut() = next;
    }
}

fn render_attribute(element: &Handle, name: &str, boolean: bool, value: &Value) {
    if !boolean {
        dom::set_attribute(element, name, &value.to_display());
    } else if value.truthy() {
        dom::set_attribute(element, name, "");
    } else {
        dom::remove_attribute(element, name);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW
// ═══════════════════════════════════════════════════════════════════════════════

struct ViewInner {
    name: String,
    compiler: Rc<Compiler>,
    scope: Scope,
    methods: Methods,
    root: RefCell<Handle>,
    plan: RefCell<Option<Rc<Vec<Site>>>>,
    bindings: RefCell<Vec<Binding>>,
    listeners: RefCell<Vec<(String, Listener)>>,
    bound: Cell<bool>,
    ever_bound: Cell<bool>,
    mounted: Cell<bool>,
    ever_mounted: Cell<bool>,
    destroyed: Cell<bool>,
}

/// Cheap-clone handle to a view.
#[derive(Clone)]
pub struct View {
    inner: Rc<ViewInner>,
}

/// Non-owning view handle, used by child listeners to reach their parent.
#[derive(Clone)]
pub struct WeakView(Weak<ViewInner>);

impl WeakView {
    pub fn upgrade(&self) -> Option<View> {
        self.0.upgrade().map(|inner| View { inner })
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("bindings", &self.inner.bindings.borrow().len())
            .finish()
    }
}

impl View {
    pub fn new(compiler: &Rc<Compiler>, markup: &str, scope: Scope) -> Result<Self> {
        Self::with_methods(compiler, markup, scope, Methods::new())
    }

    pub fn with_methods(
        compiler: &Rc<Compiler>,
        markup: &str,
        scope: Scope,
        methods: Methods,
    ) -> Result<Self> {
        let root = dom::parse_template(markup)?;
        Ok(Self::from_element(compiler, root, scope, methods))
    }

    /// Wrap an already-built element. The element should not be shared
    /// with another view.
    pub fn from_element(
        compiler: &Rc<Compiler>,
        root: Handle,
        scope: Scope,
        methods: Methods,
    ) -> Self {
        Self::child(compiler, root, scope, methods, "view")
    }

    pub(crate) fn child(
        compiler: &Rc<Compiler>,
        root: Handle,
        scope: Scope,
        methods: Methods,
        name: &str,
    ) -> Self {
        View {
            inner: Rc::new(ViewInner {
                name: name.to_string(),
                compiler: compiler.clone(),
                scope,
                methods,
                root: RefCell::new(root),
                plan: RefCell::new(None),
                bindings: RefCell::new(Vec::new()),
                listeners: RefCell::new(Vec::new()),
                bound: Cell::new(false),
                ever_bound: Cell::new(false),
                mounted: Cell::new(false),
                ever_mounted: Cell::new(false),
                destroyed: Cell::new(false),
            }),
        }
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn compiler(&self) -> &Rc<Compiler> {
        &self.inner.compiler
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Current root element. A component placeholder at the root is
    /// replaced by the component's root on mount.
    pub fn root(&self) -> Handle {
        self.inner.root.borrow().clone()
    }

    pub(crate) fn set_root(&self, root: Handle) {
        *self.inner.root.borrow_mut() = root;
    }

    pub fn get(&self, path: &str) -> Value {
        self.inner.scope.get(path)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.inner.scope.set(key, value);
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        self.inner.methods.get(name).cloned()
    }

    /// Child component views in document order. Empty until the first bind.
    pub fn children(&self) -> Vec<View> {
        self.components()
            .iter()
            .map(|instance| instance.view().clone())
            .collect()
    }

    /// Number of bindings owned directly by this view, excluding those of
    /// child components.
    pub fn binding_count(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    /// Run every pending deferred write on this view's scheduler.
    pub fn flush(&self) -> usize {
        self.inner.scope.scheduler().flush()
    }

    pub fn downgrade(&self) -> WeakView {
        WeakView(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_bound(&self) -> bool {
        self.inner.bound.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn state(&self) -> LifecycleState {
        let inner = &self.inner;
        if inner.destroyed.get() {
            LifecycleState::Destroyed
        } else if inner.mounted.get() {
            LifecycleState::Mounted
        } else if inner.ever_mounted.get() {
            LifecycleState::Unmounted
        } else if inner.bound.get() {
            LifecycleState::Bound
        } else {
            LifecycleState::Created
        }
    }

    fn plan(&self) -> Option<Rc<Vec<Site>>> {
        self.inner.plan.borrow().clone()
    }

    fn components(&self) -> Vec<Rc<ComponentInstance>> {
        let Some(plan) = self.plan() else {
            return Vec::new();
        };
        plan.iter()
            .filter_map(|site| match site {
                Site::Component(instance) => Some(instance.clone()),
                _ => None,
            })
            .collect()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.inner.destroyed.get() {
            return Err(Error::Destroyed);
        }
        Ok(())
    }

    // ─── Events ─────────────────────────────────────────────────────────────

    /// Listen for `event` emitted by this view.
    pub fn on(&self, event: &str, listener: impl Fn(&[Value]) + 'static) {
        self.inner
            .listeners
            .borrow_mut()
            .push((event.to_string(), Rc::new(listener)));
    }

    /// Call every listener for `event`, in registration order. Returns how
    /// many were called.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        if self.inner.destroyed.get() {
            return 0;
        }
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, listener)| listener.clone())
            .collect();
        trace!(view = %self.inner.name, event, listeners = listeners.len(), "emit");
        for listener in &listeners {
            listener(args);
        }
        listeners.len()
    }

    // ─── Compile ────────────────────────────────────────────────────────────

    fn compile(&self) -> Result<Vec<Site>> {
        let compiler = self.inner.compiler.clone();
        let interpolator = compiler.interpolator();
        let root = self.root();
        let mut sites = Vec::new();

        let mut walk = TreeWalk::new(&root);
        while let Some(entry) = walk.next() {
            let node = entry.node;

            if dom::is_text(&node) {
                compiler.announce(CompileEvent::Text(&node));
                let source = dom::text_content(&node);
                if interpolator.has_expression(&source) {
                    trace!(view = %self.inner.name, depth = entry.depth, "text site");
                    sites.push(Site::Text {
                        slot: Rc::new(RefCell::new(node.clone())),
                        source,
                    });
                }
                continue;
            }

            let Some(tag) = dom::tag_name(&node) else {
                continue;
            };
            compiler.announce(CompileEvent::Node(&node));

            if let Some(handler) = compiler.resolve_component(&tag) {
                compiler.announce(CompileEvent::Component {
                    element: &node,
                    name: &tag,
                });
                trace!(view = %self.inner.name, component = %tag, "component site");
                let instance = component::compose(self, &node, &tag, handler)?;
                sites.push(Site::Component(Rc::new(instance)));
                walk.skip_subtree();
                continue;
            }

            for (name, value) in dom::attributes(&node) {
                if let Some(handler) = compiler.resolve_directive(&name) {
                    compiler.announce(CompileEvent::Directive {
                        element: &node,
                        name: &name,
                        value: &value,
                    });
                    sites.push(Site::Directive {
                        element: node.clone(),
                        name,
                        value,
                        handler: handler.clone(),
                    });
                    continue;
                }

                compiler.announce(CompileEvent::Attribute {
                    element: &node,
                    name: &name,
                    value: &value,
                });
                if interpolator.has_expression(&value) {
                    sites.push(Site::Attribute {
                        element: node.clone(),
                        boolean: compiler.is_boolean_attribute(&name),
                        name,
                        source: value,
                    });
                }
            }
        }

        debug!(view = %self.inner.name, sites = sites.len(), "compiled");
        Ok(sites)
    }

    /// Install one binding per site, in plan order.
    fn register(&self, sites: &[Site]) -> Result<()> {
        let interpolator = self.inner.compiler.interpolator();
        let scope = &self.inner.scope;

        for site in sites {
            let binding = match site {
                Site::Text { slot, source } => {
                    let token = LiveToken::new();
                    let write_token = token.clone();
                    let slot = slot.clone();
                    let scheduler = scope.scheduler().clone();
                    Some(interpolator.bind_guarded(source, scope, token, move |value| {
                        let slot = slot.clone();
                        scheduler.defer_guarded(&write_token, move || render_text(&slot, value));
                    })?)
                }
                Site::Attribute {
                    element,
                    name,
                    source,
                    boolean,
                } => {
                    let token = LiveToken::new();
                    let write_token = token.clone();
                    let element = element.clone();
                    let name = name.clone();
                    let boolean = *boolean;
                    let scheduler = scope.scheduler().clone();
                    Some(interpolator.bind_guarded(source, scope, token, move |value| {
                        let element = element.clone();
                        let name = name.clone();
                        scheduler.defer_guarded(&write_token, move || {
                            render_attribute(&element, &name, boolean, &value)
                        });
                    })?)
                }
                Site::Directive {
                    element,
                    name,
                    value,
                    handler,
                } => handler.bind(self, element, name, value)?,
                Site::Component(instance) => {
                    instance.bind(self)?;
                    None
                }
            };
            if let Some(binding) = binding {
                self.inner.bindings.borrow_mut().push(binding);
            }
        }
        Ok(())
    }

    /// Children first, then this view's own bindings in reverse order.
    fn release(&self, sites: &[Site]) -> Result<()> {
        for site in sites.iter().rev() {
            if let Site::Component(instance) = site {
                instance.unbind()?;
            }
        }
        self.cancel_bindings();
        Ok(())
    }

    fn cancel_bindings(&self) {
        let mut bindings = std::mem::take(&mut *self.inner.bindings.borrow_mut());
        while let Some(mut binding) = bindings.pop() {
            binding.cancel();
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Start every binding. The first bind compiles the tree.
    pub fn bind(&self) -> Result<()> {
        self.ensure_alive()?;
        if self.inner.bound.get() {
            return Err(Error::AlreadyBound);
        }

        let (plan, fresh) = match self.plan() {
            Some(plan) => (plan, false),
            None => {
                let plan = Rc::new(self.compile()?);
                *self.inner.plan.borrow_mut() = Some(plan.clone());
                (plan, true)
            }
        };

        if let Err(error) = self.register(&plan) {
            // Partial registrations must not outlive a failed bind.
            if let Err(rollback) = self.release(&plan) {
                warn!(view = %self.inner.name, %rollback, "rollback after failed bind");
            }
            if fresh {
                self.inner.plan.borrow_mut().take();
            }
            return Err(error);
        }

        self.inner.bound.set(true);
        self.inner.ever_bound.set(true);
        debug!(view = %self.inner.name, bindings = self.binding_count(), "bound");
        Ok(())
    }

    /// Cancel every binding, children first. Queued writes are dropped.
    pub fn unbind(&self) -> Result<()> {
        self.ensure_alive()?;
        if !self.inner.bound.get() {
            if self.inner.ever_bound.get() {
                return Ok(());
            }
            return Err(Error::NeverBound);
        }
        if let Some(plan) = self.plan() {
            self.release(&plan)?;
        }
        self.inner.bound.set(false);
        debug!(view = %self.inner.name, "unbound");
        Ok(())
    }

    /// Append the root to `target` and attach child components.
    ///
    /// The caller keeps `target` alive: dropping an rcdom node empties the
    /// subtree under it, this view's root included.
    pub fn mount(&self, target: &Handle) -> Result<()> {
        self.ensure_alive()?;
        if self.plan().is_none() {
            return Err(Error::NotCompiled);
        }
        if self.inner.mounted.get() {
            return Err(Error::AlreadyMounted);
        }
        self.check_events()?;

        dom::append_child(target, &self.root());
        self.mount_in_place();
        debug!(view = %self.inner.name, "mounted");
        Ok(())
    }

    /// Mount without moving the root; used for child views whose root the
    /// parent has already placed.
    pub(crate) fn mount_in_place(&self) {
        for instance in self.components() {
            instance.attach(self);
        }
        self.inner.mounted.set(true);
        self.inner.ever_mounted.set(true);
    }

    fn check_events(&self) -> Result<()> {
        for instance in self.components() {
            instance.check_events()?;
            instance.view().check_events()?;
        }
        Ok(())
    }

    /// Detach the root from its parent. Bindings keep running.
    pub fn unmount(&self) -> Result<()> {
        self.ensure_alive()?;
        if !self.inner.mounted.get() {
            return Ok(());
        }
        dom::detach(&self.root());
        self.mark_unmounted();
        debug!(view = %self.inner.name, "unmounted");
        Ok(())
    }

    /// Same as [`unmount`](Self::unmount).
    pub fn remove(&self) -> Result<()> {
        self.unmount()
    }

    fn mark_unmounted(&self) {
        for instance in self.components() {
            instance.view().mark_unmounted();
        }
        self.inner.mounted.set(false);
    }

    /// Terminal. Destroys children, cancels bindings and detaches the root.
    pub fn destroy(&self) -> Result<()> {
        self.ensure_alive()?;

        if let Some(plan) = self.plan() {
            for site in plan.iter().rev() {
                if let Site::Component(instance) = site {
                    instance.destroy()?;
                }
            }
        }
        self.cancel_bindings();

        if self.inner.mounted.get() {
            dom::detach(&self.root());
        }
        self.inner.listeners.borrow_mut().clear();
        self.inner.plan.borrow_mut().take();
        self.inner.bound.set(false);
        self.inner.mounted.set(false);
        self.inner.destroyed.set(true);
        debug!(view = %self.inner.name, "destroyed");
        Ok(())
    }
}
