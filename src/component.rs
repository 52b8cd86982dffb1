//! Component composition.
//!
//! A placeholder element whose tag matches the component registry becomes a
//! child [`View`]. The parent pushes declared properties into the child's
//! scope; the child talks back only through emitted events routed to parent
//! methods. The child's root replaces the placeholder at mount, once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};
use tracing::{debug, trace};

use crate::binding::Binding;
use crate::dom;
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::value::Value;
use crate::view::{Method, Methods, View};

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

pub trait ComponentHandler {
    /// Markup of the component's default template. Must have exactly one
    /// root element.
    fn template(&self) -> &str;

    /// Seed the child scope before any property is pushed into it.
    fn init(&self, _scope: &Scope) {}

    /// Methods available to the child's own directives and listeners.
    fn methods(&self) -> Methods {
        Methods::new()
    }

    /// Whether instances can emit events to their parent. Event attributes
    /// on placeholders of components that cannot are ignored.
    fn emits_events(&self) -> bool {
        false
    }
}

/// A component defined entirely by data: a template, initial scope values
/// and methods.
#[derive(Clone, Default)]
pub struct TemplateComponent {
    template: String,
    data: Vec<(String, Value)>,
    methods: Methods,
    emits_events: bool,
}

impl fmt::Debug for TemplateComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateComponent")
            .field("template", &self.template)
            .field("data", &self.data)
            .field("emits_events", &self.emits_events)
            .finish()
    }
}

impl TemplateComponent {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.push((key.to_string(), value.into()));
        self
    }

    pub fn with_method(mut self, name: &str, method: impl Fn(&View, &[Value]) + 'static) -> Self {
        self.methods.insert(name, method);
        self
    }

    pub fn emitting(mut self) -> Self {
        self.emits_events = true;
        self
    }
}

impl ComponentHandler for TemplateComponent {
    fn template(&self) -> &str {
        &self.template
    }

    fn init(&self, scope: &Scope) {
        for (key, value) in &self.data {
            scope.set(key, value.clone());
        }
    }

    fn methods(&self) -> Methods {
        self.methods.clone()
    }

    fn emits_events(&self) -> bool {
        self.emits_events
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANCES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PropertyBinding {
    pub property: String,
    pub source: String,
}

#[derive(Clone)]
pub(crate) struct EventBinding {
    pub event: String,
    pub method_name: String,
    /// Looked up on the parent at composition; `None` fails the mount.
    pub method: Option<Method>,
}

/// One composed component: the child view plus its property and event
/// tables.
pub(crate) struct ComponentInstance {
    name: String,
    placeholder: Handle,
    view: View,
    properties: Vec<PropertyBinding>,
    events: Vec<EventBinding>,
    emits_events: bool,
    feeds: RefCell<Vec<Binding>>,
    attached: Cell<bool>,
    wired: Cell<bool>,
}

/// Build the child view for `placeholder`. Nothing in the parent tree is
/// touched here.
pub(crate) fn compose(
    parent: &View,
    placeholder: &Handle,
    name: &str,
    handler: &Rc<dyn ComponentHandler>,
) -> Result<ComponentInstance> {
    let compiler = parent.compiler();

    // 1. Template: non-empty placeholder content overrides the default
    let root = match extract_content(name, placeholder)? {
        Some(content) => content,
        None => dom::parse_template(handler.template())?,
    };

    // 2. Property and event tables from the placeholder's attributes
    let prefix = compiler.event_prefix();
    let mut properties = Vec::new();
    let mut events = Vec::new();
    for (attr, value) in dom::attributes(placeholder) {
        match attr.strip_prefix(prefix) {
            Some(event) if !event.is_empty() => events.push(EventBinding {
                event: event.to_string(),
                method: parent.method(&value),
                method_name: value,
            }),
            _ => properties.push(PropertyBinding {
                property: property_name(&attr),
                source: value,
            }),
        }
    }

    // 3. Child scope, seeded by the handler
    let scope = Scope::new(parent.scope().scheduler());
    handler.init(&scope);

    let view = View::child(compiler, root, scope, handler.methods(), name);
    debug!(
        component = name,
        properties = properties.len(),
        events = events.len(),
        "composed component"
    );

    Ok(ComponentInstance {
        name: name.to_string(),
        placeholder: placeholder.clone(),
        view,
        properties,
        events,
        emits_events: handler.emits_events(),
        feeds: RefCell::new(Vec::new()),
        attached: Cell::new(false),
        wired: Cell::new(false),
    })
}

/// The placeholder's inner content, copied, when it holds a single root
/// element. Whitespace and comments are ignored.
fn extract_content(name: &str, placeholder: &Handle) -> Result<Option<Handle>> {
    let mut root: Option<Handle> = None;
    for child in dom::children(placeholder) {
        let stray = match &child.data {
            NodeData::Element { .. } => root.is_some(),
            NodeData::Text { contents } => !contents.borrow().trim().is_empty(),
            _ => false,
        };
        if stray {
            return Err(Error::MultipleRoots {
                component: name.to_string(),
            });
        }
        if dom::is_element(&child) {
            root = Some(child);
        }
    }
    Ok(root.as_ref().and_then(dom::deep_clone))
}

/// `data-first-name` becomes `firstName`; other names pass through.
pub(crate) fn property_name(attribute: &str) -> String {
    let Some(rest) = attribute.strip_prefix("data-") else {
        return attribute.to_string();
    };
    let mut out = String::with_capacity(rest.len());
    let mut upper = false;
    for c in rest.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl ComponentInstance {
    pub fn view(&self) -> &View {
        &self.view
    }

    /// Wire events (first bind only), start the property feeds, then bind
    /// the child.
    pub fn bind(&self, parent: &View) -> Result<()> {
        if !self.wired.replace(true) {
            self.wire_events(parent);
        }

        let interpolator = parent.compiler().interpolator();
        for prop in &self.properties {
            let child_scope = self.view.scope().clone();
            let property = prop.property.clone();
            let feed = interpolator.bind(&prop.source, parent.scope(), move |value| {
                child_scope.set(&property, value);
            })?;
            self.feeds.borrow_mut().push(feed);
        }

        if !self.view.is_bound() {
            self.view.bind()?;
        }
        Ok(())
    }

    /// Cancel the feeds, then unbind the child.
    pub fn unbind(&self) -> Result<()> {
        self.cancel_feeds();
        if self.view.is_bound() {
            self.view.unbind()?;
        }
        Ok(())
    }

    pub fn destroy(&self) -> Result<()> {
        self.cancel_feeds();
        if !self.view.is_destroyed() {
            self.view.destroy()?;
        }
        Ok(())
    }

    fn cancel_feeds(&self) {
        let mut feeds = std::mem::take(&mut *self.feeds.borrow_mut());
        while let Some(mut feed) = feeds.pop() {
            feed.cancel();
        }
    }

    /// Every event must name an existing parent method.
    pub fn check_events(&self) -> Result<()> {
        if !self.emits_events {
            return Ok(());
        }
        match self.events.iter().find(|binding| binding.method.is_none()) {
            Some(missing) => Err(Error::UnknownMethod {
                event: missing.event.clone(),
                method: missing.method_name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Put the child root where the placeholder is. Happens on the first
    /// mount only.
    pub fn attach(&self, parent: &View) {
        if !self.attached.get() {
            let child_root = self.view.root();
            if dom::replace_node(&self.placeholder, &child_root) {
                self.attached.set(true);
                if Rc::ptr_eq(&self.placeholder, &parent.root()) {
                    parent.set_root(child_root);
                }
                trace!(component = %self.name, "placeholder replaced");
            }
        }

        self.view.mount_in_place();
    }

    fn wire_events(&self, parent: &View) {
        if !self.emits_events {
            if !self.events.is_empty() {
                debug!(component = %self.name, "component does not emit events; event bindings ignored");
            }
            return;
        }
        for binding in &self.events {
            let Some(method) = binding.method.clone() else {
                continue;
            };
            let owner = parent.downgrade();
            self.view.on(&binding.event, move |args| {
                if let Some(parent) = owner.upgrade() {
                    method(&parent, args);
                }
            });
        }
    }
}
