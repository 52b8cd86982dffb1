//! Compiler configuration: matcher registries, filters, delimiters and the
//! deferred-write scheduler shared by every view compiled from it.
//!
//! A [`CompilerBuilder`] is consumed by [`CompilerBuilder::build`], which
//! freezes it into an `Rc<Compiler>`. Nothing can be registered afterwards,
//! so every view compiled from one configuration sees the same matchers.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use lazy_static::lazy_static;
use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binding::Binding;
use crate::component::ComponentHandler;
use crate::directive::Directive;
use crate::error::{Error, Result};
use crate::filters::Filters;
use crate::interpolate::{ErrorHook, Interpolator, DEFAULT_CLOSE, DEFAULT_OPEN};
use crate::registry::{Pattern, Registry};
use crate::scheduler::Scheduler;
use crate::scope::Scope;
use crate::value::Value;
use crate::view::View;

lazy_static! {
    /// Attributes whose presence, not value, carries meaning.
    static ref BOOLEAN_ATTRIBUTES: HashSet<&'static str> = [
        "allowfullscreen", "async", "autofocus", "autoplay", "checked", "controls", "default",
        "defer", "disabled", "formnovalidate", "hidden", "inert", "ismap", "itemscope", "loop",
        "multiple", "muted", "nomodule", "novalidate", "open", "playsinline", "readonly",
        "required", "reversed", "selected",
    ]
    .into_iter()
    .collect();
}

pub const DEFAULT_EVENT_PREFIX: &str = "on-";

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Data part of the configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    pub open_delimiter: String,
    pub close_delimiter: String,
    /// Placeholder attributes starting with this prefix bind a child event
    /// to a parent method: `on-save="persist"`.
    pub event_prefix: String,
    /// Added to the built-in boolean attribute set.
    pub boolean_attributes: Vec<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            open_delimiter: DEFAULT_OPEN.to_string(),
            close_delimiter: DEFAULT_CLOSE.to_string(),
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
            boolean_attributes: Vec::new(),
        }
    }
}

impl CompilerOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidOptions {
            message: e.to_string(),
        })
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(Error::InvalidOptions {
                message: message.to_string(),
            })
        };
        if self.open_delimiter.is_empty() || self.close_delimiter.is_empty() {
            return invalid("delimiters must not be empty");
        }
        if self.open_delimiter == self.close_delimiter {
            return invalid("open and close delimiters must differ");
        }
        if self.event_prefix.is_empty() {
            return invalid("event prefix must not be empty");
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Classification decisions announced while a view is compiled.
#[derive(Debug, Clone, Copy)]
pub enum CompileEvent<'a> {
    /// Every element visited, before classification.
    Node(&'a Handle),
    Text(&'a Handle),
    Attribute {
        element: &'a Handle,
        name: &'a str,
        value: &'a str,
    },
    Component {
        element: &'a Handle,
        name: &'a str,
    },
    Directive {
        element: &'a Handle,
        name: &'a str,
        value: &'a str,
    },
}

pub type CompileHook = Rc<dyn Fn(&CompileEvent<'_>)>;

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct CompilerBuilder {
    options: CompilerOptions,
    components: Registry<Rc<dyn ComponentHandler>>,
    directives: Registry<Rc<dyn Directive>>,
    filters: Filters,
    on_error: Option<ErrorHook>,
    observers: Vec<CompileHook>,
}

impl Default for CompilerBuilder {
    fn default() -> Self {
        Self {
            options: CompilerOptions::default(),
            components: Registry::new(),
            directives: Registry::new(),
            filters: Filters::builtin(),
            on_error: None,
            observers: Vec::new(),
        }
    }
}

impl fmt::Debug for CompilerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerBuilder")
            .field("options", &self.options)
            .field("components", &self.components)
            .field("directives", &self.directives)
            .finish()
    }
}

impl CompilerBuilder {
    pub fn options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn component(
        mut self,
        pattern: impl Into<Pattern>,
        handler: impl ComponentHandler + 'static,
    ) -> Self {
        self.components.register(pattern, Rc::new(handler));
        self
    }

    /// Register a directive implemented as a closure.
    pub fn directive(
        self,
        pattern: impl Into<Pattern>,
        handler: impl Fn(&View, &Handle, &str, &str) -> Result<Option<Binding>> + 'static,
    ) -> Self {
        self.directive_with(pattern, handler)
    }

    pub fn directive_with(
        mut self,
        pattern: impl Into<Pattern>,
        handler: impl Directive + 'static,
    ) -> Self {
        self.directives.register(pattern, Rc::new(handler));
        self
    }

    pub fn filter(
        mut self,
        name: &str,
        filter: impl Fn(&Value, &[Value]) -> Value + 'static,
    ) -> Self {
        self.filters.insert(name, filter);
        self
    }

    pub fn delimiters(mut self, open: &str, close: &str) -> Self {
        self.options.open_delimiter = open.to_string();
        self.options.close_delimiter = close.to_string();
        self
    }

    pub fn event_prefix(mut self, prefix: &str) -> Self {
        self.options.event_prefix = prefix.to_string();
        self
    }

    pub fn boolean_attribute(mut self, name: &str) -> Self {
        self.options.boolean_attributes.push(name.to_lowercase());
        self
    }

    /// Receives evaluation errors raised while rendering (for example an
    /// unknown filter). Defaults to a `tracing` warning.
    pub fn on_render_error(mut self, hook: impl Fn(&Error) + 'static) -> Self {
        self.on_error = Some(Rc::new(hook));
        self
    }

    pub fn on_compile(mut self, hook: impl Fn(&CompileEvent<'_>) + 'static) -> Self {
        self.observers.push(Rc::new(hook));
        self
    }

    /// Apply a bundle of registrations.
    pub fn plugin(self, plugin: impl FnOnce(Self) -> Self) -> Self {
        plugin(self)
    }

    pub fn build(self) -> Result<Rc<Compiler>> {
        self.options.validate()?;

        let mut interpolator = Interpolator::new()
            .with_delimiters(&self.options.open_delimiter, &self.options.close_delimiter)?
            .with_filters(self.filters);
        if let Some(hook) = self.on_error {
            interpolator = interpolator.with_error_hook(hook);
        }

        let mut boolean_attributes: HashSet<String> =
            BOOLEAN_ATTRIBUTES.iter().map(|s| s.to_string()).collect();
        boolean_attributes.extend(
            self.options
                .boolean_attributes
                .iter()
                .map(|s| s.to_lowercase()),
        );

        debug!(
            components = self.components.len(),
            directives = self.directives.len(),
            "compiler configured"
        );

        Ok(Rc::new(Compiler {
            options: self.options,
            interpolator,
            components: self.components,
            directives: self.directives,
            boolean_attributes,
            observers: self.observers,
            scheduler: Scheduler::new(),
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Compiler {
    options: CompilerOptions,
    interpolator: Interpolator,
    components: Registry<Rc<dyn ComponentHandler>>,
    directives: Registry<Rc<dyn Directive>>,
    boolean_attributes: HashSet<String>,
    observers: Vec<CompileHook>,
    scheduler: Scheduler,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("options", &self.options)
            .field("components", &self.components)
            .field("directives", &self.directives)
            .finish()
    }
}

impl Compiler {
    pub fn builder() -> CompilerBuilder {
        CompilerBuilder::default()
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Empty scope on this compiler's scheduler.
    pub fn scope(&self) -> Scope {
        Scope::new(&self.scheduler)
    }

    pub fn scope_from_json(&self, json: serde_json::Value) -> Scope {
        Scope::from_json(&self.scheduler, json)
    }

    /// Run every pending deferred write.
    pub fn flush(&self) -> usize {
        self.scheduler.flush()
    }

    pub fn resolve_component(&self, name: &str) -> Option<&Rc<dyn ComponentHandler>> {
        self.components.resolve(name)
    }

    pub fn resolve_directive(&self, name: &str) -> Option<&Rc<dyn Directive>> {
        self.directives.resolve(name)
    }

    pub fn is_boolean_attribute(&self, name: &str) -> bool {
        self.boolean_attributes.contains(&name.to_lowercase())
    }

    pub fn event_prefix(&self) -> &str {
        &self.options.event_prefix
    }

    pub(crate) fn announce(&self, event: CompileEvent<'_>) {
        for observer in &self.observers {
            observer(&event);
        }
    }
}
