//! # Ripple Compiler
//!
//! Binds an element tree to a reactive scope. A [`View`] owns one root
//! element and one [`Scope`]; binding it walks the tree once and installs:
//!
//! 1. **Text bindings**: text nodes containing `{{ expr }}` segments are
//!    re-rendered whenever a path they read changes. A single segment that
//!    evaluates to an element replaces the text node with that element.
//! 2. **Attribute bindings**: attribute values with segments are kept in
//!    sync. Boolean attributes (`hidden`, `disabled`, ...) are present when
//!    the value is truthy and removed otherwise.
//! 3. **Directives**: attributes whose names match a registered pattern are
//!    handed to the directive instead of being interpolated.
//! 4. **Components**: elements whose tags match a registered pattern become
//!    child views. Placeholder attributes feed the child scope; `on-*`
//!    attributes route child events to parent methods.
//!
//! Matching is first-registered-wins. No write reaches the tree during
//! bind; every render is deferred to the scheduler and applied on
//! [`Compiler::flush`], in the order it was scheduled.
//!
//! ```text
//! let compiler = Compiler::builder().component("x-card", card).build()?;
//! let view = View::new(&compiler, "<p>{{ greeting | upper }}</p>", compiler.scope())?;
//! view.bind()?;
//! view.mount(&target)?;
//! compiler.flush();
//! ```

mod binding;
mod compiler;
mod component;
mod directive;
pub mod dom;
mod error;
mod expression;
mod filters;
mod interpolate;
mod registry;
mod scheduler;
mod scope;
mod value;
mod view;
mod walk;

#[cfg(test)]
mod interpolation_tests;

pub use binding::Binding;
pub use compiler::{
    CompileEvent, CompileHook, Compiler, CompilerBuilder, CompilerOptions, DEFAULT_EVENT_PREFIX,
};
pub use component::{ComponentHandler, TemplateComponent};
pub use directive::{Directive, ShowDirective};
pub use error::*;
pub use expression::{Expression, FilterCall, Operand};
pub use filters::{Filter, Filters};
pub use interpolate::{ErrorHook, Interpolator, Part, Template, DEFAULT_CLOSE, DEFAULT_OPEN};
pub use registry::{Pattern, Registry};
pub use scheduler::{LiveToken, Scheduler};
pub use scope::{paths_overlap, Scope, Subscription};
pub use value::Value;
pub use view::{LifecycleState, Method, Methods, View, WeakView};
pub use walk::{TreeWalk, WalkEntry};

/// Element handle type used throughout the crate.
pub use markup5ever_rcdom::Handle;
