//! Explicit attribute bindings.
//!
//! A directive owns one attribute of one element. When the attribute name
//! matches a registered pattern the attribute is handed to the directive
//! instead of the interpolator, and whatever [`Binding`] it returns is
//! owned (and eventually cancelled) by the view.

use markup5ever_rcdom::Handle;

use crate::binding::Binding;
use crate::dom;
use crate::error::Result;
use crate::scheduler::LiveToken;
use crate::view::View;

pub trait Directive {
    /// Called on every bind of the owning view. `name` is the lowercase
    /// attribute name, `value` its raw, uninterpolated text.
    fn bind(&self, view: &View, element: &Handle, name: &str, value: &str)
        -> Result<Option<Binding>>;
}

impl<F> Directive for F
where
    F: Fn(&View, &Handle, &str, &str) -> Result<Option<Binding>>,
{
    fn bind(
        &self,
        view: &View,
        element: &Handle,
        name: &str,
        value: &str,
    ) -> Result<Option<Binding>> {
        self(view, element, name, value)
    }
}

/// `data-show="{{expr}}"`: the element carries `hidden` while the
/// interpolated value is falsy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShowDirective;

impl Directive for ShowDirective {
    fn bind(
        &self,
        view: &View,
        element: &Handle,
        _name: &str,
        value: &str,
    ) -> Result<Option<Binding>> {
        let scheduler = view.scope().scheduler().clone();
        let token = LiveToken::new();
        let write_token = token.clone();
        let element = element.clone();

        let binding =
            view.compiler()
                .interpolator()
                .bind_guarded(value, view.scope(), token, move |rendered| {
                    let element = element.clone();
                    let visible = rendered.truthy();
                    scheduler.defer_guarded(&write_token, move || {
                        if visible {
                            dom::remove_attribute(&element, "hidden");
                        } else {
                            dom::set_attribute(&element, "hidden", "");
                        }
                    });
                })?;
        Ok(Some(binding))
    }
}
