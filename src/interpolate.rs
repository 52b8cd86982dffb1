//! Interpolation of `{{ expression }}` segments embedded in strings.
//!
//! The interpolator answers four questions about a string: does it contain
//! an expression, which scope paths does it read, what does it evaluate to,
//! and (via [`Interpolator::bind`]) how to keep a render target in sync with
//! the scope.
//!
//! # Invariants
//!
//! 1. A string without expressions renders once and never subscribes.
//! 2. Malformed expressions fail when the string is first interpolated.
//! 3. Re-renders triggered by scope changes are deferred to the scope's
//!    scheduler; any number of changes within one tick coalesce into one
//!    evaluation that sees the latest values.
//! 4. Evaluation errors after the first render are reported, never panicked.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::binding::Binding;
use crate::error::{Error, Result};
use crate::expression::Expression;
use crate::filters::Filters;
use crate::scheduler::LiveToken;
use crate::scope::Scope;
use crate::value::Value;

pub const DEFAULT_OPEN: &str = "{{";
pub const DEFAULT_CLOSE: &str = "}}";

lazy_static! {
    static ref DEFAULT_EXPRESSION_RE: Regex = delimiter_regex(DEFAULT_OPEN, DEFAULT_CLOSE);
}

fn delimiter_regex(open: &str, close: &str) -> Regex {
    // Both parts are escaped, so the pattern is always valid.
    Regex::new(&format!(
        r"(?s){}(.*?){}",
        regex::escape(open),
        regex::escape(close)
    ))
    .unwrap()
}

/// Hook receiving evaluation errors that cannot be returned to a caller.
pub type ErrorHook = Rc<dyn Fn(&Error)>;

fn default_error_hook() -> ErrorHook {
    Rc::new(|error: &Error| {
        warn!(code = error.code(), %error, "render skipped");
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSED TEMPLATES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Literal(String),
    Expr(Expression),
}

/// A string split into literal text and expression segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub parts: Vec<Part>,
}

impl Template {
    pub fn has_expression(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Expr(_)))
    }

    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        for part in &self.parts {
            if let Part::Expr(expr) = part {
                deps.extend(expr.dependencies());
            }
        }
        deps
    }

    /// A lone expression yields its raw value; anything else concatenates
    /// display strings.
    pub fn evaluate(&self, scope: &Scope, filters: &Filters) -> Result<Value> {
        if let [Part::Expr(expr)] = self.parts.as_slice() {
            return expr.evaluate(scope, filters);
        }
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expr(expr) => out.push_str(&expr.evaluate(scope, filters)?.to_display()),
            }
        }
        Ok(Value::String(out))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPOLATOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct Interpolator {
    delimiters: (String, String),
    pattern: Regex,
    filters: Filters,
    on_error: ErrorHook,
}

impl fmt::Debug for Interpolator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpolator")
            .field("delimiters", &self.delimiters)
            .field("filters", &self.filters)
            .finish()
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self {
            delimiters: (DEFAULT_OPEN.to_string(), DEFAULT_CLOSE.to_string()),
            pattern: DEFAULT_EXPRESSION_RE.clone(),
            filters: Filters::builtin(),
            on_error: default_error_hook(),
        }
    }
}

impl Interpolator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiters(mut self, open: &str, close: &str) -> Result<Self> {
        if open.is_empty() || close.is_empty() {
            return Err(Error::InvalidOptions {
                message: "delimiters must not be empty".to_string(),
            });
        }
        self.pattern = delimiter_regex(open, close);
        self.delimiters = (open.to_string(), close.to_string());
        Ok(self)
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = hook;
        self
    }

    pub fn delimiters(&self) -> (&str, &str) {
        (&self.delimiters.0, &self.delimiters.1)
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn report(&self, error: &Error) {
        (self.on_error)(error);
    }

    pub fn has_expression(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    pub fn parse(&self, text: &str) -> Result<Template> {
        let mut parts = Vec::new();
        let mut last_end = 0;

        for caps in self.pattern.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last_end {
                parts.push(Part::Literal(text[last_end..whole.start()].to_string()));
            }
            parts.push(Part::Expr(Expression::parse(inner.as_str())?));
            last_end = whole.end();
        }

        if last_end < text.len() {
            parts.push(Part::Literal(text[last_end..].to_string()));
        }
        Ok(Template { parts })
    }

    pub fn dependencies(&self, text: &str) -> Result<BTreeSet<String>> {
        Ok(self.parse(text)?.dependencies())
    }

    pub fn evaluate(&self, text: &str, scope: &Scope) -> Result<Value> {
        self.parse(text)?.evaluate(scope, &self.filters)
    }

    /// Render `text` against `scope` now and again whenever a dependency
    /// changes. Static text renders once and returns an inert binding.
    pub fn bind(
        &self,
        text: &str,
        scope: &Scope,
        on_render: impl FnMut(Value) + 'static,
    ) -> Result<Binding> {
        self.bind_guarded(text, scope, LiveToken::new(), on_render)
    }

    /// Like [`bind`](Self::bind), with a caller-supplied liveness token so
    /// the caller can guard its own deferred writes with the same flag.
    pub fn bind_guarded(
        &self,
        text: &str,
        scope: &Scope,
        token: LiveToken,
        mut on_render: impl FnMut(Value) + 'static,
    ) -> Result<Binding> {
        if !self.has_expression(text) {
            on_render(Value::String(text.to_string()));
            return Ok(Binding::with_token(token, None));
        }

        let template = Rc::new(self.parse(text)?);
        let deps = template.dependencies();
        let on_render = Rc::new(RefCell::new(on_render));

        match template.evaluate(scope, &self.filters) {
            Ok(value) => (&mut *on_render.borrow_mut())(value),
            Err(error) => self.report(&error),
        }

        if deps.is_empty() {
            return Ok(Binding::with_token(token, None));
        }

        let queued = Rc::new(Cell::new(false));
        let job_token = token.clone();
        let source = scope.clone();
        let filters = self.filters.clone();
        let on_error = self.on_error.clone();
        let subscription = scope.on_change(&deps, move || {
            if !job_token.is_live() || queued.replace(true) {
                return;
            }
            let queued = queued.clone();
            let template = template.clone();
            let scope = source.clone();
            let filters = filters.clone();
            let on_render = on_render.clone();
            let on_error = on_error.clone();
            source.scheduler().defer_guarded(&job_token, move || {
                queued.set(false);
                match template.evaluate(&scope, &filters) {
                    Ok(value) => (&mut *on_render.borrow_mut())(value),
                    Err(error) => on_error(&error),
                }
            });
        });

        Ok(Binding::with_token(token, Some(subscription)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use serde_json::json;

    fn scope(data: serde_json::Value) -> Scope {
        Scope::from_json(&Scheduler::new(), data)
    }

    #[test]
    fn test_has_expression() {
        let interp = Interpolator::new();
        assert!(interp.has_expression("{{a}}"));
        assert!(interp.has_expression("x {{ a }} y"));
        assert!(!interp.has_expression("static {a}"));
    }

    #[test]
    fn test_dependencies_union() {
        let interp = Interpolator::new();
        let deps: Vec<String> = interp
            .dependencies("{{a}}-{{b.c}}")
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(deps, vec!["a".to_string(), "b.c".to_string()]);
    }

    #[test]
    fn test_evaluate_concatenates() {
        let interp = Interpolator::new();
        let scope = scope(json!({ "a": "x", "n": 3, "flag": true, "none": null }));
        assert_eq!(
            interp.evaluate("{{a}}-{{n}}-{{flag}}-{{none}}!", &scope).unwrap(),
            Value::from("x-3--!")
        );
    }

    #[test]
    fn test_single_segment_returns_raw_value() {
        let interp = Interpolator::new();
        let scope = scope(json!({ "flag": false, "n": 2 }));
        assert_eq!(interp.evaluate("{{flag}}", &scope).unwrap(), Value::Bool(false));
        assert_eq!(interp.evaluate("{{ n }}", &scope).unwrap(), Value::Number(2.0));
        assert_eq!(interp.evaluate("{{missing}}", &scope).unwrap(), Value::Null);

        let el = crate::dom::parse_template("<b>x</b>").unwrap();
        scope.set("el", el.clone());
        assert_eq!(interp.evaluate("{{el}}", &scope).unwrap(), Value::Element(el));
    }

    #[test]
    fn test_custom_delimiters() {
        let interp = Interpolator::new().with_delimiters("<%", "%>").unwrap();
        let scope = scope(json!({ "a": "x" }));
        assert!(!interp.has_expression("{{a}}"));
        assert_eq!(interp.evaluate("<% a %>!", &scope).unwrap(), Value::from("x!"));
        assert!(Interpolator::new().with_delimiters("", "}").is_err());
    }

    #[test]
    fn test_filters_in_template() {
        let mut filters = Filters::builtin();
        filters.insert("wrap", |v, args| {
            let edge = args.first().map(Value::to_display).unwrap_or_default();
            Value::String(format!("{}{}{}", edge, v.to_display(), edge))
        });
        let interp = Interpolator::new().with_filters(filters);
        let scope = scope(json!({ "name": "ann" }));
        assert_eq!(
            interp.evaluate("{{ name | upper | wrap:'*' }}", &scope).unwrap(),
            Value::from("*ANN*")
        );
    }

    #[test]
    fn test_malformed_expression_fails_on_first_use() {
        let interp = Interpolator::new();
        let scope = scope(json!({}));
        let result = interp.bind("{{ a + b }}", &scope, |_| {});
        assert_eq!(result.unwrap_err().code(), crate::error::ERR_SYNTAX);
    }

    #[test]
    fn test_bind_static_fast_path() {
        let interp = Interpolator::new();
        let scope = scope(json!({}));
        let renders = Rc::new(RefCell::new(Vec::new()));
        let sink = renders.clone();
        let mut binding = interp
            .bind("static text", &scope, move |v| sink.borrow_mut().push(v))
            .unwrap();
        assert_eq!(*renders.borrow(), vec![Value::from("static text")]);
        assert!(!binding.is_subscribed());
        assert_eq!(scope.subscriber_count(), 0);
        binding.cancel();
        assert_eq!(renders.borrow().len(), 1);
    }

    #[test]
    fn test_bind_renders_now_and_after_flush() {
        let interp = Interpolator::new();
        let scope = scope(json!({ "foo": "bar" }));
        let renders = Rc::new(RefCell::new(Vec::new()));
        let sink = renders.clone();
        let _binding = interp
            .bind("{{foo}}", &scope, move |v| sink.borrow_mut().push(v))
            .unwrap();
        assert_eq!(*renders.borrow(), vec![Value::from("bar")]);

        scope.set("foo", "baz");
        assert_eq!(renders.borrow().len(), 1);
        scope.scheduler().flush();
        assert_eq!(renders.borrow().last(), Some(&Value::from("baz")));
    }

    #[test]
    fn test_changes_within_a_tick_coalesce() {
        let interp = Interpolator::new();
        let scope = scope(json!({ "a": "1", "b": "2" }));
        let renders = Rc::new(RefCell::new(Vec::new()));
        let sink = renders.clone();
        let _binding = interp
            .bind("{{a}}{{b}}", &scope, move |v| sink.borrow_mut().push(v))
            .unwrap();

        scope.set("a", "x");
        scope.set("b", "y");
        assert_eq!(scope.scheduler().flush(), 1);
        assert_eq!(
            *renders.borrow(),
            vec![Value::from("12"), Value::from("xy")]
        );
    }

    #[test]
    fn test_cancel_drops_queued_render() {
        let interp = Interpolator::new();
        let scope = scope(json!({ "foo": "bar" }));
        let renders = Rc::new(RefCell::new(Vec::new()));
        let sink = renders.clone();
        let mut binding = interp
            .bind("{{foo}}", &scope, move |v| sink.borrow_mut().push(v))
            .unwrap();

        scope.set("foo", "baz");
        binding.cancel();
        scope.scheduler().flush();
        scope.set("foo", "qux");
        scope.scheduler().flush();
        assert_eq!(*renders.borrow(), vec![Value::from("bar")]);
    }

    #[test]
    fn test_unknown_filter_is_reported_not_rendered() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let interp =
            Interpolator::new().with_error_hook(Rc::new(move |e: &Error| sink.borrow_mut().push(e.clone())));
        let scope = scope(json!({ "a": "x" }));
        let renders = Rc::new(Cell::new(0));
        let counter = renders.clone();
        let _binding = interp
            .bind("{{ a | nope }}", &scope, move |_| counter.set(counter.get() + 1))
            .unwrap();

        assert_eq!(renders.get(), 0);
        assert_eq!(
            *errors.borrow(),
            vec![Error::UnknownFilter {
                name: "nope".into()
            }]
        );

        scope.set("a", "y");
        scope.scheduler().flush();
        assert_eq!(renders.get(), 0);
        assert_eq!(errors.borrow().len(), 2);
    }
}
