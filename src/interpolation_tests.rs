//! Rendering through a bound view: text and attribute interpolation,
//! boolean attributes, filters, directives and compile observation.

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::binding::Binding;
    use crate::compiler::{CompileEvent, Compiler};
    use crate::component::TemplateComponent;
    use crate::directive::ShowDirective;
    use crate::dom;
    use crate::error::Error;
    use crate::registry::Pattern;
    use crate::value::Value;
    use crate::view::{LifecycleState, View};
    use markup5ever_rcdom::Handle;

    fn target() -> Handle {
        dom::parse_template("<main></main>").unwrap()
    }

    /// The host is returned so it outlives the assertions: dropping an
    /// rcdom node empties its whole subtree.
    fn mounted(compiler: &Rc<Compiler>, markup: &str, data: serde_json::Value) -> (View, Handle) {
        let view = View::new(compiler, markup, compiler.scope_from_json(data)).unwrap();
        view.bind().unwrap();
        let host = target();
        view.mount(&host).unwrap();
        compiler.flush();
        (view, host)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // TEXT
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_basic_interpolation_renders_after_flush() {
        let compiler = Compiler::builder().build().unwrap();
        let view = View::new(&compiler, "<div>{{foo}}</div>", compiler.scope_from_json(json!({ "foo": "bar" })))
            .unwrap();
        view.bind().unwrap();

        // Nothing is written during bind.
        assert_eq!(dom::text_content(&view.root()), "{{foo}}");
        assert_eq!(compiler.scheduler().pending(), 1);

        compiler.flush();
        assert_eq!(dom::text_content(&view.root()), "bar");
    }

    #[test]
    fn test_static_tree_installs_nothing() {
        let compiler = Compiler::builder().build().unwrap();
        let view = View::new(
            &compiler,
            "<div class=\"card\"><p>plain text</p></div>",
            compiler.scope(),
        )
        .unwrap();
        view.bind().unwrap();

        assert_eq!(view.binding_count(), 0);
        assert_eq!(view.scope().subscriber_count(), 0);
        assert_eq!(compiler.scheduler().pending(), 0);
        assert_eq!(
            dom::outer_html(&view.root()),
            "<div class=\"card\"><p>plain text</p></div>"
        );
    }

    #[test]
    fn test_static_text_renders_once_without_subscription() {
        let compiler = Compiler::builder().build().unwrap();
        let scope = compiler.scope();
        let renders = Rc::new(Cell::new(0));
        let counter = renders.clone();
        let binding = compiler
            .interpolator()
            .bind("no segments here", &scope, move |_| counter.set(counter.get() + 1))
            .unwrap();
        assert_eq!(renders.get(), 1);
        assert!(!binding.is_subscribed());
        assert_eq!(scope.subscriber_count(), 0);
    }

    #[test]
    fn test_mixed_text_updates() {
        let compiler = Compiler::builder().build().unwrap();
        let (view, _host) = mounted(
            &compiler,
            "<p>Hello, {{ user.name }}! You have {{count}} messages.</p>",
            json!({ "user": { "name": "Ada" }, "count": 3 }),
        );
        assert_eq!(
            dom::text_content(&view.root()),
            "Hello, Ada! You have 3 messages."
        );

        view.set("user.name", "Grace");
        compiler.flush();
        assert_eq!(
            dom::text_content(&view.root()),
            "Hello, Grace! You have 3 messages."
        );
    }

    #[test]
    fn test_changes_to_two_dependencies_coalesce() {
        let compiler = Compiler::builder().build().unwrap();
        let (view, _host) = mounted(&compiler, "<p>{{a}}-{{b}}</p>", json!({ "a": 1, "b": 2 }));
        assert_eq!(dom::text_content(&view.root()), "1-2");

        view.set("a", 3);
        view.set("b", 4);
        assert_eq!(compiler.scheduler().pending(), 1);

        // One re-evaluation, one write.
        assert_eq!(compiler.flush(), 2);
        assert_eq!(dom::text_content(&view.root()), "3-4");
    }

    #[test]
    fn test_element_value_replaces_text_node() {
        let compiler = Compiler::builder().build().unwrap();
        let badge = dom::parse_template("<b>new</b>").unwrap();
        let scope = compiler.scope();
        scope.set("content", badge.clone());
        let view = View::new(&compiler, "<div>{{content}}</div>", scope).unwrap();
        view.bind().unwrap();
        let host = target();
        view.mount(&host).unwrap();
        compiler.flush();

        let first = dom::children(&view.root()).remove(0);
        assert!(Rc::ptr_eq(&first, &badge));

        view.set("content", "plain");
        compiler.flush();
        assert_eq!(dom::outer_html(&view.root()), "<div>plain</div>");
        assert!(dom::parent(&badge).is_none());
    }

    #[test]
    fn test_filters_and_custom_filter() {
        let compiler = Compiler::builder()
            .filter("exclaim", |value, _| {
                Value::String(format!("{}!", value.to_display()))
            })
            .build()
            .unwrap();
        let (view, _host) = mounted(
            &compiler,
            "<p>{{ name | upper | exclaim }} {{ nickname | default:'none' }}</p>",
            json!({ "name": "ada" }),
        );
        assert_eq!(dom::text_content(&view.root()), "ADA! none");
    }

    #[test]
    fn test_unknown_filter_goes_to_error_hook() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let compiler = Compiler::builder()
            .on_render_error(move |error| sink.borrow_mut().push(error.clone()))
            .build()
            .unwrap();
        let (view, _host) = mounted(
            &compiler,
            "<div><p>{{a | nope}}</p><span>{{b}}</span></div>",
            json!({ "a": 1, "b": "ok" }),
        );

        assert_eq!(
            *errors.borrow(),
            vec![Error::UnknownFilter {
                name: "nope".into()
            }]
        );
        // The failing binding does not stop the others.
        assert_eq!(dom::text_content(&view.root()), "{{a | nope}}ok");

        view.set("a", 2);
        compiler.flush();
        assert_eq!(errors.borrow().len(), 2);
    }

    #[test]
    fn test_syntax_error_fails_bind() {
        let compiler = Compiler::builder().build().unwrap();
        let view = View::new(
            &compiler,
            "<div><p>{{ok}}</p><p>{{ a + }}</p></div>",
            compiler.scope(),
        )
        .unwrap();

        let err = view.bind().unwrap_err();
        assert_eq!(err.code(), crate::error::ERR_SYNTAX);
        assert_eq!(view.state(), LifecycleState::Created);
        assert_eq!(view.binding_count(), 0);
        assert_eq!(view.scope().subscriber_count(), 0);
        assert_eq!(view.mount(&target()).unwrap_err(), Error::NotCompiled);
    }

    #[test]
    fn test_custom_delimiters() {
        let compiler = Compiler::builder().delimiters("[[", "]]").build().unwrap();
        let (view, _host) = mounted(&compiler, "<p>[[x]] {{x}}</p>", json!({ "x": 5 }));
        assert_eq!(dom::text_content(&view.root()), "5 {{x}}");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // ATTRIBUTES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_attribute_interpolation() {
        let compiler = Compiler::builder().build().unwrap();
        let (view, _host) = mounted(
            &compiler,
            "<a href=\"/users/{{id}}\" title=\"{{missing}}\">x</a>",
            json!({ "id": 7 }),
        );
        assert_eq!(dom::get_attribute(&view.root(), "href").as_deref(), Some("/users/7"));
        assert_eq!(dom::get_attribute(&view.root(), "title").as_deref(), Some(""));
    }

    #[test]
    fn test_boolean_attribute_toggles_presence() {
        let compiler = Compiler::builder().build().unwrap();
        let (view, _host) = mounted(
            &compiler,
            "<div hidden=\"{{hidden}}\"></div>",
            json!({ "hidden": true }),
        );
        let root = view.root();
        assert_eq!(dom::get_attribute(&root, "hidden").as_deref(), Some(""));

        view.set("hidden", false);
        compiler.flush();
        assert!(!dom::has_attribute(&root, "hidden"));

        view.set("hidden", true);
        compiler.flush();
        assert!(dom::has_attribute(&root, "hidden"));
    }

    #[test]
    fn test_registered_boolean_attribute() {
        let compiler = Compiler::builder()
            .boolean_attribute("aria-busy")
            .build()
            .unwrap();
        let (view, _host) = mounted(
            &compiler,
            "<div aria-busy=\"{{loading}}\"></div>",
            json!({ "loading": 0 }),
        );
        assert!(!dom::has_attribute(&view.root(), "aria-busy"));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // DIRECTIVES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_first_matching_directive_wins() {
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let (a, b) = (first.clone(), second.clone());

        let compiler = Compiler::builder()
            .directive("data-test", move |_view: &View, _el: &Handle, _name: &str, _value: &str| {
                a.set(a.get() + 1);
                Ok(None)
            })
            .directive(
                Pattern::predicate(|name| name.starts_with("data-")),
                move |_view: &View, _el: &Handle, _name: &str, _value: &str| {
                    b.set(b.get() + 1);
                    Ok(None)
                },
            )
            .build()
            .unwrap();

        let (view, _host) = mounted(&compiler, "<div data-test=\"{{x}}\"></div>", json!({ "x": 1 }));
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);
        // Directive attributes are not interpolated.
        assert_eq!(dom::get_attribute(&view.root(), "data-test").as_deref(), Some("{{x}}"));
    }

    #[test]
    fn test_directive_binding_is_cancelled_on_unbind() {
        let cancelled = Rc::new(Cell::new(0));
        let counter = cancelled.clone();
        let compiler = Compiler::builder()
            .directive("x-track", move |_view: &View, _el: &Handle, _name: &str, _value: &str| {
                let counter = counter.clone();
                Ok(Some(Binding::from_fn(move || counter.set(counter.get() + 1))))
            })
            .build()
            .unwrap();
        let view = View::new(&compiler, "<div x-track></div>", compiler.scope()).unwrap();
        view.bind().unwrap();
        assert_eq!(view.binding_count(), 1);

        view.unbind().unwrap();
        assert_eq!(cancelled.get(), 1);
        view.bind().unwrap();
        view.destroy().unwrap();
        assert_eq!(cancelled.get(), 2);
    }

    #[test]
    fn test_show_directive() {
        let compiler = Compiler::builder()
            .directive_with("data-show", ShowDirective)
            .build()
            .unwrap();
        let (view, _host) = mounted(
            &compiler,
            "<div data-show=\"{{open}}\"></div>",
            json!({ "open": false }),
        );
        assert!(dom::has_attribute(&view.root(), "hidden"));

        view.set("open", true);
        compiler.flush();
        assert!(!dom::has_attribute(&view.root(), "hidden"));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COMPILE EVENTS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_compile_events_follow_document_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let compiler = Compiler::builder()
            .component("dummy", TemplateComponent::new("<div></div>"))
            .directive("data-test", |_view: &View, _el: &Handle, _name: &str, _value: &str| {
                Ok(None)
            })
            .on_compile(move |event| {
                let entry = match event {
                    CompileEvent::Node(node) => format!("node:{}", dom::tag_name(node).unwrap_or_default()),
                    CompileEvent::Text(node) => format!("text:{}", dom::text_content(node)),
                    CompileEvent::Attribute { name, .. } => format!("attribute:{}", name),
                    CompileEvent::Component { name, .. } => format!("component:{}", name),
                    CompileEvent::Directive { name, .. } => format!("directive:{}", name),
                };
                sink.borrow_mut().push(entry);
            })
            .build()
            .unwrap();

        let view = View::new(
            &compiler,
            "<div id=\"{{a}}\" data-test=\"v\"><dummy><p>inner</p></dummy>tail</div>",
            compiler.scope(),
        )
        .unwrap();
        view.bind().unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "node:div",
                "attribute:id",
                "directive:data-test",
                "node:dummy",
                "component:dummy",
                "text:tail",
                // The child compiles its override content when the parent
                // registers it.
                "node:p",
                "text:inner",
            ]
        );

        // Rebinding replays the plan without walking again.
        view.unbind().unwrap();
        view.bind().unwrap();
        assert_eq!(log.borrow().len(), 8);
    }
}
