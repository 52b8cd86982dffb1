//! Element tree the compiler binds against.
//!
//! Templates are parsed with html5ever into `markup5ever_rcdom` nodes. This
//! module is the only place that touches rcdom internals; the rest of the
//! crate classifies and mutates nodes through these helpers.
//!
//! Every mutation keeps the tree well formed: a node is detached from its old
//! parent before it is inserted anywhere else. rcdom tears down a dropped
//! node's whole subtree, so a shared node must never stay listed under a
//! parent that is about to be dropped.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};
use regex::Regex;
use tendril::StrTendril;

use crate::error::{Error, Result};

lazy_static! {
    /// Elements that never have content; `<br/>` stays as is.
    static ref VOID_TAGS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect();

    static ref SELF_CLOSING_RE: Regex =
        Regex::new(r"<([A-Za-z][A-Za-z0-9-]*)((?:\s[^<>]*?)?)\s*/>").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Convert self-closing custom tags to properly closed tags.
/// HTML5 treats `<my-widget />` as an opening tag, which would nest every
/// following sibling inside it.
fn convert_self_closing_tags(markup: &str) -> String {
    SELF_CLOSING_RE
        .replace_all(markup, |caps: &regex::Captures| {
            let tag = &caps[1];
            if VOID_TAGS.contains(tag.to_lowercase().as_str()) {
                caps[0].to_string()
            } else {
                format!("<{}{}></{}>", tag, &caps[2], tag)
            }
        })
        .to_string()
}

fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if tag_name(handle).as_deref() == Some(tag) {
        return Some(handle.clone());
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}

/// Parse markup with exactly one root element and return that element,
/// detached from the scratch document it was parsed into.
pub fn parse_template(markup: &str) -> Result<Handle> {
    let normalized = convert_self_closing_tags(markup);
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut normalized.as_bytes())
        .map_err(|e| Error::template(format!("failed to parse markup: {}", e)))?;

    let body = find_element(&dom.document, "body")
        .ok_or_else(|| Error::template("markup produced no body"))?;

    let mut roots = Vec::new();
    for child in body.children.borrow().iter() {
        match &child.data {
            NodeData::Element { .. } => roots.push(child.clone()),
            NodeData::Text { contents } if !contents.borrow().trim().is_empty() => {
                return Err(Error::template(format!(
                    "text outside the root element: {:?}",
                    contents.borrow().trim()
                )));
            }
            _ => {}
        }
    }

    match roots.len() {
        1 => {
            let root = roots.remove(0);
            detach(&root);
            Ok(root)
        }
        0 => Err(Error::template("markup has no root element")),
        n => Err(Error::template(format!(
            "markup has {} root elements, expected one",
            n
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

pub fn is_text(handle: &Handle) -> bool {
    matches!(handle.data, NodeData::Text { .. })
}

pub fn is_element(handle: &Handle) -> bool {
    matches!(handle.data, NodeData::Element { .. })
}

/// Lowercase tag name, `None` for non-elements.
pub fn tag_name(handle: &Handle) -> Option<String> {
    match &handle.data {
        NodeData::Element { name, .. } => Some(name.local.to_lowercase()),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered snapshot of an element's attributes.
pub fn attributes(handle: &Handle) -> Vec<(String, String)> {
    match &handle.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn get_attribute(handle: &Handle, name: &str) -> Option<String> {
    match &handle.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

pub fn has_attribute(handle: &Handle, name: &str) -> bool {
    get_attribute(handle, name).is_some()
}

pub fn set_attribute(handle: &Handle, name: &str, value: &str) {
    let NodeData::Element { attrs, .. } = &handle.data else {
        return;
    };
    let mut attrs = attrs.borrow_mut();
    if let Some(existing) = attrs.iter_mut().find(|a| &*a.name.local == name) {
        existing.value = StrTendril::from(value);
        return;
    }
    attrs.push(Attribute {
        name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
        value: StrTendril::from(value),
    });
}

pub fn remove_attribute(handle: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &handle.data {
        attrs.borrow_mut().retain(|a| &*a.name.local != name);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Concatenated text of a node and its descendants.
pub fn text_content(handle: &Handle) -> String {
    fn collect(handle: &Handle, out: &mut String) {
        match &handle.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            _ => {
                for child in handle.children.borrow().iter() {
                    collect(child, out);
                }
            }
        }
    }
    let mut out = String::new();
    collect(handle, &mut out);
    out
}

/// Replace a text node's content, or an element's children with one text node.
pub fn set_text(handle: &Handle, text: &str) {
    match &handle.data {
        NodeData::Text { contents } => {
            *contents.borrow_mut() = StrTendril::from(text);
        }
        NodeData::Element { .. } => {
            for child in children(handle) {
                detach(&child);
            }
            append_child(handle, &create_text(text));
        }
        _ => {}
    }
}

pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn children(handle: &Handle) -> Vec<Handle> {
    handle.children.borrow().clone()
}

pub fn element_children(handle: &Handle) -> Vec<Handle> {
    handle
        .children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .cloned()
        .collect()
}

pub fn parent(handle: &Handle) -> Option<Handle> {
    let weak = handle.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    handle.parent.set(weak);
    parent
}

/// Remove a node from its parent's child list. No-op for detached nodes.
pub fn detach(handle: &Handle) {
    if let Some(weak) = handle.parent.take() {
        if let Some(parent) = weak.upgrade() {
            parent
                .children
                .borrow_mut()
                .retain(|child| !Rc::ptr_eq(child, handle));
        }
    }
}

pub fn append_child(parent: &Handle, child: &Handle) {
    detach(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

/// Put `new` where `old` is. Returns `false` (and changes nothing) when
/// `old` has no parent.
pub fn replace_node(old: &Handle, new: &Handle) -> bool {
    if Rc::ptr_eq(old, new) {
        return true;
    }
    let Some(parent) = parent(old) else {
        return false;
    };
    detach(new);
    let mut siblings = parent.children.borrow_mut();
    let Some(index) = siblings.iter().position(|c| Rc::ptr_eq(c, old)) else {
        return false;
    };
    new.parent.set(Some(Rc::downgrade(&parent)));
    siblings[index] = new.clone();
    old.parent.set(None);
    true
}

/// Markup for a node and its subtree. Attribute values and text are
/// escaped; comments are dropped.
pub fn outer_html(handle: &Handle) -> String {
    fn escape(text: &str, attribute: bool) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' if !attribute => out.push_str("&lt;"),
                '>' if !attribute => out.push_str("&gt;"),
                '"' if attribute => out.push_str("&quot;"),
                _ => out.push(c),
            }
        }
        out
    }

    fn write(handle: &Handle, out: &mut String) {
        match &handle.data {
            NodeData::Text { contents } => out.push_str(&escape(&contents.borrow(), false)),
            NodeData::Element { name, attrs, .. } => {
                let tag = name.local.to_string();
                out.push('<');
                out.push_str(&tag);
                for attr in attrs.borrow().iter() {
                    out.push(' ');
                    out.push_str(&attr.name.local);
                    if !attr.value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape(&attr.value, true));
                        out.push('"');
                    }
                }
                out.push('>');
                if VOID_TAGS.contains(tag.as_str()) {
                    return;
                }
                for child in handle.children.borrow().iter() {
                    write(child, out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
            _ => {}
        }
    }

    let mut out = String::new();
    write(handle, &mut out);
    out
}

/// Structural copy of a subtree. Documents, doctypes and processing
/// instructions are not copied.
pub fn deep_clone(handle: &Handle) -> Option<Handle> {
    let copy = match &handle.data {
        NodeData::Element {
            name,
            attrs,
            mathml_annotation_xml_integration_point,
            ..
        } => Node::new(NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(None),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        }),
        NodeData::Text { contents } => Node::new(NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        }),
        NodeData::Comment { contents } => Node::new(NodeData::Comment {
            contents: contents.clone(),
        }),
        _ => return None,
    };
    for child in handle.children.borrow().iter() {
        if let Some(child_copy) = deep_clone(child) {
            append_child(&copy, &child_copy);
        }
    }
    Some(copy)
}
