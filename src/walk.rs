//! Pre-order traversal of an element subtree.
//!
//! [`TreeWalk`] is the single traversal used by the compiler. It yields each
//! node with its depth and ancestors, in document order. Children of a node
//! are only expanded when the walk moves past it, so a consumer can call
//! [`TreeWalk::skip_subtree`] to prune the node it was just handed.

use markup5ever_rcdom::Handle;

use crate::dom;

#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub node: Handle,
    pub depth: usize,
    /// Outermost first; empty for the walk root.
    pub ancestors: Vec<Handle>,
}

pub struct TreeWalk {
    stack: Vec<(Handle, usize)>,
    path: Vec<Handle>,
    pending: Option<(Handle, usize)>,
}

impl TreeWalk {
    pub fn new(root: &Handle) -> Self {
        Self {
            stack: vec![(root.clone(), 0)],
            path: Vec::new(),
            pending: None,
        }
    }

    /// Do not descend into the node returned by the last call to `next`.
    pub fn skip_subtree(&mut self) {
        self.pending = None;
    }
}

impl Iterator for TreeWalk {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        if let Some((node, depth)) = self.pending.take() {
            for child in dom::children(&node).into_iter().rev() {
                self.stack.push((child, depth + 1));
            }
        }
        let (node, depth) = self.stack.pop()?;
        self.path.truncate(depth);
        let ancestors = self.path.clone();
        self.path.push(node.clone());
        self.pending = Some((node.clone(), depth));
        Some(WalkEntry {
            node,
            depth,
            ancestors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(handle: &Handle) -> String {
        dom::tag_name(handle).unwrap_or_else(|| format!("#{}", dom::text_content(handle)))
    }

    #[test]
    fn test_document_order() {
        let root = dom::parse_template("<div><p>a</p><ul><li>b</li></ul>c</div>").unwrap();
        let order: Vec<String> = TreeWalk::new(&root).map(|e| label(&e.node)).collect();
        assert_eq!(order, vec!["div", "p", "#a", "ul", "li", "#b", "#c"]);
    }

    #[test]
    fn test_ancestors_and_depth() {
        let root = dom::parse_template("<div><ul><li>b</li></ul></div>").unwrap();
        let entry = TreeWalk::new(&root)
            .find(|e| dom::is_text(&e.node))
            .unwrap();
        assert_eq!(entry.depth, 3);
        let names: Vec<String> = entry.ancestors.iter().map(label).collect();
        assert_eq!(names, vec!["div", "ul", "li"]);
    }

    #[test]
    fn test_skip_subtree() {
        let root = dom::parse_template("<div><x-box><p>hidden</p></x-box><p>seen</p></div>").unwrap();
        let mut walk = TreeWalk::new(&root);
        let mut order = Vec::new();
        while let Some(entry) = walk.next() {
            order.push(label(&entry.node));
            if dom::tag_name(&entry.node).as_deref() == Some("x-box") {
                walk.skip_subtree();
            }
        }
        assert_eq!(order, vec!["div", "x-box", "p", "#seen"]);
    }
}
