//! The DOM seam.
//!
//! [`TextSource`] is the small set of node operations the engine needs. A
//! browser binding implements it over the live document; [`Page`] is the
//! arena-backed implementation used by the CLI and the tests. `Page` keeps a
//! journal of child-list changes so the watcher sees the same records a
//! `MutationObserver` would deliver, including the ones the engine caused.

use crate::error::DomError;
use once_cell::sync::Lazy;
use scraper::{Html, Node as HtmlNode, Selector};
use std::fmt;
use std::hash::Hash;

static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("body selector"));

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// One child-list change under the observed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord<N> {
    pub target: N,
    pub added: Vec<N>,
    pub removed: Vec<N>,
}

pub trait TextSource {
    type Node: Copy + Eq + Hash + fmt::Debug;

    /// The observed root, usually `<body>`.
    fn root(&self) -> Self::Node;

    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    fn children(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Character data of a text node; `None` for elements.
    fn text(&self, node: Self::Node) -> Option<String>;

    /// Lowercase tag name of an element; `None` for text nodes.
    fn tag_name(&self, node: Self::Node) -> Option<String>;

    fn attribute(&self, node: Self::Node, name: &str) -> Option<String>;

    fn create_text(&mut self, text: &str) -> Self::Node;

    fn create_element(&mut self, tag: &str, attributes: &[(&str, &str)]) -> Self::Node;

    fn append_child(&mut self, parent: Self::Node, child: Self::Node) -> Result<(), DomError>;

    /// Replaces `old` with `replacement`, in order, as one edit.
    fn replace_node(&mut self, old: Self::Node, replacement: &[Self::Node])
    -> Result<(), DomError>;

    fn remove_node(&mut self, node: Self::Node) -> Result<(), DomError>;

    /// Drains pending mutation records. Sources whose changes are reported by
    /// the host (a real `MutationObserver`) return nothing here.
    fn take_mutations(&mut self) -> Vec<MutationRecord<Self::Node>> {
        Vec::new()
    }

    fn is_text(&self, node: Self::Node) -> bool {
        self.text(node).is_some()
    }

    /// Whether `node` is still reachable from [`TextSource::root`].
    fn is_connected(&self, node: Self::Node) -> bool {
        let root = self.root();
        let mut current = Some(node);
        while let Some(candidate) = current {
            if candidate == root {
                return true;
            }
            current = self.parent(candidate);
        }
        false
    }

    /// Concatenated text of `node` and its descendants.
    fn text_content(&self, node: Self::Node) -> String {
        let mut out = String::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(text) = self.text(current) {
                out.push_str(&text);
                continue;
            }
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeSlot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory document body. Detached nodes stay in the arena so stale ids
/// fail cleanly instead of pointing at reused slots.
#[derive(Debug, Clone)]
pub struct Page {
    nodes: Vec<NodeSlot>,
    root: NodeId,
    journal: Vec<MutationRecord<NodeId>>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        let mut page = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            journal: Vec::new(),
        };
        page.root = page.alloc(NodeData::Element {
            tag: "body".into(),
            attributes: Vec::new(),
        });
        page
    }

    /// Builds a page from an HTML document or fragment. Only the `<body>`
    /// subtree is kept; comments and doctypes are dropped.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut page = Self::new();
        let Some(body) = document.select(&BODY_SELECTOR).next() else {
            return page;
        };
        for (name, value) in body.value().attrs() {
            page.set_attribute(page.root, name, value);
        }

        let mut stack: Vec<_> = body.children().map(|child| (page.root, child)).collect();
        stack.reverse();
        while let Some((parent, node)) = stack.pop() {
            let id = match node.value() {
                HtmlNode::Element(element) => {
                    let attributes: Vec<(&str, &str)> = element.attrs().collect();
                    page.create_element(element.name(), &attributes)
                }
                HtmlNode::Text(text) => page.create_text(&text.text),
                _ => continue,
            };
            page.attach(parent, id, None);
            let mut children: Vec<_> = node.children().map(|child| (id, child)).collect();
            children.reverse();
            stack.extend(children);
        }
        page
    }

    /// Serializes the children of the root back to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in &self.slot(self.root).children {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let slot = self.slot(node);
        match &slot.data {
            NodeData::Text(text) => {
                let raw_parent = slot
                    .parent
                    .and_then(|parent| self.tag(parent))
                    .is_some_and(|tag| matches!(tag, "script" | "style"));
                if raw_parent {
                    out.push_str(text);
                } else {
                    escape_into(text, false, out);
                }
            }
            NodeData::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in &slot.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1 && self.slot(self.root).children.is_empty()
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeSlot {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn slot(&self, node: NodeId) -> &NodeSlot {
        &self.nodes[node.0]
    }

    fn get(&self, node: NodeId) -> Option<&NodeSlot> {
        self.nodes.get(node.0)
    }

    fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.get(node)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(NodeData::Element { attributes, .. }) =
            self.nodes.get_mut(node.0).map(|slot| &mut slot.data)
        {
            match attributes.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// Convenience for building fixtures: appends an element with text.
    pub fn append_element_with_text(
        &mut self,
        parent: NodeId,
        tag: &str,
        text: &str,
    ) -> Result<NodeId, DomError> {
        let element = self.create_element(tag, &[]);
        let text = self.create_text(text);
        self.attach(element, text, None);
        self.append_child(parent, element)?;
        Ok(element)
    }

    /// Elements carrying `name="value"` under `container`, document order.
    pub fn find_by_attribute(&self, container: NodeId, name: &str, value: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![container];
        while let Some(node) = stack.pop() {
            if self.attribute(node, name).as_deref() == Some(value) {
                found.push(node);
            }
            stack.extend(self.slot(node).children.iter().rev().copied());
        }
        found
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, at: Option<usize>) {
        self.detach_quietly(child);
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match at {
            Some(index) if index <= children.len() => children.insert(index, child),
            _ => children.push(child),
        }
    }

    fn detach_quietly(&mut self, node: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.nodes[node.0].parent.take()?;
        let children = &mut self.nodes[parent.0].children;
        let index = children.iter().position(|child| *child == node)?;
        children.remove(index);
        Some((parent, index))
    }

    fn check(&self, node: NodeId) -> Result<(), DomError> {
        if self.get(node).is_none() {
            return Err(DomError::Detached(node.to_string()));
        }
        Ok(())
    }

    /// Rejects placing `child` under `parent` when `child` is `parent` or
    /// one of its ancestors.
    fn check_hierarchy(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let mut current = Some(parent);
        while let Some(node) = current {
            if node == child {
                return Err(DomError::Hierarchy(child.to_string()));
            }
            current = self.slot(node).parent;
        }
        Ok(())
    }

    fn record(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if self.is_connected(target) {
            self.journal.push(MutationRecord {
                target,
                added,
                removed,
            });
        }
    }
}

impl TextSource for Page {
    type Node = NodeId;

    fn root(&self) -> NodeId {
        self.root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node)?.parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.get(node)
            .map(|slot| slot.children.clone())
            .unwrap_or_default()
    }

    fn text(&self, node: NodeId) -> Option<String> {
        match &self.get(node)?.data {
            NodeData::Text(text) => Some(text.clone()),
            NodeData::Element { .. } => None,
        }
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.tag(node).map(str::to_string)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.get(node)?.data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone()),
            NodeData::Text(_) => None,
        }
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    fn create_element(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: attributes
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check(parent)?;
        self.check(child)?;
        if self.tag(parent).is_none() {
            return Err(DomError::NotAnElement(parent.to_string()));
        }
        self.check_hierarchy(parent, child)?;
        if let Some((old_parent, _)) = self.detach_quietly(child) {
            self.record(old_parent, Vec::new(), vec![child]);
        }
        self.attach(parent, child, None);
        self.record(parent, vec![child], Vec::new());
        Ok(())
    }

    fn replace_node(&mut self, old: NodeId, replacement: &[NodeId]) -> Result<(), DomError> {
        self.check(old)?;
        let Some(parent) = self.slot(old).parent else {
            return Err(DomError::Detached(old.to_string()));
        };
        for node in replacement {
            self.check(*node)?;
            if *node != old {
                self.check_hierarchy(parent, *node)?;
            }
        }
        let Some((parent, index)) = self.detach_quietly(old) else {
            return Err(DomError::Detached(old.to_string()));
        };
        for (offset, node) in replacement.iter().enumerate() {
            self.attach(parent, *node, Some(index + offset));
        }
        self.record(parent, replacement.to_vec(), vec![old]);
        Ok(())
    }

    fn remove_node(&mut self, node: NodeId) -> Result<(), DomError> {
        self.check(node)?;
        let Some((parent, _)) = self.detach_quietly(node) else {
            return Err(DomError::Detached(node.to_string()));
        };
        self.record(parent, Vec::new(), vec![node]);
        Ok(())
    }

    fn take_mutations(&mut self) -> Vec<MutationRecord<NodeId>> {
        std::mem::take(&mut self.journal)
    }
}

fn escape_into(raw: &str, attribute: bool, out: &mut String) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}
