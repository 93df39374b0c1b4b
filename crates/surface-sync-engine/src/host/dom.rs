use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::annotation::Annotation;
use crate::view::node::ViewId;

/// Arena index of a surface tree node. Nodes are never freed; a removed node
/// is simply detached.
pub type DomId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MarkerSide {
    Pre,
    Post,
}

/// What an element means to the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    /// Rendering of a model node (1:1, counts toward linear width)
    View(ViewId),
    /// Zero-width inline annotation wrapper
    Annotation(Annotation),
    /// Placeholder slot; never counted
    Slug,
    /// One of the boundary markers
    Marker(MarkerSide),
    /// Anything the engine did not create (browser-style wrappers, the body)
    Plain,
    /// Visual-only selection highlight used while deactivated
    Highlight,
    /// Root of a nested editing surface; selections inside it are ignored
    NestedSurface,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNodeKind {
    Element {
        tag: String,
        role: Role,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomNode {
    pub kind: DomNodeKind,
    pub parent: Option<DomId>,
    pub children: Vec<DomId>,
}

/// A boundary point: a char offset inside a text node, or a child index
/// inside an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DomPosition {
    pub node: DomId,
    pub offset: usize,
}

impl DomPosition {
    pub fn new(node: DomId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// The host platform's selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NativeSelection {
    pub anchor: DomPosition,
    pub focus: DomPosition,
}

impl NativeSelection {
    pub fn new(anchor: DomPosition, focus: DomPosition) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(position: DomPosition) -> Self {
        Self::new(position, position)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

const VOID_TAGS: &[&str] = &["img", "br", "hr"];
const BLOCK_TAGS: &[&str] = &[
    "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "figure", "blockquote",
];

/// A minimal DOM: an arena of elements and text nodes under a body element,
/// plus the native selection and host focus.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<DomNode>,
    body: DomId,
    selection: Option<NativeSelection>,
    focused: bool,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        let body = DomNode {
            kind: DomNodeKind::Element {
                tag: "body".to_string(),
                role: Role::Plain,
                attributes: BTreeMap::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![body],
            body: 0,
            selection: None,
            focused: false,
        }
    }

    pub fn body(&self) -> DomId {
        self.body
    }

    pub fn node(&self, id: DomId) -> Option<&DomNode> {
        self.nodes.get(id)
    }

    pub fn create_element(&mut self, tag: &str, role: Role) -> DomId {
        self.nodes.push(DomNode {
            kind: DomNodeKind::Element {
                tag: tag.to_string(),
                role,
                attributes: BTreeMap::new(),
            },
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn create_text(&mut self, text: &str) -> DomId {
        self.nodes.push(DomNode {
            kind: DomNodeKind::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn is_text(&self, id: DomId) -> bool {
        matches!(self.node(id).map(|n| &n.kind), Some(DomNodeKind::Text(_)))
    }

    pub fn is_element(&self, id: DomId) -> bool {
        matches!(self.node(id).map(|n| &n.kind), Some(DomNodeKind::Element { .. }))
    }

    /// Text content of a text node; empty for elements
    pub fn text(&self, id: DomId) -> &str {
        match self.node(id).map(|n| &n.kind) {
            Some(DomNodeKind::Text(text)) => text,
            _ => "",
        }
    }

    pub fn set_text(&mut self, id: DomId, value: &str) {
        if let Some(DomNode {
            kind: DomNodeKind::Text(text),
            ..
        }) = self.nodes.get_mut(id)
        {
            *text = value.to_string();
        }
    }

    /// Insert `value` at char offset `at` of a text node
    pub fn insert_text(&mut self, id: DomId, at: usize, value: &str) {
        let mut chars: Vec<char> = self.text(id).chars().collect();
        let at = at.min(chars.len());
        chars.splice(at..at, value.chars());
        let text: String = chars.into_iter().collect();
        self.set_text(id, &text);
    }

    /// Remove chars `start..end` of a text node
    pub fn remove_text(&mut self, id: DomId, start: usize, end: usize) {
        let mut chars: Vec<char> = self.text(id).chars().collect();
        let end = end.min(chars.len());
        let start = start.min(end);
        chars.drain(start..end);
        let text: String = chars.into_iter().collect();
        self.set_text(id, &text);
    }

    pub fn tag(&self, id: DomId) -> &str {
        match self.node(id).map(|n| &n.kind) {
            Some(DomNodeKind::Element { tag, .. }) => tag,
            _ => "",
        }
    }

    pub fn role(&self, id: DomId) -> Option<&Role> {
        match self.node(id).map(|n| &n.kind) {
            Some(DomNodeKind::Element { role, .. }) => Some(role),
            _ => None,
        }
    }

    pub fn view_of(&self, id: DomId) -> Option<ViewId> {
        match self.role(id) {
            Some(Role::View(view)) => Some(*view),
            _ => None,
        }
    }

    pub fn is_slug(&self, id: DomId) -> bool {
        matches!(self.role(id), Some(Role::Slug))
    }

    pub fn marker_side(&self, id: DomId) -> Option<MarkerSide> {
        match self.role(id) {
            Some(Role::Marker(side)) => Some(*side),
            _ => None,
        }
    }

    pub fn attribute(&self, id: DomId, key: &str) -> Option<&str> {
        match self.node(id).map(|n| &n.kind) {
            Some(DomNodeKind::Element { attributes, .. }) => attributes.get(key).map(String::as_str),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, id: DomId, key: &str, value: &str) {
        if let Some(DomNode {
            kind: DomNodeKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            attributes.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove_attribute(&mut self, id: DomId, key: &str) {
        if let Some(DomNode {
            kind: DomNodeKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            attributes.remove(key);
        }
    }

    /// Non-editable islands (rendered leaves) opt out with `contenteditable="false"`
    pub fn is_non_editable(&self, id: DomId) -> bool {
        self.attribute(id, "contenteditable") == Some("false")
    }

    pub fn is_block(&self, id: DomId) -> bool {
        BLOCK_TAGS.contains(&self.tag(id))
    }

    pub fn parent(&self, id: DomId) -> Option<DomId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: DomId) -> &[DomId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn child(&self, id: DomId, index: usize) -> Option<DomId> {
        self.children(id).get(index).copied()
    }

    /// DOM "length": chars for text nodes, children for elements
    pub fn length(&self, id: DomId) -> usize {
        if self.is_text(id) {
            self.text(id).chars().count()
        } else {
            self.children(id).len()
        }
    }

    pub fn index_of(&self, id: DomId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Position directly before `id` in its parent
    pub fn position_before(&self, id: DomId) -> Option<DomPosition> {
        Some(DomPosition::new(self.parent(id)?, self.index_of(id)?))
    }

    pub fn position_after(&self, id: DomId) -> Option<DomPosition> {
        Some(DomPosition::new(self.parent(id)?, self.index_of(id)? + 1))
    }

    pub fn detach(&mut self, id: DomId) {
        if let Some(parent) = self.parent(id) {
            self.nodes[parent].children.retain(|&c| c != id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = None;
        }
    }

    pub fn append_child(&mut self, parent: DomId, child: DomId) {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child);
    }

    /// Insert `child` at `index`, detaching it from wherever it was first
    pub fn insert_child(&mut self, parent: DomId, index: usize, child: DomId) {
        self.detach(child);
        let Some(node) = self.nodes.get_mut(parent) else {
            return;
        };
        let index = index.min(node.children.len());
        node.children.insert(index, child);
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
    }

    pub fn insert_before(&mut self, reference: DomId, child: DomId) {
        if let Some(parent) = self.parent(reference) {
            let index = self.index_of(reference).unwrap_or(0);
            self.insert_child(parent, index, child);
        }
    }

    /// Detach all current children and attach `children` in order
    pub fn replace_children(&mut self, parent: DomId, children: Vec<DomId>) {
        for child in self.children(parent).to_vec() {
            self.detach(child);
        }
        for child in children {
            self.append_child(parent, child);
        }
    }

    /// Wrap `id` in `wrapper` at its current place
    pub fn wrap(&mut self, id: DomId, wrapper: DomId) {
        if let Some(position) = self.position_before(id) {
            self.insert_child(position.node, position.offset, wrapper);
            self.append_child(wrapper, id);
        }
    }

    /// Whether `node` is `ancestor` or one of its descendants
    pub fn contains(&self, ancestor: DomId, node: DomId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Nearest inclusive ancestor satisfying `predicate`
    pub fn closest(&self, node: DomId, predicate: impl Fn(DomId) -> bool) -> Option<DomId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if predicate(id) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    /// Child indices from the topmost ancestor down to `id`
    pub fn path(&self, id: DomId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(index) = self.index_of(current) {
            path.push(index);
            current = self.parent(current).unwrap_or(current);
        }
        path.reverse();
        path
    }

    /// Document order of two boundary points.
    ///
    /// A position is its node's path followed by the offset, compared
    /// lexicographically: `(el, k)` sorts before anything inside child `k`.
    pub fn compare_positions(&self, a: DomPosition, b: DomPosition) -> Ordering {
        let mut path_a = self.path(a.node);
        path_a.push(a.offset);
        let mut path_b = self.path(b.node);
        path_b.push(b.offset);
        path_a.cmp(&path_b)
    }

    /// Every node under `root` in document order, `root` included
    pub fn descendants(&self, root: DomId) -> Vec<DomId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn selection(&self) -> Option<NativeSelection> {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Option<NativeSelection>) {
        self.selection = selection;
    }

    pub fn has_focus(&self) -> bool {
        self.focused
    }

    pub fn set_focus(&mut self, focused: bool) {
        self.focused = focused;
    }

    /// HTML serialization of `id` and its subtree
    pub fn serialize(&self, id: DomId) -> String {
        let mut out = String::new();
        self.serialize_into(id, &mut out);
        out
    }

    /// HTML serialization of the children of `id`
    pub fn serialize_children(&self, id: DomId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.serialize_into(child, &mut out);
        }
        out
    }

    fn serialize_into(&self, id: DomId, out: &mut String) {
        match self.node(id).map(|n| &n.kind) {
            Some(DomNodeKind::Text(text)) => {
                out.push_str(&html_escape::encode_text(text));
            }
            Some(DomNodeKind::Element {
                tag, attributes, ..
            }) => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                for &child in self.children(id) {
                    self.serialize_into(child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            None => {}
        }
    }
}
