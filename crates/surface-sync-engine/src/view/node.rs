use std::collections::HashMap;

use crate::host::dom::DomId;
use crate::model::document::NodeId;
use crate::model::registry::NodeTypeSpec;

/// Arena index of a surface node (view).
pub type ViewId = usize;

/// Branch capability: owns child views and placeholder slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchState {
    /// Block slot elements keyed by the child index they sit before
    pub block_slugs: Vec<(usize, DomId)>,
    /// Filler/inline slot elements of a content branch, in document order
    pub inline_slugs: Vec<DomId>,
    pub block_slug_policy: bool,
}

impl BranchState {
    pub fn block_slug_at(&self, index: usize) -> Option<DomId> {
        self.block_slugs
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, slug)| *slug)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FocusableState {
    pub focused: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizableState {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A surface node: one model node rendered as one element, with its
/// capabilities attached as optional components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewNode {
    pub model: NodeId,
    pub element: DomId,
    pub parent: Option<ViewId>,
    pub children: Vec<ViewId>,
    pub branch: Option<BranchState>,
    /// Renders text and inline content itself
    pub content: bool,
    pub leaf: bool,
    pub inline: bool,
    pub wrapped: bool,
    pub focusable: Option<FocusableState>,
    pub resizable: Option<ResizableState>,
}

impl ViewNode {
    pub fn new(model: NodeId, element: DomId, spec: &NodeTypeSpec) -> Self {
        let branch = (!spec.leaf).then(|| BranchState {
            block_slug_policy: spec.block_slugs,
            ..BranchState::default()
        });
        Self {
            model,
            element,
            parent: None,
            children: Vec::new(),
            branch,
            content: spec.content,
            leaf: spec.leaf,
            inline: spec.inline,
            wrapped: spec.wrapped,
            focusable: spec.focusable.then(FocusableState::default),
            resizable: spec.resizable.then(ResizableState::default),
        }
    }

    pub fn is_content_branch(&self) -> bool {
        self.content && self.branch.is_some()
    }

    pub fn is_focusable(&self) -> bool {
        self.focusable.is_some()
    }
}

pub const DEFAULT_SLUG_FILLER: char = '\u{FEFF}';
pub const DEFAULT_LEAF_PLACEHOLDER: char = '\u{2603}';

/// Arena of views plus the model-to-view index.
#[derive(Debug, Clone)]
pub struct ViewTree {
    nodes: Vec<Option<ViewNode>>,
    by_model: HashMap<NodeId, ViewId>,
    root: ViewId,
    /// Invisible text that keeps slots clickable
    pub slug_filler: char,
    /// One per unit of a leaf's outer length in rendered text
    pub leaf_placeholder: char,
}

impl Default for ViewTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewTree {
    pub fn new() -> Self {
        Self::with_chars(DEFAULT_SLUG_FILLER, DEFAULT_LEAF_PLACEHOLDER)
    }

    pub fn with_chars(slug_filler: char, leaf_placeholder: char) -> Self {
        Self {
            nodes: Vec::new(),
            by_model: HashMap::new(),
            root: 0,
            slug_filler,
            leaf_placeholder,
        }
    }

    /// Id the next [`ViewTree::insert`] will return
    pub fn next_id(&self) -> ViewId {
        self.nodes.len()
    }

    pub fn insert(&mut self, node: ViewNode) -> ViewId {
        let id = self.nodes.len();
        self.by_model.insert(node.model, id);
        self.nodes.push(Some(node));
        id
    }

    pub fn remove(&mut self, id: ViewId) -> Option<ViewNode> {
        let node = self.nodes.get_mut(id)?.take()?;
        if self.by_model.get(&node.model) == Some(&id) {
            self.by_model.remove(&node.model);
        }
        Some(node)
    }

    pub fn set_root(&mut self, id: ViewId) {
        self.root = id;
    }

    pub fn root(&self) -> ViewId {
        self.root
    }

    pub fn get(&self, id: ViewId) -> Option<&ViewNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut ViewNode> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    pub fn for_model(&self, model: NodeId) -> Option<ViewId> {
        self.by_model.get(&model).copied()
    }

    pub fn children(&self, id: ViewId) -> &[ViewId] {
        self.get(id).map_or(&[], |v| v.children.as_slice())
    }

    pub fn element(&self, id: ViewId) -> Option<DomId> {
        self.get(id).map(|v| v.element)
    }

    /// Live views, in arena order
    pub fn iter(&self) -> impl Iterator<Item = (ViewId, &ViewNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| node.as_ref().map(|n| (id, n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::registry::TypeRegistry;

    #[test]
    fn test_capabilities_follow_type_spec() {
        let registry = TypeRegistry::standard();
        let image = ViewNode::new(1, 1, registry.node("image").expect("image"));
        let paragraph = ViewNode::new(2, 2, registry.node("paragraph").expect("paragraph"));

        assert!(image.leaf && image.is_focusable() && image.resizable.is_some());
        assert!(image.branch.is_none());
        assert!(paragraph.is_content_branch());
        assert!(paragraph.focusable.is_none());
    }

    #[test]
    fn test_remove_unindexes_model() {
        let registry = TypeRegistry::standard();
        let mut tree = ViewTree::new();
        let id = tree.insert(ViewNode::new(7, 3, registry.node("paragraph").expect("p")));

        assert_eq!(tree.for_model(7), Some(id));
        assert!(tree.remove(id).is_some());
        assert_eq!(tree.for_model(7), None);
        assert!(tree.get(id).is_none());
    }
}
