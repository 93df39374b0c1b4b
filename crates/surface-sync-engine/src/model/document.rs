use log::{debug, trace};

use crate::error::{ModelError, RegistryError};
use crate::model::annotation::Annotation;
use crate::model::linear::{ElementData, LinearData, LinearItem};
use crate::model::registry::{NodeTypeSpec, TypeRegistry};
use crate::model::selection::Range;
use crate::model::transaction::{Operation, Transaction};

/// Arena index of a model node. Stable for as long as the node survives edits.
pub type NodeId = usize;

/// A node of the model tree derived from the linear data.
///
/// Nodes only record structure and outer length; offsets are derived by
/// walking siblings, and element attributes are read from the linear data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNode {
    pub node_type: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Outer length, including the Open/Close pair of wrapped nodes
    pub length: usize,
}

/// Structural change notifications emitted by [`ModelDocument::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// `removed` children of `parent` starting at `index` were replaced by `added`
    Splice {
        parent: NodeId,
        index: usize,
        removed: Vec<NodeId>,
        added: Vec<NodeId>,
    },
    /// A content branch's text or annotations changed
    Update(NodeId),
}

/// Intermediate tree parsed from a slice of linear data before it is
/// committed to the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ParsedNode {
    Text {
        length: usize,
    },
    Element {
        element: ElementData,
        children: Vec<ParsedNode>,
        length: usize,
    },
}

impl ParsedNode {
    fn length(&self) -> usize {
        match self {
            ParsedNode::Text { length } | ParsedNode::Element { length, .. } => *length,
        }
    }

    fn node_type(&self) -> &str {
        match self {
            ParsedNode::Text { .. } => "text",
            ParsedNode::Element { element, .. } => &element.node_type,
        }
    }
}

/// Linear data plus the node tree that describes it.
#[derive(Debug, Clone)]
pub struct ModelDocument {
    data: LinearData,
    nodes: Vec<Option<ModelNode>>,
    root: NodeId,
    registry: TypeRegistry,
}

impl ModelDocument {
    /// Build a document from linear data; the root is an unwrapped `document` node
    pub fn new(data: LinearData, registry: TypeRegistry) -> Result<Self, ModelError> {
        let root_spec = registry.node("document")?;
        let mut pos = 0;
        let parsed = parse_children(&registry, data.items(), &mut pos, 0, root_spec, None)?;

        let mut document = Self {
            nodes: vec![Some(ModelNode {
                node_type: "document".to_string(),
                parent: None,
                children: Vec::new(),
                length: data.len(),
            })],
            data,
            root: 0,
            registry,
        };
        let children: Vec<NodeId> = parsed
            .into_iter()
            .map(|p| document.insert_parsed(p, 0))
            .collect();
        if let Some(root) = document.nodes[0].as_mut() {
            root.children = children;
        }
        Ok(document)
    }

    pub fn data(&self) -> &LinearData {
        &self.data
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&ModelNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn spec(&self, id: NodeId) -> Result<&NodeTypeSpec, RegistryError> {
        let node_type = self.node(id).map_or("", |n| n.node_type.as_str());
        self.registry.node(node_type)
    }

    pub fn outer_length(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, |n| n.length)
    }

    pub fn is_wrapped(&self, id: NodeId) -> bool {
        self.spec(id).is_ok_and(|s| s.wrapped)
    }

    pub fn is_content_branch(&self, id: NodeId) -> bool {
        self.spec(id).is_ok_and(|s| s.content)
    }

    /// Linear offset of the node's first item
    pub fn offset_of(&self, id: NodeId) -> usize {
        let Some(parent) = self.parent(id) else {
            return 0;
        };
        let mut offset = self.offset_of(parent) + usize::from(self.is_wrapped(parent));
        for &sibling in self.children(parent) {
            if sibling == id {
                break;
            }
            offset += self.outer_length(sibling);
        }
        offset
    }

    /// Offsets just inside the node's Open and Close items
    pub fn inner_range(&self, id: NodeId) -> (usize, usize) {
        let offset = self.offset_of(id);
        let wrapped = usize::from(self.is_wrapped(id));
        let length = self.outer_length(id);
        (offset + wrapped, (offset + length).saturating_sub(wrapped))
    }

    pub fn outer_range(&self, id: NodeId) -> Range {
        let offset = self.offset_of(id);
        Range::new(offset, offset + self.outer_length(id))
    }

    /// The Open item of a wrapped node
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        if !self.is_wrapped(id) {
            return None;
        }
        match self.data.get(self.offset_of(id)) {
            Some(LinearItem::Open(element)) => Some(element),
            _ => None,
        }
    }

    /// Deepest content branch whose inner range contains `offset` (inclusive)
    pub fn content_branch_at(&self, offset: usize) -> Option<NodeId> {
        let branch = self.branch_at(offset, offset);
        self.is_content_branch(branch).then_some(branch)
    }

    /// Deepest non-leaf node whose inner range contains `start..end`
    pub fn branch_at(&self, start: usize, end: usize) -> NodeId {
        let mut current = self.root;
        'descend: loop {
            let mut offset = self.inner_range(current).0;
            for &child in self.children(current) {
                let length = self.outer_length(child);
                let descendable = self.spec(child).is_ok_and(|s| s.wrapped && !s.leaf);
                if descendable && offset < start && end < offset + length {
                    current = child;
                    continue 'descend;
                }
                offset += length;
            }
            return current;
        }
    }

    /// Apply every operation of the transaction, collecting tree events.
    ///
    /// Each operation is validated before the data is touched, so a failing
    /// operation leaves the document as the previous operation left it.
    pub fn commit(&mut self, tx: &Transaction) -> Result<Vec<ModelEvent>, ModelError> {
        let mut events = Vec::new();
        for operation in tx.operations() {
            match operation {
                Operation::Splice { at, remove, insert } => {
                    events.extend(self.splice(*at, *remove, insert.clone())?);
                }
                Operation::Annotate {
                    start,
                    end,
                    annotation,
                    set,
                } => {
                    events.extend(self.annotate(*start, *end, annotation, *set)?);
                }
            }
        }
        Ok(events)
    }

    fn splice(
        &mut self,
        at: usize,
        remove: usize,
        insert: Vec<LinearItem>,
    ) -> Result<Vec<ModelEvent>, ModelError> {
        let len = self.data.len();
        if at + remove > len {
            return Err(ModelError::SpliceOutOfRange { at, remove, len });
        }

        // Widen to the parent until the spliced data balances (e.g. a split
        // inserts Close+Open inside a content branch)
        let mut branch = self.branch_at(at, at + remove);
        let (parsed, inner_start, branch_spec) = loop {
            let (inner_start, inner_end) = self.inner_range(branch);
            let branch_spec = self.spec(branch)?.clone();
            let mut new_items = self.data.slice(inner_start, inner_end).to_vec();
            let local = at - inner_start;
            new_items.splice(local..local + remove, insert.iter().cloned());
            let mut pos = 0;
            match parse_children(
                &self.registry,
                &new_items,
                &mut pos,
                inner_start,
                &branch_spec,
                None,
            ) {
                Ok(parsed) => break (parsed, inner_start, branch_spec),
                Err(ModelError::Unbalanced(offset)) => match self.parent(branch) {
                    Some(parent) => branch = parent,
                    None => return Err(ModelError::Unbalanced(offset)),
                },
                Err(err) => return Err(err),
            }
        };

        // Match unchanged children at either end so they keep their ids
        let old_children = self.children(branch).to_vec();
        let mut old_starts = Vec::with_capacity(old_children.len());
        let mut cursor = inner_start;
        for &child in &old_children {
            old_starts.push(cursor);
            cursor += self.outer_length(child);
        }
        let mut prefix = 0;
        while prefix < old_children.len()
            && prefix < parsed.len()
            && old_starts[prefix] + self.outer_length(old_children[prefix]) <= at
            && self.matches_parsed(old_children[prefix], &parsed[prefix])
        {
            prefix += 1;
        }
        let mut suffix = 0;
        while suffix < old_children.len() - prefix && suffix < parsed.len() - prefix {
            let old_index = old_children.len() - 1 - suffix;
            if old_starts[old_index] < at + remove
                || !self.matches_parsed(old_children[old_index], &parsed[parsed.len() - 1 - suffix])
            {
                break;
            }
            suffix += 1;
        }

        trace!(
            "splice {at}+{remove} (+{}) in node {branch}: keeping {prefix} leading, {suffix} trailing",
            insert.len()
        );
        let delta = insert.len() as isize - remove as isize;
        self.data.splice(at, remove, insert);

        let removed: Vec<NodeId> = old_children[prefix..old_children.len() - suffix].to_vec();
        let added: Vec<NodeId> = parsed[prefix..parsed.len() - suffix]
            .iter()
            .cloned()
            .map(|p| self.insert_parsed(p, branch))
            .collect();
        let mut children = old_children[..prefix].to_vec();
        children.extend(added.iter().copied());
        children.extend(old_children[old_children.len() - suffix..].iter().copied());

        for &id in &removed {
            self.tombstone(id);
        }
        if let Some(node) = self.nodes[branch].as_mut() {
            node.children = children;
        }
        let mut ancestor = Some(branch);
        while let Some(id) = ancestor {
            if let Some(node) = self.nodes[id].as_mut() {
                node.length = node.length.saturating_add_signed(delta);
                ancestor = node.parent;
            } else {
                ancestor = None;
            }
        }

        let mut events = Vec::new();
        if !removed.is_empty() || !added.is_empty() {
            events.push(ModelEvent::Splice {
                parent: branch,
                index: prefix,
                removed,
                added,
            });
        }
        if branch_spec.content {
            events.push(ModelEvent::Update(branch));
        }
        debug!("committed splice at {at}: {} event(s)", events.len());
        Ok(events)
    }

    fn annotate(
        &mut self,
        start: usize,
        end: usize,
        annotation: &Annotation,
        set: bool,
    ) -> Result<Vec<ModelEvent>, ModelError> {
        let len = self.data.len();
        if start > end || end > len {
            return Err(ModelError::SpliceOutOfRange {
                at: start,
                remove: end.saturating_sub(start),
                len,
            });
        }
        self.registry.annotation(&annotation.name)?;

        let mut touched = Vec::new();
        for offset in start..end {
            let is_inline_open = matches!(
                self.data.get(offset),
                Some(LinearItem::Open(element))
                    if self.registry.node(&element.node_type).is_ok_and(|s| s.inline)
            );
            let annotatable = self.data.is_text_at(offset) || is_inline_open;
            if !annotatable {
                continue;
            }
            if let Some(annotations) = self.data.get_mut(offset).and_then(LinearItem::annotations_mut) {
                if set {
                    annotations.push(annotation.clone());
                } else {
                    annotations.remove(annotation);
                }
            }
            if let Some(branch) = self.content_branch_at(offset)
                && !touched.contains(&branch)
            {
                touched.push(branch);
            }
        }
        debug!(
            "{} {} over {start}..{end} in {} branch(es)",
            if set { "set" } else { "cleared" },
            annotation.name,
            touched.len()
        );
        Ok(touched.into_iter().map(ModelEvent::Update).collect())
    }

    fn matches_parsed(&self, id: NodeId, parsed: &ParsedNode) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if node.node_type != parsed.node_type() || node.length != parsed.length() {
            return false;
        }
        match parsed {
            ParsedNode::Text { .. } => true,
            ParsedNode::Element { element, .. } => self.element(id) == Some(element),
        }
    }

    fn insert_parsed(&mut self, parsed: ParsedNode, parent: NodeId) -> NodeId {
        let id = self.nodes.len();
        match parsed {
            ParsedNode::Text { length } => {
                self.nodes.push(Some(ModelNode {
                    node_type: "text".to_string(),
                    parent: Some(parent),
                    children: Vec::new(),
                    length,
                }));
            }
            ParsedNode::Element {
                element,
                children,
                length,
            } => {
                self.nodes.push(Some(ModelNode {
                    node_type: element.node_type,
                    parent: Some(parent),
                    children: Vec::new(),
                    length,
                }));
                let child_ids: Vec<NodeId> = children
                    .into_iter()
                    .map(|c| self.insert_parsed(c, id))
                    .collect();
                if let Some(node) = self.nodes[id].as_mut() {
                    node.children = child_ids;
                }
            }
        }
        id
    }

    fn tombstone(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        for child in children {
            self.tombstone(child);
        }
        if let Some(slot) = self.nodes.get_mut(id) {
            *slot = None;
        }
    }
}

/// Parse `items[*pos..]` as the children of a node of type `parent`, stopping
/// after the matching Close when `closing` is given.
fn parse_children(
    registry: &TypeRegistry,
    items: &[LinearItem],
    pos: &mut usize,
    base: usize,
    parent: &NodeTypeSpec,
    closing: Option<&str>,
) -> Result<Vec<ParsedNode>, ModelError> {
    let mut children: Vec<ParsedNode> = Vec::new();
    loop {
        let Some(item) = items.get(*pos) else {
            return match closing {
                Some(_) => Err(ModelError::Unbalanced(base + *pos)),
                None => Ok(children),
            };
        };
        match item {
            LinearItem::Text { .. } => {
                if !parent.content {
                    return Err(ModelError::MisplacedText(base + *pos));
                }
                match children.last_mut() {
                    Some(ParsedNode::Text { length }) => *length += 1,
                    _ => children.push(ParsedNode::Text { length: 1 }),
                }
                *pos += 1;
            }
            LinearItem::Open(element) => {
                let spec = registry.node(&element.node_type)?;
                let misplaced = parent.leaf
                    || parent.content != spec.inline
                    || spec
                        .parent_types
                        .as_ref()
                        .is_some_and(|types| !types.contains(&parent.name));
                if misplaced {
                    return Err(ModelError::InvalidParent {
                        child: spec.name.clone(),
                        parent: parent.name.clone(),
                    });
                }

                let start = *pos;
                *pos += 1;
                let grandchildren = if spec.leaf {
                    match items.get(*pos) {
                        Some(LinearItem::Close(node_type)) if *node_type == element.node_type => {
                            *pos += 1;
                        }
                        _ => return Err(ModelError::Unbalanced(base + *pos)),
                    }
                    Vec::new()
                } else {
                    parse_children(registry, items, pos, base, spec, Some(&element.node_type))?
                };
                children.push(ParsedNode::Element {
                    element: element.clone(),
                    children: grandchildren,
                    length: *pos - start,
                });
            }
            LinearItem::Close(node_type) => {
                if closing == Some(node_type.as_str()) {
                    *pos += 1;
                    return Ok(children);
                }
                return Err(ModelError::Unbalanced(base + *pos));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::annotation::AnnotationSet;
    use crate::model::linear::DataBuilder;
    use pretty_assertions::assert_eq;

    fn document(builder: DataBuilder) -> ModelDocument {
        ModelDocument::new(builder.build(), TypeRegistry::standard()).expect("valid fixture")
    }

    fn two_paragraphs() -> ModelDocument {
        document(DataBuilder::new().paragraph("abc").paragraph("de"))
    }

    #[test]
    fn test_tree_mirrors_data() {
        let doc = two_paragraphs();
        let root = doc.root();
        let paragraphs = doc.children(root).to_vec();

        assert_eq!(paragraphs.len(), 2);
        assert_eq!(doc.offset_of(paragraphs[0]), 0);
        assert_eq!(doc.offset_of(paragraphs[1]), 5);
        assert_eq!(doc.inner_range(paragraphs[1]), (6, 8));
        assert_eq!(doc.outer_length(root), 9);
        let text = doc.children(paragraphs[0])[0];
        assert_eq!(doc.node(text).map(|n| n.length), Some(3));
    }

    #[test]
    fn test_content_branch_at_edges() {
        let doc = two_paragraphs();
        let paragraphs = doc.children(doc.root()).to_vec();

        assert_eq!(doc.content_branch_at(1), Some(paragraphs[0]));
        assert_eq!(doc.content_branch_at(4), Some(paragraphs[0]));
        assert_eq!(doc.content_branch_at(5), None);
        assert_eq!(doc.content_branch_at(6), Some(paragraphs[1]));
    }

    #[test]
    fn test_text_insertion_keeps_branch_ids() {
        let mut doc = two_paragraphs();
        let paragraphs = doc.children(doc.root()).to_vec();

        let events = doc
            .commit(&Transaction::insert_text(4, "!", &AnnotationSet::new()))
            .expect("insert");

        assert_eq!(doc.data().text_in(0, doc.len()), "abc!de");
        assert_eq!(doc.children(doc.root()), paragraphs.as_slice());
        assert_eq!(doc.outer_length(paragraphs[0]), 6);
        assert!(matches!(events.as_slice(), [
            ModelEvent::Splice { parent, removed, added, .. },
            ModelEvent::Update(updated),
        ] if *parent == paragraphs[0] && removed.len() == 1 && added.len() == 1 && *updated == paragraphs[0]));
    }

    #[test]
    fn test_merge_replaces_both_paragraphs() {
        let mut doc = document(DataBuilder::new().paragraph("ab").paragraph("cd").paragraph("ef"));
        let before = doc.children(doc.root()).to_vec();

        let events = doc
            .commit(&Transaction::removal(Range::new(3, 5)))
            .expect("merge");

        let after = doc.children(doc.root()).to_vec();
        assert_eq!(after.len(), 2);
        assert_eq!(after[1], before[2]);
        assert_eq!(
            events,
            vec![ModelEvent::Splice {
                parent: doc.root(),
                index: 0,
                removed: vec![before[0], before[1]],
                added: vec![after[0]],
            }]
        );
        assert!(doc.node(before[1]).is_none());
    }

    #[test]
    fn test_invalid_splice_leaves_document_untouched() {
        let mut doc = two_paragraphs();
        let before = doc.data().clone();

        let result = doc.commit(&Transaction::insertion(1, vec![LinearItem::Close("paragraph".into())]));

        assert!(result.is_err());
        assert_eq!(doc.data(), &before);
        assert_eq!(doc.children(doc.root()).len(), 2);
    }

    #[test]
    fn test_text_outside_content_branch_is_rejected() {
        let mut doc = two_paragraphs();
        let result = doc.commit(&Transaction::insert_text(5, "x", &AnnotationSet::new()));

        assert_eq!(result, Err(ModelError::MisplacedText(5)));
    }

    #[test]
    fn test_list_item_requires_list_parent() {
        let data = DataBuilder::new()
            .open("listItem")
            .paragraph("x")
            .close("listItem")
            .build();

        assert_eq!(
            ModelDocument::new(data, TypeRegistry::standard()).err(),
            Some(ModelError::InvalidParent {
                child: "listItem".into(),
                parent: "document".into()
            })
        );
    }

    #[test]
    fn test_annotate_updates_content_branches() {
        let mut doc = two_paragraphs();
        let paragraphs = doc.children(doc.root()).to_vec();

        let events = doc
            .commit(&Transaction::annotation(
                Range::new(2, 7),
                Annotation::new("bold"),
                true,
            ))
            .expect("annotate");

        assert_eq!(
            events,
            vec![
                ModelEvent::Update(paragraphs[0]),
                ModelEvent::Update(paragraphs[1])
            ]
        );
        assert!(doc.data().is_covered_by(2, 4, &Annotation::new("bold")));
        assert!(!doc.data().is_covered_by(1, 2, &Annotation::new("bold")));
    }

    #[test]
    fn test_split_paragraph() {
        let mut doc = two_paragraphs();
        let tx = Transaction::split(&doc, 2).expect("split");
        doc.commit(&tx).expect("commit");

        assert_eq!(doc.children(doc.root()).len(), 3);
        assert_eq!(doc.data().text_in(0, 6), "abc");
        assert_eq!(doc.content_branch_at(4).map(|b| doc.inner_range(b)), Some((4, 6)));
    }
}
