use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::annotation::{Annotation, AnnotationSet};

/// Opening item payload: the node type plus its attributes.
///
/// Inline elements (e.g. an inline image) also carry the annotations that
/// apply to them, the same way text units do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementData {
    pub node_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "AnnotationSet::is_empty")]
    pub annotations: AnnotationSet,
}

impl ElementData {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            attributes: BTreeMap::new(),
            annotations: AnnotationSet::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// One unit of the flat document sequence. Every item has width 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearItem {
    Open(ElementData),
    Close(String),
    Text { ch: char, annotations: AnnotationSet },
}

impl LinearItem {
    pub fn text(ch: char) -> Self {
        Self::Text {
            ch,
            annotations: AnnotationSet::new(),
        }
    }

    pub fn annotated(ch: char, annotations: AnnotationSet) -> Self {
        Self::Text { ch, annotations }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Node type of an Open/Close item
    pub fn node_type(&self) -> Option<&str> {
        match self {
            Self::Open(element) => Some(&element.node_type),
            Self::Close(node_type) => Some(node_type),
            Self::Text { .. } => None,
        }
    }

    /// Annotations carried by a text unit or an opening inline element
    pub fn annotations(&self) -> Option<&AnnotationSet> {
        match self {
            Self::Text { annotations, .. } => Some(annotations),
            Self::Open(element) => Some(&element.annotations),
            Self::Close(_) => None,
        }
    }

    pub fn annotations_mut(&mut self) -> Option<&mut AnnotationSet> {
        match self {
            Self::Text { annotations, .. } => Some(annotations),
            Self::Open(element) => Some(&mut element.annotations),
            Self::Close(_) => None,
        }
    }
}

/// The flat, offset-addressable document sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearData {
    items: Vec<LinearItem>,
}

impl LinearData {
    pub fn new(items: Vec<LinearItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, offset: usize) -> Option<&LinearItem> {
        self.items.get(offset)
    }

    pub fn get_mut(&mut self, offset: usize) -> Option<&mut LinearItem> {
        self.items.get_mut(offset)
    }

    pub fn items(&self) -> &[LinearItem] {
        &self.items
    }

    /// Items in `start..end`, clamped to the data length
    pub fn slice(&self, start: usize, end: usize) -> &[LinearItem] {
        let end = end.min(self.items.len());
        let start = start.min(end);
        &self.items[start..end]
    }

    /// Replace `remove` items at `at` with `insert`, returning the removed items.
    /// Callers validate the range first.
    pub(crate) fn splice(
        &mut self,
        at: usize,
        remove: usize,
        insert: Vec<LinearItem>,
    ) -> Vec<LinearItem> {
        self.items.splice(at..at + remove, insert).collect()
    }

    pub fn is_text_at(&self, offset: usize) -> bool {
        self.items.get(offset).is_some_and(LinearItem::is_text)
    }

    /// Plain text of the range; non-text items are skipped
    pub fn text_in(&self, start: usize, end: usize) -> String {
        self.slice(start, end)
            .iter()
            .filter_map(|item| match item {
                LinearItem::Text { ch, .. } => Some(*ch),
                _ => None,
            })
            .collect()
    }

    pub fn annotations_at(&self, offset: usize) -> Option<&AnnotationSet> {
        self.items.get(offset).and_then(LinearItem::annotations)
    }

    /// Whether every text unit in the range carries `annotation`.
    /// An empty or text-free range is never "covered".
    pub fn is_covered_by(&self, start: usize, end: usize, annotation: &Annotation) -> bool {
        let mut any = false;
        for item in self.slice(start, end) {
            if let Some(annotations) = item.annotations() {
                if !annotations.contains(annotation) {
                    return false;
                }
                any = true;
            }
        }
        any
    }
}

/// Fluent construction of linear data, mostly for fixtures and import.
#[derive(Debug, Default)]
pub struct DataBuilder {
    items: Vec<LinearItem>,
    annotations: AnnotationSet,
}

impl DataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(mut self, node_type: &str) -> Self {
        self.items.push(LinearItem::Open(ElementData::new(node_type)));
        self
    }

    pub fn open_with(mut self, element: ElementData) -> Self {
        self.items.push(LinearItem::Open(element));
        self
    }

    pub fn close(mut self, node_type: &str) -> Self {
        self.items.push(LinearItem::Close(node_type.to_string()));
        self
    }

    /// Text using whatever annotations are currently active
    pub fn text(mut self, text: &str) -> Self {
        for ch in text.chars() {
            self.items
                .push(LinearItem::annotated(ch, self.annotations.clone()));
        }
        self
    }

    /// Text with an explicit set of annotation names, ignoring the active set
    pub fn annotated(mut self, text: &str, names: &[&str]) -> Self {
        let annotations: AnnotationSet = names.iter().map(|n| Annotation::new(*n)).collect();
        for ch in text.chars() {
            self.items.push(LinearItem::annotated(ch, annotations.clone()));
        }
        self
    }

    /// Start applying `annotation` to subsequent text
    pub fn begin(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn end(mut self, name: &str) -> Self {
        self.annotations.remove_named(name);
        self
    }

    /// An inline leaf: Open + Close with the active annotations attached
    pub fn inline_leaf(mut self, mut element: ElementData) -> Self {
        element.annotations = self.annotations.clone();
        let node_type = element.node_type.clone();
        self.items.push(LinearItem::Open(element));
        self.items.push(LinearItem::Close(node_type));
        self
    }

    /// A block leaf: Open + Close, no annotations
    pub fn leaf(mut self, element: ElementData) -> Self {
        let node_type = element.node_type.clone();
        self.items.push(LinearItem::Open(element));
        self.items.push(LinearItem::Close(node_type));
        self
    }

    pub fn paragraph(self, text: &str) -> Self {
        self.open("paragraph").text(text).close("paragraph")
    }

    pub fn items(self) -> Vec<LinearItem> {
        self.items
    }

    pub fn build(self) -> LinearData {
        LinearData::new(self.items)
    }
}
