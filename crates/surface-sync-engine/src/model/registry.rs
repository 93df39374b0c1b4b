use std::collections::HashMap;

use crate::error::RegistryError;
use crate::model::linear::ElementData;

/// Rendering and structural policy for one node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTypeSpec {
    pub name: String,
    /// Element tag in the surface tree
    pub tag: String,
    /// Renders an Open/Close pair in the linear data (everything except the
    /// document root and text)
    pub wrapped: bool,
    /// Content-bearing branch: children are text and inline nodes only
    pub content: bool,
    /// Lives inside content branches
    pub inline: bool,
    /// No model children
    pub leaf: bool,
    pub focusable: bool,
    pub resizable: bool,
    /// Structural branch that keeps placeholder slots between sluggable children
    pub block_slugs: bool,
    pub split_on_enter: bool,
    /// Restricts which node types may contain this one
    pub parent_types: Option<Vec<String>>,
}

impl NodeTypeSpec {
    fn branch(name: &str, tag: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            wrapped: true,
            content: false,
            inline: false,
            leaf: false,
            focusable: false,
            resizable: false,
            block_slugs: false,
            split_on_enter: false,
            parent_types: None,
        }
    }

    /// Whether a block slug may sit next to a node of this type
    pub fn is_sluggable(&self) -> bool {
        !self.content && !self.inline && self.parent_types.is_none()
    }
}

/// Rendering policy for one annotation type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationTypeSpec {
    pub name: String,
    pub tag: String,
    /// Dropped from the insertion annotations at a word boundary
    pub split_on_word_break: bool,
}

/// Node and annotation types keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    nodes: HashMap<String, NodeTypeSpec>,
    annotations: HashMap<String, AnnotationTypeSpec>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by the CLI and the test fixtures
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register_node(NodeTypeSpec {
            wrapped: false,
            block_slugs: true,
            ..NodeTypeSpec::branch("document", "div")
        });
        registry.register_node(NodeTypeSpec {
            content: true,
            split_on_enter: true,
            ..NodeTypeSpec::branch("paragraph", "p")
        });
        registry.register_node(NodeTypeSpec {
            content: true,
            split_on_enter: true,
            ..NodeTypeSpec::branch("heading", "h1")
        });
        registry.register_node(NodeTypeSpec::branch("list", "ul"));
        registry.register_node(NodeTypeSpec {
            block_slugs: true,
            parent_types: Some(vec!["list".to_string()]),
            ..NodeTypeSpec::branch("listItem", "li")
        });
        registry.register_node(NodeTypeSpec {
            leaf: true,
            focusable: true,
            resizable: true,
            ..NodeTypeSpec::branch("image", "figure")
        });
        registry.register_node(NodeTypeSpec {
            leaf: true,
            inline: true,
            focusable: true,
            ..NodeTypeSpec::branch("inlineImage", "img")
        });
        registry.register_node(NodeTypeSpec {
            wrapped: false,
            inline: true,
            ..NodeTypeSpec::branch("text", "")
        });

        for (name, tag, split_on_word_break) in [
            ("bold", "b", false),
            ("italic", "i", false),
            ("underline", "u", false),
            ("code", "code", false),
            ("link", "a", true),
        ] {
            registry.register_annotation(AnnotationTypeSpec {
                name: name.to_string(),
                tag: tag.to_string(),
                split_on_word_break,
            });
        }

        registry
    }

    pub fn register_node(&mut self, spec: NodeTypeSpec) {
        self.nodes.insert(spec.name.clone(), spec);
    }

    pub fn register_annotation(&mut self, spec: AnnotationTypeSpec) {
        self.annotations.insert(spec.name.clone(), spec);
    }

    pub fn node(&self, name: &str) -> Result<&NodeTypeSpec, RegistryError> {
        self.nodes
            .get(name)
            .ok_or_else(|| RegistryError::UnknownNodeType(name.to_string()))
    }

    pub fn annotation(&self, name: &str) -> Result<&AnnotationTypeSpec, RegistryError> {
        self.annotations
            .get(name)
            .ok_or_else(|| RegistryError::UnknownAnnotationType(name.to_string()))
    }

    /// Surface tag for an element; headings pick theirs from the `level` attribute
    pub fn tag_for(&self, element: &ElementData) -> Result<String, RegistryError> {
        let spec = self.node(&element.node_type)?;
        if element.node_type == "heading" {
            let level = element
                .attribute("level")
                .and_then(|l| l.parse::<u8>().ok())
                .unwrap_or(1)
                .clamp(1, 6);
            return Ok(format!("h{level}"));
        }
        Ok(spec.tag.clone())
    }
}
