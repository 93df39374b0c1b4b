//! Shared fixtures for unit tests.

use crate::host::dom::Dom;
use crate::model::annotation::Annotation;
use crate::model::document::ModelDocument;
use crate::model::linear::{DataBuilder, ElementData, LinearData};
use crate::model::registry::TypeRegistry;
use crate::model::surface::ModelSurface;
use crate::view::markers::MarkerState;
use crate::view::node::{DEFAULT_LEAF_PLACEHOLDER, ViewId, ViewTree};
use crate::view::offset::ViewContext;
use crate::view::render::RenderContext;

/// Filler used by fixtures so slots are visible in snapshots
pub const TEST_FILLER: char = '~';

/// `<p>ab<b>cd</b>[inline image]e</p>[image]<ul><li><p>x</p></li></ul>`
///
/// Offsets: p 0..9 (inline image at 5), image 9..11, list 11..18.
pub fn mixed_document() -> LinearData {
    DataBuilder::new()
        .open("paragraph")
        .text("ab")
        .begin(Annotation::new("bold"))
        .text("cd")
        .end("bold")
        .inline_leaf(ElementData::new("inlineImage").with_attribute("src", "inline.png"))
        .text("e")
        .close("paragraph")
        .leaf(ElementData::new("image").with_attribute("src", "block.png"))
        .open("list")
        .open("listItem")
        .paragraph("x")
        .close("listItem")
        .close("list")
        .build()
}

/// A rendered surface without the orchestrator around it.
pub struct Mounted {
    pub dom: Dom,
    pub views: ViewTree,
    pub model: ModelSurface,
    pub markers: MarkerState,
}

impl Mounted {
    pub fn new(data: LinearData) -> Self {
        let document = ModelDocument::new(data, TypeRegistry::standard()).expect("valid fixture");
        let mut mounted = Self {
            dom: Dom::new(),
            views: ViewTree::with_chars(TEST_FILLER, DEFAULT_LEAF_PLACEHOLDER),
            model: ModelSurface::new(document),
            markers: MarkerState::new(),
        };
        mounted.renderer(false).build_root().expect("build");
        mounted
    }

    pub fn renderer(&mut self, focused: bool) -> RenderContext<'_> {
        RenderContext {
            dom: &mut self.dom,
            views: &mut self.views,
            model: &self.model,
            markers: &mut self.markers,
            focused,
            render_locked: false,
        }
    }

    pub fn ctx(&self) -> ViewContext<'_> {
        ViewContext::new(&self.dom, &self.views, self.model.document(), &self.markers)
    }

    /// Serialized root element
    pub fn html(&self) -> String {
        let root = self.views.element(self.views.root()).expect("root element");
        self.dom.serialize(root)
    }

    /// View of the content branch containing `offset`
    pub fn view_for_offset(&self, offset: usize) -> ViewId {
        let document = self.model.document();
        let node = document.content_branch_at(offset).expect("content branch");
        self.views.for_model(node).expect("view")
    }
}
