//! Building the surface tree from the model, and re-rendering content
//! branches.
//!
//! A content branch is rendered from its annotated fragments: text units and
//! inline leaves, each tagged with its annotation set. Annotation wrappers are
//! opened and closed lazily while walking the fragments, so each wrapper
//! covers its longest contiguous run. The result is compared against the
//! attached children (normalized) and only swapped in when it differs.
//!
//! When the collapsed model caret sits in the branch, a zero-width caret
//! fragment carrying the insertion annotations is spliced in. If expressing
//! those annotations needs a wrapper to be opened or closed, the boundary
//! marker pair is materialized there and the branch claims the markers.

use log::{debug, trace};

use crate::error::{SurfaceError, SurfaceResult};
use crate::host::dom::{Dom, DomId, MarkerSide, Role};
use crate::model::annotation::{Annotation, AnnotationSet};
use crate::model::document::{ModelEvent, NodeId};
use crate::model::linear::LinearItem;
use crate::model::surface::ModelSurface;
use crate::view::markers::{MarkerHolder, MarkerState};
use crate::view::node::{ViewId, ViewNode, ViewTree};

/// Rendered content of a branch, comparable with what is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedNode {
    Text(String),
    Annotation {
        annotation: Annotation,
        children: Vec<RenderedNode>,
    },
    /// An inline leaf's existing element
    Leaf(ViewId),
    Marker(MarkerSide),
    /// Something the host put there (e.g. a browser wrapper)
    Plain {
        tag: String,
        children: Vec<RenderedNode>,
    },
}

#[derive(Debug, Clone)]
enum Fragment {
    Char(char, AnnotationSet),
    Leaf(ViewId, AnnotationSet),
    /// Boundary marker candidate at the caret
    Caret(AnnotationSet),
}

/// Stack of open annotation wrappers while assembling a branch.
#[derive(Debug, Default)]
struct FragmentBuilder {
    root: Vec<RenderedNode>,
    stack: Vec<(Annotation, Vec<RenderedNode>)>,
}

impl FragmentBuilder {
    fn target(&mut self) -> &mut Vec<RenderedNode> {
        match self.stack.last_mut() {
            Some((_, children)) => children,
            None => &mut self.root,
        }
    }

    fn push_char(&mut self, ch: char) {
        let target = self.target();
        match target.last_mut() {
            Some(RenderedNode::Text(text)) => text.push(ch),
            _ => target.push(RenderedNode::Text(ch.to_string())),
        }
    }

    fn push(&mut self, node: RenderedNode) {
        self.target().push(node);
    }

    fn close_top(&mut self) {
        if let Some((annotation, children)) = self.stack.pop()
            && !children.is_empty()
        {
            self.push(RenderedNode::Annotation {
                annotation,
                children,
            });
        }
    }

    /// Close wrappers from the first one not in `set` upward, then open the
    /// missing ones. Returns whether anything was opened or closed.
    fn open_and_close(&mut self, set: &AnnotationSet) -> bool {
        let mut changed = false;
        if let Some(first) = self.stack.iter().position(|(a, _)| !set.contains(a)) {
            while self.stack.len() > first {
                self.close_top();
                changed = true;
            }
        }
        for annotation in set {
            if !self.stack.iter().any(|(open, _)| open == annotation) {
                self.stack.push((annotation.clone(), Vec::new()));
                changed = true;
            }
        }
        changed
    }

    fn finish(mut self) -> Vec<RenderedNode> {
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.root
    }
}

/// Assemble fragments into rendered nodes. Returns the caret's annotations if
/// the marker pair was materialized.
fn assemble(fragments: Vec<Fragment>) -> (Vec<RenderedNode>, Option<AnnotationSet>) {
    let mut builder = FragmentBuilder::default();
    let mut markers = None;
    for fragment in fragments {
        match fragment {
            Fragment::Char(ch, annotations) => {
                builder.open_and_close(&annotations);
                builder.push_char(ch);
            }
            Fragment::Leaf(view, annotations) => {
                builder.open_and_close(&annotations);
                builder.push(RenderedNode::Leaf(view));
            }
            Fragment::Caret(annotations) => {
                if builder.open_and_close(&annotations) {
                    builder.push(RenderedNode::Marker(MarkerSide::Pre));
                    builder.push(RenderedNode::Marker(MarkerSide::Post));
                    markers = Some(annotations);
                }
            }
        }
    }
    (builder.finish(), markers)
}

/// Normalized view of what is attached under `element`: adjacent text
/// coalesced, empty text and slots dropped.
pub fn snapshot_children(dom: &Dom, element: DomId) -> Vec<RenderedNode> {
    let mut out: Vec<RenderedNode> = Vec::new();
    for &child in dom.children(element) {
        if dom.is_text(child) {
            let text = dom.text(child);
            if text.is_empty() {
                continue;
            }
            match out.last_mut() {
                Some(RenderedNode::Text(previous)) => previous.push_str(text),
                _ => out.push(RenderedNode::Text(text.to_string())),
            }
            continue;
        }
        let node = match dom.role(child) {
            Some(Role::Slug) | None => continue,
            Some(Role::View(view)) => RenderedNode::Leaf(*view),
            Some(Role::Marker(side)) => RenderedNode::Marker(*side),
            Some(Role::Annotation(annotation)) => RenderedNode::Annotation {
                annotation: annotation.clone(),
                children: snapshot_children(dom, child),
            },
            Some(_) => RenderedNode::Plain {
                tag: dom.tag(child).to_string(),
                children: snapshot_children(dom, child),
            },
        };
        out.push(node);
    }
    out
}

/// `nodes` with boundary markers taken out and the text around them joined
fn without_markers(nodes: &[RenderedNode]) -> Vec<RenderedNode> {
    let mut out: Vec<RenderedNode> = Vec::new();
    for node in nodes {
        let node = match node {
            RenderedNode::Marker(_) => continue,
            RenderedNode::Annotation {
                annotation,
                children,
            } => RenderedNode::Annotation {
                annotation: annotation.clone(),
                children: without_markers(children),
            },
            RenderedNode::Plain { tag, children } => RenderedNode::Plain {
                tag: tag.clone(),
                children: without_markers(children),
            },
            other => other.clone(),
        };
        if let (RenderedNode::Text(text), Some(RenderedNode::Text(previous))) =
            (&node, out.last_mut())
        {
            previous.push_str(text);
            continue;
        }
        out.push(node);
    }
    out
}

/// Mutable access to the surface tree, views and markers, with read access
/// to the model, for building and rendering.
pub struct RenderContext<'a> {
    pub dom: &'a mut Dom,
    pub views: &'a mut ViewTree,
    pub model: &'a ModelSurface,
    pub markers: &'a mut MarkerState,
    /// Host focus is on the surface; markers are only placed while focused
    pub focused: bool,
    pub render_locked: bool,
}

impl<'a> RenderContext<'a> {
    /// Build views for the whole document and attach the root to the body
    pub fn build_root(&mut self) -> SurfaceResult<ViewId> {
        let model: &'a ModelSurface = self.model;
        let view = self.build(model.document().root())?;
        self.views.set_root(view);
        let element = self.element(view)?;
        self.dom.set_attribute(element, "class", "surface-document");
        self.dom.set_attribute(element, "contenteditable", "true");
        let body = self.dom.body();
        self.dom.append_child(body, element);
        debug!("built surface with {} views", self.views.iter().count());
        Ok(view)
    }

    /// Build the view (and subtree) for a model node. The element is left
    /// detached; content branches get their initial render.
    pub fn build(&mut self, node: NodeId) -> SurfaceResult<ViewId> {
        let model: &'a ModelSurface = self.model;
        let document = model.document();
        let spec = document.spec(node)?;
        let tag = match document.element(node) {
            Some(element) => document.registry().tag_for(element)?,
            None => spec.tag.clone(),
        };

        let id = self.views.next_id();
        let element = self.dom.create_element(&tag, Role::View(id));
        self.views.insert(ViewNode::new(node, element, spec));

        if spec.leaf {
            self.decorate_leaf(element, node);
            return Ok(id);
        }

        let mut children = Vec::new();
        for &child in document.children(node) {
            if spec.content && !document.spec(child)?.leaf {
                continue;
            }
            let child_view = self.build(child)?;
            if let Some(view) = self.views.get_mut(child_view) {
                view.parent = Some(id);
            }
            if !spec.content {
                let child_element = self.element(child_view)?;
                self.dom.append_child(element, child_element);
            }
            children.push(child_view);
        }
        if let Some(view) = self.views.get_mut(id) {
            view.children = children;
        }

        if spec.content {
            self.render_branch(id, true, true)?;
        } else {
            self.update_block_slugs(id)?;
        }
        Ok(id)
    }

    fn decorate_leaf(&mut self, element: DomId, node: NodeId) {
        let model: &'a ModelSurface = self.model;
        let document = model.document();
        self.dom.set_attribute(element, "contenteditable", "false");
        let Some(data) = document.element(node) else {
            return;
        };
        let src = data.attribute("src").unwrap_or_default();
        let alt = data.attribute("alt");
        if self.dom.tag(element) == "img" {
            self.dom.set_attribute(element, "src", src);
            if let Some(alt) = alt {
                self.dom.set_attribute(element, "alt", alt);
            }
            return;
        }
        let image = self.dom.create_element("img", Role::Plain);
        self.dom.set_attribute(image, "src", src);
        self.dom.append_child(element, image);
        if let Some(alt) = alt {
            let caption = self.dom.create_element("figcaption", Role::Plain);
            let text = self.dom.create_text(alt);
            self.dom.append_child(caption, text);
            self.dom.append_child(element, caption);
        }
    }

    /// Tear down a view and its subtree
    pub fn destroy(&mut self, view: ViewId) {
        let Some(node) = self.views.remove(view) else {
            return;
        };
        for child in node.children {
            self.destroy(child);
        }
        if let Some(branch) = node.branch {
            for (_, slug) in branch.block_slugs {
                self.dom.detach(slug);
            }
        }
        self.dom.detach(node.element);
        self.markers.release(view);
        trace!("destroyed view {view}");
    }

    /// Reflect one model event in the surface tree
    pub fn apply_event(&mut self, event: &ModelEvent) -> SurfaceResult<bool> {
        let model: &'a ModelSurface = self.model;
        let document = model.document();
        match event {
            ModelEvent::Update(node) => {
                if document.node(*node).is_none() {
                    return Ok(false);
                }
                let view = self
                    .views
                    .for_model(*node)
                    .ok_or(SurfaceError::MissingView(*node))?;
                self.render(view)
            }
            ModelEvent::Splice {
                parent, removed, ..
            } => {
                // Superseded by a later operation of the same transaction
                if document.node(*parent).is_none() {
                    return Ok(false);
                }
                let view = self
                    .views
                    .for_model(*parent)
                    .ok_or(SurfaceError::MissingView(*parent))?;
                for &node in removed {
                    if let Some(removed_view) = self.views.for_model(node) {
                        self.destroy(removed_view);
                    }
                }

                let content = self.views.get(view).is_some_and(ViewNode::is_content_branch);
                let mut children = Vec::new();
                for &child in document.children(*parent) {
                    if content && !document.spec(child)?.leaf {
                        continue;
                    }
                    let child_view = match self.views.for_model(child) {
                        Some(existing) => existing,
                        None => self.build(child)?,
                    };
                    if let Some(node) = self.views.get_mut(child_view) {
                        node.parent = Some(view);
                    }
                    children.push(child_view);
                }
                if let Some(node) = self.views.get_mut(view) {
                    node.children = children.clone();
                }

                if content {
                    return self.render(view);
                }
                let element = self.element(view)?;
                let elements = children
                    .iter()
                    .map(|&c| self.element(c))
                    .collect::<SurfaceResult<Vec<_>>>()?;
                self.dom.replace_children(element, elements);
                self.update_block_slugs(view)?;
                Ok(true)
            }
        }
    }

    /// Re-render a content branch. A no-op while render-locked.
    pub fn render(&mut self, view: ViewId) -> SurfaceResult<bool> {
        self.render_branch(view, false, true)
    }

    /// Re-render even while render-locked, discarding whatever the platform
    /// did to the branch
    pub fn rerender(&mut self, view: ViewId) -> SurfaceResult<bool> {
        self.render_branch(view, true, true)
    }

    /// Whether the attached rendering shows what the model holds, markers
    /// aside. Native edits can put text in a wrapper the model disagrees with.
    pub fn matches_model(&self, view: ViewId) -> SurfaceResult<bool> {
        let Some(element) = self.views.element(view) else {
            return Ok(true);
        };
        let (expected, _) = assemble(self.fragments(view, false)?);
        let attached = without_markers(&snapshot_children(self.dom, element));
        Ok(without_markers(&expected) == attached)
    }

    /// Re-render without markers, e.g. when the caret has left the holder
    pub fn render_without_markers(&mut self, view: ViewId) -> SurfaceResult<bool> {
        self.render_branch(view, true, false)
    }

    fn render_branch(&mut self, view: ViewId, force: bool, allow_markers: bool) -> SurfaceResult<bool> {
        if self.render_locked && !force {
            trace!("render of view {view} skipped: render lock held");
            return Ok(false);
        }
        let Some(node) = self.views.get(view) else {
            return Ok(false);
        };
        if !node.is_content_branch() {
            return Ok(false);
        }
        let element = node.element;

        let fragments = self.fragments(view, allow_markers)?;
        let (rendered, marker_annotations) = assemble(fragments);
        if rendered == snapshot_children(self.dom, element) {
            // Slots are left out of the comparison; an empty branch still needs its filler
            if self.lacks_filler(view) {
                self.add_inline_slugs(view)?;
                return Ok(true);
            }
            trace!("render of view {view}: unchanged");
            return Ok(false);
        }

        debug!("rendering view {view}");
        self.dom.replace_children(element, Vec::new());
        let mut markers = Vec::new();
        self.materialize(&rendered, element, &mut markers)?;
        self.add_inline_slugs(view)?;

        match (markers.as_slice(), marker_annotations) {
            (&[pre, post], Some(annotations)) => self.claim(MarkerHolder {
                branch: view,
                annotations,
                pre,
                post,
            })?,
            _ => self.markers.release(view),
        }
        Ok(true)
    }

    fn lacks_filler(&self, view: ViewId) -> bool {
        let Some(node) = self.views.get(view) else {
            return false;
        };
        let (start, end) = self.model.document().inner_range(node.model);
        start == end && node.branch.as_ref().is_some_and(|b| b.inline_slugs.is_empty())
    }

    /// Take the markers, forcing the previous holder to drop its pair
    fn claim(&mut self, holder: MarkerHolder) -> SurfaceResult<()> {
        if let Some(previous) = self.markers.begin_claim(holder.branch)?
            && let Err(err) = self.render_branch(previous, true, false)
        {
            self.markers.abort_claim();
            return Err(err);
        }
        self.markers.finish_claim(holder);
        Ok(())
    }

    fn fragments(&self, view: ViewId, allow_markers: bool) -> SurfaceResult<Vec<Fragment>> {
        let model: &'a ModelSurface = self.model;
        let document = model.document();
        let data = document.data();
        let Some(node) = self.views.get(view) else {
            return Ok(Vec::new());
        };
        let (start, end) = document.inner_range(node.model);

        let caret = model
            .selection()
            .range()
            .filter(|range| allow_markers && self.focused && range.is_collapsed())
            .map(|range| range.from)
            .filter(|&caret| {
                (start..=end).contains(&caret)
                    && document.content_branch_at(caret) == Some(node.model)
            });
        let caret_fragment = || Fragment::Caret(model.insertion_annotations());

        let mut fragments = Vec::new();
        let mut offset = start;
        for &child in document.children(node.model) {
            let length = document.outer_length(child);
            if document.spec(child)?.leaf {
                if caret == Some(offset) {
                    fragments.push(caret_fragment());
                }
                let leaf = self
                    .views
                    .for_model(child)
                    .ok_or(SurfaceError::MissingView(child))?;
                let annotations = data.annotations_at(offset).cloned().unwrap_or_default();
                fragments.push(Fragment::Leaf(leaf, annotations));
            } else {
                for at in offset..offset + length {
                    if caret == Some(at) {
                        fragments.push(caret_fragment());
                    }
                    if let Some(LinearItem::Text { ch, annotations }) = data.get(at) {
                        fragments.push(Fragment::Char(*ch, annotations.clone()));
                    }
                }
            }
            offset += length;
        }
        if caret == Some(end) {
            fragments.push(caret_fragment());
        }
        Ok(fragments)
    }

    fn materialize(
        &mut self,
        nodes: &[RenderedNode],
        parent: DomId,
        markers: &mut Vec<DomId>,
    ) -> SurfaceResult<()> {
        let model: &'a ModelSurface = self.model;
        for node in nodes {
            let child = match node {
                RenderedNode::Text(text) => self.dom.create_text(text),
                RenderedNode::Leaf(view) => self.element(*view)?,
                RenderedNode::Marker(side) => {
                    let marker = self.dom.create_element("img", Role::Marker(*side));
                    let class = match side {
                        MarkerSide::Pre => "marker marker-pre",
                        MarkerSide::Post => "marker marker-post",
                    };
                    self.dom.set_attribute(marker, "class", class);
                    markers.push(marker);
                    marker
                }
                RenderedNode::Annotation {
                    annotation,
                    children,
                } => {
                    let tag = &model.document().registry().annotation(&annotation.name)?.tag;
                    let wrapper = self
                        .dom
                        .create_element(tag, Role::Annotation(annotation.clone()));
                    for (key, value) in &annotation.attributes {
                        self.dom.set_attribute(wrapper, key, value);
                    }
                    self.materialize(children, wrapper, markers)?;
                    wrapper
                }
                RenderedNode::Plain { tag, children } => {
                    let wrapper = self.dom.create_element(tag, Role::Plain);
                    self.materialize(children, wrapper, markers)?;
                    wrapper
                }
            };
            self.dom.append_child(parent, child);
        }
        Ok(())
    }

    fn create_slug(&mut self, tag: &str) -> DomId {
        let slug = self.dom.create_element(tag, Role::Slug);
        self.dom.set_attribute(slug, "class", "slug");
        let filler = self.dom.create_text(&self.views.slug_filler.to_string());
        self.dom.append_child(slug, filler);
        slug
    }

    /// Inline slots: the filler of an empty branch, and slots next to inline
    /// leaves that have no text beside them
    fn add_inline_slugs(&mut self, view: ViewId) -> SurfaceResult<()> {
        let model: &'a ModelSurface = self.model;
        let element = self.element(view)?;
        let node = self.views.get(view).map(|v| v.model).unwrap_or_default();
        let (start, end) = model.document().inner_range(node);
        let children = self.dom.children(element).to_vec();

        let mut slugs = Vec::new();
        let mut arranged = Vec::new();
        if start == end {
            slugs.push(self.create_slug("span"));
            arranged.push(slugs[0]);
        }
        for (index, &child) in children.iter().enumerate() {
            let leaf = self.dom.view_of(child).is_some();
            if leaf && index == 0 {
                let slug = self.create_slug("span");
                slugs.push(slug);
                arranged.push(slug);
            }
            arranged.push(child);
            if leaf && !children.get(index + 1).is_some_and(|&next| self.dom.is_text(next)) {
                let slug = self.create_slug("span");
                slugs.push(slug);
                arranged.push(slug);
            }
        }
        self.dom.replace_children(element, arranged);
        if let Some(branch) = self.views.get_mut(view).and_then(|v| v.branch.as_mut()) {
            branch.inline_slugs = slugs;
        }
        Ok(())
    }

    /// Rebuild the block slots of a structural branch
    fn update_block_slugs(&mut self, view: ViewId) -> SurfaceResult<()> {
        let model: &'a ModelSurface = self.model;
        let document = model.document();
        let Some(node) = self.views.get(view) else {
            return Ok(());
        };
        let Some(branch) = node.branch.as_ref() else {
            return Ok(());
        };
        let policy = branch.block_slug_policy;
        let element = node.element;
        let old = branch.block_slugs.clone();
        let children = node.children.clone();
        for (_, slug) in old {
            self.dom.detach(slug);
        }

        let mut slugs = Vec::new();
        if policy {
            let sluggable = children
                .iter()
                .map(|&c| {
                    let model_node = self.views.get(c).map(|v| v.model).unwrap_or_default();
                    Ok(document.spec(model_node)?.is_sluggable())
                })
                .collect::<SurfaceResult<Vec<bool>>>()?;
            let count = children.len();
            for index in 0..=count {
                let left = index == 0 || sluggable[index - 1];
                let right = index == count || sluggable[index];
                if !(left && right) {
                    continue;
                }
                let slug = self.create_slug("div");
                match children.get(index) {
                    Some(&child) => {
                        let child_element = self.element(child)?;
                        self.dom.insert_before(child_element, slug);
                    }
                    None => self.dom.append_child(element, slug),
                }
                slugs.push((index, slug));
            }
        }
        if let Some(branch) = self.views.get_mut(view).and_then(|v| v.branch.as_mut()) {
            branch.block_slugs = slugs;
        }
        Ok(())
    }

    fn element(&self, view: ViewId) -> SurfaceResult<DomId> {
        self.views.element(view).ok_or_else(|| {
            SurfaceError::MissingView(self.views.get(view).map_or(view, |v| v.model))
        })
    }
}
