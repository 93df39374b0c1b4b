/*!
# The editing surface

[`Surface`] ties the model to the surface tree. Edits flow two ways:

- **Model-driven** ([`Surface::apply_model_change`]): a transaction is
  committed, affected branches are re-rendered and the native selection is
  moved to the model selection.
- **Observed** ([`Surface::change_model`]): the platform already changed the
  tree; the observer's diff becomes a transaction, committed under the render
  lock so nothing is re-rendered under the user's caret.

Key handlers decide per key whether the model handles it or the platform
does. Work that has to wait for the platform default (polling, marker
checks, editing sequences) is queued and run by [`Surface::flush`].
*/

pub mod clipboard;
pub mod config;
mod deactivation;
mod handlers;
pub mod sequence;

use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::error::{InvariantViolation, PositionError, SurfaceError, SurfaceResult};
use crate::host::dom::{Dom, DomId, DomPosition, NativeSelection};
use crate::host::native::NativePlatform;
use crate::model::annotation::AnnotationSet;
use crate::model::document::{ModelDocument, NodeId};
use crate::model::selection::{Range, Selection};
use crate::model::surface::{ModelChange, ModelSurface, insertion_annotations_at};
use crate::model::transaction::{Transaction, text_items};
use crate::observer::{ContentEdit, ContentSnapshot, ObserverEvent, SurfaceObserver, classify};
use crate::view::markers::MarkerState;
use crate::view::node::{ViewId, ViewTree};
use crate::view::offset::{ViewContext, offset_at, position_at};
use crate::view::render::RenderContext;

use clipboard::Clipboard;
pub use clipboard::ClipboardPayload;
pub use config::{SequenceSpec, SurfaceConfig};
use sequence::{Sequence, compile_all, text_with_objects};

/// Things the host application may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceNotification {
    DocumentChanged,
    SelectionChanged(Selection),
    BranchNodeChanged {
        old: Option<ViewId>,
        new: Option<ViewId>,
    },
    SlugEnter,
    SlugLeave,
    InsertionAnnotationsChanged(AnnotationSet),
    FocusedNodeChanged(Option<ViewId>),
    SequenceMatched {
        name: String,
        range: Range,
    },
}

/// Work deferred until the platform has applied its default behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// Timer tick; selection only while composing
    Poll,
    PollContent,
    /// With `fixup`, a caret that crossed a boundary marker is moved on
    PollSelection { fixup: bool },
    ReleaseMarkers(ViewId),
    CheckSequences,
}

/// One editing surface: model, surface tree, observer and markers.
pub struct Surface {
    model: ModelSurface,
    dom: Dom,
    views: ViewTree,
    markers: MarkerState,
    observer: SurfaceObserver,
    platform: NativePlatform,
    sequences: Vec<Sequence>,
    render_lock: usize,
    /// Selection an observed change is committing; set while `change_model` runs
    new_model_selection: Option<Selection>,
    dispatch: VecDeque<Dispatch>,
    notifications: VecDeque<SurfaceNotification>,
    focused_node: Option<ViewId>,
    deactivated: bool,
    /// Host focus went elsewhere while deactivated
    focus_left: bool,
    highlight: Option<DomId>,
    in_ime: bool,
    clipboard: Clipboard,
}

impl Surface {
    pub fn new(document: ModelDocument, config: &SurfaceConfig) -> SurfaceResult<Self> {
        let sequences = compile_all(&config.sequences)?;
        let mut surface = Self {
            model: ModelSurface::new(document),
            dom: Dom::new(),
            views: ViewTree::with_chars(config.slug_filler, config.leaf_placeholder),
            markers: MarkerState::new(),
            observer: SurfaceObserver::new(config.poll_interval_ms),
            platform: NativePlatform::new(),
            sequences,
            render_lock: 0,
            new_model_selection: None,
            dispatch: VecDeque::new(),
            notifications: VecDeque::new(),
            focused_node: None,
            deactivated: false,
            focus_left: false,
            highlight: None,
            in_ime: false,
            clipboard: Clipboard::default(),
        };
        surface.renderer().build_root()?;
        debug!(
            "surface ready: document length {}, {} sequences",
            surface.model.document().len(),
            surface.sequences.len()
        );
        Ok(surface)
    }

    pub fn model(&self) -> &ModelSurface {
        &self.model
    }

    pub fn document(&self) -> &ModelDocument {
        self.model.document()
    }

    pub fn selection(&self) -> Selection {
        self.model.selection()
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// Direct access for hosts that edit the tree themselves
    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn views(&self) -> &ViewTree {
        &self.views
    }

    pub fn markers(&self) -> &MarkerState {
        &self.markers
    }

    pub fn observer(&self) -> &SurfaceObserver {
        &self.observer
    }

    pub fn focused_node(&self) -> Option<ViewId> {
        self.focused_node
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated
    }

    pub fn root_element(&self) -> Option<DomId> {
        self.views.element(self.views.root())
    }

    /// Serialized surface root
    pub fn html(&self) -> String {
        self.root_element()
            .map(|root| self.dom.serialize(root))
            .unwrap_or_default()
    }

    pub fn ctx(&self) -> ViewContext<'_> {
        ViewContext::new(&self.dom, &self.views, self.model.document(), &self.markers)
    }

    pub fn get_offset_at(&self, position: DomPosition) -> Result<usize, PositionError> {
        offset_at(&self.ctx(), position)
    }

    pub fn get_position_at(&self, offset: usize) -> Result<DomPosition, PositionError> {
        position_at(&self.ctx(), offset)
    }

    /// Drain pending notifications, oldest first
    pub fn take_notifications(&mut self) -> Vec<SurfaceNotification> {
        self.notifications.drain(..).collect()
    }

    fn notify(&mut self, notification: SurfaceNotification) {
        trace!("notify {notification:?}");
        self.notifications.push_back(notification);
    }

    fn renderer(&mut self) -> RenderContext<'_> {
        RenderContext {
            focused: self.dom.has_focus() && !self.deactivated,
            render_locked: self.render_lock > 0,
            dom: &mut self.dom,
            views: &mut self.views,
            model: &self.model,
            markers: &mut self.markers,
        }
    }

    pub fn increment_render_lock(&mut self) {
        self.render_lock += 1;
    }

    pub fn decrement_render_lock(&mut self) -> Result<(), InvariantViolation> {
        self.render_lock = self
            .render_lock
            .checked_sub(1)
            .ok_or(InvariantViolation::UnbalancedRenderLock)?;
        Ok(())
    }

    pub fn is_render_locked(&self) -> bool {
        self.render_lock > 0
    }

    /// Commit a change the surface tree already shows, e.g. observed typing.
    ///
    /// Runs under the render lock: events update views but content branches
    /// are not re-rendered and the native selection is left alone.
    pub fn change_model(
        &mut self,
        tx: Option<&Transaction>,
        selection: Option<Selection>,
    ) -> SurfaceResult<()> {
        if self.new_model_selection.is_some() {
            return Err(InvariantViolation::NestedSelectionChange.into());
        }
        self.new_model_selection = Some(selection.unwrap_or_else(|| self.model.selection()));
        self.increment_render_lock();
        let result = self
            .model
            .change(tx, selection)
            .map_err(SurfaceError::from)
            .and_then(|change| self.after_model_change(change));
        let unlocked = self.decrement_render_lock();
        self.new_model_selection = None;
        result?;
        unlocked?;
        Ok(())
    }

    /// Commit a model-driven change and reflect it in the surface tree
    pub fn apply_model_change(
        &mut self,
        tx: Option<&Transaction>,
        selection: Option<Selection>,
    ) -> SurfaceResult<()> {
        let change = self.model.change(tx, selection)?;
        self.after_model_change(change)
    }

    fn after_model_change(&mut self, change: ModelChange) -> SurfaceResult<()> {
        let mut rerendered = false;
        for event in &change.events {
            rerendered |= self.renderer().apply_event(event)?;
        }
        if !change.events.is_empty() {
            self.notify(SurfaceNotification::DocumentChanged);
        }
        if change.selection_changed || rerendered {
            self.on_model_select(change.selection_changed)?;
        }
        if change.insertion_annotations_changed {
            self.on_insertion_annotations_change()?;
        }
        Ok(())
    }

    fn on_model_select(&mut self, selection_changed: bool) -> SurfaceResult<()> {
        let selection = self.model.selection();
        // A caret the model placed may need markers to show its annotations
        if self.render_lock == 0
            && let Some(view) = self.caret_branch_view()
        {
            self.renderer().render(view)?;
        }
        if self.render_lock == 0 && self.new_model_selection != Some(selection) {
            self.show_selection(selection)?;
        }
        self.check_markers(false)?;
        self.update_focused_node();
        if selection_changed {
            self.notify(SurfaceNotification::SelectionChanged(selection));
        }
        Ok(())
    }

    /// The caret's insertion annotations changed: the caret's branch may
    /// need the markers (or no longer need them)
    fn on_insertion_annotations_change(&mut self) -> SurfaceResult<()> {
        self.render_caret_branch()?;
        let annotations = self.model.insertion_annotations();
        self.notify(SurfaceNotification::InsertionAnnotationsChanged(annotations));
        Ok(())
    }

    /// Render the caret's branch, with markers if its annotations need them.
    /// A no-op while render-locked.
    fn render_caret_branch(&mut self) -> SurfaceResult<()> {
        if let Some(view) = self.caret_branch_view()
            && self.renderer().render(view)?
        {
            self.show_selection(self.model.selection())?;
        }
        Ok(())
    }

    fn caret_branch_view(&self) -> Option<ViewId> {
        let caret = self.model.selection().range().filter(Range::is_collapsed)?;
        let node = self.model.document().content_branch_at(caret.from)?;
        self.views.for_model(node)
    }

    /// Put the native selection where the model selection is
    pub fn show_selection(&mut self, selection: Selection) -> SurfaceResult<()> {
        if self.deactivated {
            self.render_highlight();
            return Ok(());
        }
        let native = match selection.range() {
            Some(range) => {
                let ctx = self.ctx();
                let anchor = position_at(&ctx, range.from)?;
                let focus = if range.is_collapsed() {
                    anchor
                } else {
                    position_at(&ctx, range.to)?
                };
                Some(NativeSelection::new(anchor, focus))
            }
            None => None,
        };
        trace!("showing {selection:?} as {native:?}");
        self.dom.set_selection(native);
        self.poll_silently();
        Ok(())
    }

    fn poll_silently(&mut self) {
        let ctx = ViewContext::new(&self.dom, &self.views, self.model.document(), &self.markers);
        self.observer.poll_once_no_callback(&ctx);
    }

    fn poll_events(&mut self, selection_only: bool) -> Vec<ObserverEvent> {
        let ctx = ViewContext::new(&self.dom, &self.views, self.model.document(), &self.markers);
        if selection_only {
            self.observer.poll_once_selection(&ctx)
        } else {
            self.observer.poll_once(&ctx)
        }
    }

    fn update_focused_node(&mut self) {
        let document = self.model.document();
        let focused = self.model.selection().range().and_then(|range| {
            self.views
                .iter()
                .find(|(_, view)| {
                    view.is_focusable()
                        && document.node(view.model).is_some()
                        && document.outer_range(view.model).equals_selection(&range)
                })
                .map(|(id, _)| id)
        });
        if focused == self.focused_node {
            return;
        }
        for (view, on) in [(self.focused_node, false), (focused, true)] {
            let Some(node) = view.and_then(|v| self.views.get_mut(v)) else {
                continue;
            };
            if let Some(state) = node.focusable.as_mut() {
                state.focused = on;
            }
            let element = node.element;
            if on {
                self.dom.set_attribute(element, "class", "focused");
            } else {
                self.dom.remove_attribute(element, "class");
            }
        }
        self.focused_node = focused;
        self.notify(SurfaceNotification::FocusedNodeChanged(focused));
    }

    /// Drop the boundary markers unless the native caret is still between
    /// them. With `fixup`, a caret that crossed a marker without moving in
    /// the model is moved one offset in the direction it went.
    fn check_markers(&mut self, fixup: bool) -> SurfaceResult<()> {
        if self.render_lock > 0 {
            return Ok(());
        }
        let Some(holder) = self.markers.holder().cloned() else {
            return Ok(());
        };
        let attached = self
            .root_element()
            .is_some_and(|root| self.dom.contains(root, holder.pre));
        if !attached {
            self.markers.release(holder.branch);
            return Ok(());
        }
        let Some(native) = self.dom.selection() else {
            return Ok(());
        };
        let (Some(between), Some(before_pre), Some(after_post)) = (
            self.dom.position_after(holder.pre),
            self.dom.position_before(holder.pre),
            self.dom.position_after(holder.post),
        ) else {
            return Ok(());
        };
        if native.is_collapsed() && native.focus == between {
            return Ok(());
        }

        let mut step = None;
        if fixup && self.get_offset_at(native.focus).ok() == self.get_offset_at(between).ok() {
            if self.dom.compare_positions(native.focus, after_post).is_ge() {
                step = Some(true);
            } else if self.dom.compare_positions(native.focus, before_pre).is_le() {
                step = Some(false);
            } else {
                return Err(InvariantViolation::UnexpectedMarkerState.into());
            }
        }
        if let Some(forward) = step
            && let Some(range) = self.model.selection().range()
        {
            let caret = if forward {
                (range.from + 1).min(self.model.document().len())
            } else {
                range.from.saturating_sub(1)
            };
            debug!("caret crossed a marker: {} -> {caret}", range.from);
            self.change_model(None, Some(Selection::collapsed(caret)))?;
        }
        self.renderer().render_without_markers(holder.branch)?;
        self.show_selection(self.model.selection())
    }

    /// Ask for a poll after the platform default has run
    fn defer(&mut self, item: Dispatch) {
        self.dispatch.push_back(item);
    }

    /// Run deferred work, in order
    pub fn flush(&mut self) -> SurfaceResult<()> {
        while let Some(item) = self.dispatch.pop_front() {
            trace!("dispatch {item:?}");
            match item {
                Dispatch::Poll => {
                    let events = self.poll_events(self.in_ime);
                    self.handle_observer_events(events)?;
                }
                Dispatch::PollContent => {
                    let events = self.poll_events(false);
                    self.handle_observer_events(events)?;
                }
                Dispatch::PollSelection { fixup } => {
                    let events = self.poll_events(true);
                    self.handle_observer_events(events)?;
                    self.check_markers(fixup)?;
                }
                Dispatch::ReleaseMarkers(view) => {
                    if self.markers.take_pending_release(view)
                        && self.renderer().render_without_markers(view)?
                    {
                        self.show_selection(self.model.selection())?;
                    }
                }
                Dispatch::CheckSequences => self.check_sequences()?,
            }
        }
        Ok(())
    }

    /// Let time pass for the poll timer
    pub fn advance_timer(&mut self, ms: u64) -> SurfaceResult<()> {
        if self.observer.timer_mut().advance(ms) > 0 {
            self.defer(Dispatch::Poll);
        }
        self.flush()
    }

    fn handle_observer_events(&mut self, events: Vec<ObserverEvent>) -> SurfaceResult<()> {
        let mut resynced = false;
        for event in events {
            match event {
                ObserverEvent::ContentChange {
                    node,
                    previous,
                    next,
                } => resynced |= self.handle_content_change(node, &previous, &next)?,
                ObserverEvent::BranchNodeChange { old, new } => {
                    if let Some(old) = old
                        && Some(old) != new
                        && self.markers.queue_release(old)
                    {
                        self.defer(Dispatch::ReleaseMarkers(old));
                    }
                    self.notify(SurfaceNotification::BranchNodeChanged { old, new });
                }
                ObserverEvent::RangeChange { new, .. } => {
                    // A re-render already put the caret back where the model has it
                    if resynced || self.in_ime {
                        continue;
                    }
                    if let Some(range) = new {
                        let before = self.model.insertion_annotations();
                        self.change_model(None, Some(Selection::Linear(range)))?;
                        // The render lock kept the markers out; place them now
                        if self.model.insertion_annotations() != before {
                            self.render_caret_branch()?;
                        }
                    }
                }
                ObserverEvent::SlugEnter => self.notify(SurfaceNotification::SlugEnter),
                ObserverEvent::SlugLeave => self.notify(SurfaceNotification::SlugLeave),
            }
        }
        Ok(())
    }

    /// Turn observed text changes into a transaction. Returns whether the
    /// branch had to be re-rendered from the model.
    fn handle_content_change(
        &mut self,
        view: ViewId,
        previous: &ContentSnapshot,
        next: &ContentSnapshot,
    ) -> SurfaceResult<bool> {
        if self.render_lock > 0 {
            trace!("content change in view {view} ignored: render lock held");
            return Ok(false);
        }
        let Some(node) = self.views.get(view).map(|v| v.model) else {
            return Ok(false);
        };
        let document = self.model.document();
        if document.node(node).is_none() {
            return Ok(false);
        }
        let (start, _) = document.inner_range(node);
        let local = |range: Option<Range>| {
            range
                .filter(Range::is_collapsed)
                .and_then(|r| r.from.checked_sub(start))
        };
        let edit = classify(
            &previous.text,
            &next.text,
            local(previous.range),
            local(next.range),
        );
        debug!("content change in view {view}: {edit:?}");

        let Some(tx) = self.content_transaction(view, node, start, &previous.text, edit) else {
            self.resync(view)?;
            return Ok(true);
        };
        self.change_model(Some(&tx), next.range.map(Selection::Linear))?;
        self.defer(Dispatch::CheckSequences);
        let drifted = previous.hash != next.hash;
        if drifted || !self.renderer().matches_model(view)? {
            debug!("view {view} no longer shows the model (drifted: {drifted}), re-rendering");
            self.resync(view)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn content_transaction(
        &self,
        view: ViewId,
        node: NodeId,
        start: usize,
        previous: &str,
        edit: ContentEdit,
    ) -> Option<Transaction> {
        let document = self.model.document();
        let placeholder = self.views.leaf_placeholder;
        let held = self
            .markers
            .holder()
            .filter(|holder| holder.branch == view)
            .map(|holder| holder.annotations.clone());

        match edit {
            ContentEdit::Unchanged => None,
            ContentEdit::Insert { at, text } => {
                if text.contains(placeholder) {
                    warn!("insertion of a leaf placeholder rejected");
                    return None;
                }
                let annotations = held.unwrap_or_else(|| self.annotations_for(start + at));
                Some(Transaction::insert_text(start + at, &text, &annotations))
            }
            ContentEdit::Remove { start: from, end: to } => {
                let text: Vec<char> = previous.chars().collect();
                let spans = leaf_spans(document, node, start);
                let Some((from, to)) = align_removal(&spans, &text, from, to) else {
                    warn!("removal {from}..{to} cuts through an inline leaf");
                    return None;
                };
                Some(Transaction::removal(Range::new(start + from, start + to)))
            }
            ContentEdit::Replace {
                start: from,
                end: to,
                text,
            } => {
                let spans = leaf_spans(document, node, start);
                if text.contains(placeholder) || cuts_leaf(&spans, from, to) {
                    warn!("replacement {from}..{to} with {text:?} cannot be expressed");
                    return None;
                }
                let range = Range::new(start + from, start + to);
                let annotations = held
                    .or_else(|| {
                        (from < to)
                            .then(|| document.data().annotations_at(range.start()).cloned())
                            .flatten()
                    })
                    .unwrap_or_else(|| self.annotations_for(range.start()));
                Some(Transaction::replacement(range, text_items(&text, &annotations)))
            }
        }
    }

    /// Insertion annotations for text at `offset`, honouring a pending
    /// toggle when the caret is there
    fn annotations_for(&self, offset: usize) -> AnnotationSet {
        match self.model.selection().range() {
            Some(range) if range.is_collapsed() && range.from == offset => {
                self.model.insertion_annotations()
            }
            _ => insertion_annotations_at(self.model.document(), offset),
        }
    }

    /// Render a branch from the model over whatever the platform left there
    fn resync(&mut self, view: ViewId) -> SurfaceResult<()> {
        if self.renderer().rerender(view)? {
            debug!("view {view} re-rendered from the model");
        }
        self.show_selection(self.model.selection())
    }

    fn check_sequences(&mut self) -> SurfaceResult<()> {
        if self.sequences.is_empty() {
            return Ok(());
        }
        let Some(caret) = self.model.selection().range().filter(Range::is_collapsed) else {
            return Ok(());
        };
        let document = self.model.document();
        let Some(branch) = document.content_branch_at(caret.from) else {
            return Ok(());
        };
        let (start, _) = document.inner_range(branch);
        let text = text_with_objects(document, start, caret.from);
        let Some(found) = self.sequences.iter().find_map(|s| s.find(&text)) else {
            return Ok(());
        };
        let matched = Range::new(start + found.start, start + found.end);
        let annotations = document
            .data()
            .annotations_at(matched.start())
            .cloned()
            .unwrap_or_default();

        debug!("sequence {} matched {matched:?}", found.name);
        self.notify(SurfaceNotification::SequenceMatched {
            name: found.name,
            range: matched,
        });
        if let Some(replacement) = found.replacement {
            let tx = Transaction::replacement(matched, text_items(&replacement, &annotations));
            let caret = matched.start() + replacement.chars().count();
            self.apply_model_change(Some(&tx), Some(Selection::collapsed(caret)))?;
        }
        Ok(())
    }
}

/// Inline leaf spans of a content branch, relative to its inner start
fn leaf_spans(document: &ModelDocument, branch: NodeId, start: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = start;
    for &child in document.children(branch) {
        let length = document.outer_length(child);
        if document.spec(child).is_ok_and(|spec| spec.leaf) {
            spans.push((offset - start, offset - start + length));
        }
        offset += length;
    }
    spans
}

fn cuts_leaf(spans: &[(usize, usize)], from: usize, to: usize) -> bool {
    spans
        .iter()
        .any(|&(start, end)| (start < from && from < end) || (start < to && to < end))
}

/// Slide a removal within a run of identical chars until it no longer cuts
/// through a leaf
fn align_removal(
    spans: &[(usize, usize)],
    text: &[char],
    from: usize,
    to: usize,
) -> Option<(usize, usize)> {
    if to > text.len() || from > to {
        return None;
    }
    if !cuts_leaf(spans, from, to) {
        return Some((from, to));
    }
    let (mut f, mut t) = (from, to);
    while f > 0 && text[f - 1] == text[t - 1] {
        f -= 1;
        t -= 1;
        if !cuts_leaf(spans, f, t) {
            return Some((f, t));
        }
    }
    let (mut f, mut t) = (from, to);
    while t < text.len() && text[f] == text[t] {
        f += 1;
        t += 1;
        if !cuts_leaf(spans, f, t) {
            return Some((f, t));
        }
    }
    None
}
