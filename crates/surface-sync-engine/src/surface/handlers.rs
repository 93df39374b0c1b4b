use log::{debug, warn};

use crate::error::{SurfaceError, SurfaceResult};
use crate::host::dom::{DomPosition, NativeSelection};
use crate::host::event::{Key, KeyEvent, KeyOutcome};
use crate::model::annotation::Annotation;
use crate::model::document::{ModelDocument, NodeId};
use crate::model::linear::{ElementData, LinearItem};
use crate::model::selection::{Range, Selection};
use crate::model::transaction::Transaction;
use crate::surface::{Dispatch, Surface};
use crate::view::node::ViewNode;

/// The child of the deepest branch around `offset` that ends there
fn child_ending_at(document: &ModelDocument, offset: usize) -> Option<NodeId> {
    let branch = document.branch_at(offset, offset);
    document
        .children(branch)
        .iter()
        .copied()
        .find(|&child| document.outer_range(child).end() == offset)
}

fn child_starting_at(document: &ModelDocument, offset: usize) -> Option<NodeId> {
    let branch = document.branch_at(offset, offset);
    document
        .children(branch)
        .iter()
        .copied()
        .find(|&child| document.outer_range(child).start() == offset)
}

fn is_leaf(document: &ModelDocument, node: NodeId) -> bool {
    document.spec(node).is_ok_and(|spec| spec.leaf)
}

pub(crate) fn empty_paragraph() -> Vec<LinearItem> {
    vec![
        LinearItem::Open(ElementData::new("paragraph")),
        LinearItem::Close("paragraph".to_string()),
    ]
}

impl Surface {
    pub fn focus(&mut self) -> SurfaceResult<()> {
        self.dom.set_focus(true);
        if self.deactivated {
            return Ok(());
        }
        self.observer.timer_mut().start();
        self.poll_silently();
        Ok(())
    }

    /// Host focus left: pick up pending edits, stop polling, drop the markers
    pub fn blur(&mut self) -> SurfaceResult<()> {
        if self.deactivated {
            self.focus_left = true;
            self.dom.set_focus(false);
            return Ok(());
        }
        self.defer(Dispatch::Poll);
        self.flush()?;
        self.dom.set_focus(false);
        self.observer.timer_mut().stop();
        if let Some(holder) = self.markers.holder_branch() {
            self.renderer().render_without_markers(holder)?;
        }
        self.markers.clear();
        self.show_selection(self.model.selection())
    }

    /// Key press, before the platform applies its default
    pub fn on_key_down(&mut self, event: &KeyEvent) -> SurfaceResult<KeyOutcome> {
        if self.deactivated {
            return Ok(KeyOutcome::Handled);
        }
        match event.key {
            Key::Char(ch) if event.ctrl => self.handle_shortcut(ch),
            Key::Left | Key::Right | Key::Up | Key::Down => self.handle_arrow(event),
            Key::Enter => self.handle_enter(),
            Key::Backspace => self.handle_delete(false),
            Key::Delete => self.handle_delete(true),
            Key::Char(_) => self.handle_insertion(),
        }
    }

    /// Full key cycle: surface handler, platform default, deferred work
    pub fn press(&mut self, event: impl Into<KeyEvent>) -> SurfaceResult<KeyOutcome> {
        let event = event.into();
        let outcome = self.on_key_down(&event)?;
        if outcome == KeyOutcome::Native
            && let Some(root) = self.root_element()
        {
            self.platform.apply_key(&mut self.dom, root, &event);
        }
        self.flush()?;
        Ok(outcome)
    }

    pub fn type_text(&mut self, text: &str) -> SurfaceResult<()> {
        for ch in text.chars() {
            self.press(Key::Char(ch))?;
        }
        Ok(())
    }

    fn handle_shortcut(&mut self, ch: char) -> SurfaceResult<KeyOutcome> {
        let name = match ch.to_ascii_lowercase() {
            'b' => "bold",
            'i' => "italic",
            'u' => "underline",
            _ => return Ok(KeyOutcome::Native),
        };
        self.toggle_annotation(Annotation::new(name))?;
        Ok(KeyOutcome::Handled)
    }

    /// Annotate the selection, or for a caret, what gets typed next
    pub fn toggle_annotation(&mut self, annotation: Annotation) -> SurfaceResult<()> {
        let Some(range) = self.model.selection().range() else {
            return Ok(());
        };
        if range.is_collapsed() {
            if self.model.toggle_insertion_annotation(annotation) {
                self.on_insertion_annotations_change()?;
            }
            return Ok(());
        }
        let covered = self
            .model
            .document()
            .data()
            .is_covered_by(range.start(), range.end(), &annotation);
        let tx = Transaction::annotation(range, annotation, !covered);
        self.apply_model_change(Some(&tx), None)
    }

    fn handle_arrow(&mut self, event: &KeyEvent) -> SurfaceResult<KeyOutcome> {
        let horizontal = matches!(event.key, Key::Left | Key::Right);
        let range = self.model.selection().range();
        if !event.shift
            && let Some(range) = range
        {
            if self.focused_node.is_some() {
                let caret = match event.key {
                    Key::Left | Key::Up => range.start(),
                    _ => range.end(),
                };
                self.apply_model_change(None, Some(Selection::collapsed(caret)))?;
                return Ok(KeyOutcome::Handled);
            }
            if horizontal
                && range.is_collapsed()
                && let Some(leaf) = self.adjacent_focusable(range.from, event.key == Key::Right)
            {
                self.apply_model_change(None, Some(Selection::Linear(leaf)))?;
                return Ok(KeyOutcome::Handled);
            }
        }
        self.defer(Dispatch::PollSelection {
            fixup: horizontal && !event.shift,
        });
        Ok(KeyOutcome::Native)
    }

    /// Outer range of a focusable inline leaf right next to the caret
    fn adjacent_focusable(&self, caret: usize, forward: bool) -> Option<Range> {
        let document = self.model.document();
        let branch = document.content_branch_at(caret)?;
        let mut offset = document.inner_range(branch).0;
        for &child in document.children(branch) {
            let length = document.outer_length(child);
            let focusable = document
                .spec(child)
                .is_ok_and(|spec| spec.leaf && spec.focusable);
            let touches = if forward {
                offset == caret
            } else {
                offset + length == caret
            };
            if focusable && touches {
                return Some(Range::new(offset, offset + length));
            }
            offset += length;
        }
        None
    }

    /// Remove an expanded selection through the model. Returns the caret,
    /// or `None` if the range cannot be removed.
    pub(crate) fn remove_selected(&mut self, range: Range) -> SurfaceResult<Option<usize>> {
        if range.is_collapsed() {
            return Ok(Some(range.from));
        }
        let tx = Transaction::removal(range);
        match self.apply_model_change(Some(&tx), Some(Selection::collapsed(range.start()))) {
            Ok(()) => Ok(Some(range.start())),
            Err(SurfaceError::Model(err)) => {
                warn!("cannot remove {range:?}: {err}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Remove a span next to the caret. The caret stays in its content
    /// branch, shifted only by what was removed before it.
    fn remove_beside(&mut self, caret: usize, span: Range) -> SurfaceResult<()> {
        let before = span.end().min(caret) - span.start().min(caret);
        let tx = Transaction::removal(span);
        match self.apply_model_change(Some(&tx), Some(Selection::collapsed(caret - before))) {
            Err(SurfaceError::Model(err)) => {
                warn!("cannot remove {span:?}: {err}");
                Ok(())
            }
            result => result,
        }
    }

    fn handle_enter(&mut self) -> SurfaceResult<KeyOutcome> {
        let Some(range) = self.model.selection().range() else {
            return Ok(KeyOutcome::Handled);
        };
        let caret = if self.focused_node.is_some() {
            Some(range.end())
        } else {
            self.remove_selected(range)?
        };
        let Some(caret) = caret else {
            return Ok(KeyOutcome::Handled);
        };

        let document = self.model.document();
        let (tx, after) = match document.content_branch_at(caret) {
            Some(branch) if document.spec(branch)?.split_on_enter => {
                (Transaction::split(document, caret)?, caret + 2)
            }
            Some(branch) => {
                let end = document.outer_range(branch).end();
                (Transaction::insertion(end, empty_paragraph()), end + 1)
            }
            None => (Transaction::insertion(caret, empty_paragraph()), caret + 1),
        };
        self.apply_model_change(Some(&tx), Some(Selection::collapsed(after)))?;
        Ok(KeyOutcome::Handled)
    }

    fn handle_delete(&mut self, forward: bool) -> SurfaceResult<KeyOutcome> {
        let Some(range) = self.model.selection().range() else {
            return Ok(KeyOutcome::Native);
        };
        if !range.is_collapsed() {
            self.remove_selected(range)?;
            return Ok(KeyOutcome::Handled);
        }
        let span = if forward {
            self.removal_after(range.from)
        } else {
            self.removal_before(range.from)
        };
        match span {
            Some(span) => {
                debug!("model removal {span:?}");
                self.remove_beside(range.from, span)?;
                Ok(KeyOutcome::Handled)
            }
            None => {
                self.defer(Dispatch::PollContent);
                Ok(KeyOutcome::Native)
            }
        }
    }

    /// What Backspace removes through the model: a leaf just before the
    /// caret, or the boundary with the previous branch. `None` leaves it to
    /// the platform.
    fn removal_before(&self, caret: usize) -> Option<Range> {
        let document = self.model.document();
        match document.data().get(caret.checked_sub(1)?)? {
            LinearItem::Close(_) => {
                let node = child_ending_at(document, caret)?;
                is_leaf(document, node).then(|| document.outer_range(node))
            }
            LinearItem::Open(_) => {
                let branch = document.content_branch_at(caret)?;
                if document.inner_range(branch).0 != caret {
                    return None;
                }
                let previous = child_ending_at(document, caret - 1)?;
                if document.is_content_branch(previous) {
                    Some(Range::new(caret - 2, caret))
                } else if is_leaf(document, previous) {
                    Some(document.outer_range(previous))
                } else {
                    None
                }
            }
            LinearItem::Text { .. } => None,
        }
    }

    /// What Delete removes through the model, mirroring [`Self::removal_before`]
    fn removal_after(&self, caret: usize) -> Option<Range> {
        let document = self.model.document();
        match document.data().get(caret)? {
            LinearItem::Open(_) => {
                let node = child_starting_at(document, caret)?;
                is_leaf(document, node).then(|| document.outer_range(node))
            }
            LinearItem::Close(_) => {
                let branch = document.content_branch_at(caret)?;
                if document.inner_range(branch).1 != caret {
                    return None;
                }
                let next = child_starting_at(document, caret + 1)?;
                if document.is_content_branch(next) {
                    Some(Range::new(caret, caret + 2))
                } else if is_leaf(document, next) {
                    Some(document.outer_range(next))
                } else {
                    None
                }
            }
            LinearItem::Text { .. } => None,
        }
    }

    fn handle_insertion(&mut self) -> SurfaceResult<KeyOutcome> {
        let Some(range) = self.model.selection().range() else {
            return Ok(KeyOutcome::Native);
        };
        let Some(caret) = self.remove_selected(range)? else {
            return Ok(KeyOutcome::Handled);
        };
        self.ensure_content_branch(caret)?;
        self.strip_caret_slug();
        self.defer(Dispatch::PollContent);
        Ok(KeyOutcome::Native)
    }

    /// A caret between blocks gets an empty paragraph to type into.
    /// Returns where the caret is afterwards.
    pub(crate) fn ensure_content_branch(&mut self, caret: usize) -> SurfaceResult<usize> {
        if self.model.document().content_branch_at(caret).is_some() {
            return Ok(caret);
        }
        let tx = Transaction::insertion(caret, empty_paragraph());
        self.apply_model_change(Some(&tx), Some(Selection::collapsed(caret + 1)))?;
        Ok(caret + 1)
    }

    /// Typing must not land in a slot's filler: drop the inline slot the
    /// caret is in and put the caret where it stood
    fn strip_caret_slug(&mut self) {
        let Some(native) = self.dom.selection() else {
            return;
        };
        let Some(slug) = self.dom.closest(native.focus.node, |id| self.dom.is_slug(id)) else {
            return;
        };
        let Some(position) = self.dom.position_before(slug) else {
            return;
        };
        let Some(view) = self
            .dom
            .view_of(position.node)
            .filter(|&v| self.views.get(v).is_some_and(ViewNode::is_content_branch))
        else {
            return;
        };
        self.dom.detach(slug);
        if let Some(branch) = self.views.get_mut(view).and_then(|v| v.branch.as_mut()) {
            branch.inline_slugs.retain(|&s| s != slug);
        }
        self.dom
            .set_selection(Some(NativeSelection::collapsed(position)));
        // Leaving the slot is not an edit; the next poll compares text only
        self.poll_silently();
    }

    pub fn composition_start(&mut self) -> SurfaceResult<()> {
        if self.deactivated {
            return Ok(());
        }
        if let Some(range) = self.model.selection().range()
            && let Some(caret) = self.remove_selected(range)?
        {
            self.ensure_content_branch(caret)?;
        }
        self.in_ime = true;
        self.strip_caret_slug();
        Ok(())
    }

    /// The platform replaced the composition text so far
    pub fn composition_update(&mut self, text: &str) -> SurfaceResult<()> {
        if !self.in_ime {
            self.composition_start()?;
        }
        if let Some(root) = self.root_element() {
            self.platform.compose(&mut self.dom, root, text);
        }
        self.defer(Dispatch::Poll);
        self.flush()
    }

    pub fn composition_end(&mut self) -> SurfaceResult<()> {
        self.platform.end_composition();
        self.in_ime = false;
        self.defer(Dispatch::PollContent);
        self.flush()
    }

    /// Pointer press. Focusable nodes are selected whole through the model.
    pub fn mouse_down(&mut self, position: DomPosition) -> SurfaceResult<()> {
        if self.deactivated {
            return Ok(());
        }
        let focusable = self.dom.closest(position.node, |id| {
            self.dom
                .view_of(id)
                .and_then(|v| self.views.get(v))
                .is_some_and(ViewNode::is_focusable)
        });
        if let Some(element) = focusable
            && let Some(node) = self
                .dom
                .view_of(element)
                .and_then(|v| self.views.get(v))
                .map(|v| v.model)
        {
            let range = self.model.document().outer_range(node);
            return self.apply_model_change(None, Some(Selection::Linear(range)));
        }
        self.platform.click(&mut self.dom, position);
        Ok(())
    }

    pub fn mouse_up(&mut self) -> SurfaceResult<()> {
        self.defer(Dispatch::PollSelection { fixup: false });
        self.flush()
    }

    pub fn click(&mut self, position: DomPosition) -> SurfaceResult<()> {
        self.mouse_down(position)?;
        self.mouse_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::linear::DataBuilder;
    use crate::surface::SurfaceNotification;
    use crate::surface::tests::focused_surface;
    use crate::tests::mixed_document;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn select(surface: &mut Surface, selection: Selection) {
        surface
            .apply_model_change(None, Some(selection))
            .expect("select");
    }

    fn two_paragraphs() -> crate::model::linear::LinearData {
        DataBuilder::new().paragraph("ab").paragraph("cd").build()
    }

    #[rstest]
    #[case::backspace_at_start(Key::Backspace, 5)]
    #[case::delete_at_end(Key::Delete, 3)]
    fn test_paragraph_boundary_merges(#[case] key: Key, #[case] caret: usize) {
        let mut surface = focused_surface(two_paragraphs(), Vec::new());
        select(&mut surface, Selection::collapsed(caret));

        assert_eq!(surface.press(key).expect("press"), KeyOutcome::Handled);

        assert_eq!(surface.selection(), Selection::collapsed(3));
        assert_eq!(
            surface.html(),
            r#"<div class="surface-document" contenteditable="true"><p>abcd</p></div>"#
        );
    }

    #[test]
    fn test_enter_at_end_leaves_an_editable_empty_paragraph() {
        let mut surface = focused_surface(DataBuilder::new().paragraph("a").build(), Vec::new());
        select(&mut surface, Selection::collapsed(2));

        surface.press(Key::Enter).expect("press");

        assert_eq!(surface.selection(), Selection::collapsed(4));
        assert_snapshot!(surface.html(), @r#"<div class="surface-document" contenteditable="true"><p>a</p><p><span class="slug">~</span></p></div>"#);

        surface.type_text("b").expect("type");
        assert_eq!(surface.document().data().text_in(0, 7), "ab");
        assert_snapshot!(surface.html(), @r#"<div class="surface-document" contenteditable="true"><p>a</p><p>b</p></div>"#);
    }

    #[test]
    fn test_backspace_after_inline_leaf_removes_it() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        select(&mut surface, Selection::collapsed(7));

        assert_eq!(surface.press(Key::Backspace).expect("press"), KeyOutcome::Handled);

        assert_eq!(surface.selection(), Selection::collapsed(5));
        assert_eq!(surface.document().len(), 16);
        assert!(surface.html().starts_with(
            r#"<div class="surface-document" contenteditable="true"><p>ab<b>cd</b>e</p>"#
        ));
    }

    #[test]
    fn test_backspace_inside_text_is_native() {
        let mut surface = focused_surface(two_paragraphs(), Vec::new());
        select(&mut surface, Selection::collapsed(3));

        assert_eq!(surface.press(Key::Backspace).expect("press"), KeyOutcome::Native);

        assert_eq!(surface.document().data().text_in(0, 7), "acd");
        assert_eq!(surface.selection(), Selection::collapsed(2));
    }

    #[test]
    fn test_enter_splits_the_paragraph() {
        let mut surface = focused_surface(DataBuilder::new().paragraph("abcd").build(), Vec::new());
        select(&mut surface, Selection::collapsed(3));

        surface.press(Key::Enter).expect("press");

        assert_eq!(surface.selection(), Selection::collapsed(5));
        assert_snapshot!(surface.html(), @r#"<div class="surface-document" contenteditable="true"><p>ab</p><p>cd</p></div>"#);
    }

    #[test]
    fn test_typing_into_empty_paragraph_drops_the_filler() {
        let mut surface = focused_surface(DataBuilder::new().paragraph("").build(), Vec::new());
        select(&mut surface, Selection::collapsed(1));
        assert_snapshot!(surface.html(), @r#"<div class="surface-document" contenteditable="true"><p><span class="slug">~</span></p></div>"#);

        surface.type_text("x").expect("type");

        assert_eq!(surface.selection(), Selection::collapsed(2));
        assert_snapshot!(surface.html(), @r#"<div class="surface-document" contenteditable="true"><p>x</p></div>"#);
    }

    #[test]
    fn test_typing_at_block_slot_creates_a_paragraph() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        select(&mut surface, Selection::collapsed(11));

        surface.type_text("y").expect("type");

        assert_eq!(surface.document().data().text_in(11, 14), "y");
        assert_eq!(surface.selection(), Selection::collapsed(13));
    }

    #[test]
    fn test_bold_shortcut_on_a_range() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        select(&mut surface, Selection::Linear(Range::new(1, 3)));

        let outcome = surface
            .press(KeyEvent::new(Key::Char('b')).with_ctrl())
            .expect("press");

        assert_eq!(outcome, KeyOutcome::Handled);
        assert!(surface.html().contains("<p><b>abcd</b>"));
    }

    #[test]
    fn test_toggled_annotation_applies_to_typed_text() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        select(&mut surface, Selection::collapsed(3));
        surface
            .press(KeyEvent::new(Key::Char('b')).with_ctrl())
            .expect("press");
        assert!(surface.markers().holder().is_some());
        assert!(
            surface
                .take_notifications()
                .iter()
                .any(|n| matches!(n, SurfaceNotification::InsertionAnnotationsChanged(a) if a.names() == vec!["bold"]))
        );

        surface.type_text("X").expect("type");
        surface.blur().expect("blur");

        let bold = Annotation::new("bold");
        assert!(surface.document().data().is_covered_by(3, 4, &bold));
        assert!(surface.markers().holder().is_none());
        assert!(surface.html().contains("<p>ab<b>Xcd</b>"));
    }

    #[test]
    fn test_arrow_selects_adjacent_inline_leaf_then_collapses() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        select(&mut surface, Selection::collapsed(5));

        assert_eq!(surface.press(Key::Right).expect("press"), KeyOutcome::Handled);
        assert_eq!(surface.selection(), Selection::Linear(Range::new(5, 7)));
        let image = surface.focused_node().expect("focused");
        let element = surface.views().element(image).expect("element");
        assert_eq!(surface.dom().attribute(element, "class"), Some("focused"));

        assert_eq!(surface.press(Key::Right).expect("press"), KeyOutcome::Handled);
        assert_eq!(surface.selection(), Selection::collapsed(7));
        assert_eq!(surface.focused_node(), None);
        assert_eq!(surface.dom().attribute(element, "class"), None);
    }

    #[test]
    fn test_click_on_block_image_selects_it() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        let figure = surface
            .views()
            .for_model(child_starting_at(surface.document(), 9).expect("image"))
            .and_then(|v| surface.views().element(v))
            .expect("figure");
        let image = surface.dom().child(figure, 0).expect("img");

        surface.click(DomPosition::new(image, 0)).expect("click");

        assert_eq!(surface.selection(), Selection::Linear(Range::new(9, 11)));
        assert!(surface.focused_node().is_some());
    }

    #[test]
    fn test_composition_commits_on_end() {
        let mut surface = focused_surface(DataBuilder::new().paragraph("a").build(), Vec::new());
        select(&mut surface, Selection::collapsed(2));

        surface.composition_start().expect("start");
        surface.composition_update("n").expect("update");
        surface.composition_update("\u{306b}").expect("update");
        assert_eq!(surface.document().data().text_in(0, 3), "a");

        surface.composition_end().expect("end");
        assert_eq!(surface.document().data().text_in(0, 4), "a\u{306b}");
        assert_eq!(surface.selection(), Selection::collapsed(3));
    }

    #[test]
    fn test_blur_stops_polling() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        assert!(surface.observer().timer().is_running());
        surface.blur().expect("blur");
        assert!(!surface.observer().timer().is_running());
        assert!(!surface.dom().has_focus());
    }
}
