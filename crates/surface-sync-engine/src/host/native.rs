//! What the host platform does on its own, without asking the application.
//!
//! Typing, deleting inside text, caret movement and IME composition mutate
//! the tree and the native selection directly. The surface only finds out on
//! its next poll, exactly as with a real contenteditable.
//!
//! Caret movement works on a list of caret stops in document order. Each
//! character is one step, an opaque inline element (leaf or boundary marker)
//! is one step, and crossing into another block is one step. Positions that
//! are equivalent (end of one text node, start of the next) share a stop.

use std::cmp::Ordering;

use log::{trace, warn};

use crate::host::dom::{Dom, DomId, DomPosition, NativeSelection, Role};
use crate::host::event::{Key, KeyEvent};

/// What moving across one caret step passes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Char { node: DomId, index: usize },
    /// A non-editable element
    Opaque(DomId),
    Marker(DomId),
    /// A block boundary
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// Caret stops of a tree plus the steps between them.
///
/// `steps[i]` lies between `stops[i]` and `stops[i + 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaretMap {
    pub stops: Vec<DomPosition>,
    pub steps: Vec<Step>,
    /// Indices of stops that start a block
    pub line_starts: Vec<usize>,
}

impl CaretMap {
    pub fn build(dom: &Dom, root: DomId) -> Self {
        let mut walker = Walker {
            dom,
            map: CaretMap::default(),
            need_stop: true,
            pending_leaf: None,
        };
        walker.visit(root);
        if let Some((leaf, after)) = walker.pending_leaf.take() {
            walker.push_step(after, Step::Opaque(leaf));
        }
        walker.map
    }

    /// Index of the last stop at or before `position`
    pub fn index_of(&self, dom: &Dom, position: DomPosition) -> usize {
        self.stops
            .iter()
            .rposition(|&stop| dom.compare_positions(stop, position) != Ordering::Greater)
            .unwrap_or(0)
    }

    fn line_of(&self, index: usize) -> usize {
        self.line_starts
            .iter()
            .rposition(|&start| start <= index)
            .unwrap_or(0)
    }

    /// Stop reached from `index` moving one step in `direction`
    pub fn target(&self, index: usize, direction: Direction) -> usize {
        let last = self.stops.len().saturating_sub(1);
        match direction {
            Direction::Left => index.saturating_sub(1),
            Direction::Right => (index + 1).min(last),
            Direction::Up => {
                let line = self.line_of(index);
                self.line_starts
                    .get(line.saturating_sub(1))
                    .copied()
                    .unwrap_or(0)
            }
            Direction::Down => {
                let line = self.line_of(index);
                self.line_starts.get(line + 1).copied().unwrap_or(last)
            }
        }
    }
}

struct Walker<'d> {
    dom: &'d Dom,
    map: CaretMap,
    /// A block boundary was crossed since the last stop
    need_stop: bool,
    /// Block leaf crossed since the last stop, with the position after it
    pending_leaf: Option<(DomId, DomPosition)>,
}

impl Walker<'_> {
    fn push_boundary(&mut self, position: DomPosition) {
        if !self.map.stops.is_empty() {
            let step = match self.pending_leaf.take() {
                Some((leaf, _)) => Step::Opaque(leaf),
                None => Step::Break,
            };
            self.map.steps.push(step);
        }
        self.map.line_starts.push(self.map.stops.len());
        self.map.stops.push(position);
        self.need_stop = false;
    }

    fn push_step(&mut self, position: DomPosition, step: Step) {
        self.map.stops.push(position);
        self.map.steps.push(step);
    }

    fn visit(&mut self, node: DomId) {
        let dom = self.dom;
        if dom.is_text(node) {
            let length = dom.length(node);
            if length == 0 {
                return;
            }
            if self.need_stop {
                self.push_boundary(DomPosition::new(node, 0));
            }
            for index in 0..length {
                self.push_step(DomPosition::new(node, index + 1), Step::Char { node, index });
            }
            return;
        }

        let (Some(before), Some(after)) = (dom.position_before(node), dom.position_after(node))
        else {
            // The root: only its children count
            self.visit_children(node);
            return;
        };
        match dom.role(node) {
            Some(Role::Slug) => {
                if self.need_stop {
                    self.push_boundary(DomPosition::new(node, 0));
                }
            }
            Some(Role::Marker(_)) => {
                if self.need_stop {
                    self.push_boundary(before);
                }
                self.push_step(after, Step::Marker(node));
            }
            Some(Role::NestedSurface | Role::Highlight) => {}
            _ if dom.is_non_editable(node) => {
                if dom.is_block(node) {
                    self.push_boundary(before);
                    self.pending_leaf = Some((node, after));
                    self.need_stop = true;
                } else {
                    if self.need_stop {
                        self.push_boundary(before);
                    }
                    self.push_step(after, Step::Opaque(node));
                }
            }
            _ => {
                let block = dom.is_block(node);
                if block {
                    self.need_stop = true;
                }
                self.visit_children(node);
                if block {
                    self.need_stop = true;
                }
            }
        }
    }

    fn visit_children(&mut self, node: DomId) {
        for &child in self.dom.children(node) {
            self.visit(child);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Composition {
    node: DomId,
    start: usize,
    len: usize,
}

/// Simulated host editing behaviour plus IME composition state.
#[derive(Debug, Clone, Default)]
pub struct NativePlatform {
    composition: Option<Composition>,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_composing(&self) -> bool {
        self.composition.is_some()
    }

    /// Apply the platform default for a key the surface let through
    pub fn apply_key(&mut self, dom: &mut Dom, root: DomId, event: &KeyEvent) -> bool {
        match event.key {
            Key::Char(ch) if !event.ctrl => self.type_text(dom, root, &ch.to_string()).is_some(),
            Key::Backspace => self.delete(dom, root, Direction::Left),
            Key::Delete => self.delete(dom, root, Direction::Right),
            Key::Left => self.move_caret(dom, root, Direction::Left, event.shift),
            Key::Right => self.move_caret(dom, root, Direction::Right, event.shift),
            Key::Up => self.move_caret(dom, root, Direction::Up, event.shift),
            Key::Down => self.move_caret(dom, root, Direction::Down, event.shift),
            _ => false,
        }
    }

    fn caret(dom: &Dom, root: DomId) -> Option<NativeSelection> {
        let selection = dom.selection()?;
        (dom.contains(root, selection.anchor.node) && dom.contains(root, selection.focus.node))
            .then_some(selection)
    }

    /// Insert text at the caret. Returns the text node and offset it went to.
    pub fn type_text(&mut self, dom: &mut Dom, root: DomId, text: &str) -> Option<DomPosition> {
        let selection = Self::caret(dom, root)?;
        if !selection.is_collapsed() {
            warn!("native insertion over an expanded selection ignored");
            return None;
        }
        let (node, offset) = insertion_point(dom, selection.focus)?;
        dom.insert_text(node, offset, text);
        let end = DomPosition::new(node, offset + text.chars().count());
        dom.set_selection(Some(NativeSelection::collapsed(end)));
        trace!("native insert {text:?} into node {node} at {offset}");
        Some(DomPosition::new(node, offset))
    }

    /// Backspace (`Left`) or Delete (`Right`) at a collapsed caret
    pub fn delete(&mut self, dom: &mut Dom, root: DomId, direction: Direction) -> bool {
        let Some(selection) = Self::caret(dom, root) else {
            return false;
        };
        if !selection.is_collapsed() {
            warn!("native deletion of an expanded selection ignored");
            return false;
        }
        let map = CaretMap::build(dom, root);
        let mut index = map.index_of(dom, selection.focus);
        let step = loop {
            let step = match direction {
                Direction::Right => map.steps.get(index).copied(),
                _ => index.checked_sub(1).and_then(|i| map.steps.get(i).copied()),
            };
            match step {
                // Zero-width markers are deleted past, never deleted
                Some(Step::Marker(_)) => match direction {
                    Direction::Right => index += 1,
                    _ => index -= 1,
                },
                other => break other,
            }
        };

        let caret = match step {
            Some(Step::Char { node, index }) => {
                dom.remove_text(node, index, index + 1);
                if dom.length(node) == 0 {
                    remove_empty(dom, node)
                } else {
                    Some(DomPosition::new(node, index))
                }
            }
            Some(Step::Opaque(element)) if !dom.is_block(element) => remove_empty(dom, element),
            _ => return false,
        };
        if let Some(caret) = caret {
            dom.set_selection(Some(NativeSelection::collapsed(caret)));
        }
        true
    }

    /// Move (or with `extend`, extend) the caret one step
    pub fn move_caret(
        &mut self,
        dom: &mut Dom,
        root: DomId,
        direction: Direction,
        extend: bool,
    ) -> bool {
        let Some(selection) = Self::caret(dom, root) else {
            return false;
        };
        let map = CaretMap::build(dom, root);
        if map.stops.is_empty() {
            return false;
        }

        if !extend && !selection.is_collapsed() {
            let backward =
                dom.compare_positions(selection.anchor, selection.focus) == Ordering::Greater;
            let (start, end) = if backward {
                (selection.focus, selection.anchor)
            } else {
                (selection.anchor, selection.focus)
            };
            let edge = match direction {
                Direction::Left | Direction::Up => start,
                Direction::Right | Direction::Down => end,
            };
            dom.set_selection(Some(NativeSelection::collapsed(edge)));
            return true;
        }

        let index = map.index_of(dom, selection.focus);
        let focus = map.stops[map.target(index, direction)];
        let anchor = if extend { selection.anchor } else { focus };
        dom.set_selection(Some(NativeSelection::new(anchor, focus)));
        trace!("native caret {direction:?} -> {focus:?}");
        true
    }

    /// IME composition update: replace the composed text so far with `text`
    pub fn compose(&mut self, dom: &mut Dom, root: DomId, text: &str) -> bool {
        if let Some(composition) = self.composition {
            dom.remove_text(
                composition.node,
                composition.start,
                composition.start + composition.len,
            );
            dom.insert_text(composition.node, composition.start, text);
            let len = text.chars().count();
            self.composition = Some(Composition { len, ..composition });
            let caret = DomPosition::new(composition.node, composition.start + len);
            dom.set_selection(Some(NativeSelection::collapsed(caret)));
            return true;
        }
        match self.type_text(dom, root, text) {
            Some(start) => {
                self.composition = Some(Composition {
                    node: start.node,
                    start: start.offset,
                    len: text.chars().count(),
                });
                true
            }
            None => false,
        }
    }

    pub fn end_composition(&mut self) {
        self.composition = None;
    }

    /// Place the caret where the user clicked
    pub fn click(&mut self, dom: &mut Dom, position: DomPosition) {
        self.composition = None;
        dom.set_selection(Some(NativeSelection::collapsed(position)));
    }
}

/// Text node and offset typing at `position` goes into
fn insertion_point(dom: &mut Dom, position: DomPosition) -> Option<(DomId, usize)> {
    if dom.is_text(position.node) {
        return Some((position.node, position.offset));
    }
    let mut position = position;
    if let Some(island) = dom.closest(position.node, |id| dom.is_non_editable(id)) {
        position = dom.position_before(island)?;
    }
    let (element, index) = (position.node, position.offset);
    if let Some(previous) = index.checked_sub(1).and_then(|i| dom.child(element, i))
        && dom.is_text(previous)
    {
        return Some((previous, dom.length(previous)));
    }
    if let Some(next) = dom.child(element, index)
        && dom.is_text(next)
    {
        return Some((next, 0));
    }
    let text = dom.create_text("");
    dom.insert_child(element, index, text);
    Some((text, 0))
}

/// Detach `node`, and any inline wrapper left empty by that. Returns where
/// the caret ends up.
fn remove_empty(dom: &mut Dom, node: DomId) -> Option<DomPosition> {
    let mut current = node;
    loop {
        let position = dom.position_before(current)?;
        dom.detach(current);
        let parent = position.node;
        let wrapper = matches!(dom.role(parent), Some(Role::Annotation(_) | Role::Plain))
            && !dom.is_block(parent);
        if wrapper && dom.children(parent).is_empty() {
            current = parent;
            continue;
        }
        return Some(position);
    }
}

/// Browser-style drift: wrap a text node in an element the engine did not
/// create (e.g. a `<span>` or `<font>` some engines add while typing)
pub fn wrap_text_in_plain(dom: &mut Dom, text: DomId, tag: &str) -> DomId {
    let wrapper = dom.create_element(tag, Role::Plain);
    dom.wrap(text, wrapper);
    wrapper
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{Mounted, mixed_document};
    use pretty_assertions::assert_eq;

    fn root(mounted: &Mounted) -> DomId {
        mounted.views.element(mounted.views.root()).expect("root")
    }

    #[test]
    fn test_steps_cover_text_leaves_and_blocks() {
        let mounted = Mounted::new(mixed_document());
        let map = CaretMap::build(&mounted.dom, root(&mounted));

        // ab cd [img] e | figure | slot | x | slot
        assert_eq!(map.stops.len(), 12);
        assert_eq!(map.line_starts, vec![0, 7, 8, 9, 11]);
        assert!(matches!(map.steps[4], Step::Opaque(_)));
        assert_eq!(map.steps[6], Step::Break);
        assert!(matches!(map.steps[7], Step::Opaque(_)));
    }

    #[test]
    fn test_typing_and_backspace_in_text() {
        let mut mounted = Mounted::new(mixed_document());
        let root = root(&mounted);
        let mut platform = NativePlatform::new();
        let map = CaretMap::build(&mounted.dom, root);
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(map.stops[2])));

        platform.type_text(&mut mounted.dom, root, "Z").expect("typed");
        assert!(mounted.html().contains("<p>abZ<b>cd</b>"));

        assert!(platform.delete(&mut mounted.dom, root, Direction::Left));
        assert!(platform.delete(&mut mounted.dom, root, Direction::Left));
        assert!(mounted.html().contains("<p>a<b>cd</b>"));
    }

    #[test]
    fn test_backspace_removes_inline_leaf() {
        let mut mounted = Mounted::new(mixed_document());
        let root = root(&mounted);
        let mut platform = NativePlatform::new();
        let map = CaretMap::build(&mounted.dom, root);
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(map.stops[5])));

        assert!(platform.delete(&mut mounted.dom, root, Direction::Left));
        assert!(mounted.html().contains("<p>ab<b>cd</b>e</p>"));
    }

    #[test]
    fn test_backspace_at_block_start_does_nothing() {
        let mut mounted = Mounted::new(mixed_document());
        let root = root(&mounted);
        let mut platform = NativePlatform::new();
        let map = CaretMap::build(&mounted.dom, root);
        let before = mounted.html();
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(map.stops[9])));

        assert!(!platform.delete(&mut mounted.dom, root, Direction::Left));
        assert_eq!(mounted.html(), before);
    }

    #[test]
    fn test_vertical_moves_between_blocks() {
        let mut mounted = Mounted::new(mixed_document());
        let root = root(&mounted);
        let mut platform = NativePlatform::new();
        let map = CaretMap::build(&mounted.dom, root);
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(map.stops[3])));

        platform.move_caret(&mut mounted.dom, root, Direction::Down, false);
        assert_eq!(mounted.dom.selection().map(|s| s.focus), Some(map.stops[7]));
        platform.move_caret(&mut mounted.dom, root, Direction::Up, false);
        assert_eq!(mounted.dom.selection().map(|s| s.focus), Some(map.stops[0]));
    }

    #[test]
    fn test_shift_extends_focus_only() {
        let mut mounted = Mounted::new(mixed_document());
        let root = root(&mounted);
        let mut platform = NativePlatform::new();
        let map = CaretMap::build(&mounted.dom, root);
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(map.stops[1])));

        platform.move_caret(&mut mounted.dom, root, Direction::Right, true);
        platform.move_caret(&mut mounted.dom, root, Direction::Right, true);
        assert_eq!(
            mounted.dom.selection(),
            Some(NativeSelection::new(map.stops[1], map.stops[3]))
        );

        platform.move_caret(&mut mounted.dom, root, Direction::Left, false);
        assert_eq!(
            mounted.dom.selection(),
            Some(NativeSelection::collapsed(map.stops[1]))
        );
    }

    #[test]
    fn test_composition_replaces_composed_text() {
        let mut mounted = Mounted::new(mixed_document());
        let root = root(&mounted);
        let mut platform = NativePlatform::new();
        let map = CaretMap::build(&mounted.dom, root);
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(map.stops[1])));

        assert!(platform.compose(&mut mounted.dom, root, "k"));
        assert!(platform.compose(&mut mounted.dom, root, "ka"));
        assert!(platform.is_composing());
        platform.end_composition();
        assert!(mounted.html().contains("<p>akab<b>"));
    }
}
