use log::{debug, trace};

use crate::host::dom::{DomId, NativeSelection, Role};
use crate::model::selection::Range;
use crate::view::node::ViewId;
use crate::view::offset::{ViewContext, offset_at};
use crate::view::text::{dom_hash, dom_text};

/// What the native selection pointed at during one poll, and how that
/// differs from the previous poll. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeState {
    pub selection_changed: bool,
    pub content_changed: bool,
    pub branch_node_changed: bool,
    pub entered_slug: bool,
    pub left_slug: bool,
    pub model_range: Option<Range>,
    /// Content branch owning the anchor
    pub node: Option<ViewId>,
    /// Slot element containing the anchor
    pub slug: Option<DomId>,
    pub text: Option<String>,
    pub hash: Option<String>,
    /// Raw endpoints, compared by identity
    pub native: Option<NativeSelection>,
}

impl RangeState {
    /// Snapshot the live selection. With `selection_only` the text and hash
    /// of an unchanged branch are carried over instead of recomputed, and
    /// content changes are not reported.
    pub fn new(old: Option<&RangeState>, ctx: &ViewContext<'_>, selection_only: bool) -> Self {
        let dom = ctx.dom;
        let native = ctx.dom.selection().filter(|selection| {
            ctx.root_element().is_some_and(|root| {
                [selection.anchor.node, selection.focus.node].iter().all(|&node| {
                    dom.contains(root, node)
                        && dom
                            .closest(node, |id| matches!(dom.role(id), Some(Role::NestedSurface)))
                            .is_none()
                })
            })
        });

        let selection_changed = old.is_none_or(|old| old.native != native);

        let anchor = native.map(|selection| selection.anchor.node);
        let node = anchor
            .and_then(|anchor| {
                dom.closest(anchor, |id| {
                    dom.view_of(id)
                        .and_then(|view| ctx.views.get(view))
                        .is_some_and(|view| view.is_content_branch())
                })
            })
            .and_then(|element| dom.view_of(element));
        let slug = anchor.and_then(|anchor| dom.closest(anchor, |id| dom.is_slug(id)));

        let (old_node, old_slug) = old.map_or((None, None), |old| (old.node, old.slug));
        let branch_node_changed = old_node != node || old_slug != slug;
        let entered_slug = slug.is_some() && slug != old_slug;
        let left_slug = old_slug.is_some() && slug != old_slug;

        let (text, hash) = match old {
            Some(old) if selection_only && !branch_node_changed => {
                (old.text.clone(), old.hash.clone())
            }
            _ => match node.and_then(|view| ctx.views.element(view)) {
                Some(element) => (
                    Some(dom_text(dom, ctx.views, ctx.document, element)),
                    Some(dom_hash(dom, ctx.views, element)),
                ),
                None => (None, None),
            },
        };

        let content_changed = !selection_only
            && !branch_node_changed
            && node.is_some()
            && old.is_some_and(|old| old.text.is_none() || old.text != text || old.hash != hash);

        let model_range = native.and_then(|selection| {
            let resolve = |position| {
                offset_at(ctx, position)
                    .inspect_err(|err| debug!("selection endpoint {position:?} unresolved: {err}"))
                    .ok()
            };
            Some(Range::new(resolve(selection.anchor)?, resolve(selection.focus)?))
        });

        trace!(
            "range state: range={model_range:?} node={node:?} selection_changed={selection_changed} content_changed={content_changed}"
        );
        Self {
            selection_changed,
            content_changed,
            branch_node_changed,
            entered_slug,
            left_slug,
            model_range,
            node,
            slug,
            text,
            hash,
            native,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::dom::DomPosition;
    use crate::tests::{Mounted, mixed_document};
    use crate::view::offset::position_at;
    use pretty_assertions::assert_eq;

    fn select(mounted: &mut Mounted, offset: usize) {
        let position = position_at(&mounted.ctx(), offset).expect("position");
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(position)));
    }

    #[test]
    fn test_first_snapshot_records_branch_text() {
        let mut mounted = Mounted::new(mixed_document());
        select(&mut mounted, 3);
        let state = RangeState::new(None, &mounted.ctx(), false);

        assert!(state.selection_changed);
        assert!(state.branch_node_changed);
        assert!(!state.content_changed);
        assert_eq!(state.model_range, Some(Range::collapsed(3)));
        assert_eq!(state.text.as_deref(), Some("abcd\u{2603}\u{2603}e"));
        assert_eq!(state.hash.as_deref(), Some("<p>#<b>#</b><img></img>#</p>"));
    }

    #[test]
    fn test_typed_text_is_a_content_change() {
        let mut mounted = Mounted::new(mixed_document());
        select(&mut mounted, 3);
        let first = RangeState::new(None, &mounted.ctx(), false);

        let caret = mounted.dom.selection().expect("selection").focus;
        mounted.dom.insert_text(caret.node, caret.offset, "z");
        mounted.dom.set_selection(Some(NativeSelection::collapsed(DomPosition::new(
            caret.node,
            caret.offset + 1,
        ))));
        let second = RangeState::new(Some(&first), &mounted.ctx(), false);

        assert!(second.content_changed);
        assert!(!second.branch_node_changed);
        assert_eq!(second.text.as_deref(), Some("abzcd\u{2603}\u{2603}e"));

        // Selection-only polls reuse the previous text
        let third = RangeState::new(Some(&first), &mounted.ctx(), true);
        assert!(!third.content_changed);
        assert_eq!(third.text, first.text);
    }

    #[test]
    fn test_entering_and_leaving_a_slot() {
        let mut mounted = Mounted::new(mixed_document());
        select(&mut mounted, 3);
        let in_text = RangeState::new(None, &mounted.ctx(), false);
        select(&mut mounted, 11);
        let in_slug = RangeState::new(Some(&in_text), &mounted.ctx(), false);
        select(&mut mounted, 14);
        let out = RangeState::new(Some(&in_slug), &mounted.ctx(), false);

        assert!(in_slug.entered_slug && in_slug.branch_node_changed);
        assert_eq!(in_slug.node, None);
        assert!(out.left_slug && !out.entered_slug);
    }

    #[test]
    fn test_selection_outside_the_surface_is_empty() {
        let mut mounted = Mounted::new(mixed_document());
        let outside = mounted.dom.create_text("elsewhere");
        let body = mounted.dom.body();
        mounted.dom.append_child(body, outside);
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(DomPosition::new(outside, 1))));

        let state = RangeState::new(None, &mounted.ctx(), false);
        assert_eq!(state.native, None);
        assert_eq!(state.model_range, None);
    }
}
