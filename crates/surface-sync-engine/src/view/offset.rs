//! Offset mapping between surface tree positions and linear model offsets.
//!
//! Backward ([`offset_at`]): walk the traversal sequence (document order with
//! every element visited on entry and on exit) backward from the position,
//! summing text lengths until a view element is met. Leaving a view means the
//! position is after it; entering one means the position is inside it.
//!
//! Forward ([`position_at`]): descend structural branches by child offsets,
//! then walk the rendered content of the owning content branch.

use log::trace;

use crate::error::PositionError;
use crate::host::dom::{Dom, DomId, DomPosition, Role};
use crate::model::document::ModelDocument;
use crate::view::markers::MarkerState;
use crate::view::node::{ViewId, ViewNode, ViewTree};

/// Read-only access to everything offset mapping needs.
#[derive(Clone, Copy)]
pub struct ViewContext<'a> {
    pub dom: &'a Dom,
    pub views: &'a ViewTree,
    pub document: &'a ModelDocument,
    pub markers: &'a MarkerState,
}

impl<'a> ViewContext<'a> {
    pub fn new(
        dom: &'a Dom,
        views: &'a ViewTree,
        document: &'a ModelDocument,
        markers: &'a MarkerState,
    ) -> Self {
        Self {
            dom,
            views,
            document,
            markers,
        }
    }

    pub fn root_element(&self) -> Option<DomId> {
        self.views.element(self.views.root())
    }

    fn view(&self, id: ViewId) -> Result<&'a ViewNode, PositionError> {
        self.views.get(id).ok_or(PositionError::NotAttached)
    }

    fn offset_of(&self, view: &ViewNode) -> usize {
        self.document.offset_of(view.model)
    }

    fn outer_length(&self, view: &ViewNode) -> usize {
        self.document.outer_length(view.model)
    }

    /// The leaf view element `node` is inside of, if any
    fn enclosing_leaf(&self, node: DomId) -> Option<(DomId, ViewId)> {
        let element = self.dom.closest(node, |id| {
            self.dom
                .view_of(id)
                .and_then(|v| self.views.get(v))
                .is_some_and(|v| v.leaf)
        })?;
        Some((element, self.dom.view_of(element)?))
    }
}

/// Linear offset of a surface tree position.
pub fn offset_at(ctx: &ViewContext<'_>, position: DomPosition) -> Result<usize, PositionError> {
    let dom = ctx.dom;
    let root = ctx.root_element().ok_or(PositionError::NotAttached)?;
    if !dom.contains(root, position.node) {
        return Err(PositionError::NotAttached);
    }
    let len = dom.length(position.node);
    if position.offset > len {
        return Err(PositionError::OffsetOutOfRange {
            offset: position.offset,
            len,
        });
    }
    if dom
        .closest(position.node, |id| matches!(dom.role(id), Some(Role::NestedSurface)))
        .is_some()
    {
        return Err(PositionError::NotAttached);
    }

    if let Some((_, view)) = ctx.enclosing_leaf(position.node) {
        return Ok(ctx.offset_of(ctx.view(view)?));
    }

    // Slots and markers have no width: start from just before them
    let mut start = position;
    if let Some(synthetic) = dom.closest(position.node, |id| {
        matches!(dom.role(id), Some(Role::Slug | Role::Marker(_)))
    }) {
        start = dom
            .position_before(synthetic)
            .ok_or(PositionError::NoOwningAncestor)?;
    }

    let (mut parent, mut index, mut text) = if dom.is_text(start.node) {
        let before = dom
            .position_before(start.node)
            .ok_or(PositionError::NoOwningAncestor)?;
        (before.node, before.offset, start.offset)
    } else {
        (start.node, start.offset, 0)
    };

    loop {
        if index == 0 {
            // Entering `parent`
            if let Some(view_id) = dom.view_of(parent) {
                let view = ctx.view(view_id)?;
                let mut offset = ctx.offset_of(view) + usize::from(view.wrapped);
                if view.content {
                    offset += text;
                }
                trace!("offset_at {position:?} -> {offset} (inside view {view_id})");
                return Ok(offset);
            }
            let before = dom
                .position_before(parent)
                .ok_or(PositionError::NoOwningAncestor)?;
            parent = before.node;
            index = before.offset;
            continue;
        }

        let previous = dom
            .child(parent, index - 1)
            .ok_or(PositionError::NoOwningAncestor)?;
        if dom.is_text(previous) {
            text += dom.length(previous);
            index -= 1;
            continue;
        }
        match dom.role(previous) {
            Some(Role::View(view_id)) => {
                // Leaving a view: the position is after it
                let view = ctx.view(*view_id)?;
                let mut offset = ctx.offset_of(view) + ctx.outer_length(view);
                if view.inline {
                    offset += text;
                }
                trace!("offset_at {position:?} -> {offset} (after view {view_id})");
                return Ok(offset);
            }
            Some(Role::Slug | Role::Marker(_) | Role::NestedSurface | Role::Highlight) => {
                index -= 1;
            }
            _ => {
                parent = previous;
                index = dom.length(previous);
            }
        }
    }
}

/// Surface tree position of a linear offset.
///
/// Offsets strictly inside a leaf snap to the nearer side of it.
pub fn position_at(ctx: &ViewContext<'_>, offset: usize) -> Result<DomPosition, PositionError> {
    let len = ctx.document.len();
    if offset > len {
        return Err(PositionError::LinearOffsetOutOfRange { offset, len });
    }

    let mut view_id = ctx.views.root();
    'descend: loop {
        let view = ctx.view(view_id)?;
        if view.is_content_branch() {
            return content_position(ctx, view_id, view, offset);
        }
        for (index, &child_id) in view.children.iter().enumerate() {
            let child = ctx.view(child_id)?;
            let start = ctx.offset_of(child);
            let length = ctx.outer_length(child);
            if offset == start {
                return branch_position(ctx, view, index);
            }
            if offset < start + length {
                if child.leaf {
                    let index = if offset - start <= length / 2 {
                        index
                    } else {
                        index + 1
                    };
                    return branch_position(ctx, view, index);
                }
                view_id = child_id;
                continue 'descend;
            }
        }
        return branch_position(ctx, view, view.children.len());
    }
}

/// Position before child `index` of a structural branch, preferring its slot
fn branch_position(
    ctx: &ViewContext<'_>,
    view: &ViewNode,
    index: usize,
) -> Result<DomPosition, PositionError> {
    if let Some(slug) = view.branch.as_ref().and_then(|b| b.block_slug_at(index)) {
        return Ok(DomPosition::new(slug, 0));
    }
    match view.children.get(index) {
        Some(&child) => {
            let element = ctx.view(child)?.element;
            ctx.dom
                .position_before(element)
                .ok_or(PositionError::NoOwningAncestor)
        }
        None => Ok(DomPosition::new(view.element, ctx.dom.length(view.element))),
    }
}

fn content_position(
    ctx: &ViewContext<'_>,
    view_id: ViewId,
    view: &ViewNode,
    offset: usize,
) -> Result<DomPosition, PositionError> {
    let (start, end) = ctx.document.inner_range(view.model);
    if start == end {
        let slug = view
            .branch
            .as_ref()
            .and_then(|b| b.inline_slugs.first().copied());
        return Ok(DomPosition::new(slug.unwrap_or(view.element), 0));
    }

    // An empty marker pair at exactly this offset: land between them
    if let Some(holder) = ctx.markers.holder().filter(|h| h.branch == view_id)
        && let Some(before_pre) = ctx.dom.position_before(holder.pre)
        && offset_at(ctx, before_pre) == Ok(offset)
    {
        return Ok(DomPosition::new(before_pre.node, before_pre.offset + 1));
    }

    let target = offset - start;
    let mut count = 0;
    Ok(walk_content(ctx, view.element, target, &mut count)?
        .unwrap_or_else(|| DomPosition::new(view.element, ctx.dom.length(view.element))))
}

fn walk_content(
    ctx: &ViewContext<'_>,
    element: DomId,
    target: usize,
    count: &mut usize,
) -> Result<Option<DomPosition>, PositionError> {
    let dom = ctx.dom;
    for (index, &child) in dom.children(element).iter().enumerate() {
        if dom.is_text(child) {
            let length = dom.length(child);
            // Prefer the end of the left text node at a boundary
            if target <= *count + length {
                return Ok(Some(DomPosition::new(child, target - *count)));
            }
            *count += length;
            continue;
        }
        match dom.role(child) {
            Some(Role::Slug) => {
                if *count == target {
                    return Ok(Some(DomPosition::new(child, 0)));
                }
            }
            Some(Role::Marker(_) | Role::NestedSurface | Role::Highlight) => {}
            Some(Role::View(leaf)) => {
                let length = ctx.outer_length(ctx.view(*leaf)?);
                if target == *count {
                    return Ok(Some(DomPosition::new(element, index)));
                }
                if target < *count + length {
                    let index = if target - *count <= length / 2 {
                        index
                    } else {
                        index + 1
                    };
                    return Ok(Some(DomPosition::new(element, index)));
                }
                *count += length;
            }
            _ => {
                if let Some(position) = walk_content(ctx, child, target, count)? {
                    return Ok(Some(position));
                }
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::annotation::Annotation;
    use crate::model::selection::Selection;
    use crate::tests::{Mounted, mixed_document};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(3)]
    #[case(4)]
    #[case(5)]
    #[case(7)]
    #[case(8)]
    #[case(9)]
    #[case(11)]
    #[case(12)]
    #[case(13)]
    #[case(14)]
    #[case(15)]
    #[case(16)]
    #[case(17)]
    #[case(18)]
    fn test_offset_round_trip(#[case] offset: usize) {
        let mounted = Mounted::new(mixed_document());
        let ctx = mounted.ctx();

        let position = position_at(&ctx, offset).expect("position");
        assert_eq!(offset_at(&ctx, position), Ok(offset));
    }

    #[rstest]
    #[case(6, 5)]
    #[case(10, 9)]
    fn test_offsets_inside_leaves_snap_outside(#[case] offset: usize, #[case] snapped: usize) {
        let mounted = Mounted::new(mixed_document());
        let ctx = mounted.ctx();

        let position = position_at(&ctx, offset).expect("position");
        assert_eq!(offset_at(&ctx, position), Ok(snapped));
    }

    #[test]
    fn test_text_boundary_prefers_left_node() {
        let mounted = Mounted::new(mixed_document());
        let ctx = mounted.ctx();

        let position = position_at(&ctx, 3).expect("position");
        assert!(mounted.dom.is_text(position.node));
        assert_eq!(mounted.dom.text(position.node), "ab");
        assert_eq!(position.offset, 2);
    }

    #[test]
    fn test_slot_maps_to_the_offset_it_stands_for() {
        let mounted = Mounted::new(mixed_document());
        let ctx = mounted.ctx();
        let position = position_at(&ctx, 11).expect("position");

        assert!(mounted.dom.is_slug(position.node));
        let filler = mounted.dom.child(position.node, 0).expect("filler");
        assert_eq!(offset_at(&ctx, DomPosition::new(filler, 1)), Ok(11));
    }

    #[test]
    fn test_position_inside_leaf_maps_to_leaf_offset() {
        let mounted = Mounted::new(mixed_document());
        let ctx = mounted.ctx();
        let document = mounted.model.document();
        let image = document.children(document.root())[1];
        let view = mounted.views.for_model(image).expect("view");
        let figure = mounted.views.element(view).expect("element");

        assert_eq!(offset_at(&ctx, DomPosition::new(figure, 1)), Ok(9));
    }

    #[test]
    fn test_out_of_range_errors() {
        let mounted = Mounted::new(mixed_document());
        let ctx = mounted.ctx();
        let root = ctx.root_element().expect("root");

        assert_eq!(
            position_at(&ctx, 19),
            Err(PositionError::LinearOffsetOutOfRange { offset: 19, len: 18 })
        );
        assert_eq!(
            offset_at(&ctx, DomPosition::new(root, 99)),
            Err(PositionError::OffsetOutOfRange { offset: 99, len: 5 })
        );
        let detached = mounted.dom.body() + 10_000;
        assert_eq!(
            offset_at(&ctx, DomPosition::new(detached, 0)),
            Err(PositionError::NotAttached)
        );
    }

    #[test]
    fn test_empty_marker_pair_resolves_between_markers() {
        let mut mounted = Mounted::new(mixed_document());
        let paragraph = mounted.view_for_offset(1);
        mounted.model.set_selection(Selection::collapsed(3));
        mounted
            .model
            .toggle_insertion_annotation(Annotation::new("bold"));
        mounted.renderer(true).render(paragraph).expect("render");

        let ctx = mounted.ctx();
        let holder = mounted.markers.holder().expect("holder");
        let position = position_at(&ctx, 3).expect("position");
        assert_eq!(
            Some(position),
            mounted.dom.position_after(holder.pre)
        );
        assert_eq!(offset_at(&ctx, position), Ok(3));
        // Markers are transparent for the offsets around them
        assert_eq!(offset_at(&ctx, position_at(&ctx, 4).expect("4")), Ok(4));
    }
}
