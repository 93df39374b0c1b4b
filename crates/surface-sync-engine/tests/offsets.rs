mod common;

use common::{MIXED, focused, surface};
use pretty_assertions::assert_eq;
use rstest::rstest;
use surface_sync_engine::{DomPosition, Key, KeyEvent, PositionError, Range, Selection};

// Offsets inside a leaf (6, 10) snap to its edge and are not expected back
#[rstest]
#[case::document_start(0)]
#[case::paragraph_start(1)]
#[case::inside_plain_text(2)]
#[case::before_bold(3)]
#[case::inside_bold(4)]
#[case::before_inline_image(5)]
#[case::after_inline_image(7)]
#[case::paragraph_end(8)]
#[case::before_block_image(9)]
#[case::block_slot(11)]
#[case::list_item_text(14)]
#[case::document_end(18)]
fn test_offsets_survive_the_round_trip(#[case] offset: usize) {
    let surface = surface(MIXED);

    let position = surface.get_position_at(offset).expect("position");
    assert_eq!(surface.get_offset_at(position), Ok(offset));
}

#[test]
fn test_every_tree_position_has_an_offset() {
    let surface = surface(MIXED);
    let dom = surface.dom();
    let root = surface.root_element().expect("root");
    let len = surface.document().len();

    for node in dom.descendants(root) {
        for offset in 0..=dom.length(node) {
            let linear = surface
                .get_offset_at(DomPosition::new(node, offset))
                .unwrap_or_else(|err| panic!("({node}, {offset}): {err}"));
            assert!(linear <= len, "({node}, {offset}) -> {linear}");
        }
    }
}

#[test]
fn test_positions_outside_the_document_are_errors() {
    let surface = surface(MIXED);
    let body = surface.dom().body();

    assert_eq!(
        surface.get_offset_at(DomPosition::new(body, 0)),
        Err(PositionError::NotAttached)
    );
    assert_eq!(
        surface.get_position_at(19),
        Err(PositionError::LinearOffsetOutOfRange { offset: 19, len: 18 })
    );
}

#[test]
fn test_markers_do_not_shift_offsets() {
    let mut surface = focused(MIXED);
    surface
        .apply_model_change(None, Some(Selection::collapsed(3)))
        .expect("select");
    surface
        .press(KeyEvent::new(Key::Char('i')).with_ctrl())
        .expect("press");
    assert!(surface.markers().holder().is_some());

    for offset in [1, 3, 5, 8] {
        let position = surface.get_position_at(offset).expect("position");
        assert_eq!(surface.get_offset_at(position), Ok(offset));
    }
    let native = surface.dom().selection().expect("native selection");
    assert_eq!(surface.get_offset_at(native.focus), Ok(3));
    assert_eq!(
        surface.selection(),
        Selection::Linear(Range::collapsed(3))
    );
}
