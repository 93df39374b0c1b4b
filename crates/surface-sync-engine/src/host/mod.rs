//! The host side: the editable tree, its native selection, input events and
//! the editing the platform performs by itself.

pub mod dom;
pub mod event;
pub mod native;

pub use dom::{Dom, DomId, DomNode, DomNodeKind, DomPosition, MarkerSide, NativeSelection, Role};
pub use event::{Key, KeyEvent, KeyOutcome};
pub use native::{CaretMap, Direction, NativePlatform, Step, wrap_text_in_plain};
