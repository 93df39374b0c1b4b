/*!
# Surface views

One view per model node, each owning one element of the surface tree.
Capabilities (branch, content, leaf, focusable, resizable) are optional
components on [`ViewNode`] rather than a type hierarchy.

- [`offset`] maps between surface positions and linear offsets.
- [`render`] builds views, applies model events and re-renders content
  branches, including the boundary marker claim.
- [`markers`] tracks which content branch holds the marker pair.
- [`text`] derives the rendered text and structural hash the observer diffs.
*/

pub mod markers;
pub mod node;
pub mod offset;
pub mod render;
pub mod text;

pub use markers::{MarkerHolder, MarkerState};
pub use node::{BranchState, FocusableState, ResizableState, ViewId, ViewNode, ViewTree};
pub use offset::{ViewContext, offset_at, position_at};
pub use render::{RenderContext, RenderedNode};
pub use text::{dom_hash, dom_text};
