/*!
# Observing native edits

The platform edits the surface tree without telling the application. The
observer polls: each poll builds a [`RangeState`] from the live native
selection and the owning content branch's rendered text and structural hash,
diffs it against the previous one, and reports [`ObserverEvent`]s.

Content changes are turned into model edits with [`classify`], which prefers
a plain insertion or removal at the caret and otherwise falls back to
replacing the span between the common prefix and suffix.
*/

pub mod content_change;
pub mod range_state;
pub mod surface_observer;

pub use content_change::{ContentEdit, classify};
pub use range_state::RangeState;
pub use surface_observer::{ContentSnapshot, ObserverEvent, PollTimer, SurfaceObserver};
