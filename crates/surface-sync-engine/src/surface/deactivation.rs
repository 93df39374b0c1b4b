//! Deactivation: the surface keeps its selection visible (as a highlight)
//! while host focus is on something else that edits the document, such as
//! an inspector or a dialog.

use log::debug;

use crate::error::SurfaceResult;
use crate::host::dom::Role;
use crate::surface::{Dispatch, Surface};

impl Surface {
    pub fn deactivate(&mut self) -> SurfaceResult<()> {
        if self.deactivated {
            return Ok(());
        }
        // Commit anything typed since the last tick first
        self.defer(Dispatch::Poll);
        self.flush()?;

        self.deactivated = true;
        self.focus_left = false;
        self.observer.disable();
        self.observer.timer_mut().stop();
        self.render_highlight();
        self.dom.set_selection(None);
        debug!("surface deactivated");
        Ok(())
    }

    /// Restore the native selection from the model. If focus went somewhere
    /// else meanwhile, the observer starts over from the model too.
    pub fn activate(&mut self) -> SurfaceResult<()> {
        if !self.deactivated {
            return Ok(());
        }
        self.deactivated = false;
        self.clear_highlight();
        self.observer.enable();
        if self.focus_left {
            self.observer.clear();
            self.focus_left = false;
        }
        self.show_selection(self.model.selection())?;
        if self.dom.has_focus() {
            self.observer.timer_mut().start();
        }
        debug!("surface activated");
        Ok(())
    }

    /// Visual-only stand-in for the native selection, outside the root
    pub(crate) fn render_highlight(&mut self) {
        self.clear_highlight();
        let Some(range) = self.model.selection().range() else {
            return;
        };
        let highlight = self.dom.create_element("div", Role::Highlight);
        self.dom.set_attribute(highlight, "class", "highlight");
        self.dom
            .set_attribute(highlight, "data-from", &range.start().to_string());
        self.dom
            .set_attribute(highlight, "data-to", &range.end().to_string());
        let body = self.dom.body();
        self.dom.append_child(body, highlight);
        self.highlight = Some(highlight);
    }

    fn clear_highlight(&mut self) {
        if let Some(highlight) = self.highlight.take() {
            self.dom.detach(highlight);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::host::event::{Key, KeyOutcome};
    use crate::model::selection::{Range, Selection};
    use crate::surface::tests::focused_surface;
    use crate::tests::mixed_document;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_restores_selection_and_tree() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        surface
            .apply_model_change(None, Some(Selection::Linear(Range::new(2, 4))))
            .expect("select");
        let html = surface.html();
        let native = surface.dom().selection();

        surface.deactivate().expect("deactivate");
        assert!(surface.is_deactivated());
        assert_eq!(surface.dom().selection(), None);
        let body = surface.dom().body();
        assert!(
            surface
                .dom()
                .serialize(body)
                .ends_with(r#"<div class="highlight" data-from="2" data-to="4"></div></body>"#)
        );
        assert_eq!(surface.press(Key::Char('z')).expect("press"), KeyOutcome::Handled);

        surface.activate().expect("activate");
        assert_eq!(surface.html(), html);
        assert_eq!(surface.dom().selection(), native);
        assert_eq!(surface.selection(), Selection::Linear(Range::new(2, 4)));
        assert!(!surface.dom().serialize(body).contains("highlight"));
    }

    #[test]
    fn test_focus_leaving_while_deactivated_resets_the_observer() {
        let mut surface = focused_surface(mixed_document(), Vec::new());
        surface
            .apply_model_change(None, Some(Selection::collapsed(14)))
            .expect("select");

        surface.deactivate().expect("deactivate");
        surface.blur().expect("blur");
        surface.focus().expect("focus");
        surface.activate().expect("activate");

        let state = surface.observer().range_state().expect("snapshot");
        assert_eq!(state.model_range, Some(Range::collapsed(14)));
        assert!(surface.observer().timer().is_running());
    }
}
