use log::trace;

use crate::model::selection::Range;
use crate::observer::range_state::RangeState;
use crate::view::node::ViewId;
use crate::view::offset::ViewContext;

/// Text, hash and model range of the owning branch at one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSnapshot {
    pub text: String,
    pub hash: String,
    pub range: Option<Range>,
}

/// Change notifications, emitted in this order within one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    ContentChange {
        node: ViewId,
        previous: ContentSnapshot,
        next: ContentSnapshot,
    },
    BranchNodeChange {
        old: Option<ViewId>,
        new: Option<ViewId>,
    },
    RangeChange {
        old: Option<Range>,
        new: Option<Range>,
    },
    SlugEnter,
    SlugLeave,
}

/// Interval timer driven by the host calling [`PollTimer::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTimer {
    interval_ms: u64,
    elapsed_ms: u64,
    running: bool,
}

impl PollTimer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            elapsed_ms: 0,
            running: false,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
        self.elapsed_ms = 0;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.elapsed_ms = 0;
    }

    /// Let `ms` pass; returns how many polls are due
    pub fn advance(&mut self, ms: u64) -> u64 {
        if !self.running {
            return 0;
        }
        self.elapsed_ms += ms;
        let due = self.elapsed_ms / self.interval_ms;
        self.elapsed_ms %= self.interval_ms;
        due
    }
}

/// Polls the native selection and the owning branch's rendering, diffing
/// each [`RangeState`] against the previous one.
#[derive(Debug, Clone)]
pub struct SurfaceObserver {
    range_state: Option<RangeState>,
    disabled: bool,
    timer: PollTimer,
}

impl SurfaceObserver {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            range_state: None,
            disabled: false,
            timer: PollTimer::new(interval_ms),
        }
    }

    pub fn range_state(&self) -> Option<&RangeState> {
        self.range_state.as_ref()
    }

    pub fn timer(&self) -> &PollTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut PollTimer {
        &mut self.timer
    }

    /// Forget the last snapshot; the next poll starts from scratch
    pub fn clear(&mut self) {
        self.range_state = None;
    }

    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn poll_once(&mut self, ctx: &ViewContext<'_>) -> Vec<ObserverEvent> {
        self.poll(ctx, true, false)
    }

    /// Take a snapshot without reporting anything, e.g. after the surface
    /// itself moved the selection
    pub fn poll_once_no_callback(&mut self, ctx: &ViewContext<'_>) {
        self.poll(ctx, false, false);
    }

    /// Poll for selection changes only, keeping the previous text
    pub fn poll_once_selection(&mut self, ctx: &ViewContext<'_>) -> Vec<ObserverEvent> {
        self.poll(ctx, true, true)
    }

    fn poll(&mut self, ctx: &ViewContext<'_>, emit: bool, selection_only: bool) -> Vec<ObserverEvent> {
        if self.disabled {
            return Vec::new();
        }
        let old = self.range_state.take();
        let new = RangeState::new(old.as_ref(), ctx, selection_only);
        let events = if emit {
            Self::events(old.as_ref(), &new)
        } else {
            Vec::new()
        };
        if !events.is_empty() {
            trace!("observer events: {events:?}");
        }
        self.range_state = Some(new);
        events
    }

    fn events(old: Option<&RangeState>, new: &RangeState) -> Vec<ObserverEvent> {
        let mut events = Vec::new();
        let old_range = old.and_then(|o| o.model_range);

        if new.content_changed
            && let (Some(node), Some(old)) = (new.node, old)
        {
            events.push(ObserverEvent::ContentChange {
                node,
                previous: ContentSnapshot {
                    text: old.text.clone().unwrap_or_default(),
                    hash: old.hash.clone().unwrap_or_default(),
                    range: old.model_range,
                },
                next: ContentSnapshot {
                    text: new.text.clone().unwrap_or_default(),
                    hash: new.hash.clone().unwrap_or_default(),
                    range: new.model_range,
                },
            });
        }
        if new.branch_node_changed {
            events.push(ObserverEvent::BranchNodeChange {
                old: old.and_then(|o| o.node),
                new: new.node,
            });
        }
        if new.selection_changed {
            let same = match (old_range, new.model_range) {
                (Some(a), Some(b)) => a.equals_selection(&b),
                (None, None) => true,
                _ => false,
            };
            if !same {
                events.push(ObserverEvent::RangeChange {
                    old: old_range,
                    new: new.model_range,
                });
            }
        }
        if new.entered_slug {
            events.push(ObserverEvent::SlugEnter);
        }
        if new.left_slug {
            events.push(ObserverEvent::SlugLeave);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::dom::{DomPosition, NativeSelection};
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
    fn test_timer_counts_due_polls() {
        let mut timer = PollTimer::new(250);
        assert_eq!(timer.advance(1000), 0);
        timer.start();
        assert_eq!(timer.advance(600), 2);
        assert_eq!(timer.advance(150), 1);
        timer.stop();
        assert_eq!(timer.advance(500), 0);
    }

    #[test]
    fn test_events_in_order_for_typing() {
        let mut mounted = Mounted::new(mixed_document());
        let mut observer = SurfaceObserver::new(250);
        select(&mut mounted, 3);
        observer.poll_once_no_callback(&mounted.ctx());

        let caret = mounted.dom.selection().expect("selection").focus;
        mounted.dom.insert_text(caret.node, caret.offset, "!");
        mounted.dom.set_selection(Some(NativeSelection::collapsed(DomPosition::new(
            caret.node,
            caret.offset + 1,
        ))));
        let events = observer.poll_once(&mounted.ctx());

        let paragraph = mounted.view_for_offset(1);
        assert_eq!(
            events,
            vec![
                ObserverEvent::ContentChange {
                    node: paragraph,
                    previous: ContentSnapshot {
                        text: "abcd\u{2603}\u{2603}e".to_string(),
                        hash: "<p>#<b>#</b><img></img>#</p>".to_string(),
                        range: Some(Range::collapsed(3)),
                    },
                    next: ContentSnapshot {
                        text: "ab!cd\u{2603}\u{2603}e".to_string(),
                        hash: "<p>#<b>#</b><img></img>#</p>".to_string(),
                        range: Some(Range::collapsed(4)),
                    },
                },
                ObserverEvent::RangeChange {
                    old: Some(Range::collapsed(3)),
                    new: Some(Range::collapsed(4)),
                },
            ]
        );
    }

    #[test]
    fn test_equivalent_position_is_not_a_range_change() {
        let mut mounted = Mounted::new(mixed_document());
        let mut observer = SurfaceObserver::new(250);
        select(&mut mounted, 3);
        observer.poll_once_no_callback(&mounted.ctx());

        // Start of "cd" inside <b> is the same model offset as the end of "ab"
        let paragraph = mounted.views.element(mounted.view_for_offset(1)).expect("p");
        let bold = mounted.dom.child(paragraph, 1).expect("b");
        let cd = mounted.dom.child(bold, 0).expect("cd");
        mounted
            .dom
            .set_selection(Some(NativeSelection::collapsed(DomPosition::new(cd, 0))));

        assert_eq!(observer.poll_once(&mounted.ctx()), vec![]);
        assert!(observer.range_state().is_some_and(|s| s.selection_changed));
    }

    #[test]
    fn test_disabled_observer_keeps_its_snapshot() {
        let mut mounted = Mounted::new(mixed_document());
        let mut observer = SurfaceObserver::new(250);
        select(&mut mounted, 3);
        observer.poll_once_no_callback(&mounted.ctx());
        let before = observer.range_state().cloned();

        observer.disable();
        select(&mut mounted, 14);
        assert_eq!(observer.poll_once(&mounted.ctx()), vec![]);
        assert_eq!(observer.range_state().cloned(), before);

        observer.enable();
        let events = observer.poll_once(&mounted.ctx());
        assert!(matches!(events[0], ObserverEvent::BranchNodeChange { .. }));
        assert!(matches!(events[1], ObserverEvent::RangeChange { .. }));
    }
}
