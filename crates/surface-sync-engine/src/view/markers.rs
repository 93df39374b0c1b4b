use log::debug;

use crate::error::InvariantViolation;
use crate::host::dom::DomId;
use crate::model::annotation::AnnotationSet;
use crate::view::node::ViewId;

/// The content branch currently holding the boundary markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerHolder {
    pub branch: ViewId,
    /// Insertion annotations the markers were rendered for
    pub annotations: AnnotationSet,
    pub pre: DomId,
    pub post: DomId,
}

/// Which branch (if any) holds the boundary markers, system-wide.
///
/// `claiming` guards against a revoked holder re-claiming while it is being
/// forced to re-render. `pending_release` is a queued re-render of a holder
/// the caret left; a newer claim supersedes it.
#[derive(Debug, Clone, Default)]
pub struct MarkerState {
    holder: Option<MarkerHolder>,
    claiming: bool,
    pending_release: Option<ViewId>,
}

impl MarkerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self) -> Option<&MarkerHolder> {
        self.holder.as_ref()
    }

    pub fn holder_branch(&self) -> Option<ViewId> {
        self.holder.as_ref().map(|h| h.branch)
    }

    pub fn is_held_by(&self, branch: ViewId) -> bool {
        self.holder_branch() == Some(branch)
    }

    /// Start a claim. Fails if a claim is already being processed.
    ///
    /// Returns the previous holder that must be re-rendered without markers.
    pub(crate) fn begin_claim(&mut self, branch: ViewId) -> Result<Option<ViewId>, InvariantViolation> {
        if self.claiming {
            return Err(InvariantViolation::MarkerRecursion);
        }
        self.claiming = true;
        self.pending_release = None;
        Ok(self.holder_branch().filter(|&old| old != branch))
    }

    pub(crate) fn finish_claim(&mut self, holder: MarkerHolder) {
        debug!(
            "markers claimed by view {} for {:?}",
            holder.branch,
            holder.annotations.names()
        );
        self.holder = Some(holder);
        self.claiming = false;
    }

    /// Abort a claim after an error so later claims are not blocked
    pub(crate) fn abort_claim(&mut self) {
        self.claiming = false;
    }

    /// Forget the holder if it is `branch`
    pub(crate) fn release(&mut self, branch: ViewId) {
        if self.is_held_by(branch) {
            debug!("markers released by view {branch}");
            self.holder = None;
        }
    }

    /// Drop all marker state, e.g. on teardown
    pub fn clear(&mut self) {
        self.holder = None;
        self.pending_release = None;
        self.claiming = false;
    }

    pub(crate) fn queue_release(&mut self, branch: ViewId) -> bool {
        if self.is_held_by(branch) {
            self.pending_release = Some(branch);
            return true;
        }
        false
    }

    /// Consume a queued release; false if it was superseded by a claim
    pub(crate) fn take_pending_release(&mut self, branch: ViewId) -> bool {
        if self.pending_release == Some(branch) {
            self.pending_release = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(branch: ViewId) -> MarkerHolder {
        MarkerHolder {
            branch,
            annotations: AnnotationSet::new(),
            pre: 10,
            post: 11,
        }
    }

    #[test]
    fn test_claim_reports_previous_holder() {
        let mut state = MarkerState::new();
        assert_eq!(state.begin_claim(1), Ok(None));
        state.finish_claim(holder(1));

        assert_eq!(state.begin_claim(2), Ok(Some(1)));
        state.finish_claim(holder(2));
        assert!(state.is_held_by(2));
    }

    #[test]
    fn test_reentrant_claim_is_an_error() {
        let mut state = MarkerState::new();
        assert_eq!(state.begin_claim(1), Ok(None));
        assert_eq!(state.begin_claim(2), Err(InvariantViolation::MarkerRecursion));
    }

    #[test]
    fn test_claim_supersedes_pending_release() {
        let mut state = MarkerState::new();
        state.begin_claim(1).expect("claim");
        state.finish_claim(holder(1));

        assert!(state.queue_release(1));
        state.begin_claim(1).expect("reclaim");
        state.finish_claim(holder(1));
        assert!(!state.take_pending_release(1));
    }
}
