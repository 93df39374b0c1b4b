use thiserror::Error;

/// A surface tree position or linear offset could not be resolved.
///
/// These are expected to never occur in correct operation. The single call
/// site that tolerates them is the range snapshot, which treats a selection it
/// cannot resolve as "no selection in this document".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("position is not attached to this document")]
    NotAttached,

    #[error("position has no owning tree ancestor")]
    NoOwningAncestor,

    #[error("local offset {offset} out of range (length {len})")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("linear offset {offset} out of range (document length {len})")]
    LinearOffsetOutOfRange { offset: usize, len: usize },
}

/// Programming errors in the orchestration discipline. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("model selection change requested while another one is in flight")]
    NestedSelectionChange,

    #[error("boundary markers claimed while a previous claim was still being revoked")]
    MarkerRecursion,

    #[error("render lock released more times than it was taken")]
    UnbalancedRenderLock,

    #[error("native caret is neither between nor outside the boundary markers")]
    UnexpectedMarkerState,
}

/// Schema/registry mismatch: a type the registry does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("unknown annotation type: {0}")]
    UnknownAnnotationType(String),
}

/// A transaction could not be applied to the linear model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("splice {at}+{remove} out of range (document length {len})")]
    SpliceOutOfRange { at: usize, remove: usize, len: usize },

    #[error("unbalanced linear data at offset {0}")]
    Unbalanced(usize),

    #[error("text at offset {0} is outside a content branch")]
    MisplacedText(usize),

    #[error("node type {child} cannot be placed inside {parent}")]
    InvalidParent { child: String, parent: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Umbrella error for the editing surface.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("invalid editing sequence {name}: {source}")]
    InvalidSequence { name: String, source: regex::Error },

    #[error("view for model node {0} does not exist")]
    MissingView(usize),
}

pub type SurfaceResult<T> = Result<T, SurfaceError>;
