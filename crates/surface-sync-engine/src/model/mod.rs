//! The linear document model the surface is synchronized with.
//!
//! The model is the source of truth: a flat sequence of Open/Close/Text items
//! ([`LinearData`]) plus a node tree derived from it ([`ModelDocument`]).
//! Edits are expressed as [`Transaction`]s and reported back as
//! [`ModelEvent`]s, which the view layer applies to the surface tree.

pub mod annotation;
pub mod document;
pub mod linear;
pub mod registry;
pub mod selection;
pub mod surface;
pub mod transaction;
pub mod wordbreak;

pub use annotation::{Annotation, AnnotationSet};
pub use document::{ModelDocument, ModelEvent, ModelNode, NodeId};
pub use linear::{DataBuilder, ElementData, LinearData, LinearItem};
pub use registry::{AnnotationTypeSpec, NodeTypeSpec, TypeRegistry};
pub use selection::{Range, Selection};
pub use surface::{ModelChange, ModelSurface, insertion_annotations_at};
pub use transaction::{Operation, Transaction};
