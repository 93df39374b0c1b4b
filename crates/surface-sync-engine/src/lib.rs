pub mod error;
pub mod host;
pub mod io;
pub mod model;
pub mod observer;
pub mod surface;
pub mod view;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use error::{
    InvariantViolation, ModelError, PositionError, RegistryError, SurfaceError, SurfaceResult,
};
pub use host::{Dom, DomPosition, Key, KeyEvent, KeyOutcome, NativeSelection};
pub use io::{parse_text, read_document, to_text, write_document};
pub use model::{DataBuilder, LinearData, ModelDocument, Range, Selection, TypeRegistry};
pub use surface::{ClipboardPayload, SequenceSpec, Surface, SurfaceConfig, SurfaceNotification};
