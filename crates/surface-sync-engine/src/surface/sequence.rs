use regex::Regex;

use crate::error::{SurfaceError, SurfaceResult};
use crate::model::document::ModelDocument;
use crate::model::linear::LinearItem;
use crate::surface::config::SequenceSpec;

/// A compiled editing sequence, anchored to the caret.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub name: String,
    regex: Regex,
    pub replacement: Option<String>,
}

/// A sequence that matched; offsets are char offsets into the searched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceMatch {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub replacement: Option<String>,
}

impl Sequence {
    pub fn compile(spec: &SequenceSpec) -> SurfaceResult<Self> {
        let regex =
            Regex::new(&format!("(?:{})$", spec.pattern)).map_err(|source| {
                SurfaceError::InvalidSequence {
                    name: spec.name.clone(),
                    source,
                }
            })?;
        Ok(Self {
            name: spec.name.clone(),
            regex,
            replacement: spec.replacement.clone(),
        })
    }

    /// Match against text ending at the caret
    pub fn find(&self, text: &str) -> Option<SequenceMatch> {
        let found = self.regex.find(text)?;
        let start = text[..found.start()].chars().count();
        Some(SequenceMatch {
            name: self.name.clone(),
            start,
            end: start + found.as_str().chars().count(),
            replacement: self.replacement.clone(),
        })
    }
}

pub fn compile_all(specs: &[SequenceSpec]) -> SurfaceResult<Vec<Sequence>> {
    specs.iter().map(Sequence::compile).collect()
}

/// Text of `start..end` with one U+FFFC per non-text item, so char offsets
/// line up with linear offsets
pub fn text_with_objects(document: &ModelDocument, start: usize, end: usize) -> String {
    document
        .data()
        .slice(start, end)
        .iter()
        .map(|item| match item {
            LinearItem::Text { ch, .. } => *ch,
            _ => '\u{FFFC}',
        })
        .collect()
}
