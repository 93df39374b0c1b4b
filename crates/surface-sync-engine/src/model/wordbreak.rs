use unicode_segmentation::UnicodeSegmentation;

use crate::model::document::ModelDocument;
use crate::model::linear::LinearItem;

/// Stands in for inline leaf items when building text for segmentation
const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Char offsets at which UAX #29 places a word boundary, including both ends.
pub fn word_breaks(text: &str) -> Vec<usize> {
    let mut breaks = Vec::new();
    let mut chars = 0;
    let mut last_byte = 0;
    for (byte, _) in text.split_word_bound_indices() {
        chars += text[last_byte..byte].chars().count();
        last_byte = byte;
        breaks.push(chars);
    }
    chars += text[last_byte..].chars().count();
    if breaks.last() != Some(&chars) {
        breaks.push(chars);
    }
    if breaks.first() != Some(&0) {
        breaks.insert(0, 0);
    }
    breaks
}

/// Whether a caret at char `offset` sits on a word boundary.
pub fn is_word_break(text: &str, offset: usize) -> bool {
    word_breaks(text).binary_search(&offset).is_ok()
}

/// Whether the linear `offset` is on a word boundary within its content branch.
///
/// Positions outside any content branch are treated as boundaries.
pub fn is_model_word_break(document: &ModelDocument, offset: usize) -> bool {
    let Some(branch) = document.content_branch_at(offset) else {
        return true;
    };
    let (start, end) = document.inner_range(branch);
    let text: String = document
        .data()
        .slice(start, end)
        .iter()
        .map(|item| match item {
            LinearItem::Text { ch, .. } => *ch,
            _ => OBJECT_REPLACEMENT,
        })
        .collect();
    is_word_break(&text, offset - start)
}
