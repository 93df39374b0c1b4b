use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::annotation::{Annotation, AnnotationSet};
use crate::model::document::ModelDocument;
use crate::model::linear::{ElementData, LinearItem};
use crate::model::selection::Range;

/// A single change to the linear data. Offsets refer to the data as left by
/// the previous operation in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Splice {
        at: usize,
        remove: usize,
        insert: Vec<LinearItem>,
    },
    Annotate {
        start: usize,
        end: usize,
        annotation: Annotation,
        set: bool,
    },
}

/// An ordered list of operations applied atomically per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    operations: Vec<Operation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn then(mut self, other: Transaction) -> Self {
        self.operations.extend(other.operations);
        self
    }

    pub fn insertion(at: usize, items: Vec<LinearItem>) -> Self {
        Self::replacement(Range::collapsed(at), items)
    }

    /// Insert `text` at `at`, every unit carrying `annotations`
    pub fn insert_text(at: usize, text: &str, annotations: &AnnotationSet) -> Self {
        Self::insertion(at, text_items(text, annotations))
    }

    pub fn removal(range: Range) -> Self {
        Self::replacement(range, Vec::new())
    }

    pub fn replacement(range: Range, items: Vec<LinearItem>) -> Self {
        let mut tx = Self::new();
        if range.is_collapsed() && items.is_empty() {
            return tx;
        }
        tx.push(Operation::Splice {
            at: range.start(),
            remove: range.len(),
            insert: items,
        });
        tx
    }

    /// Set or clear `annotation` over the range
    pub fn annotation(range: Range, annotation: Annotation, set: bool) -> Self {
        let mut tx = Self::new();
        if !range.is_collapsed() {
            tx.push(Operation::Annotate {
                start: range.start(),
                end: range.end(),
                annotation,
                set,
            });
        }
        tx
    }

    /// Split the content branch containing `at` into two siblings of the same type
    pub fn split(document: &ModelDocument, at: usize) -> Result<Self, ModelError> {
        let branch = document
            .content_branch_at(at)
            .ok_or(ModelError::MisplacedText(at))?;
        let element = document
            .element(branch)
            .cloned()
            .ok_or(ModelError::MisplacedText(at))?;
        let reopened = ElementData {
            annotations: AnnotationSet::new(),
            ..element
        };
        Ok(Self::insertion(
            at,
            vec![
                LinearItem::Close(reopened.node_type.clone()),
                LinearItem::Open(reopened),
            ],
        ))
    }

    /// Map an offset in the pre-transaction data to the post-transaction data.
    ///
    /// Offsets inside a removed span collapse onto the insertion. An offset
    /// exactly at an insertion point moves past the inserted items unless
    /// `exclude_insertion` is set.
    pub fn translate_offset(&self, offset: usize, exclude_insertion: bool) -> usize {
        let mut offset = offset;
        for operation in &self.operations {
            if let Operation::Splice { at, remove, insert } = operation {
                let (at, remove, added) = (*at, *remove, insert.len());
                if offset < at || (offset == at && exclude_insertion) {
                    continue;
                }
                if offset >= at + remove {
                    if offset == at && remove == 0 {
                        offset = at + added;
                    } else {
                        offset = offset - remove + added;
                    }
                } else if exclude_insertion {
                    offset = at;
                } else {
                    offset = at + added;
                }
            }
        }
        offset
    }

    /// Translate both ends, keeping direction. A collapsed range follows the
    /// insertion; an expanded one does not grow to include it.
    pub fn translate_range(&self, range: Range) -> Range {
        if range.is_collapsed() {
            return Range::collapsed(self.translate_offset(range.from, false));
        }
        let start = self.translate_offset(range.start(), false);
        let end = self.translate_offset(range.end(), true).max(start);
        if range.is_backwards() {
            Range::new(end, start)
        } else {
            Range::new(start, end)
        }
    }
}

pub fn text_items(text: &str, annotations: &AnnotationSet) -> Vec<LinearItem> {
    text.chars()
        .map(|ch| LinearItem::annotated(ch, annotations.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::before(2, false, 2)]
    #[case::at_insertion(5, false, 8)]
    #[case::at_insertion_excluded(5, true, 5)]
    #[case::after(9, false, 12)]
    fn test_translate_insertion(
        #[case] offset: usize,
        #[case] exclude: bool,
        #[case] expected: usize,
    ) {
        let tx = Transaction::insert_text(5, "abc", &AnnotationSet::new());
        assert_eq!(tx.translate_offset(offset, exclude), expected);
    }

    #[rstest]
    #[case::before(2, 2)]
    #[case::inside(6, 4)]
    #[case::at_end(8, 4)]
    #[case::after(10, 6)]
    fn test_translate_removal(#[case] offset: usize, #[case] expected: usize) {
        let tx = Transaction::removal(Range::new(4, 8));
        assert_eq!(tx.translate_offset(offset, false), expected);
    }

    #[test]
    fn test_empty_builders_produce_no_operations() {
        assert!(Transaction::removal(Range::collapsed(3)).is_empty());
        assert!(
            Transaction::annotation(Range::collapsed(3), Annotation::new("bold"), true).is_empty()
        );
    }

    #[test]
    fn test_translate_range_keeps_direction() {
        let tx = Transaction::insert_text(0, "xy", &AnnotationSet::new());
        assert_eq!(tx.translate_range(Range::new(5, 3)), Range::new(7, 5));
    }
}
