use log::debug;

use crate::error::ModelError;
use crate::model::annotation::{Annotation, AnnotationSet};
use crate::model::document::{ModelDocument, ModelEvent};
use crate::model::linear::LinearItem;
use crate::model::selection::{Range, Selection};
use crate::model::transaction::Transaction;
use crate::model::wordbreak::is_model_word_break;

/// What a model change did, for the surface to react to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelChange {
    pub events: Vec<ModelEvent>,
    pub selection_changed: bool,
    pub insertion_annotations_changed: bool,
}

/// The document plus its selection and pending insertion annotations.
#[derive(Debug, Clone)]
pub struct ModelSurface {
    document: ModelDocument,
    selection: Selection,
    /// Set by annotation toggles on a collapsed selection; cleared whenever
    /// the selection moves
    insertion_override: Option<AnnotationSet>,
}

impl ModelSurface {
    pub fn new(document: ModelDocument) -> Self {
        Self {
            document,
            selection: Selection::Null,
            insertion_override: None,
        }
    }

    pub fn document(&self) -> &ModelDocument {
        &self.document
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Commit `tx` and move the selection. With no explicit selection the
    /// current one is translated through the transaction.
    pub fn change(
        &mut self,
        tx: Option<&Transaction>,
        selection: Option<Selection>,
    ) -> Result<ModelChange, ModelError> {
        let before = self.insertion_annotations();
        let mut change = ModelChange::default();
        if let Some(tx) = tx {
            change.events = self.document.commit(tx)?;
        }
        let next = match (selection, tx) {
            (Some(selection), _) => selection,
            (None, Some(tx)) => match self.selection {
                Selection::Linear(range) => Selection::Linear(tx.translate_range(range)),
                Selection::Null => Selection::Null,
            },
            (None, None) => self.selection,
        };
        change.selection_changed = self.apply_selection(next);
        change.insertion_annotations_changed = self.insertion_annotations() != before;
        Ok(change)
    }

    pub fn set_selection(&mut self, selection: Selection) -> ModelChange {
        let before = self.insertion_annotations();
        let selection_changed = self.apply_selection(selection);
        ModelChange {
            events: Vec::new(),
            selection_changed,
            insertion_annotations_changed: self.insertion_annotations() != before,
        }
    }

    fn apply_selection(&mut self, selection: Selection) -> bool {
        let len = self.document.len();
        let selection = match selection {
            Selection::Linear(range) if range.from > len || range.to > len => {
                debug!("clamping selection {range:?} to document length {len}");
                Selection::Linear(Range::new(range.from.min(len), range.to.min(len)))
            }
            other => other,
        };
        if selection == self.selection {
            return false;
        }
        self.selection = selection;
        self.insertion_override = None;
        true
    }

    /// Replace the annotations newly typed text will get. Returns whether
    /// the effective set changed.
    pub fn set_insertion_override(&mut self, annotations: AnnotationSet) -> bool {
        let before = self.insertion_annotations();
        self.insertion_override = Some(annotations);
        self.insertion_annotations() != before
    }

    pub fn has_insertion_override(&self) -> bool {
        self.insertion_override.is_some()
    }

    /// Toggle one annotation in the insertion set
    pub fn toggle_insertion_annotation(&mut self, annotation: Annotation) -> bool {
        let mut annotations = self.insertion_annotations();
        if annotations.contains_named(&annotation.name) {
            annotations.remove_named(&annotation.name);
        } else {
            annotations.push(annotation);
        }
        self.set_insertion_override(annotations)
    }

    /// Annotations that text typed at the current selection would carry
    pub fn insertion_annotations(&self) -> AnnotationSet {
        if let Some(annotations) = &self.insertion_override {
            return annotations.clone();
        }
        match self.selection {
            Selection::Linear(range) => insertion_annotations_at(&self.document, range.start()),
            Selection::Null => AnnotationSet::new(),
        }
    }
}

/// Annotations continuing at a collapsed caret.
///
/// Text takes the annotations of the unit to its left, or to its right at the
/// start of a branch. At a word boundary, annotations that split on word
/// breaks are dropped unless they also cover the unit to the right.
pub fn insertion_annotations_at(document: &ModelDocument, offset: usize) -> AnnotationSet {
    let Some(branch) = document.content_branch_at(offset) else {
        return AnnotationSet::new();
    };
    let (start, end) = document.inner_range(branch);
    let data = document.data();

    let left = if offset > start {
        match data.get(offset - 1) {
            Some(LinearItem::Close(_)) if offset >= start + 2 => data.annotations_at(offset - 2),
            other => other.and_then(LinearItem::annotations),
        }
    } else {
        None
    };
    let right = if offset < end {
        data.annotations_at(offset)
    } else {
        None
    };

    let mut annotations = left.or(right).cloned().unwrap_or_default();
    if is_model_word_break(document, offset) {
        let registry = document.registry();
        annotations.retain(|annotation| {
            let splits = registry
                .annotation(&annotation.name)
                .is_ok_and(|spec| spec.split_on_word_break);
            !splits || right.is_some_and(|r| r.contains(annotation))
        });
    }
    annotations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::linear::DataBuilder;
    use crate::model::registry::TypeRegistry;
    use pretty_assertions::assert_eq;

    fn surface(builder: DataBuilder) -> ModelSurface {
        ModelSurface::new(
            ModelDocument::new(builder.build(), TypeRegistry::standard()).expect("fixture"),
        )
    }

    #[test]
    fn test_left_annotations_win() {
        let doc = surface(
            DataBuilder::new()
                .open("paragraph")
                .annotated("ab", &["bold"])
                .text("cd")
                .close("paragraph"),
        );

        assert_eq!(insertion_annotations_at(doc.document(), 3).names(), vec!["bold"]);
        assert!(insertion_annotations_at(doc.document(), 4).is_empty());
        assert_eq!(insertion_annotations_at(doc.document(), 1).names(), vec!["bold"]);
    }

    #[test]
    fn test_link_is_not_continued_past_word_end() {
        let doc = surface(
            DataBuilder::new()
                .open("paragraph")
                .begin(Annotation::link("https://example.com"))
                .text("foo bar")
                .end("link")
                .close("paragraph"),
        );

        // "fo|o": inside the word keeps the link
        assert_eq!(insertion_annotations_at(doc.document(), 3).names(), vec!["link"]);
        // "foo|": the link also covers the space to the right
        assert_eq!(insertion_annotations_at(doc.document(), 4).names(), vec!["link"]);
        // "foo bar|": end of the run
        assert!(insertion_annotations_at(doc.document(), 8).is_empty());
    }

    #[test]
    fn test_override_cleared_on_selection_change() {
        let mut doc = surface(DataBuilder::new().paragraph("abc"));
        doc.set_selection(Selection::collapsed(2));

        assert!(doc.toggle_insertion_annotation(Annotation::new("bold")));
        assert_eq!(doc.insertion_annotations().names(), vec!["bold"]);

        let change = doc.set_selection(Selection::collapsed(3));
        assert!(change.selection_changed);
        assert!(change.insertion_annotations_changed);
        assert!(!doc.has_insertion_override());
    }

    #[test]
    fn test_change_translates_selection() {
        let mut doc = surface(DataBuilder::new().paragraph("abc"));
        doc.set_selection(Selection::collapsed(3));

        let change = doc
            .change(
                Some(&Transaction::insert_text(1, "xy", &AnnotationSet::new())),
                None,
            )
            .expect("change");

        assert!(change.selection_changed);
        assert_eq!(doc.selection(), Selection::Linear(Range::collapsed(5)));
    }
}
