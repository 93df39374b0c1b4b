use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SurfaceError, SurfaceResult};
use crate::model::document::ModelDocument;
use crate::model::linear::LinearItem;
use crate::model::selection::Selection;
use crate::model::surface::insertion_annotations_at;
use crate::model::transaction::Transaction;
use crate::surface::Surface;

/// What a copy hands to the host clipboard: the linear slice, keyed so a
/// paste can tell it came from this surface, plus plain text for everyone
/// else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardPayload {
    pub key: String,
    pub items: Vec<LinearItem>,
    pub text: String,
}

/// Copies staged by one surface. Keys carry the surface's own id, so a key
/// staged elsewhere never matches here.
#[derive(Debug)]
pub(crate) struct Clipboard {
    id: Uuid,
    counter: u64,
    staged: Option<ClipboardPayload>,
}

impl Default for Clipboard {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            counter: 0,
            staged: None,
        }
    }
}

impl Clipboard {
    fn stage(&mut self, items: Vec<LinearItem>, text: String) -> ClipboardPayload {
        self.counter += 1;
        let payload = ClipboardPayload {
            key: format!("surface-clipboard-{}-{}", self.id, self.counter),
            items,
            text,
        };
        self.staged = Some(payload.clone());
        payload
    }

    fn staged(&self, key: &str) -> Option<&ClipboardPayload> {
        self.staged.as_ref().filter(|payload| payload.key == key)
    }
}

/// Text of the items, one line per content branch
fn plain_text(document: &ModelDocument, items: &[LinearItem]) -> String {
    let mut text = String::new();
    for item in items {
        match item {
            LinearItem::Text { ch, .. } => text.push(*ch),
            LinearItem::Close(node_type)
                if document
                    .registry()
                    .node(node_type)
                    .is_ok_and(|spec| spec.content) =>
            {
                text.push('\n');
            }
            _ => {}
        }
    }
    text.trim_end_matches('\n').to_string()
}

impl Surface {
    /// Copy the selection; `None` for a caret
    pub fn copy(&mut self) -> Option<ClipboardPayload> {
        let range = self
            .model
            .selection()
            .range()
            .filter(|range| !range.is_collapsed())?;
        let document = self.model.document();
        let items = document.data().slice(range.start(), range.end()).to_vec();
        let text = plain_text(document, &items);
        let payload = self.clipboard.stage(items, text);
        debug!("copied {} items as {}", payload.items.len(), payload.key);
        Some(payload)
    }

    pub fn cut(&mut self) -> SurfaceResult<Option<ClipboardPayload>> {
        let Some(payload) = self.copy() else {
            return Ok(None);
        };
        if let Some(range) = self.model.selection().range() {
            self.remove_selected(range)?;
        }
        Ok(Some(payload))
    }

    /// Paste over the selection. A `key` matching the last copy pastes the
    /// copied items; anything else (or items that do not fit here) pastes
    /// `text`, with each line break starting a new paragraph.
    pub fn paste(&mut self, key: Option<&str>, text: &str) -> SurfaceResult<()> {
        let Some(range) = self.model.selection().range() else {
            return Ok(());
        };
        let Some(caret) = self.remove_selected(range)? else {
            return Ok(());
        };

        if let Some(payload) = key.and_then(|key| self.clipboard.staged(key)).cloned() {
            let after = caret + payload.items.len();
            let tx = Transaction::insertion(caret, payload.items);
            match self.apply_model_change(Some(&tx), Some(Selection::collapsed(after))) {
                Ok(()) => return Ok(()),
                Err(SurfaceError::Model(err)) => {
                    debug!("copied items do not fit at {caret} ({err}), pasting text");
                }
                Err(err) => return Err(err),
            }
        }
        self.paste_text(caret, text)
    }

    fn paste_text(&mut self, caret: usize, text: &str) -> SurfaceResult<()> {
        let mut caret = self.ensure_content_branch(caret)?;
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                let split = Transaction::split(self.model.document(), caret)?;
                caret += 2;
                self.apply_model_change(Some(&split), Some(Selection::collapsed(caret)))?;
            }
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let annotations = insertion_annotations_at(self.model.document(), caret);
            let tx = Transaction::insert_text(caret, line, &annotations);
            caret += line.chars().count();
            self.apply_model_change(Some(&tx), Some(Selection::collapsed(caret)))?;
        }
        Ok(())
    }
}
