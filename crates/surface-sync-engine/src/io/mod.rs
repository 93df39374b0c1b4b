//! Plain-text documents: a small line-based format for loading linear data
//! from disk and writing it back.
//!
//! ```text
//! # Heading
//!
//! A paragraph with *bold*, _italic_, a [link](https://example.com)
//! and an inline {img:icon.png} image.
//!
//! ![photo.jpg]
//!
//! - first item
//! - second item
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, bail};

use crate::model::annotation::{Annotation, AnnotationSet};
use crate::model::linear::{ElementData, LinearData, LinearItem};

/// Read a plain-text document and parse it into linear data
pub fn read_document(path: &Path) -> anyhow::Result<LinearData> {
    if !path.exists() {
        bail!("document not found: {}", path.display());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read document {}", path.display()))?;
    Ok(parse_text(&text))
}

/// Write linear data as plain text
pub fn write_document(path: &Path, data: &LinearData) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut text = to_text(data);
    text.push('\n');
    fs::write(path, text).with_context(|| format!("failed to write document {}", path.display()))
}

pub fn parse_text(text: &str) -> LinearData {
    let mut parser = Parser::default();
    for line in text.lines() {
        parser.line(line.trim_end());
    }
    parser.finish()
}

#[derive(Default)]
struct Parser {
    items: Vec<LinearItem>,
    paragraph: Vec<String>,
    in_list: bool,
}

impl Parser {
    fn line(&mut self, line: &str) {
        if line.is_empty() {
            self.flush_paragraph();
            self.close_list();
            return;
        }

        if let Some(text) = line.strip_prefix("- ") {
            self.flush_paragraph();
            if !self.in_list {
                self.items.push(LinearItem::Open(ElementData::new("list")));
                self.in_list = true;
            }
            self.items.push(LinearItem::Open(ElementData::new("listItem")));
            self.content_branch(ElementData::new("paragraph"), text);
            self.items.push(LinearItem::Close("listItem".to_string()));
            return;
        }
        self.close_list();

        if let Some((level, title)) = heading(line) {
            self.flush_paragraph();
            let element = ElementData::new("heading").with_attribute("level", level.to_string());
            self.content_branch(element, title);
        } else if let Some(src) = block_image(line) {
            self.flush_paragraph();
            self.items.push(LinearItem::Open(
                ElementData::new("image").with_attribute("src", src),
            ));
            self.items.push(LinearItem::Close("image".to_string()));
        } else {
            self.paragraph.push(line.to_string());
        }
    }

    fn content_branch(&mut self, element: ElementData, text: &str) {
        let node_type = element.node_type.clone();
        self.items.push(LinearItem::Open(element));
        push_inline(text, &AnnotationSet::new(), &mut self.items);
        self.items.push(LinearItem::Close(node_type));
    }

    fn flush_paragraph(&mut self) {
        if self.paragraph.is_empty() {
            return;
        }
        let text = self.paragraph.join(" ");
        self.paragraph.clear();
        self.content_branch(ElementData::new("paragraph"), &text);
    }

    fn close_list(&mut self) {
        if self.in_list {
            self.items.push(LinearItem::Close("list".to_string()));
            self.in_list = false;
        }
    }

    fn finish(mut self) -> LinearData {
        self.flush_paragraph();
        self.close_list();
        LinearData::new(self.items)
    }
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 {
        return None;
    }
    line[level..].strip_prefix(' ').map(|title| (level, title))
}

fn block_image(line: &str) -> Option<&str> {
    line.strip_prefix("![")?
        .strip_suffix(']')
        .filter(|src| !src.is_empty() && !src.contains(']'))
}

/// Inline markup. Anything that does not close is kept as literal text.
fn push_inline(text: &str, active: &AnnotationSet, items: &mut Vec<LinearItem>) {
    let mut rest = text;
    while let Some(ch) = rest.chars().next() {
        let after = &rest[ch.len_utf8()..];
        if let Some(tail) = markup(ch, after, active, items) {
            rest = tail;
            continue;
        }
        items.push(LinearItem::annotated(ch, active.clone()));
        rest = after;
    }
}

/// Try markup opened by `ch`; returns the text after it when it matched
fn markup<'a>(
    ch: char,
    after: &'a str,
    active: &AnnotationSet,
    items: &mut Vec<LinearItem>,
) -> Option<&'a str> {
    match ch {
        '*' | '_' => {
            let end = after.find(ch).filter(|&end| end > 0)?;
            let name = if ch == '*' { "bold" } else { "italic" };
            let mut inner = active.clone();
            inner.push(Annotation::new(name));
            push_inline(&after[..end], &inner, items);
            Some(&after[end + 1..])
        }
        '[' => {
            let label_end = after.find("](").filter(|&end| end > 0)?;
            let href_start = label_end + 2;
            let href_len = after[href_start..].find(')')?;
            let href = &after[href_start..href_start + href_len];
            let mut inner = active.clone();
            inner.push(Annotation::link(href));
            push_inline(&after[..label_end], &inner, items);
            Some(&after[href_start + href_len + 1..])
        }
        '{' => {
            let body = after.strip_prefix("img:")?;
            let end = body.find('}').filter(|&end| end > 0)?;
            let mut element = ElementData::new("inlineImage").with_attribute("src", &body[..end]);
            element.annotations = active.clone();
            items.push(LinearItem::Open(element));
            items.push(LinearItem::Close("inlineImage".to_string()));
            Some(&body[end + 1..])
        }
        _ => None,
    }
}

/// Export linear data in the same plain-text format. Annotations without a
/// plain-text form (underline, code) are dropped.
pub fn to_text(data: &LinearData) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut list: Option<Vec<String>> = None;
    let mut line = String::new();
    let mut run: Vec<(char, &AnnotationSet)> = Vec::new();

    for item in data.items() {
        match item {
            LinearItem::Open(element) => match element.node_type.as_str() {
                "list" => list = Some(Vec::new()),
                "paragraph" if list.is_some() => line.push_str("- "),
                "heading" => {
                    let level = element
                        .attribute("level")
                        .and_then(|level| level.parse().ok())
                        .unwrap_or(1);
                    line.push_str(&"#".repeat(level));
                    line.push(' ');
                }
                "image" => blocks.push(format!("![{}]", element.attribute("src").unwrap_or(""))),
                "inlineImage" => {
                    flush_run(&mut line, &mut run);
                    line.push_str(&format!(
                        "{{img:{}}}",
                        element.attribute("src").unwrap_or("")
                    ));
                }
                _ => {}
            },
            LinearItem::Close(node_type) => match node_type.as_str() {
                "paragraph" | "heading" => {
                    flush_run(&mut line, &mut run);
                    let finished = std::mem::take(&mut line);
                    match list.as_mut() {
                        Some(lines) => lines.push(finished),
                        None => blocks.push(finished),
                    }
                }
                "list" => {
                    if let Some(lines) = list.take() {
                        blocks.push(lines.join("\n"));
                    }
                }
                _ => {}
            },
            LinearItem::Text { ch, annotations } => run.push((*ch, annotations)),
        }
    }
    blocks.join("\n\n")
}

fn flush_run(line: &mut String, run: &mut Vec<(char, &AnnotationSet)>) {
    for group in run.chunk_by(|a, b| a.1 == b.1) {
        let mut text: String = group.iter().map(|(ch, _)| *ch).collect();
        for annotation in group[0].1.iter().rev() {
            text = match annotation.name.as_str() {
                "bold" => format!("*{text}*"),
                "italic" => format!("_{text}_"),
                "link" => format!(
                    "[{text}]({})",
                    annotation.attributes.get("href").map_or("", String::as_str)
                ),
                _ => text,
            };
        }
        line.push_str(&text);
    }
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::document::ModelDocument;
    use crate::model::linear::DataBuilder;
    use crate::model::registry::TypeRegistry;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_parse_blocks() {
        let data = parse_text("# Title\n\nfirst line\nsecond line\n\n![photo.jpg]\n- one\n- two\n");

        let expected = DataBuilder::new()
            .open_with(ElementData::new("heading").with_attribute("level", "1"))
            .text("Title")
            .close("heading")
            .paragraph("first line second line")
            .leaf(ElementData::new("image").with_attribute("src", "photo.jpg"))
            .open("list")
            .open("listItem")
            .paragraph("one")
            .close("listItem")
            .open("listItem")
            .paragraph("two")
            .close("listItem")
            .close("list")
            .build();
        assert_eq!(data, expected);
        assert!(ModelDocument::new(data, TypeRegistry::standard()).is_ok());
    }

    #[test]
    fn test_parse_inline_markup() {
        let data = parse_text("a *b _c_* [d](x.html){img:i.png}");

        let expected = DataBuilder::new()
            .open("paragraph")
            .text("a ")
            .annotated("b ", &["bold"])
            .annotated("c", &["bold", "italic"])
            .text(" ")
            .begin(Annotation::link("x.html"))
            .text("d")
            .end("link")
            .inline_leaf(ElementData::new("inlineImage").with_attribute("src", "i.png"))
            .close("paragraph")
            .build();
        assert_eq!(data, expected);
    }

    #[rstest]
    #[case::lone_star("2 * 3", "2 * 3")]
    #[case::empty_emphasis("a ** b", "a ** b")]
    #[case::unclosed_link("[label](nowhere", "[label](nowhere")]
    #[case::not_an_image("{image:x}", "{image:x}")]
    fn test_unmatched_markup_stays_literal(#[case] input: &str, #[case] text: &str) {
        let data = parse_text(input);
        assert_eq!(data.text_in(0, data.len()), text);
    }

    #[rstest]
    #[case::heading("## Sub *title*")]
    #[case::mixed("para _one_\n\n![a.png]\n\n- [x](y)\n- {img:z.png} z")]
    #[case::plain("just text")]
    fn test_export_round_trips(#[case] text: &str) {
        assert_eq!(to_text(&parse_text(text)), text);
    }

    #[test]
    fn test_read_and_write_document() {
        // Given a document on disk
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("notes/doc.txt");
        write_document(&path, &parse_text("hello *world*")).expect("write");

        // When reading it back
        let data = read_document(&path).expect("read");

        // Then the annotations survive
        assert_eq!(to_text(&data), "hello *world*");
        assert_eq!(
            fs::read_to_string(&path).expect("raw"),
            "hello *world*\n"
        );
    }

    #[test]
    fn test_missing_document_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let err = read_document(&dir.path().join("missing.txt")).expect_err("missing");
        assert!(err.to_string().starts_with("document not found"));
    }
}
