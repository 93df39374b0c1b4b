use crate::host::dom::{Dom, DomId, Role};
use crate::model::document::ModelDocument;
use crate::view::node::ViewTree;

/// Visible text of a rendered branch, as the model sees it.
///
/// Each leaf contributes one placeholder per unit of its outer length, so the
/// result is offset-aligned with the branch's inner model range. Slots and
/// boundary markers contribute nothing.
pub fn dom_text(dom: &Dom, views: &ViewTree, document: &ModelDocument, element: DomId) -> String {
    let mut out = String::new();
    for &child in dom.children(element) {
        text_into(dom, views, document, child, &mut out);
    }
    out
}

fn text_into(dom: &Dom, views: &ViewTree, document: &ModelDocument, id: DomId, out: &mut String) {
    if dom.is_text(id) {
        out.push_str(dom.text(id));
        return;
    }
    match dom.role(id) {
        Some(Role::Slug | Role::Marker(_) | Role::NestedSurface) => {}
        Some(Role::View(view)) if views.get(*view).is_some_and(|v| v.leaf) => {
            let length = views
                .get(*view)
                .map_or(0, |v| document.outer_length(v.model));
            out.extend(std::iter::repeat_n(views.leaf_placeholder, length));
        }
        _ => {
            for &child in dom.children(id) {
                text_into(dom, views, document, child, out);
            }
        }
    }
}

/// Structural fingerprint of a rendered branch: its tag skeleton with each
/// run of text collapsed to `#`. Slots and markers are ignored.
pub fn dom_hash(dom: &Dom, views: &ViewTree, element: DomId) -> String {
    let mut out = String::new();
    let mut in_text = false;
    hash_into(dom, views, element, &mut out, &mut in_text);
    out
}

fn hash_into(dom: &Dom, views: &ViewTree, id: DomId, out: &mut String, in_text: &mut bool) {
    if dom.is_text(id) {
        if !dom.text(id).is_empty() && !*in_text {
            out.push('#');
            *in_text = true;
        }
        return;
    }
    if matches!(dom.role(id), Some(Role::Slug | Role::Marker(_))) {
        return;
    }
    let tag = dom.tag(id);
    out.push('<');
    out.push_str(tag);
    out.push('>');
    *in_text = false;
    let opaque = dom
        .view_of(id)
        .and_then(|view| views.get(view))
        .is_some_and(|v| v.leaf);
    if !opaque {
        for &child in dom.children(id) {
            hash_into(dom, views, child, out, in_text);
        }
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
    *in_text = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::dom::MarkerSide;
    use crate::model::annotation::Annotation;
    use crate::model::linear::DataBuilder;
    use crate::model::registry::TypeRegistry;

    #[test]
    fn test_hash_collapses_text_across_markers() {
        let views = ViewTree::new();
        let mut dom = Dom::new();
        let p = dom.create_element("p", Role::Plain);
        let b = dom.create_element("b", Role::Annotation(Annotation::new("bold")));
        let t1 = dom.create_text("ab");
        let pre = dom.create_element("img", Role::Marker(MarkerSide::Pre));
        let post = dom.create_element("img", Role::Marker(MarkerSide::Post));
        let t2 = dom.create_text("cd");
        let t3 = dom.create_text("e");
        dom.append_child(p, b);
        dom.append_child(b, t1);
        dom.append_child(p, t2);
        dom.append_child(p, pre);
        dom.append_child(p, post);
        dom.append_child(p, t3);

        assert_eq!(dom_hash(&dom, &views, p), "<p><b>#</b>#</p>");
    }

    #[test]
    fn test_text_skips_slugs() {
        let views = ViewTree::new();
        let document = ModelDocument::new(DataBuilder::new().build(), TypeRegistry::standard())
            .expect("fixture");
        let mut dom = Dom::new();
        let p = dom.create_element("p", Role::Plain);
        let slug = dom.create_element("span", Role::Slug);
        let filler = dom.create_text("\u{FEFF}");
        let t = dom.create_text("xy");
        dom.append_child(p, slug);
        dom.append_child(slug, filler);
        dom.append_child(p, t);

        assert_eq!(dom_text(&dom, &views, &document, p), "xy");
    }
}
