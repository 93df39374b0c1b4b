use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An inline annotation (bold, link, ...) attached to a text unit or inline node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Annotation {
    /// Registry key, e.g. `"bold"` or `"link"`
    pub name: String,
    /// Rendered as attributes on the wrapper element (e.g. `href`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn link(href: impl Into<String>) -> Self {
        Self::new("link").with_attribute("href", href)
    }
}

/// An ordered, de-duplicated set of annotations.
///
/// Order is significant: it is the nesting order the renderer opens wrappers
/// in, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationSet(Vec<Annotation>);

impl AnnotationSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_vec(annotations: Vec<Annotation>) -> Self {
        let mut set = Self::new();
        for annotation in annotations {
            set.push(annotation);
        }
        set
    }

    /// Append unless already present
    pub fn push(&mut self, annotation: Annotation) {
        if !self.contains(&annotation) {
            self.0.push(annotation);
        }
    }

    pub fn remove(&mut self, annotation: &Annotation) {
        self.0.retain(|a| a != annotation);
    }

    /// Remove every annotation with the given name regardless of attributes
    pub fn remove_named(&mut self, name: &str) {
        self.0.retain(|a| a.name != name);
    }

    pub fn contains(&self, annotation: &Annotation) -> bool {
        self.0.contains(annotation)
    }

    pub fn contains_named(&self, name: &str) -> bool {
        self.0.iter().any(|a| a.name == name)
    }

    pub fn retain(&mut self, f: impl FnMut(&Annotation) -> bool) {
        self.0.retain(f);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Annotation> {
        self.0.get(index)
    }

    /// Names only, for logging and snapshots
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|a| a.name.as_str()).collect()
    }
}

impl FromIterator<Annotation> for AnnotationSet {
    fn from_iter<T: IntoIterator<Item = Annotation>>(iter: T) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AnnotationSet {
    type Item = &'a Annotation;
    type IntoIter = std::slice::Iter<'a, Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_deduplicates() {
        let mut set = AnnotationSet::new();
        set.push(Annotation::new("bold"));
        set.push(Annotation::new("italic"));
        set.push(Annotation::new("bold"));

        assert_eq!(set.names(), vec!["bold", "italic"]);
    }

    #[test]
    fn test_links_with_different_targets_are_distinct() {
        let set = AnnotationSet::from_vec(vec![
            Annotation::link("https://a.example"),
            Annotation::link("https://b.example"),
        ]);

        assert_eq!(set.len(), 2);
        assert!(set.contains_named("link"));
    }

    #[test]
    fn test_remove_named_ignores_attributes() {
        let mut set = AnnotationSet::from_vec(vec![
            Annotation::link("https://a.example"),
            Annotation::new("bold"),
        ]);
        set.remove_named("link");

        assert_eq!(set.names(), vec!["bold"]);
    }
}
