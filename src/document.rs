//! Typed accessors over the structured JSON documents in a resource graph.
//!
//! Members and composites are arbitrary `serde_json::Value` trees with at
//! least `apiVersion`, `kind`, and a `metadata.annotations` map. Everything
//! that navigates that shape lives here, so the engine and resolver never do
//! structural plumbing themselves.

use serde_json::{Map, Value};

/// Read a string at a nested path, e.g. `&["metadata", "name"]`.
pub fn str_at<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = doc;
    for segment in path {
        current = current.get(segment)?;
    }
    current.as_str()
}

/// Read one annotation from `metadata.annotations`.
pub fn annotation<'a>(doc: &'a Value, name: &str) -> Option<&'a str> {
    doc.get("metadata")?
        .get("annotations")?
        .get(name)?
        .as_str()
}

/// Read one label from `metadata.labels`.
pub fn label<'a>(doc: &'a Value, name: &str) -> Option<&'a str> {
    doc.get("metadata")?.get("labels")?.get(name)?.as_str()
}

/// Walk to the object at `path`, creating empty intermediate objects along
/// the way. Returns `None` only when an existing value on the path is not an
/// object, in which case nothing is written.
pub fn ensure_object<'a>(doc: &'a mut Value, path: &[&str]) -> Option<&'a mut Map<String, Value>> {
    let mut current = doc;
    for segment in path {
        let map = current.as_object_mut()?;
        if !map.contains_key(*segment) {
            map.insert((*segment).to_string(), Value::Object(Map::new()));
        }
        current = map.get_mut(*segment)?;
    }
    current.as_object_mut()
}

/// Set one annotation, creating `metadata.annotations` if absent.
pub fn set_annotation(doc: &mut Value, name: &str, value: &str) {
    if let Some(annotations) = ensure_object(doc, &["metadata", "annotations"]) {
        annotations.insert(name.to_string(), Value::String(value.to_string()));
    }
}

/// Set a string at a nested path, creating intermediate objects.
pub fn set_str(doc: &mut Value, path: &[&str], value: &str) {
    let (last, parents) = match path.split_last() {
        Some(split) => split,
        None => return,
    };
    if let Some(parent) = ensure_object(doc, parents) {
        parent.insert((*last).to_string(), Value::String(value.to_string()));
    }
}

/// Remove a set of annotations; missing entries are ignored.
pub fn remove_annotations(doc: &mut Value, names: &[&str]) {
    let annotations = doc
        .get_mut("metadata")
        .and_then(|m| m.get_mut("annotations"))
        .and_then(Value::as_object_mut);
    if let Some(annotations) = annotations {
        for name in names {
            annotations.remove(*name);
        }
    }
}

/// A primary document with an optional fallback, read with one consistent
/// precedence rule.
///
/// Composite-level reads prefer the observed copy (authoritative, previously
/// persisted) over the desired one; member-level reads prefer desired over
/// observed. Both are instances of this combinator, so there is exactly one
/// fallback implementation instead of a hand-written chain per call site.
#[derive(Debug, Clone, Copy)]
pub struct Fallback<'a> {
    primary: Option<&'a Value>,
    secondary: Option<&'a Value>,
}

impl<'a> Fallback<'a> {
    pub fn new(primary: Option<&'a Value>, secondary: Option<&'a Value>) -> Self {
        Self { primary, secondary }
    }

    fn pick<T>(&self, read: impl Fn(&'a Value) -> Option<T>) -> Option<T> {
        self.primary
            .and_then(&read)
            .or_else(|| self.secondary.and_then(&read))
    }

    pub fn annotation(&self, name: &str) -> Option<&'a str> {
        self.pick(|doc| annotation(doc, name))
    }

    pub fn label(&self, name: &str) -> Option<&'a str> {
        self.pick(|doc| label(doc, name))
    }

    pub fn str_at(&self, path: &[&str]) -> Option<&'a str> {
        self.pick(|doc| str_at(doc, path))
    }

    /// Truthy boolean annotation: `true`, `yes`, or `1`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.annotation(name), Some("true") | Some("yes") | Some("1"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_str_at_and_annotation() {
        let doc = json!({
            "metadata": {
                "name": "db-1",
                "annotations": {"a": "1"},
                "labels": {"l": "v"}
            }
        });

        assert_eq!(str_at(&doc, &["metadata", "name"]), Some("db-1"));
        assert_eq!(annotation(&doc, "a"), Some("1"));
        assert_eq!(annotation(&doc, "missing"), None);
        assert_eq!(label(&doc, "l"), Some("v"));
        assert_eq!(str_at(&doc, &["spec", "x"]), None);
    }

    #[test]
    fn test_set_annotation_creates_path() {
        let mut doc = json!({"apiVersion": "v1"});
        set_annotation(&mut doc, "k", "v");
        assert_eq!(annotation(&doc, "k"), Some("v"));

        // Idempotent on repeated ensure; overwrites the value.
        set_annotation(&mut doc, "k", "v2");
        assert_eq!(annotation(&doc, "k"), Some("v2"));
    }

    #[test]
    fn test_set_annotation_refuses_non_object_metadata() {
        let mut doc = json!({"metadata": "oops"});
        set_annotation(&mut doc, "k", "v");
        assert_eq!(doc, json!({"metadata": "oops"}));
    }

    #[test]
    fn test_set_str_nested() {
        let mut doc = json!({});
        set_str(&mut doc, &["metadata", "name"], "gen-1");
        assert_eq!(str_at(&doc, &["metadata", "name"]), Some("gen-1"));
    }

    #[test]
    fn test_remove_annotations() {
        let mut doc = json!({"metadata": {"annotations": {"a": "1", "b": "2"}}});
        remove_annotations(&mut doc, &["a", "missing"]);
        assert_eq!(annotation(&doc, "a"), None);
        assert_eq!(annotation(&doc, "b"), Some("2"));
    }

    #[test]
    fn test_fallback_precedence() {
        let primary = json!({"metadata": {"annotations": {"x": "primary"}}});
        let secondary = json!({"metadata": {"annotations": {"x": "secondary", "y": "only"}}});

        let pair = Fallback::new(Some(&primary), Some(&secondary));
        assert_eq!(pair.annotation("x"), Some("primary"));
        assert_eq!(pair.annotation("y"), Some("only"));
        assert_eq!(pair.annotation("z"), None);

        let none = Fallback::new(None, None);
        assert_eq!(none.annotation("x"), None);
    }

    #[test]
    fn test_fallback_flag_values() {
        for truthy in ["true", "yes", "1"] {
            let doc = json!({"metadata": {"annotations": {"enable": truthy}}});
            assert!(Fallback::new(Some(&doc), None).flag("enable"));
        }
        let doc = json!({"metadata": {"annotations": {"enable": "false"}}});
        assert!(!Fallback::new(Some(&doc), None).flag("enable"));
    }
}
