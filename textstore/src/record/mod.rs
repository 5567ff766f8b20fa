use crate::error::{Result, TextStoreError};
use crate::schema::Schema;
use regex::{CaptureMatches, Captures};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Hook run after a match's capture groups have become field values. It may
/// coerce or derive values; it only sees the field map, never the matched
/// text, so the consumed span is fixed.
pub type TransformFn = dyn Fn(&mut BTreeMap<String, String>) + Send + Sync;

/// A named, parseable record variant: a compiled schema plus an optional
/// field transformation hook.
///
/// Two types with the same schema but different hooks are distinct variants;
/// a [`Store`](crate::Store) is bound to exactly one of them.
pub struct RecordType {
    name: String,
    schema: Schema,
    transform: Option<Arc<TransformFn>>,
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl RecordType {
    /// Create a record type from a field template.
    pub fn new(name: &str, template: &str) -> Result<RecordType> {
        Ok(RecordType {
            name: name.to_string(),
            schema: Schema::compile(template)?,
            transform: None,
        })
    }

    /// Create a record type from a raw regex pattern. Records of such a type
    /// serialize to their matched text.
    pub fn from_pattern(name: &str, pattern: &str) -> Result<RecordType> {
        Ok(RecordType {
            name: name.to_string(),
            schema: Schema::from_pattern(pattern)?,
            transform: None,
        })
    }

    /// Attach a transformation hook.
    pub fn with_transform<F>(mut self, f: F) -> RecordType
    where
        F: Fn(&mut BTreeMap<String, String>) + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Match this type at the start of `text`. Fails with `NoMatch` when the
    /// pattern does not match at offset 0.
    pub fn parse(&self, text: &str) -> Result<Record> {
        match self.schema.pattern().captures(text) {
            Some(caps) if caps.get(0).map(|m| m.start()) == Some(0) => Ok(self.build(&caps)),
            _ => Err(TextStoreError::NoMatch {
                type_name: self.name.clone(),
                text: text.to_string(),
            }),
        }
    }

    /// First match anywhere in `text`, or `None`.
    pub fn search(&self, text: &str) -> Option<Record> {
        self.schema
            .pattern()
            .captures(text)
            .map(|caps| self.build(&caps))
    }

    /// Lazily iterate every non-overlapping match in `text`, left to right.
    /// Zero-length matches (blank lines) are skipped. Calling `find_all`
    /// again restarts the scan.
    pub fn find_all<'r, 't>(&'r self, text: &'t str) -> FindAll<'r, 't> {
        FindAll {
            record_type: self,
            inner: self.schema.pattern().captures_iter(text),
        }
    }

    /// Construct a record from positional field values, in template field
    /// order. The rendering is validated by the matcher, so the round-trip
    /// `parse(to_text(record))` holds for every record this returns.
    pub fn from_values(&self, values: &[&str]) -> Result<Record> {
        let text = self.schema.render(values)?;
        self.parse(&text)
    }

    /// Construct a record from named field values.
    pub fn from_fields(&self, values: &BTreeMap<String, String>) -> Result<Record> {
        let text = self.schema.render_map(values)?;
        self.parse(&text)
    }

    fn build(&self, caps: &Captures<'_>) -> Record {
        let whole = caps.get(0).expect("capture group 0 always exists");
        let mut fields = BTreeMap::new();
        for name in self.schema.pattern().capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                fields.insert(name.to_string(), m.as_str().to_string());
            }
        }
        if let Some(transform) = &self.transform {
            transform(&mut fields);
        }
        let text = whole.as_str().to_string();
        let canonical = if self.schema.has_skeleton() {
            // canonical text reflects coerced values; a hook that drops a
            // field falls back to the matched text
            self.schema
                .render_map(&fields)
                .unwrap_or_else(|_| text.clone())
        } else {
            text.clone()
        };
        Record {
            fields,
            text,
            canonical,
            span: (whole.start(), whole.end()),
        }
    }
}

/// Lazy iterator over a record type's matches in a text. Created by
/// [`RecordType::find_all`].
pub struct FindAll<'r, 't> {
    record_type: &'r RecordType,
    inner: CaptureMatches<'r, 't>,
}

impl Iterator for FindAll<'_, '_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        for caps in self.inner.by_ref() {
            let matched = caps.get(0)?;
            if !matched.as_str().is_empty() {
                return Some(self.record_type.build(&caps));
            }
        }
        None
    }
}

/// One parsed instance of a [`RecordType`]: named field values, the exact
/// matched text, and the canonical serialization produced by rendering the
/// field values back through the template.
///
/// Records are immutable; "editing" one means constructing a new record and
/// replacing the old serialized text in its store. Equality compares
/// canonical text only.
#[derive(Debug, Clone)]
pub struct Record {
    fields: BTreeMap<String, String>,
    text: String,
    canonical: String,
    span: (usize, usize),
}

impl Record {
    /// A field's parsed value.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// The text the match consumed.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The canonical serialization. File writes and equality both use this
    /// form.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Byte offsets of the match within the scanned text.
    pub fn span(&self) -> (usize, usize) {
        self.span
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Record {}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl AsRef<str> for Record {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn todo_type() -> RecordType {
        RecordType::new("ToDo", "TODO: $item").unwrap()
    }

    #[test]
    fn test_parse_extracts_fields() {
        let todo = todo_type();
        let record = todo.parse("TODO: buy milk").unwrap();
        assert_eq!(record.get("item"), Some("buy milk"));
        assert_eq!(record.canonical(), "TODO: buy milk");
        assert_eq!(record.text(), "TODO: buy milk");
    }

    #[test]
    fn test_parse_requires_match_at_start() {
        let todo = todo_type();
        let result = todo.parse("see TODO: buy milk");
        assert!(matches!(result, Err(TextStoreError::NoMatch { .. })));
    }

    #[test]
    fn test_search_finds_first_match_anywhere() {
        let todo = todo_type();
        let record = todo.search("notes...\nTODO: call mom\nmore notes").unwrap();
        assert_eq!(record.get("item"), Some("call mom"));
        assert_eq!(record.span().0, 9);

        assert!(todo.search("nothing to do here").is_none());
    }

    #[test]
    fn test_find_all_is_ordered_and_skips_non_matches() {
        let todo = todo_type();
        let text = "TODO: first\nnoise\nTODO: second\n";
        let items: Vec<String> = todo
            .find_all(text)
            .map(|r| r.get("item").unwrap().to_string())
            .collect();
        assert_eq!(items, ["first", "second"]);
    }

    #[test]
    fn test_find_all_restarts() {
        let todo = todo_type();
        let text = "TODO: a\nTODO: b\n";
        let first: Vec<Record> = todo.find_all(text).collect();
        let second: Vec<Record> = todo.find_all(text).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_find_all_empty_input() {
        let todo = todo_type();
        assert_eq!(todo.find_all("").count(), 0);
    }

    #[test]
    fn test_line_type_skips_blank_lines() {
        let line = RecordType::from_pattern("Line", "^.*$").unwrap();
        let texts: Vec<String> = line
            .find_all("line 1\n\nline 2\n")
            .map(|r| r.text().to_string())
            .collect();
        assert_eq!(texts, ["line 1", "line 2"]);
    }

    #[test]
    fn test_raw_pattern_canonical_is_matched_text() {
        let line = RecordType::from_pattern("Line", "^.*$").unwrap();
        let record = line.parse("just a line").unwrap();
        assert!(record.fields().is_empty());
        assert_eq!(record.canonical(), "just a line");
    }

    #[test]
    fn test_from_values_round_trip() {
        let todo = todo_type();
        let record = todo.from_values(&["buy milk"]).unwrap();
        assert_eq!(record.canonical(), "TODO: buy milk");

        let reparsed = todo.parse(record.canonical()).unwrap();
        assert_eq!(reparsed, record);
    }

    #[test]
    fn test_from_fields() {
        let todo = todo_type();
        let mut values = BTreeMap::new();
        values.insert("item".to_string(), "water plants".to_string());
        let record = todo.from_fields(&values).unwrap();
        assert_eq!(record.canonical(), "TODO: water plants");
    }

    #[test]
    fn test_transform_coerces_values() {
        let shouting = RecordType::new("ShoutingToDo", "TODO: $item")
            .unwrap()
            .with_transform(|fields| {
                if let Some(item) = fields.get_mut("item") {
                    *item = item.to_uppercase();
                }
            });
        let record = shouting.parse("TODO: buy milk").unwrap();
        assert_eq!(record.get("item"), Some("BUY MILK"));
        // canonical reflects the coerced value, the matched text does not
        assert_eq!(record.canonical(), "TODO: BUY MILK");
        assert_eq!(record.text(), "TODO: buy milk");
    }

    #[test]
    fn test_transform_can_derive_fields() {
        let sized = RecordType::new("SizedToDo", "TODO: $item")
            .unwrap()
            .with_transform(|fields| {
                let len = fields.get("item").map(String::len).unwrap_or(0);
                fields.insert("length".to_string(), len.to_string());
            });
        let record = sized.parse("TODO: nap").unwrap();
        assert_eq!(record.get("length"), Some("3"));
        assert_eq!(record.canonical(), "TODO: nap");
    }

    #[test]
    fn test_equality_is_by_canonical_text() {
        let todo = todo_type();
        let a = todo.parse("TODO:   spaced out").unwrap();
        let b = todo.from_values(&["spaced out"]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.text(), b.text());
    }
}
