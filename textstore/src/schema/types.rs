use super::parser;
use crate::error::{Result, TextStoreError};
use regex::Regex;
use std::collections::BTreeMap;

/// A compiled record template: a matching pattern with one named capture
/// group per field, plus the literal skeleton used to render field values
/// back into text.
///
/// Schemas built from a raw regex pattern (see [`Schema::from_pattern`])
/// carry no skeleton; records of such a schema serialize to their matched
/// text instead of a rendering.
#[derive(Debug, Clone)]
pub struct Schema {
    template: String,
    tokens: Option<Vec<Token>>,
    pattern: Regex,
    fields: Vec<String>,
}

/// One element of a template's literal skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Field { name: String, kind: FieldKind },
}

/// How a field matches text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// `$name` — matches greedily until the next literal.
    Wildcard,
    /// `{name:'pattern'}` — matches an explicit subpattern.
    Explicit(String),
}

impl Schema {
    pub(crate) fn new(
        template: String,
        tokens: Option<Vec<Token>>,
        pattern: Regex,
        fields: Vec<String>,
    ) -> Schema {
        Schema {
            template,
            tokens,
            pattern,
            fields,
        }
    }

    /// Compile a field template into a schema.
    ///
    /// The grammar is literal text, `$name` wildcard fields, and
    /// `{name:'pattern'}` explicit fields. Whitespace between tokens matches
    /// zero or more whitespace characters; every other literal character is
    /// matched verbatim.
    pub fn compile(template: &str) -> Result<Schema> {
        parser::compile(template)
    }

    /// Build a schema directly from a regex pattern. Fields are derived from
    /// the pattern's named capture groups. The schema has no render skeleton.
    pub fn from_pattern(pattern: &str) -> Result<Schema> {
        parser::compile_pattern(pattern)
    }

    /// The template (or raw pattern) this schema was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The compiled matching pattern. Always multi-line (`(?m)`).
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Field names in template order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether this schema can render field values back into text.
    pub fn has_skeleton(&self) -> bool {
        self.tokens.is_some()
    }

    /// Render field values into the literal skeleton, in template field
    /// order.
    pub fn render(&self, values: &[&str]) -> Result<String> {
        if values.len() != self.fields.len() {
            return Err(TextStoreError::Schema(format!(
                "expected {} values, got {}",
                self.fields.len(),
                values.len()
            )));
        }
        let map: BTreeMap<String, String> = self
            .fields
            .iter()
            .zip(values)
            .map(|(name, value)| (name.clone(), (*value).to_string()))
            .collect();
        self.render_map(&map)
    }

    /// Render field values by name.
    pub fn render_map(&self, values: &BTreeMap<String, String>) -> Result<String> {
        let tokens = self.tokens.as_ref().ok_or_else(|| {
            TextStoreError::Schema(format!(
                "pattern schema {:?} has no render skeleton",
                self.template
            ))
        })?;
        let mut out = String::new();
        for token in tokens {
            match token {
                Token::Literal(lit) => out.push_str(lit),
                Token::Field { name, .. } => {
                    let value = values.get(name).ok_or_else(|| {
                        TextStoreError::Schema(format!("no value for field '{name}'"))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}
