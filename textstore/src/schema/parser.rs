use super::types::{FieldKind, Schema, Token};
use crate::error::{Result, TextStoreError};
use regex::Regex;
use std::iter::Peekable;
use std::str::Chars;

/// Compile a field template into a matching pattern and a render skeleton.
pub fn compile(template: &str) -> Result<Schema> {
    let tokens = tokenize(template)?;
    check_boundaries(&tokens)?;
    let fields = collect_fields(&tokens)?;
    let pattern = build_pattern(&tokens)?;
    Ok(Schema::new(
        template.to_string(),
        Some(tokens),
        pattern,
        fields,
    ))
}

/// Compile a raw regex pattern into a schema with no render skeleton.
/// Field names come from the pattern's named capture groups.
pub fn compile_pattern(pattern: &str) -> Result<Schema> {
    let regex = Regex::new(&format!("(?m){pattern}"))
        .map_err(|e| TextStoreError::Schema(format!("invalid pattern {pattern:?}: {e}")))?;
    let fields: Vec<String> = regex
        .capture_names()
        .flatten()
        .map(str::to_string)
        .collect();
    Ok(Schema::new(pattern.to_string(), None, regex, fields))
}

fn tokenize(template: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' => {
                let name = take_identifier(&mut chars);
                if !name
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphabetic() || c == '_')
                {
                    return Err(TextStoreError::Schema(
                        "'$' must be followed by a field name".into(),
                    ));
                }
                flush_literal(&mut tokens, &mut literal);
                tokens.push(Token::Field {
                    name,
                    kind: FieldKind::Wildcard,
                });
            }
            '{' => {
                flush_literal(&mut tokens, &mut literal);
                tokens.push(parse_explicit_field(&mut chars)?);
            }
            _ => literal.push(c),
        }
    }
    flush_literal(&mut tokens, &mut literal);
    Ok(tokens)
}

fn flush_literal(tokens: &mut Vec<Token>, literal: &mut String) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

fn take_identifier(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

/// Parse the remainder of a `{name:'pattern'}` field, the `{` already
/// consumed.
fn parse_explicit_field(chars: &mut Peekable<Chars<'_>>) -> Result<Token> {
    let mut name = String::new();
    loop {
        match chars.next() {
            Some(':') => break,
            Some(c) if c.is_alphanumeric() || c == '_' => name.push(c),
            Some(c) => {
                return Err(TextStoreError::Schema(format!(
                    "unexpected {c:?} in field name"
                )))
            }
            None => return Err(TextStoreError::Schema("unterminated '{' field".into())),
        }
    }
    if name.is_empty() {
        return Err(TextStoreError::Schema(
            "field name missing in '{...}'".into(),
        ));
    }
    match chars.next() {
        Some('\'') => {}
        _ => {
            return Err(TextStoreError::Schema(format!(
                "field '{name}' is missing a quoted pattern"
            )))
        }
    }
    let mut pattern = String::new();
    let mut closed = false;
    while let Some(c) = chars.next() {
        if c == '\\' {
            // keep the escape intact for the regex engine; an escaped quote
            // stays part of the subpattern
            pattern.push(c);
            if let Some(next) = chars.next() {
                pattern.push(next);
            }
            continue;
        }
        if c == '\'' {
            closed = true;
            break;
        }
        pattern.push(c);
    }
    if !closed {
        return Err(TextStoreError::Schema(format!(
            "unterminated pattern for field '{name}'"
        )));
    }
    match chars.next() {
        Some('}') => {}
        _ => {
            return Err(TextStoreError::Schema(format!(
                "field '{name}' is missing a closing '}}'"
            )))
        }
    }
    Regex::new(&pattern).map_err(|e| {
        TextStoreError::Schema(format!("invalid subpattern for field '{name}': {e}"))
    })?;
    Ok(Token::Field {
        name,
        kind: FieldKind::Explicit(pattern),
    })
}

/// Two fields with nothing between them have no boundary the matcher could
/// stop at.
fn check_boundaries(tokens: &[Token]) -> Result<()> {
    for pair in tokens.windows(2) {
        if let [Token::Field { name: a, .. }, Token::Field { name: b, .. }] = pair {
            return Err(TextStoreError::Schema(format!(
                "fields '{a}' and '{b}' have no separating literal"
            )));
        }
    }
    Ok(())
}

fn collect_fields(tokens: &[Token]) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    for token in tokens {
        if let Token::Field { name, .. } = token {
            if fields.contains(name) {
                return Err(TextStoreError::Schema(format!("duplicate field '{name}'")));
            }
            fields.push(name.clone());
        }
    }
    Ok(fields)
}

fn build_pattern(tokens: &[Token]) -> Result<Regex> {
    let mut src = String::from("(?m)");
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Literal(lit) => src.push_str(&escape_literal(lit)),
            Token::Field { name, kind } => match kind {
                FieldKind::Explicit(pat) => {
                    src.push_str(&format!("(?P<{name}>{pat})"));
                }
                FieldKind::Wildcard => {
                    // A wildcard runs to the end of the line unless another
                    // field follows across whitespace only; then it stops at
                    // the whitespace so the next field still receives text.
                    let class = if followed_by_field(&tokens[i + 1..]) {
                        r"\S*"
                    } else {
                        ".*"
                    };
                    src.push_str(&format!("(?P<{name}>{class})"));
                }
            },
        }
    }
    Regex::new(&src)
        .map_err(|e| TextStoreError::Schema(format!("template compiles to an invalid pattern: {e}")))
}

fn followed_by_field(rest: &[Token]) -> bool {
    match rest {
        [Token::Literal(lit), Token::Field { .. }, ..] => {
            lit.chars().all(char::is_whitespace)
        }
        _ => false,
    }
}

/// Whitespace runs in the template match zero or more whitespace characters
/// in the text; everything else matches verbatim.
fn escape_literal(lit: &str) -> String {
    let mut out = String::new();
    let mut in_whitespace = false;
    for c in lit.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push_str(r"\s*");
                in_whitespace = true;
            }
        } else {
            in_whitespace = false;
            out.push_str(&regex::escape(&c.to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TextStoreError;
    use crate::schema::Schema;
    use std::collections::BTreeMap;

    #[test]
    fn test_compile_todo_template() {
        let schema = Schema::compile("TODO: $item").unwrap();
        assert_eq!(schema.fields(), ["item"]);
        assert_eq!(schema.pattern().as_str(), r"(?m)TODO:\s*(?P<item>.*)");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = Schema::compile("TODO: $item").unwrap();
        let b = Schema::compile("TODO: $item").unwrap();
        assert_eq!(a.pattern().as_str(), b.pattern().as_str());
    }

    #[test]
    fn test_explicit_field() {
        let schema = Schema::compile(r"{key:'\w+'} = $value").unwrap();
        assert_eq!(schema.fields(), ["key", "value"]);
        let caps = schema.pattern().captures("port = 8080").unwrap();
        assert_eq!(&caps["key"], "port");
        assert_eq!(&caps["value"], "8080");
    }

    #[test]
    fn test_whitespace_matches_zero_or_more() {
        let schema = Schema::compile("TODO: $item").unwrap();
        let caps = schema.pattern().captures("TODO:tight").unwrap();
        assert_eq!(&caps["item"], "tight");
        let caps = schema.pattern().captures("TODO:    padded").unwrap();
        assert_eq!(&caps["item"], "padded");
    }

    #[test]
    fn test_literal_metacharacters_are_escaped() {
        let schema = Schema::compile("[$tag]").unwrap();
        let caps = schema.pattern().captures("[urgent]").unwrap();
        assert_eq!(&caps["tag"], "urgent");
        assert!(!schema.pattern().is_match("Xurgent]"));
    }

    #[test]
    fn test_wildcard_stops_before_following_field() {
        let schema = Schema::compile("$path $type").unwrap();
        let caps = schema.pattern().captures("lists/todo.txt ToDo").unwrap();
        assert_eq!(&caps["path"], "lists/todo.txt");
        assert_eq!(&caps["type"], "ToDo");
    }

    #[test]
    fn test_render_positional_and_by_name() {
        let schema = Schema::compile("TODO: $item").unwrap();
        assert_eq!(schema.render(&["buy milk"]).unwrap(), "TODO: buy milk");

        let mut values = BTreeMap::new();
        values.insert("item".to_string(), "buy eggs".to_string());
        assert_eq!(schema.render_map(&values).unwrap(), "TODO: buy eggs");
    }

    #[test]
    fn test_render_wrong_value_count() {
        let schema = Schema::compile("TODO: $item").unwrap();
        let result = schema.render(&["a", "b"]);
        assert!(matches!(result, Err(TextStoreError::Schema(_))));
    }

    #[test]
    fn test_render_missing_named_value() {
        let schema = Schema::compile("TODO: $item").unwrap();
        let result = schema.render_map(&BTreeMap::new());
        assert!(matches!(result, Err(TextStoreError::Schema(_))));
    }

    #[test]
    fn test_duplicate_field_fails() {
        let result = Schema::compile("$item and $item");
        assert!(matches!(result, Err(TextStoreError::Schema(_))));
    }

    #[test]
    fn test_adjacent_fields_fail() {
        assert!(Schema::compile("$a$b").is_err());
        assert!(Schema::compile(r"{a:'\d'}{b:'\d'}").is_err());
        // a whitespace separator is enough
        assert!(Schema::compile("$a $b").is_ok());
    }

    #[test]
    fn test_unterminated_field_fails() {
        assert!(Schema::compile("{a:'x'").is_err());
        assert!(Schema::compile("{a:'x").is_err());
        assert!(Schema::compile("{a}").is_err());
        assert!(Schema::compile("end with $").is_err());
    }

    #[test]
    fn test_invalid_subpattern_fails() {
        let result = Schema::compile("{a:'('}");
        assert!(matches!(result, Err(TextStoreError::Schema(_))));
    }

    #[test]
    fn test_from_pattern_derives_fields() {
        let schema = Schema::from_pattern(r"^(?P<key>\w+)=(?P<value>.*)$").unwrap();
        assert_eq!(schema.fields(), ["key", "value"]);
        assert!(!schema.has_skeleton());
    }

    #[test]
    fn test_from_pattern_cannot_render() {
        let schema = Schema::from_pattern("^.*$").unwrap();
        let result = schema.render(&[]);
        assert!(matches!(result, Err(TextStoreError::Schema(_))));
    }

    #[test]
    fn test_from_pattern_rejects_invalid_regex() {
        assert!(Schema::from_pattern("(").is_err());
    }
}
