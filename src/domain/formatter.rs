//! Field-reference interpolation.
//!
//! A template string is literal text with `{field}` references. `{{` and `}}`
//! are escaped braces. A field is
//! `[obj:]name[.attr|[key]]...[|default][!conversion][:spec]`.
//!
//! When the whole string is one simple field (`{name}`, `{obj:name}`,
//! `{name|default}`), the referenced value is returned as is, keeping its
//! type. Everything else renders to a string.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::format_spec;
use crate::domain::node::{Node, Params};

const OBJ_PREFIX: &str = "obj:";

// Odd brace runs around a word name; `{{{abc}}}` matches too.
static WHOLE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{(?:\{\{)*(?:obj:)?(?P<key>\w+)(?:\|(?P<default>[^}]*))?\}(?:\}\})*$")
        .expect("whole field pattern is valid")
});

/// Evaluates template strings against a parameter map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Formatter {
    allow_empty: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq)]
struct Field {
    /// Field text between the braces, for diagnostics.
    text: String,
    name: String,
    accessors: Vec<Accessor>,
    default: Option<String>,
    conversion: Option<Conversion>,
    spec: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Accessor {
    Attr(String),
    Index(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Str,
    Repr,
    Ascii,
}

impl Formatter {
    /// `allow_empty` substitutes empty text for undefined, default-less fields.
    pub fn new(allow_empty: bool) -> Self {
        Self { allow_empty }
    }

    pub fn format(&self, template: &str, params: &Params) -> DomainResult<Node> {
        if let Some(caps) = WHOLE_FIELD.captures(template) {
            let key = &caps["key"];
            if is_positional(key) {
                return Err(positional(template));
            }
            return match params.get(key) {
                Some(value) => Ok(value.clone()),
                None => self
                    .fallback(template, key, caps.name("default").map(|m| m.as_str()))
                    .map(Node::Str),
            };
        }

        let mut out = String::with_capacity(template.len());
        for segment in parse(template)? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Field(field) => out.push_str(&self.render(template, &field, params)?),
            }
        }
        Ok(Node::Str(out))
    }

    fn render(&self, template: &str, field: &Field, params: &Params) -> DomainResult<String> {
        let Some(base) = params.get(&field.name) else {
            return self.fallback(template, &field.name, field.default.as_deref());
        };
        let mut value = base;
        for accessor in &field.accessors {
            value = access(value, accessor).map_err(|reason| DomainError::InvalidFieldAccess {
                template: template.to_string(),
                field: field.text.clone(),
                reason,
            })?;
        }
        let converted;
        let value = match field.conversion {
            None => value,
            Some(conversion) => {
                converted = Node::Str(match conversion {
                    Conversion::Str => value.to_string(),
                    Conversion::Repr => value.repr(),
                    Conversion::Ascii => value.ascii(),
                });
                &converted
            }
        };
        format_spec::apply(value, &field.spec).map_err(|reason| DomainError::InvalidFormatSpec {
            template: template.to_string(),
            spec: field.spec.clone(),
            reason,
        })
    }

    fn fallback(&self, template: &str, name: &str, default: Option<&str>) -> DomainResult<String> {
        match default {
            Some(default) => Ok(default.to_string()),
            None if self.allow_empty => Ok(String::new()),
            None => Err(DomainError::UndefinedVariable {
                template: template.to_string(),
                name: name.to_string(),
            }),
        }
    }
}

/// Names referenced by non-escaped fields, in first-appearance order.
pub fn enumerate_required_params(template: &str) -> DomainResult<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Field(field) = segment {
            if !names.contains(&field.name) {
                names.push(field.name);
            }
        }
    }
    Ok(names)
}

/// Literal defaults declared with `{name|default}`.
pub fn enumerate_param_defaults(template: &str) -> DomainResult<BTreeMap<String, String>> {
    let mut defaults = BTreeMap::new();
    for segment in parse(template)? {
        if let Segment::Field(Field {
            name,
            default: Some(default),
            ..
        }) = segment
        {
            defaults.insert(name, default);
        }
    }
    Ok(defaults)
}

fn access<'a>(value: &'a Node, accessor: &Accessor) -> Result<&'a Node, String> {
    match (value, accessor) {
        (Node::Map(map), Accessor::Attr(key) | Accessor::Index(key)) => map
            .get(key)
            .ok_or_else(|| format!("{} has no key {key:?}", value.type_name())),
        (Node::Seq(items), Accessor::Index(index)) => {
            let position: usize = index
                .parse()
                .map_err(|_| format!("list indices must be integers, not {index:?}"))?;
            items
                .get(position)
                .ok_or_else(|| format!("list index {position} out of range"))
        }
        (other, Accessor::Attr(attr)) => Err(format!(
            "{} object has no attribute {attr:?}",
            other.type_name()
        )),
        (other, Accessor::Index(_)) => {
            Err(format!("{} object is not subscriptable", other.type_name()))
        }
    }
}

fn is_positional(name: &str) -> bool {
    name.is_empty() || name.chars().all(|c| c.is_ascii_digit())
}

fn positional(template: &str) -> DomainError {
    DomainError::malformed(template, "Positional format arguments are not supported")
}

/// Split a template into literal and field segments.
fn parse(template: &str) -> DomainResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(DomainError::malformed(
                    template,
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let body = read_field_body(template, &mut chars)?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(parse_field(template, &body)?));
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Consume up to the closing `}`. Brackets in the name part may hold braces.
fn read_field_body(
    template: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> DomainResult<String> {
    let mut body = String::new();
    let mut in_name = true;
    let mut in_bracket = false;
    loop {
        let Some(c) = chars.next() else {
            return Err(DomainError::malformed(
                template,
                "expected '}' before end of string",
            ));
        };
        match c {
            '[' if in_name => in_bracket = true,
            ']' if in_name => in_bracket = false,
            '|' | '!' | ':' if in_name && !in_bracket => in_name = false,
            '}' if !in_bracket => return Ok(body),
            '{' if !in_bracket => {
                return Err(DomainError::malformed(
                    template,
                    "nested replacement fields are not supported",
                ))
            }
            _ => {}
        }
        body.push(c);
    }
}

fn parse_field(template: &str, body: &str) -> DomainResult<Field> {
    let rest = match body.strip_prefix(OBJ_PREFIX) {
        Some(rest) if rest.starts_with(|c: char| c.is_alphanumeric() || c == '_') => rest,
        _ => body,
    };

    let split = head_end(rest);
    let (head, tail) = rest.split_at(split);

    let (name, accessors) = parse_head(template, head)?;

    let mut default = None;
    let mut conversion = None;
    let mut spec = String::new();
    if let Some(text) = tail.strip_prefix('|') {
        default = Some(text.to_string());
    } else if let Some(text) = tail.strip_prefix('!') {
        let mut conv = text.chars();
        conversion = Some(match conv.next() {
            Some('s') => Conversion::Str,
            Some('r') => Conversion::Repr,
            Some('a') => Conversion::Ascii,
            Some(other) => {
                return Err(DomainError::malformed(
                    template,
                    format!("Unknown conversion specifier {other}"),
                ))
            }
            None => {
                return Err(DomainError::malformed(
                    template,
                    "end of string while looking for conversion specifier",
                ))
            }
        });
        let after = conv.as_str();
        if !after.is_empty() {
            spec = after
                .strip_prefix(':')
                .ok_or_else(|| {
                    DomainError::malformed(template, "expected ':' after conversion specifier")
                })?
                .to_string();
        }
    } else if let Some(text) = tail.strip_prefix(':') {
        spec = text.to_string();
    }

    Ok(Field {
        text: body.to_string(),
        name,
        accessors,
        default,
        conversion,
        spec,
    })
}

/// Byte offset where the name/accessor part ends.
fn head_end(field: &str) -> usize {
    let mut in_bracket = false;
    for (i, c) in field.char_indices() {
        match c {
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            '|' | '!' | ':' if !in_bracket => return i,
            _ => {}
        }
    }
    field.len()
}

fn parse_head(template: &str, head: &str) -> DomainResult<(String, Vec<Accessor>)> {
    let name_end = head.find(['.', '[']).unwrap_or(head.len());
    let (name, mut rest) = head.split_at(name_end);
    if is_positional(name) {
        return Err(positional(template));
    }

    let mut accessors = Vec::new();
    while !rest.is_empty() {
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
            let (attr, remaining) = after_dot.split_at(end);
            if attr.is_empty() {
                return Err(DomainError::malformed(
                    template,
                    "Empty attribute in format string",
                ));
            }
            accessors.push(Accessor::Attr(attr.to_string()));
            rest = remaining;
        } else if let Some(after_bracket) = rest.strip_prefix('[') {
            let end = after_bracket.find(']').ok_or_else(|| {
                DomainError::malformed(template, "Missing ']' in format string")
            })?;
            let key = &after_bracket[..end];
            if key.is_empty() {
                return Err(DomainError::malformed(
                    template,
                    "Empty attribute in format string",
                ));
            }
            accessors.push(Accessor::Index(key.to_string()));
            rest = &after_bracket[end + 1..];
            if !rest.is_empty() && !rest.starts_with(['.', '[']) {
                return Err(DomainError::malformed(
                    template,
                    "Only '.' or '[' may follow ']' in format field specifier",
                ));
            }
        } else {
            break;
        }
    }
    Ok((name.to_string(), accessors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_field_with_everything_when_parsing_then_splits_parts() {
        let field = parse_field("t", "obj:abc.val[2]!r:>5").unwrap();

        assert_eq!(field.name, "abc");
        assert_eq!(
            field.accessors,
            vec![
                Accessor::Attr("val".to_string()),
                Accessor::Index("2".to_string())
            ]
        );
        assert_eq!(field.conversion, Some(Conversion::Repr));
        assert_eq!(field.spec, ">5");
        assert_eq!(field.default, None);
    }

    #[test]
    fn given_default_with_colon_when_parsing_then_default_keeps_rest() {
        let field = parse_field("t", "url|http://host:8080").unwrap();

        assert_eq!(field.name, "url");
        assert_eq!(field.default.as_deref(), Some("http://host:8080"));
        assert!(field.spec.is_empty());
    }

    #[test]
    fn given_obj_prefix_without_name_when_parsing_then_obj_is_the_name() {
        let field = parse_field("t", "obj:>5").unwrap();

        assert_eq!(field.name, "obj");
        assert_eq!(field.spec, ">5");
    }

    #[test]
    fn given_escapes_when_parsing_then_produces_literals_only() {
        let segments = parse("a{{b}}c").unwrap();

        assert_eq!(segments, vec![Segment::Literal("a{b}c".to_string())]);
    }

    #[test]
    fn given_unclosed_field_when_parsing_then_fails() {
        assert!(matches!(
            parse("x{abc"),
            Err(DomainError::MalformedTemplate { .. })
        ));
    }

    #[test]
    fn given_bracket_then_garbage_when_parsing_then_fails() {
        assert!(parse("{abc[1]x}").is_err());
    }
}
