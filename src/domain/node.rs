//! Node model: the value tree every expansion step works on.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Named parameters, raw or resolved.
pub type Params = BTreeMap<String, Node>;

/// Table key marking a verbatim text node.
pub const RAW_TAG: &str = "!raw";
/// Table key marking a list-join node.
pub const JOIN_TAG: &str = "!join";

/// A parsed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Node>),
    Map(BTreeMap<String, Node>),
    Tagged(Tag),
}

/// Opaque loader nodes with their own expansion rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    /// Verbatim text, never scanned for fields.
    Raw(String),
    /// Items expanded one by one, then joined into a single string.
    Join { delimiter: String, items: Vec<Node> },
}

/// Where a definition came from. Only ever rendered, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub source: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl Location {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        Ok(())
    }
}

impl Node {
    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Null => "NoneType",
            Node::Bool(_) => "bool",
            Node::Int(_) => "int",
            Node::Float(_) => "float",
            Node::Str(_) => "str",
            Node::Seq(_) => "list",
            Node::Map(_) => "dict",
            Node::Tagged(_) => "tagged",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Quoted representation: strings in single quotes, containers with quoted members.
    pub fn repr(&self) -> String {
        match self {
            Node::Str(s) => quote(s),
            Node::Seq(items) => format!("[{}]", items.iter().map(Node::repr).join(", ")),
            Node::Map(map) => format!(
                "{{{}}}",
                map.iter()
                    .map(|(key, value)| format!("{}: {}", quote(key), value.repr()))
                    .join(", ")
            ),
            Node::Tagged(tag) => quote(&tag.to_string()),
            other => other.to_string(),
        }
    }

    /// Like [`Node::repr`] with every non-ASCII character escaped.
    pub fn ascii(&self) -> String {
        escape_non_ascii(&self.repr())
    }

    /// Value equality where bools, ints and floats compare numerically
    /// (`1 == 1.0 == true`), recursively through containers.
    pub fn value_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Seq(a), Node::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.value_eq(y))
            }
            (Node::Map(a), Node::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x.value_eq(y)))
            }
            (Node::Int(a), Node::Int(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Node::Bool(b) => Some(f64::from(u8::from(*b))),
            Node::Int(i) => Some(*i as f64),
            Node::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => f.write_str("None"),
            Node::Bool(true) => f.write_str("True"),
            Node::Bool(false) => f.write_str("False"),
            Node::Int(i) => write!(f, "{i}"),
            Node::Float(x) => f.write_str(&float_repr(*x)),
            Node::Str(s) => f.write_str(s),
            Node::Seq(_) | Node::Map(_) => f.write_str(&self.repr()),
            Node::Tagged(tag) => write!(f, "{tag}"),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Raw(text) => f.write_str(text),
            Tag::Join { delimiter, items } => f.write_str(&items.iter().join(delimiter)),
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Str(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Str(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Int(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Float(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::Seq(value)
    }
}

impl From<BTreeMap<String, Node>> for Node {
    fn from(value: BTreeMap<String, Node>) -> Self {
        Node::Map(value)
    }
}

impl From<Tag> for Node {
    fn from(value: Tag) -> Self {
        Node::Tagged(value)
    }
}

/// Quote a string the way `repr` does: single quotes unless the text
/// contains a single quote and no double quote.
pub fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&escape_char(c)),
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

fn escape_non_ascii(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii() {
                c.to_string()
            } else {
                escape_char(c)
            }
        })
        .collect()
}

fn escape_char(c: char) -> String {
    let code = u32::from(c);
    if code < 0x100 {
        format!("\\x{code:02x}")
    } else if code < 0x10000 {
        format!("\\u{code:04x}")
    } else {
        format!("\\U{code:08x}")
    }
}

/// Shortest round-trip rendering; integral values keep a trailing `.0`
/// and exponents carry a sign and at least two digits (`1e+16`).
pub fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let debug = format!("{x:?}");
    match debug.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            let mantissa = mantissa.strip_suffix(".0").unwrap_or(mantissa);
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => debug,
    }
}

// ============================================================
// SERDE
// ============================================================

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar, sequence or table")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(match i64::try_from(v) {
            Ok(i) => Node::Int(i),
            Err(_) => Node::Float(v as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::Str(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::Str(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        Node::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Node::Seq(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Node, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Node>()? {
            map.insert(key, value);
        }
        node_from_table(map).map_err(de::Error::custom)
    }
}

const TOML_DATETIME: &str = "$__toml_private_datetime";

/// Single-key tables keyed by a tag marker become tagged nodes.
fn node_from_table(mut map: BTreeMap<String, Node>) -> Result<Node, String> {
    if map.len() != 1 {
        return Ok(Node::Map(map));
    }
    // toml hands datetimes over as a marker table
    if let Some(Node::Str(text)) = map.get(TOML_DATETIME) {
        return Ok(Node::Str(text.clone()));
    }
    if let Some(value) = map.remove(RAW_TAG) {
        return match value {
            Node::Str(text) => Ok(Tag::Raw(text).into()),
            other => Err(format!(
                "{RAW_TAG} expects a string, but got {}",
                other.type_name()
            )),
        };
    }
    if let Some(value) = map.remove(JOIN_TAG) {
        let Node::Map(mut body) = value else {
            return Err(format!(
                "{JOIN_TAG} expects a table with 'delimiter' and 'items'"
            ));
        };
        let delimiter = match body.remove("delimiter") {
            None => String::new(),
            Some(Node::Str(d)) => d,
            Some(other) => {
                return Err(format!(
                    "{JOIN_TAG} delimiter should be a string, but is {}",
                    other.type_name()
                ))
            }
        };
        let items = match body.remove("items") {
            Some(Node::Seq(items)) => items,
            _ => return Err(format!("{JOIN_TAG} expects a list of 'items'")),
        };
        return Ok(Tag::Join { delimiter, items }.into());
    }
    Ok(Node::Map(map))
}

#[derive(Serialize)]
struct JoinBody<'a> {
    delimiter: &'a str,
    items: &'a [Node],
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Int(i) => serializer.serialize_i64(*i),
            Node::Float(x) => serializer.serialize_f64(*x),
            Node::Str(s) => serializer.serialize_str(s),
            Node::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Map(map) => serializer.collect_map(map),
            Node::Tagged(Tag::Raw(text)) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(RAW_TAG, text)?;
                map.end()
            }
            Node::Tagged(Tag::Join { delimiter, items }) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(JOIN_TAG, &JoinBody { delimiter, items })?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_nested_values_when_displaying_then_members_are_quoted() {
        let node = Node::Seq(vec![
            Node::Int(1),
            Node::from("a"),
            Node::Map(BTreeMap::from([("k".to_string(), Node::Bool(true))])),
            Node::Null,
        ]);

        assert_eq!(node.to_string(), "[1, 'a', {'k': True}, None]");
    }

    #[test]
    fn given_string_with_single_quote_when_quoting_then_uses_double_quotes() {
        assert_eq!(quote("it's"), "\"it's\"");
        assert_eq!(quote("a'b\"c"), "'a\\'b\"c'");
        assert_eq!(quote("tab\there"), "'tab\\there'");
    }

    #[test]
    fn given_floats_when_rendering_then_matches_repr() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.5), "0.5");
        assert_eq!(float_repr(-2.25), "-2.25");
        assert_eq!(float_repr(1e20), "1e+20");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
    }

    #[test]
    fn given_non_ascii_when_ascii_then_escapes() {
        assert_eq!(Node::from("é").ascii(), "'\\xe9'");
        assert_eq!(Node::from("€").ascii(), "'\\u20ac'");
    }

    #[test]
    fn given_location_when_displaying_then_renders_known_parts() {
        assert_eq!(Location::new("jobs.toml").to_string(), "jobs.toml");
        assert_eq!(Location::new("jobs.toml").at(3, 8).to_string(), "jobs.toml:3:8");
    }

    #[test]
    fn given_tagged_table_when_deserializing_then_builds_tag() {
        let node: Node = serde_json::from_str(
            r#"{"!join": {"delimiter": ",", "items": ["a", "{b}"]}}"#,
        )
        .unwrap();

        assert_eq!(
            node,
            Node::Tagged(Tag::Join {
                delimiter: ",".to_string(),
                items: vec![Node::from("a"), Node::from("{b}")],
            })
        );
    }

    #[test]
    fn given_bad_raw_tag_when_deserializing_then_fails() {
        let result: Result<Node, _> = serde_json::from_str(r#"{"!raw": 5}"#);

        assert!(result.is_err());
    }

    #[test]
    fn given_toml_datetime_when_deserializing_then_becomes_string() {
        let table: BTreeMap<String, Node> = toml::from_str("at = 1979-05-27T07:32:00Z").unwrap();

        assert_eq!(table["at"], Node::from("1979-05-27T07:32:00Z"));
    }

    #[test]
    fn given_mixed_numbers_when_comparing_values_then_compares_numerically() {
        assert!(Node::Int(1).value_eq(&Node::Float(1.0)));
        assert!(Node::Bool(true).value_eq(&Node::Int(1)));
        assert!(Node::Seq(vec![Node::Int(2)]).value_eq(&Node::Seq(vec![Node::Float(2.0)])));
        assert!(!Node::Int(1).value_eq(&Node::from("1")));
        assert!(!Node::Float(1.5).value_eq(&Node::Int(1)));
    }
}
