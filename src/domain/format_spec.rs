//! Format-spec mini-language applied after a field's value is looked up.
//!
//! `[[fill]align][sign][#][0][width][,|_][.precision][type]`

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::node::{float_repr, Node};

static SPEC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<fill>.)?(?P<align>[<>=^]))?(?P<sign>[-+ ])?(?P<alt>#)?(?P<zero>0)?(?P<width>\d+)?(?P<group>[,_])?(?:\.(?P<precision>\d+))?(?P<kind>[bcdeEfFgGnosxX%])?$",
    )
    .expect("format spec pattern is valid")
});

/// Upper bound for width and precision.
const MAX_FORMAT_NUMBER: usize = 100_000;

/// Render `value` according to `spec`. Errors carry a reason only; the
/// caller adds the template and spec text.
pub fn apply(value: &Node, spec: &str) -> Result<String, String> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let spec = FormatSpec::parse(spec)?;
    match value {
        Node::Str(s) => spec.format_str(s),
        Node::Int(i) => spec.format_int(*i),
        Node::Bool(b) => spec.format_int(i64::from(*b)),
        Node::Float(x) => spec.format_float(*x),
        other => Err(format!(
            "unsupported format string passed to {}.__format__",
            other.type_name()
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self, String> {
        let caps = SPEC_PATTERN
            .captures(spec)
            .ok_or_else(|| "Invalid format specifier".to_string())?;
        let char_of = |name: &str| caps.name(name).and_then(|m| m.as_str().chars().next());
        let number_of = |name: &str| {
            caps.name(name)
                .map(|m| {
                    m.as_str()
                        .parse::<usize>()
                        .ok()
                        .filter(|n| *n <= MAX_FORMAT_NUMBER)
                        .ok_or_else(|| "Too many decimal digits in format string".to_string())
                })
                .transpose()
        };
        Ok(Self {
            fill: char_of("fill"),
            align: char_of("align"),
            sign: char_of("sign"),
            alternate: caps.name("alt").is_some(),
            zero: caps.name("zero").is_some(),
            width: number_of("width")?.unwrap_or(0),
            grouping: char_of("group"),
            precision: number_of("precision")?,
            kind: char_of("kind"),
        })
    }

    fn format_str(&self, s: &str) -> Result<String, String> {
        if let Some(kind) = self.kind.filter(|k| *k != 's') {
            return Err(format!("Unknown format code '{kind}' for object of type 'str'"));
        }
        if self.sign.is_some() {
            return Err("Sign not allowed in string format specifier".to_string());
        }
        if self.alternate {
            return Err("Alternate form (#) not allowed in string format specifier".to_string());
        }
        if let Some(group) = self.grouping {
            return Err(format!("Cannot specify '{group}' with 's'."));
        }
        if self.align == Some('=') {
            return Err("'=' alignment not allowed in string format specifier".to_string());
        }
        let body: String = match self.precision {
            Some(precision) => s.chars().take(precision).collect(),
            None => s.to_string(),
        };
        Ok(self.pad("", &body, '<'))
    }

    fn format_int(&self, i: i64) -> Result<String, String> {
        let magnitude = i.unsigned_abs();
        let (digits, radix_prefix, group_size) = match self.kind {
            None | Some('d') | Some('n') => (magnitude.to_string(), "", 3),
            Some('b') => (format!("{magnitude:b}"), "0b", 4),
            Some('o') => (format!("{magnitude:o}"), "0o", 4),
            Some('x') => (format!("{magnitude:x}"), "0x", 4),
            Some('X') => (format!("{magnitude:X}"), "0X", 4),
            Some('c') => {
                let c = u32::try_from(i)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| "%c arg not in range(0x110000)".to_string())?;
                return Ok(self.pad("", &c.to_string(), '>'));
            }
            Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return self.format_float(i as f64),
            Some(kind) => {
                return Err(format!("Unknown format code '{kind}' for object of type 'int'"))
            }
        };
        if self.precision.is_some() {
            return Err("Precision not allowed in integer format specifier".to_string());
        }
        let digits = match self.grouping {
            Some(separator) if self.kind == Some('n') => {
                return Err(format!("Cannot specify '{separator}' with 'n'."));
            }
            Some(',') if group_size != 3 => {
                let kind = self.kind.unwrap_or('d');
                return Err(format!("Cannot specify ',' with '{kind}'."));
            }
            Some(separator) => group_digits(&digits, separator, group_size),
            None => digits,
        };
        let mut prefix = self.sign_prefix(i < 0);
        if self.alternate {
            prefix.push_str(radix_prefix);
        }
        Ok(self.pad(&prefix, &digits, '>'))
    }

    fn format_float(&self, x: f64) -> Result<String, String> {
        let negative = x.is_sign_negative() && !x.is_nan();
        let magnitude = x.abs();
        let precision = self.precision.unwrap_or(6);
        let mut body = if magnitude.is_nan() {
            "nan".to_string()
        } else if magnitude.is_infinite() {
            "inf".to_string()
        } else {
            match self.kind {
                Some('f' | 'F') => format!("{magnitude:.precision$}"),
                Some('e' | 'E') => exponent_notation(magnitude, precision),
                Some('g' | 'G' | 'n') => general_notation(magnitude, precision, self.alternate),
                Some('%') => format!("{:.precision$}%", magnitude * 100.0),
                None => match self.precision {
                    Some(precision) => general_notation(magnitude, precision, self.alternate),
                    None => float_repr(magnitude),
                },
                Some(kind) => {
                    return Err(format!(
                        "Unknown format code '{kind}' for object of type 'float'"
                    ))
                }
            }
        };
        if matches!(self.kind, Some('E' | 'F' | 'G')) {
            body = body.to_uppercase();
        }
        if let Some(separator) = self.grouping {
            body = group_leading_digits(&body, separator);
        }
        Ok(self.pad(&self.sign_prefix(negative), &body, '>'))
    }

    fn sign_prefix(&self, negative: bool) -> String {
        match (negative, self.sign) {
            (true, _) => "-",
            (false, Some('+')) => "+",
            (false, Some(' ')) => " ",
            _ => "",
        }
        .to_string()
    }

    /// Pad `prefix + body` to the requested width. `=` puts the padding
    /// between the sign/radix prefix and the digits.
    fn pad(&self, prefix: &str, body: &str, default_align: char) -> String {
        let fill = self.fill.unwrap_or(if self.zero { '0' } else { ' ' });
        let align = self.align.unwrap_or(if self.zero && default_align == '>' {
            '='
        } else {
            default_align
        });
        let len = prefix.chars().count() + body.chars().count();
        if self.width <= len {
            return format!("{prefix}{body}");
        }
        let missing = self.width - len;
        let filler = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
        match align {
            '<' => format!("{prefix}{body}{}", filler(missing)),
            '^' => format!(
                "{}{prefix}{body}{}",
                filler(missing / 2),
                filler(missing - missing / 2)
            ),
            '=' => format!("{prefix}{}{body}", filler(missing)),
            _ => format!("{}{prefix}{body}", filler(missing)),
        }
    }
}

fn group_digits(digits: &str, separator: char, size: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / size);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % size == 0 {
            out.push(separator);
        }
        out.push(*c);
    }
    out
}

fn group_leading_digits(body: &str, separator: char) -> String {
    let end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    let (digits, rest) = body.split_at(end);
    format!("{}{rest}", group_digits(digits, separator, 3))
}

/// `1.500000e+03` style: signed exponent with at least two digits.
fn exponent_notation(x: f64, precision: usize) -> String {
    let raw = format!("{x:.precision$e}");
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => raw,
    }
}

/// `g` presentation: fixed or exponent notation depending on magnitude,
/// trailing zeros removed unless the alternate form is requested.
fn general_notation(x: f64, precision: usize, alternate: bool) -> String {
    let precision = precision.max(1);
    let digits = precision - 1;
    let exponent = if x == 0.0 {
        0
    } else {
        format!("{x:.digits$e}")
            .split_once('e')
            .and_then(|(_, e)| e.parse::<i64>().ok())
            .unwrap_or(0)
    };
    let significant = i64::try_from(precision).unwrap_or(i64::MAX);
    let body = if (-4..significant).contains(&exponent) {
        let decimals = usize::try_from(significant - 1 - exponent).unwrap_or(0);
        format!("{x:.decimals$}")
    } else {
        exponent_notation(x, digits)
    };
    if alternate {
        body
    } else {
        strip_trailing_zeros(&body)
    }
}

fn strip_trailing_zeros(body: &str) -> String {
    let (mantissa, exponent) = match body.find('e') {
        Some(pos) => body.split_at(pos),
        None => (body, ""),
    };
    if !mantissa.contains('.') {
        return body.to_string();
    }
    let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{mantissa}{exponent}")
}
