//! The base grammar library: every terminal a synthesized grammar can use.
//!
//! A terminal is a deterministic scanner: given the document text and a byte
//! offset it either fails or consumes a prefix and yields its parsed value.
//! Each kind is maximal-munch on its own; alternation between terminals is
//! the parse engine's job.

use serde_json::{json, Value};
use std::fmt;

pub(crate) const MONTHS_SHORT: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) const MONTHS_LONG: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Fundamental value shapes with a fixed named rule in every grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, enum_iterator::Sequence)]
pub(crate) enum Predefined {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Percentage,
    Whitespace,
}

impl Predefined {
    pub(crate) fn all() -> impl Iterator<Item = Self> {
        enum_iterator::all::<Self>()
    }

    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Long => "Long",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::Percentage => "Percentage",
            Self::Whitespace => "Whitespace",
        }
    }

    /// Maps a catalog type name to its predefined terminal. `Whitespace` is
    /// grammar-internal and never a type name.
    pub(crate) fn from_type_name(s: &str) -> Option<Self> {
        match s {
            "String" => Some(Self::String),
            "Integer" => Some(Self::Integer),
            "Long" => Some(Self::Long),
            "Double" => Some(Self::Double),
            "Boolean" => Some(Self::Boolean),
            "Percentage" => Some(Self::Percentage),
            _ => None,
        }
    }

    fn scan(&self, rest: &str) -> Option<(usize, Value)> {
        match self {
            Self::String => scan_quoted(rest),
            Self::Integer | Self::Long => {
                let len = scan_signed_digits(rest)?;
                let n: i64 = rest[..len].parse().ok()?;
                Some((len, json!(n)))
            }
            Self::Double => scan_double(rest),
            Self::Percentage => scan_percentage(rest),
            Self::Boolean => {
                if rest.starts_with("true") {
                    Some((4, json!(true)))
                } else if rest.starts_with("false") {
                    Some((5, json!(false)))
                } else {
                    None
                }
            }
            Self::Whitespace => {
                let len = rest.len() - rest.trim_start().len();
                (len > 0).then(|| (len, Value::Null))
            }
        }
    }
}

/// One component of a date/time format pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateField {
    /// `DD`: two-digit day.
    DayPadded,
    /// `D`: one- or two-digit day.
    Day,
    /// `MMMM`: full month name.
    MonthLong,
    /// `MMM`: abbreviated month name.
    MonthShort,
    /// `MM`: two-digit month.
    MonthPadded,
    /// `M`: one- or two-digit month.
    Month,
    /// `YYYY`: four-digit year.
    Year,
    /// `HH`: two-digit hour.
    HourPadded,
    /// `H`: one- or two-digit hour.
    Hour,
    /// `mm`: two-digit minute.
    Minute,
    /// `ss`: two-digit second.
    Second,
    /// `SSS`: three-digit millisecond.
    Millisecond,
    /// `Z`: timezone offset, `+HH:MM`, `-HH:MM` or literal `Z`.
    TimeZone,
}

impl DateField {
    /// The logical field this token fills. Several tokens can fill the same
    /// slot, which is what the duplicate-field check keys on.
    pub(crate) const fn slot(&self) -> &'static str {
        match self {
            Self::DayPadded | Self::Day => "day",
            Self::MonthLong | Self::MonthShort | Self::MonthPadded | Self::Month => "month",
            Self::Year => "year",
            Self::HourPadded | Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
            Self::TimeZone => "timezone",
        }
    }

    fn scan(&self, rest: &str) -> Option<(usize, Value)> {
        match self {
            Self::DayPadded | Self::MonthPadded | Self::HourPadded | Self::Minute
            | Self::Second => scan_fixed_digits(rest, 2),
            Self::Day | Self::Month | Self::Hour => scan_flex_digits(rest, 1, 2),
            Self::Year => scan_fixed_digits(rest, 4),
            Self::Millisecond => scan_fixed_digits(rest, 3),
            Self::MonthShort => scan_month_name(rest, &MONTHS_SHORT),
            Self::MonthLong => scan_month_name(rest, &MONTHS_LONG),
            Self::TimeZone => scan_timezone(rest),
        }
    }
}

/// A terminal symbol of a synthesized grammar.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Terminal {
    /// Verbatim text.
    Lit(String),
    Predefined(Predefined),
    Date(DateField),
    /// Grouped-thousands-and-decimal number with the given separator pair.
    GroupedNumber { group: char, decimal: char },
    /// Three-letter uppercase currency code.
    CurrencyCode,
    /// A run of non-digit, non-whitespace characters standing for a
    /// currency symbol.
    CurrencySymbol,
    /// Longest match among a fixed set of literals (enum values).
    OneOf(Vec<String>),
}

impl Terminal {
    /// Scans this terminal at byte offset `at`, returning the consumed
    /// length and the parsed value. Deterministic: at most one match.
    pub(crate) fn scan(&self, input: &str, at: usize) -> Option<(usize, Value)> {
        let rest = &input[at..];
        match self {
            Self::Lit(s) => rest.starts_with(s.as_str()).then(|| (s.len(), json!(s))),
            Self::Predefined(p) => p.scan(rest),
            Self::Date(d) => d.scan(rest),
            Self::GroupedNumber { group, decimal } => scan_grouped(rest, *group, *decimal),
            Self::CurrencyCode => {
                let len = rest
                    .bytes()
                    .take_while(|b| b.is_ascii_uppercase())
                    .take(3)
                    .count();
                (len == 3).then(|| (3, json!(&rest[..3])))
            }
            Self::CurrencySymbol => {
                let len: usize = rest
                    .chars()
                    .take_while(|c| !c.is_ascii_digit() && !c.is_whitespace())
                    .map(|c| c.len_utf8())
                    .sum();
                (len > 0).then(|| (len, json!(&rest[..len])))
            }
            Self::OneOf(variants) => variants
                .iter()
                .filter(|v| rest.starts_with(v.as_str()))
                .max_by_key(|v| v.len())
                .map(|v| (v.len(), json!(v))),
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Lit(s) => write!(f, "{:?}", s),
            Self::Predefined(p) => write!(f, "{}", p.as_str()),
            Self::Date(d) => write!(f, "<{}>", d.slot()),
            Self::GroupedNumber { group, decimal } => {
                write!(f, "number(0{}0{}0)", group, decimal)
            }
            Self::CurrencyCode => write!(f, "<currencyCode>"),
            Self::CurrencySymbol => write!(f, "<currencySymbol>"),
            Self::OneOf(v) => write!(f, "({})", v.join(" | ")),
        }
    }
}

fn scan_fixed_digits(rest: &str, n: usize) -> Option<(usize, Value)> {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).take(n).count();
    (digits == n).then(|| (n, json!(rest[..n].parse::<i64>().unwrap())))
}

fn scan_flex_digits(rest: &str, min: usize, max: usize) -> Option<(usize, Value)> {
    let digits = rest
        .bytes()
        .take_while(u8::is_ascii_digit)
        .take(max)
        .count();
    (digits >= min).then(|| (digits, json!(rest[..digits].parse::<i64>().unwrap())))
}

fn scan_signed_digits(rest: &str) -> Option<usize> {
    let sign = usize::from(rest.starts_with('-'));
    let digits = rest[sign..].bytes().take_while(u8::is_ascii_digit).count();
    (digits > 0).then_some(sign + digits)
}

fn scan_double(rest: &str) -> Option<(usize, Value)> {
    let whole = scan_signed_digits(rest)?;
    if !rest[whole..].starts_with('.') {
        return None;
    }
    let frac = rest[whole + 1..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if frac == 0 {
        return None;
    }
    let mut len = whole + 1 + frac;
    // scientific notation, as produced by canonical float printing
    let tail = &rest[len..];
    if tail.starts_with('e') || tail.starts_with('E') {
        let sign = usize::from(tail[1..].starts_with('-') || tail[1..].starts_with('+'));
        let exp = tail[1 + sign..].bytes().take_while(u8::is_ascii_digit).count();
        if exp > 0 {
            len += 1 + sign + exp;
        }
    }
    let n: f64 = rest[..len].parse().ok()?;
    Some((len, json!(n)))
}

fn scan_percentage(rest: &str) -> Option<(usize, Value)> {
    let whole = scan_signed_digits(rest)?;
    let mut len = whole;
    if rest[len..].starts_with('.') {
        let frac = rest[len + 1..]
            .bytes()
            .take_while(u8::is_ascii_digit)
            .count();
        if frac > 0 {
            len += 1 + frac;
        }
    }
    if !rest[len..].starts_with('%') {
        return None;
    }
    let n: f64 = rest[..len].parse().ok()?;
    Some((len + 1, json!(n)))
}

fn scan_quoted(rest: &str) -> Option<(usize, Value)> {
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, '"')) => (),
        _ => return None,
    }
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((i + 1, json!(out))),
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                _ => return None,
            },
            _ => out.push(c),
        }
    }
    None
}

fn scan_month_name(rest: &str, names: &[&str; 12]) -> Option<(usize, Value)> {
    names
        .iter()
        .position(|name| rest.starts_with(name))
        .map(|i| (names[i].len(), json!(i as i64 + 1)))
}

fn scan_timezone(rest: &str) -> Option<(usize, Value)> {
    if rest.starts_with('Z') {
        return Some((1, json!("Z")));
    }
    if !(rest.starts_with('+') || rest.starts_with('-')) {
        return None;
    }
    let b = rest.as_bytes();
    if b.len() >= 6
        && b[1].is_ascii_digit()
        && b[2].is_ascii_digit()
        && b[3] == b':'
        && b[4].is_ascii_digit()
        && b[5].is_ascii_digit()
    {
        Some((6, json!(&rest[..6])))
    } else {
        None
    }
}

fn scan_grouped(rest: &str, group: char, decimal: char) -> Option<(usize, Value)> {
    let mut digits = String::new();
    let mut len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if len == 0 {
        return None;
    }
    digits.push_str(&rest[..len]);
    // further groups of exactly three digits
    loop {
        let tail = &rest[len..];
        if !tail.starts_with(group) {
            break;
        }
        let g = group.len_utf8();
        let n = tail[g..].bytes().take_while(u8::is_ascii_digit).take(4).count();
        if n != 3 {
            break;
        }
        digits.push_str(&tail[g..g + 3]);
        len += g + 3;
    }
    let tail = &rest[len..];
    if tail.starts_with(decimal) {
        let d = decimal.len_utf8();
        let n = tail[d..].bytes().take_while(u8::is_ascii_digit).count();
        if n > 0 {
            digits.push('.');
            digits.push_str(&tail[d..d + n]);
            len += d + n;
        }
    }
    let value: f64 = digits.parse().ok()?;
    Some((len, json!(value)))
}
