//! Scalar format rule builders.
//!
//! A format pattern such as `"DD MMM YYYY"` or `"K0,0.00"` compiles into a
//! named grammar fragment: a symbol sequence over the base terminals plus a
//! semantic action producing a `Parsed…` record. Rule names are a content
//! hash of the pattern, so the same pattern used anywhere in a grammar
//! resolves to the same rule and is declared once.

use crate::error::{Error, ErrorRepr};
use crate::grammar::{Action, Rule, Sym, SymKind};
use crate::terminals::{DateField, Terminal};

/// Rendering layout for `DateTime` values and the default parse pattern for
/// unformatted `DateTime` bindings.
pub(crate) const DEFAULT_DATE_TIME: &str = "MM/DD/YYYY";

/// Default parse pattern for unformatted `MonetaryAmount` bindings.
pub(crate) const DEFAULT_MONETARY: &str = "CCC 0,0.00";

/// A built format fragment: the name to reference plus every rule the
/// fragment needs declared (the fragment itself and, for amounts, the
/// shared grouped-number sub-rule).
#[derive(Debug)]
pub(crate) struct FormatRules {
    pub name: String,
    pub rules: Vec<Rule>,
}

/// Tracks which logical fields a pattern has produced so far. Shared by
/// both builders: a field seen twice is fatal, never merged.
#[derive(Default)]
struct FieldSet {
    seen: Vec<&'static str>,
}

impl FieldSet {
    fn claim(&mut self, field: &'static str, pattern: &str) -> Result<(), Error> {
        if self.seen.contains(&field) {
            return Err(Error(ErrorRepr::DuplicateFormatField {
                field,
                pattern: pattern.to_string(),
                line: 0,
                column: 0,
            }));
        }
        self.seen.push(field);
        Ok(())
    }
}

const DATE_TOKENS: [(&str, DateField); 13] = [
    ("DD", DateField::DayPadded),
    ("D", DateField::Day),
    ("MMMM", DateField::MonthLong),
    ("MMM", DateField::MonthShort),
    ("MM", DateField::MonthPadded),
    ("M", DateField::Month),
    ("YYYY", DateField::Year),
    ("HH", DateField::HourPadded),
    ("H", DateField::Hour),
    ("mm", DateField::Minute),
    ("ss", DateField::Second),
    ("SSS", DateField::Millisecond),
    ("Z", DateField::TimeZone),
];

/// Builds the grammar fragment for a date/time format pattern.
///
/// Recognized tokens map to fields as `D`/`DD` day, `M`/`MM`/`MMM`/`MMMM`
/// month, `YYYY` year, `H`/`HH` hour, `mm` minute, `ss` second, `SSS`
/// millisecond, `Z` timezone. Unrecognized characters are literal
/// separators matched verbatim.
pub(crate) fn date_time_rule(pattern: &str) -> Result<FormatRules, Error> {
    let name = format!("DateTime_{:016x}", fxhash::hash64(pattern));
    let mut fields = FieldSet::default();
    let mut symbols: Vec<Sym> = Vec::new();
    let mut captures: Vec<(String, usize)> = Vec::new();
    let mut sep = String::new();
    let mut rest = pattern;

    while !rest.is_empty() {
        match DATE_TOKENS
            .iter()
            .find(|(token, _)| rest.starts_with(token))
        {
            Some((token, field)) => {
                fields.claim(field.slot(), pattern)?;
                flush_sep(&mut sep, &mut symbols);
                captures.push((field.slot().to_string(), symbols.len()));
                symbols.push(Sym::one(SymKind::Terminal(Terminal::Date(*field))));
                rest = &rest[token.len()..];
            }
            None => {
                let c = rest.chars().next().unwrap();
                sep.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    flush_sep(&mut sep, &mut symbols);

    if captures.is_empty() {
        return Err(Error(ErrorRepr::EmptyFormatPattern {
            pattern: pattern.to_string(),
            line: 0,
            column: 0,
        }));
    }

    let rule = Rule::new(
        name.clone(),
        symbols,
        Action::Parsed {
            class: String::from("ParsedDateTime"),
            fields: captures,
        },
    );
    Ok(FormatRules {
        name,
        rules: vec![rule],
    })
}

/// Builds the grammar fragment for an amount format pattern, plain or
/// currency-qualified.
///
/// The numeric marker is the five-character shape `0<group>0<decimal>0`
/// (e.g. `0,0.0`); it expands into a shared sub-rule named after the
/// separator pair. The monetary variant additionally recognizes `CCC`
/// (currency code) and `K` (currency symbol) markers.
pub(crate) fn amount_rule(pattern: &str, monetary: bool) -> Result<FormatRules, Error> {
    let kind = if monetary { "MonetaryAmount" } else { "Amount" };
    let name = format!("{}_{:016x}", kind, fxhash::hash64(pattern));
    let mut fields = FieldSet::default();
    let mut symbols: Vec<Sym> = Vec::new();
    let mut captures: Vec<(String, usize)> = Vec::new();
    let mut rules: Vec<Rule> = Vec::new();
    let mut sep = String::new();
    let mut rest = pattern;

    while !rest.is_empty() {
        if let Some((group, decimal, len)) = numeric_marker(rest) {
            fields.claim("doubleValue", pattern)?;
            flush_sep(&mut sep, &mut symbols);
            let number = number_rule(group, decimal);
            captures.push((String::from("doubleValue"), symbols.len()));
            symbols.push(Sym::one(SymKind::Ref(number.name.clone())));
            rules.push(number);
            rest = &rest[len..];
        } else if monetary && rest.starts_with("CCC") {
            fields.claim("currencyCode", pattern)?;
            flush_sep(&mut sep, &mut symbols);
            captures.push((String::from("currencyCode"), symbols.len()));
            symbols.push(Sym::one(SymKind::Terminal(Terminal::CurrencyCode)));
            rest = &rest[3..];
        } else if monetary && rest.starts_with('K') {
            fields.claim("currencySymbol", pattern)?;
            flush_sep(&mut sep, &mut symbols);
            captures.push((String::from("currencySymbol"), symbols.len()));
            symbols.push(Sym::one(SymKind::Terminal(Terminal::CurrencySymbol)));
            rest = &rest[1..];
        } else {
            let c = rest.chars().next().unwrap();
            sep.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    flush_sep(&mut sep, &mut symbols);

    if !fields.seen.contains(&"doubleValue") {
        return Err(Error(ErrorRepr::EmptyFormatPattern {
            pattern: pattern.to_string(),
            line: 0,
            column: 0,
        }));
    }

    rules.push(Rule::new(
        name.clone(),
        symbols,
        Action::Parsed {
            class: format!("Parsed{}", kind),
            fields: captures,
        },
    ));
    Ok(FormatRules { name, rules })
}

/// The shared grouped-number sub-rule for one separator pair, folding
/// grouped digits into a single double.
fn number_rule(group: char, decimal: char) -> Rule {
    let name = format!("Number_{:016x}", fxhash::hash64(&(group, decimal)));
    Rule::new(
        name,
        vec![Sym::one(SymKind::Terminal(Terminal::GroupedNumber {
            group,
            decimal,
        }))],
        Action::Forward,
    )
}

/// Matches `0<g>0<d>0…` at the head of `rest`, where the separators are
/// single non-digit characters. Extra trailing zeros spell out a decimal
/// place count (`0,0.00`); the parsed value keeps whatever places the
/// document carries, so they only extend the marker.
fn numeric_marker(rest: &str) -> Option<(char, char, usize)> {
    let mut chars = rest.chars();
    let (z1, g, z2, d, z3) = (
        chars.next()?,
        chars.next()?,
        chars.next()?,
        chars.next()?,
        chars.next()?,
    );
    let shape = z1 == '0'
        && z2 == '0'
        && z3 == '0'
        && !g.is_ascii_digit()
        && !d.is_ascii_digit()
        && g != d;
    if !shape {
        return None;
    }
    let mut len = 3 + g.len_utf8() + d.len_utf8();
    len += rest[len..].bytes().take_while(|b| *b == b'0').count();
    Some((g, d, len))
}

fn flush_sep(sep: &mut String, symbols: &mut Vec<Sym>) {
    if !sep.is_empty() {
        symbols.push(Sym::one(SymKind::Terminal(Terminal::Lit(std::mem::take(
            sep,
        )))));
    }
}
