//! The text generator: the inverse of parsing.
//!
//! Walks the template AST with a data record and re-renders the document:
//! literal chunks copy through, bindings substitute the record's current
//! value with a fixed per-type conversion. Custom parse formats are
//! parse-only; `DateTime` always renders as `MM/DD/YYYY` regardless of the
//! pattern that parsed it.

use crate::error::{Error, ErrorRepr};
use crate::model::{Catalog, Property};
use crate::template::{Span, TemplateAst, TemplateNode};
use itoa::Buffer as itoaBuffer;
use ryu::Buffer as ryuBuffer;
use serde_json::{Map, Value};

/// Renders `data`, a record of type `root_type`, through the template.
///
/// Pure traversal; fails rather than guessing when the data is missing a
/// required property or a value has the wrong shape for its declared type.
pub fn render<C: Catalog + ?Sized>(
    ast: &TemplateAst,
    root_type: &str,
    catalog: &C,
    data: &Value,
) -> Result<String, Error> {
    let mut out = String::new();
    let renderer = Renderer { catalog };
    renderer.body(ast, root_type, data, &mut out)?;
    Ok(out)
}

struct Renderer<'c, C: ?Sized> {
    catalog: &'c C,
}

impl<C: Catalog + ?Sized> Renderer<'_, C> {
    fn body(
        &self,
        ast: &TemplateAst,
        type_name: &str,
        data: &Value,
        out: &mut String,
    ) -> Result<(), Error> {
        for node in ast.nodes() {
            match node {
                TemplateNode::Chunk { text, .. } | TemplateNode::LastChunk { text, .. } => {
                    out.push_str(text);
                }
                TemplateNode::ExprChunk { expr, .. } => {
                    out.push_str("{{%");
                    out.push_str(&expr.source);
                    out.push_str("%}}");
                }
                TemplateNode::Binding { field, span }
                | TemplateNode::FormattedBinding { field, span, .. } => {
                    let property = self.resolve(type_name, field, *span)?;
                    match field_value(data, field) {
                        Some(value) => self.value(&property, value, out)?,
                        None if property.is_optional => (),
                        None => return Err(missing(field)),
                    }
                }
                TemplateNode::BooleanBinding {
                    field,
                    phrase,
                    span,
                } => {
                    let property = self.resolve(type_name, field, *span)?;
                    if property.type_name != "Boolean" || property.is_array {
                        return Err(Error(ErrorRepr::InvalidBooleanBinding {
                            property: field.clone(),
                            type_name: property.type_name,
                            line: span.line,
                            column: span.column,
                        }));
                    }
                    match field_value(data, field) {
                        Some(Value::Bool(true)) => out.push_str(phrase),
                        Some(Value::Bool(false)) | None => (),
                        Some(_) => return Err(invalid(field, "Boolean")),
                    }
                }
                TemplateNode::ClauseBinding { field, body, span }
                | TemplateNode::WithBinding { field, body, span }
                | TemplateNode::ListBinding { field, body, span } => {
                    let property = self.resolve(type_name, field, *span)?;
                    match field_value(data, field) {
                        Some(Value::Array(items)) if property.is_array => {
                            for (i, item) in items.iter().enumerate() {
                                if i > 0 {
                                    out.push(' ');
                                }
                                self.body(body, &property.type_name, item, out)?;
                            }
                        }
                        Some(item @ Value::Object(_)) if !property.is_array => {
                            self.body(body, &property.type_name, item, out)?;
                        }
                        Some(_) => return Err(invalid(field, "record")),
                        None if property.is_optional => (),
                        None => return Err(missing(field)),
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, type_name: &str, field: &str, span: Span) -> Result<Property, Error> {
        self.catalog
            .property(type_name, field)
            .cloned()
            .ok_or_else(|| {
                Error(ErrorRepr::UnresolvedProperty {
                    property: field.to_string(),
                    type_name: type_name.to_string(),
                    line: span.line,
                    column: span.column,
                })
            })
    }

    /// Renders one bound value, or each element of an array space-joined.
    fn value(&self, property: &Property, value: &Value, out: &mut String) -> Result<(), Error> {
        if property.is_array {
            match value {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(' ');
                        }
                        self.scalar(property, item, out)?;
                    }
                    Ok(())
                }
                _ => Err(invalid(&property.name, "array")),
            }
        } else {
            self.scalar(property, value, out)
        }
    }

    fn scalar(&self, property: &Property, value: &Value, out: &mut String) -> Result<(), Error> {
        if property.is_relationship {
            return match value.as_str() {
                Some(id) => {
                    push_quoted(id, out);
                    Ok(())
                }
                None => Err(invalid(&property.name, "identifier")),
            };
        }
        if property.is_enum {
            return match value.as_str() {
                Some(literal) => {
                    out.push_str(literal);
                    Ok(())
                }
                None => Err(invalid(&property.name, "enum literal")),
            };
        }
        match property.type_name.as_str() {
            "String" => match value.as_str() {
                Some(s) => {
                    push_quoted(s, out);
                    Ok(())
                }
                None => Err(invalid(&property.name, "String")),
            },
            "Integer" | "Long" => match value.as_i64() {
                Some(n) => {
                    out.push_str(itoaBuffer::new().format(n));
                    Ok(())
                }
                None => Err(invalid(&property.name, "Integer")),
            },
            "Double" => match value.as_f64() {
                Some(n) => {
                    out.push_str(ryuBuffer::new().format(n));
                    Ok(())
                }
                None => Err(invalid(&property.name, "Double")),
            },
            "Percentage" => match value.as_f64() {
                Some(n) => {
                    out.push_str(ryuBuffer::new().format(n));
                    out.push('%');
                    Ok(())
                }
                None => Err(invalid(&property.name, "Percentage")),
            },
            "Boolean" => match value.as_bool() {
                Some(b) => {
                    out.push_str(if b { "true" } else { "false" });
                    Ok(())
                }
                None => Err(invalid(&property.name, "Boolean")),
            },
            "DateTime" => self.date(property, value, out),
            // nested record types concatenate their rendered properties
            other => match value {
                Value::Object(map) => self.object(other, map, out),
                _ => Err(invalid(&property.name, "record")),
            },
        }
    }

    /// The fixed `MM/DD/YYYY` layout, whatever pattern the value was
    /// parsed with. Accepts an ISO date or datetime string, or a
    /// `ParsedDateTime` component record from a previous parse.
    fn date(&self, property: &Property, value: &Value, out: &mut String) -> Result<(), Error> {
        match value {
            Value::String(s) => {
                let date = chrono::DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.date_naive())
                    .or_else(|_| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d"))
                    .map_err(|_| invalid(&property.name, "DateTime"))?;
                out.push_str(&date.format("%m/%d/%Y").to_string());
                Ok(())
            }
            Value::Object(map) => {
                let component = |name: &str| {
                    map.get(name)
                        .and_then(Value::as_i64)
                        .ok_or_else(|| invalid(&property.name, "DateTime"))
                };
                let (month, day, year) =
                    (component("month")?, component("day")?, component("year")?);
                out.push_str(&format!("{:02}/{:02}/{:04}", month, day, year));
                Ok(())
            }
            _ => Err(invalid(&property.name, "DateTime")),
        }
    }

    /// A record value: declared properties render in declaration order
    /// when the catalog knows the type; otherwise (`Parsed…` component
    /// records) entries render by value shape. Space-separated either way.
    fn object(&self, type_name: &str, map: &Map<String, Value>, out: &mut String) -> Result<(), Error> {
        let mut first = true;
        let mut separate = |out: &mut String| {
            if !first {
                out.push(' ');
            }
            first = false;
        };
        if let Some(properties) = self.catalog.properties(type_name) {
            for property in properties.to_vec() {
                if let Some(value) = map.get(&property.name) {
                    separate(out);
                    self.value(&property, value, out)?;
                }
            }
            return Ok(());
        }
        for (key, value) in map {
            if key == "$class" {
                continue;
            }
            separate(out);
            match value {
                Value::String(s) => out.push_str(s),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => out.push_str(itoaBuffer::new().format(i)),
                    None => out.push_str(
                        ryuBuffer::new().format(n.as_f64().unwrap_or_default()),
                    ),
                },
                Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                _ => return Err(invalid(key, "scalar")),
            }
        }
        Ok(())
    }
}

fn field_value<'v>(data: &'v Value, field: &str) -> Option<&'v Value> {
    match data.get(field) {
        Some(Value::Null) | None => None,
        Some(v) => Some(v),
    }
}

fn push_quoted(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn missing(field: &str) -> Error {
    Error(ErrorRepr::MissingProperty {
        property: field.to_string(),
    })
}

fn invalid(field: &str, expected: &'static str) -> Error {
    Error(ErrorRepr::InvalidValue {
        property: field.to_string(),
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryCatalog;
    use serde_json::json;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new("org.acme")
            .declare(
                "Shipment",
                vec![
                    Property::new("carrier", "String"),
                    Property::new("parcels", "Integer").array(),
                    Property::new("weight", "Double"),
                    Property::new("insured", "Boolean"),
                    Property::new("due", "DateTime"),
                    Property::new("priority", "Priority").enumerated(),
                    Property::new("signedBy", "Driver").relationship(),
                    Property::new("route", "Route").optional(),
                    Property::new("legs", "Leg").array(),
                    Property::new("note", "String").optional(),
                ],
            )
            .declare(
                "Route",
                vec![
                    Property::new("origin", "String"),
                    Property::new("destination", "String"),
                ],
            )
            .declare("Leg", vec![Property::new("miles", "Double")])
            .declare_enum("Priority", vec!["EXPRESS", "STANDARD"])
    }

    fn run(template: &str, data: Value) -> Result<String, Error> {
        let ast: TemplateAst = template.parse().unwrap();
        render(&ast, "Shipment", &catalog(), &data)
    }

    #[test]
    fn renders_typed_values() {
        let out = run(
            "{{carrier}} carries {{parcels}} weighing {{weight}} for {{priority}} signed {{signedBy}}",
            json!({
                "carrier": "Acme Ltd",
                "parcels": [3, 4],
                "weight": 12.5,
                "priority": "EXPRESS",
                "signedBy": "driver-7",
            }),
        )
        .unwrap();
        assert_eq!(
            out,
            "\"Acme Ltd\" carries 3 4 weighing 12.5 for EXPRESS signed \"driver-7\""
        );
    }

    #[test]
    fn renders_dates_in_fixed_layout() {
        let out = run("due {{due}}", json!({"due": "2017-12-19"})).unwrap();
        assert_eq!(out, "due 12/19/2017");
        let out = run("due {{due}}", json!({"due": "2017-12-19T17:38:01Z"})).unwrap();
        assert_eq!(out, "due 12/19/2017");
        // custom formats are parse-only: a formatted binding renders the
        // same fixed layout
        let out = run(
            r#"due {{due as "DD MMM YYYY"}}"#,
            json!({"due": {"$class": "ParsedDateTime", "day": 19, "month": 12, "year": 2017}}),
        )
        .unwrap();
        assert_eq!(out, "due 12/19/2017");
    }

    #[test]
    fn boolean_phrase_present_only_when_true() {
        let template = r#"{{insured ? "fully insured "}}cargo"#;
        assert_eq!(
            run(template, json!({"insured": true})).unwrap(),
            "fully insured cargo"
        );
        assert_eq!(run(template, json!({"insured": false})).unwrap(), "cargo");
        assert_eq!(run(template, json!({})).unwrap(), "cargo");
        assert!(run(template, json!({"insured": "yes"})).is_err());
    }

    #[test]
    fn quotes_are_escaped() {
        let out = run("{{carrier}}", json!({"carrier": "Acme \"Fast\" Ltd"})).unwrap();
        assert_eq!(out, r#""Acme \"Fast\" Ltd""#);
    }

    #[test]
    fn optional_absent_renders_nothing() {
        assert_eq!(run("note:{{note}}", json!({})).unwrap(), "note:");
        assert_eq!(
            run("note:{{note}}", json!({"note": "x"})).unwrap(),
            "note:\"x\""
        );
    }

    #[test]
    fn missing_required_property_fails() {
        let err = run("{{carrier}}", json!({})).unwrap_err();
        assert_eq!(
            err,
            Error(ErrorRepr::MissingProperty {
                property: "carrier".into()
            })
        );
    }

    #[test]
    fn wrong_shape_fails() {
        let err = run("{{carrier}}", json!({"carrier": 5})).unwrap_err();
        assert!(matches!(err.0, ErrorRepr::InvalidValue { .. }));
        let err = run("{{parcels}}", json!({"parcels": 5})).unwrap_err();
        assert!(matches!(err.0, ErrorRepr::InvalidValue { .. }));
    }

    #[test]
    fn nested_blocks_recurse() {
        let out = run(
            "{{#with route}}{{origin}} to {{destination}}{{/with}}!",
            json!({"route": {"origin": "A", "destination": "B"}}),
        )
        .unwrap();
        assert_eq!(out, "\"A\" to \"B\"!");

        // optional block absent
        let out = run("{{#with route}}x{{/with}}done", json!({})).unwrap();
        assert_eq!(out, "done");
    }

    #[test]
    fn list_blocks_join_items() {
        let out = run(
            "{{#list legs}}{{miles}} mi{{/list}}.",
            json!({"legs": [{"miles": 1.5}, {"miles": 2.5}]}),
        )
        .unwrap();
        assert_eq!(out, "1.5 mi 2.5 mi.");
    }

    #[test]
    fn expr_chunks_re_emit_verbatim() {
        let ast: TemplateAst = "{{% weight * 2.0 %}}".parse().unwrap();
        let out = render(&ast, "Shipment", &catalog(), &json!({})).unwrap();
        assert_eq!(out, "{{% weight * 2.0 %}}");
    }

    #[test]
    fn unresolved_property_fails() {
        let err = run("{{ghost}}", json!({"ghost": 1})).unwrap_err();
        assert!(matches!(err.0, ErrorRepr::UnresolvedProperty { .. }));
    }
}
