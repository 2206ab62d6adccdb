use proptest::prelude::*;
use serde_json::{json, Value};
use stencil_lib::{render, synthesize, CompiledGrammar, MemoryCatalog, Property, TemplateAst};

fn catalog() -> MemoryCatalog {
    MemoryCatalog::new("org.acme.logistics")
        .declare(
            "DeliveryClause",
            vec![
                Property::new("clauseId", "String").identifier(),
                Property::new("carrier", "String"),
                Property::new("parcels", "Integer").array(),
                Property::new("priority", "Priority").enumerated(),
                Property::new("insured", "Boolean"),
                Property::new("due", "DateTime"),
                Property::new("fee", "MonetaryAmount"),
                Property::new("route", "Route"),
                Property::new("legs", "Leg").array(),
                Property::new("notes", "String").optional(),
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

fn compile(template: &str) -> CompiledGrammar {
    let ast: TemplateAst = template.parse().unwrap();
    synthesize(&ast, "DeliveryClause", &catalog())
        .unwrap()
        .compile()
        .unwrap()
}

#[test]
fn parses_a_full_document() {
    let parser = compile(
        r#"Carrier {{carrier}} ships {{parcels}} parcels at {{priority}} priority.
{{insured ? "The goods are insured. "}}Delivery is due {{due as "DD MMM YYYY"}} for a fee of {{fee as "K0,0.00"}}.
{{#with route}}The route runs from {{origin}} to {{destination}}.{{/with}}
{{#list legs}}One leg of {{miles}} miles.{{/list}} Signed."#,
    );

    let record = parser
        .parse(
            r#"Carrier "Acme Ltd" ships 3 4 parcels at EXPRESS priority.
The goods are insured. Delivery is due 19 Dec 2017 for a fee of K1,250.75.
The route runs from "Lyon" to "Nantes".
One leg of 120.5 miles. One leg of 80.25 miles. Signed."#,
        )
        .unwrap();

    assert_eq!(record["$class"], json!("org.acme.logistics.DeliveryClause"));
    assert_eq!(record["carrier"], json!("Acme Ltd"));
    assert_eq!(record["parcels"], json!([3, 4]));
    assert_eq!(record["priority"], json!("EXPRESS"));
    assert_eq!(record["insured"], json!(true));
    assert_eq!(
        record["due"],
        json!({"$class": "ParsedDateTime", "day": 19, "month": 12, "year": 2017})
    );
    assert_eq!(
        record["fee"],
        json!({"$class": "ParsedMonetaryAmount", "currencySymbol": "K", "doubleValue": 1250.75})
    );
    assert_eq!(
        record["route"],
        json!({"$class": "org.acme.logistics.Route", "origin": "Lyon", "destination": "Nantes"})
    );
    assert_eq!(
        record["legs"],
        json!([
            {"$class": "org.acme.logistics.Leg", "miles": 120.5},
            {"$class": "org.acme.logistics.Leg", "miles": 80.25}
        ])
    );
    // the identifying property is unbound in the template, so the parse
    // supplies a generated identifier
    assert_eq!(record["clauseId"].as_str().unwrap().len(), 36);
    // the optional unbound property is simply absent
    assert!(record.get("notes").is_none());
}

#[test]
fn boolean_phrase_absent_parses_false() {
    let parser = compile(r#"Terms. {{insured ? "The goods are insured. "}}Signed."#);
    let record = parser
        .parse("Terms. The goods are insured. Signed.")
        .unwrap();
    assert_eq!(record["insured"], json!(true));
    let record = parser.parse("Terms. Signed.").unwrap();
    assert_eq!(record["insured"], json!(false));
}

#[test]
fn date_time_components_parse() {
    let parser = compile(r#"due {{due as "DD MMM YYYY HH:mm:ss.SSS Z"}}"#);
    let record = parser.parse("due 19 Dec 2017 17:38:01.000 +00:00").unwrap();
    assert_eq!(
        record["due"],
        json!({
            "$class": "ParsedDateTime",
            "day": 19,
            "month": 12,
            "year": 2017,
            "hour": 17,
            "minute": 38,
            "second": 1,
            "millisecond": 0,
            "timezone": "+00:00"
        })
    );
}

#[test]
fn monetary_amount_components() {
    let parser = compile(r#"fee {{fee as "K0,0.0"}}"#);
    let record = parser.parse("fee K1,234.5").unwrap();
    assert_eq!(record["fee"]["currencySymbol"], json!("K"));
    assert_eq!(record["fee"]["doubleValue"], json!(1234.5));

    let ast: TemplateAst = r#"fee {{fee as "K0,0.0K"}}"#.parse().unwrap();
    let err = synthesize(&ast, "DeliveryClause", &catalog()).unwrap_err();
    assert!(err.to_string().contains("Duplicate field currencySymbol"));
}

#[test]
fn duplicate_date_field_is_reported() {
    let ast: TemplateAst = r#"{{due as "DD and DD"}}"#.parse().unwrap();
    let err = synthesize(&ast, "DeliveryClause", &catalog()).unwrap_err();
    assert!(err.to_string().contains("Duplicate field day"));
}

#[test]
fn undeclared_property_is_reported() {
    let ast: TemplateAst = "bound to {{phantom}}".parse().unwrap();
    let err = synthesize(&ast, "DeliveryClause", &catalog()).unwrap_err();
    assert!(err
        .to_string()
        .contains("Property phantom is not declared on DeliveryClause"));
}

#[test]
fn ambiguous_document_is_reported() {
    let catalog = MemoryCatalog::new("t").declare(
        "Pair",
        vec![
            Property::new("first", "Integer").optional(),
            Property::new("second", "Integer").optional(),
        ],
    );
    let ast: TemplateAst = "{{first}}{{second}}".parse().unwrap();
    let parser = synthesize(&ast, "Pair", &catalog)
        .unwrap()
        .compile()
        .unwrap();
    let err = parser.parse("5").unwrap_err();
    assert!(err.to_string().contains("Ambiguous text"));
}

#[test]
fn syntax_error_carries_position_and_token() {
    let parser = compile("ship {{parcels}} parcels");
    let err = parser.parse("ship nine parcels").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("line 1, column 6"), "{}", message);
    assert!(message.contains("nine"), "{}", message);
}

#[test]
fn a_compiled_grammar_is_reusable_across_parses() {
    let parser = compile("count {{parcels}}");
    assert!(parser.parse("count x").is_err());
    assert_eq!(parser.parse("count 1").unwrap()["parcels"], json!([1]));
    assert_eq!(
        parser.parse("count 9 8 7").unwrap()["parcels"],
        json!([9, 8, 7])
    );
}

const ROUND_TRIP_TEMPLATE: &str = r#"Carrier {{carrier}} ships {{parcels}} parcels. {{insured ? "Insured. "}}Priority {{priority}}. {{#with route}}From {{origin}} to {{destination}}.{{/with}} Due {{due}}."#;

fn round_trip_catalog() -> MemoryCatalog {
    // no identifying property: generated identifiers would differ per parse
    MemoryCatalog::new("org.acme.logistics")
        .declare(
            "DeliveryClause",
            vec![
                Property::new("carrier", "String"),
                Property::new("parcels", "Integer").array(),
                Property::new("insured", "Boolean"),
                Property::new("priority", "Priority").enumerated(),
                Property::new("route", "Route"),
                Property::new("due", "DateTime"),
            ],
        )
        .declare(
            "Route",
            vec![
                Property::new("origin", "String"),
                Property::new("destination", "String"),
            ],
        )
        .declare_enum("Priority", vec!["EXPRESS", "STANDARD"])
}

/// What a data record looks like after one render/parse cycle: class tags
/// appear and the date normalizes to parsed components.
fn normalized(data: &Value) -> Value {
    let mut expected = data.clone();
    expected["$class"] = json!("org.acme.logistics.DeliveryClause");
    expected["route"]["$class"] = json!("org.acme.logistics.Route");
    let date = data["due"].as_str().unwrap();
    expected["due"] = json!({
        "$class": "ParsedDateTime",
        "year": date[0..4].parse::<i64>().unwrap(),
        "month": date[5..7].parse::<i64>().unwrap(),
        "day": date[8..10].parse::<i64>().unwrap(),
    });
    expected
}

#[test]
fn render_then_parse_reproduces_the_record() {
    let catalog = round_trip_catalog();
    let ast: TemplateAst = ROUND_TRIP_TEMPLATE.parse().unwrap();
    let parser = synthesize(&ast, "DeliveryClause", &catalog)
        .unwrap()
        .compile()
        .unwrap();

    let data = json!({
        "carrier": "Acme Ltd",
        "parcels": [3, 4, 5],
        "insured": true,
        "priority": "STANDARD",
        "route": {"origin": "Lyon", "destination": "Nantes"},
        "due": "2017-12-19",
    });
    let text = render(&ast, "DeliveryClause", &catalog, &data).unwrap();
    assert_eq!(
        text,
        r#"Carrier "Acme Ltd" ships 3 4 5 parcels. Insured. Priority STANDARD. From "Lyon" to "Nantes". Due 12/19/2017."#
    );
    assert_eq!(parser.parse(&text).unwrap(), normalized(&data));
}

proptest! {
    #[test]
    fn round_trips_for_arbitrary_records(
        carrier in "[A-Za-z][A-Za-z ]{0,10}",
        parcels in proptest::collection::vec(0i64..100_000, 1..4),
        insured in any::<bool>(),
        priority in prop_oneof![Just("EXPRESS"), Just("STANDARD")],
        origin in "[A-Za-z]{1,8}",
        destination in "[A-Za-z]{1,8}",
        year in 1990i64..2100,
        month in 1i64..=12,
        day in 1i64..=28,
    ) {
        let catalog = round_trip_catalog();
        let ast: TemplateAst = ROUND_TRIP_TEMPLATE.parse().unwrap();
        let parser = synthesize(&ast, "DeliveryClause", &catalog)
            .unwrap()
            .compile()
            .unwrap();

        let data = json!({
            "carrier": carrier,
            "parcels": parcels,
            "insured": insured,
            "priority": priority,
            "route": {"origin": origin, "destination": destination},
            "due": format!("{:04}-{:02}-{:02}", year, month, day),
        });
        let text = render(&ast, "DeliveryClause", &catalog, &data).unwrap();
        prop_assert_eq!(parser.parse(&text).unwrap(), normalized(&data));
    }
}
