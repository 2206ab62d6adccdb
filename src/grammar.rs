//! The synthesized grammar: an arena of named rules, and its compiled form.
//!
//! A [`Grammar`] is pure data produced by the synthesizer. Compiling it
//! validates the rule set (unique names, resolvable references), resolves
//! name references to indices and expands multiplicities into helper
//! productions, yielding an immutable [`CompiledGrammar`] that the Earley
//! engine executes. `Display` renders the human-readable grammar text; the
//! compiled form, not the text, is what runs.

use crate::earley;
use crate::error::{Error, ErrorRepr};
use crate::terminals::{Predefined, Terminal};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// One named rule: a symbol sequence and the action applied to the
/// sub-match values when the sequence completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub(crate) name: String,
    pub(crate) symbols: Vec<Sym>,
    pub(crate) action: Action,
}

impl Rule {
    pub(crate) fn new(name: String, symbols: Vec<Sym>, action: Action) -> Self {
        Self {
            name,
            symbols,
            action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A symbol with its multiplicity.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Sym {
    pub kind: SymKind,
    pub rep: Rep,
}

impl Sym {
    pub(crate) fn one(kind: SymKind) -> Self {
        Self {
            kind,
            rep: Rep::One,
        }
    }

    pub(crate) fn new(kind: SymKind, rep: Rep) -> Self {
        Self { kind, rep }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SymKind {
    Terminal(Terminal),
    /// Reference to another rule by name, resolved at compile time.
    Ref(String),
}

/// Multiplicity suffix of a symbol. Repetitions are whitespace-separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rep {
    One,
    Optional,
    OneOrMore,
    OptionalOneOrMore,
}

impl Rep {
    pub(crate) fn of(is_array: bool, is_optional: bool) -> Self {
        match (is_array, is_optional) {
            (false, false) => Self::One,
            (false, true) => Self::Optional,
            (true, false) => Self::OneOrMore,
            (true, true) => Self::OptionalOneOrMore,
        }
    }

    const fn suffix(&self) -> &'static str {
        match self {
            Self::One => "",
            Self::Optional => "?",
            Self::OneOrMore => "+",
            Self::OptionalOneOrMore => "*",
        }
    }
}

/// The semantic action of a rule: a pure function from the ordered
/// sub-match values to the rule's value, represented as data.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    /// The first sub-match value passes through.
    Forward,
    /// Literal text; contributes no value.
    Text,
    /// `true` iff the optional sub-match was present.
    Presence,
    /// A record tagged with its fully qualified type, each bound property
    /// taken from the sub-match at its index. An unbound identifier
    /// property is filled with a generated UUID.
    Record {
        class: String,
        fields: Vec<(String, usize)>,
        identifier: Option<String>,
    },
    /// A format-field record tagged `Parsed<Kind>`.
    Parsed {
        class: String,
        fields: Vec<(String, usize)>,
    },
}

/// A complete synthesized grammar: the unioned rule set and the start
/// symbol, named after the template's root record type.
///
/// Immutable once built; deriving it is a pure function of the template
/// AST and a catalog snapshot, so callers cache it per (template,
/// catalog-version) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    pub(crate) rules: Vec<Rule>,
    pub(crate) start: String,
}

impl Grammar {
    pub(crate) fn new(rules: Vec<Rule>, start: String) -> Self {
        Self { rules, start }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Validates the rule set and lowers it to the executable form.
    ///
    /// Checks done:
    /// - rule names are unique
    /// - every reference resolves, including the start symbol
    /// - multiplicities become helper productions
    pub fn compile(&self) -> Result<CompiledGrammar, Error> {
        let names: Vec<&str> = self.rules.iter().map(|r| r.name.as_str()).collect();
        if let Some(dups) = find_duplicates(&names) {
            return Err(Error(ErrorRepr::DuplicateRules(dups)));
        }

        let index: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let start = *index
            .get(self.start.as_str())
            .ok_or_else(|| Error(ErrorRepr::UnknownSymbol(self.start.clone())))?;

        let mut compiled = CompiledGrammar {
            nonterminals: names.iter().map(|n| n.to_string()).collect(),
            productions: Vec::new(),
            by_lhs: vec![Vec::new(); self.rules.len()],
            nullable: Vec::new(),
            start,
        };

        for (lhs, rule) in self.rules.iter().enumerate() {
            let mut rhs = Vec::with_capacity(rule.symbols.len());
            for sym in &rule.symbols {
                let base = match &sym.kind {
                    SymKind::Terminal(t) => CSym::T(t.clone()),
                    SymKind::Ref(name) => CSym::N(
                        *index
                            .get(name.as_str())
                            .ok_or_else(|| Error(ErrorRepr::UnknownSymbol(name.clone())))?,
                    ),
                };
                let lowered = match sym.rep {
                    Rep::One => base,
                    Rep::Optional => CSym::N(compiled.add_optional(base)),
                    Rep::OneOrMore => CSym::N(compiled.add_repetition(base)),
                    Rep::OptionalOneOrMore => {
                        let plus = CSym::N(compiled.add_repetition(base));
                        CSym::N(compiled.add_optional(plus))
                    }
                };
                rhs.push(lowered);
            }
            compiled.push_production(lhs, rhs, CAction::User(rule.action.clone()));
        }

        compiled.compute_nullable();
        Ok(compiled)
    }
}

/// Pretty prints the grammar text: one line per rule.
///
/// This is a debug view for checking that synthesis produced what the
/// template means; parsing runs on the compiled form.
impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        writeln!(f, "start: {}", self.start)?;
        for rule in &self.rules {
            let symbols = rule
                .symbols
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<String>>()
                .join(" ");
            writeln!(f, "{} : {} ;", rule.name, symbols)?;
        }
        Ok(())
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.kind {
            SymKind::Terminal(t) => write!(f, "{}{}", t, self.rep.suffix()),
            SymKind::Ref(name) => write!(f, "{}{}", name, self.rep.suffix()),
        }
    }
}

fn find_duplicates(names: &[&str]) -> Option<HashSet<String>> {
    let mut set: HashSet<&str> = names.iter().copied().collect();
    let dups: HashSet<String> = names
        .iter()
        .filter(|n| !set.remove(**n))
        .map(|n| n.to_string())
        .collect();
    (!dups.is_empty()).then_some(dups)
}

/// The executable grammar: indexed productions over terminals and
/// nonterminal ids.
///
/// Shareable across threads; each [`parse`](CompiledGrammar::parse) call
/// builds its own engine state.
#[derive(Debug)]
pub struct CompiledGrammar {
    pub(crate) nonterminals: Vec<String>,
    pub(crate) productions: Vec<Production>,
    pub(crate) by_lhs: Vec<Vec<usize>>,
    pub(crate) nullable: Vec<bool>,
    pub(crate) start: usize,
}

#[derive(Debug)]
pub(crate) struct Production {
    pub lhs: usize,
    pub rhs: Vec<CSym>,
    pub action: CAction,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CSym {
    T(Terminal),
    N(usize),
}

/// Compiled actions: the user actions plus the helpers introduced by
/// multiplicity lowering.
#[derive(Debug)]
pub(crate) enum CAction {
    User(Action),
    OptNone,
    OptSome,
    SeqOne,
    SeqMore,
}

impl CompiledGrammar {
    /// Parses a document, enforcing the exactly-one-derivation contract.
    pub fn parse(&self, text: &str) -> Result<Value, Error> {
        earley::parse(self, text)
    }

    fn push_production(&mut self, lhs: usize, rhs: Vec<CSym>, action: CAction) {
        self.by_lhs[lhs].push(self.productions.len());
        self.productions.push(Production { lhs, rhs, action });
    }

    fn add_nonterminal(&mut self, name: String) -> usize {
        self.nonterminals.push(name);
        self.by_lhs.push(Vec::new());
        self.nonterminals.len() - 1
    }

    fn describe(&self, sym: &CSym) -> String {
        match sym {
            CSym::T(t) => t.to_string(),
            CSym::N(i) => self.nonterminals[*i].clone(),
        }
    }

    fn add_optional(&mut self, base: CSym) -> usize {
        let name = format!("{}?", self.describe(&base));
        let nt = self.add_nonterminal(name);
        self.push_production(nt, Vec::new(), CAction::OptNone);
        self.push_production(nt, vec![base], CAction::OptSome);
        nt
    }

    fn add_repetition(&mut self, base: CSym) -> usize {
        let name = format!("{}+", self.describe(&base));
        let nt = self.add_nonterminal(name);
        self.push_production(nt, vec![base.clone()], CAction::SeqOne);
        self.push_production(
            nt,
            vec![
                CSym::N(nt),
                CSym::T(Terminal::Predefined(Predefined::Whitespace)),
                base,
            ],
            CAction::SeqMore,
        );
        nt
    }

    fn compute_nullable(&mut self) {
        let mut nullable = vec![false; self.nonterminals.len()];
        loop {
            let mut changed = false;
            for p in &self.productions {
                if !nullable[p.lhs]
                    && p.rhs
                        .iter()
                        .all(|s| matches!(s, CSym::N(i) if nullable[*i]))
                {
                    nullable[p.lhs] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        self.nullable = nullable;
    }
}

impl CAction {
    /// Applies the action to the ordered sub-match values.
    pub(crate) fn apply(&self, mut children: Vec<Value>) -> Value {
        match self {
            Self::User(Action::Forward) | Self::OptSome => {
                children.drain(..).next().unwrap_or(Value::Null)
            }
            Self::User(Action::Text) | Self::OptNone => Value::Null,
            Self::User(Action::Presence) => {
                Value::Bool(children.first().is_some_and(|v| !v.is_null()))
            }
            Self::User(Action::Record {
                class,
                fields,
                identifier,
            }) => {
                let mut map = Map::new();
                map.insert(String::from("$class"), Value::String(class.clone()));
                for (field, idx) in fields {
                    let value = std::mem::take(&mut children[*idx]);
                    if !value.is_null() {
                        map.insert(field.clone(), value);
                    }
                }
                if let Some(name) = identifier {
                    map.insert(
                        name.clone(),
                        Value::String(uuid::Uuid::new_v4().to_string()),
                    );
                }
                Value::Object(map)
            }
            Self::User(Action::Parsed { class, fields }) => {
                let mut map = Map::new();
                map.insert(String::from("$class"), Value::String(class.clone()));
                for (field, idx) in fields {
                    map.insert(field.clone(), std::mem::take(&mut children[*idx]));
                }
                Value::Object(map)
            }
            Self::SeqOne => Value::Array(children),
            Self::SeqMore => {
                let item = children.pop().unwrap_or(Value::Null);
                let _separator = children.pop();
                match children.pop() {
                    Some(Value::Array(mut items)) => {
                        items.push(item);
                        Value::Array(items)
                    }
                    _ => Value::Array(vec![item]),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lit(s: &str) -> Sym {
        Sym::one(SymKind::Terminal(Terminal::Lit(s.into())))
    }

    fn reference(s: &str, rep: Rep) -> Sym {
        Sym::new(SymKind::Ref(s.into()), rep)
    }

    #[test]
    fn catches_duplicates() {
        let grammar = Grammar::new(
            vec![
                Rule::new("x".into(), vec![lit("a")], Action::Text),
                Rule::new("x".into(), vec![lit("b")], Action::Text),
            ],
            "x".into(),
        );
        let result = grammar.compile().unwrap_err();
        assert_eq!(
            result,
            Error(ErrorRepr::DuplicateRules(
                ["x".to_string()].into_iter().collect()
            ))
        );
    }

    #[test]
    fn catches_unknown_references() {
        let grammar = Grammar::new(
            vec![Rule::new(
                "x".into(),
                vec![reference("missing", Rep::One)],
                Action::Forward,
            )],
            "x".into(),
        );
        assert_eq!(
            grammar.compile().unwrap_err(),
            Error(ErrorRepr::UnknownSymbol("missing".into()))
        );

        let grammar = Grammar::new(vec![], "nothing".into());
        assert_eq!(
            grammar.compile().unwrap_err(),
            Error(ErrorRepr::UnknownSymbol("nothing".into()))
        );
    }

    #[test]
    fn lowers_multiplicities_into_helpers() {
        let grammar = Grammar::new(
            vec![
                Rule::new(
                    "root".into(),
                    vec![
                        reference("item", Rep::Optional),
                        reference("item", Rep::OneOrMore),
                        reference("item", Rep::OptionalOneOrMore),
                    ],
                    Action::Forward,
                ),
                Rule::new(
                    "item".into(),
                    vec![Sym::one(SymKind::Terminal(Terminal::Predefined(
                        Predefined::Integer,
                    )))],
                    Action::Forward,
                ),
            ],
            "root".into(),
        );
        let compiled = grammar.compile().unwrap();
        // 2 named + optional + repetition + (repetition + optional)
        assert_eq!(compiled.nonterminals.len(), 6);
        // named rules contribute one production each, optionals two, repetitions two
        assert_eq!(compiled.productions.len(), 2 + 2 + 2 + 4);
        // the optional helpers are nullable, the named rules are not
        assert!(compiled.nullable.iter().any(|n| *n));
        assert!(!compiled.nullable[compiled.start]);
    }

    #[test]
    fn nullable_propagates_through_references() {
        let grammar = Grammar::new(
            vec![
                Rule::new(
                    "root".into(),
                    vec![reference("maybe", Rep::One)],
                    Action::Forward,
                ),
                Rule::new("maybe".into(), vec![], Action::Text),
            ],
            "root".into(),
        );
        let compiled = grammar.compile().unwrap();
        assert!(compiled.nullable[0]);
        assert!(compiled.nullable[1]);
    }

    #[test]
    fn display_escapes_literals() {
        let grammar = Grammar::new(
            vec![Rule::new(
                "root".into(),
                vec![
                    lit("line\nwith \"quotes\""),
                    reference("x", Rep::OneOrMore),
                ],
                Action::Forward,
            )],
            "root".into(),
        );
        let text = grammar.to_string();
        assert!(text.starts_with("start: root\n"));
        assert!(text.contains(r#""line\nwith \"quotes\"" x+"#));
    }

    #[test]
    fn record_action_skips_absent_optionals() {
        let action = CAction::User(Action::Record {
            class: "org.acme.Shipment".into(),
            fields: vec![("carrier".into(), 0), ("notes".into(), 2)],
            identifier: None,
        });
        let value = action.apply(vec![json!("Acme"), Value::Null, Value::Null]);
        assert_eq!(
            value,
            json!({"$class": "org.acme.Shipment", "carrier": "Acme"})
        );
    }

    #[test]
    fn record_action_generates_identifier() {
        let action = CAction::User(Action::Record {
            class: "org.acme.Shipment".into(),
            fields: vec![],
            identifier: Some("shipmentId".into()),
        });
        let value = action.apply(vec![]);
        let id = value["shipmentId"].as_str().unwrap();
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn sequence_actions_fold_items() {
        let one = CAction::SeqOne.apply(vec![json!(1)]);
        assert_eq!(one, json!([1]));
        let more = CAction::SeqMore.apply(vec![json!([1, 2]), Value::Null, json!(3)]);
        assert_eq!(more, json!([1, 2, 3]));
    }

    #[test]
    fn presence_action() {
        let p = CAction::User(Action::Presence);
        assert_eq!(p.apply(vec![json!("phrase")]), json!(true));
        assert_eq!(p.apply(vec![Value::Null]), json!(false));
    }
}
