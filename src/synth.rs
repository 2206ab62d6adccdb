//! The grammar synthesizer: from a template AST and a catalog snapshot to
//! a complete context-free grammar.
//!
//! Every grammar contains the base terminal rules verbatim, one rule per
//! literal chunk, one rule per binding (parameterized by the bound
//! property's type, optionality and array-ness) and, recursively, a
//! sub-grammar per clause/with/list block rooted at a rule named after the
//! field. Format patterns splice in the fragments built by
//! [`crate::format`], de-duplicated by their content-hashed names.

use crate::error::{Error, ErrorRepr};
use crate::format::{amount_rule, date_time_rule, FormatRules, DEFAULT_DATE_TIME, DEFAULT_MONETARY};
use crate::grammar::{Action, Grammar, Rep, Rule, Sym, SymKind};
use crate::model::{Catalog, Property};
use crate::template::{Span, TemplateAst, TemplateNode};
use crate::terminals::{Predefined, Terminal};
use std::collections::HashSet;
use tracing::debug;

/// Synthesizes the grammar for `ast` bound to the record type `root_type`.
///
/// Pure in its inputs: the same template and catalog snapshot always yield
/// the same grammar, so callers cache the result per (template,
/// catalog-version) pair.
pub fn synthesize<C: Catalog + ?Sized>(
    ast: &TemplateAst,
    root_type: &str,
    catalog: &C,
) -> Result<Grammar, Error> {
    let mut synth = Synthesizer {
        catalog,
        rules: Vec::new(),
        names: HashSet::new(),
    };
    synth.base_rules();
    synth.record_rule(root_type.to_string(), root_type, ast)?;
    debug!(
        rules = synth.rules.len(),
        start = root_type,
        "synthesized grammar"
    );
    Ok(Grammar::new(synth.rules, root_type.to_string()))
}

struct Synthesizer<'c, C: ?Sized> {
    catalog: &'c C,
    rules: Vec<Rule>,
    names: HashSet<String>,
}

impl<C: Catalog + ?Sized> Synthesizer<'_, C> {
    /// The base grammar library, included in every synthesized grammar.
    fn base_rules(&mut self) {
        for p in Predefined::all() {
            self.add_rule(Rule::new(
                p.as_str().to_string(),
                vec![Sym::one(SymKind::Terminal(Terminal::Predefined(p)))],
                Action::Forward,
            ));
        }
    }

    /// Adds a rule unless an identical one is already declared. Format
    /// fragments are named by content hash, so re-declaring one for a
    /// repeated pattern collapses here; genuinely colliding names are left
    /// for `compile` to reject.
    fn add_rule(&mut self, rule: Rule) {
        if self.names.contains(rule.name()) && self.rules.contains(&rule) {
            return;
        }
        self.names.insert(rule.name().to_string());
        self.rules.push(rule);
    }

    fn fresh_name(&self, base: String, index: usize) -> String {
        if self.names.contains(&base) {
            format!("{}_{}", base, index)
        } else {
            base
        }
    }

    fn splice(&mut self, built: FormatRules) -> SymKind {
        for rule in built.rules {
            self.add_rule(rule);
        }
        SymKind::Ref(built.name)
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

    /// Emits the rule for one record type: one sub-rule per chunk and
    /// binding, then the record rule binding each property to its first
    /// occurrence.
    fn record_rule(
        &mut self,
        rule_name: String,
        type_name: &str,
        ast: &TemplateAst,
    ) -> Result<(), Error> {
        let properties = self
            .catalog
            .properties(type_name)
            .ok_or_else(|| {
                Error(ErrorRepr::UnknownType {
                    type_name: type_name.to_string(),
                })
            })?
            .to_vec();
        let class = self
            .catalog
            .fully_qualified(type_name)
            .ok_or_else(|| {
                Error(ErrorRepr::UnknownType {
                    type_name: type_name.to_string(),
                })
            })?;

        let mut symbols: Vec<Sym> = Vec::new();
        let mut fields: Vec<(String, usize)> = Vec::new();
        let bind = |field: &str, index: usize, fields: &mut Vec<(String, usize)>| {
            // later occurrences of a property still match but only the
            // first is bound
            if !fields.iter().any(|(name, _)| name == field) {
                fields.push((field.to_string(), index));
            }
        };

        for (i, node) in ast.nodes().iter().enumerate() {
            match node {
                TemplateNode::Chunk { text, .. } | TemplateNode::LastChunk { text, .. } => {
                    if text.is_empty() {
                        continue;
                    }
                    let name = format!("{}_text_{}", rule_name, i);
                    self.add_rule(Rule::new(
                        name.clone(),
                        vec![Sym::one(SymKind::Terminal(Terminal::Lit(text.clone())))],
                        Action::Text,
                    ));
                    symbols.push(Sym::one(SymKind::Ref(name)));
                }
                TemplateNode::ExprChunk { expr, .. } => {
                    let name = format!("{}_text_{}", rule_name, i);
                    let text = format!("{{{{%{}%}}}}", expr.source);
                    self.add_rule(Rule::new(
                        name.clone(),
                        vec![Sym::one(SymKind::Terminal(Terminal::Lit(text)))],
                        Action::Text,
                    ));
                    symbols.push(Sym::one(SymKind::Ref(name)));
                }
                TemplateNode::Binding { field, span } => {
                    let property = self.resolve(type_name, field, *span)?;
                    let kind = self.value_symbol(&property, None, *span)?;
                    bind(field, symbols.len(), &mut fields);
                    symbols.push(Sym::new(
                        kind,
                        Rep::of(property.is_array, property.is_optional),
                    ));
                }
                TemplateNode::FormattedBinding {
                    field,
                    format,
                    span,
                } => {
                    let property = self.resolve(type_name, field, *span)?;
                    let kind = self.value_symbol(&property, Some(format), *span)?;
                    bind(field, symbols.len(), &mut fields);
                    symbols.push(Sym::new(
                        kind,
                        Rep::of(property.is_array, property.is_optional),
                    ));
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
                    let name = self.fresh_name(format!("{}_{}", rule_name, field), i);
                    self.add_rule(Rule::new(
                        name.clone(),
                        vec![Sym::new(
                            SymKind::Terminal(Terminal::Lit(phrase.clone())),
                            Rep::Optional,
                        )],
                        Action::Presence,
                    ));
                    bind(field, symbols.len(), &mut fields);
                    symbols.push(Sym::one(SymKind::Ref(name)));
                }
                TemplateNode::ClauseBinding { field, body, span }
                | TemplateNode::WithBinding { field, body, span } => {
                    let property = self.resolve(type_name, field, *span)?;
                    let name = self.fresh_name(format!("{}_{}", rule_name, field), i);
                    self.record_rule(name.clone(), &property.type_name, body)?;
                    bind(field, symbols.len(), &mut fields);
                    symbols.push(Sym::new(
                        SymKind::Ref(name),
                        Rep::of(property.is_array, property.is_optional),
                    ));
                }
                TemplateNode::ListBinding { field, body, span } => {
                    let property = self.resolve(type_name, field, *span)?;
                    if !property.is_array {
                        return Err(Error(ErrorRepr::UnsupportedType {
                            property: field.clone(),
                            type_name: property.type_name,
                            line: span.line,
                            column: span.column,
                        }));
                    }
                    let name = self.fresh_name(format!("{}_{}", rule_name, field), i);
                    self.record_rule(name.clone(), &property.type_name, body)?;
                    bind(field, symbols.len(), &mut fields);
                    symbols.push(Sym::new(
                        SymKind::Ref(name),
                        Rep::of(true, property.is_optional),
                    ));
                }
            }
        }

        // properties never bound in the template are supplied elsewhere;
        // an unbound identifying property gets a generated identifier
        let identifier = properties
            .iter()
            .find(|p| p.is_identifier && !fields.iter().any(|(name, _)| name == &p.name))
            .map(|p| p.name.clone());

        self.add_rule(Rule::new(
            rule_name,
            symbols,
            Action::Record {
                class,
                fields,
                identifier,
            },
        ));
        Ok(())
    }

    /// Chooses the grammar symbol for a value binding from the property's
    /// declared type and the optional format pattern.
    fn value_symbol(
        &mut self,
        property: &Property,
        format: Option<&str>,
        span: Span,
    ) -> Result<SymKind, Error> {
        if property.is_relationship {
            // relationships are identifiers in text
            return match format {
                None => Ok(SymKind::Ref(String::from("String"))),
                Some(_) => Err(invalid_format(property, span)),
            };
        }
        if property.is_enum {
            if format.is_some() {
                return Err(invalid_format(property, span));
            }
            let variants = self
                .catalog
                .enum_variants(&property.type_name)
                .ok_or_else(|| {
                    Error(ErrorRepr::UnknownType {
                        type_name: property.type_name.clone(),
                    })
                })?
                .to_vec();
            let name = format!("Enum_{}", property.type_name);
            self.add_rule(Rule::new(
                name.clone(),
                vec![Sym::one(SymKind::Terminal(Terminal::OneOf(variants)))],
                Action::Forward,
            ));
            return Ok(SymKind::Ref(name));
        }
        match Predefined::from_type_name(&property.type_name) {
            Some(Predefined::Double) if format.is_some() => {
                let built = amount_rule(format.unwrap_or_default(), false)
                    .map_err(|e| e.at(span.line, span.column))?;
                Ok(self.splice(built))
            }
            Some(p) => match format {
                None => Ok(SymKind::Ref(p.as_str().to_string())),
                Some(_) => Err(invalid_format(property, span)),
            },
            None => match property.type_name.as_str() {
                "DateTime" => {
                    let built = date_time_rule(format.unwrap_or(DEFAULT_DATE_TIME))
                        .map_err(|e| e.at(span.line, span.column))?;
                    Ok(self.splice(built))
                }
                "MonetaryAmount" => {
                    let built = amount_rule(format.unwrap_or(DEFAULT_MONETARY), true)
                        .map_err(|e| e.at(span.line, span.column))?;
                    Ok(self.splice(built))
                }
                _ => Err(Error(ErrorRepr::UnsupportedType {
                    property: property.name.clone(),
                    type_name: property.type_name.clone(),
                    line: span.line,
                    column: span.column,
                })),
            },
        }
    }
}

fn invalid_format(property: &Property, span: Span) -> Error {
    Error(ErrorRepr::InvalidFormattedType {
        property: property.name.clone(),
        type_name: property.type_name.clone(),
        line: span.line,
        column: span.column,
    })
}
