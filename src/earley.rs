//! The parse engine: a chart parser over the compiled grammar.
//!
//! General context-free parsing (no LL/LR restriction) with fat terminals:
//! chart sets are keyed by byte offset and a terminal advances the chart by
//! however many bytes it scanned. Recognition records every completed
//! nonterminal span; derivations are then enumerated from those spans and
//! compared structurally to enforce the exactly-one-derivation contract.
//!
//! The engine is built fresh for every `parse` call; the compiled grammar
//! itself is never mutated.

use crate::error::{Error, ErrorRepr};
use crate::grammar::{CSym, CompiledGrammar};
use crate::template::line_col;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::trace;

/// Upper bound on derivations enumerated per span. Two disagreeing
/// derivations already decide the outcome, so a pathologically ambiguous
/// grammar fails fast instead of walking an exponential forest.
const DERIVATION_CAP: usize = 8;

pub(crate) fn parse(grammar: &CompiledGrammar, text: &str) -> Result<Value, Error> {
    let engine = Engine::run(grammar, text);

    let full = engine
        .completed
        .get(&(grammar.start, 0))
        .is_some_and(|ends| ends.contains(&text.len()));
    if !full {
        return Err(engine.syntax_error());
    }

    let mut extractor = Extractor {
        grammar,
        text,
        completed: &engine.completed,
        memo: HashMap::new(),
        active: HashSet::new(),
    };
    let mut values = extractor.nt_values(grammar.start, 0, text.len());
    trace!(derivations = values.len(), "document parse complete");
    match values.len() {
        0 => Err(engine.syntax_error()),
        1 => Ok(values.swap_remove(0)),
        n => Err(Error(ErrorRepr::AmbiguousDocument { derivations: n })),
    }
}

/// An Earley item: production, dot position, origin offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Item {
    prod: usize,
    dot: usize,
    origin: usize,
}

#[derive(Default)]
struct StateSet {
    items: Vec<Item>,
    seen: HashSet<Item>,
}

struct Engine<'a> {
    grammar: &'a CompiledGrammar,
    text: &'a str,
    sets: BTreeMap<usize, StateSet>,
    /// Every completed nonterminal span: (nonterminal, start) -> ends.
    completed: HashMap<(usize, usize), BTreeSet<usize>>,
}

impl<'a> Engine<'a> {
    fn run(grammar: &'a CompiledGrammar, text: &'a str) -> Self {
        let mut engine = Engine {
            grammar,
            text,
            sets: BTreeMap::new(),
            completed: HashMap::new(),
        };
        for &p in &grammar.by_lhs[grammar.start] {
            engine.add(
                0,
                Item {
                    prod: p,
                    dot: 0,
                    origin: 0,
                },
            );
        }
        // Positions are processed in ascending order; scanning only ever
        // adds items at later offsets, so by the time a set is processed
        // every set before it is final.
        let mut cursor = Some(0);
        while let Some(pos) = cursor {
            engine.process(pos);
            cursor = engine
                .sets
                .range(pos + 1..)
                .next()
                .map(|(&next, _)| next);
        }
        engine
    }

    fn add(&mut self, pos: usize, item: Item) {
        let set = self.sets.entry(pos).or_default();
        if set.seen.insert(item) {
            set.items.push(item);
        }
    }

    fn process(&mut self, pos: usize) {
        let grammar = self.grammar;
        let mut i = 0;
        loop {
            let item = match self.sets.get(&pos).and_then(|s| s.items.get(i)) {
                Some(item) => *item,
                None => break,
            };
            i += 1;
            let prod = &grammar.productions[item.prod];
            match prod.rhs.get(item.dot) {
                Some(CSym::N(nt)) => {
                    let nt = *nt;
                    for &p in &grammar.by_lhs[nt] {
                        self.add(
                            pos,
                            Item {
                                prod: p,
                                dot: 0,
                                origin: pos,
                            },
                        );
                    }
                    // nullable prediction also advances past the symbol, so
                    // zero-width completions never strand their parents
                    if grammar.nullable[nt] {
                        self.add(
                            pos,
                            Item {
                                prod: item.prod,
                                dot: item.dot + 1,
                                origin: item.origin,
                            },
                        );
                    }
                }
                Some(CSym::T(t)) => {
                    if let Some((len, _)) = t.scan(self.text, pos) {
                        if len > 0 {
                            self.add(
                                pos + len,
                                Item {
                                    prod: item.prod,
                                    dot: item.dot + 1,
                                    origin: item.origin,
                                },
                            );
                        }
                    }
                }
                None => {
                    let lhs = prod.lhs;
                    self.completed
                        .entry((lhs, item.origin))
                        .or_default()
                        .insert(pos);
                    let parents: Vec<Item> = self
                        .sets
                        .get(&item.origin)
                        .map(|set| {
                            set.items
                                .iter()
                                .filter(|parent| {
                                    let rhs = &grammar.productions[parent.prod].rhs;
                                    matches!(rhs.get(parent.dot), Some(CSym::N(n)) if *n == lhs)
                                })
                                .map(|parent| Item {
                                    prod: parent.prod,
                                    dot: parent.dot + 1,
                                    origin: parent.origin,
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    for parent in parents {
                        self.add(pos, parent);
                    }
                }
            }
        }
    }

    /// The furthest-failure syntax error: the highest offset the chart
    /// reached is where no terminal could advance.
    fn syntax_error(&self) -> Error {
        let pos = self
            .sets
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
            .min(self.text.len());
        let (line, column) = line_col(self.text, pos);
        let token = self.text[pos..]
            .split_whitespace()
            .next()
            .map(|t| t.chars().take(24).collect());
        Error(ErrorRepr::DocumentSyntax {
            line,
            column,
            token,
        })
    }
}

/// Enumerates derivation values over the recognized chart, memoized per
/// (nonterminal, span). Terminal scans are deterministic, so values are
/// recomputed rather than stored during recognition.
struct Extractor<'a> {
    grammar: &'a CompiledGrammar,
    text: &'a str,
    completed: &'a HashMap<(usize, usize), BTreeSet<usize>>,
    memo: HashMap<(usize, usize, usize), Vec<Value>>,
    active: HashSet<(usize, usize, usize)>,
}

impl Extractor<'_> {
    fn nt_values(&mut self, nt: usize, start: usize, end: usize) -> Vec<Value> {
        let key = (nt, start, end);
        if let Some(cached) = self.memo.get(&key) {
            return cached.clone();
        }
        // a span can only derive through itself by consuming nothing;
        // breaking the cycle loses no value
        if !self.active.insert(key) {
            return Vec::new();
        }
        let grammar = self.grammar;
        let mut out: Vec<Value> = Vec::new();
        let spans_end = self
            .completed
            .get(&(nt, start))
            .is_some_and(|ends| ends.contains(&end));
        if spans_end {
            for &p in &grammar.by_lhs[nt] {
                for children in self.seq_values(p, 0, start, end) {
                    let value = grammar.productions[p].action.apply(children);
                    if out.len() < DERIVATION_CAP && !out.contains(&value) {
                        out.push(value);
                    }
                }
            }
        }
        self.active.remove(&key);
        self.memo.insert(key, out.clone());
        out
    }

    /// All ways the tail `rhs[k..]` of production `p` can span `at..end`,
    /// as ordered child-value vectors.
    fn seq_values(&mut self, p: usize, k: usize, at: usize, end: usize) -> Vec<Vec<Value>> {
        let grammar = self.grammar;
        let rhs = &grammar.productions[p].rhs;
        if k == rhs.len() {
            return if at == end {
                vec![Vec::new()]
            } else {
                Vec::new()
            };
        }
        let mut out = Vec::new();
        match &rhs[k] {
            CSym::T(t) => {
                if let Some((len, value)) = t.scan(self.text, at) {
                    if at + len <= end {
                        for mut rest in self.seq_values(p, k + 1, at + len, end) {
                            rest.insert(0, value.clone());
                            out.push(rest);
                        }
                    }
                }
            }
            CSym::N(nt) => {
                let nt = *nt;
                let ends: Vec<usize> = self
                    .completed
                    .get(&(nt, at))
                    .map(|ends| ends.range(..=end).copied().collect())
                    .unwrap_or_default();
                'spans: for mid in ends {
                    let heads = self.nt_values(nt, at, mid);
                    if heads.is_empty() {
                        continue;
                    }
                    for rest in self.seq_values(p, k + 1, mid, end) {
                        for head in &heads {
                            if out.len() >= DERIVATION_CAP * DERIVATION_CAP {
                                break 'spans;
                            }
                            let mut children = Vec::with_capacity(rest.len() + 1);
                            children.push(head.clone());
                            children.extend(rest.iter().cloned());
                            out.push(children);
                        }
                    }
                }
            }
        }
        out
    }
}
