//! Template Definition Language parsing.
//!
//! TDL is prose interleaved with binding markers:
//!
//! ```text
//! "{{carrier}}" will deliver {{count}} parcels by {{due as "DD MMM YYYY"}}.
//! {{#list lines}}Item {{sku}} x {{quantity}}{{/list}}
//! ```
//!
//! The marker forms are `{{field}}`, `{{field as "FORMAT"}}`,
//! `{{field ? "phrase"}}` (boolean), `{{#clause f}}…{{/clause}}`,
//! `{{#with f}}…{{/with}}`, `{{#list f}}…{{/list}}` and `{{% expr %}}`
//! passthrough blocks. `\{` and `\}` escape literal braces in prose.
//!
//! The TDL grammar itself is static and parsed with a peg parser, unlike
//! the grammars *synthesized from* templates, which are data.

use crate::error::{Error, ErrorRepr};
use peg::parser;
use std::str::FromStr;

/// Source position of a template node, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

/// A raw passthrough expression, carried by [`TemplateNode::ExprChunk`].
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Verbatim text between `{{%` and `%}}`.
    pub source: String,
}

/// One node of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// Literal prose.
    Chunk { text: String, span: Span },
    /// The trailing prose of a template or block body.
    LastChunk { text: String, span: Span },
    /// A `{{% … %}}` passthrough block, matched and re-emitted verbatim.
    ExprChunk { expr: Expr, span: Span },
    /// `{{field}}`
    Binding { field: String, span: Span },
    /// `{{field as "FORMAT"}}`
    FormattedBinding {
        field: String,
        format: String,
        span: Span,
    },
    /// `{{field ? "phrase"}}`: emits `phrase` when the field is true.
    BooleanBinding {
        field: String,
        phrase: String,
        span: Span,
    },
    /// `{{#clause field}}…{{/clause}}`
    ClauseBinding {
        field: String,
        body: TemplateAst,
        span: Span,
    },
    /// `{{#with field}}…{{/with}}`
    WithBinding {
        field: String,
        body: TemplateAst,
        span: Span,
    },
    /// `{{#list field}}…{{/list}}`
    ListBinding {
        field: String,
        body: TemplateAst,
        span: Span,
    },
}

impl TemplateNode {
    pub fn span(&self) -> Span {
        match self {
            Self::Chunk { span, .. }
            | Self::LastChunk { span, .. }
            | Self::ExprChunk { span, .. }
            | Self::Binding { span, .. }
            | Self::FormattedBinding { span, .. }
            | Self::BooleanBinding { span, .. }
            | Self::ClauseBinding { span, .. }
            | Self::WithBinding { span, .. }
            | Self::ListBinding { span, .. } => *span,
        }
    }
}

/// An immutable, ordered sequence of template nodes.
///
/// Built once per template with [`FromStr`] and reused across every parse
/// and render of that template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateAst {
    nodes: Vec<TemplateNode>,
}

impl TemplateAst {
    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }
}

impl FromStr for TemplateAst {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = tdl::template(s).map_err(|e| Error(ErrorRepr::Template(e)))?;
        Ok(finish(raw, s))
    }
}

#[derive(Debug)]
enum RawNode {
    Chunk(String, usize),
    Expr(String, usize),
    Binding(String, usize),
    Formatted(String, String, usize),
    Boolean(String, String, usize),
    Clause(String, Vec<RawNode>, usize),
    With(String, Vec<RawNode>, usize),
    List(String, Vec<RawNode>, usize),
}

parser! {
/// The static TDL surface grammar. Parsing templates is off the hot path;
/// the synthesized document grammars are what run per document.
grammar tdl() for str {
    pub rule template() -> Vec<RawNode>
        = node()*

    rule node() -> RawNode
        = clause_block()
        / with_block()
        / list_block()
        / expr_chunk()
        / boolean_binding()
        / formatted_binding()
        / binding()
        / chunk()

    rule chunk() -> RawNode
        = p:position!() t:text() { RawNode::Chunk(t, p) }

    rule text() -> String
        = parts:text_part()+ { parts.concat() }

    rule text_part() -> String
        = "\\{" { String::from("{") }
        / "\\}" { String::from("}") }
        / c:$((!("{{" / "\\{" / "\\}") [_])+) { String::from(c) }

    rule binding() -> RawNode
        = p:position!() "{{" _ f:ident() _ "}}" { RawNode::Binding(f, p) }

    rule formatted_binding() -> RawNode
        = p:position!() "{{" _ f:ident() __ "as" __ s:string() _ "}}" {
            RawNode::Formatted(f, s, p)
        }

    rule boolean_binding() -> RawNode
        = p:position!() "{{" _ f:ident() _ "?" _ s:string() _ "}}" {
            RawNode::Boolean(f, s, p)
        }

    rule expr_chunk() -> RawNode
        = p:position!() "{{%" s:$((!"%}}" [_])*) "%}}" {
            RawNode::Expr(String::from(s), p)
        }

    rule clause_block() -> RawNode
        = p:position!() "{{#" _ "clause" __ f:ident() _ "}}"
          b:node()* close("clause") { RawNode::Clause(f, b, p) }

    rule with_block() -> RawNode
        = p:position!() "{{#" _ "with" __ f:ident() _ "}}"
          b:node()* close("with") { RawNode::With(f, b, p) }

    rule list_block() -> RawNode
        = p:position!() "{{#" _ "list" __ f:ident() _ "}}"
          b:node()* close("list") { RawNode::List(f, b, p) }

    rule close(kind: &'static str)
        = "{{/" _ k:$(['a'..='z']+) _ "}}" {? (k == kind).then_some(()).ok_or(kind) }

    rule ident() -> String
        = s:$(['a'..='z' | 'A'..='Z' | '_']['a'..='z' | 'A'..='Z' | '0'..='9' | '_']*) {
            String::from(s)
        }

    rule _ = [' ' | '\n' | '\t']*
    rule __ = [' ' | '\n' | '\t']+

    rule string() -> String
        = "\"" s:string_inner() "\"" { s }

    rule escape_char() -> char
        = "\\\"" { '"' }
        / "\\\\" { '\\' }
        / "\\n" { '\n' }
        / "\\t" { '\t' }

    rule string_inner() -> String
        = c:escape_char() s:string_inner() {
            let mut x = c.to_string();
            x.push_str(&s);
            x
        }
        / c:[^'"'] s:string_inner() {
            let mut x = c.to_string();
            x.push_str(&s);
            x
        }
        / "" { String::new() }
}}

/// Computes the 1-based line and column of a byte offset.
pub(crate) fn line_col(src: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut column = 1u32;
    for (i, c) in src.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

fn finish(raw: Vec<RawNode>, src: &str) -> TemplateAst {
    let last_chunk = raw
        .iter()
        .rposition(|n| matches!(n, RawNode::Chunk(..)))
        .filter(|&i| i == raw.len() - 1);
    let nodes = raw
        .into_iter()
        .enumerate()
        .map(|(i, n)| {
            let span = |offset| {
                let (line, column) = line_col(src, offset);
                Span { line, column }
            };
            match n {
                RawNode::Chunk(text, p) if Some(i) == last_chunk => TemplateNode::LastChunk {
                    text,
                    span: span(p),
                },
                RawNode::Chunk(text, p) => TemplateNode::Chunk {
                    text,
                    span: span(p),
                },
                RawNode::Expr(source, p) => TemplateNode::ExprChunk {
                    expr: Expr { source },
                    span: span(p),
                },
                RawNode::Binding(field, p) => TemplateNode::Binding {
                    field,
                    span: span(p),
                },
                RawNode::Formatted(field, format, p) => TemplateNode::FormattedBinding {
                    field,
                    format,
                    span: span(p),
                },
                RawNode::Boolean(field, phrase, p) => TemplateNode::BooleanBinding {
                    field,
                    phrase,
                    span: span(p),
                },
                RawNode::Clause(field, body, p) => TemplateNode::ClauseBinding {
                    field,
                    body: finish(body, src),
                    span: span(p),
                },
                RawNode::With(field, body, p) => TemplateNode::WithBinding {
                    field,
                    body: finish(body, src),
                    span: span(p),
                },
                RawNode::List(field, body, p) => TemplateNode::ListBinding {
                    field,
                    body: finish(body, src),
                    span: span(p),
                },
            }
        })
        .collect();
    TemplateAst { nodes }
}
