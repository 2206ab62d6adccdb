#![allow(rustdoc::bare_urls)]
#![doc = include_str!("../README.md")]

mod earley;
mod error;
mod format;
mod grammar;
mod model;
mod render;
mod synth;
mod template;
mod terminals;

pub use error::Error;
pub use grammar::{CompiledGrammar, Grammar, Rule};
pub use model::{Catalog, MemoryCatalog, Property};
pub use render::render;
pub use synth::synthesize;
pub use template::{Expr, Span, TemplateAst, TemplateNode};
