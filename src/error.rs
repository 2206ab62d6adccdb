use std::collections::HashSet;
use std::fmt;

/// The type of error that can occur while parsing a template, synthesizing
/// or compiling a grammar, parsing a document, or rendering a record.
#[derive(Debug, PartialEq)]
pub struct Error(pub(crate) ErrorRepr);

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.0 {
            ErrorRepr::Template(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum ErrorRepr {
    /// Malformed template source.
    Template(peg::error::ParseError<peg::str::LineCol>),
    /// The static template grammar yielded more than one derivation.
    /// The template grammar is a PEG and cannot produce two parses, so this
    /// kind exists for taxonomy completeness only.
    #[allow(dead_code)]
    AmbiguousTemplate,
    /// A binding names a property the bound type does not declare.
    UnresolvedProperty {
        property: String,
        type_name: String,
        line: u32,
        column: u32,
    },
    /// The same logical field appears twice in one format pattern.
    DuplicateFormatField {
        field: &'static str,
        pattern: String,
        line: u32,
        column: u32,
    },
    /// A format pattern contains no recognizable field token.
    EmptyFormatPattern {
        pattern: String,
        line: u32,
        column: u32,
    },
    /// A formatted binding on a property type that has no format builder.
    InvalidFormattedType {
        property: String,
        type_name: String,
        line: u32,
        column: u32,
    },
    /// A boolean binding on a property that is not boolean-typed.
    InvalidBooleanBinding {
        property: String,
        type_name: String,
        line: u32,
        column: u32,
    },
    /// A binding form the property's type cannot support, e.g. a plain
    /// binding on a record type or a list block on a non-array property.
    UnsupportedType {
        property: String,
        type_name: String,
        line: u32,
        column: u32,
    },
    /// A nested record type is absent from the catalog.
    UnknownType { type_name: String },
    /// Two rules in one grammar share a name.
    DuplicateRules(HashSet<String>),
    /// A rule references a name the grammar does not define.
    UnknownSymbol(String),
    /// The document has two or more structurally different derivations.
    AmbiguousDocument { derivations: usize },
    /// The document has no derivation.
    DocumentSyntax {
        line: u32,
        column: u32,
        token: Option<String>,
    },
    /// The data record lacks a required property during rendering.
    MissingProperty { property: String },
    /// A data value has a shape the renderer does not recognize for its
    /// declared type.
    InvalidValue {
        property: String,
        expected: &'static str,
    },
}

impl Error {
    /// Attaches a source position to position-carrying kinds constructed
    /// without one (the format builders do not know where in the template
    /// their pattern came from).
    pub(crate) fn at(mut self, line: u32, column: u32) -> Self {
        match &mut self.0 {
            ErrorRepr::DuplicateFormatField {
                line: l, column: c, ..
            }
            | ErrorRepr::EmptyFormatPattern {
                line: l, column: c, ..
            } if *l == 0 => {
                *l = line;
                *c = column;
            }
            _ => (),
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ErrorRepr::Template(e) => e.fmt(f),
            ErrorRepr::AmbiguousTemplate => {
                write!(f, "Template grammar produced more than one derivation")
            }
            ErrorRepr::UnresolvedProperty {
                property,
                type_name,
                line,
                column,
            } => write!(
                f,
                "Property {} is not declared on {} (line {}, column {})",
                property, type_name, line, column
            ),
            ErrorRepr::DuplicateFormatField {
                field,
                pattern,
                line,
                column,
            } => write!(
                f,
                "Duplicate field {} in format {:?} (line {}, column {})",
                field, pattern, line, column
            ),
            ErrorRepr::EmptyFormatPattern {
                pattern,
                line,
                column,
            } => write!(
                f,
                "Format {:?} contains no field token (line {}, column {})",
                pattern, line, column
            ),
            ErrorRepr::InvalidFormattedType {
                property,
                type_name,
                line,
                column,
            } => write!(
                f,
                "Property {} of type {} does not accept a format (line {}, column {})",
                property, type_name, line, column
            ),
            ErrorRepr::InvalidBooleanBinding {
                property,
                type_name,
                line,
                column,
            } => write!(
                f,
                "Boolean binding on property {} of non-boolean type {} (line {}, column {})",
                property, type_name, line, column
            ),
            ErrorRepr::UnsupportedType {
                property,
                type_name,
                line,
                column,
            } => write!(
                f,
                "Property {} of type {} cannot be bound here (line {}, column {})",
                property, type_name, line, column
            ),
            ErrorRepr::UnknownType { type_name } => write!(f, "Unknown type: {}", type_name),
            ErrorRepr::DuplicateRules(e) => write!(f, "Duplicate rule definitions: {:?}", e),
            ErrorRepr::UnknownSymbol(e) => write!(f, "Unknown rule reference: {}", e),
            ErrorRepr::AmbiguousDocument { derivations } => write!(
                f,
                "Ambiguous text: {} structurally different derivations",
                derivations
            ),
            ErrorRepr::DocumentSyntax {
                line,
                column,
                token,
            } => match token {
                Some(t) => write!(
                    f,
                    "Syntax error at line {}, column {}: unexpected {:?}",
                    line, column, t
                ),
                None => write!(
                    f,
                    "Syntax error at line {}, column {}: unexpected end of text",
                    line, column
                ),
            },
            ErrorRepr::MissingProperty { property } => {
                write!(f, "Missing value for property {}", property)
            }
            ErrorRepr::InvalidValue { property, expected } => write!(
                f,
                "Value for property {} is not a valid {}",
                property, expected
            ),
        }
    }
}
