//! The catalog interface: property and type metadata supplied by the caller.
//!
//! The synthesizer and renderer only ever read from a [`Catalog`]; they never
//! mutate it. [`MemoryCatalog`] is an in-memory implementation for embedding
//! and tests; production callers typically adapt their own schema store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata for one declared property of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub is_enum: bool,
    #[serde(default)]
    pub is_relationship: bool,
    #[serde(default)]
    pub is_identifier: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_array: false,
            is_optional: false,
            is_enum: false,
            is_relationship: false,
            is_identifier: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn enumerated(mut self) -> Self {
        self.is_enum = true;
        self
    }

    pub fn relationship(mut self) -> Self {
        self.is_relationship = true;
        self
    }

    pub fn identifier(mut self) -> Self {
        self.is_identifier = true;
        self
    }
}

/// Read-only type and property lookup.
///
/// Supplied by the caller; the core treats a catalog snapshot as immutable
/// for the lifetime of a synthesized grammar.
pub trait Catalog {
    /// The fully qualified name of a declared type, e.g. `org.acme.Delivery`.
    fn fully_qualified(&self, type_name: &str) -> Option<String>;

    /// The declared properties of a record type, in declaration order.
    fn properties(&self, type_name: &str) -> Option<&[Property]>;

    /// The literal values of a declared enum type.
    fn enum_variants(&self, type_name: &str) -> Option<&[String]>;

    /// One property of a record type, by name.
    fn property(&self, type_name: &str, name: &str) -> Option<&Property> {
        self.properties(type_name)?.iter().find(|p| p.name == name)
    }
}

/// An in-memory [`Catalog`] built up with a fluent API.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    namespace: String,
    types: BTreeMap<String, Vec<Property>>,
    enums: BTreeMap<String, Vec<String>>,
}

impl MemoryCatalog {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            types: BTreeMap::new(),
            enums: BTreeMap::new(),
        }
    }

    /// Declares a record type with its properties.
    pub fn declare(mut self, type_name: impl Into<String>, properties: Vec<Property>) -> Self {
        self.types.insert(type_name.into(), properties);
        self
    }

    /// Declares an enum type with its literal values.
    pub fn declare_enum<S: Into<String>>(
        mut self,
        type_name: impl Into<String>,
        variants: Vec<S>,
    ) -> Self {
        self.enums.insert(
            type_name.into(),
            variants.into_iter().map(Into::into).collect(),
        );
        self
    }
}

impl Catalog for MemoryCatalog {
    fn fully_qualified(&self, type_name: &str) -> Option<String> {
        if self.types.contains_key(type_name) || self.enums.contains_key(type_name) {
            Some(format!("{}.{}", self.namespace, type_name))
        } else {
            None
        }
    }

    fn properties(&self, type_name: &str) -> Option<&[Property]> {
        self.types.get(type_name).map(Vec::as_slice)
    }

    fn enum_variants(&self, type_name: &str) -> Option<&[String]> {
        self.enums.get(type_name).map(Vec::as_slice)
    }
}
