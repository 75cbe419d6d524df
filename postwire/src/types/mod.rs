//! Server data types.
//!
//! A [`Type`] describes one row of `pg_type`. Structured types refer to their
//! constituents by [`Oid`], the [`Registry`] owns every `Type` and follows those
//! references, so cyclic type graphs need no cyclic ownership.
use crate::postgres::Oid;

pub(crate) mod catalog;
mod registry;

pub use catalog::{Catalog, MemoryCatalog, PgTypeRow, TypeInfo};
pub use registry::Registry;

/// Server data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    oid: Oid,
    name: String,
    namespace: String,
    category: u8,
    delimiter: u8,
    kind: Kind,
}

/// Structure of a [`Type`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Scalar type with its own input/output functions.
    Base,
    /// Array of the element type.
    Array(Oid),
    /// Composite type, fields are ordered as declared.
    Composite(Vec<Field>),
    /// Range over the element type.
    Range(Oid),
    /// Multirange, a set of non-overlapping ranges.
    MultiRange {
        range: Oid,
        element: Oid,
    },
    /// Domain over the base type.
    Domain(Oid),
    /// Enum with labels in sort order.
    Enum(Vec<String>),
    /// Pseudo type, e.g. `void` or `record`.
    Pseudo,
}

/// One attribute of a composite type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub oid: Oid,
}

/// Direction of a value over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Parameter sent to the server.
    Encode,
    /// Column received from the server.
    Decode,
}

impl Type {
    /// Create new type in `pg_catalog` namespace.
    pub fn new(oid: Oid, name: impl Into<String>, kind: Kind) -> Type {
        let category = match kind {
            Kind::Array(_) => b'A',
            Kind::Composite(_) => b'C',
            Kind::Range(_) | Kind::MultiRange { .. } => b'R',
            Kind::Enum(_) => b'E',
            Kind::Pseudo => b'P',
            Kind::Base | Kind::Domain(_) => b'U',
        };
        Type {
            oid,
            name: name.into(),
            namespace: "pg_catalog".into(),
            category,
            delimiter: b',',
            kind,
        }
    }

    pub(crate) fn from_info(oid: Oid, info: TypeInfo) -> Type {
        Type {
            oid,
            name: info.name,
            namespace: info.namespace,
            category: info.category,
            delimiter: info.delimiter,
            kind: info.kind,
        }
    }

    pub(crate) fn with_category(mut self, category: u8) -> Type {
        self.category = category;
        self
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Type name as in `pg_type.typname`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `pg_type.typcategory`.
    pub fn category(&self) -> u8 {
        self.category
    }

    /// Array element delimiter in text format.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Element type of an array, range or multirange.
    pub fn element(&self) -> Option<Oid> {
        match self.kind {
            Kind::Array(e) | Kind::Range(e) | Kind::MultiRange { element: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Base type of a domain, or element type of a multirange.
    pub fn base(&self) -> Option<Oid> {
        match self.kind {
            Kind::Domain(b) | Kind::MultiRange { element: b, .. } => Some(b),
            _ => None,
        }
    }

    /// Range type of a multirange.
    pub fn range(&self) -> Option<Oid> {
        match self.kind {
            Kind::MultiRange { range, .. } => Some(range),
            _ => None,
        }
    }

    /// Fields of a composite type, empty otherwise.
    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            Kind::Composite(fields) => fields,
            _ => &[],
        }
    }

    /// Labels of an enum type, empty otherwise.
    pub fn labels(&self) -> &[String] {
        match &self.kind {
            Kind::Enum(labels) => labels,
            _ => &[],
        }
    }

    /// Every oid this type refers to.
    pub fn related(&self) -> Vec<Oid> {
        match &self.kind {
            Kind::Array(e) | Kind::Range(e) | Kind::Domain(e) => vec![*e],
            Kind::MultiRange { range, element } => vec![*range, *element],
            Kind::Composite(fields) => fields.iter().map(|f| f.oid).collect(),
            Kind::Base | Kind::Enum(_) | Kind::Pseudo => vec![],
        }
    }
}

/// An error when resolving server type.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("unknown type oid {0}")]
    UnknownOid(Oid),
    #[error("unknown type name {0:?}")]
    UnknownName(String),
    #[error("unknown type category {typtype:?} of {name}")]
    UnknownCategory { name: String, typtype: String },
}
