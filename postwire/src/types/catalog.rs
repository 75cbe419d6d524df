//! Type metadata source.
use std::collections::HashMap;

use super::{Field, Kind, TypeError};
use crate::{Result, postgres::Oid};

/// Metadata of one type, as returned by a [`Catalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
    pub namespace: String,
    /// `pg_type.typcategory`.
    pub category: u8,
    /// `pg_type.typdelim`.
    pub delimiter: u8,
    pub kind: Kind,
}

impl TypeInfo {
    /// Metadata in `public` namespace with default category and delimiter.
    pub fn new(name: impl Into<String>, kind: Kind) -> TypeInfo {
        let category = match kind {
            Kind::Array(_) => b'A',
            Kind::Composite(_) => b'C',
            Kind::Range(_) | Kind::MultiRange { .. } => b'R',
            Kind::Enum(_) => b'E',
            Kind::Pseudo => b'P',
            Kind::Base | Kind::Domain(_) => b'U',
        };
        TypeInfo {
            name: name.into(),
            namespace: "public".into(),
            category,
            delimiter: b',',
            kind,
        }
    }
}

/// Source of type metadata for the [`Registry`][super::Registry].
///
/// [`Connection`][crate::Connection] implements this with catalog queries, lookups are
/// only issued between complete query cycles.
pub trait Catalog {
    /// Describe the type with given oid, [`None`] if no such type.
    fn lookup(&mut self, oid: Oid) -> impl Future<Output = Result<Option<TypeInfo>>>;

    /// Find type oid by name, as understood by `regtype`.
    fn lookup_name(&mut self, name: &str) -> impl Future<Output = Result<Option<Oid>>>;
}

impl<C: Catalog> Catalog for &mut C {
    fn lookup(&mut self, oid: Oid) -> impl Future<Output = Result<Option<TypeInfo>>> {
        C::lookup(self, oid)
    }

    fn lookup_name(&mut self, name: &str) -> impl Future<Output = Result<Option<Oid>>> {
        C::lookup_name(self, name)
    }
}

/// Type row of the catalog query.
pub(crate) const TYPE_QUERY: &str = "\
SELECT t.typname::text, n.nspname::text, t.typtype::text, t.typcategory::text, t.typdelim::text, \
t.typelem, t.typbasetype, r.rngsubtype, m.rngtypid, m.rngsubtype \
FROM pg_catalog.pg_type t \
JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace \
LEFT JOIN pg_catalog.pg_range r ON r.rngtypid = t.oid \
LEFT JOIN pg_catalog.pg_range m ON m.rngmultitypid = t.oid \
WHERE t.oid = $1";

/// [`TYPE_QUERY`] for servers before 14, which have no multirange.
pub(crate) const TYPE_QUERY_PRE_14: &str = "\
SELECT t.typname::text, n.nspname::text, t.typtype::text, t.typcategory::text, t.typdelim::text, \
t.typelem, t.typbasetype, r.rngsubtype, NULL::oid, NULL::oid \
FROM pg_catalog.pg_type t \
JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace \
LEFT JOIN pg_catalog.pg_range r ON r.rngtypid = t.oid \
WHERE t.oid = $1";

/// Fields of a composite type, by type oid.
pub(crate) const FIELDS_QUERY: &str = "\
SELECT a.attname::text, a.atttypid \
FROM pg_catalog.pg_type t \
JOIN pg_catalog.pg_attribute a ON a.attrelid = t.typrelid \
WHERE t.oid = $1 AND a.attnum > 0 AND NOT a.attisdropped \
ORDER BY a.attnum";

/// Labels of an enum type.
pub(crate) const LABELS_QUERY: &str = "\
SELECT enumlabel::text FROM pg_catalog.pg_enum WHERE enumtypid = $1 ORDER BY enumsortorder";

/// Type oid by name.
pub(crate) const NAME_QUERY: &str = "SELECT to_regtype($1)::oid";

/// One row of [`TYPE_QUERY`].
#[derive(Debug, Default)]
pub struct PgTypeRow {
    pub typname: String,
    pub nspname: String,
    pub typtype: String,
    pub typcategory: String,
    pub typdelim: String,
    pub typelem: Oid,
    pub typbasetype: Oid,
    pub rngsubtype: Option<Oid>,
    pub multirange_range: Option<Oid>,
    pub multirange_element: Option<Oid>,
}

impl PgTypeRow {
    /// Whether [`FIELDS_QUERY`] is needed.
    pub fn is_composite(&self) -> bool {
        self.typtype == "c"
    }

    /// Whether [`LABELS_QUERY`] is needed.
    pub fn is_enum(&self) -> bool {
        self.typtype == "e"
    }

    /// Build [`TypeInfo`], with fields and labels from their own queries.
    pub fn into_info(self, fields: Vec<Field>, labels: Vec<String>) -> Result<TypeInfo, TypeError> {
        let category = self.typcategory.bytes().next().unwrap_or(b'X');
        let kind = match self.typtype.as_str() {
            "b" if category == b'A' && self.typelem != 0 => Kind::Array(self.typelem),
            "b" => Kind::Base,
            "c" => Kind::Composite(fields),
            "d" => Kind::Domain(self.typbasetype),
            "e" => Kind::Enum(labels),
            "p" => Kind::Pseudo,
            "r" => match self.rngsubtype {
                Some(element) => Kind::Range(element),
                None => return Err(self.unknown()),
            },
            "m" => match (self.multirange_range, self.multirange_element) {
                (Some(range), Some(element)) => Kind::MultiRange { range, element },
                _ => return Err(self.unknown()),
            },
            _ => return Err(self.unknown()),
        };
        Ok(TypeInfo {
            name: self.typname,
            namespace: self.nspname,
            category,
            delimiter: self.typdelim.bytes().next().unwrap_or(b','),
            kind,
        })
    }

    fn unknown(self) -> TypeError {
        TypeError::UnknownCategory { name: self.typname, typtype: self.typtype }
    }
}

/// In memory [`Catalog`].
///
/// Counts lookups, which makes resolution behavior observable.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    types: HashMap<Oid, TypeInfo>,
    lookups: usize,
}

impl MemoryCatalog {
    pub fn new() -> MemoryCatalog {
        MemoryCatalog::default()
    }

    /// Add type metadata.
    pub fn insert(&mut self, oid: Oid, info: TypeInfo) -> &mut Self {
        self.types.insert(oid, info);
        self
    }

    /// Number of [`Catalog::lookup`] calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

impl Catalog for MemoryCatalog {
    async fn lookup(&mut self, oid: Oid) -> Result<Option<TypeInfo>> {
        self.lookups += 1;
        Ok(self.types.get(&oid).cloned())
    }

    async fn lookup_name(&mut self, name: &str) -> Result<Option<Oid>> {
        let array = name.strip_suffix("[]");
        let found = self.types.iter().find_map(|(oid, info)| {
            let matches = match array {
                Some(elem) => info.name.strip_prefix('_') == Some(elem),
                None => info.name == name,
            };
            matches.then_some(*oid)
        });
        Ok(found)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pg_type_row_kinds() {
        let row = |typtype: &str, typcategory: &str| PgTypeRow {
            typname: "t".into(),
            nspname: "public".into(),
            typtype: typtype.into(),
            typcategory: typcategory.into(),
            typdelim: ",".into(),
            typelem: 23,
            typbasetype: 25,
            rngsubtype: Some(1082),
            multirange_range: Some(3912),
            multirange_element: Some(1082),
        };

        let kind = |r: PgTypeRow| r.into_info(vec![], vec![]).unwrap().kind;
        assert_eq!(kind(row("b", "A")), Kind::Array(23));
        // fixed length types like `name` have typelem but are not arrays
        assert_eq!(kind(row("b", "S")), Kind::Base);
        assert_eq!(kind(row("d", "S")), Kind::Domain(25));
        assert_eq!(kind(row("r", "R")), Kind::Range(1082));
        assert_eq!(kind(row("m", "R")), Kind::MultiRange { range: 3912, element: 1082 });
        assert!(matches!(row("x", "U").into_info(vec![], vec![]), Err(TypeError::UnknownCategory { .. })));
    }
}
