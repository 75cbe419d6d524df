use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
};

use super::{Catalog, Direction, Kind, Type, TypeError};
use crate::{
    Result,
    codec::primitive::Primitive,
    common::{debug, verbose},
    postgres::{Oid, PgFormat, oid},
};

/// Cache of resolved server types, keyed by oid.
///
/// A type is only visible after every type reachable from it is present, readers
/// never observe a partially resolved type graph. The registry is shareable between
/// connections with [`Arc`].
#[derive(Debug)]
pub struct Registry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    types: HashMap<Oid, Arc<Type>>,
    names: HashMap<String, Oid>,
}

impl Inner {
    fn insert(&mut self, ty: Type) -> Arc<Type> {
        let oid = ty.oid();
        let ty = self.types.entry(oid).or_insert_with(|| Arc::new(ty)).clone();
        self.names.entry(qualified(&ty)).or_insert(oid);
        ty
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create registry with built-in types.
    pub fn new() -> Registry {
        let mut inner = Inner::default();
        for ty in builtin() {
            inner.insert(ty);
        }
        Registry { inner: RwLock::new(inner) }
    }

    /// Create registry without any types.
    pub fn empty() -> Registry {
        Registry { inner: RwLock::new(Inner::default()) }
    }

    /// Get cached type.
    pub fn get(&self, oid: Oid) -> Option<Arc<Type>> {
        self.read(|inner| inner.types.get(&oid).cloned())
    }

    /// Get cached type by name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Type>> {
        let name = normalize_name(name);
        self.read(|inner| {
            let oid = inner.names.get(name.as_ref())?;
            inner.types.get(oid).cloned()
        })
    }

    /// Whether type is cached.
    pub fn contains(&self, oid: Oid) -> bool {
        self.read(|inner| inner.types.contains_key(&oid))
    }

    /// Whether type and every type reachable from it are cached.
    ///
    /// False after a constituent was [invalidated][Registry::invalidate], while the
    /// type itself is still cached.
    pub fn is_complete(&self, oid: Oid) -> bool {
        self.read(|inner| {
            let mut seen = HashSet::new();
            let mut pending = vec![oid];
            while let Some(next) = pending.pop() {
                if !seen.insert(next) {
                    continue;
                }
                match inner.types.get(&next) {
                    Some(ty) => pending.extend(ty.related()),
                    None => return false,
                }
            }
            true
        })
    }

    /// Number of cached types.
    pub fn len(&self) -> usize {
        self.read(|inner| inner.types.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a type and everything it refers to.
    ///
    /// Types missing from the cache are fetched from `catalog`. Each missing oid is
    /// looked up once, an oid already staged in this resolution is reused, so cyclic
    /// type graphs terminate. The staged types are committed at once.
    ///
    /// Concurrent resolutions of the same oid may both query the catalog, the first
    /// commit wins and every caller receives the same [`Arc`].
    pub async fn resolve<C: Catalog>(&self, oid: Oid, mut catalog: C) -> Result<Arc<Type>> {
        let mut visited = HashSet::new();
        let mut staged = HashMap::<Oid, Type>::new();
        let mut pending = vec![oid];

        while let Some(next) = pending.pop() {
            if !visited.insert(next) {
                continue;
            }

            // constituents of a cached type may have been invalidated
            if let Some(ty) = self.get(next) {
                pending.extend(ty.related());
                continue;
            }

            verbose!(oid = next, "catalog lookup");
            let info = catalog.lookup(next).await?.ok_or(TypeError::UnknownOid(next))?;
            let ty = Type::from_info(next, info);

            pending.extend(ty.related());
            staged.insert(next, ty);
        }

        if staged.is_empty() {
            return self.get(oid).ok_or_else(|| TypeError::UnknownOid(oid).into());
        }

        debug!("resolved {} types for oid {oid}", staged.len());

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for (_, ty) in staged {
            inner.insert(ty);
        }

        // committed above, or by a concurrent resolution
        inner.types.get(&oid).cloned().ok_or_else(|| TypeError::UnknownOid(oid).into())
    }

    /// Resolve a type by name.
    ///
    /// SQL spellings like `integer` or `double precision` are accepted, a trailing
    /// `[]` names the array type.
    pub async fn resolve_name<C: Catalog>(&self, name: &str, mut catalog: C) -> Result<Arc<Type>> {
        if let Some(ty) = self.get_by_name(name) {
            return Ok(ty);
        }
        let oid = catalog
            .lookup_name(name)
            .await?
            .ok_or_else(|| TypeError::UnknownName(name.to_owned()))?;
        self.resolve(oid, catalog).await
    }

    /// Drop cached type, the next reference resolves it again.
    pub fn invalidate(&self, oid: Oid) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(ty) = inner.types.remove(&oid) {
            inner.names.remove(&qualified(&ty));
        }
    }

    /// Drop every cached type, keeping built-in types.
    pub fn clear(&self) {
        let mut fresh = Inner::default();
        for ty in builtin() {
            fresh.insert(ty);
        }
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    /// Whether values of the type can be transferred in `format`.
    ///
    /// Text format is always supported. Binary support of structured types follows their
    /// constituents, a multirange asks its range, which asks its element.
    pub fn supports(&self, oid: Oid, format: PgFormat, direction: Direction) -> bool {
        if format == PgFormat::Text {
            return true;
        }
        self.supports_binary(oid, direction, &mut HashSet::new())
    }

    fn supports_binary(&self, oid: Oid, direction: Direction, seen: &mut HashSet<Oid>) -> bool {
        // a cycle is decided by the types outside of it
        if !seen.insert(oid) {
            return true;
        }
        let Some(ty) = self.get(oid) else {
            return false;
        };
        match ty.kind() {
            Kind::Base => Primitive::from_type(&ty).is_some_and(|p| p.binary()),
            Kind::Array(e) | Kind::Range(e) | Kind::Domain(e) => self.supports_binary(*e, direction, seen),
            Kind::MultiRange { range, .. } => self.supports_binary(*range, direction, seen),
            Kind::Composite(fields) => fields.iter().all(|f| self.supports_binary(f.oid, direction, seen)),
            Kind::Enum(_) => true,
            Kind::Pseudo => match ty.oid() {
                oid::VOID => true,
                // binary record carries the oid of each field, but there is nothing to encode it from
                oid::RECORD => direction == Direction::Decode,
                _ => false,
            },
        }
    }

    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        f(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }
}

fn qualified(ty: &Type) -> String {
    match ty.namespace() {
        "pg_catalog" | "public" => ty.name().to_owned(),
        ns => format!("{ns}.{}", ty.name()),
    }
}

/// Map SQL spelling to `pg_type.typname`.
fn normalize_name(name: &str) -> std::borrow::Cow<'_, str> {
    let name = name.trim();
    let (base, array) = match name.strip_suffix("[]") {
        Some(base) => (base.trim_end(), true),
        None => (name, false),
    };
    let base = match base.to_ascii_lowercase().as_str() {
        "integer" | "int" | "serial" | "serial4" => "int4",
        "bigint" | "bigserial" | "serial8" => "int8",
        "smallint" | "smallserial" | "serial2" => "int2",
        "real" => "float4",
        "double precision" => "float8",
        "decimal" => "numeric",
        "boolean" => "bool",
        "character varying" => "varchar",
        "character" => "bpchar",
        "timestamp without time zone" => "timestamp",
        "timestamp with time zone" => "timestamptz",
        "time without time zone" => "time",
        "time with time zone" => "timetz",
        _ if !array => return base.into(),
        _ => return format!("_{base}").into(),
    };
    match array {
        true => format!("_{base}").into(),
        false => base.into(),
    }
}

/// Built-in types, present without catalog lookup.
fn builtin() -> Vec<Type> {
    use super::Kind::*;

    macro_rules! types {
        ($($oid:ident $name:literal $kind:expr, $cat:literal;)*) => {
            vec![$(Type::new(oid::$oid, $name, $kind).with_category($cat),)*]
        };
    }

    types! {
        BOOL "bool" Base, b'B';
        BYTEA "bytea" Base, b'U';
        CHAR "char" Base, b'Z';
        NAME "name" Base, b'S';
        INT8 "int8" Base, b'N';
        INT2 "int2" Base, b'N';
        INT4 "int4" Base, b'N';
        TEXT "text" Base, b'S';
        OID "oid" Base, b'N';
        JSON "json" Base, b'U';
        FLOAT4 "float4" Base, b'N';
        FLOAT8 "float8" Base, b'N';
        UNKNOWN "unknown" Base, b'X';
        BPCHAR "bpchar" Base, b'S';
        VARCHAR "varchar" Base, b'S';
        DATE "date" Base, b'D';
        TIME "time" Base, b'D';
        TIMESTAMP "timestamp" Base, b'D';
        TIMESTAMPTZ "timestamptz" Base, b'D';
        INTERVAL "interval" Base, b'T';
        TIMETZ "timetz" Base, b'D';
        NUMERIC "numeric" Base, b'N';
        RECORD "record" Pseudo, b'P';
        VOID "void" Pseudo, b'P';
        UUID "uuid" Base, b'U';
        JSONB "jsonb" Base, b'U';
        JSON_ARRAY "_json" Array(oid::JSON), b'A';
        BOOL_ARRAY "_bool" Array(oid::BOOL), b'A';
        BYTEA_ARRAY "_bytea" Array(oid::BYTEA), b'A';
        CHAR_ARRAY "_char" Array(oid::CHAR), b'A';
        NAME_ARRAY "_name" Array(oid::NAME), b'A';
        INT2_ARRAY "_int2" Array(oid::INT2), b'A';
        INT4_ARRAY "_int4" Array(oid::INT4), b'A';
        TEXT_ARRAY "_text" Array(oid::TEXT), b'A';
        BPCHAR_ARRAY "_bpchar" Array(oid::BPCHAR), b'A';
        VARCHAR_ARRAY "_varchar" Array(oid::VARCHAR), b'A';
        INT8_ARRAY "_int8" Array(oid::INT8), b'A';
        FLOAT4_ARRAY "_float4" Array(oid::FLOAT4), b'A';
        FLOAT8_ARRAY "_float8" Array(oid::FLOAT8), b'A';
        OID_ARRAY "_oid" Array(oid::OID), b'A';
        TIMESTAMP_ARRAY "_timestamp" Array(oid::TIMESTAMP), b'A';
        DATE_ARRAY "_date" Array(oid::DATE), b'A';
        TIME_ARRAY "_time" Array(oid::TIME), b'A';
        TIMESTAMPTZ_ARRAY "_timestamptz" Array(oid::TIMESTAMPTZ), b'A';
        INTERVAL_ARRAY "_interval" Array(oid::INTERVAL), b'A';
        TIMETZ_ARRAY "_timetz" Array(oid::TIMETZ), b'A';
        NUMERIC_ARRAY "_numeric" Array(oid::NUMERIC), b'A';
        UUID_ARRAY "_uuid" Array(oid::UUID), b'A';
        JSONB_ARRAY "_jsonb" Array(oid::JSONB), b'A';
        INT4RANGE "int4range" Range(oid::INT4), b'R';
        NUMRANGE "numrange" Range(oid::NUMERIC), b'R';
        TSRANGE "tsrange" Range(oid::TIMESTAMP), b'R';
        TSTZRANGE "tstzrange" Range(oid::TIMESTAMPTZ), b'R';
        DATERANGE "daterange" Range(oid::DATE), b'R';
        INT8RANGE "int8range" Range(oid::INT8), b'R';
        INT4MULTIRANGE "int4multirange" MultiRange { range: oid::INT4RANGE, element: oid::INT4 }, b'R';
        NUMMULTIRANGE "nummultirange" MultiRange { range: oid::NUMRANGE, element: oid::NUMERIC }, b'R';
        TSMULTIRANGE "tsmultirange" MultiRange { range: oid::TSRANGE, element: oid::TIMESTAMP }, b'R';
        TSTZMULTIRANGE "tstzmultirange" MultiRange { range: oid::TSTZRANGE, element: oid::TIMESTAMPTZ }, b'R';
        DATEMULTIRANGE "datemultirange" MultiRange { range: oid::DATERANGE, element: oid::DATE }, b'R';
        INT8MULTIRANGE "int8multirange" MultiRange { range: oid::INT8RANGE, element: oid::INT8 }, b'R';
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::types::{Field, MemoryCatalog, TypeInfo};

    const NODE: Oid = 90_001;
    const NODE_ARRAY: Oid = 90_002;
    const ADDRESS: Oid = 90_010;

    fn node_catalog() -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        catalog
            .insert(NODE, TypeInfo::new("node", Kind::Composite(vec![
                Field { name: "id".into(), oid: oid::INT4 },
                Field { name: "children".into(), oid: NODE_ARRAY },
            ])))
            .insert(NODE_ARRAY, TypeInfo::new("_node", Kind::Array(NODE)));
        catalog
    }

    #[tokio::test]
    async fn builtin_without_lookup() {
        let registry = Registry::new();
        let mut catalog = MemoryCatalog::new();
        let ty = registry.resolve(oid::INT4_ARRAY, &mut catalog).await.unwrap();
        assert_eq!(ty.element(), Some(oid::INT4));
        assert_eq!(catalog.lookups(), 0);
    }

    #[tokio::test]
    async fn self_referential_composite() {
        let registry = Registry::new();
        let before = registry.len();
        let mut catalog = node_catalog();

        let node = registry.resolve(NODE, &mut catalog).await.unwrap();
        assert_eq!(node.fields()[1].oid, NODE_ARRAY);
        assert_eq!(registry.get(NODE_ARRAY).unwrap().element(), Some(NODE));
        assert_eq!(catalog.lookups(), 2);
        assert_eq!(registry.len(), before + 2);

        let again = registry.resolve(NODE_ARRAY, &mut catalog).await.unwrap();
        assert_eq!(again.oid(), NODE_ARRAY);
        assert_eq!(catalog.lookups(), 2);
    }

    #[tokio::test]
    async fn unknown_constituent_commits_nothing() {
        let registry = Registry::new();
        let mut catalog = MemoryCatalog::new();
        catalog.insert(ADDRESS, TypeInfo::new("address", Kind::Composite(vec![
            Field { name: "street".into(), oid: 99_999 },
        ])));

        assert!(registry.resolve(ADDRESS, &mut catalog).await.is_err());
        assert!(!registry.contains(ADDRESS));
    }

    #[tokio::test]
    async fn concurrent_population_converges() {
        let registry = Arc::new(Registry::new());

        let handles = (0..8).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut catalog = node_catalog();
                registry.resolve(NODE, &mut catalog).await.unwrap()
            })
        });

        let mut resolved = vec![];
        for handle in handles.collect::<Vec<_>>() {
            resolved.push(handle.await.unwrap());
        }
        assert!(resolved.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(Arc::ptr_eq(&resolved[0], &registry.get(NODE).unwrap()));
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let registry = Registry::new();
        let mut catalog = node_catalog();
        registry.resolve(NODE, &mut catalog).await.unwrap();

        registry.invalidate(NODE);
        assert!(registry.get(NODE).is_none());
        assert!(registry.get_by_name("node").is_none());
        registry.resolve(NODE, &mut catalog).await.unwrap();
        assert_eq!(catalog.lookups(), 3);

        registry.clear();
        assert!(registry.get(NODE_ARRAY).is_none());
        assert!(registry.get(oid::INT4).is_some());
    }

    #[tokio::test]
    async fn invalidated_constituent_is_incomplete() {
        let registry = Registry::new();
        let mut catalog = node_catalog();
        registry.resolve(NODE, &mut catalog).await.unwrap();
        assert!(registry.is_complete(NODE));

        registry.invalidate(NODE_ARRAY);
        assert!(registry.contains(NODE));
        assert!(!registry.is_complete(NODE));

        registry.resolve(NODE, &mut catalog).await.unwrap();
        assert!(registry.is_complete(NODE));
        assert_eq!(catalog.lookups(), 3);
    }

    #[tokio::test]
    async fn resolve_by_name() {
        let registry = Registry::new();
        let mut catalog = node_catalog();
        assert_eq!(registry.get_by_name("integer").unwrap().oid(), oid::INT4);
        assert_eq!(registry.get_by_name("double precision").unwrap().oid(), oid::FLOAT8);
        assert_eq!(registry.get_by_name("bigint[]").unwrap().oid(), oid::INT8_ARRAY);
        assert_eq!(registry.get_by_name("text").unwrap().oid(), oid::TEXT);

        let node = registry.resolve_name("node[]", &mut catalog).await.unwrap();
        assert_eq!(node.oid(), NODE_ARRAY);
        assert!(registry.resolve_name("nope", &mut catalog).await.is_err());
    }

    #[tokio::test]
    async fn multirange_support_follows_element() {
        const POINT: Oid = 600;
        const POINTRANGE: Oid = 90_100;
        const POINTMULTIRANGE: Oid = 90_101;

        let registry = Registry::new();
        let mut catalog = MemoryCatalog::new();
        catalog
            .insert(POINT, TypeInfo::new("point", Kind::Base))
            .insert(POINTRANGE, TypeInfo::new("pointrange", Kind::Range(POINT)))
            .insert(POINTMULTIRANGE, TypeInfo::new("pointmultirange", Kind::MultiRange {
                range: POINTRANGE,
                element: POINT,
            }));

        let mr = registry.resolve(POINTMULTIRANGE, &mut catalog).await.unwrap();
        assert_eq!(mr.range(), Some(POINTRANGE));
        assert_eq!(mr.base(), Some(POINT));

        let (b, d) = (PgFormat::Binary, Direction::Decode);
        assert!(!registry.supports(POINTMULTIRANGE, b, d));
        assert!(registry.supports(POINTMULTIRANGE, PgFormat::Text, d));
        assert!(registry.supports(oid::INT4MULTIRANGE, b, d));
        assert!(registry.supports(oid::NUMMULTIRANGE, b, d));
        assert!(registry.supports(oid::RECORD, b, Direction::Decode));
        assert!(!registry.supports(oid::RECORD, b, Direction::Encode));
    }
}
