//! Type identity registry.
//!
//! Several bindings may map the same native type, possibly registered by
//! independently built modules. This crate keeps one canonical
//! [`TypeRecord`] per native type for the whole process, and publishes a
//! matching runtime-side table in each [`State`] so every binding of the
//! type sees the same record.
//!
//! # Storage Model
//!
//! - **Process side**: a lazily created `OnceLock<Mutex<TypeRegistry>>`
//!   keyed by [`TypeHash`]. The first registration of a hash wins; later
//!   ones receive the same `Arc`.
//! - **Runtime side**: a table `{ name, hash }` stored in the globals under
//!   the identity name, and attached to every binding's method table under
//!   [`TYPE_KEY`].

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use rustc_hash::FxHashMap;
use tether_core::{RuntimeError, State, TableRef, TypeHash, TypeIdentity, Value};

/// Reserved method-table key holding the runtime-side type record.
pub const TYPE_KEY: &str = "__type";

static REGISTRY: OnceLock<Mutex<TypeRegistry>> = OnceLock::new();

/// Canonical description of a native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRecord {
    pub name: &'static str,
    pub hash: TypeHash,
}

impl TypeRecord {
    pub fn identity(&self) -> TypeIdentity {
        TypeIdentity::named(self.name)
    }
}

/// Process-wide map from type hash to canonical record.
#[derive(Default)]
pub struct TypeRegistry {
    records: FxHashMap<TypeHash, Arc<TypeRecord>>,
}

impl TypeRegistry {
    /// The process-wide registry, created on first use.
    pub fn global() -> &'static Mutex<TypeRegistry> {
        REGISTRY.get_or_init(|| Mutex::new(TypeRegistry::default()))
    }

    /// Get the canonical record for an identity, inserting it if this is
    /// the first registration.
    pub fn canonical(&mut self, identity: TypeIdentity) -> Arc<TypeRecord> {
        self.records
            .entry(identity.hash())
            .or_insert_with(|| {
                log::debug!("registered native type {} ({})", identity.name(), identity.hash());
                Arc::new(TypeRecord {
                    name: identity.name(),
                    hash: identity.hash(),
                })
            })
            .clone()
    }

    pub fn get(&self, hash: TypeHash) -> Option<Arc<TypeRecord>> {
        self.records.get(&hash).cloned()
    }

    pub fn contains(&self, hash: TypeHash) -> bool {
        self.records.contains_key(&hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("records", &self.records.len())
            .finish()
    }
}

/// Canonicalise an identity in the process-wide registry.
///
/// A poisoned lock still holds a consistent map (insertions are a single
/// `entry` call), so poisoning is ignored.
pub fn canonical(identity: TypeIdentity) -> Arc<TypeRecord> {
    TypeRegistry::global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .canonical(identity)
}

/// Look up a canonical record by hash.
pub fn lookup(hash: TypeHash) -> Option<Arc<TypeRecord>> {
    TypeRegistry::global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(hash)
}

/// Result of [`resolve`]: the canonical record and its runtime-side table.
#[derive(Debug, Clone)]
pub struct ResolvedType {
    pub record: Arc<TypeRecord>,
    pub table: TableRef,
}

/// Resolve a binding's type identity and attach it to its method table.
///
/// If the runtime already publishes a table under the identity name, that
/// table is reused, so two bindings of one native type share it. Otherwise
/// a new `{ name, hash }` table is created and published.
pub fn resolve(
    state: &mut State,
    methods: TableRef,
    identity: TypeIdentity,
) -> Result<ResolvedType, RuntimeError> {
    let record = canonical(identity);

    let table = match state.global(record.name) {
        Value::Table(existing) => existing,
        _ => {
            let table = state.new_table();
            state.set_field(table, "name", record.name)?;
            // Stored bit-for-bit; the runtime's integers are signed.
            state.set_field(table, "hash", Value::Int(record.hash.as_u64() as i64))?;
            state.set_global(record.name, table)?;
            table
        }
    };

    state.set_field(methods, TYPE_KEY, table)?;
    Ok(ResolvedType { record, table })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;
    struct Gamma;

    #[test]
    fn canonical_returns_the_same_record() {
        let first = canonical(TypeIdentity::of::<Alpha>());
        let second = canonical(TypeIdentity::of::<Alpha>());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(lookup(first.hash).as_deref(), Some(&*first));
    }

    #[test]
    fn local_registry_counts() {
        let mut registry = TypeRegistry::default();
        assert!(registry.is_empty());
        registry.canonical(TypeIdentity::named("one"));
        registry.canonical(TypeIdentity::named("one"));
        registry.canonical(TypeIdentity::named("two"));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(TypeHash::from_name("two")));
    }

    #[test]
    fn resolve_publishes_type_table() {
        let mut state = State::new();
        let methods = state.new_table();
        let identity = TypeIdentity::of::<Beta>();

        let resolved = resolve(&mut state, methods, identity).unwrap();
        assert_eq!(state.global(identity.name()), Value::Table(resolved.table));
        assert_eq!(state.get_field(methods, TYPE_KEY).unwrap(), Value::Table(resolved.table));
        assert_eq!(
            state.get_field(resolved.table, "name").unwrap(),
            Value::str(identity.name())
        );
        assert_eq!(resolved.record.hash, identity.hash());
    }

    #[test]
    fn second_binding_shares_the_table() {
        let mut state = State::new();
        let first_methods = state.new_table();
        let second_methods = state.new_table();
        let identity = TypeIdentity::of::<Gamma>();

        let first = resolve(&mut state, first_methods, identity).unwrap();
        let second = resolve(&mut state, second_methods, identity).unwrap();
        assert_eq!(first.table, second.table);
        assert!(Arc::ptr_eq(&first.record, &second.record));
        assert_eq!(
            state.get_field(second_methods, TYPE_KEY).unwrap(),
            Value::Table(first.table)
        );
    }

    #[test]
    fn separate_states_get_separate_tables() {
        let identity = TypeIdentity::named("tether_registry::tests::Shared");
        let mut a = State::new();
        let mut b = State::new();
        let ma = a.new_table();
        let mb = b.new_table();
        let ra = resolve(&mut a, ma, identity).unwrap();
        let rb = resolve(&mut b, mb, identity).unwrap();
        assert!(Arc::ptr_eq(&ra.record, &rb.record));
        assert!(b.is_live(&Value::Table(rb.table)));
    }
}
