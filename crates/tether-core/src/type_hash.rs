//! Deterministic, compiler-independent type identity.
//!
//! [`TypeHash`] is a 64-bit hash computed from a type's name. Two modules that
//! bind the same native type compute the same hash without sharing any
//! compile-time link, which is what lets the type identity registry converge
//! on one record per native type.
//!
//! [`TypeIdentity`] pairs the hash with the compiler-provided type name it was
//! derived from.
//!
//! # Examples
//!
//! ```
//! use tether_core::{TypeHash, TypeIdentity};
//!
//! let a = TypeHash::from_name("Counter");
//! let b = TypeHash::from_name("Counter");
//! assert_eq!(a, b);
//!
//! let id = TypeIdentity::of::<u32>();
//! assert_eq!(id.name(), "u32");
//! assert_eq!(id.hash(), TypeHash::from_name("u32"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
///
/// Types and methods sharing a name still hash differently.
pub mod hash_constants {
    /// Domain marker for type hashes
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for bound method hashes
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;
}

/// A deterministic 64-bit hash identifying a type or a bound method.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a method hash from the owning type and the method name.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::METHOD ^ owner.0.rotate_left(17) ^ xxh64(name.as_bytes(), 0))
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Identity token for a native type.
///
/// The name comes from [`std::any::type_name`], which is derived from the
/// type's path rather than from a per-build `TypeId`, so separately compiled
/// units agree on it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeIdentity {
    name: &'static str,
    hash: TypeHash,
}

impl TypeIdentity {
    /// Identity of the Rust type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// Identity from an explicit, stable name.
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            hash: TypeHash::from_name(name),
        }
    }

    /// The display name the hash was derived from.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The comparison key.
    pub fn hash(&self) -> TypeHash {
        self.hash
    }
}

impl fmt::Debug for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeIdentity")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    #[test]
    fn from_name_is_deterministic() {
        assert_eq!(TypeHash::from_name("Widget"), TypeHash::from_name("Widget"));
        assert_ne!(TypeHash::from_name("Widget"), TypeHash::from_name("Gadget"));
    }

    #[test]
    fn method_hash_differs_from_type_hash() {
        let owner = TypeHash::from_name("Widget");
        assert_ne!(TypeHash::from_method(owner, "Widget"), TypeHash::from_name("Widget"));
        assert_ne!(
            TypeHash::from_method(owner, "spin"),
            TypeHash::from_method(TypeHash::from_name("Gadget"), "spin")
        );
    }

    #[test]
    fn identity_of_type_uses_type_name() {
        let id = TypeIdentity::of::<Widget>();
        assert!(id.name().ends_with("Widget"));
        assert_eq!(id.hash(), TypeHash::from_name(std::any::type_name::<Widget>()));
        assert_eq!(id, TypeIdentity::of::<Widget>());
    }

    #[test]
    fn named_identity_matches_equal_names() {
        assert_eq!(TypeIdentity::named("a::B"), TypeIdentity::named("a::B"));
        assert_ne!(TypeIdentity::named("a::B"), TypeIdentity::named("a::C"));
    }

    #[test]
    fn display_and_debug() {
        let hash = TypeHash(0x1234);
        assert_eq!(format!("{}", hash), "0x0000000000001234");
        assert_eq!(format!("{:?}", hash), "TypeHash(0x0000000000001234)");
        assert!(TypeHash::EMPTY.is_empty());
        assert_eq!(hash.as_u64(), 0x1234);
    }
}
