//! Namespaced property keys.
//!
//! A [`PropertyKey`] is the pair of an owner scope ([`Namespace`]) and a
//! property name. Both halves follow the same grammar:
//!
//! ```text
//! [a-z0-9._-]+
//! ```
//!
//! Validation happens once, when the key is constructed. Holding a
//! `PropertyKey` is proof that it is well-formed, so nothing downstream
//! re-checks it.

use serde::{Deserialize, Serialize};

/// Errors produced when a namespace or property name violates the key
/// grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The property name is empty or contains a character outside
    /// `[a-z0-9._-]`.
    #[error("invalid property name {name:?}: must match [a-z0-9._-]+")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The namespace is empty or contains a character outside
    /// `[a-z0-9._-]`.
    #[error("invalid namespace {namespace:?}: must match [a-z0-9._-]+")]
    InvalidNamespace {
        /// The rejected namespace.
        namespace: String,
    },
}

/// Return whether `s` is non-empty and made only of `[a-z0-9._-]`.
fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-'))
}

/// The owner scope of a set of properties (one per owning component).
///
/// Deserializing goes through [`Namespace::new`], so a namespace read from
/// config or the wire is held to the same grammar as one built in code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Validate and wrap a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidNamespace`] if `namespace` is empty or
    /// contains characters outside `[a-z0-9._-]`.
    pub fn new(namespace: &str) -> Result<Self, KeyError> {
        if is_valid_segment(namespace) {
            Ok(Self(namespace.to_owned()))
        } else {
            Err(KeyError::InvalidNamespace {
                namespace: namespace.to_owned(),
            })
        }
    }

    /// Return the namespace as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a key for `name` inside this namespace.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidName`] if `name` violates the grammar.
    pub fn key(&self, name: &str) -> Result<PropertyKey, KeyError> {
        PropertyKey::new(self.clone(), name)
    }
}

impl TryFrom<String> for Namespace {
    type Error = KeyError;

    fn try_from(namespace: String) -> Result<Self, Self::Error> {
        Self::new(&namespace)
    }
}

impl From<Namespace> for String {
    fn from(namespace: Namespace) -> Self {
        namespace.0
    }
}

impl core::fmt::Display for Namespace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated `namespace:name` identifier for one property.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawKey")]
pub struct PropertyKey {
    namespace: Namespace,
    name: String,
}

/// Unchecked wire form of a [`PropertyKey`].
#[derive(Deserialize)]
struct RawKey {
    namespace: Namespace,
    name: String,
}

impl TryFrom<RawKey> for PropertyKey {
    type Error = KeyError;

    fn try_from(raw: RawKey) -> Result<Self, Self::Error> {
        Self::new(raw.namespace, &raw.name)
    }
}

impl PropertyKey {
    /// Validate `name` and bind it to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidName`] if `name` is empty or contains
    /// characters outside `[a-z0-9._-]`.
    pub fn new(namespace: Namespace, name: &str) -> Result<Self, KeyError> {
        if !is_valid_segment(name) {
            return Err(KeyError::InvalidName {
                name: name.to_owned(),
            });
        }
        Ok(Self {
            namespace,
            name: name.to_owned(),
        })
    }

    /// The owner scope of this key.
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The property name within the namespace.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl core::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("bastion").unwrap()
    }

    #[test]
    fn accepts_grammar_characters() {
        assert!(PropertyKey::new(ns(), "good.key-1").is_ok());
        assert!(PropertyKey::new(ns(), "interest_rate").is_ok());
        assert!(PropertyKey::new(ns(), "0").is_ok());
    }

    #[test]
    fn rejects_spaces_and_punctuation() {
        let result = PropertyKey::new(ns(), "Bad Key!");
        assert!(matches!(result, Err(KeyError::InvalidName { .. })));
    }

    #[test]
    fn rejects_uppercase() {
        assert!(PropertyKey::new(ns(), "Cash").is_err());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(PropertyKey::new(ns(), "").is_err());
    }

    #[test]
    fn rejects_colon_in_name() {
        assert!(PropertyKey::new(ns(), "other:cash").is_err());
    }

    #[test]
    fn rejects_invalid_namespace() {
        assert!(matches!(
            Namespace::new("My Plugin"),
            Err(KeyError::InvalidNamespace { .. })
        ));
        assert!(Namespace::new("").is_err());
    }

    #[test]
    fn display_joins_with_colon() {
        let key = ns().key("cash").unwrap();
        assert_eq!(key.to_string(), "bastion:cash");
    }

    #[test]
    fn deserializing_enforces_the_grammar() {
        assert!(serde_json::from_str::<Namespace>("\"Bad Key!\"").is_err());
        assert!(serde_json::from_str::<Namespace>("\"\"").is_err());
        assert!(
            serde_json::from_str::<PropertyKey>(r#"{"namespace":"ok","name":"Bad Key!"}"#)
                .is_err()
        );
        assert!(
            serde_json::from_str::<PropertyKey>(r#"{"namespace":"Not Ok","name":"cash"}"#)
                .is_err()
        );
    }

    #[test]
    fn serde_round_trips_valid_keys() {
        let key = ns().key("interest_rate").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"namespace":"bastion","name":"interest_rate"}"#);
        assert_eq!(serde_json::from_str::<PropertyKey>(&json).unwrap(), key);
        assert_eq!(serde_json::from_str::<Namespace>("\"bastion\"").unwrap(), ns());
    }
}
