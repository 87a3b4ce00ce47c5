//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Stable identifier of a declared resource. Immutable once assigned.
    ResourceId
);

string_newtype!(
    /// Identifier of one automation run, also the name of its artifact directory.
    JobId
);

string_newtype!(
    /// Name under which a secret is kept in the credential vault.
    SecretRef
);

/// Check that an identifier is usable as a resource id (and as a file name).
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_display_and_as_ref() {
        let id = ResourceId::new("qw-1");
        assert_eq!(id.to_string(), "qw-1");
        assert_eq!(id.as_str(), "qw-1");
        assert_eq!(AsRef::<str>::as_ref(&id), "qw-1");
        assert_eq!(id, "qw-1");
    }

    #[test]
    fn resource_id_serializes_as_plain_string() {
        let id = ResourceId::new("logs");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"logs\"");
        let back: ResourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn identifier_rules() {
        assert!(is_valid_identifier("logs"));
        assert!(is_valid_identifier("vm_01.eu-central"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier(".hidden"));
        assert!(!is_valid_identifier("a/b"));
        assert!(!is_valid_identifier("with space"));
        assert!(!is_valid_identifier(&"x".repeat(129)));
    }
}
