// src/models/identifier.rs
//! Identifier and identifier scheme model.
//!
//! Every object managed by the SMP (participants, services, processes, roles)
//! is keyed by an identifier that consists of a value and an optional
//! identifier scheme. The scheme decides whether identifier values are
//! compared case sensitively; this rule is applied by [`Identifier::matches`]
//! and is authoritative for *all* identifier comparisons in the server.

use std::fmt;

use crate::utils::idstring;

/// Reference data describing an identifier scheme.
///
/// Immutable once registered. The `case_sensitive` flag governs how values
/// of identifiers belonging to this scheme are compared.
#[derive(Debug, Clone)]
pub struct IdScheme {
    /// Unique identifier of the scheme, e.g. "iso6523-actorid-upis"
    pub scheme_id: String,

    /// Whether identifier values in this scheme are compared byte-for-byte
    pub case_sensitive: bool,
}

impl IdScheme {
    /// Creates a new identifier scheme.
    ///
    /// # Arguments
    /// * `scheme_id` - unique identifier of the scheme
    /// * `case_sensitive` - whether values are compared case sensitively
    pub fn new(scheme_id: &str, case_sensitive: bool) -> Self {
        IdScheme {
            scheme_id: scheme_id.to_string(),
            case_sensitive,
        }
    }
}

/// A business identifier consisting of a value and an optional scheme.
///
/// An absent scheme is a valid, distinct state meaning "no scheme, compare
/// case-insensitively". Equality of identifiers is defined by
/// [`Identifier::matches`], never by structural comparison of the fields.
#[derive(Debug, Clone)]
pub struct Identifier {
    value: String,
    scheme: Option<IdScheme>,
}

impl Identifier {
    /// Creates a new identifier with the given value and no scheme.
    pub fn new(value: &str) -> Self {
        Identifier {
            value: value.to_string(),
            scheme: None,
        }
    }

    /// Creates a new identifier with the given value and scheme.
    pub fn with_scheme(value: &str, scheme: IdScheme) -> Self {
        Identifier {
            value: value.to_string(),
            scheme: Some(scheme),
        }
    }

    /// Gets the identifier value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Gets the identifier scheme, if any.
    pub fn scheme(&self) -> Option<&IdScheme> {
        self.scheme.as_ref()
    }

    /// Compares two identifiers honouring the scheme's case sensitivity.
    ///
    /// The rule, applied system-wide:
    /// - both identifiers carry a scheme: the scheme ids must be equal,
    ///   otherwise the identifiers are unequal; when the (shared) scheme is
    ///   case sensitive the values are compared byte-for-byte, otherwise the
    ///   lower-cased values are compared;
    /// - exactly one side carries a scheme: unequal;
    /// - neither side carries a scheme: the lower-cased values are compared.
    pub fn matches(&self, other: &Identifier) -> bool {
        match (&self.scheme, &other.scheme) {
            (Some(s1), Some(s2)) => {
                if s1.scheme_id != s2.scheme_id {
                    return false;
                }
                if s1.case_sensitive {
                    self.value == other.value
                } else {
                    self.value.to_lowercase() == other.value.to_lowercase()
                }
            }
            (None, None) => self.value.to_lowercase() == other.value.to_lowercase(),
            _ => false,
        }
    }

    /// Gets the URL-encoded string representation of the identifier, for use
    /// in reference URLs pointing back at this SMP.
    pub fn url_encoded(&self) -> String {
        idstring::url_encode(&self.to_string())
    }
}

impl fmt::Display for Identifier {
    /// Renders the identifier as `scheme::value`, or just the value when no
    /// scheme is assigned.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scheme {
            Some(s) => write!(f, "{}::{}", s.scheme_id, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// A process identifier, which may represent "no specific process".
///
/// The "no process" state is rendered in the wire documents as a fixed
/// sentinel token defined by each SMP specification rather than as a real
/// scheme/value pair.
#[derive(Debug, Clone)]
pub enum ProcessId {
    /// The metadata applies to no specific process
    NoProcess,

    /// A concrete process identifier
    Id(Identifier),
}

impl ProcessId {
    /// Compares two process identifiers using scheme-aware matching.
    pub fn matches(&self, other: &ProcessId) -> bool {
        match (self, other) {
            (ProcessId::NoProcess, ProcessId::NoProcess) => true,
            (ProcessId::Id(a), ProcessId::Id(b)) => a.matches(b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_scheme_matches() {
        let scheme = IdScheme::new("iso6523-actorid-upis", false);
        let a = Identifier::with_scheme("AbC", scheme.clone());
        let b = Identifier::with_scheme("abc", scheme);
        assert!(a.matches(&b));
        assert!(b.matches(&a));
    }

    #[test]
    fn test_case_sensitive_scheme_does_not_match() {
        let scheme = IdScheme::new("sensitive-scheme", true);
        let a = Identifier::with_scheme("AbC", scheme.clone());
        let b = Identifier::with_scheme("abc", scheme.clone());
        assert!(!a.matches(&b));

        let c = Identifier::with_scheme("abc", scheme.clone());
        let d = Identifier::with_scheme("abc", scheme);
        assert!(c.matches(&d));
    }

    #[test]
    fn test_no_scheme_compares_case_insensitively() {
        let a = Identifier::new("AbC");
        let b = Identifier::new("abc");
        assert!(a.matches(&b));
    }

    #[test]
    fn test_mixed_scheme_presence_is_unequal() {
        let scheme = IdScheme::new("iso6523-actorid-upis", false);
        let a = Identifier::with_scheme("abc", scheme);
        let b = Identifier::new("abc");
        assert!(!a.matches(&b));
        assert!(!b.matches(&a));
    }

    #[test]
    fn test_different_schemes_are_unequal() {
        let a = Identifier::with_scheme("abc", IdScheme::new("scheme-a", false));
        let b = Identifier::with_scheme("abc", IdScheme::new("scheme-b", false));
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_display_and_url_encoding() {
        let id = Identifier::with_scheme("0088:1234", IdScheme::new("iso6523-actorid-upis", false));
        assert_eq!(id.to_string(), "iso6523-actorid-upis::0088:1234");
        assert_eq!(id.url_encoded(), "iso6523-actorid-upis%3A%3A0088%3A1234");
    }

    #[test]
    fn test_no_process_matching() {
        let real = ProcessId::Id(Identifier::new("proc-1"));
        assert!(ProcessId::NoProcess.matches(&ProcessId::NoProcess));
        assert!(!ProcessId::NoProcess.matches(&real));
        assert!(real.matches(&ProcessId::Id(Identifier::new("PROC-1"))));
    }
}
