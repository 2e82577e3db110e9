// src/utils/idstring.rs
//! Parsing and URL encoding of identifier strings.
//!
//! Query URLs carry identifiers in the form `[«schemeID»::]«identifier»`,
//! URL-encoded. The parser resolves the scheme id against the schemes
//! registered in the metadata store; a reference to an unregistered scheme
//! means the identifier cannot exist in this SMP and is reported as such
//! (distinct from a syntactically invalid identifier string).

use thiserror::Error;

use crate::models::identifier::Identifier;
use crate::storage::store::{MetadataStore, StoreError};

/// Failure to turn a query path segment into an identifier.
#[derive(Debug, Error)]
pub enum IdStringError {
    /// The string is not a decodable identifier (bad percent-encoding,
    /// invalid UTF-8 or an empty identifier value)
    #[error("malformed identifier string: {0}")]
    Malformed(String),

    /// The referenced ID scheme is not registered in this SMP
    #[error("unknown identifier scheme: {0}")]
    UnknownScheme(String),

    /// The scheme lookup failed in the backing store
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parses the URL-encoded string representation of an identifier.
///
/// # Arguments
/// * `store` - metadata store used to resolve the scheme id
/// * `id_string` - the raw path segment, i.e. `[«schemeID»::]«identifier»`
///
/// # Returns
/// - `Ok(Identifier)` on success
/// - `Err(IdStringError::UnknownScheme)` when the scheme id is not registered
/// - `Err(IdStringError::Malformed)` when the string cannot be decoded
pub fn parse_id_string(
    store: &dyn MetadataStore,
    id_string: &str,
) -> Result<Identifier, IdStringError> {
    let decoded = url_decode(id_string)?;
    let (scheme_id, value) = match decoded.find("::") {
        Some(sep) => (&decoded[..sep], &decoded[sep + 2..]),
        None => ("", decoded.as_str()),
    };
    if value.is_empty() {
        return Err(IdStringError::Malformed(id_string.to_string()));
    }
    if scheme_id.is_empty() {
        return Ok(Identifier::new(value));
    }
    match store.find_scheme(scheme_id)? {
        Some(scheme) => Ok(Identifier::with_scheme(value, scheme)),
        None => Err(IdStringError::UnknownScheme(scheme_id.to_string())),
    }
}

/// Percent-decodes a URL path segment ('+' is decoded as a space).
pub fn url_decode(input: &str) -> Result<String, IdStringError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = input
                    .get(i + 1..i + 3)
                    .ok_or_else(|| IdStringError::Malformed(input.to_string()))?;
                let v = u8::from_str_radix(hex, 16)
                    .map_err(|_| IdStringError::Malformed(input.to_string()))?;
                out.push(v);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| IdStringError::Malformed(input.to_string()))
}

/// Percent-encodes a string for use in a URL path.
///
/// Alphanumerics and `-`, `_`, `.`, `*` pass through; a space becomes `+`;
/// everything else is encoded byte-wise as `%XX`.
pub fn url_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                out.push(*b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::identifier::IdScheme;
    use crate::storage::memory::InMemoryStore;

    fn store_with_scheme() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_scheme(IdScheme::new("iso6523-actorid-upis", false));
        store
    }

    #[test]
    fn test_parse_with_registered_scheme() {
        let store = store_with_scheme();
        let id = parse_id_string(&store, "iso6523-actorid-upis%3A%3A0088%3A12345").unwrap();
        assert_eq!(id.value(), "0088:12345");
        assert_eq!(id.scheme().unwrap().scheme_id, "iso6523-actorid-upis");
    }

    #[test]
    fn test_parse_without_scheme() {
        let store = store_with_scheme();
        let id = parse_id_string(&store, "plain-identifier").unwrap();
        assert_eq!(id.value(), "plain-identifier");
        assert!(id.scheme().is_none());
    }

    #[test]
    fn test_parse_unknown_scheme() {
        let store = store_with_scheme();
        let err = parse_id_string(&store, "X::val").unwrap_err();
        assert!(matches!(err, IdStringError::UnknownScheme(s) if s == "X"));
    }

    #[test]
    fn test_parse_empty_value_is_malformed() {
        let store = store_with_scheme();
        assert!(matches!(
            parse_id_string(&store, "iso6523-actorid-upis::"),
            Err(IdStringError::Malformed(_))
        ));
        assert!(matches!(
            parse_id_string(&store, ""),
            Err(IdStringError::Malformed(_))
        ));
    }

    #[test]
    fn test_url_decode_rejects_truncated_escape() {
        assert!(url_decode("abc%2").is_err());
        assert!(url_decode("abc%zz").is_err());
    }

    #[test]
    fn test_url_encode_round_trip() {
        let original = "iso6523-actorid-upis::0088:12 345";
        let encoded = url_encode(original);
        assert_eq!(encoded, "iso6523-actorid-upis%3A%3A0088%3A12+345");
        assert_eq!(url_decode(&encoded).unwrap(), original);
    }
}
