// src/storage/store.rs
//! Metadata store interface consumed by the query responders.
//!
//! The persistence layer proper (database schema, ORM mapping) is an
//! external collaborator; the query engine only depends on these lookup
//! contracts and on the registration invariant that a successful write
//! guarantees no duplicate exists under scheme-aware identifier equality.

use thiserror::Error;

use crate::models::identifier::{IdScheme, Identifier};
use crate::models::metadata::{Participant, ServiceMetadataBinding};

/// Failure in the backing metadata store. Surfaced to clients as HTTP 500;
/// the query engine never retries.
#[derive(Debug, Error)]
#[error("metadata store failure: {0}")]
pub struct StoreError(pub String);

/// Read-side contract of the metadata store.
///
/// All identifier lookups use [`Identifier::matches`], i.e. honour the
/// scheme's case sensitivity.
pub trait MetadataStore: Send + Sync {
    /// Looks up an identifier scheme by its scheme id (exact match).
    fn find_scheme(&self, scheme_id: &str) -> Result<Option<IdScheme>, StoreError>;

    /// Looks up a participant by its primary identifier.
    fn find_participant(&self, id: &Identifier) -> Result<Option<Participant>, StoreError>;

    /// Looks up the single binding for a (participant, service) pair.
    fn find_binding(
        &self,
        participant_id: &Identifier,
        service_id: &Identifier,
    ) -> Result<Option<ServiceMetadataBinding>, StoreError>;

    /// Collects all template bindings of a participant.
    fn find_bindings_for(
        &self,
        participant_id: &Identifier,
    ) -> Result<Vec<ServiceMetadataBinding>, StoreError>;
}

/// The closed set of reasons a metadata registration can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A registration with an identifier matching an existing one (under
    /// scheme-aware comparison) was attempted
    DuplicateId,

    /// A mandatory field is missing
    MissingField,

    /// A field carries invalid data, e.g. references an unregistered scheme
    InvalidField,

    /// The registration is still referenced and cannot be removed
    InUse,
}

/// A rejected metadata registration, carrying the violated constraint and
/// the identity of the offending registration.
#[derive(Debug, Error)]
#[error("[{kind:?}] {subject}: {details}")]
pub struct ConstraintViolation {
    pub kind: ViolationKind,
    /// String rendering of the offending registration's identifier
    pub subject: String,
    pub details: String,
}

impl ConstraintViolation {
    pub fn new(kind: ViolationKind, subject: &str, details: &str) -> Self {
        ConstraintViolation {
            kind,
            subject: subject.to_string(),
            details: details.to_string(),
        }
    }
}
