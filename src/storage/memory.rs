// src/storage/memory.rs
//! In-memory metadata store.
//!
//! Backs the query engine with a thread-safe in-memory registry of schemes,
//! participants and template bindings. Registrations enforce the uniqueness
//! invariant the read path relies on: at most one live participant per
//! scheme-aware identifier equality class. The write path performs a
//! lookup-then-write and re-queries afterwards so that a racing writer that
//! slipped past the pre-check is still reported as a duplicate instead of
//! silently overwriting.

use std::sync::RwLock;

use chrono::Utc;
use log::warn;

use crate::models::identifier::{IdScheme, Identifier};
use crate::models::metadata::{Participant, ServiceMetadataBinding};
use crate::storage::store::{
    ConstraintViolation, MetadataStore, StoreError, ViolationKind,
};

#[derive(Default)]
struct Registry {
    schemes: Vec<IdScheme>,
    participants: Vec<Participant>,
    bindings: Vec<ServiceMetadataBinding>,
}

/// Thread-safe in-memory implementation of [`MetadataStore`].
#[derive(Default)]
pub struct InMemoryStore {
    registry: RwLock<Registry>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        InMemoryStore {
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Registers an identifier scheme. Replaces an existing scheme with the
    /// same scheme id.
    pub fn add_scheme(&self, scheme: IdScheme) {
        let mut reg = self.registry.write().unwrap();
        reg.schemes.retain(|s| s.scheme_id != scheme.scheme_id);
        reg.schemes.push(scheme);
    }

    /// Registers a participant, enforcing the registration constraints.
    ///
    /// # Constraints
    /// - the identifier value must not be empty (`MissingField`)
    /// - a non-empty country code must be two characters (`InvalidField`)
    /// - the first registration date must not lie in the future (`InvalidField`)
    /// - the identifier's scheme must be registered (`InvalidField`)
    /// - the identifier must be unique under scheme-aware comparison
    ///   (`DuplicateId`)
    pub fn register_participant(&self, p: Participant) -> Result<(), ConstraintViolation> {
        let subject = p.id.to_string();
        if p.id.value().is_empty() {
            return Err(ConstraintViolation::new(
                ViolationKind::MissingField,
                &subject,
                "Identifier",
            ));
        }
        if !p.country.is_empty() && p.country.len() != 2 {
            warn!("Participant (ID={}) contains an invalid country code: {}", subject, p.country);
            return Err(ConstraintViolation::new(
                ViolationKind::InvalidField,
                &subject,
                "RegistrationCountry",
            ));
        }
        if let Some(date) = p.first_registration_date {
            if date > Utc::now().date_naive() {
                warn!("Participant (ID={}) contains a future registration date: {}", subject, date);
                return Err(ConstraintViolation::new(
                    ViolationKind::InvalidField,
                    &subject,
                    "FirstRegistrationDate",
                ));
            }
        }

        let mut reg = self.registry.write().unwrap();
        if let Some(scheme) = p.id.scheme() {
            if !reg.schemes.iter().any(|s| s.scheme_id == scheme.scheme_id) {
                warn!("Participant ID references an unmanaged IDScheme (schemeID={})", scheme.scheme_id);
                return Err(ConstraintViolation::new(
                    ViolationKind::InvalidField,
                    &subject,
                    "Identifier.IDScheme",
                ));
            }
        }
        if reg.participants.iter().any(|e| e.id.matches(&p.id)) {
            return Err(ConstraintViolation::new(
                ViolationKind::DuplicateId,
                &subject,
                "a participant with this identifier already exists",
            ));
        }
        reg.participants.push(p);

        // Post-write check: a writer that raced past the pre-check must
        // detect the duplicate and back out rather than leave two live
        // registrations in the same identity class.
        let id = reg.participants.last().map(|e| e.id.clone());
        if let Some(id) = id {
            let count = reg.participants.iter().filter(|e| e.id.matches(&id)).count();
            if count > 1 {
                warn!("Found multiple participant registrations with the identifier {}!", subject);
                reg.participants.pop();
                return Err(ConstraintViolation::new(
                    ViolationKind::DuplicateId,
                    &subject,
                    "a participant with this identifier already exists",
                ));
            }
        }
        Ok(())
    }

    /// Binds a service metadata template to a participant.
    ///
    /// A participant can bind at most one template per service identifier;
    /// a second binding for the same (participant, service) pair is a
    /// `DuplicateId` violation.
    pub fn add_binding(&self, binding: ServiceMetadataBinding) -> Result<(), ConstraintViolation> {
        let mut reg = self.registry.write().unwrap();
        let duplicate = reg.bindings.iter().any(|b| {
            b.participant_id.matches(&binding.participant_id)
                && b.template.service.id.matches(&binding.template.service.id)
        });
        if duplicate {
            return Err(ConstraintViolation::new(
                ViolationKind::DuplicateId,
                &binding.participant_id.to_string(),
                "a binding for this participant and service already exists",
            ));
        }
        reg.bindings.push(binding);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Registry>, StoreError> {
        self.registry
            .read()
            .map_err(|_| StoreError("metadata registry lock poisoned".into()))
    }
}

impl MetadataStore for InMemoryStore {
    fn find_scheme(&self, scheme_id: &str) -> Result<Option<IdScheme>, StoreError> {
        Ok(self
            .read()?
            .schemes
            .iter()
            .find(|s| s.scheme_id == scheme_id)
            .cloned())
    }

    fn find_participant(&self, id: &Identifier) -> Result<Option<Participant>, StoreError> {
        Ok(self
            .read()?
            .participants
            .iter()
            .find(|p| p.id.matches(id))
            .cloned())
    }

    fn find_binding(
        &self,
        participant_id: &Identifier,
        service_id: &Identifier,
    ) -> Result<Option<ServiceMetadataBinding>, StoreError> {
        Ok(self
            .read()?
            .bindings
            .iter()
            .find(|b| {
                b.participant_id.matches(participant_id)
                    && b.template.service.id.matches(service_id)
            })
            .cloned())
    }

    fn find_bindings_for(
        &self,
        participant_id: &Identifier,
    ) -> Result<Vec<ServiceMetadataBinding>, StoreError> {
        Ok(self
            .read()?
            .bindings
            .iter()
            .filter(|b| b.participant_id.matches(participant_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metadata::Service;
    use crate::models::metadata::ServiceMetadataTemplate;

    fn scheme() -> IdScheme {
        IdScheme::new("iso6523-actorid-upis", false)
    }

    fn participant(value: &str) -> Participant {
        Participant {
            id: Identifier::with_scheme(value, scheme()),
            name: "Acme".into(),
            country: "NL".into(),
            address_info: None,
            first_registration_date: None,
            additional_ids: vec![],
            published_in_directory: false,
            registered_in_sml: false,
        }
    }

    fn store() -> InMemoryStore {
        let s = InMemoryStore::new();
        s.add_scheme(scheme());
        s
    }

    #[test]
    fn test_duplicate_id_is_case_fold_aware() {
        let store = store();
        store.register_participant(participant("0088:acme")).unwrap();
        let err = store.register_participant(participant("0088:ACME")).unwrap_err();
        assert_eq!(err.kind, ViolationKind::DuplicateId);
    }

    #[test]
    fn test_lookup_honours_scheme_case_rule() {
        let store = store();
        store.register_participant(participant("0088:acme")).unwrap();
        let found = store
            .find_participant(&Identifier::with_scheme("0088:ACME", scheme()))
            .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_unregistered_scheme_is_invalid_field() {
        let store = InMemoryStore::new();
        let err = store.register_participant(participant("0088:acme")).unwrap_err();
        assert_eq!(err.kind, ViolationKind::InvalidField);
    }

    #[test]
    fn test_invalid_country_code_rejected() {
        let store = store();
        let mut p = participant("0088:acme");
        p.country = "NLD".into();
        let err = store.register_participant(p).unwrap_err();
        assert_eq!(err.kind, ViolationKind::InvalidField);
    }

    #[test]
    fn test_future_registration_date_rejected() {
        let store = store();
        let mut p = participant("0088:acme");
        p.first_registration_date = Some(Utc::now().date_naive() + chrono::Duration::days(2));
        let err = store.register_participant(p).unwrap_err();
        assert_eq!(err.kind, ViolationKind::InvalidField);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let store = store();
        let binding = ServiceMetadataBinding {
            participant_id: Identifier::with_scheme("0088:acme", scheme()),
            template: ServiceMetadataTemplate {
                name: "invoice".into(),
                service: Service {
                    id: Identifier::new("urn:service:invoice"),
                    name: "Invoice".into(),
                },
                process_groups: vec![],
            },
        };
        store.add_binding(binding.clone()).unwrap();
        let err = store.add_binding(binding).unwrap_err();
        assert_eq!(err.kind, ViolationKind::DuplicateId);
    }
}
