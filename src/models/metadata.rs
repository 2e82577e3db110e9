// src/models/metadata.rs
//! Service metadata model.
//!
//! These are the already-validated metadata objects the query engine works
//! on: participants, services, service metadata templates with their process
//! groups, endpoints and certificates. The administrative layers that create
//! and maintain them are external collaborators; the query engine only reads
//! them and projects them into the wire documents of the supported SMP
//! specifications.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::identifier::{Identifier, ProcessId};

/// A business entity registered in this SMP.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Primary identifier, unique within its scheme under case-fold-aware
    /// comparison
    pub id: Identifier,

    /// Registered name of the business entity
    pub name: String,

    /// Two-letter country code of registration
    pub country: String,

    /// Free-form geographical/address information
    pub address_info: Option<String>,

    /// Date the entity was first registered
    pub first_registration_date: Option<NaiveDate>,

    /// Additional identifiers the entity is known under
    pub additional_ids: Vec<Identifier>,

    /// Whether the participant's business card is published in the network
    /// directory. Mutated only by the external directory integrator.
    pub published_in_directory: bool,

    /// Whether the participant is registered in the SML. Mutated only by the
    /// external SML integrator.
    pub registered_in_sml: bool,
}

/// A service (document type) metadata can be published for.
#[derive(Debug, Clone)]
pub struct Service {
    pub id: Identifier,
    pub name: String,
}

/// An X.509 certificate attached to an endpoint or redirection.
///
/// The certificate is carried as opaque DER bytes; the query engine only
/// encodes it into the response documents and never inspects its contents.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub der: Vec<u8>,
    pub usage: Option<String>,
    pub description: Option<String>,
    pub activation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
}

/// A concrete endpoint offering a transport for a service.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub transport_profile: String,
    pub url: String,
    pub description: Option<String>,
    pub contact_info: Option<String>,
    pub activation_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// At least one certificate is required by the Peppol wire format
    pub certificates: Vec<Certificate>,
}

/// A process a participant supports, together with the roles it acts in.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub process_id: ProcessId,
    pub roles: Vec<Identifier>,
}

impl ProcessInfo {
    /// Compares two process infos: equal when they represent the same
    /// process and the same collection of roles, using scheme-aware
    /// identifier matching. Role order is not significant.
    pub fn matches(&self, other: &ProcessInfo) -> bool {
        if !self.process_id.matches(&other.process_id) {
            return false;
        }
        if self.roles.len() != other.roles.len() {
            return false;
        }
        self.roles
            .iter()
            .all(|r| other.roles.iter().any(|o| r.matches(o)))
    }
}

/// A pointer telling clients the participant's metadata lives at another SMP.
#[derive(Debug, Clone)]
pub struct Redirection {
    /// Base URL of the SMP now publishing the metadata
    pub new_smp_url: String,

    /// Certificate of the new SMP, anchoring trust in the redirection
    pub certificate: Option<Certificate>,
}

/// A subsection of a service metadata template.
///
/// A process group is *either* a redirection to another SMP *or* a set of
/// process/endpoint offerings; the two shapes are mutually exclusive by
/// construction.
#[derive(Debug, Clone)]
pub enum ProcessGroup {
    /// The metadata for the processes lives at another SMP
    Redirect(Redirection),

    /// Locally published processes and the endpoints serving them
    Offerings {
        processes: Vec<ProcessInfo>,
        endpoints: Vec<Endpoint>,
    },
}

/// A reusable bundle of process/endpoint/redirection metadata for a service.
#[derive(Debug, Clone)]
pub struct ServiceMetadataTemplate {
    /// Administrative name, used in diagnostics when a template violates a
    /// wire-format precondition
    pub name: String,

    /// The service this template publishes metadata for
    pub service: Service,

    /// Ordered list of process groups
    pub process_groups: Vec<ProcessGroup>,
}

/// The resolved binding of a participant to a service metadata template.
#[derive(Debug, Clone)]
pub struct ServiceMetadataBinding {
    pub participant_id: Identifier,
    pub template: ServiceMetadataTemplate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::identifier::IdScheme;

    fn role(v: &str) -> Identifier {
        Identifier::with_scheme(v, IdScheme::new("roles", false))
    }

    #[test]
    fn test_process_info_matching_ignores_role_order() {
        let a = ProcessInfo {
            process_id: ProcessId::Id(Identifier::new("P1")),
            roles: vec![role("buyer"), role("seller")],
        };
        let b = ProcessInfo {
            process_id: ProcessId::Id(Identifier::new("p1")),
            roles: vec![role("Seller"), role("Buyer")],
        };
        assert!(a.matches(&b));
    }

    #[test]
    fn test_process_info_differing_roles_do_not_match() {
        let a = ProcessInfo {
            process_id: ProcessId::Id(Identifier::new("P1")),
            roles: vec![role("buyer")],
        };
        let b = ProcessInfo {
            process_id: ProcessId::Id(Identifier::new("P1")),
            roles: vec![role("buyer"), role("seller")],
        };
        assert!(!a.matches(&b));
    }
}
