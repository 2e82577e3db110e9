// src/query/oasisv2.rs
//! Query responder for the OASIS SMP Version 2.0 specification.
//!
//! Serves the `/bdxr-smp-2/` URL namespace. Both the ServiceGroup and the
//! ServiceMetadata response are signed. Unlike the Peppol format, the V2
//! documents can carry a Redirect next to regular process metadata, so no
//! exclusivity check applies here.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace};

use crate::models::identifier::{Identifier, ProcessId};
use crate::models::metadata::{
    Certificate, Endpoint, ProcessGroup, ProcessInfo, Redirection, ServiceMetadataBinding,
};
use crate::query::responder::{id_error_status, QueryResponder, QueryResponse};
use crate::storage::store::MetadataStore;
use crate::utils::idstring;
use crate::xml::document::{XmlDocument, XmlElement};
use crate::xml::signer::{ResponseSigner, DIGEST_SHA256, SIG_RSA_SHA256};

const URL_PREFIX: &str = "/bdxr-smp-2/";

const SERVICE_GROUP_NS: &str = "http://docs.oasis-open.org/bdxr/ns/SMP/2/ServiceGroup";
const SERVICE_METADATA_NS: &str = "http://docs.oasis-open.org/bdxr/ns/SMP/2/ServiceMetadata";
const AGGREGATE_NS: &str = "http://docs.oasis-open.org/bdxr/ns/SMP/2/AggregateComponents";
const BASIC_NS: &str = "http://docs.oasis-open.org/bdxr/ns/SMP/2/BasicComponents";

const SMP_VERSION_ID: &str = "2.0";

/// Rendering of the "no process" sentinel in OASIS SMP V2 documents.
const NO_PROCESS_VALUE: &str = "bdx:noprocess";

/// Processes SMP queries as specified by the OASIS SMP V2 specification.
pub struct OasisV2QueryResponder {
    store: Arc<dyn MetadataStore>,
    signer: Arc<ResponseSigner>,
    /// MIME type set on the `mimeCode` attribute of certificate content
    cert_mime_type: String,
}

impl OasisV2QueryResponder {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        signer: Arc<ResponseSigner>,
        cert_mime_type: &str,
    ) -> Self {
        OasisV2QueryResponder {
            store,
            signer,
            cert_mime_type: cert_mime_type.to_string(),
        }
    }

    fn service_group_query(&self, pid_string: &str) -> QueryResponse {
        trace!("Process a ServiceGroup query");
        let part_id = match idstring::parse_id_string(self.store.as_ref(), pid_string) {
            Ok(id) => id,
            Err(e) => {
                debug!("Cannot resolve queried Participant ID ({}): {}", pid_string, e);
                return QueryResponse::status(id_error_status(&e));
            }
        };
        trace!("Check if Participant with ID={} exists", part_id);
        match self.store.find_participant(&part_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("Queried Participant ID ({}) not found!", pid_string);
                return QueryResponse::status(StatusCode::NOT_FOUND);
            }
            Err(e) => {
                error!("Error retrieving Participant ({}): {}", part_id, e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
        let bindings = match self.store.find_bindings_for(&part_id) {
            Ok(b) => b,
            Err(e) => {
                error!("Error retrieving bindings of Participant ({}): {}", part_id, e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        if bindings.is_empty() {
            debug!("No templates bound to Participant={}", part_id);
            return QueryResponse::status(StatusCode::NOT_FOUND);
        }
        trace!("Create ServiceGroup response document");
        let response = service_group_document(&part_id, &bindings);
        trace!("Sign the response document");
        let signed = match self
            .signer
            .sign_response(response, SIG_RSA_SHA256, DIGEST_SHA256, None)
        {
            Ok(doc) => doc,
            Err(e) => {
                error!("Error occurred signing the response document: {}", e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        info!("Completed ServiceGroup query for Participant={}", part_id);
        QueryResponse::ok(signed)
    }

    fn service_metadata_query(&self, pid_string: &str, sid_string: &str) -> QueryResponse {
        trace!("Process a ServiceMetadata query");
        let svc_id = match idstring::parse_id_string(self.store.as_ref(), sid_string) {
            Ok(id) => id,
            Err(e) => {
                debug!("Cannot resolve queried Service ID ({}): {}", sid_string, e);
                return QueryResponse::status(id_error_status(&e));
            }
        };
        let part_id = match idstring::parse_id_string(self.store.as_ref(), pid_string) {
            Ok(id) => id,
            Err(e) => {
                debug!("Cannot resolve queried Participant ID ({}): {}", pid_string, e);
                return QueryResponse::status(id_error_status(&e));
            }
        };
        trace!("Retrieve binding for Participant={} and Service={}", part_id, svc_id);
        let binding = match self.store.find_binding(&part_id, &svc_id) {
            Ok(Some(b)) => b,
            Ok(None) => {
                debug!("No template found for Participant={} and Service={}", part_id, svc_id);
                return QueryResponse::status(StatusCode::NOT_FOUND);
            }
            Err(e) => {
                error!("Error retrieving binding for Participant ({}): {}", part_id, e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        trace!("Create ServiceMetadata response document");
        let response = self.service_metadata_document(&binding);
        trace!("Sign the response document");
        let signed = match self
            .signer
            .sign_response(response, SIG_RSA_SHA256, DIGEST_SHA256, None)
        {
            Ok(doc) => doc,
            Err(e) => {
                error!("Error occurred signing the response document: {}", e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        info!(
            "Completed ServiceMetadata query for Participant={} and Service={}",
            part_id, svc_id
        );
        QueryResponse::ok(signed)
    }

    /// Builds a `ServiceMetadata` document with the process metadata of the
    /// binding: per process group either the processes with their endpoints,
    /// or a Redirect.
    fn service_metadata_document(&self, binding: &ServiceMetadataBinding) -> XmlDocument {
        let template = &binding.template;
        let mut root = XmlElement::new("ServiceMetadata")
            .declare_ns(None, SERVICE_METADATA_NS)
            .declare_ns(Some("sma"), AGGREGATE_NS)
            .declare_ns(Some("smb"), BASIC_NS)
            .child(XmlElement::prefixed("smb", "SMPVersionID").text(SMP_VERSION_ID))
            .child(identifier_element("ID", &template.service.id))
            .child(identifier_element("ParticipantID", &binding.participant_id));
        for group in &template.process_groups {
            let mut pmd = XmlElement::prefixed("sma", "ProcessMetadata");
            match group {
                ProcessGroup::Offerings { processes, endpoints } => {
                    for process in processes {
                        pmd.push_child(process_element(process));
                    }
                    for endpoint in endpoints {
                        pmd.push_child(self.endpoint_element(endpoint));
                    }
                }
                ProcessGroup::Redirect(redirection) => {
                    pmd.push_child(self.redirect_element(redirection));
                }
            }
            root.push_child(pmd);
        }
        XmlDocument::new(root)
    }

    fn endpoint_element(&self, ep: &Endpoint) -> XmlElement {
        let mut e = XmlElement::prefixed("sma", "Endpoint")
            .child(XmlElement::prefixed("smb", "TransportProfileID").text(&ep.transport_profile));
        if let Some(description) = non_empty(&ep.description) {
            e.push_child(XmlElement::prefixed("smb", "Description").text(description));
        }
        if let Some(contact) = non_empty(&ep.contact_info) {
            e.push_child(XmlElement::prefixed("smb", "Contact").text(contact));
        }
        e.push_child(XmlElement::prefixed("smb", "AddressURI").text(&ep.url));
        if let Some(activation) = &ep.activation_date {
            e.push_child(XmlElement::prefixed("smb", "ActivationDate").text(&date_text(activation)));
        }
        if let Some(expiration) = &ep.expiration_date {
            e.push_child(XmlElement::prefixed("smb", "ExpirationDate").text(&date_text(expiration)));
        }
        for certificate in &ep.certificates {
            e.push_child(self.certificate_element(certificate));
        }
        e
    }

    fn certificate_element(&self, cert: &Certificate) -> XmlElement {
        let mut c = XmlElement::prefixed("sma", "Certificate");
        if let Some(usage) = non_empty(&cert.usage) {
            c.push_child(XmlElement::prefixed("smb", "TypeCode").text(usage));
        }
        if let Some(description) = non_empty(&cert.description) {
            c.push_child(XmlElement::prefixed("smb", "Description").text(description));
        }
        if let Some(activation) = &cert.activation_date {
            c.push_child(XmlElement::prefixed("smb", "ActivationDate").text(&date_text(activation)));
        }
        if let Some(expiration) = &cert.expiration_date {
            c.push_child(XmlElement::prefixed("smb", "ExpirationDate").text(&date_text(expiration)));
        }
        c.child(
            XmlElement::prefixed("smb", "ContentBinaryObject")
                .attr("mimeCode", &self.cert_mime_type)
                .text(&base64::encode(&cert.der)),
        )
    }

    fn redirect_element(&self, redirection: &Redirection) -> XmlElement {
        let mut r = XmlElement::prefixed("sma", "Redirect")
            .child(XmlElement::prefixed("smb", "PublisherURI").text(&redirection.new_smp_url));
        if let Some(certificate) = &redirection.certificate {
            r.push_child(self.certificate_element(certificate));
        }
        r
    }
}

impl QueryResponder for OasisV2QueryResponder {
    fn process_query(&self, path: &str, _headers: &HeaderMap) -> QueryResponse {
        let query = match path.strip_prefix(URL_PREFIX) {
            Some(q) => q,
            None => {
                error!("Invalid query path: {}", path);
                return QueryResponse::status(StatusCode::BAD_REQUEST);
            }
        };
        match query.find("/services/") {
            Some(sep) if sep > 0 && sep + 10 < query.len() => {
                self.service_metadata_query(&query[..sep], &query[sep + 10..])
            }
            _ => self.service_group_query(query),
        }
    }
}

/// Builds a `ServiceGroup` document with a service reference per binding,
/// listing the unique Process+Role tuples of each template.
fn service_group_document(
    part_id: &Identifier,
    bindings: &[ServiceMetadataBinding],
) -> XmlDocument {
    let mut root = XmlElement::new("ServiceGroup")
        .declare_ns(None, SERVICE_GROUP_NS)
        .declare_ns(Some("sma"), AGGREGATE_NS)
        .declare_ns(Some("smb"), BASIC_NS)
        .child(XmlElement::prefixed("smb", "SMPVersionID").text(SMP_VERSION_ID))
        .child(identifier_element("ParticipantID", part_id));
    for binding in bindings {
        root.push_child(service_reference(binding));
    }
    XmlDocument::new(root)
}

fn service_reference(binding: &ServiceMetadataBinding) -> XmlElement {
    let mut r = XmlElement::prefixed("sma", "ServiceReference")
        .child(identifier_element("ID", &binding.template.service.id));
    // Only unique Process elements, i.e. representing the same process and
    // collection of roles, are listed
    let mut unique: Vec<&ProcessInfo> = Vec::new();
    for group in &binding.template.process_groups {
        let processes = match group {
            ProcessGroup::Offerings { processes, .. } => processes,
            ProcessGroup::Redirect(_) => continue,
        };
        for process in processes {
            if !unique.iter().any(|p| p.matches(process)) {
                unique.push(process);
            }
        }
    }
    for process in unique {
        r.push_child(process_element(process));
    }
    r
}

fn process_element(process: &ProcessInfo) -> XmlElement {
    let id = match &process.process_id {
        ProcessId::NoProcess => XmlElement::prefixed("smb", "ID").text(NO_PROCESS_VALUE),
        ProcessId::Id(id) => identifier_element("ID", id),
    };
    let mut p = XmlElement::prefixed("sma", "Process").child(id);
    for role in &process.roles {
        p.push_child(identifier_element("RoleID", role));
    }
    p
}

/// Renders an identifier as a `smb:`-qualified element with the value as
/// content and the scheme id, when present, in the `schemeID` attribute.
fn identifier_element(local: &str, id: &Identifier) -> XmlElement {
    let el = XmlElement::prefixed("smb", local);
    match id.scheme() {
        Some(s) => el.attr("schemeID", &s.scheme_id).text(id.value()),
        None => el.text(id.value()),
    }
}

/// Renders a timestamp as xsd:date in UTC.
fn date_text(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%dZ").to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keystore::{FileKeyStore, KeyProvider, SigningKeyPair};
    use crate::models::identifier::IdScheme;
    use crate::models::metadata::{Participant, Service, ServiceMetadataTemplate};
    use crate::storage::memory::InMemoryStore;
    use once_cell::sync::Lazy;
    use rsa::RsaPrivateKey;

    static TEST_KEY: Lazy<RsaPrivateKey> =
        Lazy::new(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap());

    const PART_SCHEME: &str = "iso6523-actorid-upis";

    fn test_cert() -> Certificate {
        Certificate {
            der: vec![0x30, 0x03, 0x02, 0x01, 0x01],
            usage: Some("sig".to_string()),
            description: None,
            activation_date: None,
            expiration_date: None,
        }
    }

    fn process(pid: &str, roles: Vec<&str>) -> ProcessInfo {
        ProcessInfo {
            process_id: ProcessId::Id(Identifier::new(pid)),
            roles: roles.into_iter().map(Identifier::new).collect(),
        }
    }

    fn offerings(processes: Vec<ProcessInfo>) -> ProcessGroup {
        ProcessGroup::Offerings {
            processes,
            endpoints: vec![Endpoint {
                transport_profile: "bdxr-transport-ebms3-as4-v1p0".to_string(),
                url: "https://ap.example.com/as4".to_string(),
                description: None,
                contact_info: None,
                activation_date: None,
                expiration_date: None,
                certificates: vec![test_cert()],
            }],
        }
    }

    fn store_with_binding(groups: Vec<ProcessGroup>) -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        store.add_scheme(IdScheme::new(PART_SCHEME, false));
        let part_id = Identifier::with_scheme("0088:12345", IdScheme::new(PART_SCHEME, false));
        store
            .register_participant(Participant {
                id: part_id.clone(),
                name: "Acme".to_string(),
                country: "NL".to_string(),
                address_info: None,
                first_registration_date: None,
                additional_ids: Vec::new(),
                published_in_directory: false,
                registered_in_sml: false,
            })
            .unwrap();
        store
            .add_binding(ServiceMetadataBinding {
                participant_id: part_id,
                template: ServiceMetadataTemplate {
                    name: "v2 template".to_string(),
                    service: Service {
                        id: Identifier::new("urn:doc:invoice"),
                        name: "Invoice".to_string(),
                    },
                    process_groups: groups,
                },
            })
            .unwrap();
        Arc::new(store)
    }

    fn responder(store: Arc<InMemoryStore>) -> OasisV2QueryResponder {
        let keys = FileKeyStore::empty();
        keys.install_key_pair(SigningKeyPair {
            certificate_der: vec![0x30, 0x01],
            private_key: TEST_KEY.clone(),
        });
        let provider: Arc<dyn KeyProvider> = Arc::new(keys);
        OasisV2QueryResponder::new(store, Arc::new(ResponseSigner::new(provider)), "application/pkix-cert")
    }

    const SG_PATH: &str = "/bdxr-smp-2/iso6523-actorid-upis%3A%3A0088%3A12345";
    const SMD_PATH: &str = "/bdxr-smp-2/iso6523-actorid-upis%3A%3A0088%3A12345/services/urn%3Adoc%3Ainvoice";

    #[test]
    fn test_service_group_is_signed_and_versioned() {
        let r = responder(store_with_binding(vec![offerings(vec![process("p1", vec!["buyer"])])]));
        let response = r.process_query(SG_PATH, &HeaderMap::new());
        assert_eq!(response.status, StatusCode::OK);
        let doc = response.body.unwrap();
        assert_eq!(doc.root.local_name(), "ServiceGroup");
        assert_eq!(doc.root.find_child("SMPVersionID").unwrap().text_content(), "2.0");
        assert!(doc.root.find_child("Signature").is_some());
    }

    #[test]
    fn test_service_group_deduplicates_process_role_tuples() {
        let r = responder(store_with_binding(vec![
            offerings(vec![process("p1", vec!["buyer", "seller"])]),
            offerings(vec![process("P1", vec!["Seller", "Buyer"]), process("p2", vec!["buyer"])]),
        ]));
        let response = r.process_query(SG_PATH, &HeaderMap::new());
        let doc = response.body.unwrap();
        let reference = doc.root.find_child("ServiceReference").unwrap();
        let processes: Vec<_> = reference
            .child_elements()
            .filter(|e| e.local_name() == "Process")
            .collect();
        assert_eq!(processes.len(), 2);
    }

    #[test]
    fn test_service_group_differing_role_sets_stay_distinct() {
        let r = responder(store_with_binding(vec![
            offerings(vec![process("p1", vec!["buyer"])]),
            offerings(vec![process("p1", vec!["buyer", "seller"])]),
        ]));
        let response = r.process_query(SG_PATH, &HeaderMap::new());
        let doc = response.body.unwrap();
        let reference = doc.root.find_child("ServiceReference").unwrap();
        let processes: Vec<_> = reference
            .child_elements()
            .filter(|e| e.local_name() == "Process")
            .collect();
        assert_eq!(processes.len(), 2);
    }

    #[test]
    fn test_participant_without_bindings_is_not_found() {
        let store = InMemoryStore::new();
        store.add_scheme(IdScheme::new(PART_SCHEME, false));
        store
            .register_participant(Participant {
                id: Identifier::with_scheme("0088:12345", IdScheme::new(PART_SCHEME, false)),
                name: "Acme".to_string(),
                country: "NL".to_string(),
                address_info: None,
                first_registration_date: None,
                additional_ids: Vec::new(),
                published_in_directory: false,
                registered_in_sml: false,
            })
            .unwrap();
        let r = responder(Arc::new(store));
        let response = r.process_query(SG_PATH, &HeaderMap::new());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_service_metadata_mixes_redirect_and_offerings() {
        // Unlike Peppol, the V2 format expresses both shapes side by side
        let r = responder(store_with_binding(vec![
            ProcessGroup::Redirect(Redirection {
                new_smp_url: "https://other-smp.example.com".to_string(),
                certificate: Some(test_cert()),
            }),
            offerings(vec![process("p1", vec!["buyer"])]),
        ]));
        let response = r.process_query(SMD_PATH, &HeaderMap::new());
        assert_eq!(response.status, StatusCode::OK);
        let doc = response.body.unwrap();
        let groups: Vec<_> = doc
            .root
            .child_elements()
            .filter(|e| e.local_name() == "ProcessMetadata")
            .collect();
        assert_eq!(groups.len(), 2);
        let redirect = groups[0].find_child("Redirect").unwrap();
        assert_eq!(
            redirect.find_child("PublisherURI").unwrap().text_content(),
            "https://other-smp.example.com"
        );
        assert!(redirect.find_child("Certificate").is_some());
        let endpoint = groups[1].find_child("Endpoint").unwrap();
        let content = endpoint
            .find_child("Certificate")
            .and_then(|c| c.find_child("ContentBinaryObject"))
            .unwrap();
        assert_eq!(content.attribute("mimeCode"), Some("application/pkix-cert"));
    }

    #[test]
    fn test_no_process_sentinel_rendering() {
        let r = responder(store_with_binding(vec![ProcessGroup::Offerings {
            processes: vec![ProcessInfo {
                process_id: ProcessId::NoProcess,
                roles: Vec::new(),
            }],
            endpoints: Vec::new(),
        }]));
        let response = r.process_query(SMD_PATH, &HeaderMap::new());
        let doc = response.body.unwrap();
        let process = doc
            .root
            .find_child("ProcessMetadata")
            .and_then(|g| g.find_child("Process"))
            .unwrap();
        let id = process.find_child("ID").unwrap();
        assert_eq!(id.text_content(), "bdx:noprocess");
        assert!(id.attribute("schemeID").is_none());
    }

    #[test]
    fn test_path_outside_namespace_is_bad_request() {
        let r = responder(store_with_binding(vec![offerings(vec![process("p1", vec![])])]));
        let response = r.process_query("/other/participant", &HeaderMap::new());
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unknown_scheme_is_not_found() {
        let r = responder(store_with_binding(vec![offerings(vec![process("p1", vec![])])]));
        let response = r.process_query("/bdxr-smp-2/X%3A%3Aval", &HeaderMap::new());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}
