// src/query/peppol.rs
//! Query responder for the Peppol SMP specification (OASIS BDXR SMP v1
//! profile as deployed in the Peppol network).
//!
//! Handles ServiceGroup queries (`/{participantID}`) and ServiceMetadata
//! queries (`/{participantID}/services/{serviceID}`). ServiceMetadata
//! responses are signed; ServiceGroup responses are not. The Peppol document
//! format can express either a Redirect or service information, so a
//! template that combines a Redirection with other process groups is
//! rejected during assembly.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info, trace};

use crate::models::identifier::{Identifier, ProcessId};
use crate::models::metadata::{Endpoint, ProcessGroup, Redirection, ServiceMetadataBinding};
use crate::query::responder::{id_error_status, AssemblyError, QueryResponder, QueryResponse};
use crate::storage::store::MetadataStore;
use crate::utils::idstring;
use crate::xml::c14n::C14N_10;
use crate::xml::document::{XmlDocument, XmlElement};
use crate::xml::signer::{ResponseSigner, DIGEST_SHA256, SIG_RSA_SHA256};

const PUBLISHING_NS: &str = "http://busdox.org/serviceMetadata/publishing/1.0/";
const IDENTIFIERS_NS: &str = "http://busdox.org/transport/identifiers/1.0/";
const ADDRESSING_NS: &str = "http://www.w3.org/2005/08/addressing";

/// Rendering of the "no process" sentinel in Peppol documents.
const NO_PROCESS_SCHEME: &str = "busdox-procid-transport";
const NO_PROCESS_VALUE: &str = "busdox:noprocess";

/// Processes SMP queries as specified by the Peppol SMP specification.
pub struct PeppolQueryResponder {
    store: Arc<dyn MetadataStore>,
    signer: Arc<ResponseSigner>,
    /// Public base URL of this SMP, used in ServiceMetadataReference links
    base_url: String,
}

impl PeppolQueryResponder {
    pub fn new(store: Arc<dyn MetadataStore>, signer: Arc<ResponseSigner>, base_url: &str) -> Self {
        PeppolQueryResponder {
            store,
            signer,
            base_url: base_url.trim_end_matches('/').to_string(),
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
        trace!("Retrieve bindings for Participant={}", part_id);
        let bindings = match self.store.find_bindings_for(&part_id) {
            Ok(b) => b,
            Err(e) => {
                error!("Error retrieving bindings of Participant ({}): {}", part_id, e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        let response = self.service_group_document(&part_id, &bindings);
        info!("Completed ServiceGroup query for Participant={}", part_id);
        QueryResponse::ok(response)
    }

    fn service_metadata_query(&self, pid_string: &str, sid_string: &str) -> QueryResponse {
        trace!("Process a ServiceMetadata query");
        let part_id = match idstring::parse_id_string(self.store.as_ref(), pid_string) {
            Ok(id) => id,
            Err(e) => {
                debug!("Cannot resolve queried Participant ID ({}): {}", pid_string, e);
                return QueryResponse::status(id_error_status(&e));
            }
        };
        let svc_id = match idstring::parse_id_string(self.store.as_ref(), sid_string) {
            Ok(id) => id,
            Err(e) => {
                debug!("Cannot resolve queried Service ID ({}): {}", sid_string, e);
                return QueryResponse::status(id_error_status(&e));
            }
        };
        trace!("Retrieve binding for Participant={} and Service={}", part_id, svc_id);
        let binding = match self.store.find_binding(&part_id, &svc_id) {
            Ok(Some(b)) => b,
            Ok(None) => {
                debug!("No binding found for Participant={} and Service={}", part_id, svc_id);
                return QueryResponse::status(StatusCode::NOT_FOUND);
            }
            Err(e) => {
                error!("Error retrieving binding for Participant ({}): {}", part_id, e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        trace!("Create ServiceMetadata response document");
        let response = match self.service_metadata_document(&binding) {
            Ok(doc) => doc,
            Err(e) => {
                error!("Error occurred creating the ServiceMetadata response: {}", e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        trace!("Sign the response document");
        let signed = match self
            .signer
            .sign_response(response, SIG_RSA_SHA256, DIGEST_SHA256, Some(C14N_10))
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

    /// Builds a `ServiceGroup` document listing a reference to each service
    /// the participant publishes metadata for.
    fn service_group_document(
        &self,
        part_id: &Identifier,
        bindings: &[ServiceMetadataBinding],
    ) -> XmlDocument {
        let mut root = XmlElement::new("ServiceGroup")
            .declare_ns(None, PUBLISHING_NS)
            .declare_ns(Some("id"), IDENTIFIERS_NS)
            .child(identifier_element("ParticipantIdentifier", part_id));
        let mut refs = XmlElement::new("ServiceMetadataReferenceCollection");
        for binding in bindings {
            refs.push_child(XmlElement::new("ServiceMetadataReference").attr(
                "href",
                &format!(
                    "{}/{}/services/{}",
                    self.base_url,
                    part_id.url_encoded(),
                    binding.template.service.id.url_encoded()
                ),
            ));
        }
        root.push_child(refs);
        XmlDocument::new(root)
    }

    /// Builds a `SignedServiceMetadata` document, containing either a
    /// Redirect or the full service information of the binding.
    fn service_metadata_document(
        &self,
        binding: &ServiceMetadataBinding,
    ) -> Result<XmlDocument, AssemblyError> {
        let template = &binding.template;
        let redirection = template.process_groups.iter().find_map(|g| match g {
            ProcessGroup::Redirect(r) => Some(r),
            ProcessGroup::Offerings { .. } => None,
        });

        let smd = match redirection {
            Some(_) if template.process_groups.len() > 1 => {
                return Err(AssemblyError::IncompatibleTemplate(template.name.clone()));
            }
            Some(r) => XmlElement::new("ServiceMetadata").child(redirect_element(binding, r)),
            None => XmlElement::new("ServiceMetadata").child(self.service_information(binding)?),
        };

        let root = XmlElement::new("SignedServiceMetadata")
            .declare_ns(None, PUBLISHING_NS)
            .declare_ns(Some("id"), IDENTIFIERS_NS)
            .declare_ns(Some("wsa"), ADDRESSING_NS)
            .child(smd);
        Ok(XmlDocument::new(root))
    }

    fn service_information(
        &self,
        binding: &ServiceMetadataBinding,
    ) -> Result<XmlElement, AssemblyError> {
        let template = &binding.template;
        let mut process_list = XmlElement::new("ProcessList");
        for group in &template.process_groups {
            let (processes, endpoints) = match group {
                ProcessGroup::Offerings { processes, endpoints } => (processes, endpoints),
                // Redirections are rejected by the caller before this point
                ProcessGroup::Redirect(_) => continue,
            };
            let mut endpoint_list = XmlElement::new("ServiceEndpointList");
            for ep in endpoints {
                endpoint_list.push_child(endpoint_element(ep)?);
            }
            for process in processes {
                process_list.push_child(
                    XmlElement::new("Process")
                        .child(process_id_element(&process.process_id))
                        .child(endpoint_list.clone()),
                );
            }
        }
        Ok(XmlElement::new("ServiceInformation")
            .child(identifier_element("ParticipantIdentifier", &binding.participant_id))
            .child(identifier_element("DocumentIdentifier", &template.service.id))
            .child(process_list))
    }
}

impl QueryResponder for PeppolQueryResponder {
    fn process_query(&self, path: &str, _headers: &HeaderMap) -> QueryResponse {
        let query = path.strip_prefix('/').unwrap_or(path);
        match query.find("/services/") {
            Some(sep) if sep > 0 && sep + 10 < query.len() => {
                self.service_metadata_query(&query[..sep], &query[sep + 10..])
            }
            _ => self.service_group_query(query),
        }
    }
}

fn redirect_element(binding: &ServiceMetadataBinding, redirection: &Redirection) -> XmlElement {
    let base = redirection.new_smp_url.trim_end_matches('/');
    // The certificate Subject UID field is not used in Peppol network
    // certificates, but the element is required by the schema
    XmlElement::new("Redirect")
        .attr(
            "href",
            &format!(
                "{}/{}/services/{}",
                base,
                binding.participant_id.url_encoded(),
                binding.template.service.id.url_encoded()
            ),
        )
        .child(XmlElement::new("CertificateUID"))
}

/// Renders an identifier as a `id:`-qualified element with the value as
/// content and the scheme id, when present, in the `scheme` attribute.
fn identifier_element(local: &str, id: &Identifier) -> XmlElement {
    let el = XmlElement::prefixed("id", local);
    match id.scheme() {
        Some(s) => el.attr("scheme", &s.scheme_id).text(id.value()),
        None => el.text(id.value()),
    }
}

fn process_id_element(process_id: &ProcessId) -> XmlElement {
    match process_id {
        ProcessId::NoProcess => XmlElement::prefixed("id", "ProcessIdentifier")
            .attr("scheme", NO_PROCESS_SCHEME)
            .text(NO_PROCESS_VALUE),
        ProcessId::Id(id) => identifier_element("ProcessIdentifier", id),
    }
}

fn endpoint_element(ep: &Endpoint) -> Result<XmlElement, AssemblyError> {
    let mut e = XmlElement::new("Endpoint")
        .attr("transportProfile", &ep.transport_profile)
        .child(
            XmlElement::prefixed("wsa", "EndpointReference")
                .child(XmlElement::prefixed("wsa", "Address").text(&ep.url)),
        )
        .child(XmlElement::new("RequireBusinessLevelSignature").text("false"));
    if let Some(activation) = &ep.activation_date {
        e.push_child(XmlElement::new("ServiceActivationDate").text(&datetime_text(activation)));
    }
    if let Some(expiration) = &ep.expiration_date {
        e.push_child(XmlElement::new("ServiceExpirationDate").text(&datetime_text(expiration)));
    }
    let certificate = ep.certificates.first().ok_or_else(|| {
        error!("Missing required certificate for endpoint : {}", ep.url);
        AssemblyError::MissingCertificate(ep.url.clone())
    })?;
    if ep.certificates.len() > 1 {
        log::warn!(
            "Additional certificates are configured for endpoint ({}), but cannot be included in Peppol response",
            ep.url
        );
    }
    e.push_child(XmlElement::new("Certificate").text(&base64::encode(&certificate.der)));
    e.push_child(
        XmlElement::new("ServiceDescription").text(ep.description.as_deref().unwrap_or_default()),
    );
    e.push_child(
        XmlElement::new("TechnicalContactUrl").text(ep.contact_info.as_deref().unwrap_or_default()),
    );
    Ok(e)
}

/// Renders a timestamp as xsd:dateTime in UTC.
fn datetime_text(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}
