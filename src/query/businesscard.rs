// src/query/businesscard.rs
//! Responder for Business Card queries by the Peppol Directory indexer.
//!
//! Serves `/businesscard/{participantID}`. The business card is only handed
//! out for participants that are marked as published in the directory; it
//! carries the registered business information and is not signed.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use chrono::NaiveDate;
use log::{debug, info, trace, warn};

use crate::models::identifier::Identifier;
use crate::models::metadata::Participant;
use crate::query::responder::{id_error_status, QueryResponder, QueryResponse};
use crate::storage::store::MetadataStore;
use crate::utils::idstring;
use crate::xml::document::{XmlDocument, XmlElement};

const URL_PREFIX: &str = "/businesscard/";

const BUSINESS_CARD_NS: &str = "http://www.peppol.eu/schema/pd/businesscard/20180621/";

/// Responds to Business Card queries of the Peppol Directory indexer.
pub struct BusinessCardResponder {
    store: Arc<dyn MetadataStore>,
}

impl BusinessCardResponder {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        BusinessCardResponder { store }
    }

    /// Builds the `BusinessCard` document for the participant.
    fn business_card_document(&self, participant: &Participant) -> XmlDocument {
        let mut entity = XmlElement::new("BusinessEntity")
            .child(XmlElement::new("Name").text(&participant.name))
            .child(XmlElement::new("CountryCode").text(&participant.country));
        if let Some(address) = &participant.address_info {
            entity.push_child(XmlElement::new("GeographicalInformation").text(address));
        }
        for additional in &participant.additional_ids {
            entity.push_child(identifier_element(additional));
        }
        if let Some(registered) = &participant.first_registration_date {
            entity.push_child(XmlElement::new("RegistrationDate").text(&date_text(registered)));
        }

        let root = XmlElement::new("BusinessCard")
            .declare_ns(None, BUSINESS_CARD_NS)
            .child(participant_identifier(&participant.id))
            .child(entity);
        XmlDocument::new(root)
    }
}

impl QueryResponder for BusinessCardResponder {
    fn process_query(&self, path: &str, _headers: &HeaderMap) -> QueryResponse {
        trace!("Process a BusinessCard query");
        let pid_string = match path.strip_prefix(URL_PREFIX) {
            Some(p) if !p.is_empty() => p,
            _ => {
                warn!("Missing ParticipantID");
                return QueryResponse::status(StatusCode::BAD_REQUEST);
            }
        };
        let part_id = match idstring::parse_id_string(self.store.as_ref(), pid_string) {
            Ok(id) => id,
            Err(e) => {
                warn!("Cannot resolve queried Participant ID ({}): {}", pid_string, e);
                return QueryResponse::status(id_error_status(&e));
            }
        };
        trace!("Business Card requested of Participant={}", part_id);
        let participant = match self.store.find_participant(&part_id) {
            Ok(p) => p,
            Err(e) => {
                warn!("Error retrieving Participant ({}): {}", part_id, e);
                return QueryResponse::status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        let participant = match participant {
            Some(p) if p.published_in_directory => p,
            _ => {
                debug!(
                    "Got Business Card request for non-existing or not published Participant ID ({})",
                    part_id
                );
                return QueryResponse::status(StatusCode::NOT_FOUND);
            }
        };
        trace!("Create BusinessCard for Participant ({})", part_id);
        let document = self.business_card_document(&participant);
        info!("Return BusinessCard of Participant ({}) to directory indexer", part_id);
        QueryResponse::ok(document)
    }
}

fn participant_identifier(id: &Identifier) -> XmlElement {
    let el = XmlElement::new("ParticipantIdentifier");
    match id.scheme() {
        Some(s) => el.attr("scheme", &s.scheme_id).text(id.value()),
        None => el.text(id.value()),
    }
}

fn identifier_element(id: &Identifier) -> XmlElement {
    let el = XmlElement::new("Identifier");
    match id.scheme() {
        Some(s) => el.attr("scheme", &s.scheme_id).text(id.value()),
        None => el.text(id.value()),
    }
}

fn date_text(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}
