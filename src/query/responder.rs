// src/query/responder.rs
//! Query responder contract.
//!
//! A responder implements one SMP specification dialect. It receives the
//! request path (and headers, for dialects that need them) and produces a
//! complete response: status, optional extra headers and an optional XML
//! body. The status is decided before any body byte is produced; a failure
//! during document assembly or signing therefore never leaks a partial
//! document to the wire.

use axum::http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::utils::idstring::IdStringError;
use crate::xml::document::XmlDocument;

/// The outcome of processing an SMP query.
pub struct QueryResponse {
    pub status: StatusCode,
    pub headers: Option<HeaderMap>,
    pub body: Option<XmlDocument>,
}

impl QueryResponse {
    /// A successful response carrying the given document.
    pub fn ok(body: XmlDocument) -> Self {
        QueryResponse {
            status: StatusCode::OK,
            headers: None,
            body: Some(body),
        }
    }

    /// A bodyless response with the given status.
    pub fn status(status: StatusCode) -> Self {
        QueryResponse {
            status,
            headers: None,
            body: None,
        }
    }
}

/// Handles the SMP queries of one specification dialect. Stateless per
/// request; shared collaborators are owned behind `Arc`.
pub trait QueryResponder: Send + Sync {
    /// Processes the query represented by the request path.
    ///
    /// # Arguments
    /// * `path` - request URL path, including the dialect's own prefix
    /// * `headers` - inbound request headers
    fn process_query(&self, path: &str, headers: &HeaderMap) -> QueryResponse;
}

/// Internal metadata violates a precondition of the wire format being
/// produced. Surfaced to clients as HTTP 500, logged with the identity of
/// the offending template.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// A template combines a Redirection with other process groups, which
    /// the Peppol document format cannot express
    #[error("incompatible service metadata template [{0}]: redirection combined with other process groups")]
    IncompatibleTemplate(String),

    /// An endpoint is missing the certificate the wire format requires
    #[error("missing required certificate for endpoint {0}")]
    MissingCertificate(String),
}

/// Maps an identifier-parsing failure to the response status: a reference
/// to an unregistered scheme means the identifier cannot exist in this SMP
/// (404), a string that cannot be decoded is a client error (400).
pub(crate) fn id_error_status(err: &IdStringError) -> StatusCode {
    match err {
        IdStringError::Malformed(_) => StatusCode::BAD_REQUEST,
        IdStringError::UnknownScheme(_) => StatusCode::NOT_FOUND,
        IdStringError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
