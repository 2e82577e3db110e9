// src/services/query_server.rs
//! HTTP front of the SMP query engine.
//!
//! All GET requests are routed through a single wildcard handler: the query
//! mapper resolves the path to the responder of the SMP dialect deployed on
//! that URL namespace, and the responder's result is written out with the
//! document serialized as `application/xml`. A path no mapping covers is
//! answered with 501 Not Implemented. Every query outcome is logged as
//! `«status» - «path»`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::{info, warn};

use crate::query::dispatcher::QueryMapper;

/// The SMP query server.
pub struct QueryServer {
    mapper: Arc<QueryMapper>,
}

impl QueryServer {
    pub fn new(mapper: Arc<QueryMapper>) -> Self {
        QueryServer { mapper }
    }

    /// Builds the router: one wildcard GET route handing every path to the
    /// query mapper.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(get(handle_query))
            .with_state(self.mapper.clone())
    }

    /// Starts the server and listens for queries until shutdown.
    ///
    /// # Arguments
    /// * `addr` - socket address to bind to
    pub async fn run(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let app = self.router();
        info!("SMP query server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn handle_query(
    State(mapper): State<Arc<QueryMapper>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path();
    let responder = match mapper.responder_for(path) {
        Some(r) => r,
        None => {
            warn!("501 - {}", path);
            return StatusCode::NOT_IMPLEMENTED.into_response();
        }
    };
    let result = responder.process_query(path, &headers);
    info!("{} - {}", result.status.as_u16(), path);

    let mut builder = Response::builder().status(result.status);
    if let Some(extra) = &result.headers {
        for (name, value) in extra {
            builder = builder.header(name, value);
        }
    }
    let response = match result.body {
        Some(doc) => builder
            .header(header::CONTENT_TYPE, "application/xml")
            .body(Body::from(doc.to_xml_string())),
        None => builder.body(Body::empty()),
    };
    response.unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
