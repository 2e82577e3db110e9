// src/main.rs

//! # Service Metadata Publisher - Main Entry Point
//!
//! Starts the SMP query server: it answers identifier-based metadata lookup
//! queries for the supported SMP specification dialects and signs the
//! responses with the server's active key pair.
//!
//! ## Architecture Overview
//! 1. **Query Layer**: dispatcher mapping request URLs to dialect responders
//! 2. **Responders**: Peppol SMP, OASIS SMP V2 and Business Card documents
//! 3. **Signing Layer**: enveloped XML signatures over the responses
//! 4. **Storage Layer**: metadata registry with scheme-aware identifier
//!    matching
//!
//! ## Configuration
//! Settings come from `smp.toml` and `SMP_`-prefixed environment variables;
//! see [`config::Settings`]. A `.env` file is loaded first.

use crate::config::Settings;
use crate::keys::keystore::{FileKeyStore, KeyProvider};
use crate::query::businesscard::BusinessCardResponder;
use crate::query::dispatcher::QueryMapper;
use crate::query::oasisv2::OasisV2QueryResponder;
use crate::query::peppol::PeppolQueryResponder;
use crate::services::query_server::QueryServer;
use crate::storage::memory::InMemoryStore;
use crate::storage::store::MetadataStore;
use crate::xml::signer::ResponseSigner;
use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod config; // Settings loading
mod keys; // Signing key management
mod models; // Identifier and metadata structures
mod query; // Query dispatch and dialect responders
mod services; // HTTP query server
mod storage; // Metadata registry
mod utils; // Helper functions
mod xml; // Document assembly, canonicalization and signing

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment configuration and settings
/// 2. Load the signing key pair
/// 3. Build the responder registry and query mapper
/// 4. Start the query server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let settings = Settings::load().context("cannot load configuration")?;

    // The metadata registry is populated by the administrative layers; the
    // query engine starts against an empty registry
    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryStore::new());

    let keystore = match (&settings.signing_key_file, &settings.signing_cert_file) {
        (Some(key), Some(cert)) => FileKeyStore::load(Path::new(key), Path::new(cert))
            .context("cannot load signing key pair")?,
        _ => {
            warn!("No signing key pair configured, signed queries will fail");
            FileKeyStore::empty()
        }
    };
    let keys: Arc<dyn KeyProvider> = Arc::new(keystore);
    let signer = Arc::new(ResponseSigner::new(keys));

    // Responder registry: configuration name to implementation
    let mut mapper = QueryMapper::new(settings.query_map_file.as_ref().map(PathBuf::from));
    mapper.register(
        "oasis-smp-v2",
        Arc::new(OasisV2QueryResponder::new(
            store.clone(),
            signer.clone(),
            &settings.cert_mime_type,
        )),
    );
    mapper.register(
        "peppol",
        Arc::new(PeppolQueryResponder::new(
            store.clone(),
            signer,
            &settings.base_url,
        )),
    );
    mapper.register(
        "peppol-businesscard",
        Arc::new(BusinessCardResponder::new(store)),
    );

    let addr: SocketAddr = settings
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.bind_address))?;
    info!("Starting SMP query server at http://{}", addr);
    QueryServer::new(Arc::new(mapper)).run(addr).await
}
