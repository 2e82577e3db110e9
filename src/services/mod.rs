// src/services/mod.rs
//! Service layer: the HTTP query server.

pub mod query_server;
