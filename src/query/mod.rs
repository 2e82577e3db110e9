// src/query/mod.rs
//! The SMP query protocol engine: request dispatch and the responders for
//! the supported SMP specification dialects.

pub mod businesscard;
pub mod dispatcher;
pub mod oasisv2;
pub mod peppol;
pub mod responder;
