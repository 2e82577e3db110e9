// src/xml/mod.rs
//! XML document assembly, canonicalization and signing.

pub mod c14n;
pub mod document;
pub mod signer;
