// src/keys/mod.rs
//! Signing key management.

pub mod keystore;
