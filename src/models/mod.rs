// src/models/mod.rs
//! Data structures for identifiers and service metadata.

pub mod identifier;
pub mod metadata;
