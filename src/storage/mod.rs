// src/storage/mod.rs
//! Metadata storage layer: lookup contracts and the in-memory registry.

pub mod memory;
pub mod store;
