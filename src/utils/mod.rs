// src/utils/mod.rs
//! Helper functions shared across the query engine.

pub mod idstring;
