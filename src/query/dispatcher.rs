// src/query/dispatcher.rs
//! Maps request URLs to the query responder handling them.
//!
//! The mapping is a list of `(regular expression, responder)` pairs, matched
//! against the request path in declared order; the first full match wins.
//! It is read from a line-oriented configuration file where each line is
//! `«regexp»;;«responder name»`; when no file is available a default mapping
//! supporting only OASIS SMP V2 queries is used. The table is built once on
//! first use and read lock-free afterwards.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::query::responder::QueryResponder;

/// The mapping used when no configuration file is present.
const DEFAULT_MAPPING: &str = "/bdxr-smp-2/.*;;oasis-smp-v2\n";

/// Resolves request paths to query responders.
pub struct QueryMapper {
    /// Responder registry: configuration name to implementation
    responders: HashMap<String, Arc<dyn QueryResponder>>,
    config_file: Option<PathBuf>,
    table: OnceCell<Vec<(Regex, Arc<dyn QueryResponder>)>>,
}

impl QueryMapper {
    /// Creates a mapper reading its mapping from the given file, or using
    /// the default mapping when `None` (or when the file is unreadable).
    pub fn new(config_file: Option<PathBuf>) -> Self {
        QueryMapper {
            responders: HashMap::new(),
            config_file,
            table: OnceCell::new(),
        }
    }

    /// Registers a responder under the name the mapping file refers to it by.
    pub fn register(&mut self, name: &str, responder: Arc<dyn QueryResponder>) {
        self.responders.insert(name.to_string(), responder);
    }

    /// Gets the responder that should handle the request, or `None` when no
    /// mapping matches the path (the caller answers 501 Not Implemented).
    pub fn responder_for(&self, path: &str) -> Option<Arc<dyn QueryResponder>> {
        self.table
            .get_or_init(|| self.build_table())
            .iter()
            .find(|(pattern, _)| pattern.is_match(path))
            .map(|(_, responder)| responder.clone())
    }

    fn build_table(&self) -> Vec<(Regex, Arc<dyn QueryResponder>)> {
        let config = match &self.config_file {
            Some(path) => match fs::read_to_string(path) {
                Ok(content) => {
                    debug!("Reading query mapping from {}", path.display());
                    content
                }
                Err(_) => {
                    warn!(
                        "Mapping file ({}) not available, using default mapping",
                        path.display()
                    );
                    DEFAULT_MAPPING.to_string()
                }
            },
            None => DEFAULT_MAPPING.to_string(),
        };

        let mut table = Vec::new();
        for line in config.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (pattern, name) = match line.split_once(";;") {
                Some(mapping) => mapping,
                None => {
                    error!("Query mapping configuration contains invalid mapping : {}", line);
                    continue;
                }
            };
            // Anchor the pattern so lookup is a full match of the path
            let compiled = match Regex::new(&format!(r"\A(?:{})\z", pattern)) {
                Ok(re) => re,
                Err(_) => {
                    error!("URL regexp of mapping for {} responder {} is invalid", pattern, name);
                    continue;
                }
            };
            let responder = match self.responders.get(name) {
                Some(r) => r.clone(),
                None => {
                    error!("Specified responder {} of mapping for URL {} is invalid", name, pattern);
                    continue;
                }
            };
            info!("Registering mapping {} -> {}", pattern, name);
            table.push((compiled, responder));
        }
        debug!("Registered {} query mappings", table.len());
        table
    }
}
