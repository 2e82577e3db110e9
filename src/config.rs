// src/config.rs
//! Server configuration.
//!
//! Settings are layered: built-in defaults, then an optional `smp.toml`
//! file in the working directory, then `SMP_`-prefixed environment
//! variables (e.g. `SMP_BIND_ADDRESS`).

use config::{Config, Environment, File};
use serde::Deserialize;

/// Runtime settings of the SMP server.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Socket address the query server binds to
    pub bind_address: String,

    /// Public base URL of this SMP, used in reference links of the Peppol
    /// ServiceGroup response
    pub base_url: String,

    /// Query mapping file; when absent the default mapping (OASIS SMP V2
    /// only) is used
    pub query_map_file: Option<String>,

    /// PKCS#8 PEM file holding the response signing key
    pub signing_key_file: Option<String>,

    /// Certificate (PEM or DER) distributed with signed responses
    pub signing_cert_file: Option<String>,

    /// MIME type reported for certificate content in OASIS SMP V2 responses
    pub cert_mime_type: String,
}

impl Settings {
    /// Loads the settings from defaults, `smp.toml` and the environment.
    pub fn load() -> anyhow::Result<Settings> {
        let settings = Config::builder()
            .set_default("bind_address", "0.0.0.0:8585")?
            .set_default("base_url", "http://localhost:8585")?
            .set_default("cert_mime_type", "application/pkix-cert")?
            .add_source(File::with_name("smp").required(false))
            .add_source(Environment::with_prefix("SMP"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.bind_address, "0.0.0.0:8585");
        assert_eq!(settings.cert_mime_type, "application/pkix-cert");
        assert!(settings.query_map_file.is_none());
    }
}
