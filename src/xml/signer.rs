// src/xml/signer.rs
//! Enveloped XML signature generation for SMP response documents.
//!
//! All supported SMP specifications use the same enveloped signature layout:
//! a Reference to the whole document (URI=""), the signing certificate in
//! the KeyInfo element and exclusive canonicalization of the SignedInfo.
//! Only the signing, digest and reference-canonicalization algorithms differ
//! between the dialects, so the responders pass those in per call.
//!
//! Signing always uses the currently active key pair; when none is
//! configured the request fails, a response is never silently left unsigned.

use std::sync::Arc;

use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;

use crate::keys::keystore::KeyProvider;
use crate::xml::c14n::{self, UnsupportedC14n, DSIG_NS, ENVELOPED_SIGNATURE, EXC_C14N};
use crate::xml::document::{XmlDocument, XmlElement};

/// RSA-SHA256 signature algorithm URI (XML Signature 1.1).
pub const SIG_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
/// RSA-SHA384 signature algorithm URI.
pub const SIG_RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
/// RSA-SHA512 signature algorithm URI.
pub const SIG_RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";
/// SHA-256 digest algorithm URI.
pub const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
/// SHA-384 digest algorithm URI.
pub const DIGEST_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
/// SHA-512 digest algorithm URI.
pub const DIGEST_SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

/// Failure to produce (or verify) a response signature.
#[derive(Debug, Error)]
pub enum SigningError {
    /// No active signing key pair is configured
    #[error("SMP signing key pair not available")]
    NoActiveKeyPair,

    /// A signing, digest or canonicalization algorithm URI could not be
    /// resolved to an implementation
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature engine rejected the operation
    #[error("signature operation failed: {0}")]
    SignatureFailure(String),

    /// A document offered for verification has no usable signature
    #[error("document carries no valid enveloped signature: {0}")]
    MalformedSignature(String),

    /// Digest or signature value does not verify
    #[error("signature verification failed")]
    InvalidSignature,
}

impl From<UnsupportedC14n> for SigningError {
    fn from(e: UnsupportedC14n) -> Self {
        SigningError::UnsupportedAlgorithm(e.0)
    }
}

/// Signs SMP response documents with the server's active key pair.
pub struct ResponseSigner {
    keys: Arc<dyn KeyProvider>,
}

impl ResponseSigner {
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        ResponseSigner { keys }
    }

    /// Signs the response document with an enveloped XML signature.
    ///
    /// # Arguments
    /// * `doc` - the assembled response document
    /// * `signing_alg` - signature algorithm URI (XML Signature 1.1 name)
    /// * `digest_alg` - digest algorithm URI for the document reference
    /// * `c14n_alg` - reference canonicalization transform; `Some` adds it
    ///   after the enveloped-signature transform (Peppol dialect), `None`
    ///   uses just the enveloped transform (OASIS SMP V2)
    ///
    /// # Returns
    /// The document with the `ds:Signature` appended as last child of the
    /// root element, or a [`SigningError`]; on error no partially signed
    /// document is produced.
    pub fn sign_response(
        &self,
        mut doc: XmlDocument,
        signing_alg: &str,
        digest_alg: &str,
        c14n_alg: Option<&str>,
    ) -> Result<XmlDocument, SigningError> {
        let pair = self.keys.active_key_pair().ok_or(SigningError::NoActiveKeyPair)?;

        // Reference digest over the transformed document
        let reference_c14n = c14n_alg.unwrap_or(c14n::C14N_10);
        let digest_input = c14n::serialize(&doc.root, reference_c14n, true)?;
        let digest_value = base64::encode(digest(digest_alg, digest_input.as_bytes())?);

        let mut transforms =
            XmlElement::new("Transforms").child(transform(ENVELOPED_SIGNATURE));
        if let Some(alg) = c14n_alg {
            transforms.push_child(transform(alg));
        }

        let signed_info = XmlElement::new("SignedInfo")
            .declare_ns(None, DSIG_NS)
            .child(
                XmlElement::new("CanonicalizationMethod").attr("Algorithm", EXC_C14N),
            )
            .child(XmlElement::new("SignatureMethod").attr("Algorithm", signing_alg))
            .child(
                XmlElement::new("Reference")
                    .attr("URI", "")
                    .child(transforms)
                    .child(XmlElement::new("DigestMethod").attr("Algorithm", digest_alg))
                    .child(XmlElement::new("DigestValue").text(&digest_value)),
            );

        // The SignedInfo is canonicalized standalone with exclusive C14N,
        // exactly as a verifier will reproduce it from the final document
        let canonical_signed_info = c14n::serialize(&signed_info, EXC_C14N, false)?;
        let (scheme, hashed) = rsa_input(signing_alg, canonical_signed_info.as_bytes())?;
        let signature_value = pair
            .private_key
            .sign(scheme, &hashed)
            .map_err(|e| SigningError::SignatureFailure(e.to_string()))?;

        let signature = XmlElement::new("Signature")
            .declare_ns(None, DSIG_NS)
            .child(signed_info)
            .child(XmlElement::new("SignatureValue").text(&base64::encode(signature_value)))
            .child(
                XmlElement::new("KeyInfo").child(
                    XmlElement::new("X509Data").child(
                        XmlElement::new("X509Certificate")
                            .text(&base64::encode(&pair.certificate_der)),
                    ),
                ),
            );

        // Standard enveloped placement: last child of the document root
        doc.root.push_child(signature);
        Ok(doc)
    }
}

/// Verifies the enveloped signature of a response document against the
/// given RSA public key. Used by the test suite and usable by any client
/// as an independent check of the signing pipeline.
pub fn verify_response(doc: &XmlDocument, public_key: &RsaPublicKey) -> Result<(), SigningError> {
    let signature = doc
        .root
        .child_elements()
        .find(|e| e.local_name() == "Signature")
        .ok_or_else(|| SigningError::MalformedSignature("no Signature element".into()))?;
    let signed_info = signature
        .find_child("SignedInfo")
        .ok_or_else(|| SigningError::MalformedSignature("no SignedInfo element".into()))?;

    let signing_alg = algorithm_of(signed_info, "SignatureMethod")?;
    let reference = signed_info
        .find_child("Reference")
        .ok_or_else(|| SigningError::MalformedSignature("no Reference element".into()))?;
    let digest_alg = algorithm_of(reference, "DigestMethod")?;

    // Reproduce the reference transform chain: enveloped, plus an optional
    // canonicalization transform
    let reference_c14n = reference
        .find_child("Transforms")
        .map(|ts| {
            ts.child_elements()
                .filter_map(|t| t.attribute("Algorithm"))
                .find(|a| *a != ENVELOPED_SIGNATURE)
                .unwrap_or(c14n::C14N_10)
        })
        .unwrap_or(c14n::C14N_10);
    let digest_input = c14n::serialize(&doc.root, reference_c14n, true)?;
    let expected = reference
        .find_child("DigestValue")
        .map(|e| e.text_content())
        .ok_or_else(|| SigningError::MalformedSignature("no DigestValue element".into()))?;
    if base64::encode(digest(digest_alg, digest_input.as_bytes())?) != expected {
        return Err(SigningError::InvalidSignature);
    }

    let si_c14n = algorithm_of(signed_info, "CanonicalizationMethod")?;
    let canonical_signed_info = c14n::serialize(signed_info, si_c14n, false)?;
    let signature_value = signature
        .find_child("SignatureValue")
        .map(|e| e.text_content())
        .ok_or_else(|| SigningError::MalformedSignature("no SignatureValue element".into()))?;
    let signature_bytes = base64::decode(signature_value.trim())
        .map_err(|e| SigningError::MalformedSignature(e.to_string()))?;

    let (scheme, hashed) = rsa_input(signing_alg, canonical_signed_info.as_bytes())?;
    public_key
        .verify(scheme, &hashed, &signature_bytes)
        .map_err(|_| SigningError::InvalidSignature)
}

fn algorithm_of<'a>(parent: &'a XmlElement, child: &str) -> Result<&'a str, SigningError> {
    parent
        .find_child(child)
        .and_then(|e| e.attribute("Algorithm"))
        .ok_or_else(|| SigningError::MalformedSignature(format!("no {} algorithm", child)))
}

fn transform(algorithm: &str) -> XmlElement {
    XmlElement::new("Transform").attr("Algorithm", algorithm)
}

/// Computes the digest for a DigestMethod URI.
fn digest(algorithm: &str, data: &[u8]) -> Result<Vec<u8>, SigningError> {
    match algorithm {
        DIGEST_SHA256 => Ok(Sha256::digest(data).to_vec()),
        DIGEST_SHA384 => Ok(Sha384::digest(data).to_vec()),
        DIGEST_SHA512 => Ok(Sha512::digest(data).to_vec()),
        other => Err(SigningError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Resolves a SignatureMethod URI to the PKCS#1 v1.5 padding scheme and the
/// pre-hashed input it signs.
fn rsa_input(algorithm: &str, data: &[u8]) -> Result<(Pkcs1v15Sign, Vec<u8>), SigningError> {
    match algorithm {
        SIG_RSA_SHA256 => Ok((Pkcs1v15Sign::new::<Sha256>(), Sha256::digest(data).to_vec())),
        SIG_RSA_SHA384 => Ok((Pkcs1v15Sign::new::<Sha384>(), Sha384::digest(data).to_vec())),
        SIG_RSA_SHA512 => Ok((Pkcs1v15Sign::new::<Sha512>(), Sha512::digest(data).to_vec())),
        other => Err(SigningError::UnsupportedAlgorithm(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keystore::{FileKeyStore, SigningKeyPair};
    use once_cell::sync::Lazy;
    use rsa::RsaPrivateKey;

    // Key generation dominates the test runtime, share one key
    static TEST_KEY: Lazy<RsaPrivateKey> =
        Lazy::new(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap());

    fn signer_with_key() -> (ResponseSigner, RsaPublicKey) {
        let store = FileKeyStore::empty();
        store.install_key_pair(SigningKeyPair {
            certificate_der: vec![0x30, 0x03, 0x02, 0x01, 0x01],
            private_key: TEST_KEY.clone(),
        });
        let public = TEST_KEY.to_public_key();
        (ResponseSigner::new(Arc::new(store)), public)
    }

    fn sample_doc() -> XmlDocument {
        XmlDocument::new(
            XmlElement::new("ServiceMetadata")
                .declare_ns(None, "urn:test:smp")
                .child(XmlElement::new("ParticipantID").attr("schemeID", "s").text("p-1"))
                .child(XmlElement::new("Endpoint").text("https://ap.example.com")),
        )
    }

    #[test]
    fn test_round_trip_rsa_sha256_exclusive_c14n() {
        let (signer, public) = signer_with_key();
        let signed = signer
            .sign_response(sample_doc(), SIG_RSA_SHA256, DIGEST_SHA256, Some(EXC_C14N))
            .unwrap();
        verify_response(&signed, &public).unwrap();
    }

    #[test]
    fn test_round_trip_enveloped_only_transform() {
        let (signer, public) = signer_with_key();
        let signed = signer
            .sign_response(sample_doc(), SIG_RSA_SHA256, DIGEST_SHA256, None)
            .unwrap();
        verify_response(&signed, &public).unwrap();
    }

    #[test]
    fn test_round_trip_inclusive_c14n_transform() {
        let (signer, public) = signer_with_key();
        let signed = signer
            .sign_response(sample_doc(), SIG_RSA_SHA256, DIGEST_SHA256, Some(c14n::C14N_10))
            .unwrap();
        verify_response(&signed, &public).unwrap();
    }

    #[test]
    fn test_signature_is_last_child_of_root() {
        let (signer, _) = signer_with_key();
        let signed = signer
            .sign_response(sample_doc(), SIG_RSA_SHA256, DIGEST_SHA256, None)
            .unwrap();
        let last = signed.root.child_elements().last().unwrap();
        assert_eq!(last.local_name(), "Signature");
        // KeyInfo carries the certificate
        let cert = last
            .find_child("KeyInfo")
            .and_then(|k| k.find_child("X509Data"))
            .and_then(|x| x.find_child("X509Certificate"))
            .unwrap();
        assert!(!cert.text_content().is_empty());
    }

    #[test]
    fn test_tampered_document_fails_verification() {
        let (signer, public) = signer_with_key();
        let signed = signer
            .sign_response(sample_doc(), SIG_RSA_SHA256, DIGEST_SHA256, None)
            .unwrap();
        let mut tampered = signed.clone();
        tampered
            .root
            .push_child(XmlElement::new("Injected").text("evil"));
        // Injected element comes after the signature, still covered by URI=""
        assert!(matches!(
            verify_response(&tampered, &public),
            Err(SigningError::InvalidSignature)
        ));
    }

    #[test]
    fn test_missing_key_pair_is_an_error() {
        let signer = ResponseSigner::new(Arc::new(FileKeyStore::empty()));
        let result = signer.sign_response(sample_doc(), SIG_RSA_SHA256, DIGEST_SHA256, None);
        assert!(matches!(result, Err(SigningError::NoActiveKeyPair)));
    }

    #[test]
    fn test_unsupported_algorithm_uris_rejected() {
        let (signer, _) = signer_with_key();
        assert!(matches!(
            signer.sign_response(
                sample_doc(),
                "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
                DIGEST_SHA256,
                None
            ),
            Err(SigningError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            signer.sign_response(
                sample_doc(),
                SIG_RSA_SHA256,
                "http://www.w3.org/2000/09/xmldsig#sha1",
                None
            ),
            Err(SigningError::UnsupportedAlgorithm(_))
        ));
    }
}
