//! Enveloped XML signature verification.
//!
//! A signed license carries one `Signature` element in the XML-signature
//! namespace:
//!
//! ```xml
//! <Signature xmlns="http://www.w3.org/2000/09/xmldsig#">
//!   <SignedInfo>
//!     <CanonicalizationMethod Algorithm="..."/>
//!     <SignatureMethod Algorithm="...#ed25519"/>
//!     <Reference URI="">
//!       <Transforms><Transform Algorithm="...#enveloped-signature"/></Transforms>
//!       <DigestMethod Algorithm="...#sha256"/>
//!       <DigestValue>base64(sha256(canonical document without Signature))</DigestValue>
//!     </Reference>
//!   </SignedInfo>
//!   <SignatureValue>base64(ed25519(canonical SignedInfo))</SignatureValue>
//! </Signature>
//! ```
//!
//! Verification never errors: anything malformed is simply "not valid".

use crate::error::{LicenseError, LicenseResult};
use crate::xml::{canonicalize, child_element, text_content};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use roxmltree::{Document, Node};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::warn;

/// XML-signature namespace.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Canonicalization method identifier written into `SignedInfo`.
pub const CANONICALIZATION_ALGORITHM: &str = "http://www.w3.org/2006/12/xml-c14n11";

/// Signature method identifier for Ed25519.
pub const ED25519_ALGORITHM: &str = "http://www.w3.org/2021/04/xmldsig-more#eddsa-ed25519";

/// Enveloped-signature transform identifier.
pub const ENVELOPED_TRANSFORM: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Digest method identifier for SHA-256.
pub const SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// A trusted Ed25519 public key. Textual form is base64 of the 32 key bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Creates a public key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> LicenseResult<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| LicenseError::InvalidPublicKey("not a valid Ed25519 point".to_string()))
    }

    /// Parses the base64 textual form.
    pub fn from_base64(encoded: &str) -> LicenseResult<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| LicenseError::InvalidPublicKey(format!("invalid base64: {e}")))?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            LicenseError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Returns the raw 32-byte key.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Returns the base64 textual form.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0.to_bytes())
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_base64()).finish()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Verifies the enveloped signature of `content` against `key`.
///
/// Returns false for content that is not well-formed XML, carries no (or
/// more than one) signature element, or whose signature does not verify.
#[must_use]
pub fn verify(content: &str, key: &PublicKey) -> bool {
    match Document::parse(content) {
        Ok(doc) => verify_document(&doc, key),
        Err(e) => {
            warn!(error = %e, "license content is not well-formed XML");
            false
        }
    }
}

/// Verifies the enveloped signature of an already parsed document.
#[must_use]
pub fn verify_document(doc: &Document<'_>, key: &PublicKey) -> bool {
    let signatures: Vec<Node<'_, '_>> = doc
        .descendants()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == "Signature"
                && n.tag_name().namespace() == Some(XMLDSIG_NS)
        })
        .collect();

    let signature_node = match signatures.as_slice() {
        [only] => *only,
        [] => {
            warn!("license carries no signature element");
            return false;
        }
        many => {
            warn!(count = many.len(), "license carries more than one signature element");
            return false;
        }
    };

    match check_signature(doc, signature_node, key) {
        Ok(()) => true,
        Err(reason) => {
            warn!(reason, "license signature rejected");
            false
        }
    }
}

fn check_signature(
    doc: &Document<'_>,
    signature_node: Node<'_, '_>,
    key: &PublicKey,
) -> Result<(), &'static str> {
    let ns = Some(XMLDSIG_NS);
    let signed_info =
        child_element(signature_node, "SignedInfo", ns).ok_or("missing SignedInfo")?;

    let method = child_element(signed_info, "SignatureMethod", ns)
        .and_then(|n| n.attribute("Algorithm"))
        .ok_or("missing SignatureMethod")?;
    if method != ED25519_ALGORITHM {
        return Err("unsupported signature method");
    }

    let reference = child_element(signed_info, "Reference", ns).ok_or("missing Reference")?;
    if reference.attribute("URI") != Some("") {
        return Err("reference must cover the whole document");
    }

    let digest_method = child_element(reference, "DigestMethod", ns)
        .and_then(|n| n.attribute("Algorithm"))
        .ok_or("missing DigestMethod")?;
    if digest_method != SHA256_ALGORITHM {
        return Err("unsupported digest method");
    }

    let expected_digest = child_element(reference, "DigestValue", ns)
        .and_then(text_content)
        .and_then(|t| decode_base64(&t))
        .ok_or("missing or malformed DigestValue")?;

    let actual_digest = document_digest(doc.root_element(), Some(signature_node));
    if expected_digest.as_slice() != actual_digest.as_slice() {
        return Err("document digest mismatch");
    }

    let signature_bytes = child_element(signature_node, "SignatureValue", ns)
        .and_then(text_content)
        .and_then(|t| decode_base64(&t))
        .ok_or("missing or malformed SignatureValue")?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| "invalid signature length")?;

    let signed_info_canonical = canonicalize(signed_info, None);
    key.verifying_key()
        .verify(signed_info_canonical.as_bytes(), &signature)
        .map_err(|_| "signature does not match")
}

/// SHA-256 over the canonical form of `root`, excluding `signature_node`.
pub(crate) fn document_digest(
    root: Node<'_, '_>,
    signature_node: Option<Node<'_, '_>>,
) -> [u8; 32] {
    let canonical = canonicalize(root, signature_node.map(|n| n.id()));
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Decodes base64 that may be wrapped across lines.
fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact).ok()
}

/// Returns true if `content` parses as well-formed XML.
#[must_use]
pub fn is_well_formed(content: &str) -> bool {
    if content.trim().is_empty() {
        return false;
    }
    Document::parse(content).is_ok()
}
