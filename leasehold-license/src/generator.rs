//! Issuing side of the license format: produces signed documents.

use crate::document::{
    FLOATING_LICENSE_ELEMENT, LICENSE_ELEMENT, LICENSE_SERVER_KEY_ELEMENT, LicenseType,
    RESERVED_ATTRIBUTES, format_expiration,
};
use crate::error::{LicenseError, LicenseResult};
use crate::signature::{
    CANONICALIZATION_ALGORITHM, ED25519_ALGORITHM, ENVELOPED_TRANSFORM, PublicKey,
    SHA256_ALGORITHM, XMLDSIG_NS, document_digest,
};
use crate::xml::{canonicalize, child_element, escape_attr, escape_text, is_valid_name};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey};
use roxmltree::Document;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Signs license documents with an Ed25519 secret key.
pub struct LicenseGenerator {
    signing_key: SigningKey,
}

impl LicenseGenerator {
    /// Creates a generator from a raw 32-byte secret key.
    #[must_use]
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Returns the public key validators must be configured with.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.signing_key.verifying_key())
    }

    /// Generates a signed license.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidLicenseFormat`] if an attribute name is
    /// reserved or not a valid XML name.
    pub fn generate(
        &self,
        owner_name: &str,
        id: Uuid,
        expiration: DateTime<Utc>,
        license_type: LicenseType,
        attributes: &BTreeMap<String, String>,
    ) -> LicenseResult<String> {
        let mut xml = String::new();
        xml.push('<');
        xml.push_str(LICENSE_ELEMENT);
        push_attr(&mut xml, "id", &id.to_string());
        push_attr(&mut xml, "expiration", &format_expiration(&expiration));
        push_attr(&mut xml, "type", license_type.as_str());

        for (name, value) in attributes {
            if RESERVED_ATTRIBUTES.contains(&name.as_str()) {
                return Err(LicenseError::InvalidLicenseFormat(format!(
                    "attribute name is reserved: {name}"
                )));
            }
            if !is_valid_name(name) {
                return Err(LicenseError::InvalidLicenseFormat(format!(
                    "attribute name is not a valid XML name: {name}"
                )));
            }
            push_attr(&mut xml, name, value);
        }
        xml.push('>');

        push_text_element(&mut xml, "name", owner_name);

        xml.push_str("</");
        xml.push_str(LICENSE_ELEMENT);
        xml.push('>');

        self.sign(&xml)
    }

    /// Generates a signed floating-license marker pointing at a license server.
    pub fn generate_floating_license(
        &self,
        owner_name: &str,
        license_server_key: &PublicKey,
    ) -> LicenseResult<String> {
        let mut xml = String::new();
        xml.push('<');
        xml.push_str(FLOATING_LICENSE_ELEMENT);
        xml.push('>');
        push_text_element(&mut xml, "name", owner_name);
        push_text_element(&mut xml, LICENSE_SERVER_KEY_ELEMENT, &license_server_key.to_base64());
        xml.push_str("</");
        xml.push_str(FLOATING_LICENSE_ELEMENT);
        xml.push('>');

        self.sign(&xml)
    }

    /// Embeds an enveloped signature as the last child of the root element.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidLicenseFormat`] if `unsigned` is not
    /// well-formed XML or already carries a signature.
    pub fn sign(&self, unsigned: &str) -> LicenseResult<String> {
        let doc = Document::parse(unsigned)
            .map_err(|e| LicenseError::InvalidLicenseFormat(format!("not well-formed XML: {e}")))?;
        let root = doc.root_element();

        if doc
            .descendants()
            .any(|n| n.is_element() && n.tag_name().namespace() == Some(XMLDSIG_NS))
        {
            return Err(LicenseError::InvalidLicenseFormat(
                "document is already signed".to_string(),
            ));
        }

        let digest = BASE64.encode(document_digest(root, None));
        let signed_info = format!(
            "<SignedInfo>\
             <CanonicalizationMethod Algorithm=\"{CANONICALIZATION_ALGORITHM}\"></CanonicalizationMethod>\
             <SignatureMethod Algorithm=\"{ED25519_ALGORITHM}\"></SignatureMethod>\
             <Reference URI=\"\">\
             <Transforms><Transform Algorithm=\"{ENVELOPED_TRANSFORM}\"></Transform></Transforms>\
             <DigestMethod Algorithm=\"{SHA256_ALGORITHM}\"></DigestMethod>\
             <DigestValue>{digest}</DigestValue>\
             </Reference>\
             </SignedInfo>"
        );

        let signature_value = self.sign_signed_info(&signed_info)?;
        let signature_element = format!(
            "<Signature xmlns=\"{XMLDSIG_NS}\">{signed_info}<SignatureValue>{signature_value}</SignatureValue></Signature>"
        );

        let root_range = root.range();
        let root_text = &unsigned[root_range.clone()];
        let root_name = root.tag_name().name();
        let mut signed = String::with_capacity(unsigned.len() + signature_element.len() + 16);
        signed.push_str(&unsigned[..root_range.start]);

        if root_text.ends_with("/>") {
            signed.push_str(&root_text[..root_text.len() - 2]);
            signed.push('>');
            signed.push_str(&signature_element);
            signed.push_str("</");
            signed.push_str(root_name);
            signed.push('>');
        } else {
            let close = root_text.rfind("</").ok_or_else(|| {
                LicenseError::InvalidLicenseFormat("root element has no closing tag".to_string())
            })?;
            signed.push_str(&root_text[..close]);
            signed.push_str(&signature_element);
            signed.push_str(&root_text[close..]);
        }

        signed.push_str(&unsigned[root_range.end..]);
        Ok(signed)
    }

    /// Signs the canonical form of `SignedInfo` as it will appear inside the
    /// `Signature` element.
    fn sign_signed_info(&self, signed_info: &str) -> LicenseResult<String> {
        let wrapper = format!("<Signature xmlns=\"{XMLDSIG_NS}\">{signed_info}</Signature>");
        let doc = Document::parse(&wrapper)
            .map_err(|e| LicenseError::InvalidLicenseFormat(format!("signed info: {e}")))?;
        let node = child_element(doc.root_element(), "SignedInfo", Some(XMLDSIG_NS)).ok_or_else(
            || LicenseError::InvalidLicenseFormat("signed info element missing".to_string()),
        )?;

        let signature = self.signing_key.sign(canonicalize(node, None).as_bytes());
        Ok(BASE64.encode(signature.to_bytes()))
    }
}

fn push_attr(xml: &mut String, name: &str, value: &str) {
    xml.push(' ');
    xml.push_str(name);
    xml.push_str("=\"");
    escape_attr(value, xml);
    xml.push('"');
}

fn push_text_element(xml: &mut String, name: &str, text: &str) {
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    escape_text(text, xml);
    xml.push_str("</");
    xml.push_str(name);
    xml.push('>');
}
