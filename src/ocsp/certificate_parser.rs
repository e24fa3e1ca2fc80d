//! Authority Information Access parsing: extracts OCSP responder URLs from
//! a certificate the same way `crl::certificate_parser` pulls CRL
//! distribution points, just a different extension and access method.

use crate::ocsp::error::{IssuerHashSnafu, OcspError};
use x509_parser::extensions::{GeneralName, ParsedExtension};

/// Extract OCSP responder URLs from a DER-encoded certificate's Authority
/// Information Access extension (RFC 5280 §4.2.2.1).
pub fn extract_ocsp_responder_urls(cert_der: &[u8]) -> Result<Vec<String>, OcspError> {
    let (_, cert) = x509_parser::certificate::X509Certificate::from_der(cert_der)
        .map_err(|_| IssuerHashSnafu {}.build())?;

    let urls: Vec<String> = cert
        .extensions()
        .iter()
        .filter_map(|ext| match ext.parsed_extension() {
            ParsedExtension::AuthorityInfoAccess(aia) => Some(aia.accessdescs.iter()),
            _ => None,
        })
        .flatten()
        .filter(|desc| desc.access_method == x509_parser::oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_OCSP)
        .filter_map(|desc| match &desc.access_location {
            GeneralName::URI(uri) => Some(uri.to_string()),
            _ => None,
        })
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .collect();

    if urls.is_empty() {
        tracing::debug!(target: "sf_core::ocsp", "No OCSP responder URLs found in certificate");
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_cert_is_an_error() {
        let invalid = vec![0x00, 0x01, 0x02];
        assert!(extract_ocsp_responder_urls(&invalid).is_err());
    }
}
