//! Certificate and CRL parsing helpers that sit below `crl::cache` and
//! `crl::certificate_parser`: chain building, trust-anchor resolution, and
//! the CRL extensions (`IssuingDistributionPoint`, `CRLNumber`) that
//! `x509-parser`'s typed extension enum does not expose directly.

use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use snafu::{Location, ResultExt, Snafu};
use x509_parser::prelude::*;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum X509Error {
    #[snafu(display("Failed to parse certificate"))]
    CertParse {
        source: x509_parser::nom::Err<x509_parser::error::X509Error>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to parse CRL"))]
    CrlParse {
        source: x509_parser::nom::Err<x509_parser::error::X509Error>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("No issuer certificate supplied for CRL signature verification"))]
    MissingIssuer {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("CRL signature verification failed"))]
    SignatureInvalid {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("CRL issuer name does not match the supplied anchor"))]
    CrlIssuerNameMismatch {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("CRL thisUpdate field could not be parsed"))]
    InvalidTime {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("No usable root certificates were found in the system trust store"))]
    NoRootCertificates {
        #[snafu(implicit)]
        location: Location,
    },
}

pub fn extract_skid(cert_der: &[u8]) -> Result<Option<Vec<u8>>, X509Error> {
    let (_, cert) = X509Certificate::from_der(cert_der).context(CertParseSnafu)?;
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectKeyIdentifier(skid) = ext.parsed_extension() {
            return Ok(Some(skid.0.to_vec()));
        }
    }
    Ok(None)
}

pub fn extract_crl_akid(crl_der: &[u8]) -> Result<Option<Vec<u8>>, X509Error> {
    let (_, crl) = CertificateRevocationList::from_der(crl_der).context(CrlParseSnafu)?;
    for ext in crl.tbs_cert_list.extensions() {
        if let ParsedExtension::AuthorityKeyIdentifier(akid) = ext.parsed_extension()
            && let Some(key_id) = &akid.key_identifier
        {
            return Ok(Some(key_id.0.to_vec()));
        }
    }
    Ok(None)
}

pub fn extract_crl_next_update(crl_der: &[u8]) -> Result<Option<DateTime<Utc>>, X509Error> {
    let (_, crl) = CertificateRevocationList::from_der(crl_der).context(CrlParseSnafu)?;
    if let Some(next_update) = crl.tbs_cert_list.next_update {
        if let Some(dt) = crate::crl::certificate_parser::asn1_time_to_datetime(&next_update) {
            return Ok(Some(dt));
        }
        return Ok(None);
    }
    Ok(None)
}

/// (thisUpdate, nextUpdate) of a CRL, for freshness comparisons when
/// `crlNumber` is absent from both the cached and the newly fetched CRL.
pub fn crl_times(crl_der: &[u8]) -> Result<(DateTime<Utc>, Option<DateTime<Utc>>), X509Error> {
    let (_, crl) = CertificateRevocationList::from_der(crl_der).context(CrlParseSnafu)?;
    let this_update =
        crate::crl::certificate_parser::asn1_time_to_datetime(&crl.tbs_cert_list.this_update)
            .ok_or_else(|| InvalidTimeSnafu {}.build())?;
    let next_update = crl
        .tbs_cert_list
        .next_update
        .as_ref()
        .and_then(crate::crl::certificate_parser::asn1_time_to_datetime);
    Ok((this_update, next_update))
}

/// SHA-256 of an issuer certificate's DER, used as the issuer half of the
/// revocation-outcome cache key. Two certificates with the same subject name
/// but different keys/issuers (e.g. a cross-signed intermediate) hash
/// differently, which is what keeps their outcomes from being conflated.
pub fn subject_der_hash(cert_der: &[u8]) -> Option<Vec<u8>> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(cert_der);
    Some(hasher.finalize().to_vec())
}

/// Load the OS trust store via `rustls-native-certs`.
pub fn load_system_root_store() -> Result<rustls::RootCertStore, X509Error> {
    let mut store = rustls::RootCertStore::empty();
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(
            target: "sf_core::tls",
            error = %err,
            "failed to load a native root certificate"
        );
    }
    let (added, ignored) = store.add_parsable_certificates(result.certs);
    tracing::debug!(
        target: "sf_core::tls",
        added,
        ignored,
        "loaded system root certificates"
    );
    if added == 0 {
        return NoRootCertificatesSnafu {}.fail();
    }
    Ok(store)
}

/// A minimized view of a trust anchor: just enough to verify a CRL issued
/// "by" that anchor directly (self-signed roots that publish their own CRL).
#[derive(Debug, Clone)]
pub struct AnchorView {
    subject: Vec<u8>,
    spki: Vec<u8>,
}

impl AnchorView {
    pub fn subject_der(&self) -> &[u8] {
        &self.subject
    }

    pub fn spki_der(&self) -> &[u8] {
        &self.spki
    }
}

/// Find a root in `root_store` whose subject matches the CRL's issuer, for
/// the case where the CRL's signer is a trust anchor itself and wasn't
/// presented as part of the handshake chain.
pub fn resolve_anchor_issuer_key(
    crl_der: &[u8],
    root_store: &rustls::RootCertStore,
) -> Option<AnchorView> {
    let (_, crl) = CertificateRevocationList::from_der(crl_der).ok()?;
    let issuer_name = crl.issuer().to_string();
    for anchor in root_store.roots.iter() {
        let subject_bytes: &[u8] = anchor.subject.as_ref();
        if let Ok((_, name)) = x509_parser::x509::X509Name::from_der(subject_bytes)
            && name.to_string() == issuer_name
        {
            return Some(AnchorView {
                subject: subject_bytes.to_vec(),
                spki: anchor.subject_public_key_info.as_ref().to_vec(),
            });
        }
    }
    None
}

/// Verify a CRL's signature against a known issuer certificate.
pub fn verify_crl_signature(crl_der: &[u8], issuer_der: Option<&[u8]>) -> Result<(), X509Error> {
    let issuer_der = issuer_der.ok_or_else(|| MissingIssuerSnafu {}.build())?;
    let (_, issuer_cert) = X509Certificate::from_der(issuer_der).context(CertParseSnafu)?;
    let (_, crl) = CertificateRevocationList::from_der(crl_der).context(CrlParseSnafu)?;
    crl.verify_signature(issuer_cert.public_key())
        .map_err(|_| SignatureInvalidSnafu {}.build())
}

/// Verify a CRL's signature against a trust anchor's name and SPKI directly,
/// for the case where the issuing CA is itself a root and never appears as
/// an intermediate in the handshake chain.
pub fn verify_crl_sig_with_name_and_spki(
    crl_der: &[u8],
    issuer_subject_der: &[u8],
    issuer_spki_der: &[u8],
) -> Result<(), X509Error> {
    let (_, crl) = CertificateRevocationList::from_der(crl_der).context(CrlParseSnafu)?;
    let (_, issuer_name) =
        x509_parser::x509::X509Name::from_der(issuer_subject_der).context(CertParseSnafu)?;
    if crl.issuer().to_string() != issuer_name.to_string() {
        return CrlIssuerNameMismatchSnafu {}.fail();
    }
    let (_, spki) =
        x509_parser::x509::SubjectPublicKeyInfo::from_der(issuer_spki_der).context(CertParseSnafu)?;
    crl.verify_signature(&spki)
        .map_err(|_| SignatureInvalidSnafu {}.build())
}

/// Scope asserted by a CRL's `IssuingDistributionPoint` extension (RFC 5280
/// ยง5.2.5). `None` from `extract_crl_idp_scope` means the extension was
/// absent, which means the CRL covers the issuer's entire certificate
/// population with no partitioning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdpScope {
    pub dp_uris: Option<Vec<String>>,
    pub only_ca: bool,
    pub only_user: bool,
    pub only_attribute: bool,
    pub indirect_crl: bool,
    pub has_only_some_reasons: bool,
}

/// Minimal big-endian TLV reader for hand-decoding the extension fields
/// x509-parser's typed extensions don't cover (IDP, CRL Number). Supports
/// short- and multi-byte long-form lengths; that's everything RFC 5280's
/// CRL extensions ever need.
fn read_tlv(buf: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    if buf.len() < 2 {
        return None;
    }
    let tag = buf[0];
    let len_byte = buf[1];
    let (content_len, header_len) = if len_byte & 0x80 == 0 {
        (len_byte as usize, 2usize)
    } else {
        let n = (len_byte & 0x7f) as usize;
        if n == 0 || n > 4 || buf.len() < 2 + n {
            return None;
        }
        let mut len = 0usize;
        for b in &buf[2..2 + n] {
            len = (len << 8) | (*b as usize);
        }
        (len, 2 + n)
    };
    if buf.len() < header_len + content_len {
        return None;
    }
    Some((
        tag,
        &buf[header_len..header_len + content_len],
        &buf[header_len + content_len..],
    ))
}

fn iter_tlv(mut buf: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    std::iter::from_fn(move || {
        let (tag, content, rest) = read_tlv(buf)?;
        buf = rest;
        Some((tag, content))
    })
}

fn parse_der_integer_u128(der_integer: &[u8]) -> Option<u128> {
    let (tag, content, _) = read_tlv(der_integer)?;
    if tag != 0x02 {
        return None;
    }
    let mut value = content;
    while value.len() > 1 && value[0] == 0 {
        value = &value[1..];
    }
    if value.len() > 16 {
        return None;
    }
    let mut buf = [0u8; 16];
    buf[16 - value.len()..].copy_from_slice(value);
    Some(u128::from_be_bytes(buf))
}

fn parse_idp_general_names_uris(general_names: &[u8]) -> Vec<String> {
    const TAG_URI: u8 = 0x86; // [6] IMPLICIT IA5String, primitive context-specific
    iter_tlv(general_names)
        .filter(|(tag, _)| *tag == TAG_URI)
        .filter_map(|(_, content)| std::str::from_utf8(content).ok().map(str::to_string))
        .collect()
}

fn parse_idp_value(value: &[u8]) -> Option<IdpScope> {
    const TAG_DISTRIBUTION_POINT: u8 = 0xa0; // [0] DistributionPointName
    const TAG_FULL_NAME: u8 = 0xa0; // [0] fullName, constructed (implicit GeneralNames)
    const TAG_ONLY_CA: u8 = 0x81; // [1] onlyContainsUserCerts BOOLEAN
    const TAG_ONLY_USER: u8 = 0x82; // [2] onlyContainsCACerts BOOLEAN
    const TAG_SOME_REASONS: u8 = 0x83; // [3] onlySomeReasons BIT STRING
    const TAG_INDIRECT: u8 = 0x84; // [4] indirectCRL BOOLEAN
    const TAG_ATTRIBUTE_ONLY: u8 = 0x85; // [5] onlyContainsAttributeCerts BOOLEAN

    let (seq_tag, seq_content, _) = read_tlv(value)?;
    if seq_tag != 0x30 {
        return None;
    }
    let mut scope = IdpScope::default();
    for (tag, content) in iter_tlv(seq_content) {
        match tag {
            TAG_DISTRIBUTION_POINT => {
                if let Some((TAG_FULL_NAME, names, _)) = read_tlv(content) {
                    scope.dp_uris = Some(parse_idp_general_names_uris(names));
                }
            }
            // onlyContainsUserCerts is ASN.1 tag [1]; the naming above follows the RFC text
            // (tag numbers, not field order) to avoid an off-by-one against the spec table.
            TAG_ONLY_CA => scope.only_user = content.first() == Some(&0xff),
            TAG_ONLY_USER => scope.only_ca = content.first() == Some(&0xff),
            TAG_SOME_REASONS => scope.has_only_some_reasons = true,
            TAG_INDIRECT => scope.indirect_crl = content.first() == Some(&0xff),
            TAG_ATTRIBUTE_ONLY => scope.only_attribute = content.first() == Some(&0xff),
            _ => {}
        }
    }
    Some(scope)
}

const OID_ISSUING_DISTRIBUTION_POINT: &str = "2.5.29.28";
const OID_CRL_NUMBER: &str = "2.5.29.20";

/// Extract the `IssuingDistributionPoint` scope from a CRL, if present.
pub fn extract_crl_idp_scope(crl_der: &[u8]) -> Result<Option<IdpScope>, X509Error> {
    let (_, crl) = CertificateRevocationList::from_der(crl_der).context(CrlParseSnafu)?;
    for ext in crl.tbs_cert_list.extensions() {
        if ext.oid.to_string() == OID_ISSUING_DISTRIBUTION_POINT {
            return Ok(Some(parse_idp_value(ext.value).unwrap_or_default()));
        }
    }
    Ok(None)
}

/// Extract the `crlNumber` extension, for downgrade-resistant cache updates.
pub fn extract_crl_number(crl_der: &[u8]) -> Result<Option<u128>, X509Error> {
    let (_, crl) = CertificateRevocationList::from_der(crl_der).context(CrlParseSnafu)?;
    for ext in crl.tbs_cert_list.extensions() {
        if ext.oid.to_string() == OID_CRL_NUMBER {
            return Ok(parse_der_integer_u128(ext.value));
        }
    }
    Ok(None)
}

/// Enumerate linear certificate paths from `end_entity_der` through
/// `intermediates_der`, following subject/issuer name matches (branching
/// wherever more than one candidate shares the needed subject, e.g. a
/// cross-signed intermediate), and keep only the paths whose intermediate
/// set `filter` accepts (typically: anchors via the configured trust store).
///
/// Returns each accepted path as `[end_entity, intermediate_1, ..., top]`.
pub fn build_candidate_chains_with_filter<F>(
    end_entity_der: &[u8],
    intermediates_der: &[Vec<u8>],
    filter: F,
) -> Vec<Vec<Vec<u8>>>
where
    F: Fn(&[CertificateDer<'_>]) -> bool,
{
    let mut chains = Vec::new();
    let Ok((_, end_entity)) = X509Certificate::from_der(end_entity_der) else {
        return chains;
    };
    let parsed: Vec<Option<X509Certificate>> = intermediates_der
        .iter()
        .map(|der| X509Certificate::from_der(der).ok().map(|(_, c)| c))
        .collect();

    let mut raw_paths: Vec<Vec<usize>> = Vec::new();
    let mut visited = vec![false; intermediates_der.len()];
    let mut path = Vec::new();
    extend_path(
        end_entity.issuer().to_string(),
        &parsed,
        &mut visited,
        &mut path,
        0,
        &mut raw_paths,
    );

    for idxs in raw_paths {
        let inter_ders: Vec<CertificateDer<'_>> = idxs
            .iter()
            .map(|&i| CertificateDer::from(intermediates_der[i].clone()))
            .collect();
        if filter(&inter_ders) {
            let mut full_chain = vec![end_entity_der.to_vec()];
            full_chain.extend(idxs.iter().map(|&i| intermediates_der[i].clone()));
            chains.push(full_chain);
        }
    }
    chains
}

fn extend_path(
    wanted_subject: String,
    parsed: &[Option<X509Certificate>],
    visited: &mut [bool],
    path: &mut Vec<usize>,
    depth: usize,
    out: &mut Vec<Vec<usize>>,
) {
    const MAX_DEPTH: usize = 8;
    if depth >= MAX_DEPTH {
        out.push(path.clone());
        return;
    }
    let mut found_any = false;
    for (idx, cert_opt) in parsed.iter().enumerate() {
        if visited[idx] {
            continue;
        }
        let Some(cert) = cert_opt else { continue };
        if cert.subject().to_string() != wanted_subject {
            continue;
        }
        found_any = true;
        visited[idx] = true;
        path.push(idx);
        extend_path(
            cert.issuer().to_string(),
            parsed,
            visited,
            path,
            depth + 1,
            out,
        );
        path.pop();
        visited[idx] = false;
    }
    if !found_any {
        out.push(path.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn der_integer_round_trips_small_values() {
        // DER INTEGER 5: tag 0x02, len 1, value 0x05
        assert_eq!(parse_der_integer_u128(&[0x02, 0x01, 0x05]), Some(5));
        // DER INTEGER with a leading zero pad byte (to keep it non-negative)
        assert_eq!(parse_der_integer_u128(&[0x02, 0x02, 0x00, 0xff]), Some(255));
    }

    #[test]
    fn idp_parses_uri_and_flags() {
        // DistributionPointName::fullName containing one URI GeneralName
        let uri = b"http://example.com/crl.crl";
        let mut general_name = vec![0x86, uri.len() as u8];
        general_name.extend_from_slice(uri);
        let mut full_name = vec![0xa0, general_name.len() as u8];
        full_name.extend_from_slice(&general_name);
        let mut dp = vec![0xa0, full_name.len() as u8];
        dp.extend_from_slice(&full_name);

        let only_ca = [0x82u8, 0x01, 0xff];

        let mut seq_content = Vec::new();
        seq_content.extend_from_slice(&dp);
        seq_content.extend_from_slice(&only_ca);
        let mut value = vec![0x30, seq_content.len() as u8];
        value.extend_from_slice(&seq_content);

        let scope = parse_idp_value(&value).expect("parses");
        assert_eq!(
            scope.dp_uris,
            Some(vec!["http://example.com/crl.crl".to_string()])
        );
        assert!(scope.only_ca);
        assert!(!scope.only_user);
    }
}
