//! OCSP request construction and responder transport: `CertId` built per
//! RFC 6960 Appendix B.1 (SHA-1 issuer name/key hash, the mandatory default
//! hash algorithm), POST first with a base64url GET fallback, bounded
//! retries via the shared HTTP retry helper. Response handling verifies
//! `BasicOcspResponse.signature` over the re-encoded `tbsResponseData`
//! against the issuer's key or a delegated responder's, the same way
//! `tls::x509_utils::verify_crl_signature` checks a CRL's signature.

use crate::config::retry::RetryPolicy;
use crate::http::retry::{HttpContext, HttpError, execute_with_retry};
use crate::ocsp::cache::{OcspCacheKey, OcspStatus};
use crate::ocsp::error::{
    IssuerHashSnafu, OcspError, RequestEncodeSnafu, ResponderExhaustedSnafu, ResponderRequestSnafu,
    ResponseNotSuccessfulSnafu, ResponseParseSnafu, SignatureVerifySnafu, UnauthorizedSnafu,
};
use chrono::{DateTime, Utc};
use der::asn1::{ObjectIdentifier, OctetString};
use der::{Decode, Encode};
use reqwest::{Method, StatusCode};
use sha1::{Digest, Sha1};
use snafu::ResultExt;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
    Request, ResponderId, TbsRequest, Version,
};
use x509_parser::extensions::ParsedExtension;

/// SHA-1, RFC 6960 Appendix B.1's mandatory default hash algorithm for CertID.
const SHA1_OID: &str = "1.3.14.3.2.26";

pub struct OcspStatusResponse {
    pub status: OcspStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

/// Build the cache key / `CertId` inputs: SHA-1 over the issuer's subject
/// name DER and over the raw bits of the issuer's public key, per RFC 6960.
pub fn build_cache_key(cert_der: &[u8], issuer_der: &[u8]) -> Result<OcspCacheKey, OcspError> {
    let (_, issuer) =
        x509_parser::certificate::X509Certificate::from_der(issuer_der).map_err(|_| {
            IssuerHashSnafu {}.build()
        })?;
    let issuer_name_hash = {
        let mut hasher = Sha1::new();
        hasher.update(issuer.subject().as_raw());
        hasher.finalize().to_vec()
    };
    let issuer_key_hash = {
        let mut hasher = Sha1::new();
        hasher.update(issuer.public_key().subject_public_key.data.as_ref());
        hasher.finalize().to_vec()
    };
    let serial = crate::crl::certificate_parser::get_certificate_serial_number(cert_der)
        .map_err(|_| IssuerHashSnafu {}.build())?;
    Ok(OcspCacheKey {
        issuer_name_hash,
        issuer_key_hash,
        serial,
    })
}

pub fn build_ocsp_request_der(key: &OcspCacheKey) -> Result<Vec<u8>, OcspError> {
    let cert_id = CertId {
        hash_algorithm: AlgorithmIdentifierOwned {
            oid: ObjectIdentifier::new_unwrap(SHA1_OID),
            parameters: None,
        },
        issuer_name_hash: OctetString::new(key.issuer_name_hash.clone())
            .context(RequestEncodeSnafu)?,
        issuer_key_hash: OctetString::new(key.issuer_key_hash.clone())
            .context(RequestEncodeSnafu)?,
        serial_number: SerialNumber::new(&key.serial).context(RequestEncodeSnafu)?,
    };
    let tbs_request = TbsRequest {
        version: Version::V1,
        requestor_name: None,
        request_list: vec![Request {
            req_cert: cert_id,
            single_request_extensions: None,
        }],
        request_extensions: None,
    };
    let request = OcspRequest {
        tbs_request,
        optional_signature: None,
    };
    request.to_der().context(RequestEncodeSnafu)
}

enum ResponderOutcome {
    Success(Vec<u8>),
    MalformedOrNonSuccess,
    Unauthorized,
}

async fn post_once(
    client: &reqwest::Client,
    url: &str,
    der_request: &[u8],
    policy: &RetryPolicy,
) -> Result<ResponderOutcome, HttpError> {
    let ctx = HttpContext::new(Method::POST, url.to_string()).allow_post_retry();
    let body = der_request.to_vec();
    execute_with_retry(
        || {
            client
                .post(url)
                .header("Content-Type", "application/ocsp-request")
                .header("Accept", "application/ocsp-response")
                .body(body.clone())
        },
        &ctx,
        policy,
        |resp| async move {
            if resp.status() == StatusCode::UNAUTHORIZED {
                return Ok(ResponderOutcome::Unauthorized);
            }
            if !resp.status().is_success() {
                return Ok(ResponderOutcome::MalformedOrNonSuccess);
            }
            match resp.bytes().await {
                Ok(bytes) if !bytes.is_empty() => Ok(ResponderOutcome::Success(bytes.to_vec())),
                _ => Ok(ResponderOutcome::MalformedOrNonSuccess),
            }
        },
    )
    .await
}

async fn get_once(
    client: &reqwest::Client,
    base_url: &str,
    der_request: &[u8],
    policy: &RetryPolicy,
) -> Result<ResponderOutcome, HttpError> {
    use base64::Engine;
    let encoded =
        urlencoding::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(der_request))
            .into_owned();
    let url = format!("{}/{}", base_url.trim_end_matches('/'), encoded);
    let ctx = HttpContext::new(Method::GET, url.clone());
    execute_with_retry(
        || client.get(&url).header("Accept", "application/ocsp-response"),
        &ctx,
        policy,
        |resp| async move {
            if resp.status() == StatusCode::UNAUTHORIZED {
                return Ok(ResponderOutcome::Unauthorized);
            }
            if !resp.status().is_success() {
                return Ok(ResponderOutcome::MalformedOrNonSuccess);
            }
            match resp.bytes().await {
                Ok(bytes) if !bytes.is_empty() => Ok(ResponderOutcome::Success(bytes.to_vec())),
                _ => Ok(ResponderOutcome::MalformedOrNonSuccess),
            }
        },
    )
    .await
}

/// POST first; fall back to GET on a malformed body or non-success status,
/// except a 401, which is final for this responder URL.
pub async fn fetch_from_responder(
    client: &reqwest::Client,
    url: &str,
    der_request: &[u8],
    max_attempts: u32,
) -> Result<Vec<u8>, OcspError> {
    let policy = RetryPolicy {
        max_attempts,
        ..RetryPolicy::default()
    };
    let post_result = post_once(client, url, der_request, &policy)
        .await
        .map_err(|e| responder_request_err(url, &e))?;
    match post_result {
        ResponderOutcome::Success(bytes) => return Ok(bytes),
        ResponderOutcome::Unauthorized => {
            return UnauthorizedSnafu {
                url: url.to_string(),
            }
            .fail();
        }
        ResponderOutcome::MalformedOrNonSuccess => {}
    }

    let get_result = get_once(client, url, der_request, &policy)
        .await
        .map_err(|e| responder_request_err(url, &e))?;
    match get_result {
        ResponderOutcome::Success(bytes) => Ok(bytes),
        ResponderOutcome::Unauthorized => UnauthorizedSnafu {
            url: url.to_string(),
        }
        .fail(),
        ResponderOutcome::MalformedOrNonSuccess => ResponderExhaustedSnafu {
            url: url.to_string(),
        }
        .fail(),
    }
}

fn responder_request_err(url: &str, source: &HttpError) -> OcspError {
    ResponderRequestSnafu {
        url: url.to_string(),
        message: source.to_string(),
    }
    .build()
}

/// A certificate authorized to sign OCSP responses on behalf of its issuer
/// carries the id-kp-OCSPSigning EKU (RFC 6960 §4.2.2.2).
fn cert_has_ocsp_signing_eku(cert: &x509_parser::certificate::X509Certificate) -> bool {
    cert.extensions().iter().any(|ext| {
        matches!(
            ext.parsed_extension(),
            ParsedExtension::ExtendedKeyUsage(eku) if eku.ocsp_signing
        )
    })
}

/// Whether `id` names `cert` as the response's signer, by name or by the
/// SHA-1 hash of its public key (RFC 6960 §4.2.1).
fn responder_id_matches(id: &ResponderId, cert: &x509_parser::certificate::X509Certificate) -> bool {
    match id {
        ResponderId::ByName(name) => name.to_der().is_ok_and(|name_der| {
            x509_parser::x509::X509Name::from_der(&name_der)
                .is_ok_and(|(_, parsed)| parsed.to_string() == cert.subject().to_string())
        }),
        ResponderId::ByKey(key_hash) => {
            let mut hasher = Sha1::new();
            hasher.update(cert.public_key().subject_public_key.data.as_ref());
            hasher.finalize().as_slice() == key_hash.as_bytes()
        }
    }
}

/// Verify `basic`'s signature over its `tbsResponseData` against the
/// issuer's key directly, or against a delegated responder certificate's
/// key when `certs` carries one — provided that certificate chains to the
/// issuer and holds the OCSP-signing EKU. Also checks that `responder_id`
/// actually names the key used, so a syntactically valid signature from an
/// unrelated key can't be substituted.
fn verify_basic_response(basic: &BasicOcspResponse, issuer_der: &[u8]) -> Result<(), OcspError> {
    let (_, issuer_cert) = x509_parser::certificate::X509Certificate::from_der(issuer_der)
        .map_err(|_| SignatureVerifySnafu {}.build())?;

    let responder_der: Option<Vec<u8>> = basic
        .certs
        .as_ref()
        .and_then(|certs| certs.first())
        .map(|c| c.to_der())
        .transpose()
        .map_err(|_| SignatureVerifySnafu {}.build())?;

    let (signer_cert, binding_ok) = if let Some(der) = responder_der.as_deref() {
        let (_, responder_cert) = x509_parser::certificate::X509Certificate::from_der(der)
            .map_err(|_| SignatureVerifySnafu {}.build())?;
        if !cert_has_ocsp_signing_eku(&responder_cert) {
            return SignatureVerifySnafu {}.fail();
        }
        responder_cert
            .verify_signature(Some(issuer_cert.public_key()))
            .map_err(|_| SignatureVerifySnafu {}.build())?;
        let ok = responder_id_matches(&basic.tbs_response_data.responder_id, &responder_cert);
        (responder_cert, ok)
    } else {
        let ok = responder_id_matches(&basic.tbs_response_data.responder_id, &issuer_cert);
        (issuer_cert, ok)
    };

    if !binding_ok {
        return SignatureVerifySnafu {}.fail();
    }

    let tbs_der = basic
        .tbs_response_data
        .to_der()
        .map_err(|_| SignatureVerifySnafu {}.build())?;
    let alg_der = basic
        .signature_algorithm
        .to_der()
        .map_err(|_| SignatureVerifySnafu {}.build())?;
    let (_, alg_id) = x509_parser::x509::AlgorithmIdentifier::from_der(&alg_der)
        .map_err(|_| SignatureVerifySnafu {}.build())?;

    x509_parser::verify::verify_signature(
        signer_cert.public_key(),
        &alg_id,
        basic.signature.raw_bytes(),
        &tbs_der,
    )
    .map_err(|_| SignatureVerifySnafu {}.build())
}

/// Parse a DER-encoded OCSP response for the certificate identified by
/// `key`, verifying the response's signature against `issuer_der` (or a
/// delegated responder it vouches for) and extracting validity bounds.
pub fn parse_ocsp_response(
    response_der: &[u8],
    key: &OcspCacheKey,
    issuer_der: &[u8],
) -> Result<OcspStatusResponse, OcspError> {
    let response = OcspResponse::from_der(response_der).context(ResponseParseSnafu)?;
    if response.response_status != OcspResponseStatus::Successful {
        return ResponseNotSuccessfulSnafu {}.fail();
    }
    let response_bytes = response
        .response_bytes
        .as_ref()
        .ok_or_else(|| ResponseNotSuccessfulSnafu {}.build())?;
    let basic = BasicOcspResponse::from_der(response_bytes.response.as_bytes())
        .context(ResponseParseSnafu)?;

    verify_basic_response(&basic, issuer_der)?;

    let single = basic
        .tbs_response_data
        .responses
        .iter()
        .find(|r| r.cert_id.serial_number.as_bytes() == key.serial.as_slice())
        .ok_or_else(|| crate::ocsp::error::NoMatchingResponseSnafu {}.build())?;

    let status = match &single.cert_status {
        CertStatus::Good(_) => OcspStatus::Good,
        CertStatus::Unknown(_) => OcspStatus::Unknown,
        CertStatus::Revoked(info) => OcspStatus::Revoked {
            reason: info.revocation_reason.clone().map(|r| format!("{r:?}")),
            revocation_time: Some(single_response_time_to_string(&info.revocation_time)),
        },
    };

    let this_update = generalized_time_to_chrono(&single.this_update)
        .ok_or_else(|| crate::ocsp::error::InvalidValiditySnafu {}.build())?;
    let next_update = single
        .next_update
        .as_ref()
        .and_then(generalized_time_to_chrono);

    Ok(OcspStatusResponse {
        status,
        this_update,
        next_update,
    })
}

fn generalized_time_to_chrono(t: &der::asn1::GeneralizedTime) -> Option<DateTime<Utc>> {
    let unix = t.to_date_time().unix_duration();
    DateTime::<Utc>::from_timestamp(unix.as_secs() as i64, unix.subsec_nanos())
}

fn single_response_time_to_string(t: &der::asn1::GeneralizedTime) -> String {
    generalized_time_to_chrono(t)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
