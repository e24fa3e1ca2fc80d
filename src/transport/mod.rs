//! Transport factory: generalizes `tls::client::create_tls_client_with_config`
//! to choose between CRL, OCSP, or no revocation checking, and to pass a
//! caller-supplied `reqwest::Client` through unchanged rather than building
//! one — cases (1)-(5) of the decision table below.

pub mod error;
pub mod profile;

pub use error::TransportError;
pub use profile::TransportProfile;

use crate::crl::config::CrlConfig;
use crate::ocsp::config::OcspConfig;
use crate::tls::crl_verifier::CrlServerCertVerifier;
use crate::tls::ocsp_verifier::OcspServerCertVerifier;
use error::{ClientBuildSnafu, ConflictingRevocationConfigSnafu, VerifierBuildSnafu};
use snafu::{IntoError, ResultExt};
use std::sync::Arc;

/// Which revocation mechanism (if any) the built transport enforces. CRL
/// and OCSP are mutually exclusive per transport (decision table step 2).
#[derive(Debug, Clone)]
pub enum RevocationMode {
    None,
    Crl(CrlConfig),
    Ocsp(OcspConfig),
}

impl RevocationMode {
    /// Resolve from the two independent enable flags a caller's
    /// configuration would expose (`DisableOCSPChecks` and the CRL
    /// `CertRevocationCheckMode`). Enabling both is a startup error.
    pub fn from_flags(
        crl_enabled: bool,
        ocsp_enabled: bool,
        crl_config: CrlConfig,
        ocsp_config: OcspConfig,
    ) -> Result<Self, TransportError> {
        match (crl_enabled, ocsp_enabled) {
            (true, true) => ConflictingRevocationConfigSnafu {}.fail(),
            (true, false) => Ok(RevocationMode::Crl(crl_config)),
            (false, true) => Ok(RevocationMode::Ocsp(ocsp_config)),
            (false, false) => Ok(RevocationMode::None),
        }
    }
}

/// Build (or pass through) a `reqwest::Client` wired for the requested
/// revocation mode.
///
/// * `existing_client` — case (1): a caller-supplied round-tripper is
///   returned unchanged, no revocation wiring is applied.
/// * `custom_root_store` — used by the CRL/OCSP verifiers in place of the
///   system trust store when present.
/// * `proxy_url` — an explicit proxy overrides `reqwest`'s environment-based
///   `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` resolution, which otherwise
///   applies natively.
pub fn build_transport(
    existing_client: Option<reqwest::Client>,
    mode: RevocationMode,
    profile: TransportProfile,
    custom_root_store: Option<rustls::RootCertStore>,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, TransportError> {
    if let Some(client) = existing_client {
        return Ok(client);
    }

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut builder = profile.apply(reqwest::Client::builder());
    if let Some(proxy) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy).context(ClientBuildSnafu)?;
        builder = builder.proxy(proxy);
    }

    match mode {
        RevocationMode::None => builder.build().context(ClientBuildSnafu),
        RevocationMode::Crl(crl_config) => {
            let timeout = std::time::Duration::from_secs(crl_config.http_timeout.num_seconds().max(0) as u64);
            let connect_timeout =
                std::time::Duration::from_secs(crl_config.connection_timeout.num_seconds().max(0) as u64);
            let verifier =
                CrlServerCertVerifier::new_with_root_store(crl_config, custom_root_store)
                    .map_err(|e| VerifierBuildSnafu {}.into_error(e))?;
            let tls_config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(verifier))
                .with_no_client_auth();
            builder
                .use_preconfigured_tls(tls_config)
                .timeout(timeout)
                .connect_timeout(connect_timeout)
                .build()
                .context(ClientBuildSnafu)
        }
        RevocationMode::Ocsp(ocsp_config) => {
            let timeout = ocsp_config
                .responder_timeout
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(10));
            let verifier =
                OcspServerCertVerifier::new_with_root_store(ocsp_config, custom_root_store)
                    .map_err(|e| VerifierBuildSnafu {}.into_error(e))?;
            let tls_config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(verifier))
                .with_no_client_auth();
            builder
                .use_preconfigured_tls(tls_config)
                .timeout(timeout)
                .build()
                .context(ClientBuildSnafu)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_enabled_is_a_conflict() {
        let result = RevocationMode::from_flags(
            true,
            true,
            CrlConfig::default(),
            OcspConfig::default(),
        );
        assert!(matches!(
            result,
            Err(TransportError::ConflictingRevocationConfig { .. })
        ));
    }

    #[test]
    fn neither_enabled_is_none() {
        let result =
            RevocationMode::from_flags(false, false, CrlConfig::default(), OcspConfig::default())
                .unwrap();
        assert!(matches!(result, RevocationMode::None));
    }

    #[test]
    fn existing_client_passes_through_unchanged() {
        let client = reqwest::Client::new();
        let result = build_transport(
            Some(client),
            RevocationMode::None,
            TransportProfile::Signalling,
            None,
            None,
        );
        assert!(result.is_ok());
    }
}
