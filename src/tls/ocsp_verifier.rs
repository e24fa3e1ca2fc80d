use crate::ocsp::config::OcspConfig;
use crate::ocsp::validator::OcspValidator;
use crate::tls::x509_utils::load_system_root_store;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use std::sync::Arc;

/// Delegates handshake-path verification to `WebPkiServerVerifier`, then
/// runs OCSP status checks on the single strongest anchored chain rustls
/// resolves — see `crate::tls::crl_verifier::CrlServerCertVerifier` for the
/// CRL counterpart, which walks every anchored candidate chain instead.
#[derive(Debug)]
pub struct OcspServerCertVerifier {
    webpki_verifier: Arc<WebPkiServerVerifier>,
    ocsp_validator: Arc<OcspValidator>,
}

impl OcspServerCertVerifier {
    pub fn new_with_root_store(
        ocsp_config: OcspConfig,
        custom_root_store: Option<rustls::RootCertStore>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let root_store = match custom_root_store {
            Some(store) => store,
            None => load_system_root_store()
                .map_err(|err| -> Box<dyn std::error::Error + Send + Sync> { Box::new(err) })?,
        };
        let root_store = Arc::new(root_store);
        let webpki_verifier = WebPkiServerVerifier::builder(root_store.clone()).build()?;
        let ocsp_validator = Arc::new(OcspValidator::new_with_root_store(
            ocsp_config,
            Some(root_store.clone()),
        )?);
        Ok(Self {
            webpki_verifier,
            ocsp_validator,
        })
    }
}

impl ServerCertVerifier for OcspServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let verify_path = |inters: &[rustls::pki_types::CertificateDer<'_>]| {
            self.webpki_verifier.verify_server_cert(
                end_entity,
                inters,
                server_name,
                ocsp_response,
                now,
            )
        };

        verify_path(intermediates)?;

        let inters: Vec<Vec<u8>> = intermediates.iter().map(|c| c.as_ref().to_vec()).collect();
        let chains = crate::tls::x509_utils::build_candidate_chains_with_filter(
            end_entity.as_ref(),
            &inters,
            |inters_der: &[rustls::pki_types::CertificateDer<'_>]| verify_path(inters_der).is_ok(),
        );
        let Some(strongest_chain) = chains.into_iter().next() else {
            return Err(TlsError::General(
                "OCSP validation failed: no anchored chains".to_string(),
            ));
        };

        let validator = Arc::clone(&self.ocsp_validator);
        let chain = strongest_chain.clone();
        let validation = crate::ocsp::worker::OcspWorker::global().validate(validator, chain);
        match validation {
            Ok(_) => Ok(ServerCertVerified::assertion()),
            Err(e) => {
                tracing::error!(target: "sf_core::ocsp", error = %e, "OCSP validation failed");
                Err(TlsError::General(format!("OCSP validation failed: {e}")))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.webpki_verifier
            .verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.webpki_verifier
            .verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.webpki_verifier.supported_verify_schemes()
    }
}
