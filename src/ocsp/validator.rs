//! Per-chain OCSP verdict. Unlike `CrlValidator`, which walks every
//! anchored candidate chain, this only evaluates the single strongest
//! anchored chain rustls hands back first — `verifyPeerCertificateSerial`
//! names "the strongest chain," singular.

use crate::locker::KeyedLocker;
use crate::ocsp::cache::{CachedOcspEntry, OcspCache, OcspCacheKey, OcspStatus};
use crate::ocsp::certificate_parser::extract_ocsp_responder_urls;
use crate::ocsp::config::OcspConfig;
use crate::ocsp::error::{
    NoResponderUrlSnafu, NotDeterminedSnafu, OcspError, StatusRevokedSnafu, StatusUnknownSnafu,
};
use crate::ocsp::fault_injection::{post_parse_fault, pre_fetch_fault};
use crate::ocsp::responder;
use chrono::Utc;
use snafu::IntoError;
use std::sync::Arc;

#[derive(Debug)]
pub struct OcspValidator {
    cache: Arc<OcspCache>,
    config: OcspConfig,
    http_client: reqwest::Client,
    /// Coalesces concurrent handshakes that land on the same cache key into
    /// a single outbound fetch, mirroring `CrlCache`'s per-URL `url_locks`.
    locker: KeyedLocker,
    #[allow(dead_code)]
    root_store: Option<Arc<rustls::RootCertStore>>,
}

impl OcspValidator {
    pub fn new(config: OcspConfig) -> Result<Self, OcspError> {
        Self::new_with_root_store(config, None)
    }

    pub fn new_with_root_store(
        config: OcspConfig,
        root_store: Option<Arc<rustls::RootCertStore>>,
    ) -> Result<Self, OcspError> {
        let cache = OcspCache::global(config.clone());
        register_with_cleaner(cache.clone());
        let http_client = reqwest::Client::builder()
            .timeout(
                config
                    .responder_timeout
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(10)),
            )
            .build()
            .map_err(|e| crate::ocsp::error::HttpClientBuildSnafu {}.into_error(e))?;
        Ok(Self {
            cache: cache.clone(),
            config,
            http_client,
            locker: KeyedLocker::new(),
            root_store,
        })
    }

    /// Evaluate one already-anchored chain, ordered leaf-to-root. Mirrors
    /// `CrlValidator::validate_chain`'s walk, folding each non-root
    /// certificate's status under fail-open/fail-closed policy.
    pub async fn validate_chain(&self, chain: &[Vec<u8>]) -> Result<(), OcspError> {
        let mut inconclusive = false;
        for (i, cert_der) in chain.iter().enumerate() {
            let Some(issuer_der) = chain.get(i + 1) else {
                break;
            };
            match self.check_one(cert_der, issuer_der).await {
                Ok(OcspStatus::Good) => {}
                Ok(OcspStatus::Revoked {
                    reason,
                    revocation_time,
                }) => {
                    return StatusRevokedSnafu {
                        reason,
                        revocation_time,
                    }
                    .fail();
                }
                Ok(OcspStatus::Unknown) => {
                    if self.config.fail_open {
                        tracing::warn!(target: "sf_core::ocsp", cert_index = i, "OCSP status unknown; allowing (fail-open)");
                    } else {
                        return StatusUnknownSnafu {}.fail();
                    }
                }
                Err(e) => {
                    if self.config.fail_open {
                        tracing::warn!(target: "sf_core::ocsp", cert_index = i, error = %e, "OCSP check failed; allowing (fail-open)");
                        inconclusive = true;
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        let _ = inconclusive;
        Ok(())
    }

    async fn check_one(
        &self,
        cert_der: &[u8],
        issuer_der: &[u8],
    ) -> Result<OcspStatus, OcspError> {
        if let Some(err) = pre_fetch_fault(&self.config.fault_injection) {
            return Err(err);
        }

        let key = responder::build_cache_key(cert_der, issuer_der)?;

        if self.config.enable_memory_caching
            && let Some(entry) = self.cache.get(&key)
        {
            return Ok(entry.status);
        }

        let key_lock = self.locker.get(&key.as_hex_string());
        let _guard = key_lock.lock().await;

        // Re-check now that we hold the per-key lock: a concurrent handshake
        // for the same cert may have just populated the cache.
        if self.config.enable_memory_caching
            && let Some(entry) = self.cache.get(&key)
        {
            return Ok(entry.status);
        }

        let urls = extract_ocsp_responder_urls(cert_der)?;
        if urls.is_empty() && self.config.cache_server_url.is_none() {
            return NoResponderUrlSnafu {}.fail();
        }

        let der_request = responder::build_ocsp_request_der(&key)?;

        let response_der = if let Some(cache_server_url) = &self.config.cache_server_url {
            match responder::fetch_from_responder(
                &self.http_client,
                cache_server_url,
                &der_request,
                1,
            )
            .await
            {
                Ok(bytes) => bytes,
                Err(_) => self.fetch_from_responders(&urls, &der_request).await?,
            }
        } else {
            self.fetch_from_responders(&urls, &der_request).await?
        };

        let parsed = responder::parse_ocsp_response(&response_der, &key, issuer_der)?;

        if parsed.next_update.is_some_and(|nu| nu < Utc::now()) || parsed.this_update > Utc::now()
        {
            return crate::ocsp::error::InvalidValiditySnafu {}.fail();
        }

        if let Some(err) = post_parse_fault(&self.config.fault_injection) {
            return Err(err);
        }

        if self.config.enable_memory_caching {
            self.cache.put(
                key,
                CachedOcspEntry {
                    status: parsed.status.clone(),
                    this_update: parsed.this_update,
                    next_update: parsed.next_update,
                    cached_at: Utc::now(),
                },
            );
        }

        Ok(parsed.status)
    }

    async fn fetch_from_responders(
        &self,
        urls: &[String],
        der_request: &[u8],
    ) -> Result<Vec<u8>, OcspError> {
        if urls.is_empty() {
            return NoResponderUrlSnafu {}.fail();
        }
        let mut last_err = None;
        for url in urls {
            match responder::fetch_from_responder(
                &self.http_client,
                url,
                der_request,
                self.config.max_retry_attempts,
            )
            .await
            {
                Ok(bytes) => return Ok(bytes),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| NotDeterminedSnafu {}.build()))
    }
}

fn register_with_cleaner(cache: Arc<OcspCache>) {
    use once_cell::sync::OnceCell;
    static REGISTERED: OnceCell<()> = OnceCell::new();
    REGISTERED.get_or_init(|| {
        crate::cleaner::CacheCleaner::global()
            .register(cache as Arc<dyn crate::cleaner::Sweepable>);
        crate::cleaner::CacheCleaner::global().start();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OcspConfig {
        OcspConfig {
            enable_disk_caching: false,
            fail_open: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn no_responder_url_fault_is_fail_open_friendly() {
        let mut config = test_config();
        config.fault_injection.force_no_responder_url = true;
        let validator = OcspValidator::new(config).unwrap();
        let result = validator.check_one(&[0u8], &[0u8]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fail_closed_propagates_errors() {
        let mut config = test_config();
        config.fail_open = false;
        config.fault_injection.force_no_responder_url = true;
        let validator = OcspValidator::new(config).unwrap();
        // invalid DER certs, but the fault fires before any parsing happens
        let chain = vec![vec![0u8, 1, 2], vec![3u8, 4, 5]];
        let result = validator.validate_chain(&chain).await;
        assert!(result.is_err());
    }
}
