use crate::config::ConfigError;
use crate::config::settings::Settings;
use chrono::Duration;
use std::path::PathBuf;

/// Fault-injection knobs consulted only from tests, mirroring the
/// `SF_OCSP_TEST_*` environment hooks the driver's own test suites use to
/// force validity errors, unknown status, or responder timeouts without a
/// live OCSP responder.
#[derive(Debug, Clone, Default)]
pub struct OcspFaultInjection {
    pub force_invalid_validity: bool,
    pub force_unknown_status: bool,
    pub force_responder_timeout: bool,
    pub force_no_responder_url: bool,
}

#[derive(Debug, Clone)]
pub struct OcspConfig {
    pub fail_open: bool,
    pub enable_disk_caching: bool,
    pub enable_memory_caching: bool,
    pub cache_dir: Option<PathBuf>,
    pub responder_timeout: Duration,
    pub cache_server_url: Option<String>,
    pub cache_server_timeout: Duration,
    pub max_retry_attempts: u32,
    pub fault_injection: OcspFaultInjection,
}

impl Default for OcspConfig {
    fn default() -> Self {
        Self {
            fail_open: true,
            enable_disk_caching: true,
            enable_memory_caching: true,
            cache_dir: None,
            responder_timeout: Duration::seconds(10),
            cache_server_url: None,
            cache_server_timeout: Duration::seconds(5),
            max_retry_attempts: 3,
            fault_injection: OcspFaultInjection::default(),
        }
    }
}

impl OcspConfig {
    pub fn default_cache_dir() -> Option<PathBuf> {
        crate::config::fs_checks::resolve_cache_dir("ocsp")
    }

    pub fn get_cache_dir(&self) -> Option<PathBuf> {
        let dir = self.cache_dir.clone().or_else(Self::default_cache_dir)?;
        if crate::config::fs_checks::ensure_dir_permissions(&dir).is_err() {
            tracing::warn!(target: "sf_core::ocsp", path = %dir.display(), "could not prepare OCSP cache directory, skipping disk tier");
            return None;
        }
        Some(dir)
    }

    pub fn from_settings(settings: &dyn Settings) -> Result<Self, ConfigError> {
        let fail_open = settings
            .get_string("ocsp_fail_open")
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);
        let enable_disk_caching = settings
            .get_string("ocsp_enable_disk_caching")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(true);
        let enable_memory_caching = settings
            .get_string("ocsp_enable_memory_caching")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(true);
        let cache_dir = settings.get_string("ocsp_cache_dir").map(PathBuf::from);
        let responder_timeout = settings
            .get_int("ocsp_responder_timeout")
            .map(Duration::seconds)
            .unwrap_or(Duration::seconds(10));
        let cache_server_url = settings
            .get_string("ocsp_response_cache_server_url")
            .or_else(|| std::env::var("SF_OCSP_RESPONSE_CACHE_SERVER_URL").ok());
        let cache_server_timeout = settings
            .get_int("ocsp_cache_server_timeout")
            .map(Duration::seconds)
            .unwrap_or(Duration::seconds(5));
        let max_retry_attempts = settings
            .get_int("ocsp_max_retry_attempts")
            .map(|v| v.max(1) as u32)
            .unwrap_or(3);
        Ok(Self {
            fail_open,
            enable_disk_caching,
            enable_memory_caching,
            cache_dir,
            responder_timeout,
            cache_server_url,
            cache_server_timeout,
            max_retry_attempts,
            fault_injection: OcspFaultInjection::default(),
        })
    }
}
