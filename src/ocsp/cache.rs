//! Two-tier OCSP response cache, mirroring `crl::cache::CrlCache`'s
//! memory/disk split: an in-memory `HashMap` behind a mutex, with the
//! on-disk tier holding the whole map serialized as JSON at a fixed file
//! name (one OCSP response file, unlike CRL's one-file-per-URL layout,
//! since RFC 6960 cache keys don't name a stable per-entry filename the
//! way a CRL distribution-point URL does).

use crate::ocsp::config::OcspConfig;
use crate::ocsp::error::{CacheDirectoryCreationSnafu, MutexPoisonedSnafu, OcspError};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::global;
use serde::{Deserialize, Serialize};
use snafu::{IntoError, ResultExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OcspCacheKey {
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    pub serial: Vec<u8>,
}

impl OcspCacheKey {
    pub fn as_hex_string(&self) -> String {
        format!(
            "{}:{}:{}",
            hex::encode(&self.issuer_name_hash),
            hex::encode(&self.issuer_key_hash),
            hex::encode(&self.serial)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcspStatus {
    Good,
    Revoked {
        reason: Option<String>,
        revocation_time: Option<String>,
    },
    Unknown,
}

#[derive(Debug, Clone)]
pub struct CachedOcspEntry {
    pub status: OcspStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub cached_at: DateTime<Utc>,
}

impl CachedOcspEntry {
    fn expires_at(&self, default_ttl: chrono::Duration) -> DateTime<Utc> {
        match self.next_update {
            Some(nu) => nu.min(self.cached_at + default_ttl),
            None => self.cached_at + default_ttl,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: OcspCacheKey,
    status: DiskStatus,
    this_update: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
enum DiskStatus {
    Good,
    Revoked {
        reason: Option<String>,
        revocation_time: Option<String>,
    },
    Unknown,
}

impl From<&OcspStatus> for DiskStatus {
    fn from(s: &OcspStatus) -> Self {
        match s {
            OcspStatus::Good => DiskStatus::Good,
            OcspStatus::Revoked {
                reason,
                revocation_time,
            } => DiskStatus::Revoked {
                reason: reason.clone(),
                revocation_time: revocation_time.clone(),
            },
            OcspStatus::Unknown => DiskStatus::Unknown,
        }
    }
}

impl From<DiskStatus> for OcspStatus {
    fn from(s: DiskStatus) -> Self {
        match s {
            DiskStatus::Good => OcspStatus::Good,
            DiskStatus::Revoked {
                reason,
                revocation_time,
            } => OcspStatus::Revoked {
                reason,
                revocation_time,
            },
            DiskStatus::Unknown => OcspStatus::Unknown,
        }
    }
}

const DISK_FILE_NAME: &str = "ocsp_response_cache.json";

#[derive(Debug, Clone)]
struct OcspMetrics {
    get_total: Counter<u64>,
    hit_total: Counter<u64>,
    miss_total: Counter<u64>,
}

fn metrics() -> &'static OcspMetrics {
    static METRICS: OnceCell<OcspMetrics> = OnceCell::new();
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("sf_core.ocsp");
        OcspMetrics {
            get_total: meter.u64_counter("ocsp_get_total").build(),
            hit_total: meter.u64_counter("ocsp_hit_total").build(),
            miss_total: meter.u64_counter("ocsp_miss_total").build(),
        }
    })
}

#[derive(Debug)]
pub struct OcspCache {
    config: OcspConfig,
    memory: Mutex<HashMap<OcspCacheKey, CachedOcspEntry>>,
    dirty: Mutex<bool>,
}

impl OcspCache {
    pub fn new(config: OcspConfig) -> Self {
        let cache = Self {
            config,
            memory: Mutex::new(HashMap::new()),
            dirty: Mutex::new(false),
        };
        cache.load_from_disk();
        cache
    }

    pub fn global(config: OcspConfig) -> &'static Arc<OcspCache> {
        static INSTANCE: OnceCell<Arc<OcspCache>> = OnceCell::new();
        INSTANCE.get_or_init(|| Arc::new(OcspCache::new(config)))
    }

    fn disk_path(&self) -> Option<std::path::PathBuf> {
        if !self.config.enable_disk_caching {
            return None;
        }
        self.config.get_cache_dir().map(|dir| dir.join(DISK_FILE_NAME))
    }

    fn load_from_disk(&self) {
        let Some(path) = self.disk_path() else {
            return;
        };
        let Ok(bytes) = std::fs::read(&path) else {
            return;
        };
        let Ok(entries) = serde_json::from_slice::<Vec<DiskEntry>>(&bytes) else {
            tracing::warn!(target: "sf_core::ocsp", "failed to parse OCSP disk cache, ignoring");
            return;
        };
        if let Ok(mut mem) = self.memory.lock() {
            let now = Utc::now();
            for e in entries {
                let entry = CachedOcspEntry {
                    status: e.status.into(),
                    this_update: e.this_update,
                    next_update: e.next_update,
                    cached_at: e.cached_at,
                };
                if entry.expires_at(chrono::Duration::hours(24)) > now {
                    mem.insert(e.key, entry);
                }
            }
        }
    }

    fn persist_to_disk(&self) -> Result<(), OcspError> {
        let Some(path) = self.disk_path() else {
            return Ok(());
        };
        let Some(dir) = path.parent() else { return Ok(()) };
        std::fs::create_dir_all(dir).context(CacheDirectoryCreationSnafu)?;
        let entries: Vec<DiskEntry> = {
            let mem = self.memory.lock().map_err(|e| {
                MutexPoisonedSnafu {
                    message: format!("ocsp memory cache poisoned: {e}"),
                }
                .build()
            })?;
            mem.iter()
                .map(|(key, entry)| DiskEntry {
                    key: key.clone(),
                    status: (&entry.status).into(),
                    this_update: entry.this_update,
                    next_update: entry.next_update,
                    cached_at: entry.cached_at,
                })
                .collect()
        };
        let json = serde_json::to_vec(&entries).unwrap_or_default();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| {
            crate::ocsp::error::DiskCacheWriteSnafu {}.into_error(e)
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            crate::ocsp::error::DiskCacheWriteSnafu {}.into_error(e)
        })?;
        let _ = crate::config::fs_checks::set_file_mode_0600(&path);
        Ok(())
    }

    pub fn get(&self, key: &OcspCacheKey) -> Option<CachedOcspEntry> {
        metrics().get_total.add(1, &[]);
        let mem = self.memory.lock().ok()?;
        let entry = mem.get(key)?;
        if Utc::now() <= entry.expires_at(chrono::Duration::hours(24)) {
            metrics().hit_total.add(1, &[]);
            Some(entry.clone())
        } else {
            metrics().miss_total.add(1, &[]);
            None
        }
    }

    pub fn put(&self, key: OcspCacheKey, entry: CachedOcspEntry) {
        if let Ok(mut mem) = self.memory.lock() {
            mem.insert(key, entry);
        }
        if let Ok(mut dirty) = self.dirty.lock() {
            *dirty = true;
        }
        if self.config.enable_disk_caching {
            let _ = self.persist_to_disk();
        }
    }

    #[cfg(test)]
    pub fn clear_for_tests(&self) {
        if let Ok(mut mem) = self.memory.lock() {
            mem.clear();
        }
    }
}

impl crate::cleaner::Sweepable for OcspCache {
    fn sweep_memory(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut dirty = false;
        if let Ok(mut mem) = self.memory.lock() {
            let before = mem.len();
            mem.retain(|_, entry| now <= entry.expires_at(chrono::Duration::hours(24)));
            dirty = mem.len() != before;
        }
        if dirty {
            let _ = self.persist_to_disk();
        }
        // The on-disk tier here is one shared JSON map, not per-key files,
        // so eviction is rewritten immediately above rather than scheduled
        // for delayed per-file deletion like the CRL cache's disk tier.
        Vec::new()
    }

    fn disk_dir(&self) -> Option<std::path::PathBuf> {
        None
    }
}
