//! Process-wide cache cleaner: periodic in-memory eviction plus delayed
//! on-disk removal, shared by the CRL and OCSP caches.
//!
//! Grounded in `crl::cache::CrlCache::spawn_background_refresher`'s pattern
//! of a dedicated OS thread driving a single-threaded Tokio runtime, but
//! generalized: that refresher only knows how to refresh CRL entries ahead
//! of their half-life, while this cleaner only evicts — it never fetches.
//! Both run; a CRL cache registers with both.

use chrono::Utc;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Anything the cleaner can sweep: a memory cache plus, optionally, a
/// directory of on-disk files named after the same keys.
pub trait Sweepable: Send + Sync {
    /// Evict memory entries past their validity horizon. Returns the
    /// on-disk file names (already hashed, matching what the cache writes)
    /// whose memory entry was just evicted, so deletion can be delayed.
    fn sweep_memory(&self, now: chrono::DateTime<Utc>) -> Vec<String>;

    /// Directory holding this cache's on-disk files, if the disk tier is
    /// enabled for this instance.
    fn disk_dir(&self) -> Option<PathBuf>;
}

/// Tick rate and on-disk removal delay. Both are operator-tunable and
/// overridable in tests (see `CleanerConfig::for_tests`).
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    pub tick: Duration,
    pub on_disk_removal_delay: Duration,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        let tick = std::env::var("SF_CACHE_CLEANER_TICK_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));
        Self {
            tick,
            on_disk_removal_delay: Duration::from_secs(300),
        }
    }
}

impl CleanerConfig {
    pub fn for_tests(tick: Duration, on_disk_removal_delay: Duration) -> Self {
        Self {
            tick,
            on_disk_removal_delay,
        }
    }
}

pub struct CacheCleaner {
    config: CleanerConfig,
    targets: Mutex<Vec<Arc<dyn Sweepable>>>,
    stop_tx: OnceCell<tokio::sync::watch::Sender<bool>>,
}

impl CacheCleaner {
    fn new(config: CleanerConfig) -> Self {
        Self {
            config,
            targets: Mutex::new(Vec::new()),
            stop_tx: OnceCell::new(),
        }
    }

    pub fn global() -> &'static Arc<CacheCleaner> {
        static INSTANCE: OnceCell<Arc<CacheCleaner>> = OnceCell::new();
        INSTANCE.get_or_init(|| Arc::new(CacheCleaner::new(CleanerConfig::default())))
    }

    /// Register a cache for periodic sweeping. Safe to call repeatedly;
    /// each registration adds one target (callers are expected to register
    /// their process-wide singleton cache once).
    pub fn register(self: &Arc<Self>, target: Arc<dyn Sweepable>) {
        let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        targets.push(target);
    }

    /// Idempotently start the background sweep loop.
    pub fn start(self: &Arc<Self>) {
        if self.stop_tx.get().is_some() {
            return;
        }
        let (tx, mut rx) = tokio::sync::watch::channel(false);
        if self.stop_tx.set(tx).is_err() {
            // Another thread won the race to start.
            return;
        }
        let this = self.clone();
        let _ = std::thread::Builder::new()
            .name("cache-cleaner".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to create cache cleaner runtime");
                rt.block_on(async move {
                    let mut interval = tokio::time::interval(this.config.tick);
                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                this.sweep_once().await;
                            }
                            changed = rx.changed() => {
                                if changed.is_err() || *rx.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                });
            });
    }

    /// Release the ticker. Idempotent: stopping twice is a no-op.
    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.get() {
            let _ = tx.send(true);
        }
    }

    async fn sweep_once(&self) {
        let targets: Vec<Arc<dyn Sweepable>> = {
            let guard = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        };
        let delay = self.config.on_disk_removal_delay;
        for target in targets {
            let stale_files = target.sweep_memory(Utc::now());
            if stale_files.is_empty() {
                continue;
            }
            let Some(dir) = target.disk_dir() else {
                continue;
            };
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                for name in stale_files {
                    let path = dir.join(&name);
                    if let Err(e) = tokio::fs::remove_file(&path).await
                        && e.kind() != std::io::ErrorKind::NotFound
                    {
                        tracing::debug!(
                            target: "sf_core::cleaner",
                            path = %path.display(),
                            error = %e,
                            "failed to remove stale on-disk cache file"
                        );
                    }
                }
            });
        }
    }

    /// Run one sweep synchronously, for tests that don't want to wait on
    /// the ticker.
    #[cfg(test)]
    pub async fn sweep_now(&self) {
        self.sweep_once().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeCache {
        stale: StdMutex<Vec<String>>,
        dir: Option<PathBuf>,
        sweeps: AtomicUsize,
    }

    impl Sweepable for FakeCache {
        fn sweep_memory(&self, _now: chrono::DateTime<Utc>) -> Vec<String> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            std::mem::take(&mut *self.stale.lock().unwrap())
        }

        fn disk_dir(&self) -> Option<PathBuf> {
            self.dir.clone()
        }
    }

    #[tokio::test]
    async fn sweep_removes_file_after_delay() {
        let tmp = tempfile::tempdir().unwrap();
        let file_path = tmp.path().join("deadbeef");
        std::fs::write(&file_path, b"stale").unwrap();

        let fake = Arc::new(FakeCache {
            stale: StdMutex::new(vec!["deadbeef".to_string()]),
            dir: Some(tmp.path().to_path_buf()),
            sweeps: AtomicUsize::new(0),
        });

        let cleaner = Arc::new(CacheCleaner::new(CleanerConfig::for_tests(
            Duration::from_millis(10),
            Duration::from_millis(20),
        )));
        cleaner.register(fake.clone());
        cleaner.sweep_now().await;
        assert_eq!(fake.sweeps.load(Ordering::SeqCst), 1);

        assert!(file_path.exists(), "file should still exist immediately");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!file_path.exists(), "file should be removed after delay");
    }

    #[tokio::test]
    async fn sweep_with_no_stale_entries_does_not_touch_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeCache {
            stale: StdMutex::new(vec![]),
            dir: Some(tmp.path().to_path_buf()),
            sweeps: AtomicUsize::new(0),
        });
        let cleaner = Arc::new(CacheCleaner::new(CleanerConfig::for_tests(
            Duration::from_millis(10),
            Duration::from_millis(10),
        )));
        cleaner.register(fake.clone());
        cleaner.sweep_now().await;
        assert_eq!(fake.sweeps.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_is_idempotent() {
        let cleaner = Arc::new(CacheCleaner::new(CleanerConfig::for_tests(
            Duration::from_secs(60),
            Duration::from_secs(60),
        )));
        cleaner.start();
        cleaner.start();
        cleaner.stop();
        cleaner.stop();
    }
}
