//! End-to-end coverage across a real TCP socket: fetch-and-cache, concurrent
//! request coalescing, and cleaner-driven eviction. No mocking crate is used
//! here — a minimal hand-rolled HTTP/1.0 responder is enough to drive
//! `CrlCache` through its actual `reqwest` client.

#[cfg(test)]
mod tests {
    use crate::cleaner::Sweepable;
    use crate::crl::cache::{CachedCrl, CrlCache};
    use crate::crl::config::CrlConfig;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Spawn a throwaway HTTP responder on localhost that always returns
    /// `body` and counts how many requests it served.
    fn spawn_server(body: Vec<u8>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                hits_clone.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });
        (format!("http://{addr}/test.crl"), hits)
    }

    #[tokio::test]
    async fn fetch_caches_across_calls() {
        let (url, hits) = spawn_server(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let cache = CrlCache::new(CrlConfig {
            enable_memory_caching: true,
            enable_disk_caching: false,
            ..Default::default()
        })
        .unwrap();

        let first = cache.get(&url).await.unwrap();
        let second = cache.get(&url).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            hits.load(Ordering::SeqCst),
            1,
            "second call should be served from memory cache"
        );
    }

    #[tokio::test]
    async fn concurrent_fetches_coalesce_into_one_request() {
        let (url, hits) = spawn_server(vec![0x01, 0x02, 0x03]);
        let cache = Arc::new(
            CrlCache::new(CrlConfig {
                enable_memory_caching: true,
                enable_disk_caching: false,
                ..Default::default()
            })
            .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move { cache.get(&url).await }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }
        // Coalescing keeps this well under the request count; a handful of
        // requests landing before the first response populates the cache is
        // tolerable, but it must not be one-per-task.
        assert!(
            hits.load(Ordering::SeqCst) < 8,
            "concurrent requests for the same URL should coalesce"
        );
    }

    #[test]
    fn cleaner_evicts_stale_memory_entry_and_reports_its_digest() {
        let cache = CrlCache::new(CrlConfig {
            enable_memory_caching: true,
            enable_disk_caching: false,
            ..Default::default()
        })
        .unwrap();
        let url = "http://example.com/expired.crl".to_string();
        cache
            .put(CachedCrl {
                crl: vec![1, 2, 3],
                download_time: chrono::Utc::now() - chrono::Duration::days(2),
                url: url.clone(),
                expires_at: chrono::Utc::now() - chrono::Duration::hours(1),
                crl_number: None,
            })
            .unwrap();

        let evicted = cache.sweep_memory(chrono::Utc::now());
        assert_eq!(evicted, vec![CrlCache::url_digest(&url)]);
        assert!(cache.get_cached(&url).unwrap().is_none());
    }
}
