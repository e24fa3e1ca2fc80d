//! Per-purpose connection pool tuning. Each profile produces a differently
//! tuned `reqwest::ClientBuilder` the way the teacher crate tunes one
//! client (the CRL/TLS fetch path); the rest are new, built the same way,
//! since the teacher only ever needed one profile.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProfile {
    /// Control-plane / auth signalling: low idle footprint, short connect
    /// budget, a handshake that must fail fast rather than hang.
    Signalling,
    /// Cloud-provider metadata/API calls: a small idle pool, metadata
    /// endpoints are usually on a loopback-ish address and bypass proxies.
    CloudProvider,
    /// OCSP responder fetches: short-lived bursts, one responder per host,
    /// no need to keep idle connections warm between handshakes.
    OcspFetch,
    /// CRL distribution point fetches: larger bodies, allow a bit more
    /// idle-connection reuse since the same DP URL is hit repeatedly.
    CrlFetch,
    /// Workload identity / federated token exchange: favors a slightly
    /// longer connect timeout to tolerate identity provider latency.
    WorkloadIdentity,
}

impl TransportProfile {
    pub fn apply(self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        match self {
            TransportProfile::Signalling => builder
                .pool_max_idle_per_host(2)
                .pool_idle_timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(5)),
            TransportProfile::CloudProvider => builder
                .pool_max_idle_per_host(1)
                .pool_idle_timeout(Duration::from_secs(10))
                .connect_timeout(Duration::from_secs(2))
                .no_proxy(),
            TransportProfile::OcspFetch => builder
                .pool_max_idle_per_host(1)
                .pool_idle_timeout(Duration::from_secs(5))
                .connect_timeout(Duration::from_secs(10)),
            TransportProfile::CrlFetch => builder
                .pool_max_idle_per_host(4)
                .pool_idle_timeout(Duration::from_secs(60))
                .connect_timeout(Duration::from_secs(10)),
            TransportProfile::WorkloadIdentity => builder
                .pool_max_idle_per_host(2)
                .pool_idle_timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(15)),
        }
    }
}
