//! Certificate revocation validation core.
//!
//! Intercepts the peer-certificate verification step of outbound TLS
//! handshakes and decides whether the presented chain contains a revoked
//! certificate, via CRL or OCSP (mutually exclusive per transport).

pub mod cleaner;
pub mod config;
pub mod crl;
pub mod http;
pub mod locker;
pub mod ocsp;
pub mod tls;
pub mod transport;
