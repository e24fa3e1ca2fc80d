use snafu::{Location, Snafu};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum OcspError {
    #[snafu(display("Failed to build OCSP request"))]
    RequestEncode {
        source: x509_cert::der::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to compute issuer hash for OCSP request"))]
    IssuerHash {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("No OCSP responder URL available for this certificate"))]
    NoResponderUrl {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("OCSP responder request failed for {url}: {message}"))]
    ResponderRequest {
        url: String,
        message: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("OCSP responder returned 401 Unauthorized for {url}"))]
    Unauthorized {
        url: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to parse OCSP response"))]
    ResponseParse {
        source: x509_cert::der::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("OCSP response status was not successful"))]
    ResponseNotSuccessful {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("No matching single response for the requested certificate"))]
    NoMatchingResponse {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("OCSP response validity window (thisUpdate/nextUpdate) is invalid"))]
    InvalidValidity {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("OCSP response signature verification failed"))]
    SignatureVerify {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("OCSP status is unknown"))]
    StatusUnknown {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Certificate is revoked"))]
    StatusRevoked {
        reason: Option<String>,
        revocation_time: Option<String>,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to read OCSP response from disk cache"))]
    DiskCacheRead {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to write OCSP response to disk cache"))]
    DiskCacheWrite {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to create OCSP cache directory"))]
    CacheDirectoryCreation {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Mutex poisoned: {message}"))]
    MutexPoisoned {
        message: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to build HTTP client for OCSP requests"))]
    HttpClientBuild {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("HTTP timeout while contacting OCSP responder"))]
    HttpTimeout {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Could not determine OCSP status for the chain"))]
    NotDetermined {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("OCSP responder exhausted all transports for {url}"))]
    ResponderExhausted {
        url: String,
        #[snafu(implicit)]
        location: Location,
    },
}
