use snafu::{Location, Snafu};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum TransportError {
    #[snafu(display(
        "CRL and OCSP revocation checking cannot both be enabled for the same transport"
    ))]
    ConflictingRevocationConfig {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to build HTTP client"))]
    ClientBuild {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to build TLS verifier"))]
    VerifierBuild {
        source: Box<dyn std::error::Error + Send + Sync>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to configure transport"))]
    Tls {
        source: crate::tls::error::TlsError,
        #[snafu(implicit)]
        location: Location,
    },
}
