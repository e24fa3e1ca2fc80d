pub mod cache;
pub mod certificate_parser;
pub mod config;
pub mod error;
pub mod validator;
pub mod worker;

mod disk_tests;
mod integration_test;

pub use cache::{CachedCrl, CrlCache};
pub use certificate_parser::{
    check_certificate_in_crl, extract_crl_distribution_points, get_certificate_serial_number,
    is_short_lived_certificate,
};
pub use config::{CertRevocationCheckMode, CrlConfig};
pub use error::CrlError;
pub use validator::CrlValidator;
pub use worker::CrlWorker;
