//! Consulted only when the caller has explicitly populated
//! [`OcspFaultInjection`](crate::ocsp::config::OcspFaultInjection) fields,
//! mirroring the driver's `SF_OCSP_TEST_*` env-var hooks that let test
//! suites exercise revocation-handling edge cases without a live responder.

use crate::ocsp::config::OcspFaultInjection;
use crate::ocsp::error::{NoResponderUrlSnafu, OcspError, StatusUnknownSnafu};

/// Returns `Some(err)` if a fault is configured that should short-circuit
/// the responder lookup for this check, before any network call is made.
pub fn pre_fetch_fault(fault: &OcspFaultInjection) -> Option<OcspError> {
    if fault.force_no_responder_url {
        return Some(NoResponderUrlSnafu {}.build());
    }
    if fault.force_responder_timeout {
        return Some(crate::ocsp::error::HttpTimeoutSnafu {}.build());
    }
    None
}

/// Returns `Some(err)` if a fault is configured that should override an
/// otherwise-successful response parse.
pub fn post_parse_fault(fault: &OcspFaultInjection) -> Option<OcspError> {
    if fault.force_invalid_validity {
        return Some(crate::ocsp::error::InvalidValiditySnafu {}.build());
    }
    if fault.force_unknown_status {
        return Some(StatusUnknownSnafu {}.build());
    }
    None
}
