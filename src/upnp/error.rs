//! UPnP-IGD SOAP fault representation (spec.md §3, §9 Open Question).

use std::fmt;

/// A SOAP fault, or any other non-2xx HTTP outcome, from a UPnP-IGD action.
///
/// The raw SOAP `faultCode` and the decoded `UPnPError/errorCode` are kept
/// side by side rather than collapsed into one another, per spec.md §9: IGD:1
/// and IGD:2 gateways disagree on the numeric error code for the same
/// condition (718 vs 725 for a conflicting mapping), so neither should be
/// treated as canonical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoapError {
    pub status_code: u16,
    pub fault_code: String,
    pub fault_description: String,
    pub upnp_error_code: Option<u32>,
}

impl fmt::Display for SoapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upnp_error_code {
            Some(code) => write!(
                f,
                "SOAP fault (HTTP {}): {} [{}] (UPnPError {code})",
                self.status_code, self.fault_description, self.fault_code
            ),
            None => write!(f, "SOAP fault (HTTP {}): {} [{}]", self.status_code, self.fault_description, self.fault_code),
        }
    }
}

impl std::error::Error for SoapError {}
