//! UPnP Internet Gateway Device control: SOAP-over-HTTP requests/responses
//! for the WAN connection, WAN PPP connection and WAN IPv6 firewall control
//! services (spec.md §1, §4.4).

mod actions;
mod error;
mod soap;

pub use actions::*;
pub use error::SoapError;
pub use soap::{build_envelope, build_http_request, parse_http_response, Child};
pub(crate) use soap::{find_all_elements, parse_flat_children};
