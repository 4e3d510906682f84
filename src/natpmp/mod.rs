//! NAT Port Mapping Protocol (RFC 6886) wire format.

mod message;

pub use message::{NatPmpRequest, NatPmpResponse, NatPmpResultCode, NATPMP_VERSION};
