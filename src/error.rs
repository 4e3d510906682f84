//! The error taxonomy shared by every protocol layer in this crate.
//!
//! See spec.md §7 for the propagation policy: codec errors are always fatal
//! to the current exchange, `Timeout`/`NetworkFailure` are retried by the
//! retry controller and surfaced only after the budget is exhausted, and
//! `ProtocolError` is code-specific (only `NETWORK_FAILURE`/`NO_RESOURCES`
//! are retried by the session layer).

use crate::pcp::ResultCode;
use crate::upnp::SoapError;
use std::net::IpAddr;

/// The single error type returned by every public operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied an out-of-range value or a null where one is required.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Response bytes violate the wire layout expected for that message.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A response's opcode does not match the request it was matched against.
    #[error("unexpected opcode: expected {expected}, got {got}")]
    UnexpectedOpcode { expected: u8, got: u8 },

    /// A PCP/NAT-PMP result code other than success, or a SOAP fault.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The retry controller exhausted its retransmission budget with no match.
    #[error("timed out waiting for a response")]
    Timeout,

    /// The network gateway reported an I/O failure.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// No mapper (PCP, NAT-PMP, or any IGD service) succeeded.
    ///
    /// Carries the last error encountered, per spec.md §7.
    #[error("no mapper succeeded: {0}")]
    Unsupported(Box<Error>),

    /// The operation was cancelled before it could complete.
    #[error("operation cancelled")]
    Cancelled,

    /// A previously held mapping could no longer be refreshed.
    #[error("mapping lost: {0}")]
    MappingLost(String),
}

/// Protocol-specific failure: a non-success PCP/NAT-PMP result code, or a
/// SOAP fault from a UPnP-IGD action.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("PCP/NAT-PMP server returned {0}")]
    ResultCode(ResultCode),

    #[error(transparent)]
    Soap(#[from] SoapError),
}

impl ProtocolError {
    /// Whether the session layer should retry on this error, per spec.md §7:
    /// only `NETWORK_FAILURE` and `NO_RESOURCES` are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResultCode(ResultCode::NetworkFailure) | Self::ResultCode(ResultCode::NoResources)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::NetworkFailure(err.to_string())
    }
}

impl From<ResultCode> for Error {
    fn from(code: ResultCode) -> Self {
        Self::Protocol(ProtocolError::ResultCode(code))
    }
}

impl From<SoapError> for Error {
    fn from(err: SoapError) -> Self {
        Self::Protocol(ProtocolError::Soap(err))
    }
}

/// Helper for constructing `InvalidArgument` with a formatted message.
pub(crate) fn invalid_argument(msg: impl Into<String>) -> Error {
    Error::InvalidArgument(msg.into())
}

/// Helper used by address-validation call sites across protocols.
pub(crate) fn non_null_address(addr: IpAddr, what: &str) -> Result<(), Error> {
    if addr.is_unspecified() {
        return Err(invalid_argument(format!("{what} must not be the unspecified address")));
    }
    Ok(())
}

pub type Result<T> = std::result::Result<T, Error>;
