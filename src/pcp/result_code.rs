//! PCP result codes (spec.md §4.3, RFC 6887 §7.4).

use crate::error::Error;
use std::fmt;

/// The outcome a PCP server reports for a request.
///
/// Grounded on the teacher's `src/core/result_code.rs`; non-success codes
/// are surfaced as-is to the caller (spec.md §4.3) — retry/abort semantics
/// are decided in the session layer (spec.md §4.7, §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultCode {
    Success = 0,
    UnsuppVersion = 1,
    NotAuthorized = 2,
    MalformedRequest = 3,
    UnsuppOpcode = 4,
    UnsuppOption = 5,
    MalformedOption = 6,
    NetworkFailure = 7,
    NoResources = 8,
    UnsuppProtocol = 9,
    UserExQuota = 10,
    CannotProvideExternal = 11,
    AddressMismatch = 12,
    ExcessiveRemotePeers = 13,
}

impl ResultCode {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ResultCode {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Error> {
        use ResultCode::*;
        Ok(match byte {
            0 => Success,
            1 => UnsuppVersion,
            2 => NotAuthorized,
            3 => MalformedRequest,
            4 => UnsuppOpcode,
            5 => UnsuppOption,
            6 => MalformedOption,
            7 => NetworkFailure,
            8 => NoResources,
            9 => UnsuppProtocol,
            10 => UserExQuota,
            11 => CannotProvideExternal,
            12 => AddressMismatch,
            13 => ExcessiveRemotePeers,
            n => return Err(Error::MalformedPacket(format!("unknown PCP result code {n}"))),
        })
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.as_u8())
    }
}
