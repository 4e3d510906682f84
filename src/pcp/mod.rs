//! Port Control Protocol (RFC 6887) wire format and message types.

mod body;
mod epoch;
mod header;
mod message;
mod nonce;
mod opcode;
mod option;
mod option_code;
mod result_code;

pub use epoch::Epoch;
pub use header::{RequestHeader, ResponseHeader, HEADER_LEN, MAX_PACKET_SIZE, PCP_VERSION};
pub use message::{PcpRequest, PcpResponse};
pub use nonce::{MappingNonce, NONCE_LEN};
pub use opcode::OpCode;
pub use option::PcpOption;
pub use option_code::OptionCode;
pub use result_code::ResultCode;

pub(crate) use body::{MapBody, PeerBody};

/// The UDP port both PCP and NAT-PMP servers listen on (RFC 6887 §7, RFC
/// 6886 §3.1).
pub const SERVER_PORT: u16 = 5351;
