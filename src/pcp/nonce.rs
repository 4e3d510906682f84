//! [`MappingNonce`]: the opaque 12-byte token PCP uses to correlate a
//! request with its response (spec.md §3, §GLOSSARY).

use crate::error::{invalid_argument, Error};
use rand::RngCore;

pub const NONCE_LEN: usize = 12;

/// A 12-byte value copied verbatim between a PCP request and its response.
///
/// Constructors copy the bytes they retain out of any buffer passed in
/// (spec.md "Byte buffer ownership" design note), so callers may reuse or
/// mutate the source buffer freely.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct MappingNonce([u8; NONCE_LEN]);

impl MappingNonce {
    /// Generate a random nonce using the thread-local RNG, as the teacher's
    /// `Client::generate_nonce` does for every new mapping.
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Validate and copy a nonce out of a caller-supplied slice.
    ///
    /// Fails with `InvalidArgument` unless the slice is exactly 12 bytes
    /// long, per spec.md §4.3.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let arr: [u8; NONCE_LEN] = bytes
            .try_into()
            .map_err(|_| invalid_argument(format!("nonce must be {NONCE_LEN} bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}
