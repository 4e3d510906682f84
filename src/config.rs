//! Tunable constants for retry timing and discovery (spec.md §4.5, §4.6).
//!
//! Plain `Default`-implementing structs, mirroring `UpnpConfig::default()` in
//! `other_examples/07f7cf45_darkrenaissance-darkfi__src-net-upnp.rs.rs` —
//! this crate is a library, not a daemon, so there is no file-based config
//! loading; callers override fields on the `Default` value as needed.

use std::time::Duration;

/// Timing parameters for the retry controller (spec.md §4.5).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryConfig {
    /// PCP's Initial Retransmission Time (RFC 6887 §8.1.1).
    pub pcp_irt: Duration,
    /// PCP's Maximum Retransmission Time; retry intervals double up to this.
    pub pcp_mrt: Duration,
    /// PCP's Maximum Retransmission Count. `None` means retry until the
    /// request's own deadline, matching the teacher's `MRC = 0` ("infinite").
    pub pcp_mrc: Option<u32>,
    /// NAT-PMP's first retransmission timeout (RFC 6886 §3.1): 250ms,
    /// doubling each retry.
    pub natpmp_initial_timeout: Duration,
    /// NAT-PMP's retry budget (RFC 6886 §3.1): bounds the number of
    /// *resends* after the initial send, so the send callback is invoked
    /// `natpmp_max_retries + 2` times in total before the final 64s wait
    /// times out with no further transmission (spec.md §8 scenario 6: 9
    /// sends total, at t = 0, .25, .75, 1.75, 3.75, 7.75, 15.75, 31.75,
    /// 63.75s).
    pub natpmp_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            pcp_irt: Duration::from_secs(3),
            pcp_mrt: Duration::from_secs(1024),
            pcp_mrc: None,
            natpmp_initial_timeout: Duration::from_millis(250),
            natpmp_max_retries: 7,
        }
    }
}

/// Timing parameters for gateway discovery (spec.md §4.6).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiscoveryConfig {
    /// How long discovery waits for announce/SSDP responses on each
    /// interface before returning whatever it has collected.
    pub discovery_timeout: Duration,
    /// The SSDP `MX` header value: how long a gateway may randomize its
    /// M-SEARCH reply delay by.
    pub ssdp_mx: u8,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { discovery_timeout: Duration::from_secs(3), ssdp_mx: 2 }
    }
}

/// Safety margin applied when scheduling a mapping refresh (spec.md §4.7):
/// refresh must run at or before `expiresAt - max(60s, lifetime/2)`.
pub fn refresh_margin(lifetime: Duration) -> Duration {
    Duration::from_secs(60).max(lifetime / 2)
}
