//! A set of constants used by the library.

use std::time::Duration;

/// How long a dispatch to a non-reentrant activation waits for the
/// activation's semaphore before failing with
/// [`Error::ReentrancyTimeout`](crate::Error::ReentrancyTimeout).
pub const REENTRANCY_TIMEOUT: Duration = Duration::from_secs(1);

/// Delays between successive handshake attempts against a seed node.
///
/// The schedule is exponential; a seed is given up on once it has been
/// dialed [`HANDSHAKE_ATTEMPTS`] times.
pub const HANDSHAKE_BACKOFF: &[Duration] = &[
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
    Duration::from_secs(16),
];

/// The maximum number of times a seed node is dialed before `join` reports
/// the seed as unreachable.
pub const HANDSHAKE_ATTEMPTS: u32 = 5;

/// Bound of the membership candidate queue. Candidates learned through
/// handshakes beyond this bound are dropped until the connection worker
/// catches up.
pub const CANDIDATE_QUEUE_BOUND: usize = 100;

/// Number of points each node contributes to the consistent hash ring.
pub const RING_REPLICAS: u32 = 32;

/// The wire handler id reserved for the membership handshake.
pub const HANDSHAKE_WIRE_ID: u32 = 0;

/// Size in bytes of a wire frame header: a `u32` payload length, a `u32`
/// handler id (or response status), and a `u64` sequence number, all
/// little-endian.
pub const FRAME_HEADER_LEN: usize = 16;

/// Upper bound on a single wire frame payload. Frames above this are
/// rejected rather than buffered.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;
