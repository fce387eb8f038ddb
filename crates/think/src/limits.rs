//! Resource caps for sandbox execution.
//!
//! Every I/O surface the sandbox exposes is bounded. These are process-wide
//! constants rather than per-run configuration: a thought that needs more
//! than this is better served by the agent splitting the work.

use std::time::Duration;

/// Largest file `fs.readFile` will load (50 MiB).
pub const MAX_READ_BYTES: u64 = 50 * 1024 * 1024;

/// Largest content `fs.writeFile` / `fs.appendFile` will accept (10 MiB).
pub const MAX_WRITE_BYTES: u64 = 10 * 1024 * 1024;

/// Largest file `fs.copy` will duplicate (50 MiB).
pub const MAX_COPY_BYTES: u64 = 50 * 1024 * 1024;

/// Cap on the number of paths a single `fs.glob` call may return.
pub const MAX_GLOB_MATCHES: usize = 1_000_000;

/// Cap on an HTTP response body read by `net.fetch` (20 MiB).
///
/// The body is read through a limited reader sized one byte over the cap so
/// an oversized response is detected rather than silently truncated.
pub const MAX_NET_RESPONSE_BYTES: u64 = 20 * 1024 * 1024;

/// TCP connect + TLS handshake timeout for `net.fetch`.
pub const NET_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall wall-clock timeout for a single `net.fetch` request.
pub const NET_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cap on a remotely-fetched thought script (1 MiB).
pub const MAX_SCRIPT_BYTES: u64 = 1024 * 1024;

/// Timeout for fetching a remote thought script.
pub const SCRIPT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
