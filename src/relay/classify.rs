//! Copy-Error Classification
//!
//! Half-duplex shutdown is ordinary traffic lifecycle, not a failure. A copy
//! direction routinely ends with the peer closing, resetting, or the session
//! scope being cancelled because the sibling direction finished first. Only
//! errors outside this set are attributed as relay faults.

use std::io;

/// Whether a copy-loop error is an expected termination rather than a fault.
///
/// Expected: end-of-stream indications, connection already closed, reset by
/// peer, broken pipe, cancellation, and any timeout. A copy that finished
/// without an error is trivially expected at the call site.
pub fn is_expected_copy_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
    )
}
