//! Timeout enforcement and network failure classification.
//!
//! # Responsibilities
//! - Wrap backend calls with a deadline
//! - Tell connection refusals apart from timeouts and other transport errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry,
//!   which releases its connection
//! - Timed-out requests return 504 Gateway Timeout

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::time::Duration;

/// Coarse kind of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    ConnectionRefused,
    TimedOut,
    Other,
}

/// Walk an error's source chain looking for a recognizable I/O cause.
pub fn classify_error(err: &(dyn StdError + 'static)) -> NetworkFailure {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return NetworkFailure::ConnectionRefused,
                io::ErrorKind::TimedOut => return NetworkFailure::TimedOut,
                _ => {}
            }
        }
        if e.is::<tokio::time::error::Elapsed>() {
            return NetworkFailure::TimedOut;
        }
        current = e.source();
    }
    NetworkFailure::Other
}

/// Run `fut` with a deadline. `Err` means the deadline fired first.
pub async fn with_deadline<F>(duration: Duration, fut: F) -> Result<F::Output, NetworkFailure>
where
    F: Future,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| NetworkFailure::TimedOut)
}
