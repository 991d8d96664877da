//! Interrupt handling: the first signal asks the copier to stop after the
//! current message, a second one means stop now.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Exit status used when the operator forces a stop (128 + SIGINT).
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupts {
    /// A second signal arrived while the graceful stop was in progress.
    Forced,
    /// The signal listener could not be installed or failed.
    ListenerFailed,
}

/// Wait for interrupts produced by `next_signal`.
///
/// The first cancels `cancel`; the second returns [`Interrupts::Forced`] and
/// the caller is expected to exit immediately.
pub async fn watch_interrupts<F, Fut>(mut next_signal: F, cancel: CancellationToken) -> Interrupts
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_signal().await {
        error!("cannot listen for interrupts: {e}");
        return Interrupts::ListenerFailed;
    }
    warn!("interrupt received, stopping after the current message (interrupt again to quit now)");
    cancel.cancel();

    match next_signal().await {
        Ok(()) => {
            warn!("second interrupt, exiting without waiting");
            Interrupts::Forced
        }
        Err(e) => {
            error!("cannot listen for interrupts: {e}");
            Interrupts::ListenerFailed
        }
    }
}
