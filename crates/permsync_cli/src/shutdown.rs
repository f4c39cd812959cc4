use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use console::Term;

/// Global shutdown flag for graceful termination.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if shutdown has been requested.
#[inline]
pub(crate) fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Acquire)
}

/// Request shutdown.
#[inline]
fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::Release);
}

/// Set up the Ctrl+C handler for graceful shutdown.
pub(crate) fn setup_shutdown_handler() {
    tokio::spawn(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        let is_tty = Term::stdout().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing the current pass...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing the current pass");
        }

        request_shutdown();

        // Second Ctrl+C forces quit
        if tokio::signal::ctrl_c().await.is_ok() {
            if is_tty {
                eprintln!("Force quit!");
            }
            std::process::exit(130);
        }
    });
}

/// Sleep for `duration`, waking early once shutdown is requested.
///
/// Returns false if shutdown was requested.
pub(crate) async fn sleep_unless_shutdown(duration: Duration) -> bool {
    const TICK: Duration = Duration::from_millis(250);

    let deadline = tokio::time::Instant::now() + duration;
    while !is_shutdown_requested() {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(TICK)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_deadline_without_shutdown() {
        let start = tokio::time::Instant::now();
        assert!(sleep_unless_shutdown(Duration::from_secs(2)).await);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
