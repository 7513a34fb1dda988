//! Cancellation on Ctrl+C and SIGTERM.

use tracing::{info, warn};

use nbmerge_core::CancelFlag;

/// Create a cancel flag that is raised on SIGINT (Ctrl+C) or SIGTERM.
///
/// Files already in flight finish; nothing new is started.
pub fn cancel_on_signal() -> CancelFlag {
    let flag = CancelFlag::new();
    let handle = flag.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), cancelling remaining files");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, cancelling remaining files");
                        }
                    }
                }
                Err(e) => {
                    warn!("failed to register SIGTERM handler: {}", e);
                    if ctrl_c.await.is_err() {
                        return;
                    }
                    info!("received SIGINT (Ctrl+C), cancelling remaining files");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                warn!("failed to listen for Ctrl+C: {}", e);
                return;
            }
            info!("received Ctrl+C, cancelling remaining files");
        }

        handle.cancel();
    });

    flag
}
