use super::{EdgeOrchestrator, ShutdownReason};
use crate::error::{EdgewatchError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

impl EdgeOrchestrator {
    /// Run until a signal, a shutdown request, or every unit has exited, then
    /// shut down. Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Edgewatch is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| EdgewatchError::system("Shutdown sender already taken"))?;

        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| EdgewatchError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender);

        let token = self.cancellation_token.clone();
        let reason = loop {
            tokio::select! {
                received = &mut shutdown_receiver => {
                    break received.unwrap_or(ShutdownReason::Error(
                        "Shutdown channel closed unexpectedly".to_string(),
                    ));
                }
                _ = token.cancelled() => break ShutdownReason::UserRequest,
                joined = self.units.join_next() => match joined {
                    Some(result) => self.record_exit(result),
                    None => break ShutdownReason::Error("all units exited".to_string()),
                },
            }
        };

        info!("Shutdown initiated: {:?}", reason);

        let mut exit_code = self.shutdown().await?;
        if matches!(reason, ShutdownReason::Error(_)) {
            exit_code = 1;
        }

        info!("Edgewatch shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // SIGTERM (service stop)
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if let Some(()) = sigterm.recv().await {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // SIGINT (Ctrl+C)
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                    }
                }
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }
}
