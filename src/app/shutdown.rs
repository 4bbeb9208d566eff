use super::{ComponentState, EdgeOrchestrator};
use crate::error::Result;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{error, info, warn};

impl EdgeOrchestrator {
    /// Stop every unit and wait for it to finish its current iteration.
    /// Returns 0 when every unit ended cleanly.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        for component in self.all_running().await {
            self.set_component_state(&component, ComponentState::Stopping)
                .await;
        }
        self.cancellation_token.cancel();

        let stop_timeout = self.stop_timeout;
        let mut units = std::mem::replace(&mut self.units, JoinSet::new());
        let drained = timeout(stop_timeout, async {
            let mut exits = Vec::new();
            while let Some(result) = units.join_next().await {
                exits.push(result);
            }
            exits
        })
        .await;

        match drained {
            Ok(exits) => {
                for result in exits {
                    self.record_exit(result);
                }
            }
            Err(_) => {
                error!("Units did not stop within {:?}", stop_timeout);
                units.abort_all();
                for component in self.all_running().await {
                    self.set_component_state(&component, ComponentState::Failed)
                        .await;
                }
                self.failures += 1;
            }
        }

        let exit_code = if self.failures == 0 { 0 } else { 1 };
        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Record how a unit ended
    pub(super) fn record_exit(
        &mut self,
        result: std::result::Result<(String, Result<()>), JoinError>,
    ) {
        match result {
            Ok((component, Ok(()))) => info!("{} stopped", component),
            Ok((component, Err(e))) => {
                warn!("{} exited with error: {}", component, e);
                self.failures += 1;
            }
            Err(e) => {
                error!("Unit task panicked or was aborted: {}", e);
                self.failures += 1;
            }
        }
    }

    /// Components that have not reached a terminal state
    async fn all_running(&self) -> Vec<String> {
        self.get_all_component_states()
            .await
            .into_iter()
            .filter(|(_, state)| {
                !matches!(state, ComponentState::Stopped | ComponentState::Failed)
            })
            .map(|(component, _)| component)
            .collect()
    }
}
