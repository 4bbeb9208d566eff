use super::{ComponentState, EdgeOrchestrator, UnitKind};
use crate::error::Result;
use crate::ingest::IngestEngine;
use crate::pipeline::StreamPipeline;
use std::sync::Arc;
use tracing::{error, info};

impl EdgeOrchestrator {
    /// Register every unit this process will run
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing units for {} stream(s)", self.streams.len());

        for stream in &self.streams {
            if self.mode.runs_ingest() {
                self.component_states
                    .set(&UnitKind::Ingest.component(&stream.name), ComponentState::Stopped)
                    .await;
            }
            if self.mode.runs_pipeline() {
                self.component_states
                    .set(&UnitKind::Pipeline.component(&stream.name), ComponentState::Stopped)
                    .await;
            }
        }

        info!("All units initialized successfully");
        Ok(())
    }

    /// Spawn every unit. Each runs until the shutdown token is cancelled.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting edgewatch units");

        let streams = self.streams.clone();
        for stream in streams {
            if self.mode.runs_ingest() {
                let component = UnitKind::Ingest.component(&stream.name);
                self.component_states
                    .set(&component, ComponentState::Starting)
                    .await;

                let mut engine = IngestEngine::new(
                    stream.clone(),
                    self.config.ingest.clone(),
                    self.bus.clone(),
                    Arc::clone(&self.opener),
                );
                let token = self.cancellation_token.clone();
                let states = self.component_states.clone();

                self.units.spawn(async move {
                    states.set(&component, ComponentState::Running).await;
                    match engine.run(token).await {
                        Ok(()) => {
                            states.set(&component, ComponentState::Stopped).await;
                            (component, Ok(()))
                        }
                        Err(e) => {
                            error!("Unit {} failed: {}", component, e);
                            states.set(&component, ComponentState::Failed).await;
                            (component, Err(e.into()))
                        }
                    }
                });
            }

            if self.mode.runs_pipeline() {
                let component = UnitKind::Pipeline.component(&stream.name);
                self.component_states
                    .set(&component, ComponentState::Starting)
                    .await;

                let mut pipeline = StreamPipeline::new(
                    stream.clone(),
                    self.config.annotation.clone(),
                    self.bus.clone(),
                    Arc::clone(&self.detector),
                    Arc::clone(&self.annotator),
                );
                let token = self.cancellation_token.clone();
                let states = self.component_states.clone();

                self.units.spawn(async move {
                    states.set(&component, ComponentState::Running).await;
                    pipeline.run(token).await;
                    states.set(&component, ComponentState::Stopped).await;
                    (component, Ok(()))
                });
            }
        }

        info!("Started {} unit(s)", self.units.len());
        Ok(())
    }
}
