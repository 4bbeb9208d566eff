use super::{ComponentState, EdgeOrchestrator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared table of unit states, updated by the units' tasks
#[derive(Debug, Clone, Default)]
pub struct ComponentStates {
    inner: Arc<Mutex<HashMap<String, ComponentState>>>,
}

impl ComponentStates {
    pub async fn set(&self, component: &str, state: ComponentState) {
        let mut states = self.inner.lock().await;
        states.insert(component.to_string(), state);
        debug!("Component '{}' state changed to: {:?}", component, state);
    }

    pub async fn get(&self, component: &str) -> Option<ComponentState> {
        self.inner.lock().await.get(component).copied()
    }

    pub async fn all(&self) -> HashMap<String, ComponentState> {
        self.inner.lock().await.clone()
    }
}

impl EdgeOrchestrator {
    /// Update component state
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        self.component_states.set(component, state).await;
    }

    /// Get component state
    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.get(component).await
    }

    /// Get all component states
    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.all().await
    }
}
