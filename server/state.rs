use std::sync::Arc;

use malaria_cam::{Classifier, Network, ServerConfig};

/// Read-only state shared by all request threads.
pub struct AppState {
    pub config: ServerConfig,
    /// `None` when the model file could not be loaded at startup.
    pub model: Option<Network>,
    labels: Vec<String>,
}

impl AppState {
    pub fn new(config: ServerConfig, model: Option<Network>) -> Self {
        let labels = model.as_ref().map(Network::labels).unwrap_or_default();
        AppState { config, model, labels }
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn input_description(&self) -> Option<String> {
        self.model.as_ref().map(|m| format!("{} ({} classes)", m.input_shape(), m.num_classes()))
    }
}

/// `Arc<AppState>` handed to every handler.
pub type SharedState = Arc<AppState>;
