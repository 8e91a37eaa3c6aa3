use crate::host::{ModelHost, ModelLoader};

/// Shared application state; the model itself loads lazily through `host`.
pub struct AppState {
    pub host: ModelHost,
}

impl AppState {
    pub fn new(loader: impl ModelLoader) -> Self {
        Self {
            host: ModelHost::new(loader),
        }
    }
}
