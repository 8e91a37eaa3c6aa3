pub mod classifier;
pub mod config;
pub mod error;
pub mod host;
pub mod model;
pub mod types;

pub use classifier::{BertClassifier, SequenceClassifier, MAX_SEQUENCE_LENGTH};
pub use config::{Config, ModelConfig};
pub use error::{ApiError, ModelError, ValidationError};
pub use host::{HubLoader, ModelHost, ModelLoader};
pub use types::{AnalysisRequest, AnalysisResult, AnalyzeResponse};

pub mod state;
pub use state::AppState;
pub mod api;
