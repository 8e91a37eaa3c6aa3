use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ValidationError;

/// Probabilities strictly above this are reported as dark patterns.
pub const DARK_PATTERN_THRESHOLD: f32 = 0.5;

/// A validated `/analyze` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub text: String,
    /// Informational only, echoed back untouched.
    pub url: String,
}

impl AnalysisRequest {
    /// Validates a raw request: the content type must be JSON and the body must
    /// parse, then the object must carry a string `text`. An empty `text` is
    /// accepted.
    pub fn from_json(content_type: Option<&str>, body: &[u8]) -> Result<Self, ValidationError> {
        if !content_type.is_some_and(is_json_mime) {
            return Err(ValidationError::NotJson);
        }
        let value: Value = serde_json::from_slice(body).map_err(|_| ValidationError::NotJson)?;

        let Value::Object(mut fields) = value else {
            return Err(ValidationError::MissingText);
        };
        let text = match fields.remove("text") {
            Some(Value::String(text)) => text,
            _ => return Err(ValidationError::MissingText),
        };
        let url = match fields.remove("url") {
            Some(Value::String(url)) => url,
            _ => String::new(),
        };

        Ok(Self { text, url })
    }
}

/// `application/json` or any `application/*+json`, parameters ignored.
fn is_json_mime(content_type: &str) -> bool {
    let Ok(parsed) = content_type.parse::<mime::Mime>() else {
        return false;
    };

    parsed.type_() == mime::APPLICATION
        && (parsed.subtype() == mime::JSON
            || parsed.suffix().is_some_and(|name| name == mime::JSON))
}

/// Score for one piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub probability: f32,
    pub is_dark_pattern: bool,
    /// Mirrors `probability`; there is no separate calibration.
    pub confidence: f32,
}

impl AnalysisResult {
    pub fn from_probability(probability: f32) -> Self {
        Self {
            probability,
            is_dark_pattern: probability > DARK_PATTERN_THRESHOLD,
            confidence: probability,
        }
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "probability={:.4} dark_pattern={}",
            self.probability, self.is_dark_pattern
        )
    }
}

// for the extension to consume
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub text: String,
    pub url: String,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: "Internal server error".to_string(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Uninitialized,
    Loading,
    Ready,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: ModelStatus,
}
