//! Error types shared by the analyzer and the runtime controller.
//!
//! None of these ever escape the build hook: `Transformer::transform` logs and
//! degrades to "unchanged", and the controller logs widget/storage failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to parse {file}: {}", .messages.join("; "))]
    Parse { file: String, messages: Vec<String> },

    #[error("invalid plugin options: {0}")]
    Config(#[from] serde_json::Error),
}

/// Raised by the external widget library when a control refuses teardown.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("widget error: {0}")]
pub struct WidgetError(pub String);

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("corrupt persisted value under \"{key}\": {source}")]
    CorruptState {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
