use pylayer_common::error::EngineError;
use pyo3::prelude::*;
use thiserror::Error;

pub type PyLayerResult<T> = Result<T, PyLayerError>;

#[derive(Debug, Error)]
pub enum PyLayerError {
    /// The layer definition is unusable (missing data specification,
    /// unresolvable interpreter handle, bad namespace).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The scripting environment could not be brought up.
    #[error("interpreter initialization failed: {0}")]
    Initialization(String),
    /// A callback procedure raised; carries the interpreter diagnostic.
    #[error("error in {procedure}: {message}")]
    Script { procedure: String, message: String },
    /// A callback returned a value that violates its contract.
    #[error("contract violation: {0}")]
    Contract(String),
    /// A stray interpreter error outside any callback.
    #[error("error in Python: {0}")]
    Python(#[from] PyErr),
    /// An adapter invariant was violated; not a user error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PyLayerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PyLayerError::Configuration(message.into())
    }

    pub fn contract(message: impl Into<String>) -> Self {
        PyLayerError::Contract(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PyLayerError::Internal(message.into())
    }
}

impl From<PyLayerError> for EngineError {
    fn from(error: PyLayerError) -> Self {
        match error {
            PyLayerError::Configuration(message) => EngineError::Configuration(message),
            PyLayerError::Internal(message) => EngineError::Internal(message),
            other => EngineError::Query(other.to_string()),
        }
    }
}

/// Wrap a callback failure, logging the interpreter traceback when the
/// layer is debugging.
pub(crate) fn script_error(py: Python<'_>, procedure: &str, err: PyErr, debug: i32) -> PyLayerError {
    if debug > 0 {
        if let Some(traceback) = err.traceback(py) {
            if let Ok(text) = traceback.format() {
                log::debug!("python traceback: {text}");
            }
        }
    }
    PyLayerError::Script {
        procedure: procedure.to_string(),
        message: err.to_string(),
    }
}
