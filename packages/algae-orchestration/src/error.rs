use algae_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Requested job is not in the configuration
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// No handler registered under the stage name, or a reference that
    /// points at a stage the referenced job does not declare
    #[error("Stage not found: {0}")]
    StageNotFound(String),

    /// Reference to a stage that is itself a reference
    #[error("Reference chain not supported: {0}")]
    ReferenceChain(String),

    /// Stage handler returned an error
    #[error("Stage execution failed: {0}")]
    StageExecutionFailed(String),

    /// Stage handler panicked
    #[error("Stage panicked: {0}")]
    StagePanicked(String),

    /// A comparison worker could not finish its entry
    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    /// Stage argument missing or of the wrong type
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported configuration version {found}. Supported versions: 1")]
    UnsupportedVersion { found: u32 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Load failure (the stage could not be resolved) as opposed to a
    /// failure raised while it ran
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            OrchestratorError::StageNotFound(_) | OrchestratorError::ReferenceChain(_)
        )
    }
}

/// Text of a caught panic payload
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }

    #[test]
    fn test_load_failure_classification() {
        assert!(OrchestratorError::StageNotFound("mted".into()).is_load_failure());
        assert!(OrchestratorError::ReferenceChain("a -> b -> c".into()).is_load_failure());
        assert!(!OrchestratorError::StagePanicked("boom".into()).is_load_failure());
        assert!(!OrchestratorError::StageExecutionFailed("x".into()).is_load_failure());
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = OrchestratorError::invalid_argument("sourceSuffix", "expected a string");
        assert_eq!(
            err.to_string(),
            "Invalid argument 'sourceSuffix': expected a string"
        );
    }

    #[test]
    fn test_storage_error_is_transparent() {
        let err: OrchestratorError = StorageError::invalid_path("..").into();
        assert!(err.to_string().starts_with("[invalid_path]"));
    }
}
