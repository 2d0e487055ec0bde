use crate::error::{OrchestratorError, Result};
use crate::helpers::{PostprocessorHelpers, PreprocessorHelpers, ProcessorHelpers};
use crate::job::{Assignment, StageArgs, StageKind};
use crate::stages::{ComparisonEngine, IdentityPreprocessor};
use algae_storage::StudentId;
use std::collections::HashMap;
use std::sync::Arc;

/// Stage input
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    /// Job whose configuration supplied `assignments` and `args`
    pub job: &'a str,
    /// Roster, in corpus order
    pub students: &'a [StudentId],
    pub assignments: &'a [Assignment],
    pub args: &'a StageArgs,
}

/// Stage handler trait (pluggable stages)
///
/// `H` is the helper facade for the stage kind the handler is registered
/// under. `Ok(false)` and `Err(_)` both mark the stage as failed; the error
/// only adds diagnostic detail.
pub trait StageHandler<H>: Send + Sync {
    fn run(&self, input: StageInput<'_>, helpers: &H) -> Result<bool>;
}

pub type Preprocessor = Arc<dyn StageHandler<PreprocessorHelpers>>;
pub type Processor = Arc<dyn StageHandler<ProcessorHelpers>>;
pub type Postprocessor = Arc<dyn StageHandler<PostprocessorHelpers>>;

/// Stage name -> handler, one table per stage kind
#[derive(Clone, Default)]
pub struct StageRegistry {
    preprocessors: HashMap<String, Preprocessor>,
    processors: HashMap<String, Processor>,
    postprocessors: HashMap<String, Postprocessor>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the stages shipped in this crate
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_preprocessor(IdentityPreprocessor::NAME, Arc::new(IdentityPreprocessor));
        registry.register_processor(ComparisonEngine::NAME, Arc::new(ComparisonEngine::external()));
        registry
    }

    pub fn register_preprocessor(&mut self, name: impl Into<String>, handler: Preprocessor) {
        self.preprocessors.insert(name.into(), handler);
    }

    pub fn register_processor(&mut self, name: impl Into<String>, handler: Processor) {
        self.processors.insert(name.into(), handler);
    }

    pub fn register_postprocessor(&mut self, name: impl Into<String>, handler: Postprocessor) {
        self.postprocessors.insert(name.into(), handler);
    }

    pub fn preprocessor(&self, name: &str) -> Result<Preprocessor> {
        self.preprocessors
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(StageKind::Preprocess, name))
    }

    pub fn processor(&self, name: &str) -> Result<Processor> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(StageKind::Process, name))
    }

    pub fn postprocessor(&self, name: &str) -> Result<Postprocessor> {
        self.postprocessors
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(StageKind::Postprocess, name))
    }

    pub fn contains(&self, kind: StageKind, name: &str) -> bool {
        match kind {
            StageKind::Preprocess => self.preprocessors.contains_key(name),
            StageKind::Process => self.processors.contains_key(name),
            StageKind::Postprocess => self.postprocessors.contains_key(name),
        }
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("preprocessors", &sorted_names(&self.preprocessors))
            .field("processors", &sorted_names(&self.processors))
            .field("postprocessors", &sorted_names(&self.postprocessors))
            .finish()
    }
}

fn sorted_names<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

fn not_found(kind: StageKind, name: &str) -> OrchestratorError {
    OrchestratorError::StageNotFound(format!("no {} registered as '{}'", kind, name))
}

/// Required string argument
pub fn required_str<'a>(args: &'a StageArgs, name: &str) -> Result<&'a str> {
    match args.get(name) {
        Some(value) => value
            .as_str()
            .ok_or_else(|| OrchestratorError::invalid_argument(name, "expected a string")),
        None => Err(OrchestratorError::invalid_argument(name, "missing")),
    }
}

pub fn optional_str<'a>(args: &'a StageArgs, name: &str) -> Result<Option<&'a str>> {
    match args.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| OrchestratorError::invalid_argument(name, "expected a string")),
    }
}

pub fn optional_bool(args: &StageArgs, name: &str) -> Result<Option<bool>> {
    match args.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| OrchestratorError::invalid_argument(name, "expected a boolean")),
    }
}

pub fn optional_usize(args: &StageArgs, name: &str) -> Result<Option<usize>> {
    match args.get(name) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| {
                OrchestratorError::invalid_argument(name, "expected a non-negative integer")
            }),
    }
}
