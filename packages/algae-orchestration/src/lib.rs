/*
 * Algae Orchestration - batch job engine for submission comparison
 *
 * Runs a preprocess -> process -> postprocess pipeline per job over a roster
 * of student submissions.
 *
 * Architecture:
 * - Progress ledger (skip stages completed by earlier invocations)
 * - Stage registry (name -> handler, per stage kind)
 * - Dispatcher (skip/run policy, references, fault isolation)
 * - Comparison engine (bounded worker pool, pairwise distances)
 *
 * Stages run sequentially; only the comparison engine fans out.
 */

// Public modules
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod helpers;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod stages;

// Re-exports
pub use config::AlgaeConfig;
pub use dispatcher::{StageDispatcher, StageOutcome, StageReport};
pub use error::{OrchestratorError, Result};
pub use helpers::{IndentedPrinter, PostprocessorHelpers, PreprocessorHelpers, ProcessorHelpers};
pub use job::{
    Assignment, Job, StageArgs, StageKey, StageKind, StageMask, StageReference, StageSpec,
};
pub use orchestrator::{JobOrchestrator, JobReport, JobStatus, RunOptions, RunReport, RunRequest};
pub use pipeline::{StageHandler, StageInput, StageRegistry};
pub use stages::{
    ComparisonEngine, DistanceMetric, ExternalDistance, IdentityPreprocessor, PairResult,
    PairResultSet,
};
