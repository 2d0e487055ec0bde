//! Per-stage skip/run decision and fault-isolated execution.
//!
//! A [`StageDispatcher`] lives for exactly one orchestrator run. It owns the
//! set of stages executed during that run, so a stage satisfied earlier in
//! the run (directly or through a reference) is never executed twice.

use crate::config::AlgaeConfig;
use crate::error::{panic_message, OrchestratorError, Result};
use crate::helpers::{IndentedPrinter, PostprocessorHelpers, PreprocessorHelpers, ProcessorHelpers};
use crate::job::{Job, StageKey, StageKind, StageSpec};
use crate::pipeline::{StageInput, StageRegistry};
use algae_storage::{Corpus, ProgressStore};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of dispatching one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Handler ran and returned success
    Completed,
    /// Already completed (progress ledger or earlier in this run)
    Skipped,
    /// Could not be loaded, returned false, errored or panicked
    Failed { reason: String },
}

impl StageOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }
}

/// One dispatched stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub kind: StageKind,
    /// Configured name (for a reference, the referencing stage's name)
    pub name: String,
    pub outcome: StageOutcome,
}

/// Runs stages for one orchestrator invocation
pub struct StageDispatcher<'a> {
    registry: &'a StageRegistry,
    config: &'a AlgaeConfig,
    progress: &'a dyn ProgressStore,
    students: &'a [algae_storage::StudentId],
    pre_helpers: PreprocessorHelpers,
    proc_helpers: ProcessorHelpers,
    post_helpers: PostprocessorHelpers,
    force: bool,
    executed: HashSet<StageKey>,
    printer: IndentedPrinter,
}

impl<'a> StageDispatcher<'a> {
    pub fn new(
        registry: &'a StageRegistry,
        config: &'a AlgaeConfig,
        corpus: &'a Arc<Corpus>,
        progress: &'a dyn ProgressStore,
        force: bool,
    ) -> Self {
        Self {
            registry,
            config,
            progress,
            students: corpus.students(),
            pre_helpers: PreprocessorHelpers::new(corpus.clone()),
            proc_helpers: ProcessorHelpers::new(corpus.clone()),
            post_helpers: PostprocessorHelpers::new(corpus.clone()),
            force,
            executed: HashSet::new(),
            printer: IndentedPrinter::new(1),
        }
    }

    /// Stages executed so far in this run
    pub fn executed(&self) -> &HashSet<StageKey> {
        &self.executed
    }

    /// Dispatch every stage of `kind` for `job`, in declaration order,
    /// stopping after the first failure
    pub fn run_stages(&mut self, job: &'a Job, kind: StageKind) -> Vec<StageReport> {
        let specs: Vec<&'a StageSpec> = match kind {
            StageKind::Preprocess => job.preprocessors.iter().collect(),
            StageKind::Process => vec![&job.processor],
            StageKind::Postprocess => job.postprocessors.iter().collect(),
        };

        let mut reports = Vec::with_capacity(specs.len());
        for spec in specs {
            let outcome = self.dispatch(job, kind, spec);
            let failed = outcome.is_failure();
            reports.push(StageReport {
                kind,
                name: spec.name.clone(),
                outcome,
            });
            if failed {
                break;
            }
        }
        reports
    }

    fn dispatch(&mut self, job: &'a Job, kind: StageKind, spec: &'a StageSpec) -> StageOutcome {
        self.printer.print(&format!("running {} '{}'...", kind, spec.name));

        let (owner, target) = match self.resolve(job, kind, spec) {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Job {}: {} '{}' could not be resolved: {}", job.name, kind, spec.name, e);
                self.printer.print("failed!");
                return StageOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let key = StageKey::new(&owner.name, kind, &target.name);

        if !self.should_run(&key) {
            debug!("Job {}: {} already completed", job.name, key);
            self.printer.print("already done!");
            return StageOutcome::Skipped;
        }

        info!("Job {}: running {}", job.name, key);
        let input = StageInput {
            job: &owner.name,
            students: self.students,
            assignments: &owner.assignments,
            args: &target.args,
        };

        let result = guarded(&key, || match kind {
            StageKind::Preprocess => self
                .registry
                .preprocessor(&target.name)?
                .run(input, &self.pre_helpers),
            StageKind::Process => self
                .registry
                .processor(&target.name)?
                .run(input, &self.proc_helpers),
            StageKind::Postprocess => self
                .registry
                .postprocessor(&target.name)?
                .run(input, &self.post_helpers),
        })
        .and_then(|()| self.record(&key, true));

        match result {
            Ok(()) => {
                info!("Job {}: {} completed", job.name, key);
                self.executed.insert(key);
                self.printer.print("complete!");
                StageOutcome::Completed
            }
            Err(e) => {
                if e.is_load_failure() {
                    error!("Job {}: {} could not be loaded: {}", job.name, key, e);
                } else {
                    error!("Job {}: {} failed: {}", job.name, key, e);
                }
                if let Err(record_err) = self.record(&key, false) {
                    error!("Job {}: could not record failure of {}: {}", job.name, key, record_err);
                }
                self.printer.print("failed!");
                StageOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Follow a preprocessor reference one level: the stage runs, and is
    /// tracked, as the referenced job's stage.
    ///
    /// The returned job is the referenced one, so the handler receives that
    /// job's assignments and the referenced stage's args, not the
    /// referencing job's. Its output lands under the referenced job's
    /// assignment names and is shared by every job that references it.
    fn resolve(
        &self,
        job: &'a Job,
        kind: StageKind,
        spec: &'a StageSpec,
    ) -> Result<(&'a Job, &'a StageSpec)> {
        let Some(reference) = &spec.reference else {
            return Ok((job, spec));
        };

        if kind != StageKind::Preprocess {
            return Err(OrchestratorError::config(format!(
                "Job '{}': only preprocessors may reference another job's stage ('{}')",
                job.name, spec.name
            )));
        }

        let target_job = self.config.job(&reference.job).ok_or_else(|| {
            OrchestratorError::StageNotFound(format!(
                "'{}' references unknown job '{}'",
                spec.name, reference.job
            ))
        })?;

        let target = target_job.preprocessor(&reference.stage).ok_or_else(|| {
            OrchestratorError::StageNotFound(format!(
                "'{}' references '{}:{}', which is not declared",
                spec.name, reference.job, reference.stage
            ))
        })?;

        if let Some(next) = &target.reference {
            return Err(OrchestratorError::ReferenceChain(format!(
                "{}:{} -> {}:{} -> {}:{}",
                job.name, spec.name, reference.job, reference.stage, next.job, next.stage
            )));
        }

        Ok((target_job, target))
    }

    fn should_run(&self, key: &StageKey) -> bool {
        if self.executed.contains(key) {
            return false;
        }
        self.force || !self.query(key)
    }

    fn query(&self, key: &StageKey) -> bool {
        match key.kind {
            StageKind::Preprocess => self.progress.query_pre(&key.job, &key.name),
            StageKind::Process => self.progress.query_process(&key.job),
            StageKind::Postprocess => self.progress.query_post(&key.job, &key.name),
        }
    }

    fn record(&self, key: &StageKey, success: bool) -> Result<()> {
        match key.kind {
            StageKind::Preprocess => self.progress.update_pre(&key.job, &key.name, success)?,
            StageKind::Process => self.progress.update_process(&key.job, success)?,
            StageKind::Postprocess => self.progress.update_post(&key.job, &key.name, success)?,
        }
        Ok(())
    }
}

/// Invoke a handler with panics caught; `Ok(false)` becomes an error so that
/// every failure carries a reason
fn guarded(key: &StageKey, invoke: impl FnOnce() -> Result<bool>) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(invoke)) {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(OrchestratorError::StageExecutionFailed(format!(
            "{} reported failure",
            key
        ))),
        Ok(Err(e)) => Err(e),
        Err(panic) => Err(OrchestratorError::StagePanicked(format!(
            "{}: {}",
            key,
            panic_message(&*panic)
        ))),
    }
}
