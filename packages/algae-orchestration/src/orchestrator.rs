use crate::config::AlgaeConfig;
use crate::dispatcher::{StageDispatcher, StageReport};
use crate::error::{OrchestratorError, Result};
use crate::helpers::IndentedPrinter;
use crate::job::{Job, StageKind, StageMask};
use crate::pipeline::StageRegistry;
use algae_storage::{Corpus, JsonProgressStore, ProgressStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Run-wide switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Wipe every derived artifact and the progress ledger first
    pub clean: bool,
    /// Ignore the progress ledger (not the in-run executed set)
    pub force: bool,
}

/// What to run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub jobs: Vec<String>,
    pub mask: StageMask,
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new<I, S>(jobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            jobs: jobs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_mask(mut self, mask: StageMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed,
    /// Name not present in the configuration
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: String,
    pub status: JobStatus,
    /// Dispatched stages; stages cut off by an earlier failure are absent
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    /// True iff every requested job resolved and succeeded
    pub fn succeeded(&self) -> bool {
        self.jobs.iter().all(|job| job.status == JobStatus::Succeeded)
    }

    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|job| job.job == name)
    }
}

/// Sequences the stages of each requested job
pub struct JobOrchestrator {
    config: AlgaeConfig,
    registry: StageRegistry,
    corpus: Arc<Corpus>,
    progress: Arc<dyn ProgressStore>,
}

impl JobOrchestrator {
    pub fn new(
        config: AlgaeConfig,
        registry: StageRegistry,
        corpus: Corpus,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            config,
            registry,
            corpus: Arc::new(corpus),
            progress,
        }
    }

    /// Open the corpus and the JSON progress ledger named by `config`
    pub fn from_config(config: AlgaeConfig, registry: StageRegistry) -> Result<Self> {
        let corpus = Corpus::open(&config.corpus_root, &config.semester)?;
        let progress = JsonProgressStore::open(&config.progress_path)?;
        Ok(Self::new(config, registry, corpus, Arc::new(progress)))
    }

    pub fn config(&self) -> &AlgaeConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn progress(&self) -> &dyn ProgressStore {
        self.progress.as_ref()
    }

    /// Run the requested jobs.
    ///
    /// Returns `Err` only when `clean` fails; stage and job failures are in
    /// the report.
    pub fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let start = Instant::now();
        let printer = IndentedPrinter::new(0);

        // Resolve every name before doing any work
        let resolved: Vec<(&str, Option<&Job>)> = request
            .jobs
            .iter()
            .map(|name| {
                let job = self.config.job(name);
                if job.is_none() {
                    error!("{}", OrchestratorError::JobNotFound(name.clone()));
                }
                (name.as_str(), job)
            })
            .collect();

        if request.options.clean {
            self.clean()?;
        }

        let mut dispatcher = StageDispatcher::new(
            &self.registry,
            &self.config,
            &self.corpus,
            self.progress.as_ref(),
            request.options.force,
        );

        let mut report = RunReport::default();
        for (name, job) in resolved {
            let Some(job) = job else {
                printer.print(&format!("Job '{}' is not configured, skipping.\n", name));
                report.jobs.push(JobReport {
                    job: name.to_string(),
                    status: JobStatus::Unresolved,
                    stages: Vec::new(),
                });
                continue;
            };

            printer.print(&format!("Running job '{}'...", job.name));
            info!("Job {}: starting (mode {:?})", job.name, request.mask);

            let mut stages = Vec::new();
            let mut success = true;
            for kind in StageKind::ALL {
                if !request.mask.enables(kind) {
                    continue;
                }
                let reports = dispatcher.run_stages(job, kind);
                success = !reports.iter().any(|r| r.outcome.is_failure());
                stages.extend(reports);
                if !success {
                    warn!("Job {}: {} stage failed, skipping later stages", job.name, kind);
                    break;
                }
            }

            let status = if success {
                printer.print("Job completed successfully!\n");
                JobStatus::Succeeded
            } else {
                printer.print("Job failed. :(\n");
                JobStatus::Failed
            };
            info!("Job {}: {:?}", job.name, status);

            report.jobs.push(JobReport {
                job: job.name.clone(),
                status,
                stages,
            });
        }

        info!(
            "Run finished in {:?}: {}/{} job(s) succeeded",
            start.elapsed(),
            report
                .jobs
                .iter()
                .filter(|j| j.status == JobStatus::Succeeded)
                .count(),
            report.jobs.len()
        );

        Ok(report)
    }

    /// Remove every preprocessed, processed and postprocessed artifact of
    /// every configured job and reset the progress ledger. Submissions are
    /// left untouched.
    pub fn clean(&self) -> Result<()> {
        let printer = IndentedPrinter::new(0);
        printer.print("Cleaning up corpus...");

        for job in &self.config.jobs {
            for assignment in &job.assignments {
                for student in self.corpus.students() {
                    self.corpus.clean_preprocessed(student, &assignment.name)?;
                }
                self.corpus.clean_processed(&assignment.name)?;
                self.corpus.clean_postprocessed(&assignment.name)?;
            }
        }
        self.progress.reset()?;

        info!("Cleaned derived artifacts of {} job(s)", self.config.jobs.len());
        printer.print("done!\n");
        Ok(())
    }
}
