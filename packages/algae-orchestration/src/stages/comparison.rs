//! Pairwise comparison processor (`edit_distance`).
//!
//! One worker per (assignment, entry) runs on a bounded rayon pool. Each
//! worker walks every unordered pair of distinct students once, skips pairs
//! where either preprocessed artifact is missing, asks the [`DistanceMetric`]
//! for a score and writes its [`PairResultSet`] in a single terminal write.
//! Workers report back over a channel; the engine succeeds only if every
//! worker did.

use super::distance::{DistanceMetric, ExternalDistance, DEFAULT_DISTANCE_COMMAND};
use super::{entries, make_filename_safe, Entry};
use crate::error::{panic_message, OrchestratorError, Result};
use crate::helpers::ProcessorHelpers;
use crate::pipeline::{
    optional_bool, optional_str, optional_usize, required_str, StageHandler, StageInput,
};
use algae_storage::StudentId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::Instant;
use tracing::{debug, error, info};

/// Distance between two students' artifacts for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairResult {
    pub student_a: StudentId,
    pub student_b: StudentId,
    pub distance: u64,
}

/// All pair results of one (assignment, entry); written once per worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairResultSet {
    pub assignment: String,
    pub entry: String,
    pub allow_partners: bool,
    pub pairs: Vec<PairResult>,
}

/// What a worker sends back when it finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub assignment: String,
    pub entry: String,
    /// Number of pairs written, or why the worker failed
    pub outcome: std::result::Result<usize, String>,
}

/// `<safe(primary source)><resultsSuffix>`
fn output_file(entry: &Entry, results_suffix: &str) -> String {
    format!("{}{}", make_filename_safe(entry.primary_source()), results_suffix)
}

/// Index pairs `(i, j)` with `j < i`, in roster order
pub fn enumerate_pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(|i| (0..i).map(move |j| (i, j)))
}

struct ComparisonTask<'a> {
    assignment: &'a str,
    entry: Entry,
    allow_partners: bool,
}

/// Parameters shared by every worker of one run
struct WorkerContext<'a> {
    students: &'a [StudentId],
    helpers: &'a ProcessorHelpers,
    metric: &'a dyn DistanceMetric,
    source_suffix: &'a str,
    results_suffix: &'a str,
}

impl WorkerContext<'_> {
    fn compare(&self, task: &ComparisonTask<'_>) -> Result<usize> {
        let safe_source = make_filename_safe(task.entry.primary_source());
        let artifact = format!("{}{}", safe_source, self.source_suffix);

        let mut results = PairResultSet {
            assignment: task.assignment.to_string(),
            entry: task.entry.primary_source().to_string(),
            allow_partners: task.allow_partners,
            pairs: Vec::new(),
        };

        for (i, j) in enumerate_pairs(self.students.len()) {
            let student_a = &self.students[i];
            let student_b = &self.students[j];

            let left = self.helpers.preprocessed_path(student_a, task.assignment, &artifact)?;
            let right = self.helpers.preprocessed_path(student_b, task.assignment, &artifact)?;
            let (Some(left), Some(right)) = (left, right) else {
                continue;
            };

            let distance = self.metric.distance(&left, &right)?;
            results.pairs.push(PairResult {
                student_a: student_a.clone(),
                student_b: student_b.clone(),
                distance,
            });
        }

        let output = output_file(&task.entry, self.results_suffix);
        let data = serde_json::to_vec_pretty(&results)?;
        self.helpers.write_processed(task.assignment, &output, &data)?;

        self.helpers.printf(&format!(
            "Finished '{}/{}'!",
            task.assignment,
            task.entry.primary_source()
        ));
        Ok(results.pairs.len())
    }
}

/// Pairwise comparison processor
pub struct ComparisonEngine {
    /// `None`: build an [`ExternalDistance`] from the `distanceCommand` arg
    metric: Option<Arc<dyn DistanceMetric>>,
}

impl ComparisonEngine {
    pub const NAME: &'static str = "edit_distance";

    /// Engine that shells out to `distanceCommand` for every pair
    pub fn external() -> Self {
        Self { metric: None }
    }

    /// Engine with a fixed metric; `distanceCommand` is ignored
    pub fn with_metric(metric: Arc<dyn DistanceMetric>) -> Self {
        Self {
            metric: Some(metric),
        }
    }

    fn metric(&self, args: &crate::job::StageArgs) -> Result<Arc<dyn DistanceMetric>> {
        match &self.metric {
            Some(metric) => Ok(metric.clone()),
            None => {
                let command =
                    optional_str(args, "distanceCommand")?.unwrap_or(DEFAULT_DISTANCE_COMMAND);
                Ok(Arc::new(ExternalDistance::new(command)))
            }
        }
    }
}

impl std::fmt::Debug for ComparisonEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparisonEngine")
            .field("fixed_metric", &self.metric.is_some())
            .finish()
    }
}

impl StageHandler<ProcessorHelpers> for ComparisonEngine {
    fn run(&self, input: StageInput<'_>, helpers: &ProcessorHelpers) -> Result<bool> {
        let start = Instant::now();
        let source_suffix = required_str(input.args, "sourceSuffix")?;
        let results_suffix = required_str(input.args, "resultsSuffix")?;
        let max_workers = optional_usize(input.args, "maxWorkers")?
            .unwrap_or_else(num_cpus::get)
            .max(1);
        let metric = self.metric(input.args)?;

        let mut tasks = Vec::new();
        let mut outputs = HashSet::new();
        for assignment in input.assignments {
            let allow_partners =
                optional_bool(&assignment.args, "allowPartners")?.unwrap_or(false);
            helpers.printf(&format!("processing '{}' in parallel...", assignment.name));
            for entry in entries(assignment)? {
                // Each worker owns its output file
                let output = output_file(&entry, results_suffix);
                if !outputs.insert((assignment.name.as_str(), output.clone())) {
                    return Err(OrchestratorError::invalid_argument(
                        "entries",
                        format!(
                            "assignment '{}': more than one entry writes '{}'",
                            assignment.name, output
                        ),
                    ));
                }
                tasks.push(ComparisonTask {
                    assignment: &assignment.name,
                    entry,
                    allow_partners,
                });
            }
        }

        info!(
            "ComparisonEngine: {} worker(s) over {} students, pool size {}",
            tasks.len(),
            input.students.len(),
            max_workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("algae-compare-{}", i))
            .build()
            .map_err(|e| OrchestratorError::WorkerFailed(format!("worker pool: {}", e)))?;

        let context = WorkerContext {
            students: input.students,
            helpers,
            metric: metric.as_ref(),
            source_suffix,
            results_suffix,
        };

        let (tx, rx) = mpsc::channel();
        let tasks_ref = &tasks;
        let context_ref = &context;

        // Every task is spawned before the scope joins; the scope returns
        // only once all of them have finished
        pool.scope(move |scope| {
            for task in tasks_ref {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = catch_unwind(AssertUnwindSafe(|| context_ref.compare(task)))
                        .unwrap_or_else(|panic| {
                            Err(OrchestratorError::StagePanicked(panic_message(&*panic)))
                        })
                        .map_err(|e| e.to_string());

                    // The receiver outlives the scope
                    let _ = tx.send(WorkerReport {
                        assignment: task.assignment.to_string(),
                        entry: task.entry.primary_source().to_string(),
                        outcome,
                    });
                });
            }
        });

        let reports: Vec<WorkerReport> = rx.into_iter().collect();
        let mut failed = tasks.len().saturating_sub(reports.len());

        for report in &reports {
            match &report.outcome {
                Ok(pairs) => debug!(
                    "Worker {}/{} wrote {} pair(s)",
                    report.assignment, report.entry, pairs
                ),
                Err(reason) => {
                    failed += 1;
                    error!(
                        "{}",
                        OrchestratorError::WorkerFailed(format!(
                            "{}/{}: {}",
                            report.assignment, report.entry, reason
                        ))
                    );
                }
            }
        }

        info!(
            "ComparisonEngine: {}/{} worker(s) succeeded in {:?}",
            tasks.len() - failed.min(tasks.len()),
            tasks.len(),
            start.elapsed()
        );

        Ok(failed == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Assignment, StageArgs};
    use algae_storage::Corpus;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::path::Path;

    /// Distance = absolute difference of file lengths
    struct LengthDistance;

    impl DistanceMetric for LengthDistance {
        fn distance(&self, left: &Path, right: &Path) -> Result<u64> {
            let a = std::fs::metadata(left)?.len();
            let b = std::fs::metadata(right)?.len();
            Ok(a.abs_diff(b))
        }
    }

    struct FailingDistance;

    impl DistanceMetric for FailingDistance {
        fn distance(&self, _left: &Path, _right: &Path) -> Result<u64> {
            Err(OrchestratorError::StageExecutionFailed("distance exploded".into()))
        }
    }

    struct PanickingDistance;

    impl DistanceMetric for PanickingDistance {
        fn distance(&self, _left: &Path, _right: &Path) -> Result<u64> {
            panic!("distance binary vanished");
        }
    }

    fn setup(students: &[(&str, Option<&str>)]) -> (tempfile::TempDir, Arc<Corpus>) {
        let dir = tempfile::tempdir().unwrap();
        for (student, _) in students {
            std::fs::create_dir_all(dir.path().join("submissions").join(student).join("hw1"))
                .unwrap();
        }
        let corpus = Arc::new(Corpus::open(dir.path(), "fall").unwrap());
        for (student, content) in students {
            if let Some(content) = content {
                corpus
                    .write_preprocessed(student, "hw1", "main.c.txt", content.as_bytes())
                    .unwrap();
            }
        }
        (dir, corpus)
    }

    fn processor_args() -> StageArgs {
        match json!({ "sourceSuffix": ".txt", "resultsSuffix": ".json", "maxWorkers": 2 }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn assignments() -> Vec<Assignment> {
        vec![Assignment::new(
            "hw1",
            json!({ "entries": [ { "sources": ["main.c"] } ], "allowPartners": true }),
        )]
    }

    fn run(engine: &ComparisonEngine, corpus: &Arc<Corpus>) -> bool {
        let helpers = ProcessorHelpers::new(corpus.clone());
        let assignments = assignments();
        let args = processor_args();
        let input = StageInput {
            job: "hw1",
            students: corpus.students(),
            assignments: &assignments,
            args: &args,
        };
        engine.run(input, &helpers).unwrap()
    }

    fn read_results(corpus: &Corpus) -> PairResultSet {
        let data = corpus.read_processed("hw1", "main.c.json").unwrap().unwrap();
        serde_json::from_slice(&data).unwrap()
    }

    fn pair_set(results: &PairResultSet) -> HashSet<(String, String)> {
        results
            .pairs
            .iter()
            .map(|p| {
                let mut pair = [p.student_a.clone(), p.student_b.clone()];
                pair.sort();
                (pair[0].clone(), pair[1].clone())
            })
            .collect()
    }

    #[test]
    fn test_three_students_three_pairs() {
        let (_dir, corpus) = setup(&[("A", Some("a")), ("B", Some("bb")), ("C", Some("cccc"))]);
        let engine = ComparisonEngine::with_metric(Arc::new(LengthDistance));

        assert!(run(&engine, &corpus));

        let results = read_results(&corpus);
        assert_eq!(results.assignment, "hw1");
        assert_eq!(results.entry, "main.c");
        assert!(results.allow_partners);
        assert_eq!(results.pairs.len(), 3);
        assert_eq!(
            pair_set(&results),
            HashSet::from([
                ("A".to_string(), "B".to_string()),
                ("A".to_string(), "C".to_string()),
                ("B".to_string(), "C".to_string()),
            ])
        );
        // (students[i], students[j]) with j < i
        assert_eq!(
            results.pairs[0],
            PairResult {
                student_a: "B".into(),
                student_b: "A".into(),
                distance: 1
            }
        );
    }

    #[test]
    fn test_missing_artifact_skips_pairs_silently() {
        let (_dir, corpus) = setup(&[("A", Some("a")), ("B", None), ("C", Some("ccc"))]);
        let engine = ComparisonEngine::with_metric(Arc::new(LengthDistance));

        assert!(run(&engine, &corpus));

        let results = read_results(&corpus);
        assert_eq!(
            pair_set(&results),
            HashSet::from([("A".to_string(), "C".to_string())])
        );
        assert_eq!(results.pairs[0].distance, 2);
    }

    #[test]
    fn test_worker_failure_is_surfaced() {
        let (_dir, corpus) = setup(&[("A", Some("a")), ("B", Some("b"))]);
        let engine = ComparisonEngine::with_metric(Arc::new(FailingDistance));

        assert!(!run(&engine, &corpus));
        assert_eq!(corpus.read_processed("hw1", "main.c.json").unwrap(), None);
    }

    #[test]
    fn test_panicking_worker_is_surfaced() {
        let (_dir, corpus) = setup(&[("A", Some("a")), ("B", Some("b"))]);
        let engine = ComparisonEngine::with_metric(Arc::new(PanickingDistance));

        assert!(!run(&engine, &corpus));
        assert_eq!(corpus.read_processed("hw1", "main.c.json").unwrap(), None);
    }

    #[test]
    fn test_entries_sharing_an_output_file_are_rejected() {
        let (_dir, corpus) = setup(&[("A", Some("a")), ("B", Some("b"))]);
        let helpers = ProcessorHelpers::new(corpus.clone());
        let assignments = vec![Assignment::new(
            "hw1",
            json!({ "entries": [
                { "sources": ["main.c"] },
                { "sources": ["main.c", "util.c"] }
            ] }),
        )];
        let args = processor_args();
        let input = StageInput {
            job: "hw1",
            students: corpus.students(),
            assignments: &assignments,
            args: &args,
        };

        let engine = ComparisonEngine::with_metric(Arc::new(LengthDistance));
        let err = engine.run(input, &helpers).unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidArgument { .. }));
        assert!(err.to_string().contains("more than one entry writes 'main.c.json'"));
        assert_eq!(corpus.read_processed("hw1", "main.c.json").unwrap(), None);
    }

    #[test]
    fn test_sanitized_names_that_collide_are_rejected() {
        let (_dir, corpus) = setup(&[("A", Some("a"))]);
        let helpers = ProcessorHelpers::new(corpus.clone());
        let assignments = vec![Assignment::new(
            "hw1",
            json!({ "entries": [ { "sources": ["src/main.c"] }, { "sources": ["src_main.c"] } ] }),
        )];
        let args = processor_args();
        let input = StageInput {
            job: "hw1",
            students: corpus.students(),
            assignments: &assignments,
            args: &args,
        };

        let engine = ComparisonEngine::with_metric(Arc::new(LengthDistance));
        assert!(engine.run(input, &helpers).is_err());
    }

    #[test]
    fn test_missing_required_arg_is_error() {
        let (_dir, corpus) = setup(&[("A", Some("a"))]);
        let helpers = ProcessorHelpers::new(corpus.clone());
        let assignments = assignments();
        let args = StageArgs::new();
        let input = StageInput {
            job: "hw1",
            students: corpus.students(),
            assignments: &assignments,
            args: &args,
        };

        let err = ComparisonEngine::external().run(input, &helpers).unwrap_err();
        assert!(err.to_string().contains("sourceSuffix"));
    }

    proptest! {
        #[test]
        fn test_enumerate_pairs_covers_each_unordered_pair_once(n in 0usize..40) {
            let pairs: Vec<(usize, usize)> = enumerate_pairs(n).collect();
            prop_assert_eq!(pairs.len(), n * n.saturating_sub(1) / 2);

            let unique: HashSet<(usize, usize)> = pairs.iter().copied().collect();
            prop_assert_eq!(unique.len(), pairs.len());
            for (i, j) in pairs {
                prop_assert!(j < i && i < n);
            }
        }
    }
}
