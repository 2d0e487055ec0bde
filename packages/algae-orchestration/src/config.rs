//! Configuration file loading (YAML)
//!
//! ```yaml
//! version: 1
//! semester: fall-2024
//! corpus: ./corpus
//! progress: ./algae.progress.json   # optional
//! jobs:
//!   - name: hw1
//!     assignments:
//!       - name: hw1
//!         args: { entries: [ { sources: [ "main.c" ] } ] }
//!     preprocessors:
//!       - name: identity
//!         args: { suffix: ".txt" }
//!     processor: { name: edit_distance, args: { sourceSuffix: ".txt", resultsSuffix: ".json" } }
//! ```
//!
//! Relative `corpus`/`progress` paths resolve against the config file's
//! directory. References between jobs are not checked here; an unresolvable
//! reference fails the stage that carries it when it is dispatched.

use crate::error::{OrchestratorError, Result};
use crate::job::Job;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const SUPPORTED_VERSION: u32 = 1;

/// YAML schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: u32,
    semester: String,
    corpus: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<PathBuf>,
    jobs: Vec<Job>,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct AlgaeConfig {
    pub semester: String,
    pub corpus_root: PathBuf,
    pub progress_path: PathBuf,
    pub jobs: Vec<Job>,
}

impl AlgaeConfig {
    /// Build a configuration in code (tests, embedding)
    pub fn new(
        semester: impl Into<String>,
        corpus_root: impl Into<PathBuf>,
        progress_path: impl Into<PathBuf>,
        jobs: Vec<Job>,
    ) -> Result<Self> {
        let config = Self {
            semester: semester.into(),
            corpus_root: corpus_root.into(),
            progress_path: progress_path.into(),
            jobs,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml_str(&content, base_dir, &default_progress_path(path))
    }

    fn from_yaml_str(content: &str, base_dir: &Path, default_progress: &Path) -> Result<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        if file.version != SUPPORTED_VERSION {
            return Err(OrchestratorError::UnsupportedVersion {
                found: file.version,
            });
        }

        let progress_path = match file.progress {
            Some(p) => base_dir.join(p),
            None => default_progress.to_path_buf(),
        };

        Self::new(
            file.semester,
            base_dir.join(file.corpus),
            progress_path,
            file.jobs,
        )
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(OrchestratorError::config("No jobs configured"));
        }

        let mut job_names = HashSet::new();
        for job in &self.jobs {
            if !job_names.insert(job.name.as_str()) {
                return Err(OrchestratorError::config(format!(
                    "Duplicate job name '{}'",
                    job.name
                )));
            }

            ensure_unique(&job.name, "preprocessor", job.preprocessors.iter().map(|s| &s.name))?;
            ensure_unique(&job.name, "postprocessor", job.postprocessors.iter().map(|s| &s.name))?;
            ensure_unique(&job.name, "assignment", job.assignments.iter().map(|a| &a.name))?;
        }

        Ok(())
    }
}

fn ensure_unique<'a>(
    job: &str,
    what: &str,
    names: impl Iterator<Item = &'a String>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(OrchestratorError::config(format!(
                "Job '{}' declares {} '{}' twice",
                job, what, name
            )));
        }
    }
    Ok(())
}

/// `algae.yaml` -> `algae.progress.json`, next to the config file
fn default_progress_path(config_path: &Path) -> PathBuf {
    config_path.with_extension("progress.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::StageSpec;
    use serde_json::json;
    use std::io::Write;

    const SAMPLE: &str = r#"
version: 1
semester: fall-2024
corpus: corpus
jobs:
  - name: hw1
    assignments:
      - name: hw1
        args:
          entries:
            - sources: [ "main.c" ]
          allowPartners: false
    preprocessors:
      - name: identity
        args: { suffix: ".txt" }
    processor:
      name: edit_distance
      args: { sourceSuffix: ".txt", resultsSuffix: ".json" }
  - name: hw1-again
    assignments:
      - name: hw1
    preprocessors:
      - name: identity
        reference: { job: hw1, stage: identity }
    processor:
      name: edit_distance
"#;

    fn load(content: &str) -> Result<AlgaeConfig> {
        AlgaeConfig::from_yaml_str(content, Path::new("/cfg"), Path::new("/cfg/p.json"))
    }

    #[test]
    fn test_yaml_loading() {
        let config = load(SAMPLE).unwrap();

        assert_eq!(config.semester, "fall-2024");
        assert_eq!(config.corpus_root, PathBuf::from("/cfg/corpus"));
        assert_eq!(config.progress_path, PathBuf::from("/cfg/p.json"));
        assert_eq!(config.jobs.len(), 2);

        let hw1 = config.job("hw1").unwrap();
        assert_eq!(hw1.processor.args["resultsSuffix"], json!(".json"));
        assert_eq!(
            hw1.assignments[0].args["entries"],
            json!([{ "sources": ["main.c"] }])
        );

        let again = config.job("hw1-again").unwrap();
        let reference = again.preprocessors[0].reference.as_ref().unwrap();
        assert_eq!(reference.job, "hw1");
        assert_eq!(reference.stage, "identity");
        assert!(again.postprocessors.is_empty());
    }

    #[test]
    fn test_yaml_from_file_defaults_progress_next_to_config() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AlgaeConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.progress_path, file.path().with_extension("progress.json"));
    }

    #[test]
    fn test_yaml_unsupported_version() {
        let result = load(&SAMPLE.replace("version: 1", "version: 2"));
        assert!(matches!(
            result.unwrap_err(),
            OrchestratorError::UnsupportedVersion { found: 2 }
        ));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let result = load(&SAMPLE.replace("semester: fall-2024", "semester: x\ncolor: blue"));
        assert!(matches!(result.unwrap_err(), OrchestratorError::Yaml(_)));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let jobs = vec![
            Job::new("hw1", StageSpec::new("edit_distance")),
            Job::new("hw1", StageSpec::new("edit_distance")),
        ];
        let err = AlgaeConfig::new("s", "/c", "/p", jobs).unwrap_err();
        assert!(err.to_string().contains("Duplicate job name 'hw1'"));
    }

    #[test]
    fn test_duplicate_preprocessor_rejected() {
        let job = Job::new("hw1", StageSpec::new("edit_distance"))
            .with_preprocessor(StageSpec::new("identity"))
            .with_preprocessor(StageSpec::new("identity"));
        let err = AlgaeConfig::new("s", "/c", "/p", vec![job]).unwrap_err();
        assert!(err.to_string().contains("preprocessor 'identity' twice"));
    }

    #[test]
    fn test_empty_jobs_rejected() {
        assert!(AlgaeConfig::new("s", "/c", "/p", vec![]).is_err());
    }

    #[test]
    fn test_dangling_reference_is_not_a_load_error() {
        let job = Job::new("hw1", StageSpec::new("edit_distance"))
            .with_preprocessor(StageSpec::new("identity").referencing("nope", "identity"));
        assert!(AlgaeConfig::new("s", "/c", "/p", vec![job]).is_ok());
    }
}
