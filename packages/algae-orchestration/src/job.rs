use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};

/// Opaque, stage-specific argument mapping
pub type StageArgs = serde_json::Map<String, serde_json::Value>;

/// Pipeline phase. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageKind {
    Preprocess,
    Process,
    Postprocess,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [
        StageKind::Preprocess,
        StageKind::Process,
        StageKind::Postprocess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Preprocess => "preprocessor",
            StageKind::Process => "processor",
            StageKind::Postprocess => "postprocessor",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which stage kinds a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageMask {
    #[default]
    All,
    Preprocess,
    Process,
    Postprocess,
}

impl StageMask {
    pub fn enables(&self, kind: StageKind) -> bool {
        match self {
            StageMask::All => true,
            StageMask::Preprocess => kind == StageKind::Preprocess,
            StageMask::Process => kind == StageKind::Process,
            StageMask::Postprocess => kind == StageKind::Postprocess,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageMask::All => "all",
            StageMask::Preprocess => "preprocess",
            StageMask::Process => "process",
            StageMask::Postprocess => "postprocess",
        }
    }
}

impl std::str::FromStr for StageMask {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(StageMask::All),
            "preprocess" => Ok(StageMask::Preprocess),
            "process" => Ok(StageMask::Process),
            "postprocess" => Ok(StageMask::Postprocess),
            _ => Err(OrchestratorError::config(format!(
                "Invalid stage mask '{}': expected all, preprocess, process or postprocess",
                s
            ))),
        }
    }
}

impl std::fmt::Display for StageMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of one stage of one job, as recorded in progress and in the
/// per-run executed set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageKey {
    pub job: String,
    pub kind: StageKind,
    pub name: String,
}

impl StageKey {
    pub fn new(job: impl Into<String>, kind: StageKind, name: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            kind,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.job, self.kind, self.name)
    }
}

/// "This stage is satisfied by `job`'s stage `stage`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageReference {
    pub job: String,
    pub stage: String,
}

/// One configured stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub name: String,
    #[serde(default)]
    pub args: StageArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<StageReference>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: StageArgs::new(),
            reference: None,
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = args {
            self.args = map;
        }
        self
    }

    pub fn referencing(mut self, job: impl Into<String>, stage: impl Into<String>) -> Self {
        self.reference = Some(StageReference {
            job: job.into(),
            stage: stage.into(),
        });
        self
    }
}

/// Assignment with its stage-specific arguments (entries, partner flag, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Assignment {
    pub name: String,
    #[serde(default)]
    pub args: StageArgs,
}

impl Assignment {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        let args = match args {
            serde_json::Value::Object(map) => map,
            _ => StageArgs::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Job model. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    pub name: String,
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub preprocessors: Vec<StageSpec>,
    pub processor: StageSpec,
    #[serde(default)]
    pub postprocessors: Vec<StageSpec>,
}

impl Job {
    pub fn new(name: impl Into<String>, processor: StageSpec) -> Self {
        Self {
            name: name.into(),
            assignments: Vec::new(),
            preprocessors: Vec::new(),
            processor,
            postprocessors: Vec::new(),
        }
    }

    pub fn with_assignment(mut self, assignment: Assignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    pub fn with_preprocessor(mut self, spec: StageSpec) -> Self {
        self.preprocessors.push(spec);
        self
    }

    pub fn with_postprocessor(mut self, spec: StageSpec) -> Self {
        self.postprocessors.push(spec);
        self
    }

    pub fn preprocessor(&self, name: &str) -> Option<&StageSpec> {
        self.preprocessors.iter().find(|p| p.name == name)
    }
}
