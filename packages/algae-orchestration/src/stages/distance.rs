//! Pairwise distance computation used by the comparison engine.

use crate::error::{OrchestratorError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Command used when a job does not set `distanceCommand`
pub const DEFAULT_DISTANCE_COMMAND: &str = "./processors/bin/distance";

/// Blocking distance between two artifacts
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, left: &Path, right: &Path) -> Result<u64>;
}

/// Runs `<program> <left> <right>` and reads one non-negative integer from stdout
#[derive(Debug, Clone)]
pub struct ExternalDistance {
    program: PathBuf,
}

impl ExternalDistance {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for ExternalDistance {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_COMMAND)
    }
}

impl DistanceMetric for ExternalDistance {
    fn distance(&self, left: &Path, right: &Path) -> Result<u64> {
        debug!(
            "Running {} {} {}",
            self.program.display(),
            left.display(),
            right.display()
        );

        let output = Command::new(&self.program)
            .arg(left)
            .arg(right)
            .output()
            .map_err(|e| {
                OrchestratorError::StageExecutionFailed(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(OrchestratorError::StageExecutionFailed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_distance(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_distance(stdout: &str) -> Result<u64> {
    let trimmed = stdout.trim();
    trimmed.parse::<u64>().map_err(|_| {
        OrchestratorError::StageExecutionFailed(format!(
            "distance output is not a non-negative integer: {:?}",
            trimmed
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_distance() {
        assert_eq!(parse_distance("42\n").unwrap(), 42);
        assert_eq!(parse_distance("  0 ").unwrap(), 0);
        assert!(parse_distance("-1").is_err());
        assert!(parse_distance("").is_err());
        assert!(parse_distance("12 apples").is_err());
    }

    #[test]
    fn test_missing_program_is_execution_failure() {
        let metric = ExternalDistance::new("/nonexistent/algae-distance");
        let err = metric
            .distance(Path::new("/tmp/a"), Path::new("/tmp/b"))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::StageExecutionFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_program_output_is_parsed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("distance");
        std::fs::write(&script, "#!/bin/sh\necho 7\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let metric = ExternalDistance::new(&script);
        assert_eq!(metric.distance(Path::new("a"), Path::new("b")).unwrap(), 7);
    }
}
