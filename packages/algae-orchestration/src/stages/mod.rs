// Built-in stage implementations
pub mod comparison;
pub mod distance;
pub mod identity;

// Re-exports
pub use comparison::{enumerate_pairs, ComparisonEngine, PairResult, PairResultSet, WorkerReport};
pub use distance::{DistanceMetric, ExternalDistance, DEFAULT_DISTANCE_COMMAND};
pub use identity::IdentityPreprocessor;

use crate::error::{OrchestratorError, Result};
use crate::job::Assignment;
use serde::Deserialize;

/// One comparable unit of an assignment (`entries[*]` in assignment args)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Entry {
    pub sources: Vec<String>,
}

impl Entry {
    /// First source names the entry and its artifacts
    pub fn primary_source(&self) -> &str {
        // non-empty, checked by `entries`
        &self.sources[0]
    }
}

/// Parse `entries` from an assignment's args. No `entries` key means none.
pub fn entries(assignment: &Assignment) -> Result<Vec<Entry>> {
    let Some(value) = assignment.args.get("entries") else {
        return Ok(Vec::new());
    };

    let entries: Vec<Entry> = serde_json::from_value(value.clone()).map_err(|e| {
        OrchestratorError::invalid_argument(
            "entries",
            format!("assignment '{}': {}", assignment.name, e),
        )
    })?;

    if let Some(index) = entries.iter().position(|e| e.sources.is_empty()) {
        return Err(OrchestratorError::invalid_argument(
            "entries",
            format!("assignment '{}': entry {} has no sources", assignment.name, index),
        ));
    }

    Ok(entries)
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`
pub fn make_filename_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_make_filename_safe() {
        assert_eq!(make_filename_safe("src/main.c"), "src_main.c");
        assert_eq!(make_filename_safe("a b:c"), "a_b_c");
        assert_eq!(make_filename_safe("ok-name_1.txt"), "ok-name_1.txt");
        assert_eq!(make_filename_safe("../x"), ".._x");
    }

    #[test]
    fn test_entries_parsing() {
        let assignment = Assignment::new(
            "hw1",
            json!({ "entries": [
                { "sources": ["main.c", "util.c"] },
                { "sources": ["list.c"] }
            ] }),
        );
        let entries = entries(&assignment).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].primary_source(), "main.c");
        assert_eq!(entries[1].primary_source(), "list.c");
    }

    #[test]
    fn test_entries_missing_is_empty() {
        let assignment = Assignment::new("hw1", json!({ "allowPartners": true }));
        assert!(entries(&assignment).unwrap().is_empty());
    }

    #[test]
    fn test_entries_rejects_empty_sources() {
        let assignment = Assignment::new("hw1", json!({ "entries": [ { "sources": [] } ] }));
        let err = entries(&assignment).unwrap_err();
        assert!(err.to_string().contains("entry 0 has no sources"));
    }

    #[test]
    fn test_entries_rejects_malformed() {
        let assignment = Assignment::new("hw1", json!({ "entries": "main.c" }));
        assert!(matches!(
            entries(&assignment).unwrap_err(),
            OrchestratorError::InvalidArgument { .. }
        ));
    }
}
