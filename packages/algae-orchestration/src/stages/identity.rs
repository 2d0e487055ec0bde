use super::{entries, make_filename_safe};
use crate::error::Result;
use crate::helpers::PreprocessorHelpers;
use crate::pipeline::{optional_str, StageHandler, StageInput};
use tracing::debug;

/// Copies each entry source from the raw submission into the preprocessed
/// tree as `<safe(source)><suffix>`. Students without the file are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreprocessor;

impl IdentityPreprocessor {
    pub const NAME: &'static str = "identity";
}

impl StageHandler<PreprocessorHelpers> for IdentityPreprocessor {
    fn run(&self, input: StageInput<'_>, helpers: &PreprocessorHelpers) -> Result<bool> {
        let suffix = optional_str(input.args, "suffix")?.unwrap_or("");

        for assignment in input.assignments {
            let entries = entries(assignment)?;
            let mut copied = 0usize;

            for entry in &entries {
                for source in &entry.sources {
                    let target = format!("{}{}", make_filename_safe(source), suffix);
                    for student in input.students {
                        match helpers.read_submission(student, &assignment.name, source)? {
                            Some(data) => {
                                helpers.write_preprocessed(
                                    student,
                                    &assignment.name,
                                    &target,
                                    &data,
                                )?;
                                copied += 1;
                            }
                            None => debug!(
                                "{} has no '{}' for {}, skipping",
                                student, source, assignment.name
                            ),
                        }
                    }
                }
            }

            helpers.printf(&format!(
                "copied {} file(s) for '{}'",
                copied, assignment.name
            ));
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Assignment, StageArgs};
    use algae_storage::Corpus;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_identity_copies_present_sources() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("submissions/alice/hw1/src")).unwrap();
        std::fs::create_dir_all(root.join("submissions/bob/hw1")).unwrap();
        std::fs::write(root.join("submissions/alice/hw1/src/main.c"), "int main;").unwrap();

        let corpus = Arc::new(Corpus::open(root, "fall").unwrap());
        let helpers = PreprocessorHelpers::new(corpus.clone());
        let assignments = vec![Assignment::new(
            "hw1",
            json!({ "entries": [ { "sources": ["src/main.c"] } ] }),
        )];
        let mut args = StageArgs::new();
        args.insert("suffix".into(), json!(".txt"));

        let input = StageInput {
            job: "hw1",
            students: corpus.students(),
            assignments: &assignments,
            args: &args,
        };
        assert!(IdentityPreprocessor.run(input, &helpers).unwrap());

        assert_eq!(
            corpus.read_preprocessed("alice", "hw1", "src_main.c.txt").unwrap(),
            Some(b"int main;".to_vec())
        );
        assert_eq!(corpus.read_preprocessed("bob", "hw1", "src_main.c.txt").unwrap(), None);
    }
}
