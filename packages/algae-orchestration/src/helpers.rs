//! Stage-kind-scoped corpus facades handed to stage handlers.
//!
//! Each facade only exposes the corpus operations legal for its lifecycle
//! stage: a preprocessor cannot write processed output, a postprocessor
//! cannot read raw submissions, and so on.

use crate::error::Result;
use algae_storage::Corpus;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Writes user-facing status lines indented by `depth` levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentedPrinter {
    depth: usize,
}

impl IndentedPrinter {
    pub const INDENT: &str = "  ";

    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    pub fn nested(&self) -> Self {
        Self::new(self.depth + 1)
    }

    pub fn format(&self, text: &str) -> String {
        let indent = Self::INDENT.repeat(self.depth);
        text.lines()
            .map(|line| format!("{}{}\n", indent, line))
            .collect()
    }

    pub fn print(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        // Status output is best effort; a closed stdout must not fail a stage
        let _ = stdout.write_all(self.format(text).as_bytes());
    }
}

/// Depth of the `printf` callback given to stage handlers
const STAGE_PRINT_DEPTH: usize = 2;

/// Helpers for preprocessors: raw submissions in, preprocessed out
#[derive(Debug, Clone)]
pub struct PreprocessorHelpers {
    corpus: Arc<Corpus>,
    printer: IndentedPrinter,
}

impl PreprocessorHelpers {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            printer: IndentedPrinter::new(STAGE_PRINT_DEPTH),
        }
    }

    pub fn read_submission(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.corpus.read_submission(student, assignment, file)?)
    }

    pub fn read_preprocessed(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.corpus.read_preprocessed(student, assignment, file)?)
    }

    pub fn write_preprocessed(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
        data: &[u8],
    ) -> Result<()> {
        Ok(self.corpus.write_preprocessed(student, assignment, file, data)?)
    }

    pub fn assignment_path(&self, student: &str, assignment: &str) -> Result<PathBuf> {
        Ok(self.corpus.assignment_path(student, assignment)?)
    }

    pub fn semester(&self) -> &str {
        self.corpus.semester()
    }

    pub fn printf(&self, text: &str) {
        self.printer.print(text)
    }
}

/// Helpers for processors: raw + preprocessed in, processed/postprocessed out
#[derive(Debug, Clone)]
pub struct ProcessorHelpers {
    corpus: Arc<Corpus>,
    printer: IndentedPrinter,
}

impl ProcessorHelpers {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            printer: IndentedPrinter::new(STAGE_PRINT_DEPTH),
        }
    }

    pub fn read_submission(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.corpus.read_submission(student, assignment, file)?)
    }

    pub fn read_preprocessed(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.corpus.read_preprocessed(student, assignment, file)?)
    }

    pub fn write_processed(&self, assignment: &str, file: &str, data: &[u8]) -> Result<()> {
        Ok(self.corpus.write_processed(assignment, file, data)?)
    }

    pub fn write_postprocessed(&self, assignment: &str, file: &str, data: &[u8]) -> Result<()> {
        Ok(self.corpus.write_postprocessed(assignment, file, data)?)
    }

    pub fn assignment_path(&self, student: &str, assignment: &str) -> Result<PathBuf> {
        Ok(self.corpus.assignment_path(student, assignment)?)
    }

    /// Path of a student's preprocessed artifact, `None` if it was never written
    pub fn preprocessed_path(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
    ) -> Result<Option<PathBuf>> {
        Ok(self.corpus.preprocessed_path(student, assignment, file)?)
    }

    pub fn semester(&self) -> &str {
        self.corpus.semester()
    }

    pub fn printf(&self, text: &str) {
        self.printer.print(text)
    }
}

/// Helpers for postprocessors: processed + postprocessed in, postprocessed out
#[derive(Debug, Clone)]
pub struct PostprocessorHelpers {
    corpus: Arc<Corpus>,
    printer: IndentedPrinter,
}

impl PostprocessorHelpers {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            printer: IndentedPrinter::new(STAGE_PRINT_DEPTH),
        }
    }

    pub fn read_processed(&self, assignment: &str, file: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.corpus.read_processed(assignment, file)?)
    }

    pub fn read_postprocessed(&self, assignment: &str, file: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.corpus.read_postprocessed(assignment, file)?)
    }

    pub fn write_postprocessed(&self, assignment: &str, file: &str, data: &[u8]) -> Result<()> {
        Ok(self.corpus.write_postprocessed(assignment, file, data)?)
    }

    pub fn semester(&self) -> &str {
        self.corpus.semester()
    }

    pub fn printf(&self, text: &str) {
        self.printer.print(text)
    }
}
