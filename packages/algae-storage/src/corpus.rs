//! Corpus: raw submissions plus the derived artifacts of every stage.
//!
//! ```text
//! <root>/submissions/<student>/<assignment>/<file>     raw, never written
//! <root>/preprocessed/<student>/<assignment>/<file>
//! <root>/processed/<assignment>/<file>
//! <root>/postprocessed/<assignment>/<file>
//! ```
//!
//! Reads return `Ok(None)` when the artifact does not exist. Writes create
//! the parent directories.

use crate::error::{Result, StorageError};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

const SUBMISSIONS_DIR: &str = "submissions";
const PREPROCESSED_DIR: &str = "preprocessed";
const PROCESSED_DIR: &str = "processed";
const POSTPROCESSED_DIR: &str = "postprocessed";

/// Student identifier (directory name under `submissions/`)
pub type StudentId = String;

/// Corpus rooted at a directory
#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    semester: String,
    students: Vec<StudentId>,
}

impl Corpus {
    /// Open a corpus and read its roster.
    ///
    /// The roster is the sorted list of directories under `submissions/`.
    pub fn open(root: impl Into<PathBuf>, semester: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let submissions = root.join(SUBMISSIONS_DIR);

        if !submissions.is_dir() {
            return Err(StorageError::not_found(format!(
                "submissions directory {}",
                submissions.display()
            )));
        }

        let mut students = Vec::new();
        for entry in std::fs::read_dir(&submissions)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // Skip hidden directories
            if name.starts_with('.') {
                continue;
            }
            students.push(name);
        }
        students.sort();

        info!(
            "Corpus at {}: {} students",
            root.display(),
            students.len()
        );

        Ok(Self {
            root,
            semester: semester.into(),
            students,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Roster in stable (sorted) order
    pub fn students(&self) -> &[StudentId] {
        &self.students
    }

    pub fn semester(&self) -> &str {
        &self.semester
    }

    // ═══════════════════════════════════════════════════════════════════
    // Paths
    // ═══════════════════════════════════════════════════════════════════

    /// Directory holding one student's raw submission for an assignment
    pub fn assignment_path(&self, student: &str, assignment: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(SUBMISSIONS_DIR)
            .join(component(student)?)
            .join(component(assignment)?))
    }

    fn submission_file(&self, student: &str, assignment: &str, file: &str) -> Result<PathBuf> {
        Ok(self.assignment_path(student, assignment)?.join(relative_file(file)?))
    }

    fn preprocessed_dir(&self, student: &str, assignment: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(PREPROCESSED_DIR)
            .join(component(student)?)
            .join(component(assignment)?))
    }

    fn preprocessed_file(&self, student: &str, assignment: &str, file: &str) -> Result<PathBuf> {
        Ok(self.preprocessed_dir(student, assignment)?.join(component(file)?))
    }

    /// Path of a preprocessed artifact, only if it exists
    pub fn preprocessed_path(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
    ) -> Result<Option<PathBuf>> {
        let path = self.preprocessed_file(student, assignment, file)?;
        Ok(path.is_file().then_some(path))
    }

    /// Path a processed artifact is (or would be) written to
    pub fn processed_path(&self, assignment: &str, file: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(PROCESSED_DIR)
            .join(component(assignment)?)
            .join(component(file)?))
    }

    fn postprocessed_file(&self, assignment: &str, file: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(POSTPROCESSED_DIR)
            .join(component(assignment)?)
            .join(component(file)?))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reads / writes
    // ═══════════════════════════════════════════════════════════════════

    pub fn read_submission(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>> {
        read_optional(&self.submission_file(student, assignment, file)?)
    }

    pub fn read_preprocessed(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
    ) -> Result<Option<Vec<u8>>> {
        read_optional(&self.preprocessed_file(student, assignment, file)?)
    }

    pub fn write_preprocessed(
        &self,
        student: &str,
        assignment: &str,
        file: &str,
        data: &[u8],
    ) -> Result<()> {
        write_creating_dirs(&self.preprocessed_file(student, assignment, file)?, data)
    }

    pub fn read_processed(&self, assignment: &str, file: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&self.processed_path(assignment, file)?)
    }

    pub fn write_processed(&self, assignment: &str, file: &str, data: &[u8]) -> Result<()> {
        write_creating_dirs(&self.processed_path(assignment, file)?, data)
    }

    pub fn read_postprocessed(&self, assignment: &str, file: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&self.postprocessed_file(assignment, file)?)
    }

    pub fn write_postprocessed(&self, assignment: &str, file: &str, data: &[u8]) -> Result<()> {
        write_creating_dirs(&self.postprocessed_file(assignment, file)?, data)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Cleanup (derived artifacts only)
    // ═══════════════════════════════════════════════════════════════════

    pub fn clean_preprocessed(&self, student: &str, assignment: &str) -> Result<()> {
        remove_dir_if_exists(&self.preprocessed_dir(student, assignment)?)
    }

    pub fn clean_processed(&self, assignment: &str) -> Result<()> {
        remove_dir_if_exists(&self.root.join(PROCESSED_DIR).join(component(assignment)?))
    }

    pub fn clean_postprocessed(&self, assignment: &str) -> Result<()> {
        remove_dir_if_exists(&self.root.join(POSTPROCESSED_DIR).join(component(assignment)?))
    }
}

/// Validate a single path component (student, assignment or file name)
fn component(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(StorageError::invalid_path(name)),
    }
}

/// Validate a file path relative to a submission directory; nested
/// directories are allowed, `..` and absolute paths are not
fn relative_file(name: &str) -> Result<&str> {
    let path = Path::new(name);
    let all_normal = path.components().all(|c| matches!(c, Component::Normal(_)));
    if name.is_empty() || !all_normal {
        return Err(StorageError::invalid_path(name));
    }
    Ok(name)
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_creating_dirs(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
