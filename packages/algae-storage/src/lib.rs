//! Algae storage - persisted state of the batch engine
//!
//! ## Components
//!
//! - [`Corpus`]: raw submissions and the derived artifacts of every stage,
//!   laid out on the filesystem
//! - [`ProgressStore`]: boolean ledger of completed stages, durable across
//!   invocations ([`JsonProgressStore`]) or volatile ([`InMemoryProgressStore`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! use algae_storage::{Corpus, JsonProgressStore, ProgressStore};
//!
//! let corpus = Corpus::open("./corpus", "fall-2024")?;
//! let progress = JsonProgressStore::open("./algae.progress.json")?;
//!
//! if !progress.query_process("hw1") {
//!     corpus.write_processed("hw1", "main.c.json", b"[]")?;
//!     progress.update_process("hw1", true)?;
//! }
//! ```

pub mod corpus;
pub mod error;
pub mod progress;

pub use corpus::{Corpus, StudentId};
pub use error::{ErrorKind, Result, StorageError};
pub use progress::{
    InMemoryProgressStore, JsonProgressStore, ProgressRecord, ProgressStore, PROGRESS_VERSION,
};
