//! Zip archiving of a working directory
//!
//! [`ExclusionPolicy`] decides per entry, [`TreeWalker`] walks and writes.

mod policy;
mod walker;

pub use policy::{Decision, ExclusionPolicy, Reason, TEMP_SUFFIXES};
pub use walker::{
    ArchiveReport, Preview, TreeWalker, WalkSummary, archive_path, default_archive_name, preview,
};

use std::path::PathBuf;
use thiserror::Error;
use zip::result::ZipError;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Cannot create archive {}: {source}", path.display())]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed writing '{entry}' to archive: {source}")]
    Write { entry: String, source: ZipError },

    #[error("Failed to finalise archive: {0}")]
    Finish(#[source] ZipError),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
