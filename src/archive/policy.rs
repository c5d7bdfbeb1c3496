//! Which entries of a directory tree go into the archive

use std::path::Path;

/// Suffixes of editor and scratch files
pub const TEMP_SUFFIXES: [&str; 5] = [".tmp", ".temp", ".swp", ".bak", "~"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// A previous archive (`*.zip`)
    Archive,
    /// Dot-prefixed name
    Hidden,
    /// Editor or scratch file
    Temporary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Include,
    Exclude(Reason),
}

impl Decision {
    pub fn is_excluded(self) -> bool {
        matches!(self, Decision::Exclude(_))
    }
}

/// Entries are judged by their final path component only
#[derive(Debug, Clone, Copy)]
pub struct ExclusionPolicy {
    /// Skip dot-directories (and everything below them)
    pub exclude_hidden: bool,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self {
            exclude_hidden: true,
        }
    }
}

fn final_component(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl ExclusionPolicy {
    pub fn judge_file(&self, path: &Path) -> Decision {
        let name = final_component(path);

        if name.to_lowercase().ends_with(".zip") {
            Decision::Exclude(Reason::Archive)
        } else if name.starts_with('.') {
            Decision::Exclude(Reason::Hidden)
        } else if TEMP_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            Decision::Exclude(Reason::Temporary)
        } else {
            Decision::Include
        }
    }

    pub fn judge_dir(&self, path: &Path) -> Decision {
        if self.exclude_hidden && final_component(path).starts_with('.') {
            Decision::Exclude(Reason::Hidden)
        } else {
            Decision::Include
        }
    }

    pub fn should_exclude(&self, path: &Path, is_dir: bool) -> bool {
        let decision = if is_dir {
            self.judge_dir(path)
        } else {
            self.judge_file(path)
        };
        decision.is_excluded()
    }
}
