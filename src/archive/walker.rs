//! Depth-first directory walk into a deflated zip archive

use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::policy::{Decision, ExclusionPolicy};
use super::{ArchiveError, ArchiveResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub files_added: usize,
    pub folders_added: usize,
    pub files_skipped: usize,
    /// Files that could not be read; the walk carries on without them
    pub files_failed: usize,
}

/// Finished archive
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub summary: WalkSummary,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ArchiveReport {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Counts shown before the operator confirms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preview {
    pub total_items: usize,
    pub zip_files: usize,
}

impl Preview {
    /// Rough count of entries that will end up in the archive
    pub fn items_to_zip(&self) -> usize {
        self.total_items.saturating_sub(self.zip_files)
    }
}

/// Archive name used when none is given, e.g. `directory_backup_20240309_140507.zip`
pub fn default_archive_name(at: &DateTime<Local>) -> String {
    format!("directory_backup_{}.zip", at.format("%Y%m%d_%H%M%S"))
}

/// Append `.zip` unless the name already ends with it
pub fn archive_path(name: impl AsRef<Path>) -> PathBuf {
    let name = name.as_ref();
    let has_zip_extension = name
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

    if has_zip_extension {
        name.to_path_buf()
    } else {
        let mut with_extension = name.as_os_str().to_owned();
        with_extension.push(".zip");
        PathBuf::from(with_extension)
    }
}

/// Every entry below `root` and how many of them are zip files
pub fn preview(root: &Path) -> Preview {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .fold(Preview::default(), |mut preview, entry| {
            preview.total_items += 1;
            if entry.file_type().is_file()
                && entry.file_name().to_string_lossy().to_lowercase().ends_with(".zip")
            {
                preview.zip_files += 1;
            }
            preview
        })
}

/// Entry name inside the archive: relative path with `/` separators
fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

pub struct TreeWalker {
    policy: ExclusionPolicy,
}

impl TreeWalker {
    pub fn new(policy: ExclusionPolicy) -> Self {
        Self { policy }
    }

    /// Archive everything under `root` that the policy admits into `output`.
    pub fn build(&self, root: &Path, output: &Path) -> ArchiveResult<ArchiveReport> {
        let file = File::create(output).map_err(|source| ArchiveError::Create {
            path: output.to_path_buf(),
            source,
        })?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut summary = WalkSummary::default();

        info!("Archiving {} into {}", root.display(), output.display());

        let mut entries = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    summary.files_failed += 1;
                    continue;
                }
            };
            let Some(name) = entry_name(root, entry.path()) else {
                continue;
            };

            if entry.file_type().is_dir() {
                if let Decision::Exclude(reason) = self.policy.judge_dir(entry.path()) {
                    debug!("Skipping directory {} ({:?})", name, reason);
                    entries.skip_current_dir();
                    continue;
                }

                zip.add_directory(format!("{name}/"), options)
                    .map_err(|source| ArchiveError::Write {
                        entry: name.clone(),
                        source,
                    })?;
                summary.folders_added += 1;
                debug!("Added folder: {}/", name);
                continue;
            }

            if let Decision::Exclude(reason) = self.policy.judge_file(entry.path()) {
                debug!("Skipping {} ({:?})", name, reason);
                summary.files_skipped += 1;
                continue;
            }

            let mut source = match File::open(entry.path()) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Could not read {}: {}", name, e);
                    summary.files_failed += 1;
                    continue;
                }
            };

            zip.start_file(name.as_str(), options)
                .map_err(|source| ArchiveError::Write {
                    entry: name.clone(),
                    source,
                })?;

            if let Err(e) = io::copy(&mut source, &mut zip) {
                warn!("Could not read {}: {}", name, e);
                summary.files_failed += 1;
                zip.abort_file().map_err(|source| ArchiveError::Write {
                    entry: name.clone(),
                    source,
                })?;
                continue;
            }

            summary.files_added += 1;
            debug!("Added: {}", name);
        }

        zip.finish().map_err(ArchiveError::Finish)?;

        let size_bytes = fs::metadata(output).map(|m| m.len()).unwrap_or_default();
        let path = fs::canonicalize(output).unwrap_or_else(|_| output.to_path_buf());

        Ok(ArchiveReport {
            summary,
            path,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative.as_bytes()).unwrap();
    }

    #[test]
    fn zip_extension_is_appended_once() {
        assert_eq!(archive_path("backup"), PathBuf::from("backup.zip"));
        assert_eq!(archive_path("backup.zip"), PathBuf::from("backup.zip"));
        assert_eq!(archive_path("backup.ZIP"), PathBuf::from("backup.ZIP"));
        assert_eq!(archive_path("v1.2"), PathBuf::from("v1.2.zip"));
    }

    #[test]
    fn preview_counts_items_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "old.zip");
        touch(dir.path(), "sub/b.ZIP");

        let preview = preview(dir.path());
        assert_eq!(preview.total_items, 4);
        assert_eq!(preview.zip_files, 2);
        assert_eq!(preview.items_to_zip(), 2);
    }

    #[test]
    fn default_name_is_timestamped() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            default_archive_name(&at),
            "directory_backup_20240309_140507.zip"
        );
        assert_eq!(
            archive_path(default_archive_name(&at)),
            PathBuf::from("directory_backup_20240309_140507.zip")
        );
    }

    #[test]
    fn hidden_directories_are_pruned_unless_included() {
        let root = tempfile::tempdir().unwrap();
        touch(root.path(), "keep.txt");
        touch(root.path(), ".git/config");
        touch(root.path(), ".git/objects/ab");
        let out = tempfile::tempdir().unwrap();

        let strict = TreeWalker::new(ExclusionPolicy::default())
            .build(root.path(), &out.path().join("strict.zip"))
            .unwrap();
        assert_eq!(strict.summary.files_added, 1);
        assert_eq!(strict.summary.folders_added, 0);
        // pruned subtrees are not counted as skipped files
        assert_eq!(strict.summary.files_skipped, 0);

        let relaxed = TreeWalker::new(ExclusionPolicy {
            exclude_hidden: false,
        })
        .build(root.path(), &out.path().join("relaxed.zip"))
        .unwrap();
        assert_eq!(relaxed.summary.files_added, 3);
        assert_eq!(relaxed.summary.folders_added, 2);
    }

    #[test]
    fn uncreatable_output_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("no/such/dir/out.zip");

        let err = TreeWalker::new(ExclusionPolicy::default())
            .build(root.path(), &missing)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Create { .. }));
    }
}
