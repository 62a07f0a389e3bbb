use super::SourceError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Lists the files of one directory that have not been processed yet
#[derive(Debug, Clone)]
pub struct DirectoryEnumerator {
    path: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryEnumerator {
    /// `extensions` are matched case-insensitively, without the leading dot
    pub fn new(path: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            path: path.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn matches(&self, file: &Path) -> bool {
        file.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    /// Matching files not in `processed`, sorted by name. A directory that does
    /// not exist yet has no files.
    pub fn pending(&self, processed: &BTreeSet<String>) -> Result<Vec<PathBuf>, SourceError> {
        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "Directory does not exist, nothing to process");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(SourceError::Directory {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SourceError::Directory {
                path: self.path.clone(),
                source,
            })?;
            let path = entry.path();

            if !path.is_file() || !self.matches(&path) {
                continue;
            }
            if processed.contains(&checkpoint_key(&path)) {
                tracing::debug!(path = %path.display(), "Already processed, skipping");
                continue;
            }
            files.push(path);
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }
}

/// Key under which a file is recorded in a directory checkpoint
pub fn checkpoint_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
