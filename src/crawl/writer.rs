//! Persistence of normalized documents as one JSON file each.
//!
//! [`ResultWriter`] derives a filesystem-safe filename from a document's
//! name, reserves it for the current run, and commits the pretty-printed JSON
//! through a temporary file and a rename so a failed write never leaves a
//! truncated artifact under the final name.

use std::path::{Path, PathBuf};

use dashmap::DashSet;
use tracing::{debug, instrument, warn};

use super::error::PersistenceError;
use crate::document::LawDocument;

/// Longest stem (in bytes) kept from a law name.
const MAX_STEM_BYTES: usize = 180;

/// Highest numeric suffix tried before giving up on a name.
const MAX_SUFFIX: usize = 10_000;

/// Stem used when nothing usable remains of the name.
const FALLBACK_STEM: &str = "law";

/// Extension of persisted artifacts.
const EXTENSION: &str = "json";

/// Writes documents into one output directory for the duration of a run.
///
/// Filenames are reserved per writer instance: two documents with the same
/// name written through the same writer land in `name.json` and
/// `name_2.json`. Files left by earlier runs are overwritten.
#[derive(Debug)]
pub struct ResultWriter {
    output_dir: PathBuf,
    claimed: DashSet<String>,
}

impl ResultWriter {
    /// Creates a writer for `output_dir`. The directory is created lazily.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            claimed: DashSet::new(),
        }
    }

    /// Returns the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persists `doc` and returns the path of the committed file.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the directory cannot be created, the
    /// document cannot be serialized, no free name remains, or the file
    /// cannot be written or renamed into place. Nothing is left under the
    /// final name on failure.
    #[instrument(skip(self, doc), fields(name = %doc.name))]
    pub async fn write(&self, doc: &LawDocument) -> Result<PathBuf, PersistenceError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| PersistenceError::io(&self.output_dir, e))?;

        let json =
            serde_json::to_vec_pretty(doc).map_err(|source| PersistenceError::Serialize {
                name: doc.name.clone(),
                source,
            })?;

        let filename = self.reserve_filename(&doc.name)?;
        let final_path = self.output_dir.join(&filename);
        let tmp_path = self.output_dir.join(format!("{filename}.tmp"));

        if let Err(error) = commit(&tmp_path, &final_path, &json).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove temp file");
            }
            self.claimed.remove(&filename);
            return Err(error);
        }

        debug!(path = %final_path.display(), bytes = json.len(), "document written");
        Ok(final_path)
    }

    /// Claims the first free `stem.json`, `stem_2.json`, ... for this run.
    fn reserve_filename(&self, name: &str) -> Result<String, PersistenceError> {
        let stem = sanitize_filename(name);
        let first = format!("{stem}.{EXTENSION}");
        if self.claimed.insert(first.clone()) {
            return Ok(first);
        }
        for suffix in 2..=MAX_SUFFIX {
            let candidate = format!("{stem}_{suffix}.{EXTENSION}");
            if self.claimed.insert(candidate.clone()) {
                debug!(name, filename = %candidate, "name collision, using suffix");
                return Ok(candidate);
            }
        }
        Err(PersistenceError::NameExhausted {
            name: name.to_string(),
        })
    }
}

async fn commit(tmp_path: &Path, final_path: &Path, json: &[u8]) -> Result<(), PersistenceError> {
    tokio::fs::write(tmp_path, json)
        .await
        .map_err(|e| PersistenceError::io(tmp_path, e))?;
    tokio::fs::rename(tmp_path, final_path)
        .await
        .map_err(|e| PersistenceError::io(final_path, e))
}

/// Turns a law name into a filename stem (without extension).
///
/// Path separators, characters reserved on common filesystems, and control
/// characters become `_`. The result is trimmed, capped at 180 bytes on a
/// character boundary, and falls back to `law` when nothing usable is left.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_matches('.').trim();
    let mut end = trimmed.len().min(MAX_STEM_BYTES);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = trimmed[..end].trim_end();

    if truncated.is_empty() || truncated.chars().all(|c| c == '_') {
        FALLBACK_STEM.to_string()
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::document::Article;
    use tempfile::TempDir;

    fn doc(name: &str, url: &str) -> LawDocument {
        LawDocument::new(
            name,
            "行政",
            "20240101",
            vec![
                Article::new("第 1 條", "第一條內容"),
                Article::new("第 2 條", "第二條內容"),
            ],
            url,
        )
        .unwrap()
    }

    #[test]
    fn test_sanitize_filename_replaces_reserved_chars() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("line\nbreak"), "line_break");
    }

    #[test]
    fn test_sanitize_filename_keeps_cjk() {
        assert_eq!(sanitize_filename("  土地徵收條例  "), "土地徵收條例");
    }

    #[test]
    fn test_sanitize_filename_falls_back_when_empty() {
        assert_eq!(sanitize_filename(""), "law");
        assert_eq!(sanitize_filename(".."), "law");
        assert_eq!(sanitize_filename("///"), "law");
    }

    #[test]
    fn test_sanitize_filename_truncates_on_char_boundary() {
        let long = "法".repeat(100);
        let stem = sanitize_filename(&long);
        assert!(stem.len() <= MAX_STEM_BYTES);
        assert_eq!(stem.chars().count(), MAX_STEM_BYTES / 3);
    }

    #[tokio::test]
    async fn test_write_creates_directory_and_round_trips() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("nested").join("law_jsons");
        let writer = ResultWriter::new(&out);
        let original = doc("土地法", "https://law.example.gov/a");

        let path = writer.write(&original).await.unwrap();
        assert_eq!(path, out.join("土地法.json"));

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("土地法"), "non-ASCII must not be escaped: {text}");
        let restored: LawDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, original);
        assert!(!out.join("土地法.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_write_same_name_yields_distinct_files() {
        let temp = TempDir::new().unwrap();
        let writer = ResultWriter::new(temp.path());
        let first = doc("同名法", "https://law.example.gov/1");
        let second = doc("同名法", "https://law.example.gov/2");

        let first_path = writer.write(&first).await.unwrap();
        let second_path = writer.write(&second).await.unwrap();

        assert_ne!(first_path, second_path);
        assert_eq!(second_path, temp.path().join("同名法_2.json"));
        let a: LawDocument = serde_json::from_slice(&std::fs::read(&first_path).unwrap()).unwrap();
        let b: LawDocument =
            serde_json::from_slice(&std::fs::read(&second_path).unwrap()).unwrap();
        assert_eq!(a.url, "https://law.example.gov/1");
        assert_eq!(b.url, "https://law.example.gov/2");
    }

    #[tokio::test]
    async fn test_write_overwrites_file_from_previous_run() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("舊法.json"), b"stale").unwrap();

        let writer = ResultWriter::new(temp.path());
        let path = writer.write(&doc("舊法", "https://law.example.gov/new")).await.unwrap();

        assert_eq!(path, temp.path().join("舊法.json"));
        let restored: LawDocument = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(restored.url, "https://law.example.gov/new");
    }

    #[tokio::test]
    async fn test_write_fails_when_output_dir_is_a_file() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let writer = ResultWriter::new(&blocker);
        let error = writer.write(&doc("法", "https://law.example.gov/a")).await.unwrap_err();
        assert!(matches!(error, PersistenceError::Io { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_writes_of_same_name_do_not_clobber() {
        let temp = TempDir::new().unwrap();
        let writer = std::sync::Arc::new(ResultWriter::new(temp.path()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let writer = std::sync::Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                writer
                    .write(&doc("重複", &format!("https://law.example.gov/{i}")))
                    .await
                    .unwrap()
            }));
        }

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 8);
    }
}
