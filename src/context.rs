use crate::error::{GenerationError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do with a listed context file that does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MissingFilePolicy {
    /// Abort the whole request.
    #[default]
    Strict,
    /// Leave the file out of the prompt and continue.
    BestEffort,
}

/// A context file that was read successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub path: PathBuf,
    pub content: String,
}

/// Reads context files as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextReader;

impl ContextReader {
    pub fn new() -> Self {
        Self
    }

    /// Read one file. A missing path yields `ContextFileNotFound`; any other
    /// I/O or decoding problem yields `ContextFileUnreadable`.
    ///
    /// `\r\n` and lone `\r` line endings come back as `\n`.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        tracing::debug!(event = "read_file_attempt", file_path = %path.display());

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(event = "read_file_attempt", file_path = %path.display(), status = "not_found");
                return Err(GenerationError::ContextFileNotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(GenerationError::ContextFileUnreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        let content = String::from_utf8(bytes).map_err(|e| GenerationError::ContextFileUnreadable {
            path: path.to_path_buf(),
            message: format!("not valid UTF-8: {e}"),
        })?;
        let content = normalize_newlines(content);

        tracing::debug!(
            event = "read_file_attempt",
            file_path = %path.display(),
            status = "success",
            file_size_bytes = content.len()
        );
        Ok(content)
    }

    /// Read every path in order, failing on the first one that cannot be read.
    pub fn read_all<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<ContextFile>> {
        paths
            .iter()
            .map(|p| {
                let path = p.as_ref();
                self.read(path).map(|content| ContextFile {
                    path: path.to_path_buf(),
                    content,
                })
            })
            .collect()
    }

    /// Read every path in order, skipping paths that do not exist.
    ///
    /// Files that exist but cannot be decoded are still an error.
    pub fn read_available<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<ContextFile>> {
        let mut out = Vec::with_capacity(paths.len());
        for p in paths {
            let path = p.as_ref();
            match self.read(path) {
                Ok(content) => out.push(ContextFile {
                    path: path.to_path_buf(),
                    content,
                }),
                Err(GenerationError::ContextFileNotFound(_)) => {
                    tracing::warn!(event = "prompt_skip_context", file_path = %path.display(), reason = "not_found");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Dispatch to [`read_all`](Self::read_all) or
    /// [`read_available`](Self::read_available).
    pub fn read_with_policy<P: AsRef<Path>>(
        &self,
        paths: &[P],
        policy: MissingFilePolicy,
    ) -> Result<Vec<ContextFile>> {
        match policy {
            MissingFilePolicy::Strict => self.read_all(paths),
            MissingFilePolicy::BestEffort => self.read_available(paths),
        }
    }
}

fn normalize_newlines(content: String) -> String {
    if !content.contains('\r') {
        return content;
    }
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_utf8_content() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.txt");
        std::fs::write(&p, "héllo").unwrap();

        assert_eq!(ContextReader::new().read(&p).unwrap(), "héllo");
    }

    #[test]
    fn line_endings_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("crlf.txt");
        std::fs::write(&p, "one\r\ntwo\rthree\n").unwrap();

        assert_eq!(ContextReader::new().read(&p).unwrap(), "one\ntwo\nthree\n");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nope.txt");

        let err = ContextReader::new().read(&p).unwrap_err();
        assert_eq!(err, GenerationError::ContextFileNotFound(p));
    }

    #[test]
    fn invalid_utf8_is_unreadable_even_in_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bin.dat");
        std::fs::write(&p, [0xff, 0xfe, 0x00]).unwrap();

        let err = ContextReader::new().read_available(&[&p]).unwrap_err();
        assert!(matches!(err, GenerationError::ContextFileUnreadable { .. }));
    }

    #[test]
    fn strict_stops_at_first_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let missing = dir.path().join("missing.txt");
        std::fs::write(&a, "a").unwrap();

        let err = ContextReader::new().read_all(&[&a, &missing]).unwrap_err();
        assert_eq!(err, GenerationError::ContextFileNotFound(missing));
    }

    #[test]
    fn best_effort_omits_only_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let missing = dir.path().join("missing.txt");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();

        let files = ContextReader::new()
            .read_with_policy(&[&a, &missing, &b], MissingFilePolicy::BestEffort)
            .unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![a, b]);
    }
}
