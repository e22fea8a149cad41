//! Prompt assembly.
//!
//! The assembled prompt is an ordered list of parts. Each part renders to one
//! text segment of the wire format shared by every backend:
//!
//! ```text
//! <instruction>
//! ⫻const:repo_name\n<repo name>
//! ⫻context/file:<path>\n<content>      (one per readable context file)
//! Generate content for the file: <target>\n
//! ```

use crate::context::{ContextFile, ContextReader, MissingFilePolicy};
use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};

pub const REPO_NAME_TAG: &str = "⫻const:repo_name";
pub const CONTEXT_FILE_TAG: &str = "⫻context/file:";
pub const TARGET_DIRECTIVE: &str = "Generate content for the file: ";

/// One labeled unit of the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Instruction(String),
    RepoTag(String),
    ContextFile { path: PathBuf, content: String },
    TargetDirective(String),
}

impl PromptPart {
    /// Render the part as its wire segment.
    pub fn to_segment(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PromptPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptPart::Instruction(text) => f.write_str(text),
            PromptPart::RepoTag(name) => write!(f, "{REPO_NAME_TAG}\n{name}"),
            PromptPart::ContextFile { path, content } => {
                write!(f, "{CONTEXT_FILE_TAG}{}\n{content}", path.display())
            }
            PromptPart::TargetDirective(target) => write!(f, "{TARGET_DIRECTIVE}{target}\n"),
        }
    }
}

impl From<ContextFile> for PromptPart {
    fn from(f: ContextFile) -> Self {
        PromptPart::ContextFile {
            path: f.path,
            content: f.content,
        }
    }
}

/// A complete prompt, ready to hand to a provider.
///
/// Only [`PromptAssembler`] constructs one, so the part order is always
/// instruction, repo tag, context files, target directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    parts: Vec<PromptPart>,
}

impl AssembledPrompt {
    pub fn parts(&self) -> &[PromptPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Wire segments in order.
    pub fn segments(&self) -> Vec<String> {
        self.parts.iter().map(PromptPart::to_segment).collect()
    }

    /// Paths of the context files that made it into the prompt.
    pub fn context_paths(&self) -> impl Iterator<Item = &Path> {
        self.parts.iter().filter_map(|p| match p {
            PromptPart::ContextFile { path, .. } => Some(path.as_path()),
            _ => None,
        })
    }

    pub fn target_file(&self) -> Option<&str> {
        match self.parts.last() {
            Some(PromptPart::TargetDirective(t)) => Some(t),
            _ => None,
        }
    }
}

impl IntoIterator for AssembledPrompt {
    type Item = PromptPart;
    type IntoIter = std::vec::IntoIter<PromptPart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

/// Builds prompts with a fixed missing-file policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler {
    reader: ContextReader,
    policy: MissingFilePolicy,
}

impl PromptAssembler {
    pub fn new(policy: MissingFilePolicy) -> Self {
        Self {
            reader: ContextReader::new(),
            policy,
        }
    }

    pub fn strict() -> Self {
        Self::new(MissingFilePolicy::Strict)
    }

    pub fn best_effort() -> Self {
        Self::new(MissingFilePolicy::BestEffort)
    }

    /// Read the context files and lay out the prompt parts.
    ///
    /// Under the strict policy a missing file fails the whole build and no
    /// prompt is produced.
    pub fn build<P: AsRef<Path>>(
        &self,
        repo_name: &str,
        context_file_paths: &[P],
        target_file_name: &str,
        instruction: &str,
    ) -> Result<AssembledPrompt> {
        tracing::debug!(event = "prompt_build_start", repo_name, policy = ?self.policy);

        let files = self.reader.read_with_policy(context_file_paths, self.policy)?;

        let mut parts = Vec::with_capacity(files.len() + 3);
        parts.push(PromptPart::Instruction(instruction.to_string()));
        parts.push(PromptPart::RepoTag(repo_name.to_string()));
        for f in files {
            tracing::debug!(
                event = "prompt_add_context",
                file_path = %f.path.display(),
                file_size_bytes = f.content.len()
            );
            parts.push(f.into());
        }
        parts.push(PromptPart::TargetDirective(target_file_name.to_string()));

        tracing::debug!(
            event = "prompt_build_complete",
            target_file_name,
            num_input_parts = parts.len()
        );
        Ok(AssembledPrompt { parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;

    #[test]
    fn parts_render_tagged_segments() {
        let file = PromptPart::ContextFile {
            path: PathBuf::from("a.txt"),
            content: "hello".into(),
        };
        assert_eq!(PromptPart::Instruction("Summarize".into()).to_segment(), "Summarize");
        assert_eq!(PromptPart::RepoTag("demo".into()).to_segment(), "⫻const:repo_name\ndemo");
        assert_eq!(file.to_segment(), "⫻context/file:a.txt\nhello");
        assert_eq!(
            PromptPart::TargetDirective("out.md".into()).to_segment(),
            "Generate content for the file: out.md\n"
        );
    }

    #[test]
    fn demo_prompt_matches_wire_format() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        std::fs::write(&a, "hello").unwrap();

        let prompt = PromptAssembler::strict()
            .build("demo", &[&a], "out.md", "Summarize")
            .unwrap();

        assert_eq!(
            prompt.segments(),
            vec![
                "Summarize".to_string(),
                "⫻const:repo_name\ndemo".to_string(),
                format!("⫻context/file:{}\nhello", a.display()),
                "Generate content for the file: out.md\n".to_string(),
            ]
        );
    }

    #[test]
    fn no_context_files_still_ends_with_target() {
        let prompt = PromptAssembler::strict()
            .build::<&str>("demo", &[], "out.md", "Summarize")
            .unwrap();

        assert_eq!(prompt.len(), 3);
        assert_eq!(prompt.target_file(), Some("out.md"));
        assert!(matches!(prompt.parts()[0], PromptPart::Instruction(_)));
        assert!(matches!(prompt.parts()[1], PromptPart::RepoTag(_)));
    }

    #[test]
    fn context_files_keep_caller_order() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["c.rs", "a.rs", "b.rs"];
        let paths: Vec<PathBuf> = names
            .iter()
            .map(|n| {
                let p = dir.path().join(n);
                std::fs::write(&p, *n).unwrap();
                p
            })
            .collect();

        let prompt = PromptAssembler::strict()
            .build("r", &paths, "t", "i")
            .unwrap();

        let got: Vec<_> = prompt.context_paths().map(Path::to_path_buf).collect();
        assert_eq!(got, paths);
        assert!(matches!(prompt.parts().last(), Some(PromptPart::TargetDirective(_))));
    }

    #[test]
    fn strict_missing_file_produces_no_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a.txt");

        let err = PromptAssembler::strict()
            .build("demo", &[&missing], "out.md", "Summarize")
            .unwrap_err();
        assert_eq!(err, GenerationError::ContextFileNotFound(missing));
    }

    #[test]
    fn best_effort_skips_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        let missing = dir.path().join("missing.txt");
        std::fs::write(&present, "x").unwrap();

        let prompt = PromptAssembler::best_effort()
            .build("demo", &[&missing, &present], "out.md", "Summarize")
            .unwrap();

        let got: Vec<_> = prompt.context_paths().collect();
        assert_eq!(got, vec![present.as_path()]);
        assert_eq!(prompt.len(), 4);
    }

    #[test]
    fn empty_content_is_still_a_context_part() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "").unwrap();

        let prompt = PromptAssembler::strict()
            .build("demo", &[&empty], "out.md", "go")
            .unwrap();
        assert_eq!(prompt.segments()[2], format!("⫻context/file:{}\n", empty.display()));
    }
}
