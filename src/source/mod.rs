//! Source units and staging
//!
//! A [`SourceUnit`] is the immutable view of one submitted snippet. When a run
//! starts, the [`Stager`] writes the snippet to a uniquely named temporary
//! file so that rules backed by external tools have a real path to work on.
//! The returned [`StagedFile`] guard owns that file and removes it when
//! dropped, whichever way the run ends.

pub mod scan;

pub use scan::{Block, CodeView, ScanError};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Prefix for staged files
const STAGED_PREFIX: &str = "code_analysis_";

/// Error while staging a source unit
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Could not create temp file: {0}")]
    Create(#[source] std::io::Error),

    #[error("Could not write code to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Language of a submitted snippet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Java,
    C,
}

impl Language {
    /// File extension used for staged files (with leading dot)
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Java => ".java",
            Language::C => ".c",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Java => write!(f, "java"),
            Language::C => write!(f, "c"),
        }
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "java" => Ok(Language::Java),
            "c" => Ok(Language::C),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

/// Immutable snippet submitted for analysis
#[derive(Debug)]
pub struct SourceUnit {
    content: String,
    language: Language,
    staged_path: Option<PathBuf>,
    view: OnceCell<Result<CodeView, ScanError>>,
}

impl SourceUnit {
    /// Create an unstaged unit
    pub fn new(content: impl Into<String>, language: Language) -> Self {
        Self {
            content: content.into(),
            language,
            staged_path: None,
            view: OnceCell::new(),
        }
    }

    fn staged(content: String, language: Language, path: PathBuf) -> Self {
        Self {
            staged_path: Some(path),
            ..Self::new(content, language)
        }
    }

    /// Raw submitted text
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Path of the staged copy, if the unit was staged
    pub fn staged_path(&self) -> Option<&Path> {
        self.staged_path.as_deref()
    }

    /// Iterate over raw lines with 1-based line numbers
    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.content.lines().enumerate().map(|(i, l)| (i + 1, l))
    }

    /// Comment- and literal-stripped view of the content.
    ///
    /// Computed on first use and shared by every rule of the run. Fails when
    /// the snippet is malformed (unbalanced braces, unterminated comment or
    /// literal).
    pub fn code_view(&self) -> Result<&CodeView, ScanError> {
        self.view
            .get_or_init(|| CodeView::scan(&self.content))
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// Guard owning the staged temporary file of one run
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    /// Location of the staged file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Remove the staged file now, reporting any IO error.
    ///
    /// Dropping the guard also removes the file, silently.
    pub fn release(self) -> std::io::Result<()> {
        self.file.close()
    }
}

/// Writes source units to temporary files
#[derive(Debug, Clone, Default)]
pub struct Stager {
    /// Directory for staged files (None = OS temp dir)
    dir: Option<PathBuf>,
}

impl Stager {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Stage content into a fresh temporary file
    pub fn stage(
        &self,
        content: &str,
        language: Language,
    ) -> Result<(SourceUnit, StagedFile), StagingError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGED_PREFIX).suffix(language.extension());

        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(StagingError::Create)?;

        let path = file.path().to_path_buf();
        file.write_all(content.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|source| StagingError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::trace!(path = %path.display(), bytes = content.len(), "staged source unit");

        let unit = SourceUnit::staged(content.to_string(), language, path);
        Ok((unit, StagedFile { file }))
    }
}
