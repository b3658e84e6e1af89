//! Declaration discovery from marker comments in unit source files.
//!
//! A unit declares a topic with a single-line comment:
//!
//! ```text
//! # PBB_DECLARE: topic=status, init=LISTENING
//! // PBB_DECLARE: topic=data, init=000.00
//! ```
//!
//! The unit name is the declaring file's stem; `init` is the rest of the line,
//! trimmed.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;

use crate::core::{Error, Result};
use crate::registry::declaration::{Declaration, DeclarationSource, DEFAULT_EXTENSIONS};

pub const DECLARE_MARKER: &str = "PBB_DECLARE";

pub struct CommentScanner {
    root: PathBuf,
    extensions: Vec<String>,
    pattern: Regex,
}

impl CommentScanner {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "declaration directory {} not found",
                root.display()
            )));
        }
        let pattern = Regex::new(&format!(
            r"(?:#|//)\s*{DECLARE_MARKER}:\s*topic=([^,\s]+),\s*init=(.+)"
        ))
        .map_err(|err| Error::Config(err.to_string()))?;
        Ok(Self {
            root,
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            pattern,
        })
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extracts `(topic, init)` from one line, if it carries a declaration.
    pub fn parse_line(&self, line: &str) -> Option<(String, String)> {
        let caps = self.pattern.captures(line)?;
        let topic = caps.get(1)?.as_str().trim().to_string();
        let init = caps.get(2)?.as_str().trim().to_string();
        Some((topic, init))
    }

    fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("cannot list {}: {err}", dir.display());
                    continue;
                }
            };
            for entry in entries.filter_map(|entry| entry.ok()) {
                // Symlinked directories are not followed, a link to an
                // ancestor would never terminate.
                let file_type = match entry.file_type() {
                    Ok(file_type) => file_type,
                    Err(_) => continue,
                };
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if (!file_type.is_symlink() || path.is_file())
                    && self.matches_extension(&path)
                {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| self.extensions.iter().any(|want| want == ext))
    }

    fn scan_file(&self, path: &Path) -> Vec<Declaration> {
        let unit = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(unit) => unit.to_string(),
            None => return Vec::new(),
        };
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("could not read {}: {err}", path.display());
                return Vec::new();
            }
        };
        contents
            .lines()
            .filter_map(|line| self.parse_line(line))
            .map(|(topic, init)| {
                debug!("found topic {unit}/{topic} in {}", path.display());
                Declaration::new(unit.clone(), topic, init)
            })
            .collect()
    }
}

impl DeclarationSource for CommentScanner {
    fn declarations(&self) -> Box<dyn Iterator<Item = Declaration> + '_> {
        Box::new(
            self.files()
                .into_iter()
                .flat_map(move |path| self.scan_file(&path)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> CommentScanner {
        CommentScanner::open(std::env::temp_dir()).expect("scanner")
    }

    #[test]
    fn test_parse_python_marker() {
        let parsed = scanner().parse_line("# PBB_DECLARE: topic=status, init=LISTENING");
        assert_eq!(parsed, Some(("status".to_string(), "LISTENING".to_string())));
    }

    #[test]
    fn test_parse_rust_marker_trims_init() {
        let parsed = scanner().parse_line("    //PBB_DECLARE:topic=data,   init=  000.00  ");
        assert_eq!(parsed, Some(("data".to_string(), "000.00".to_string())));
    }

    #[test]
    fn test_parse_keeps_commas_in_init() {
        let parsed = scanner().parse_line("# PBB_DECLARE: topic=pos, init=1,2,3");
        assert_eq!(parsed, Some(("pos".to_string(), "1,2,3".to_string())));
    }

    #[test]
    fn test_parse_rejects_non_markers() {
        let s = scanner();
        assert_eq!(s.parse_line("topic=status, init=x"), None);
        assert_eq!(s.parse_line("# PBB_DECLARE: topic=, init=x"), None);
        assert_eq!(s.parse_line("# PBB_DECLARE: topic=status"), None);
    }

    #[test]
    fn test_open_missing_dir() {
        let err = CommentScanner::open("/nonexistent/pbb/src").err().expect("error");
        assert!(matches!(err, Error::Config(_)));
    }
}
