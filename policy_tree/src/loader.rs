//! Loading a policy tree from the filesystem.
//!
//! A directory is one node: its fragment files are merged into a single
//! node, then each subdirectory is loaded the same way and attached as a
//! child under the name its fragments derive.
//!
//! ```text
//! policy/
//! ├── base.json        merged into the node for policy/
//! ├── dns.json         merged into the node for policy/
//! ├── .git/            ignored
//! └── frontend/
//!     └── web.json     {"name": "frontend", ...} becomes child "frontend"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::error::Category;
use tracing::{Level, debug, instrument};

use crate::error::LoadError;
use crate::location::{locate, offset_of};
use crate::node::{MergeStrategy, PolicyNode};

/// Base names skipped by default.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[r"\.git"];

/// Settings for one loader; nothing here is process-wide.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    ignore: Vec<Regex>,
    merge: MergeStrategy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::with_ignore_patterns(DEFAULT_IGNORE_PATTERNS)
            .expect("default ignore patterns are valid regular expressions")
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config that ignores entries whose whole base name matches
    /// one of `patterns`.
    pub fn with_ignore_patterns<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ignore = patterns
            .into_iter()
            .map(|p| Regex::new(&format!("^(?:{})$", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            ignore,
            merge: MergeStrategy::default(),
        })
    }

    pub fn with_merge_strategy(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.merge
    }

    /// Returns true if the entry with base name `name` should be skipped.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|re| re.is_match(name))
    }
}

/// Builds policy trees from fragment files and directories.
#[derive(Debug, Clone, Default)]
pub struct PolicyLoader {
    config: LoaderConfig,
}

impl PolicyLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Loads the tree rooted at `path`.
    ///
    /// A regular file is parsed on its own. A directory yields `None` when it
    /// holds no fragments and no subtrees. Any failure aborts the whole load.
    #[instrument(level = Level::TRACE, skip(self))]
    pub fn load(&self, path: &Path) -> Result<Option<PolicyNode>, LoadError> {
        let metadata = fs::metadata(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if metadata.is_file() {
            self.load_file(path).map(Some)
        } else if metadata.is_dir() {
            self.load_dir(path)
        } else {
            Err(LoadError::PathNotFileOrDirectory {
                path: path.to_path_buf(),
            })
        }
    }

    /// Reads and parses a single fragment file.
    #[instrument(level = Level::TRACE, skip(self))]
    pub fn load_file(&self, path: &Path) -> Result<PolicyNode, LoadError> {
        debug!(path = %path.display(), "loading file");

        let file = base_name(path);
        let content = fs::read(path).map_err(|e| LoadError::FragmentUnknown {
            file: file.clone(),
            message: e.to_string(),
        })?;
        parse_fragment(&file, &content)
    }

    fn load_dir(&self, dir: &Path) -> Result<Option<PolicyNode>, LoadError> {
        debug!(dir = %dir.display(), "entering directory");

        let io_error = |source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut entries = fs::read_dir(dir)
            .map_err(io_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_error)?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut files: Vec<PathBuf> = Vec::new();
        let mut subdirs: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.config.is_ignored(&name) {
                debug!(name = %name, "ignoring entry");
                continue;
            }
            if entry.file_type().map_err(io_error)?.is_dir() {
                subdirs.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }

        // Fragment files first, so subtrees have a node to attach to.
        let mut node: Option<PolicyNode> = None;
        for path in &files {
            let fragment = self.load_file(path)?;
            node = Some(match node {
                None => fragment,
                Some(acc) => acc
                    .merge_with(&fragment, self.config.merge)
                    .map_err(|source| LoadError::MergeConflict {
                        file: base_name(path),
                        source,
                    })?,
            });
        }

        for subdir in subdirs {
            let Some(subtree) = self.load_dir(&subdir)? else {
                debug!(dir = %subdir.display(), "no policy in subdirectory");
                continue;
            };
            if subtree.name().is_empty() {
                return Err(LoadError::UnnamedSubtree { path: subdir });
            }
            let Some(parent) = node.as_mut() else {
                return Err(LoadError::NoParentNode {
                    path: dir.to_path_buf(),
                });
            };
            let name = subtree.name().to_string();
            parent
                .add_child(name, subtree)
                .map_err(|source| LoadError::Attach {
                    path: subdir,
                    source,
                })?;
        }

        debug!(dir = %dir.display(), "leaving directory");
        Ok(node)
    }
}

/// Parses fragment bytes, translating JSON errors into located diagnostics.
pub fn parse_fragment(file: &str, content: &[u8]) -> Result<PolicyNode, LoadError> {
    let mut node: PolicyNode =
        serde_json::from_slice(content).map_err(|e| translate_json_error(file, content, &e))?;
    node.normalize_children()
        .map_err(|source| LoadError::InvalidFragment {
            file: file.to_string(),
            source,
        })?;
    Ok(node)
}

fn translate_json_error(file: &str, content: &[u8], err: &serde_json::Error) -> LoadError {
    let message = bare_message(err);
    let offset = offset_of(content, err.line(), err.column());

    match err.classify() {
        Category::Syntax | Category::Eof => {
            // End-of-input errors point one past the last byte.
            let offset = match err.classify() {
                Category::Eof => offset.map(|o| o.min(content.len().saturating_sub(1))),
                _ => offset,
            };
            let context = Context::at(content, offset);
            LoadError::FragmentSyntax {
                file: file.to_string(),
                line: context.line,
                column: context.column,
                message,
                context: context.text,
                marker: context.marker,
            }
        }
        Category::Data => match split_type_mismatch(&message) {
            Some((value, expected)) => {
                let context = Context::at(content, offset.map(|o| value_start(content, o)));
                LoadError::FragmentTypeMismatch {
                    file: file.to_string(),
                    line: context.line,
                    value,
                    expected,
                    context: context.text,
                    marker: context.marker,
                }
            }
            None => LoadError::FragmentUnknown {
                file: file.to_string(),
                message: err.to_string(),
            },
        },
        Category::Io => LoadError::FragmentUnknown {
            file: file.to_string(),
            message: err.to_string(),
        },
    }
}

/// Rendered source context for a diagnostic.
struct Context {
    line: usize,
    column: usize,
    text: String,
    marker: String,
}

impl Context {
    fn at(content: &[u8], offset: Option<usize>) -> Self {
        let offset = offset.map_or(-1, |o| i64::try_from(o).unwrap_or(i64::MAX));
        match locate(content, offset) {
            Ok(location) => Context {
                line: location.line,
                column: location.column,
                marker: location.marker(),
                text: location.text,
            },
            Err(e) => Context {
                line: 0,
                column: 0,
                text: format!("[error: {e}]"),
                marker: "^".into(),
            },
        }
    }
}

/// Moves an offset that serde_json reports at the end of a value back to the
/// value's first byte.
///
/// Strings are walked back to their opening quote, which must follow `:`, `[`
/// or `,`. Numbers and literals are walked back over their characters. Any
/// other byte is returned unchanged.
fn value_start(content: &[u8], offset: usize) -> usize {
    let is_scalar = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'+' | b'.');
    let is_value_end = |b: u8| is_scalar(b) || b == b'"';

    let Some(&byte) = content.get(offset) else {
        return offset;
    };
    let end = if !is_value_end(byte) && offset > 0 && is_value_end(content[offset - 1]) {
        offset - 1
    } else {
        offset
    };

    if content[end] == b'"' {
        let opening = content[..end]
            .iter()
            .enumerate()
            .rev()
            .find(|&(i, &b)| b == b'"' && (i == 0 || content[i - 1] != b'\\'))
            .map(|(i, _)| i);
        let follows_separator = |i: usize| {
            content[..i]
                .iter()
                .rev()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| matches!(b, b':' | b'[' | b','))
        };
        return match opening {
            Some(i) if follows_separator(i) => i,
            _ => offset,
        };
    }

    if !is_scalar(content[end]) {
        return offset;
    }
    let mut start = end;
    while start > 0 && is_scalar(content[start - 1]) {
        start -= 1;
    }
    start
}

/// Strips serde_json's " at line N column M" suffix.
fn bare_message(err: &serde_json::Error) -> String {
    let full = err.to_string();
    let suffix = format!(" at line {} column {}", err.line(), err.column());
    match full.strip_suffix(&suffix) {
        Some(message) => message.to_string(),
        None => full,
    }
}

/// Splits serde's "invalid type: X, expected Y" into `(X, Y)`.
fn split_type_mismatch(message: &str) -> Option<(String, String)> {
    let rest = message
        .strip_prefix("invalid type: ")
        .or_else(|| message.strip_prefix("invalid value: "))?;
    let (value, expected) = rest.rsplit_once(", expected ")?;
    Some((value.to_string(), expected.to_string()))
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
