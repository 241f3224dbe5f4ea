//! Resolves which dataset shapes a run should process.

use cli_support::ShapeRangeArgs;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("end index {end} exceeds dataset size {len}")]
    EndOutOfRange { end: usize, len: usize },
    #[error("failed to read subset file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeSelection {
    /// Indices `start..end`.
    Range { start: usize, end: usize },
    /// One shape name per line.
    Subset(PathBuf),
}

impl From<&ShapeRangeArgs> for ShapeSelection {
    fn from(args: &ShapeRangeArgs) -> Self {
        match &args.subset {
            Some(path) => ShapeSelection::Subset(path.clone()),
            None => ShapeSelection::Range {
                start: args.start,
                end: args.end,
            },
        }
    }
}

impl ShapeSelection {
    /// Resolve against a collection of `len` shapes; `index_of` maps a name to
    /// its first index.
    pub fn resolve(
        &self,
        len: usize,
        index_of: impl Fn(&str) -> Option<usize>,
    ) -> Result<Vec<usize>, SelectionError> {
        match self {
            ShapeSelection::Range { start, end } => {
                tracing::info!(start, end, "processing shapes by index range");
                if *end > len && end > start {
                    return Err(SelectionError::EndOutOfRange { end: *end, len });
                }
                Ok((*start..*end).collect())
            }
            ShapeSelection::Subset(path) => {
                tracing::info!(subset = %path.display(), "processing shapes listed in subset file");
                let text = fs::read_to_string(path).map_err(|e| SelectionError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                Ok(resolve_names(&text, index_of))
            }
        }
    }
}

/// Map each non-blank line to its index, in file order; unknown names are skipped.
fn resolve_names(text: &str, index_of: impl Fn(&str) -> Option<usize>) -> Vec<usize> {
    let mut indexes = Vec::new();
    for line in text.lines() {
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        match index_of(name) {
            Some(index) => indexes.push(index),
            None => tracing::warn!(shape = name, "shape not found in dataset names; skipping"),
        }
    }
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn resolve(sel: &ShapeSelection, names: &[&str]) -> Result<Vec<usize>, SelectionError> {
        sel.resolve(names.len(), |name| names.iter().position(|n| *n == name))
    }

    #[test]
    fn range_is_half_open() {
        let sel = ShapeSelection::Range { start: 1, end: 3 };
        assert_eq!(resolve(&sel, &["a", "b", "c"]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn empty_or_inverted_range_selects_nothing() {
        let empty = ShapeSelection::Range { start: 0, end: 0 };
        assert!(resolve(&empty, &["a"]).unwrap().is_empty());
        let inverted = ShapeSelection::Range { start: 5, end: 2 };
        assert!(resolve(&inverted, &["a"]).unwrap().is_empty());
    }

    #[test]
    fn range_past_dataset_end_fails_up_front() {
        let err = resolve(&ShapeSelection::Range { start: 0, end: 4 }, &["a", "b"]).unwrap_err();
        assert!(matches!(err, SelectionError::EndOutOfRange { end: 4, len: 2 }));
    }

    #[test]
    fn subset_lines_trimmed_unknown_skipped_duplicates_kept() {
        let n = ["chair", "table", "lamp", "table"];
        let text = "  lamp \n\nsofa\ntable\nlamp\n";
        let lookup = |name: &str| n.iter().position(|s| *s == name);
        assert_eq!(resolve_names(text, lookup), vec![2, 1, 2]);
    }

    #[test]
    fn subset_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "b").unwrap();
        writeln!(file, "a").unwrap();
        let sel = ShapeSelection::Subset(file.path().to_path_buf());
        assert_eq!(resolve(&sel, &["a", "b"]).unwrap(), vec![1, 0]);
    }

    #[test]
    fn missing_subset_file_is_an_error() {
        let sel = ShapeSelection::Subset(PathBuf::from("/nonexistent/subset.txt"));
        assert!(matches!(
            resolve(&sel, &["a"]),
            Err(SelectionError::Io { .. })
        ));
    }

    #[test]
    fn subset_flag_takes_precedence() {
        let args = ShapeRangeArgs {
            subset: Some(PathBuf::from("names.txt")),
            start: 3,
            end: 9,
        };
        assert_eq!(
            ShapeSelection::from(&args),
            ShapeSelection::Subset(PathBuf::from("names.txt"))
        );
    }
}
