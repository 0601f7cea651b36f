use crate::error::{MergeError, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

/// An ordered, mutable sequence of text lines under edit.
///
/// Lines carry no structure beyond their text and position; directives are
/// recognized by re-scanning. A source is owned exclusively by the pipeline
/// stage currently processing it.
pub type Source = Vec<String>;

/// Returns the index of the first line at or after `from` matching `pattern`,
/// or `source.len()` when no line matches. The sentinel return is not an
/// error; callers branch on it.
pub fn find_next(source: &[String], from: usize, pattern: &Regex) -> usize {
    (from..source.len())
        .find(|&pos| pattern.is_match(&source[pos]))
        .unwrap_or(source.len())
}

/// Copies lines `[start, end]` inclusive into a new source.
pub fn copy_range(source: &[String], start: usize, end: usize) -> Source {
    source[start..=end].to_vec()
}

/// Removes lines `[start, end]` inclusive.
///
/// Positions shift on removal; callers recompute them by rescanning.
pub fn remove_range(source: &mut Source, start: usize, end: usize) {
    source.drain(start..=end);
}

/// The indentation prefix of a line, used to re-indent inserted marker lines
/// consistently with surrounding content.
pub fn leading_whitespace(line: &str) -> &str {
    let end = line.len() - line.trim_start().len();
    &line[..end]
}

/// Drops every all-whitespace line.
pub fn remove_blank_lines(source: &mut Source) {
    source.retain(|line| !line.trim().is_empty());
}

/// Reads a file into a line sequence (UTF-8).
///
/// # Errors
///
/// - `MergeError::MissingResource` if the path doesn't exist or isn't a file.
/// - `MergeError::Io` if there's an error reading the file.
pub fn read_lines(path: &Path) -> Result<Source> {
    if !path.is_file() {
        return Err(MergeError::MissingResource {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path)?;
    Ok(text.lines().map(str::to_string).collect())
}

/// Writes a line sequence to a file, lines separated (not terminated) by `\n`.
///
/// # Errors
///
/// Returns `MergeError::Io` if the file can't be written.
pub fn write_lines(source: &[String], path: &Path) -> Result<()> {
    fs::write(path, source.join("\n"))?;
    Ok(())
}
