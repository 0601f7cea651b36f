use crate::error::{MergeError, Result};
use crate::source::{self, Source};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// Insertion-ordered variable table. Keys are case-sensitive; placeholder
/// matching at substitution time is case-insensitive. Re-inserting an
/// existing key overwrites the value (last write wins).
pub type Variables = IndexMap<String, String>;

// <!-- @variables:fileLocation -->
static VARIABLES_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!--\s*@variables\s*:\s*(\S+)\s*-->\s*$").unwrap());

// <!-- @variables
// title=expression
// __layout=main
// -->
static VARIABLES_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!--\s*@variables\s*$").unwrap());

static VARIABLES_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-->\s*$").unwrap());

static NAME_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[^\s=]+\s*=.*$").unwrap());

// @( name )
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\(\s*([^)]*?)\s*\)").unwrap());

/// Imports every `<!-- @variables:PATH -->` reference found in `source`.
///
/// Each referenced file is resolved against `config_dir`, parsed as a flat
/// `name=value` property file, and merged into `variables` (later imports
/// overwrite earlier ones). The reference line is removed from the document.
/// The scan restarts after each removal until no reference lines remain.
///
/// # Errors
///
/// - `MergeError::MissingResource` if a referenced file does not exist.
/// - `MergeError::Io` if a referenced file can't be read.
pub fn import_file_variables(
    source: &mut Source,
    config_dir: &Path,
    variables: &mut Variables,
) -> Result<()> {
    loop {
        let Some((pos, file_name)) = source.iter().enumerate().find_map(|(pos, line)| {
            VARIABLES_FILE
                .captures(line)
                .map(|caps| (pos, caps[1].to_string()))
        }) else {
            return Ok(());
        };

        let file_path = config_dir.join(&file_name);
        if !file_path.is_file() {
            return Err(MergeError::MissingResource { path: file_path });
        }
        source.remove(pos);

        for (name, value) in parse_properties(&source::read_lines(&file_path)?) {
            variables.insert(name, value);
        }
    }
}

/// Parses a flat property file: `name=value` per line, blank lines and
/// `#`/`!` comment lines skipped, a line without `=` is a name with an
/// empty value.
fn parse_properties(lines: &[String]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for line in lines {
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') || entry.starts_with('!') {
            continue;
        }
        match entry.split_once('=') {
            Some((name, value)) => {
                entries.push((name.trim().to_string(), value.trim().to_string()));
            }
            None => entries.push((entry.to_string(), String::new())),
        }
    }
    entries
}

/// Parses every inline `@variables` block out of `source` into `variables`,
/// removing each block (start marker through end marker) from the document.
///
/// Block body lines are blank or `//` comments (skipped) or `name = value`.
///
/// # Errors
///
/// - `MergeError::UnterminatedBlock` if a block has no closing `-->` line.
/// - `MergeError::MalformedVariable` for any other body line.
pub fn parse_inline_variables(
    source: &mut Source,
    doc_name: &str,
    variables: &mut Variables,
) -> Result<()> {
    loop {
        let start = source::find_next(source, 0, &VARIABLES_START);
        if start == source.len() {
            return Ok(());
        }
        let end = source::find_next(source, start + 1, &VARIABLES_END);
        if end == source.len() {
            return Err(MergeError::UnterminatedBlock {
                directive: "@variables".to_string(),
                doc: doc_name.to_string(),
            });
        }

        for line in &source[start + 1..end] {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with("//") {
                continue;
            }
            match entry.split_once('=') {
                Some((name, value)) if NAME_VALUE.is_match(entry) => {
                    variables.insert(name.trim().to_string(), value.trim().to_string());
                }
                _ => {
                    return Err(MergeError::MalformedVariable {
                        entry: entry.to_string(),
                        doc: doc_name.to_string(),
                    });
                }
            }
        }

        source::remove_range(source, start, end);
    }
}

/// Replaces every `@( name )` placeholder with the named variable's literal
/// value, in a single pass per line. Substituted values are never rescanned,
/// so a value containing a placeholder pattern stays as-is in the output.
///
/// Names are matched case-insensitively; when two table keys collide under
/// case folding, the earliest-inserted one wins. Placeholders naming an
/// undefined variable are left verbatim.
pub fn substitute(source: &mut Source, variables: &Variables) {
    let mut lookup: HashMap<String, &str> = HashMap::with_capacity(variables.len());
    for (name, value) in variables {
        lookup.entry(name.to_lowercase()).or_insert(value.as_str());
    }

    for line in source.iter_mut() {
        if !line.contains("@(") {
            continue;
        }
        let replaced = PLACEHOLDER
            .replace_all(line, |caps: &regex::Captures| {
                match lookup.get(&caps[1].to_lowercase()) {
                    Some(value) => (*value).to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
        *line = replaced;
    }
}

/// Renders the merged table as an inert `@variables` comment block, in table
/// iteration order, for diagnostic appending to a view's output.
pub fn to_debug_lines(variables: &Variables) -> Source {
    let mut lines = Vec::with_capacity(variables.len() + 2);
    lines.push("<!-- @variables".to_string());
    for (name, value) in variables {
        lines.push(format!(" {name}={value}"));
    }
    lines.push("-->".to_string());
    lines
}

/// Builds a variable table from literal pairs, preserving their order.
pub fn variables_from<const N: usize>(pairs: [(&str, &str); N]) -> Variables {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn lines(items: &[&str]) -> Source {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_inline_variables_basic() {
        let mut src = lines(&[
            "<html>",
            "<!-- @variables",
            "title = Home",
            "__layout=main",
            "-->",
            "</html>",
        ]);
        let mut vars = Variables::new();
        parse_inline_variables(&mut src, "index.jsp", &mut vars).unwrap();

        assert_eq!(src, lines(&["<html>", "</html>"]));
        assert_eq!(vars.get("title").map(String::as_str), Some("Home"));
        assert_eq!(vars.get("__layout").map(String::as_str), Some("main"));
    }

    #[test]
    fn test_parse_inline_variables_comments_and_blanks() {
        let mut src = lines(&[
            "<!-- @variables",
            "",
            "// site chrome",
            "title = Home",
            "empty =",
            "-->",
        ]);
        let mut vars = Variables::new();
        parse_inline_variables(&mut src, "index.jsp", &mut vars).unwrap();

        assert!(src.is_empty());
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("empty").map(String::as_str), Some(""));
    }

    #[test]
    fn test_parse_inline_variables_multiple_blocks() {
        let mut src = lines(&[
            "<!-- @variables",
            "a=1",
            "-->",
            "content",
            "<!-- @VARIABLES",
            "a=2",
            "b=3",
            "-->",
        ]);
        let mut vars = Variables::new();
        parse_inline_variables(&mut src, "index.jsp", &mut vars).unwrap();

        assert_eq!(src, lines(&["content"]));
        // last write wins
        assert_eq!(vars.get("a").map(String::as_str), Some("2"));
        assert_eq!(vars.get("b").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_parse_inline_variables_unterminated() {
        let mut src = lines(&["<!-- @variables", "a=1"]);
        let mut vars = Variables::new();
        let result = parse_inline_variables(&mut src, "index.jsp", &mut vars);
        assert!(matches!(
            result,
            Err(MergeError::UnterminatedBlock { .. })
        ));
    }

    #[test]
    fn test_parse_inline_variables_malformed() {
        let mut src = lines(&["<!-- @variables", "not a variable", "-->"]);
        let mut vars = Variables::new();
        let result = parse_inline_variables(&mut src, "index.jsp", &mut vars);
        assert!(matches!(
            result,
            Err(MergeError::MalformedVariable { .. })
        ));

        // a name containing whitespace is rejected too
        let mut src = lines(&["<!-- @variables", "my name = x", "-->"]);
        let mut vars = Variables::new();
        let result = parse_inline_variables(&mut src, "index.jsp", &mut vars);
        assert!(matches!(
            result,
            Err(MergeError::MalformedVariable { .. })
        ));
    }

    #[test]
    fn test_import_file_variables() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("site.properties"),
            "# shared chrome\ntitle = Site\ncopyright=2015\n",
        )
        .unwrap();

        let mut src = lines(&[
            "<!-- @variables:site.properties -->",
            "<html>",
        ]);
        let mut vars = Variables::new();
        import_file_variables(&mut src, temp_dir.path(), &mut vars).unwrap();

        assert_eq!(src, lines(&["<html>"]));
        assert_eq!(vars.get("title").map(String::as_str), Some("Site"));
        assert_eq!(vars.get("copyright").map(String::as_str), Some("2015"));
    }

    #[test]
    fn test_import_file_variables_later_wins() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.properties"), "k=first\n").unwrap();
        fs::write(temp_dir.path().join("b.properties"), "k=second\n").unwrap();

        let mut src = lines(&[
            "<!-- @variables:a.properties -->",
            "<!-- @variables:b.properties -->",
        ]);
        let mut vars = Variables::new();
        import_file_variables(&mut src, temp_dir.path(), &mut vars).unwrap();

        assert!(src.is_empty());
        assert_eq!(vars.get("k").map(String::as_str), Some("second"));
    }

    #[test]
    fn test_import_file_variables_missing() {
        let temp_dir = TempDir::new().unwrap();
        let mut src = lines(&["<!-- @variables:absent.properties -->"]);
        let mut vars = Variables::new();
        let result = import_file_variables(&mut src, temp_dir.path(), &mut vars);
        assert!(matches!(result, Err(MergeError::MissingResource { .. })));
        // the reference line stays when the import fails
        assert_eq!(src.len(), 1);
    }

    #[test]
    fn test_parse_properties_bare_name() {
        let entries = parse_properties(&lines(&["flag", "! note", "a = b"]));
        assert_eq!(
            entries,
            vec![
                ("flag".to_string(), String::new()),
                ("a".to_string(), "b".to_string())
            ]
        );
    }

    #[test]
    fn test_substitute_basic() {
        let mut src = lines(&["<title>@(title)</title>", "by @( author )"]);
        let vars = variables_from([("title", "Home"), ("author", "dev")]);
        substitute(&mut src, &vars);
        assert_eq!(src, lines(&["<title>Home</title>", "by dev"]));
    }

    #[test]
    fn test_substitute_case_insensitive_names() {
        let mut src = lines(&["@(TITLE) and @(Title)"]);
        let vars = variables_from([("title", "Home")]);
        substitute(&mut src, &vars);
        assert_eq!(src, lines(&["Home and Home"]));
    }

    #[test]
    fn test_substitute_undefined_left_verbatim() {
        // pass-through of unresolved placeholders is load-bearing behavior
        let mut src = lines(&["keep @(unknown) and @( also-unknown )"]);
        let vars = variables_from([("title", "Home")]);
        substitute(&mut src, &vars);
        assert_eq!(src, lines(&["keep @(unknown) and @( also-unknown )"]));
    }

    #[test]
    fn test_substitute_identity_without_placeholders() {
        let original = lines(&["<html>", "plain text", "a@b.com", "{}"]);
        let mut src = original.clone();
        let vars = variables_from([("title", "Home")]);
        substitute(&mut src, &vars);
        assert_eq!(src, original);
    }

    #[test]
    fn test_substitute_no_recursive_expansion() {
        // a substituted value is never itself rescanned
        let mut src = lines(&["@(outer)"]);
        let vars = variables_from([("outer", "@(inner)"), ("inner", "X")]);
        substitute(&mut src, &vars);
        assert_eq!(src, lines(&["@(inner)"]));
    }

    #[test]
    fn test_substitute_multiple_per_line() {
        let mut src = lines(&["@(a)-@(a)-@(b)"]);
        let vars = variables_from([("a", "1"), ("b", "2")]);
        substitute(&mut src, &vars);
        assert_eq!(src, lines(&["1-1-2"]));
    }

    #[test]
    fn test_to_debug_lines_order() {
        let vars = variables_from([("z", "26"), ("a", "1")]);
        assert_eq!(
            to_debug_lines(&vars),
            lines(&["<!-- @variables", " z=26", " a=1", "-->"])
        );
    }
}
