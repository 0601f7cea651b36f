use crate::error::{MergeError, Result};
use crate::source::{self, Source};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Output format of a view/layout pair, driving how the view's body lands in
/// the layout and what per-format normalization runs before splicing.
///
/// Dispatch is a closed set: adding a format means adding a variant here and
/// a suffix binding in [`FormatRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSP pages: `<%@ include %>` body, page directive normalization
    Jsp,
    /// Facelet composites: `<ui:include>` body
    Facelet,
    /// Pebble templates: `{% include %}` body
    Pebble,
    /// Fallback for unrecognized suffixes: body inlined, no include file
    Other,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Format::Jsp => "jsp",
            Format::Facelet => "facelet",
            Format::Pebble => "pebble",
            Format::Other => "other",
        })
    }
}

const DEFAULT_PAGE_DIRECTIVE: &str = "<%@ page contentType=\"text/html; charset=utf-8\" session=\"false\" trimDirectiveWhitespaces=\"true\" pageEncoding=\"UTF-8\"%>";

// <%@ page ... %>  (the close may sit on the opening line)
static PAGE_DIRECTIVE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*<%@\s*page.*").unwrap());

static DIRECTIVE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r".*%>\s*$").unwrap());

static SESSION_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"session\s*=\s*"\s*(true|false)\s*""#).unwrap());

static TRIM_WHITESPACE_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"trimDirectiveWhitespaces\s*=\s*"\s*(true|false)\s*""#).unwrap());

static PAGE_ENCODING_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"pageEncoding\s*=\s*"\s*\S+\s*""#).unwrap());

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

impl Format {
    /// Whether the view's body must be materialized as a separate included
    /// file next to the merged layout, rather than inlined into it.
    pub fn needs_include_file(self) -> bool {
        !matches!(self, Format::Other)
    }

    /// Inserts the view's body at `body_pos` in the layout: a begin marker,
    /// the format's include statement (or, for [`Format::Other`], the body
    /// lines themselves), and an end marker. The markers take the removed
    /// placeholder's indentation; inlined body lines are inserted verbatim.
    pub fn insert_body(
        self,
        layout: &mut Source,
        body_pos: usize,
        indent: &str,
        body: &[String],
        include_name: &str,
    ) {
        let mut block = Vec::with_capacity(body.len() + 3);
        block.push(format!("{indent}<!-- @doBody begin -->"));
        match self {
            Format::Jsp => block.push(format!("{indent}<%@ include file=\"{include_name}\" %>")),
            Format::Facelet => block.push(format!("{indent}<ui:include src=\"{include_name}\" />")),
            Format::Pebble => block.push(format!("{indent}{{% include \"{include_name}\" %}}")),
            Format::Other => block.extend(body.iter().cloned()),
        }
        block.push(format!("{indent}<!-- @doBody end -->"));
        layout.splice(body_pos..body_pos, block);
    }

    /// Format-specific document adjustments, run once per document before
    /// section extraction and body splicing. Only [`Format::Jsp`] does
    /// anything: it normalizes the page directive.
    ///
    /// # Errors
    ///
    /// - `MergeError::UnterminatedBlock` if a page directive has no `%>`.
    /// - `MergeError::DuplicateDirective` on a second page directive.
    pub fn normalize(self, source: &mut Source, doc_name: &str, is_layout: bool) -> Result<()> {
        match self {
            Format::Jsp => normalize_page_directive(source, doc_name, is_layout),
            Format::Facelet | Format::Pebble | Format::Other => Ok(()),
        }
    }
}

/// Extracts the single `<%@ page ... %>` block. Views just lose it; layouts
/// get it back as line 0 with `session="false"` and
/// `trimDirectiveWhitespaces="true"` defaulted in when absent and
/// `pageEncoding` forced to UTF-8. A layout with no directive at all gets a
/// fully-default one.
fn normalize_page_directive(source: &mut Source, doc_name: &str, is_layout: bool) -> Result<()> {
    let mut directive: Option<String> = None;
    loop {
        let start = source::find_next(source, 0, &PAGE_DIRECTIVE_START);
        if start == source.len() {
            break;
        }
        let end = source::find_next(source, start, &DIRECTIVE_END);
        if end == source.len() {
            return Err(MergeError::UnterminatedBlock {
                directive: source[start].clone(),
                doc: doc_name.to_string(),
            });
        }
        if directive.is_some() {
            return Err(MergeError::DuplicateDirective {
                directive: "<%@ page ... %>".to_string(),
                doc: doc_name.to_string(),
            });
        }
        directive = Some(
            source[start..=end]
                .iter()
                .map(|line| line.trim())
                .collect::<Vec<_>>()
                .join(" "),
        );
        source::remove_range(source, start, end);
    }

    if !is_layout {
        return Ok(());
    }

    match directive {
        Some(mut dir) => {
            if !SESSION_ATTR.is_match(&dir) {
                dir = add_directive_attribute(&dir, " session=\"false\"");
            }
            if !TRIM_WHITESPACE_ATTR.is_match(&dir) {
                dir = add_directive_attribute(&dir, " trimDirectiveWhitespaces=\"true\"");
            }
            if PAGE_ENCODING_ATTR.is_match(&dir) {
                dir = PAGE_ENCODING_ATTR
                    .replace_all(&dir, "pageEncoding=\"UTF-8\"")
                    .into_owned();
            } else {
                dir = add_directive_attribute(&dir, " pageEncoding=\"UTF-8\"");
            }
            dir = MULTI_SPACE.replace_all(&dir, " ").into_owned();
            source.insert(0, dir);
        }
        None => source.insert(0, DEFAULT_PAGE_DIRECTIVE.to_string()),
    }
    Ok(())
}

fn add_directive_attribute(directive: &str, attribute: &str) -> String {
    match directive.rfind("%>") {
        Some(idx) => format!("{}{attribute}%>", &directive[..idx]),
        None => format!("{directive}{attribute}"),
    }
}

/// Suffix-keyed format bindings, with [`Format::Other`] as the fallback for
/// unrecognized suffixes. Built once at setup; callers may register extra
/// bindings before processing begins, after which the registry is read-only.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    bindings: HashMap<String, Format>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self {
            bindings: HashMap::new(),
        };
        registry.register(".jsp", Format::Jsp);
        registry.register(".jspx", Format::Jsp);
        registry.register(".xhtml", Format::Facelet);
        registry.register(".peb", Format::Pebble);
        registry
    }
}

impl FormatRegistry {
    /// Binds a file suffix (with leading dot) to a format.
    pub fn register(&mut self, suffix: impl Into<String>, format: Format) {
        self.bindings.insert(suffix.into(), format);
    }

    /// Resolves a suffix to its format, falling back to [`Format::Other`].
    pub fn lookup(&self, suffix: &str) -> Format {
        self.bindings.get(suffix).copied().unwrap_or(Format::Other)
    }
}
