use crate::error::{MergeError, Result};
use crate::source::{self, Source};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Named content blocks captured from a view, in capture order.
pub type Sections = IndexMap<String, Source>;

// <!-- @someSection begin -->
static SECTION_BEGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!--\s*@(\S+)\s+begin\s*-->\s*$").unwrap());

// <!-- @someSection end -->
static SECTION_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!--\s*@(\S+)\s+end\s*-->\s*$").unwrap());

// <!-- @someSection --> or <!-- @someSection? -->
static SECTION_SLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!--\s*@(\w+)(\??)\s*-->\s*$").unwrap());

/// Captures every delimited section out of `view`, removing each begin..end
/// range from the document in place.
///
/// Sections may not nest or interleave: the first begin marker after an open
/// section (before its matching end) is an error. Captured content is the
/// lines strictly between the markers, possibly empty.
///
/// # Errors
///
/// - `MergeError::UnterminatedSection` if a begin has no matching end, or
///   another begin appears first.
/// - `MergeError::DuplicateSection` if a section name is captured twice.
pub fn extract_sections(view: &mut Source, view_name: &str) -> Result<Sections> {
    let mut sections = Sections::new();
    loop {
        let Some((start, name)) = view.iter().enumerate().find_map(|(pos, line)| {
            SECTION_BEGIN
                .captures(line)
                .map(|caps| (pos, caps[1].to_string()))
        }) else {
            return Ok(sections);
        };

        let mut end = start + 1;
        let closing = loop {
            if end == view.len() || SECTION_BEGIN.is_match(&view[end]) {
                break None;
            }
            if let Some(caps) = SECTION_END.captures(&view[end])
                && caps[1] == name
            {
                break Some(end);
            }
            end += 1;
        };

        let Some(end) = closing else {
            return Err(MergeError::UnterminatedSection {
                section: name,
                view: view_name.to_string(),
            });
        };
        if sections.contains_key(&name) {
            return Err(MergeError::DuplicateSection {
                section: name,
                view: view_name.to_string(),
            });
        }

        let content = if end - start > 1 {
            source::copy_range(view, start + 1, end - 1)
        } else {
            Vec::new()
        };
        source::remove_range(view, start, end);
        sections.insert(name, content);
    }
}

/// Replaces every section placeholder in `layout` with the captured content,
/// re-wrapped in explicit begin/end marker lines so nested tooling can still
/// identify section boundaries in the output.
///
/// A `?`-suffixed placeholder is optional: with no captured section it
/// becomes a single `<!-- @name? undefined -->` comment line. A captured
/// section with no placeholder is silently unused.
///
/// # Errors
///
/// Returns `MergeError::MissingSection` for a required placeholder with no
/// captured section.
pub fn inject_sections(layout: &mut Source, view_name: &str, sections: &Sections) -> Result<()> {
    loop {
        let Some((pos, name, optional)) = layout.iter().enumerate().find_map(|(pos, line)| {
            SECTION_SLOT
                .captures(line)
                .map(|caps| (pos, caps[1].to_string(), &caps[2] == "?"))
        }) else {
            return Ok(());
        };

        match sections.get(&name) {
            Some(content) => {
                let mut block = Vec::with_capacity(content.len() + 2);
                block.push(format!("<!-- @{name} begin -->"));
                block.extend(content.iter().cloned());
                block.push(format!("<!-- @{name} end -->"));
                layout.splice(pos..=pos, block);
            }
            None if optional => {
                layout[pos] = format!("<!-- @{name}? undefined -->");
            }
            None => {
                return Err(MergeError::MissingSection {
                    section: name,
                    view: view_name.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Source {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_extract_sections_basic() {
        let mut view = lines(&[
            "<p>body</p>",
            "<!-- @nav begin -->",
            "<ul>",
            "</ul>",
            "<!-- @nav end -->",
            "<p>more</p>",
        ]);
        let sections = extract_sections(&mut view, "index.jsp").unwrap();

        assert_eq!(view, lines(&["<p>body</p>", "<p>more</p>"]));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections["nav"], lines(&["<ul>", "</ul>"]));
    }

    #[test]
    fn test_extract_sections_empty_and_multiple() {
        let mut view = lines(&[
            "<!-- @head begin -->",
            "<!-- @head end -->",
            "x",
            "<!-- @foot begin -->",
            "(c)",
            "<!-- @foot end -->",
        ]);
        let sections = extract_sections(&mut view, "index.jsp").unwrap();

        assert_eq!(view, lines(&["x"]));
        assert!(sections["head"].is_empty());
        assert_eq!(sections["foot"], lines(&["(c)"]));
    }

    #[test]
    fn test_extract_sections_keyword_case_insensitive() {
        let mut view = lines(&["<!-- @nav BEGIN -->", "a", "<!-- @nav End -->"]);
        let sections = extract_sections(&mut view, "index.jsp").unwrap();
        assert_eq!(sections["nav"], lines(&["a"]));
    }

    #[test]
    fn test_extract_sections_unterminated() {
        let mut view = lines(&["<!-- @nav begin -->", "a"]);
        let result = extract_sections(&mut view, "index.jsp");
        assert!(matches!(
            result,
            Err(MergeError::UnterminatedSection { .. })
        ));
    }

    #[test]
    fn test_extract_sections_no_nesting() {
        // a second begin before the close is an error, not a nested section
        let mut view = lines(&[
            "<!-- @outer begin -->",
            "<!-- @inner begin -->",
            "<!-- @inner end -->",
            "<!-- @outer end -->",
        ]);
        let result = extract_sections(&mut view, "index.jsp");
        assert!(matches!(
            result,
            Err(MergeError::UnterminatedSection { .. })
        ));
    }

    #[test]
    fn test_extract_sections_duplicate() {
        let mut view = lines(&[
            "<!-- @nav begin -->",
            "<!-- @nav end -->",
            "<!-- @nav begin -->",
            "<!-- @nav end -->",
        ]);
        let result = extract_sections(&mut view, "index.jsp");
        assert!(matches!(result, Err(MergeError::DuplicateSection { .. })));
    }

    #[test]
    fn test_extract_sections_foreign_end_is_content() {
        // an end marker for a different name does not close the open section
        let mut view = lines(&[
            "<!-- @nav begin -->",
            "<!-- @other end -->",
            "<!-- @nav end -->",
        ]);
        let sections = extract_sections(&mut view, "index.jsp").unwrap();
        assert_eq!(sections["nav"], lines(&["<!-- @other end -->"]));
    }

    #[test]
    fn test_inject_sections_round_trip() {
        let mut view = lines(&["<!-- @x begin -->", "A", "B", "<!-- @x end -->"]);
        let sections = extract_sections(&mut view, "index.jsp").unwrap();
        assert!(view.is_empty());

        let mut layout = lines(&["<!-- @x -->"]);
        inject_sections(&mut layout, "index.jsp", &sections).unwrap();
        assert_eq!(
            layout,
            lines(&["<!-- @x begin -->", "A", "B", "<!-- @x end -->"])
        );
    }

    #[test]
    fn test_inject_sections_required_missing() {
        let mut layout = lines(&["<!-- @missing -->"]);
        let result = inject_sections(&mut layout, "index.jsp", &Sections::new());
        assert!(matches!(result, Err(MergeError::MissingSection { .. })));
    }

    #[test]
    fn test_inject_sections_optional_missing() {
        let mut layout = lines(&["before", "  <!-- @missing? -->", "after"]);
        inject_sections(&mut layout, "index.jsp", &Sections::new()).unwrap();
        assert_eq!(
            layout,
            lines(&["before", "<!-- @missing? undefined -->", "after"])
        );
    }

    #[test]
    fn test_inject_sections_unused_section_ignored() {
        let mut view = lines(&["<!-- @spare begin -->", "s", "<!-- @spare end -->"]);
        let sections = extract_sections(&mut view, "index.jsp").unwrap();

        let mut layout = lines(&["<html>"]);
        inject_sections(&mut layout, "index.jsp", &sections).unwrap();
        assert_eq!(layout, lines(&["<html>"]));
    }

    #[test]
    fn test_inject_sections_multiple_slots() {
        let mut view = lines(&[
            "<!-- @a begin -->",
            "1",
            "<!-- @a end -->",
            "<!-- @b begin -->",
            "2",
            "<!-- @b end -->",
        ]);
        let sections = extract_sections(&mut view, "index.jsp").unwrap();

        let mut layout = lines(&["<!-- @a -->", "mid", "<!-- @b? -->"]);
        inject_sections(&mut layout, "index.jsp", &sections).unwrap();
        assert_eq!(
            layout,
            lines(&[
                "<!-- @a begin -->",
                "1",
                "<!-- @a end -->",
                "mid",
                "<!-- @b begin -->",
                "2",
                "<!-- @b end -->",
            ])
        );
    }
}
