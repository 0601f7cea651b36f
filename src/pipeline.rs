use crate::error::{MergeError, Result};
use crate::format::{Format, FormatRegistry};
use crate::sections;
use crate::source::{self, Source};
use crate::variables::{self, Variables};
use globset::GlobSet;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

// <!-- @doBody -->
static DO_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*<!--\s*@doBody\s*-->\s*$").unwrap());

/// View suffixes recognized out of the box.
pub const DEFAULT_VIEW_SUFFIXES: &[&str] = &[".jsp", ".jspx", ".xhtml", ".peb"];

/// Configuration for a merge run.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Input views tree
    pub input_dir: PathBuf,
    /// Output root, deleted and rebuilt on every run
    pub output_dir: PathBuf,
    /// Directory holding layouts and variable files, excluded from traversal
    pub config_dir: PathBuf,
    /// Recognized view-file suffixes (with leading dot)
    pub view_suffixes: Vec<String>,
    /// Strip all-whitespace lines from both documents before normalization
    pub remove_blank_lines: bool,
    /// Append the merged variable table to each view before section extraction
    pub debug_variables: bool,
    /// Input files matching any of these globs (relative paths) are skipped
    pub exclude: Option<GlobSet>,
}

impl MergeConfig {
    /// Builds a config for `input_dir` with the conventional defaults: output
    /// in a `views` sibling of the input root, config in a `__config`
    /// subdirectory, the default suffix set, both options off.
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        let output_dir = input_dir
            .parent()
            .map_or_else(|| PathBuf::from("views"), |parent| parent.join("views"));
        let config_dir = input_dir.join("__config");
        Self {
            input_dir,
            output_dir,
            config_dir,
            view_suffixes: DEFAULT_VIEW_SUFFIXES.iter().map(|s| (*s).to_string()).collect(),
            remove_blank_lines: false,
            debug_variables: false,
            exclude: None,
        }
    }

    /// Whether `file_name` carries one of the configured view suffixes.
    pub fn is_view_file(&self, file_name: &str) -> bool {
        self.view_suffixes
            .iter()
            .any(|suffix| file_name.ends_with(suffix.as_str()))
    }
}

/// The view's file suffix including the dot, or `""` when there is none.
pub fn view_suffix(view_name: &str) -> &str {
    view_name.rfind('.').map_or("", |idx| &view_name[idx..])
}

/// The name of the separately materialized body file for a view:
/// `index.jsp` becomes `index.inc.jsp`.
pub fn include_view_name(view_name: &str) -> String {
    match view_name.rfind('.') {
        Some(idx) => format!("{}.inc{}", &view_name[..idx], &view_name[idx..]),
        None => format!("{view_name}.inc"),
    }
}

/// Resolves the `__layout` variable to a layout file name (the variable's
/// value plus the view's own suffix). `None` means the view declares no
/// layout and is emitted as-is.
///
/// # Errors
///
/// Returns `MergeError::InvalidLayoutReference` when `__layout` is present
/// but empty.
pub fn layout_file_name(view_name: &str, variables: &Variables) -> Result<Option<String>> {
    match variables.get("__layout") {
        None => Ok(None),
        Some(value) if value.is_empty() => Err(MergeError::InvalidLayoutReference {
            view: view_name.to_string(),
        }),
        Some(value) => Ok(Some(format!("{value}{}", view_suffix(view_name)))),
    }
}

/// Enumerates the view files under the input root as paths relative to it,
/// honoring the same config-dir/output-dir/exclude skips as a full run.
///
/// # Errors
///
/// Returns `MergeError::WalkDir` on traversal failures.
pub fn collect_view_paths(config: &MergeConfig) -> Result<Vec<PathBuf>> {
    let config_dir = config.config_dir.clone();
    let output_dir = config.output_dir.clone();
    let mut views = Vec::new();
    for entry in WalkDir::new(&config.input_dir)
        .into_iter()
        .filter_entry(move |entry| {
            entry.path() != config_dir.as_path() && entry.path() != output_dir.as_path()
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(&config.input_dir).unwrap_or(path);
        if let Some(exclude) = &config.exclude
            && exclude.is_match(relative)
        {
            continue;
        }
        if config.is_view_file(&entry.file_name().to_string_lossy()) {
            views.push(relative.to_path_buf());
        }
    }
    Ok(views)
}

/// Batch view processor: walks the input tree, merges every view file with
/// its layout, and mirrors everything else to the output tree unchanged.
///
/// Single-threaded and fail-fast: the first error aborts the batch, leaving
/// outputs already written by earlier iterations in place.
pub struct Processor {
    config: MergeConfig,
    registry: FormatRegistry,
    // immutable layout snapshots keyed by file name; checkouts are copies
    layout_cache: HashMap<String, Source>,
}

impl Processor {
    pub fn new(config: MergeConfig, registry: FormatRegistry) -> Self {
        Self {
            config,
            registry,
            layout_cache: HashMap::new(),
        }
    }

    /// Runs the full batch: deletes the output root, then rebuilds it from
    /// the input tree.
    ///
    /// # Errors
    ///
    /// - `MergeError::MissingResource` if the input root does not exist.
    /// - Any error from merging an individual view (see [`MergeError`]).
    pub fn run(&mut self) -> Result<()> {
        if !self.config.input_dir.is_dir() {
            return Err(MergeError::MissingResource {
                path: self.config.input_dir.clone(),
            });
        }
        if self.config.output_dir.exists() {
            fs::remove_dir_all(&self.config.output_dir)?;
        }

        let config_dir = self.config.config_dir.clone();
        let output_dir = self.config.output_dir.clone();
        let walker = WalkDir::new(&self.config.input_dir)
            .into_iter()
            .filter_entry(move |entry| {
                entry.path() != config_dir.as_path() && entry.path() != output_dir.as_path()
            });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.config.input_dir).unwrap_or(path);
            if let Some(exclude) = &self.config.exclude
                && exclude.is_match(relative)
            {
                debug!(path = %relative.display(), "excluded");
                continue;
            }

            let target = self.config.output_dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            if self.config.is_view_file(&file_name) {
                info!(view = %relative.display(), "merging view");
                self.merge_view(path, &target, &file_name)?;
            } else {
                debug!(path = %relative.display(), "copying through");
                fs::copy(path, &target)?;
            }
        }
        Ok(())
    }

    /// Merges a single view file into its layout (when it names one) and
    /// writes the result(s) to `target`.
    fn merge_view(&mut self, view_path: &Path, target: &Path, view_name: &str) -> Result<()> {
        let mut view = source::read_lines(view_path)?;

        // the view's own variables come first so `__layout` is known before
        // anything else is loaded
        let mut view_variables = Variables::new();
        variables::parse_inline_variables(&mut view, view_name, &mut view_variables)?;

        let layout_name = layout_file_name(view_name, &view_variables)?;

        let mut merged = Variables::new();
        let mut layout: Option<Source> = None;
        if let Some(layout_name) = &layout_name {
            let mut layout_source = self.checkout_layout(layout_name)?;
            variables::import_file_variables(
                &mut layout_source,
                &self.config.config_dir,
                &mut merged,
            )?;
            variables::parse_inline_variables(&mut layout_source, layout_name, &mut merged)?;
            layout = Some(layout_source);
        }
        // view variables overlay everything sourced through the layout
        for (name, value) in view_variables {
            merged.insert(name, value);
        }

        if let Some(layout_source) = &mut layout {
            variables::substitute(layout_source, &merged);
        }
        variables::substitute(&mut view, &merged);

        if self.config.debug_variables {
            view.extend(variables::to_debug_lines(&merged));
        }
        if self.config.remove_blank_lines {
            if let Some(layout_source) = &mut layout {
                source::remove_blank_lines(layout_source);
            }
            source::remove_blank_lines(&mut view);
        }

        let format = self.registry.lookup(view_suffix(view_name));
        if let (Some(layout_source), Some(layout_name)) = (&mut layout, &layout_name) {
            format.normalize(layout_source, layout_name, true)?;
        }
        format.normalize(&mut view, view_name, false)?;

        let captured = sections::extract_sections(&mut view, view_name)?;

        match (layout, layout_name) {
            (Some(mut layout_source), Some(layout_name)) => {
                splice_body(&mut layout_source, &layout_name, &view, view_name, format)?;
                sections::inject_sections(&mut layout_source, view_name, &captured)?;

                if format.needs_include_file() {
                    let include_target = target.with_file_name(include_view_name(view_name));
                    source::write_lines(&view, &include_target)?;
                }
                source::write_lines(&layout_source, target)?;
            }
            _ => {
                source::write_lines(&view, target)?;
            }
        }
        Ok(())
    }

    /// Checks a layout out of the read cache, loading it on first use. Every
    /// checkout is an independent copy of the cached snapshot, so callers
    /// mutate freely without corrupting later checkouts.
    fn checkout_layout(&mut self, layout_name: &str) -> Result<Source> {
        if let Some(cached) = self.layout_cache.get(layout_name) {
            return Ok(cached.clone());
        }
        let lines = source::read_lines(&self.config.config_dir.join(layout_name))?;
        self.layout_cache.insert(layout_name.to_string(), lines.clone());
        Ok(lines)
    }
}

/// Replaces the layout's single `<!-- @doBody -->` placeholder with the
/// format's body insertion, carrying the placeholder's indentation over to
/// the inserted marker lines.
fn splice_body(
    layout: &mut Source,
    layout_name: &str,
    body: &[String],
    view_name: &str,
    format: Format,
) -> Result<()> {
    let mut spliced = false;
    loop {
        let pos = source::find_next(layout, 0, &DO_BODY);
        if pos == layout.len() {
            break;
        }
        if spliced {
            return Err(MergeError::DuplicateBody {
                layout: layout_name.to_string(),
            });
        }
        let indent = source::leading_whitespace(&layout[pos]).to_string();
        layout.remove(pos);
        format.insert_body(layout, pos, &indent, body, &include_view_name(view_name));
        spliced = true;
    }
    if spliced {
        Ok(())
    } else {
        Err(MergeError::MissingBody {
            layout: layout_name.to_string(),
        })
    }
}
