//! # viewmerge
//!
//! A build-time template composition library and CLI tool for merging page
//! "view" documents with shared "layout" documents. Views declare variables,
//! named sections, and a layout; layouts declare placeholders; viewmerge
//! stitches them into final output documents, one per view, working purely
//! on ordered sequences of text lines.
//!
//! ## Features
//!
//! - Inline `<!-- @variables -->` blocks and external `name=value` files
//! - `@( name )` placeholder substitution (case-insensitive names)
//! - Named `<!-- @section begin/end -->` blocks injected into layout slots
//! - Per-format body splicing (JSP, Facelet, Pebble, pass-through)
//! - Full-tree rebuild: non-view files are mirrored byte-for-byte
//!
//! ## Usage
//!
//! ### As a Library
//!
//! ```no_run
//! use viewmerge::{FormatRegistry, MergeConfig, Processor};
//!
//! let config = MergeConfig::new("WebContent/WEB-INF/__views");
//! let mut processor = Processor::new(config, FormatRegistry::default());
//!
//! match processor.run() {
//!     Ok(()) => println!("done"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! ### As a CLI Tool
//!
//! ```bash
//! # Merge a views tree
//! viewmerge WebContent/WEB-INF/__views
//!
//! # Strip blank lines and dump merged variables into each output
//! viewmerge __views --remove-blank-lines --debug-variables
//!
//! # Inspect what would be processed
//! viewmerge __views --list=detailed
//! ```

pub mod error;
pub mod format;
pub mod pipeline;
pub mod sections;
pub mod source;
pub mod variables;

// Re-export main types and functions for convenience
pub use error::{MergeError, Result};
pub use format::{Format, FormatRegistry};
pub use pipeline::{
    DEFAULT_VIEW_SUFFIXES, MergeConfig, Processor, collect_view_paths, include_view_name,
    layout_file_name, view_suffix,
};
pub use sections::{Sections, extract_sections, inject_sections};
pub use variables::{Variables, substitute, variables_from};
