use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for viewmerge operations.
///
/// Every variant names the offending document so a batch failure can be
/// traced back to its source file. All of these are fatal to the current
/// run: they indicate malformed input, not transient faults.
#[derive(Error, Debug)]
pub enum MergeError {
    /// IO error when reading, writing, or copying files
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A referenced variables file or layout document does not exist
    #[error("Resource does not exist: {path}")]
    MissingResource { path: PathBuf },

    /// A bracketed construct has no closing marker before document end
    #[error("{directive} must have a closing directive (doc={doc})")]
    UnterminatedBlock { directive: String, doc: String },

    /// An inline variable line is neither blank/comment nor `name=value`
    #[error("Variable is invalid (entry={entry}, doc={doc})")]
    MalformedVariable { entry: String, doc: String },

    /// A construct that must be unique within a document appears twice
    #[error("{directive} is duplicated (doc={doc})")]
    DuplicateDirective { directive: String, doc: String },

    /// A section's begin marker is followed by another begin marker
    /// before its matching end marker
    #[error("@{section} must have a closing directive (view={view})")]
    UnterminatedSection { section: String, view: String },

    /// The same section name is captured twice in one view
    #[error("@{section} is duplicated (view={view})")]
    DuplicateSection { section: String, view: String },

    /// A layout contains more than one `@doBody` placeholder
    #[error("@doBody is duplicated (layout={layout})")]
    DuplicateBody { layout: String },

    /// A layout contains no `@doBody` placeholder
    #[error("@doBody is required (layout={layout})")]
    MissingBody { layout: String },

    /// A required section placeholder has no matching captured section
    #[error("@{section} is required (view={view})")]
    MissingSection { section: String, view: String },

    /// The `__layout` variable is present but empty
    #[error("__layout must not be empty (view={view})")]
    InvalidLayoutReference { view: String },

    /// `WalkDir` error when traversing the input tree
    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MergeError::MissingResource {
            path: PathBuf::from("/cfg/main.jsp"),
        };
        assert_eq!(format!("{err}"), "Resource does not exist: /cfg/main.jsp");

        let err = MergeError::UnterminatedBlock {
            directive: "@variables".to_string(),
            doc: "index.jsp".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "@variables must have a closing directive (doc=index.jsp)"
        );

        let err = MergeError::MalformedVariable {
            entry: "no-equals-sign".to_string(),
            doc: "index.jsp".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Variable is invalid (entry=no-equals-sign, doc=index.jsp)"
        );

        let err = MergeError::UnterminatedSection {
            section: "nav".to_string(),
            view: "index.jsp".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "@nav must have a closing directive (view=index.jsp)"
        );

        let err = MergeError::DuplicateBody {
            layout: "main.jsp".to_string(),
        };
        assert_eq!(format!("{err}"), "@doBody is duplicated (layout=main.jsp)");

        let err = MergeError::MissingBody {
            layout: "main.jsp".to_string(),
        };
        assert_eq!(format!("{err}"), "@doBody is required (layout=main.jsp)");

        let err = MergeError::MissingSection {
            section: "title".to_string(),
            view: "index.jsp".to_string(),
        };
        assert_eq!(format!("{err}"), "@title is required (view=index.jsp)");

        let err = MergeError::InvalidLayoutReference {
            view: "index.jsp".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "__layout must not be empty (view=index.jsp)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: MergeError = io_err.into();
        assert!(matches!(err, MergeError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: MergeError = json_err.into();
        assert!(matches!(err, MergeError::Json(_)));
    }
}
