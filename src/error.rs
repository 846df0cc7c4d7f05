use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::layout::LayoutError;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller input rejected before anything touched the filesystem.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse error in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("lookup failed: {0}")]
    Lookup(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP-equivalent status a request dispatcher should report.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            _ => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<LayoutError> for Error {
    fn from(value: LayoutError) -> Self {
        Error::Validation(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::Validation("too many".into()).status_code(), 400);
        assert_eq!(Error::NotFound("msg".into()).status_code(), 404);
        assert_eq!(Error::Lookup("partner".into()).status_code(), 500);
        let io_err = Error::io("/tmp/x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(io_err.status_code(), 500);
    }

    #[test]
    fn layout_errors_become_validation() {
        let err: Error = LayoutError::EmptyComponent { field: "filename" }.into();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn missing_file_counts_as_not_found() {
        let err = Error::io("/nope", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
    }
}
