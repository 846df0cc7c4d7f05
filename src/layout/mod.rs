//! Directory conventions of the gateway's file-based submission and delivery folders.
//!
//! ```text
//! {outbox}/
//! ├── {message_id}.mmd                 ← metadata document, written last
//! ├── payloads/
//! │   ├── {message_id}_payload.xml     ← envelope document
//! │   └── {attachment file names}
//! └── .staging/{message_id}-{nanos}/   ← private mirror of the above while a submission is built
//! ```
//!
//! Part locations inside metadata documents are always relative to the
//! package root and use `/` separators.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

pub const PAYLOADS_DIR: &str = "payloads";
pub const STAGING_DIR: &str = ".staging";
pub const METADATA_EXTENSION: &str = "mmd";
const ENVELOPE_SUFFIX: &str = "_payload.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    EmptyComponent { field: &'static str },
    InvalidComponent { field: &'static str, value: String },
    EscapesRoot { value: String },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::EmptyComponent { field } => {
                write!(f, "empty path component: {field}")
            }
            LayoutError::InvalidComponent { field, value } => {
                write!(f, "invalid path component for {field}: {value}")
            }
            LayoutError::EscapesRoot { value } => {
                write!(f, "location escapes the package root: {value}")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

type Result<T> = std::result::Result<T, LayoutError>;

#[derive(Debug, Clone)]
pub struct OutboxLayout {
    root: PathBuf,
}

impl OutboxLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn payloads_dir(&self) -> PathBuf {
        self.root.join(PAYLOADS_DIR)
    }

    pub fn metadata_path(&self, message_id: &str) -> Result<PathBuf> {
        validate_component("message_id", message_id)?;
        Ok(self
            .root
            .join(format!("{message_id}.{METADATA_EXTENSION}")))
    }

    pub fn envelope_file_name(message_id: &str) -> Result<String> {
        validate_component("message_id", message_id)?;
        Ok(format!("{message_id}{ENVELOPE_SUFFIX}"))
    }

    pub fn payload_path(&self, file_name: &str) -> Result<PathBuf> {
        validate_component("filename", file_name)?;
        Ok(self.payloads_dir().join(file_name))
    }

    /// Location string recorded in a part reference for a file under `payloads/`.
    pub fn payload_location(file_name: &str) -> String {
        format!("{PAYLOADS_DIR}/{file_name}")
    }

    /// A layout rooted at a private staging directory that mirrors this one.
    pub fn staging(&self, message_id: &str, nanos: i128) -> Result<OutboxLayout> {
        validate_component("message_id", message_id)?;
        Ok(OutboxLayout::new(
            self.root
                .join(STAGING_DIR)
                .join(format!("{message_id}-{nanos}")),
        ))
    }
}

/// Resolves a part location (as written in a metadata document or a part
/// property) against a package root. Absolute paths and `..` are rejected.
pub fn resolve_location(root: &Path, location: &str) -> Result<PathBuf> {
    if location.trim().is_empty() {
        return Err(LayoutError::EmptyComponent { field: "location" });
    }
    if location.contains('\0') {
        return Err(LayoutError::InvalidComponent {
            field: "location",
            value: location.to_string(),
        });
    }
    let normalized = location.replace('\\', "/");
    let relative = Path::new(&normalized);
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(LayoutError::EscapesRoot {
                    value: location.to_string(),
                });
            }
        }
    }
    Ok(resolved)
}

pub fn validate_component(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LayoutError::EmptyComponent { field });
    }
    if value == "." || value == ".." || value.contains('/') || value.contains('\\') {
        return Err(LayoutError::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    if value.contains('\0') {
        return Err(LayoutError::InvalidComponent {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Replaces characters that are unsafe in file names on common filesystems.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '/' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Replaces `path` with `data` via a sibling temp file and rename, so readers
/// see either the old contents or the new ones.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_path() {
        let layout = OutboxLayout::new("/data/msg_out");
        let path = layout.metadata_path("msg_42").expect("metadata path");
        assert_eq!(path, PathBuf::from("/data/msg_out/msg_42.mmd"));
    }

    #[test]
    fn envelope_lives_under_payloads() {
        let layout = OutboxLayout::new("/data/msg_out");
        let name = OutboxLayout::envelope_file_name("msg_42").expect("envelope name");
        assert_eq!(name, "msg_42_payload.xml");
        let path = layout.payload_path(&name).expect("payload path");
        assert_eq!(
            path,
            PathBuf::from("/data/msg_out/payloads/msg_42_payload.xml")
        );
        assert_eq!(
            OutboxLayout::payload_location(&name),
            "payloads/msg_42_payload.xml"
        );
    }

    #[test]
    fn staging_mirrors_outbox() {
        let layout = OutboxLayout::new("/data/msg_out");
        let staging = layout.staging("msg_42", 7).expect("staging");
        assert_eq!(
            staging.metadata_path("msg_42").unwrap(),
            PathBuf::from("/data/msg_out/.staging/msg_42-7/msg_42.mmd")
        );
    }

    #[test]
    fn reject_invalid_component() {
        let layout = OutboxLayout::new("/data/msg_out");
        let err = layout.payload_path("../etc/passwd").unwrap_err();
        assert!(matches!(err, LayoutError::InvalidComponent { .. }));
        let err = layout.metadata_path("").unwrap_err();
        assert!(matches!(err, LayoutError::EmptyComponent { .. }));
    }

    #[test]
    fn resolve_relative_locations() {
        let root = Path::new("/data/msg_in");
        assert_eq!(
            resolve_location(root, "payloads/a.pdf").unwrap(),
            PathBuf::from("/data/msg_in/payloads/a.pdf")
        );
        assert_eq!(
            resolve_location(root, "payloads\\b.pdf").unwrap(),
            PathBuf::from("/data/msg_in/payloads/b.pdf")
        );
        assert!(matches!(
            resolve_location(root, "../secret"),
            Err(LayoutError::EscapesRoot { .. })
        ));
        assert!(matches!(
            resolve_location(root, "/etc/passwd"),
            Err(LayoutError::EscapesRoot { .. })
        ));
    }

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_file_name("ACME: EU/West?"), "ACME_ EU_West_");
    }
}
