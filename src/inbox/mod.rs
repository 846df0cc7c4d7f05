//! Read path over the engine's delivery folder.
//!
//! Nothing is cached: every lookup and listing re-reads the directory, so
//! results always reflect the on-disk state at call time.

pub mod assembler;
pub mod correlator;
pub mod listing;

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::layout::resolve_location;

pub use assembler::{
    assemble, InboundAttachment, InboundMessage, MatchedFields, SecurityDescriptor,
    SecurityResolver,
};
pub use correlator::{find_message, Correlation};
pub use listing::{InboxListing, MessageSummary};

/// Which files a scan considers and how attachment URLs are formed.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub extensions: Vec<String>,
    pub attachment_url_prefix: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

impl ScanOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            extensions: config.candidate_extensions.clone(),
            attachment_url_prefix: config.attachment_url_prefix.clone(),
        }
    }

    pub fn is_candidate(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    pub fn attachment_url(&self, location: &str) -> String {
        format!("{}{}", self.attachment_url_prefix, location.replace('\\', "/"))
    }
}

/// An attachment opened for streaming to a caller.
#[derive(Debug)]
pub struct AttachmentDownload {
    pub file: File,
    pub file_name: String,
    pub len: u64,
    /// `Content-Disposition` value forcing a download.
    pub content_disposition: String,
}

pub struct Inbox {
    root: PathBuf,
    options: ScanOptions,
    security: Option<SecurityResolver>,
}

impl Inbox {
    pub fn new(config: &BridgeConfig) -> Self {
        Self::at(&config.inbox_dir, ScanOptions::from_config(config))
    }

    pub fn at(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
            security: None,
        }
    }

    /// Enrich retrieved messages with the sender's keystore details.
    pub fn with_security(mut self, resolver: SecurityResolver) -> Self {
        self.security = Some(resolver);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn find_message(&self, message_id: &str) -> Result<InboundMessage> {
        let correlation = find_message(&self.root, message_id, &self.options)?;
        Ok(assemble(
            correlation.fields,
            correlation.attachments,
            self.security.as_ref(),
        ))
    }

    /// A fresh pass over the directory; call again to rescan.
    pub fn list_messages(&self) -> Result<InboxListing> {
        InboxListing::open(&self.root, self.options.clone())
    }

    /// Opens `name` (a location relative to the inbox, as carried in an
    /// attachment URL) for download.
    pub fn open_attachment(&self, name: &str) -> Result<AttachmentDownload> {
        let path = resolve_location(&self.root, name)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Validation(format!("no file name in {name}")))?;
        let metadata = match path.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(Error::NotFound(format!("attachment {name}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("attachment {name}")))
            }
            Err(err) => return Err(Error::io(&path, err)),
        };
        let file = File::open(&path).map_err(|err| Error::io(&path, err))?;
        Ok(AttachmentDownload {
            file,
            content_disposition: format!(
                "attachment; filename=\"{}\"",
                file_name.replace('"', "")
            ),
            file_name,
            len: metadata.len(),
        })
    }
}
