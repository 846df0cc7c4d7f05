use std::fs::ReadDir;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::document::InboundDocument;
use crate::error::{Error, Result};

use super::correlator::load_document;
use super::ScanOptions;

/// One inbox entry as listed, without cross-file correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub date: String,
    pub subject: String,
    pub file_name: String,
}

/// Lazy pass over the inbox. Each file is parsed on demand; entries that
/// fail to parse or lack id, sender, receiver or timestamp are skipped.
/// Yield order follows directory enumeration and is not stable.
pub struct InboxListing {
    entries: ReadDir,
    options: ScanOptions,
}

impl InboxListing {
    pub fn open(dir: &Path, options: ScanOptions) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|err| Error::io(dir, err))?;
        Ok(Self { entries, options })
    }
}

impl Iterator for InboxListing {
    type Item = MessageSummary;

    fn next(&mut self) -> Option<MessageSummary> {
        for entry in self.entries.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable inbox entry: {err}");
                    continue;
                }
            };
            let path = entry.path();
            if !self.options.is_candidate(&path) {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let root = match load_document(&path) {
                Ok(root) => root,
                Err(reason) => {
                    warn!("skipping {file_name}: {reason}");
                    continue;
                }
            };
            let envelope = match InboundDocument::from_element(&root) {
                Some(InboundDocument::Envelope(envelope)) => envelope,
                Some(InboundDocument::Metadata(doc)) => {
                    debug!("skipping {file_name}: metadata for {}", doc.message_id);
                    continue;
                }
                None => {
                    warn!("skipping {file_name}: not a message document");
                    continue;
                }
            };
            if !envelope.has_required_fields() {
                warn!("skipping {file_name}: missing id, sender, receiver or timestamp");
                continue;
            }
            return Some(MessageSummary {
                id: envelope.message_id,
                sender: envelope.sender,
                receiver: envelope.receiver,
                date: envelope.timestamp,
                subject: envelope.subject,
                file_name,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn messaging(id: &str, sender: &str) -> String {
        format!(
            r#"<Messaging><UserMessage>
                <MessageInfo><Timestamp>2026-01-24T08:30:00Z</Timestamp><MessageId>{id}</MessageId></MessageInfo>
                <PartyInfo><From><PartyId>{sender}</PartyId></From><To><PartyId>org:b</PartyId></To></PartyInfo>
            </UserMessage></Messaging>"#
        )
    }

    #[test]
    fn skips_invalid_and_incomplete_entries() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("ok.xml"), messaging("M-1", "org:a")).unwrap();
        fs::write(dir.path().join("nosender.xml"), messaging("M-2", "")).unwrap();
        fs::write(dir.path().join("broken.xml"), "<Messaging>").unwrap();
        fs::write(dir.path().join("ignored.txt"), messaging("M-3", "org:a")).unwrap();
        fs::write(
            dir.path().join("M-4.mmd"),
            "<MessageMetaData><MessageInfo><MessageId>M-4</MessageId></MessageInfo></MessageMetaData>",
        )
        .unwrap();

        let summaries: Vec<_> = InboxListing::open(dir.path(), ScanOptions::default())
            .unwrap()
            .collect();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "M-1");
        assert_eq!(summaries[0].file_name, "ok.xml");
        assert_eq!(summaries[0].date, "2026-01-24T08:30:00Z");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let err = InboxListing::open(&dir.path().join("absent"), ScanOptions::default())
            .err()
            .expect("missing dir");
        assert!(err.is_not_found());
    }
}
