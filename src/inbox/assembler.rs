//! Merges correlated fields into the caller-facing message view.

use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::directory::PartnerDirectory;
use crate::document::Dialect;
use crate::keystore::KeystoreQuery;

/// Fields recovered from the matched document and, for metadata matches,
/// the envelope it points at. Anything that could not be recovered is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFields {
    pub dialect: Dialect,
    pub message_id: String,
    pub content: String,
    pub sender: String,
    pub receiver: String,
    pub date: String,
    pub subject: String,
    pub service: String,
    pub action: String,
}

impl MatchedFields {
    pub fn empty(dialect: Dialect, message_id: &str) -> Self {
        Self {
            dialect,
            message_id: message_id.to_string(),
            content: String::new(),
            sender: String::new(),
            receiver: String::new(),
            date: String::new(),
            subject: String::new(),
            service: String::new(),
            action: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityDescriptor {
    pub keystore_alias: String,
    pub dname: String,
}

impl SecurityDescriptor {
    pub fn is_empty(&self) -> bool {
        self.keystore_alias.is_empty() && self.dname.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,
    pub content: String,
    pub sender: String,
    pub receiver: String,
    pub date: String,
    pub subject: String,
    pub service: String,
    pub action: String,
    pub attachments: Vec<InboundAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_info: Option<SecurityDescriptor>,
}

/// Resolves the sender's keystore alias and certificate owner.
pub struct SecurityResolver {
    directory: Arc<dyn PartnerDirectory>,
    keystore: Arc<dyn KeystoreQuery>,
}

impl SecurityResolver {
    pub fn new(directory: Arc<dyn PartnerDirectory>, keystore: Arc<dyn KeystoreQuery>) -> Self {
        Self {
            directory,
            keystore,
        }
    }

    /// Never fails: a lookup miss leaves the corresponding field empty.
    pub fn resolve(&self, party_id: &str) -> SecurityDescriptor {
        if party_id.is_empty() {
            return SecurityDescriptor::default();
        }
        let keystore_alias = match self.directory.keystore_alias(party_id) {
            Ok(alias) => alias,
            Err(err) => {
                warn!("no keystore alias for {party_id}: {err}");
                return SecurityDescriptor::default();
            }
        };
        let dname = match self.keystore.distinguished_name(&keystore_alias) {
            Ok(dname) => dname,
            Err(err) => {
                warn!("keystore query for alias {keystore_alias} failed: {err}");
                String::new()
            }
        };
        SecurityDescriptor {
            keystore_alias,
            dname,
        }
    }
}

pub fn assemble(
    fields: MatchedFields,
    attachments: Vec<InboundAttachment>,
    security: Option<&SecurityResolver>,
) -> InboundMessage {
    let security_info = security.map(|resolver| resolver.resolve(&fields.sender));
    InboundMessage {
        id: fields.message_id,
        content: fields.content,
        sender: fields.sender,
        receiver: fields.receiver,
        date: fields.date,
        subject: fields.subject,
        service: fields.service,
        action: fields.action,
        attachments,
        security_info,
    }
}
