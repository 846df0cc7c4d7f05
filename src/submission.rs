//! Outbound submission pipeline.
//!
//! A package is first written to a private staging directory, then moved
//! into the outbox in dependency order: attachments, envelope, and the
//! metadata document last. The engine only picks up metadata documents, so
//! it never sees a package whose parts are still missing. Any failure
//! removes the staging directory and every file already moved.
//!
//! When routing is configured, the active P-Mode is switched only after the
//! package has been staged, and switched back if moving it into the outbox
//! fails.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::{AgreementConfig, BridgeConfig, Limits};
use crate::document::{build_envelope, build_metadata, AttachmentRef, PackageInfo};
use crate::error::{Error, Result};
use crate::layout::{validate_component, OutboxLayout};
use crate::template::{PModeActivator, PModeSnapshot, RoutingMode};

pub const SUCCESS_MESSAGE: &str = "Message processed successfully";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub sender: String,
    pub receiver: String,
    pub service: String,
    pub action: String,
    /// Falls back to the configured default conversation.
    pub conversation_id: Option<String>,
    /// Generated as `msg_<unix nanos>` when absent.
    pub message_id: Option<String>,
    /// Free text or an XML fragment; may be empty.
    pub payload: String,
    pub subject: Option<String>,
    pub routing: RoutingMode,
    pub attachments: Vec<AttachmentUpload>,
}

impl SubmissionRequest {
    pub fn total_attachment_bytes(&self) -> u64 {
        self.attachments.iter().map(|a| a.data.len() as u64).sum()
    }

    /// Whether the package carries an envelope document. Attachment-only
    /// submissions with an empty payload do not.
    pub fn needs_envelope(&self) -> bool {
        !self.payload.is_empty() || self.attachments.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub message: String,
    pub message_id: String,
}

pub struct Submitter {
    layout: OutboxLayout,
    limits: Limits,
    agreement: AgreementConfig,
    clock: Arc<dyn Clock>,
    activator: Option<PModeActivator>,
}

impl Submitter {
    pub fn new(config: &BridgeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            layout: OutboxLayout::new(&config.outbox_dir),
            limits: config.limits.clone(),
            agreement: config.agreement.clone(),
            clock,
            activator: None,
        }
    }

    /// Activate the routing P-Mode for the receiver before each submission.
    pub fn with_activator(mut self, activator: PModeActivator) -> Self {
        self.activator = Some(activator);
        self
    }

    pub fn layout(&self) -> &OutboxLayout {
        &self.layout
    }

    /// Checks limits and names. Runs before anything touches the filesystem.
    pub fn validate(&self, request: &SubmissionRequest) -> Result<()> {
        if request.sender.trim().is_empty() || request.receiver.trim().is_empty() {
            return Err(Error::Validation(
                "sender and receiver are required".to_string(),
            ));
        }
        if request.attachments.len() > self.limits.max_attachments {
            return Err(Error::Validation(format!(
                "too many attachments: {} (max {})",
                request.attachments.len(),
                self.limits.max_attachments
            )));
        }
        let total = request.total_attachment_bytes();
        if total > self.limits.max_total_attachment_bytes {
            return Err(Error::Validation(format!(
                "attachments total {total} bytes (max {})",
                self.limits.max_total_attachment_bytes
            )));
        }
        if let Some(id) = &request.message_id {
            validate_component("message_id", id)?;
        }
        for attachment in &request.attachments {
            validate_component("filename", &attachment.file_name)?;
        }
        Ok(())
    }

    pub fn submit(&self, request: SubmissionRequest) -> Result<SubmissionReceipt> {
        self.validate(&request)?;

        let nanos = self.clock.unix_nanos();
        let message_id = request
            .message_id
            .clone()
            .unwrap_or_else(|| format!("msg_{nanos}"));
        let conversation_id = request
            .conversation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.agreement.default_conversation_id.clone());

        let staging = self.layout.staging(&message_id, nanos)?;
        let staged = match self.stage(&staging, &request, &message_id, &conversation_id) {
            Ok(staged) => staged,
            Err(err) => {
                discard_staging(&staging);
                return Err(err);
            }
        };

        let previous_pmode = match self.activate(&request) {
            Ok(previous) => previous,
            Err(err) => {
                discard_staging(&staging);
                return Err(err);
            }
        };

        let result = self.commit(&staged);
        discard_staging(&staging);
        if let Err(err) = result {
            if let (Some(activator), Some(previous)) = (&self.activator, previous_pmode) {
                if let Err(restore) = activator.restore(previous) {
                    warn!("could not restore active pmode: {restore}");
                }
            }
            return Err(err);
        }

        info!(
            "submitted message_id={} receiver={} attachments={} envelope={}",
            message_id,
            request.receiver,
            request.attachments.len(),
            request.needs_envelope()
        );
        Ok(SubmissionReceipt {
            message: SUCCESS_MESSAGE.to_string(),
            message_id,
        })
    }

    /// Activates the routing P-Mode when an activator is configured and
    /// returns what the active file held before.
    fn activate(&self, request: &SubmissionRequest) -> Result<Option<PModeSnapshot>> {
        let Some(activator) = &self.activator else {
            return Ok(None);
        };
        let previous = activator.snapshot()?;
        activator.activate(&request.receiver, request.routing)?;
        Ok(Some(previous))
    }

    /// Writes the complete package under `staging`. Returns (staged, final)
    /// path pairs in commit order.
    fn stage(
        &self,
        staging: &OutboxLayout,
        request: &SubmissionRequest,
        message_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<(PathBuf, PathBuf)>> {
        let payloads = staging.payloads_dir();
        fs::create_dir_all(&payloads).map_err(|err| Error::io(&payloads, err))?;

        let mut moves: Vec<(PathBuf, PathBuf)> = Vec::new();
        let mut attachments = Vec::with_capacity(request.attachments.len());
        for upload in &request.attachments {
            let path = staging.payload_path(&upload.file_name)?;
            fs::write(&path, &upload.data).map_err(|err| Error::io(&path, err))?;
            info!(
                "stored attachment {} ({} bytes, {})",
                upload.file_name,
                upload.data.len(),
                if upload.content_type.is_empty() {
                    "unknown type"
                } else {
                    upload.content_type.as_str()
                }
            );
            let target = self.layout.payload_path(&upload.file_name)?;
            // Repeated names overwrite; the file is moved once.
            if !moves.iter().any(|(_, existing)| existing == &target) {
                moves.push((path, target));
            }
            attachments.push(AttachmentRef {
                location: OutboxLayout::payload_location(&upload.file_name),
                mime_type: upload.content_type.clone(),
            });
        }

        let envelope_location = if request.needs_envelope() {
            let name = OutboxLayout::envelope_file_name(message_id)?;
            let bytes = build_envelope(request, message_id, conversation_id, self.clock.as_ref())?;
            let path = staging.payload_path(&name)?;
            fs::write(&path, bytes).map_err(|err| Error::io(&path, err))?;
            moves.push((path, self.layout.payload_path(&name)?));
            Some(OutboxLayout::payload_location(&name))
        } else {
            None
        };

        let pmode = match request.routing {
            RoutingMode::Push => &self.agreement.push_pmode,
            RoutingMode::Response => &self.agreement.response_pmode,
        };
        let package = PackageInfo {
            message_id: message_id.to_string(),
            timestamp: self.clock.timestamp(),
            pmode: pmode.clone(),
            conversation_id: conversation_id.to_string(),
        };
        let metadata = build_metadata(
            &package,
            &request.service,
            &request.action,
            envelope_location.as_deref(),
            &attachments,
        )?;
        let path = staging.metadata_path(message_id)?;
        fs::write(&path, metadata).map_err(|err| Error::io(&path, err))?;
        moves.push((path, self.layout.metadata_path(message_id)?));

        Ok(moves)
    }

    fn commit(&self, moves: &[(PathBuf, PathBuf)]) -> Result<()> {
        let payloads = self.layout.payloads_dir();
        fs::create_dir_all(&payloads).map_err(|err| Error::io(&payloads, err))?;

        for (index, (from, to)) in moves.iter().enumerate() {
            if let Err(err) = fs::rename(from, to) {
                warn!(
                    "moving {} failed, rolling back {} files: {err}",
                    to.display(),
                    index
                );
                for (_, moved) in &moves[..index] {
                    if let Err(cleanup) = fs::remove_file(moved) {
                        warn!("rollback could not remove {}: {cleanup}", moved.display());
                    }
                }
                return Err(Error::io(to, err));
            }
        }
        Ok(())
    }
}

fn discard_staging(staging: &OutboxLayout) {
    if let Err(err) = fs::remove_dir_all(staging.root()) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("could not remove staging dir {}: {err}", staging.root().display());
        }
    }
}
