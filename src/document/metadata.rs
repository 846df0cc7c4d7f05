use std::fmt;

use crate::error::{Error, Result};
use crate::xml::{DocumentError, Element, XmlWriter};

use super::{MMD_NS, MMD_SCHEMA_LOCATION, XSI_NS};

pub const ENVELOPE_PART_URI: &str = "soapPart";
pub const ENVELOPE_MIME_TYPE: &str = "application/xml";
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Containment {
    #[default]
    Attachment,
    Inline,
}

impl Containment {
    pub fn as_str(self) -> &'static str {
        match self {
            Containment::Attachment => "attachment",
            Containment::Inline => "inline",
        }
    }

    /// Unknown values are read as `attachment`, the engine's default.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("inline") {
            Containment::Inline
        } else {
            Containment::Attachment
        }
    }
}

impl fmt::Display for Containment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReference {
    pub uri: String,
    pub containment: Containment,
    pub mime_type: String,
    /// Path relative to the package root, `/`-separated.
    pub location: String,
}

impl PartReference {
    pub fn is_envelope(&self) -> bool {
        self.uri == ENVELOPE_PART_URI
            || (self.mime_type.trim().eq_ignore_ascii_case(ENVELOPE_MIME_TYPE)
                && self.location.to_ascii_lowercase().contains("soap"))
    }
}

/// An attachment already persisted into the package, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub location: String,
    pub mime_type: String,
}

/// Identity of one submission package as recorded in its metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    pub message_id: String,
    pub timestamp: String,
    pub pmode: String,
    pub conversation_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDocument {
    pub message_id: String,
    pub timestamp: String,
    pub pmode: String,
    pub service: String,
    pub action: String,
    pub conversation_id: String,
    pub delete_files_after_submit: bool,
    pub parts: Vec<PartReference>,
}

impl MetadataDocument {
    /// Assembles the part list: the envelope (when present) first as
    /// `soapPart`, then one `partN` per attachment in the given order.
    pub fn for_submission(
        package: &PackageInfo,
        service: &str,
        action: &str,
        envelope_location: Option<&str>,
        attachments: &[AttachmentRef],
    ) -> Self {
        let mut parts = Vec::with_capacity(attachments.len() + 1);
        if let Some(location) = envelope_location {
            parts.push(PartReference {
                uri: ENVELOPE_PART_URI.to_string(),
                containment: Containment::Attachment,
                mime_type: ENVELOPE_MIME_TYPE.to_string(),
                location: location.to_string(),
            });
        }
        for (index, attachment) in attachments.iter().enumerate() {
            let mime_type = match attachment.mime_type.trim() {
                "" => DEFAULT_MIME_TYPE.to_string(),
                declared => declared.to_string(),
            };
            parts.push(PartReference {
                uri: format!("part{}", index + 1),
                containment: Containment::Attachment,
                mime_type,
                location: attachment.location.clone(),
            });
        }

        MetadataDocument {
            message_id: package.message_id.clone(),
            timestamp: package.timestamp.clone(),
            pmode: package.pmode.clone(),
            service: service.to_string(),
            action: action.to_string(),
            conversation_id: package.conversation_id.clone(),
            delete_files_after_submit: false,
            parts,
        }
    }

    pub fn parse(src: &str) -> std::result::Result<Self, DocumentError> {
        let root = Element::parse(src)?;
        Self::from_element(&root)
            .ok_or(DocumentError::Structure("root element is not MessageMetaData"))
    }

    pub fn from_element(root: &Element) -> Option<Self> {
        if !root.is("MessageMetaData") {
            return None;
        }
        let collaboration = root.child("CollaborationInfo");
        let field = |name: &str| {
            collaboration
                .map(|c| c.text_at(&[name]))
                .unwrap_or_default()
        };
        let payload_info = root.child("PayloadInfo");
        let parts = payload_info
            .map(|info| {
                info.children_named("PartInfo")
                    .map(|part| PartReference {
                        uri: part.attr("uri").unwrap_or_default().to_string(),
                        containment: Containment::parse_lenient(
                            part.attr("containment").unwrap_or_default(),
                        ),
                        mime_type: part.attr("mimeType").unwrap_or_default().to_string(),
                        location: part.attr("location").unwrap_or_default().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(MetadataDocument {
            message_id: root.text_at(&["MessageInfo", "MessageId"]),
            timestamp: root.text_at(&["MessageInfo", "Timestamp"]),
            pmode: collaboration
                .and_then(|c| c.child("AgreementRef"))
                .and_then(|a| a.attr("pmode"))
                .unwrap_or_default()
                .to_string(),
            service: field("Service"),
            action: field("Action"),
            conversation_id: field("ConversationId"),
            delete_files_after_submit: payload_info
                .and_then(|info| info.attr("deleteFilesAfterSubmit"))
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            parts,
        })
    }

    pub fn envelope_part(&self) -> Option<&PartReference> {
        self.parts.iter().find(|part| part.is_envelope())
    }

    pub fn attachment_parts(&self) -> impl Iterator<Item = &PartReference> + '_ {
        let envelope = self.envelope_part().map(|part| part.uri.as_str());
        self.parts
            .iter()
            .filter(move |part| Some(part.uri.as_str()) != envelope)
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        self.write()
            .map_err(|err| Error::Serialization(format!("metadata {}: {err}", self.message_id)))
    }

    fn write(&self) -> quick_xml::Result<Vec<u8>> {
        let mut w = XmlWriter::new()?;
        w.start(
            "MessageMetaData",
            &[
                ("xmlns", MMD_NS),
                ("xsi:schemaLocation", MMD_SCHEMA_LOCATION),
                ("xmlns:xsi", XSI_NS),
            ],
        )?;

        w.start("MessageInfo", &[])?;
        w.leaf("Timestamp", &self.timestamp)?;
        w.leaf("MessageId", &self.message_id)?;
        w.end("MessageInfo")?;

        w.start("CollaborationInfo", &[])?;
        w.empty("AgreementRef", &[("pmode", self.pmode.as_str())])?;
        w.leaf("Service", &self.service)?;
        w.leaf("Action", &self.action)?;
        w.leaf("ConversationId", &self.conversation_id)?;
        w.end("CollaborationInfo")?;

        let delete = if self.delete_files_after_submit { "true" } else { "false" };
        w.start("PayloadInfo", &[("deleteFilesAfterSubmit", delete)])?;
        for part in &self.parts {
            w.empty(
                "PartInfo",
                &[
                    ("uri", part.uri.as_str()),
                    ("containment", part.containment.as_str()),
                    ("mimeType", part.mime_type.as_str()),
                    ("location", part.location.as_str()),
                ],
            )?;
        }
        w.end("PayloadInfo")?;

        w.end("MessageMetaData")?;
        Ok(w.into_bytes())
    }
}

/// Serialises the metadata document for one submission package.
pub fn build_metadata(
    package: &PackageInfo,
    service: &str,
    action: &str,
    envelope_location: Option<&str>,
    attachments: &[AttachmentRef],
) -> Result<Vec<u8>> {
    MetadataDocument::for_submission(package, service, action, envelope_location, attachments)
        .to_xml()
}
