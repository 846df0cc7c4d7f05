use log::debug;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::submission::SubmissionRequest;
use crate::xml::{is_well_formed_fragment, DocumentError, Element, XmlWriter};

use super::{CONTENT_NS, EBMS_NS, SOAP_NS};

const ORIGINAL_FILE_NAME: &str = "originalfilename";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartProperty {
    pub name: String,
    pub value: String,
}

/// One `PartInfo` of an envelope's `PayloadInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadPart {
    pub href: Option<String>,
    pub properties: Vec<PartProperty>,
}

impl PayloadPart {
    /// File name the sender gave this part: the `OriginalFileName` property,
    /// or the only property when the part carries exactly one.
    pub fn original_file_name(&self) -> Option<&str> {
        let named = self
            .properties
            .iter()
            .find(|p| p.name.to_ascii_lowercase() == ORIGINAL_FILE_NAME);
        let chosen = match (named, self.properties.as_slice()) {
            (Some(property), _) => Some(property),
            (None, [only]) => Some(only),
            _ => None,
        };
        chosen
            .map(|p| p.value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// A business envelope, either a full SOAP `Envelope` or a bare ebMS
/// `Messaging` header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeDocument {
    pub message_id: String,
    pub timestamp: String,
    pub sender: String,
    pub receiver: String,
    pub service: String,
    pub action: String,
    pub subject: String,
    pub conversation_id: String,
    pub content: String,
    pub parts: Vec<PayloadPart>,
}

impl EnvelopeDocument {
    pub fn parse(src: &str) -> std::result::Result<Self, DocumentError> {
        let root = Element::parse(src)?;
        Self::from_element(&root)
            .ok_or(DocumentError::Structure("root element is not an ebMS envelope"))
    }

    pub fn from_element(root: &Element) -> Option<Self> {
        let user_message = if root.is("Envelope") {
            root.descend(&["Header", "Messaging", "UserMessage"])
                .or_else(|| root.find("UserMessage"))?
        } else if root.is("Messaging") {
            root.child("UserMessage")?
        } else {
            return None;
        };

        let message_id = match user_message.descend(&["MessageInfo", "MessageId"]) {
            Some(id) => id.text.trim().to_string(),
            None => user_message
                .find("MessageId")
                .map(|id| id.text.trim().to_string())
                .unwrap_or_default(),
        };

        let party = |role: &str| {
            user_message
                .find(role)
                .map(|element| element.text_at(&["PartyId"]))
                .unwrap_or_default()
        };
        let collaboration = |field: &str| {
            user_message
                .find("CollaborationInfo")
                .map(|element| element.text_at(&[field]))
                .unwrap_or_default()
        };

        let parts = user_message
            .find("PayloadInfo")
            .map(|info| info.children_named("PartInfo").map(payload_part).collect())
            .unwrap_or_default();

        let content = root
            .descend(&["Body", "MessageContent"])
            .map(Element::content)
            .unwrap_or_default();

        Some(EnvelopeDocument {
            message_id,
            timestamp: user_message.text_at(&["MessageInfo", "Timestamp"]),
            sender: party("From"),
            receiver: party("To"),
            service: collaboration("Service"),
            action: collaboration("Action"),
            subject: collaboration("Subject"),
            conversation_id: collaboration("ConversationId"),
            content,
            parts,
        })
    }

    /// Sender, receiver, id and timestamp are all present.
    pub fn has_required_fields(&self) -> bool {
        !(self.message_id.is_empty()
            || self.sender.is_empty()
            || self.receiver.is_empty()
            || self.timestamp.is_empty())
    }
}

fn payload_part(part: &Element) -> PayloadPart {
    let properties = part
        .child("PartProperties")
        .map(|props| {
            props
                .children_named("Property")
                .map(|property| PartProperty {
                    name: property.attr("name").unwrap_or_default().to_string(),
                    value: property.text.trim().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    PayloadPart {
        href: part.attr("href").map(str::to_string),
        properties,
    }
}

/// Serialises the envelope for one submission. The timestamp is taken from
/// `clock` at build time. A payload carrying well-formed markup is embedded
/// as-is; anything else, plain text included, is escaped as text. The
/// finished document is parsed once more and falls back to the escaped form
/// if embedding broke it.
pub fn build_envelope(
    request: &SubmissionRequest,
    message_id: &str,
    conversation_id: &str,
    clock: &dyn Clock,
) -> Result<Vec<u8>> {
    let timestamp = clock.timestamp();
    let serialization =
        |err: quick_xml::Error| Error::Serialization(format!("envelope {message_id}: {err}"));

    let payload = request.payload.as_str();
    if payload.contains('<') && is_well_formed_fragment(payload) {
        let bytes = write_envelope(request, message_id, conversation_id, &timestamp, true)
            .map_err(serialization)?;
        if embeds_cleanly(&bytes) {
            return Ok(bytes);
        }
        debug!("embedded payload of {message_id} breaks the envelope; escaping");
    } else if payload.contains('<') {
        debug!("payload of {message_id} is not a well-formed fragment; escaping");
    }
    write_envelope(request, message_id, conversation_id, &timestamp, false).map_err(serialization)
}

fn embeds_cleanly(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| Element::parse(text).ok())
        .is_some()
}

fn write_envelope(
    request: &SubmissionRequest,
    message_id: &str,
    conversation_id: &str,
    timestamp: &str,
    raw_payload: bool,
) -> quick_xml::Result<Vec<u8>> {
    let mut w = XmlWriter::new()?;
    w.start(
        "SOAP:Envelope",
        &[
            ("xmlns:SOAP", SOAP_NS),
            ("xmlns:eb", EBMS_NS),
            ("xmlns:myns", CONTENT_NS),
        ],
    )?;
    w.start("SOAP:Header", &[])?;
    w.start("eb:Messaging", &[])?;
    w.start("eb:UserMessage", &[])?;

    w.start("eb:MessageInfo", &[])?;
    w.leaf("eb:MessageId", message_id)?;
    w.leaf("eb:Timestamp", timestamp)?;
    w.end("eb:MessageInfo")?;

    w.start("eb:PartyInfo", &[])?;
    w.start("eb:From", &[])?;
    w.leaf("eb:PartyId", &request.sender)?;
    w.end("eb:From")?;
    w.start("eb:To", &[])?;
    w.leaf("eb:PartyId", &request.receiver)?;
    w.end("eb:To")?;
    w.end("eb:PartyInfo")?;

    w.start("eb:CollaborationInfo", &[])?;
    w.leaf("eb:Service", &request.service)?;
    w.leaf("eb:Action", &request.action)?;
    w.leaf("eb:Subject", request.subject.as_deref().unwrap_or_default())?;
    w.leaf("eb:ConversationId", conversation_id)?;
    w.end("eb:CollaborationInfo")?;

    w.end("eb:UserMessage")?;
    w.end("eb:Messaging")?;
    w.end("SOAP:Header")?;

    w.start("SOAP:Body", &[])?;
    if raw_payload {
        w.raw_leaf("myns:MessageContent", &request.payload)?;
    } else {
        w.leaf("myns:MessageContent", &request.payload)?;
    }
    w.end("SOAP:Body")?;
    w.end("SOAP:Envelope")?;
    Ok(w.into_bytes())
}
