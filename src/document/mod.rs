//! The two document dialects found in the gateway's folders.
//!
//! - **Metadata** (`MessageMetaData`): describes a submission package and
//!   points at the files holding the envelope and attachments.
//! - **Envelope** (`Envelope` or a bare ebMS `Messaging` header): the business
//!   message itself, carrying its id, parties and body directly.
//!
//! Which one a file holds is decided by trial parse on the root element.

pub mod envelope;
pub mod metadata;

use crate::xml::{DocumentError, Element};

pub use envelope::{build_envelope, EnvelopeDocument, PartProperty, PayloadPart};
pub use metadata::{
    build_metadata, AttachmentRef, Containment, MetadataDocument, PackageInfo, PartReference,
};

pub const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const EBMS_NS: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704";
pub const CONTENT_NS: &str = "http://example.org/myns";
pub const MMD_NS: &str = "http://holodeck-b2b.org/schemas/2014/06/mmd";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const MMD_SCHEMA_LOCATION: &str =
    "http://holodeck-b2b.org/schemas/2014/06/mmd ../repository/xsd/messagemetadata.xsd";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Metadata,
    Envelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundDocument {
    Metadata(MetadataDocument),
    Envelope(EnvelopeDocument),
}

impl InboundDocument {
    pub fn parse(src: &str) -> Result<Self, DocumentError> {
        let root = Element::parse(src)?;
        Self::from_element(&root).ok_or(DocumentError::Structure(
            "root element is neither MessageMetaData nor an ebMS envelope",
        ))
    }

    pub fn from_element(root: &Element) -> Option<Self> {
        if let Some(metadata) = MetadataDocument::from_element(root) {
            return Some(InboundDocument::Metadata(metadata));
        }
        EnvelopeDocument::from_element(root).map(InboundDocument::Envelope)
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            InboundDocument::Metadata(_) => Dialect::Metadata,
            InboundDocument::Envelope(_) => Dialect::Envelope,
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            InboundDocument::Metadata(doc) => &doc.message_id,
            InboundDocument::Envelope(doc) => &doc.message_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_is_chosen_by_root_element() {
        let mmd = r#"<MessageMetaData xmlns="http://holodeck-b2b.org/schemas/2014/06/mmd">
            <MessageInfo><MessageId>M-1</MessageId></MessageInfo></MessageMetaData>"#;
        let doc = InboundDocument::parse(mmd).unwrap();
        assert_eq!(doc.dialect(), Dialect::Metadata);
        assert_eq!(doc.message_id(), "M-1");

        let env = r#"<eb:Messaging xmlns:eb="http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704">
            <eb:UserMessage><eb:MessageInfo><eb:MessageId>M-2</eb:MessageId></eb:MessageInfo></eb:UserMessage>
            </eb:Messaging>"#;
        let doc = InboundDocument::parse(env).unwrap();
        assert_eq!(doc.dialect(), Dialect::Envelope);
        assert_eq!(doc.message_id(), "M-2");
    }

    #[test]
    fn unknown_root_is_rejected() {
        assert!(InboundDocument::parse("<PurchaseOrder/>").is_err());
    }
}
